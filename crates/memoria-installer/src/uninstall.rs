use std::path::PathBuf;

use log::{info, warn};
use memoria_core::Result;

use crate::fs_utils::{path_exists, remove_path_if_exists};
use crate::record::read_installation_record;
use crate::shell_hook::{remove_shell_hook, HookChange};
use crate::{InstallLayout, UninstallResult, UninstallStatus};

/// Removes the installed payload, its environment, generated files and
/// local state. Startup-file hooks are stripped from `startup_files`.
///
/// The vector-store data directory and `config.toml` survive unless
/// `remove_data` is set.
pub fn uninstall_installation(
    layout: &InstallLayout,
    startup_files: &[PathBuf],
    remove_data: bool,
) -> Result<UninstallResult> {
    let record = match read_installation_record(layout) {
        Ok(record) => record,
        Err(err) => {
            warn!("ignoring unreadable installation record: {err:#}");
            None
        }
    };

    let mut unhooked = Vec::new();
    for file in startup_files {
        if let HookChange::Removed(_) = remove_shell_hook(file)? {
            unhooked.push(file.clone());
        }
    }

    let mut targets = vec![
        layout.payload_dir(),
        layout.releases_dir(),
        layout.dependency_env_dir(),
        layout.shell_dir(),
        layout.record_path(),
        layout.version_cache_path(),
        layout.staging_dir(),
        layout.backups_dir(),
        layout.logs_dir(),
    ];
    if remove_data {
        targets.push(layout.data_dir());
        targets.push(layout.config_path());
    }

    let had_payload = path_exists(&layout.payload_dir());
    let mut removed_paths = Vec::new();
    for target in targets {
        if path_exists(&target) {
            remove_path_if_exists(&target)?;
            removed_paths.push(target);
        }
    }

    let status = match (&record, had_payload || !removed_paths.is_empty()) {
        (Some(_), _) => UninstallStatus::Uninstalled,
        (None, true) => UninstallStatus::RepairedStaleState,
        (None, false) => UninstallStatus::NotInstalled,
    };
    info!(
        "uninstall {}: removed {} path(s), unhooked {} file(s)",
        status.as_str(),
        removed_paths.len(),
        unhooked.len()
    );

    Ok(UninstallResult {
        version: record.map(|record| record.version),
        status,
        removed_paths,
        unhooked,
    })
}
