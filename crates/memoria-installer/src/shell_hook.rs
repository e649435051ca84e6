//! Startup-file integration: one marked line that sources the generated
//! environment script.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::{debug, info};
use memoria_core::{Error, Result};

use crate::fs_utils::write_file_atomic;
use crate::InstallLayout;

pub const HOOK_MARKER: &str = "# memoria-env-hook";

/// Substrings that would let a path break out of the quoted single-statement
/// hook line when the startup file is sourced. Not a shell grammar.
const DENIED_CONSTRUCTS: &[(&str, &str)] = &[
    (";", "';'"),
    ("||", "'||'"),
    ("|", "'|'"),
    ("`", "backtick"),
    ("$(", "'$('"),
    ("&&", "'&&'"),
    ("..", "'..'"),
    ("\"", "double quote"),
    ("\n", "newline"),
    ("\r", "newline"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookChange {
    Added,
    AlreadyPresent,
    Removed(usize),
    NotPresent,
}

pub fn validate_hook_target(path: &str) -> Result<()> {
    let reject = |construct: &'static str| Error::ValidationRejected {
        path: path.to_string(),
        construct,
    };
    if path.trim().is_empty() {
        return Err(reject("empty path"));
    }
    if let Some((_, construct)) = DENIED_CONSTRUCTS
        .iter()
        .find(|(needle, _)| path.contains(needle))
    {
        return Err(reject(construct));
    }
    Ok(())
}

pub fn hook_line(target: &str) -> String {
    format!("[ -f \"{target}\" ] && source \"{target}\" {HOOK_MARKER}")
}

/// Appends the hook line to `file` unless a marked line is already there.
/// The file and its parent directories are created if missing.
pub fn add_shell_hook(file: &Path, hook_target: &Path) -> Result<HookChange> {
    let target = hook_target.to_string_lossy();
    validate_hook_target(&target)?;

    let mut content = read_startup_file(file)?.unwrap_or_default();
    if content.contains(HOOK_MARKER) {
        debug!("{} already sources memoria", file.display());
        return Ok(HookChange::AlreadyPresent);
    }

    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(&hook_line(&target));
    content.push('\n');
    write_file_atomic(file, content.as_bytes())
        .with_context(|| format!("failed to update startup file: {}", file.display()))?;
    info!("added memoria hook to {}", file.display());
    Ok(HookChange::Added)
}

/// Drops every marked line, leaving all other bytes as they were.
pub fn remove_shell_hook(file: &Path) -> Result<HookChange> {
    let Some(content) = read_startup_file(file)? else {
        return Ok(HookChange::NotPresent);
    };

    let mut kept = String::with_capacity(content.len());
    let mut removed = 0;
    for line in content.split_inclusive('\n') {
        if line.contains(HOOK_MARKER) {
            removed += 1;
        } else {
            kept.push_str(line);
        }
    }
    if removed == 0 {
        return Ok(HookChange::NotPresent);
    }

    write_file_atomic(file, kept.as_bytes())
        .with_context(|| format!("failed to update startup file: {}", file.display()))?;
    info!("removed {removed} memoria hook line(s) from {}", file.display());
    Ok(HookChange::Removed(removed))
}

/// Startup files to hook for the given login shell (`$SHELL`).
pub fn startup_files_for(home: &Path, shell: Option<&str>) -> Vec<PathBuf> {
    let name = shell
        .map(Path::new)
        .and_then(Path::file_name)
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    match name {
        "zsh" => vec![home.join(".zshrc")],
        "bash" => vec![home.join(".bashrc")],
        _ => vec![home.join(".profile")],
    }
}

/// Writes the script the hook line sources.
pub fn write_env_script(layout: &InstallLayout) -> Result<PathBuf> {
    let root = layout.root().to_string_lossy().into_owned();
    let bin = layout.payload_dir().join("bin").to_string_lossy().into_owned();
    validate_hook_target(&root)?;

    let script = format!(
        "# generated by memoria; rewritten on every install and update\n\
         export MEMORIA_ROOT=\"{root}\"\n\
         case \":$PATH:\" in\n\
         \x20 *\":{bin}:\"*) ;;\n\
         \x20 *) export PATH=\"{bin}:$PATH\" ;;\n\
         esac\n"
    );
    let path = layout.env_script_path();
    write_file_atomic(&path, script.as_bytes())
        .with_context(|| format!("failed to write env script: {}", path.display()))?;
    debug!("wrote {}", path.display());
    Ok(path)
}

fn read_startup_file(file: &Path) -> Result<Option<String>> {
    match fs::read_to_string(file) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(anyhow::Error::new(err)
            .context(format!("failed to read startup file: {}", file.display()))
            .into()),
    }
}
