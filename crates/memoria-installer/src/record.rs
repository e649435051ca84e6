use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use memoria_core::Version;
use std::fs;
use std::io;
use std::path::PathBuf;

use crate::fs_utils::write_file_atomic;
use crate::{InstallLayout, InstallMethod, InstallationRecord};

pub fn write_installation_record(
    layout: &InstallLayout,
    record: &InstallationRecord,
) -> Result<PathBuf> {
    let mut payload = String::new();
    payload.push_str(&format!("version={}\n", record.version));
    payload.push_str(&format!("install_path={}\n", record.install_path.display()));
    payload.push_str(&format!("payload_path={}\n", record.payload_path.display()));
    payload.push_str(&format!(
        "dependency_env_path={}\n",
        record.dependency_env_path.display()
    ));
    payload.push_str(&format!(
        "install_method={}\n",
        record.install_method.as_str()
    ));
    payload.push_str(&format!(
        "installed_at={}\n",
        record
            .installed_at
            .to_rfc3339_opts(SecondsFormat::AutoSi, true)
    ));
    if let Some(revision) = &record.source_revision {
        payload.push_str(&format!("source_revision={revision}\n"));
    }

    let path = layout.record_path();
    write_file_atomic(&path, payload.as_bytes())
        .with_context(|| format!("failed to write installation record: {}", path.display()))?;
    Ok(path)
}

pub fn read_installation_record(layout: &InstallLayout) -> Result<Option<InstallationRecord>> {
    let path = layout.record_path();
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| {
                format!("failed to read installation record: {}", path.display())
            });
        }
    };

    let record = parse_record(&raw)
        .with_context(|| format!("failed to parse installation record: {}", path.display()))?;
    Ok(Some(record))
}

pub(crate) fn parse_record(raw: &str) -> Result<InstallationRecord> {
    let mut version = None;
    let mut install_path = None;
    let mut payload_path = None;
    let mut dependency_env_path = None;
    let mut install_method = None;
    let mut installed_at = None;
    let mut source_revision = None;

    for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        match k {
            "version" => version = Some(Version::parse(v).context("invalid version")?),
            "install_path" => install_path = Some(PathBuf::from(v)),
            "payload_path" => payload_path = Some(PathBuf::from(v)),
            "dependency_env_path" => dependency_env_path = Some(PathBuf::from(v)),
            "install_method" => install_method = Some(InstallMethod::parse(v)?),
            "installed_at" => {
                installed_at = Some(
                    DateTime::parse_from_rfc3339(v)
                        .context("installed_at must be an RFC 3339 timestamp")?
                        .with_timezone(&Utc),
                )
            }
            "source_revision" => source_revision = Some(v.to_string()),
            _ => {}
        }
    }

    let install_path = install_path.context("missing install_path")?;
    Ok(InstallationRecord {
        version: version.context("missing version")?,
        payload_path: payload_path.unwrap_or_else(|| install_path.join("app")),
        dependency_env_path: dependency_env_path.unwrap_or_else(|| install_path.join("env")),
        install_path,
        install_method: install_method.unwrap_or(InstallMethod::Archive),
        installed_at: installed_at.context("missing installed_at")?,
        source_revision,
    })
}
