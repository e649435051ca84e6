use std::path::PathBuf;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use memoria_core::Version;
use serde::{Deserialize, Serialize};

/// What is installed on this machine and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationRecord {
    pub version: Version,
    pub install_path: PathBuf,
    pub payload_path: PathBuf,
    pub dependency_env_path: PathBuf,
    pub install_method: InstallMethod,
    pub installed_at: DateTime<Utc>,
    pub source_revision: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMethod {
    Clone,
    Archive,
}

impl InstallMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clone => "clone",
            Self::Archive => "archive",
        }
    }

    pub(crate) fn parse(value: &str) -> Result<Self> {
        match value {
            "clone" => Ok(Self::Clone),
            "archive" => Ok(Self::Archive),
            _ => Err(anyhow!("invalid install_method: {value}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Staged,
    Applied,
    Verified,
    RolledBack,
}

impl UpdateState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Staged => "staged",
            Self::Applied => "applied",
            Self::Verified => "verified",
            Self::RolledBack => "rolled_back",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Verified | Self::RolledBack)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    pub version: u32,
    pub txid: String,
    pub operation: String,
    pub status: String,
    pub started_at_unix: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_version: Option<String>,
    /// Release the live payload pointed at before the swap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionJournalEntry {
    pub seq: u64,
    pub step: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Result of a verified install or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub txid: String,
    pub state: UpdateState,
    pub previous_version: Option<Version>,
    pub record: InstallationRecord,
}

/// What [`crate::sweep_stale_transactions`] found and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub recovered: Vec<String>,
    pub removed: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UninstallStatus {
    NotInstalled,
    Uninstalled,
    RepairedStaleState,
}

impl UninstallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotInstalled => "not_installed",
            Self::Uninstalled => "uninstalled",
            Self::RepairedStaleState => "repaired_stale_state",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallResult {
    pub version: Option<Version>,
    pub status: UninstallStatus,
    pub removed_paths: Vec<PathBuf>,
    pub unhooked: Vec<PathBuf>,
}
