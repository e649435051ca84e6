use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::version::VersionError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Step of an update transaction at which it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStage {
    Stage,
    Backup,
    Swap,
    Dependencies,
    HealthGate,
    Record,
}

impl ApplyStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stage => "stage",
            Self::Backup => "backup",
            Self::Swap => "swap",
            Self::Dependencies => "dependencies",
            Self::HealthGate => "health-gate",
            Self::Record => "record",
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    InvalidFormat(#[from] VersionError),

    #[error("network error while {operation}")]
    Network {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("integrity check failed for {artifact}: {reason}")]
    Integrity { artifact: String, reason: String },

    #[error("{}", apply_summary(operation, *stage, restored.len()))]
    Apply {
        operation: String,
        stage: ApplyStage,
        restored: Vec<PathBuf>,
        #[source]
        source: anyhow::Error,
    },

    #[error("rollback failed; installation may be inconsistent, backup kept at {}", backup.display())]
    Rollback {
        backup: PathBuf,
        apply_cause: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("rejected hook target '{path}': contains disallowed construct {construct}")]
    ValidationRejected {
        path: String,
        construct: &'static str,
    },

    #[error("required tool '{tool}' was not found on PATH")]
    MissingPrerequisite { tool: String },

    #[error("command `{command}` did not finish within {}s", timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("command `{command}` failed")]
    Process {
        command: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("another memoria operation is in progress (lock held at {}{})", path.display(), holder_suffix(holder.as_deref()))]
    Locked {
        path: PathBuf,
        holder: Option<String>,
    },

    #[error(transparent)]
    State(#[from] anyhow::Error),
}

impl ApplyStage {
    /// Failures at these stages happen before the live payload is touched.
    pub fn is_before_apply(self) -> bool {
        matches!(self, Self::Stage | Self::Backup)
    }
}

fn apply_summary(operation: &str, stage: ApplyStage, restored: usize) -> String {
    if stage.is_before_apply() {
        format!(
            "{operation} aborted during {} before anything was applied; nothing changed",
            stage.as_str()
        )
    } else {
        format!(
            "{operation} failed during {} and was rolled back ({restored} path(s) restored)",
            stage.as_str()
        )
    }
}

fn holder_suffix(holder: Option<&str>) -> String {
    holder.map(|holder| format!(" by {holder}")).unwrap_or_default()
}

impl Error {
    pub fn network(operation: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Network {
            operation: operation.into(),
            source: source.into(),
        }
    }

    pub fn integrity(artifact: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Integrity {
            artifact: artifact.into(),
            reason: reason.into(),
        }
    }

    /// Only a failed rollback leaves the machine in an unknown state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Rollback { .. })
    }
}
