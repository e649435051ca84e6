use memoria_core::Error;
use thiserror::Error;

/// Failure of a `memoria` command, as reported to the operator.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    #[error(transparent)]
    Core(#[from] Error),

    #[error("health check failed")]
    Unhealthy {
        #[source]
        source: anyhow::Error,
    },

    #[error("{0}")]
    Refused(String),
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        Self::Core(Error::State(err))
    }
}

impl CliError {
    pub(crate) fn unhealthy(source: impl Into<anyhow::Error>) -> Self {
        Self::Unhealthy {
            source: source.into(),
        }
    }

    pub(crate) fn is_fatal(&self) -> bool {
        matches!(self, Self::Core(err) if err.is_fatal())
    }

    /// One line per path a rollback put back, for the operator.
    pub(crate) fn rollback_report(&self) -> Vec<String> {
        match self {
            Self::Core(Error::Apply { restored, .. }) => restored
                .iter()
                .map(|path| format!("restored: {}", path.display()))
                .collect(),
            Self::Core(Error::Rollback { backup, .. }) => {
                vec![format!("backup kept at: {}", backup.display())]
            }
            _ => Vec::new(),
        }
    }
}

pub(crate) const EXIT_GENERAL: u8 = 1;
pub(crate) const EXIT_MISSING_PREREQUISITE: u8 = 2;
pub(crate) const EXIT_DOWNLOAD: u8 = 3;
pub(crate) const EXIT_CHECKSUM: u8 = 4;
pub(crate) const EXIT_ROLLED_BACK: u8 = 5;
pub(crate) const EXIT_UNHEALTHY: u8 = 6;
pub(crate) const EXIT_ROLLBACK_FAILED: u8 = 7;
pub(crate) const EXIT_INVALID_INPUT: u8 = 8;
pub(crate) const EXIT_LOCKED: u8 = 9;

pub(crate) fn exit_code_for(err: &CliError) -> u8 {
    match err {
        CliError::Core(err) => core_exit_code(err),
        CliError::Unhealthy { .. } => EXIT_UNHEALTHY,
        CliError::Refused(_) => EXIT_GENERAL,
    }
}

fn core_exit_code(err: &Error) -> u8 {
    match err {
        Error::InvalidFormat(_) | Error::ValidationRejected { .. } => EXIT_INVALID_INPUT,
        Error::Network { .. } => EXIT_DOWNLOAD,
        Error::Integrity { .. } => EXIT_CHECKSUM,
        Error::Apply { stage, source, .. } => {
            let missing_tool = source.chain().any(|cause| {
                matches!(
                    cause.downcast_ref::<Error>(),
                    Some(Error::MissingPrerequisite { .. })
                )
            });
            if missing_tool {
                EXIT_MISSING_PREREQUISITE
            } else if stage.is_before_apply() {
                EXIT_GENERAL
            } else {
                EXIT_ROLLED_BACK
            }
        }
        Error::Rollback { .. } => EXIT_ROLLBACK_FAILED,
        Error::MissingPrerequisite { .. } => EXIT_MISSING_PREREQUISITE,
        Error::Timeout { .. } | Error::Process { .. } | Error::State(_) => EXIT_GENERAL,
        Error::Locked { .. } => EXIT_LOCKED,
    }
}
