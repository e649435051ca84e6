mod config;
mod error;
mod manifest;
mod version;

pub use config::{
    CommandStep, ContainerConfig, DependencyConfig, HealthConfig, InstallConfig, ReleaseConfig,
    StepPaths, TimeoutConfig, CONFIG_FILE_NAME, DEFAULT_RELEASE_URL,
};
pub use error::{ApplyStage, Error, Result};
pub use manifest::ReleaseManifest;
pub use version::{compare, normalize, Version, VersionError};

#[cfg(test)]
mod tests;
