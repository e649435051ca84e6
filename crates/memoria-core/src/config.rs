use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_RELEASE_URL: &str = "https://github.com/IgorCandido/memoria/releases";

/// Everything the installer needs to know about this machine's deployment.
///
/// Built once by the dispatcher and handed to constructors by value; no
/// component reads the process environment on its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct InstallConfig {
    #[serde(skip)]
    pub install_root: PathBuf,
    pub release: ReleaseConfig,
    pub timeouts: TimeoutConfig,
    pub container: ContainerConfig,
    pub dependencies: DependencyConfig,
    pub health: HealthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ReleaseConfig {
    pub base_url: String,
    pub allow_insecure_http: bool,
    pub trusted_public_key: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutConfig {
    pub network_secs: u64,
    pub process_secs: u64,
    pub health_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ContainerConfig {
    pub name: String,
    pub image: String,
    pub host_port: u16,
    pub container_port: u16,
    pub data_volume: Option<PathBuf>,
    pub data_mount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct DependencyConfig {
    pub steps: Vec<CommandStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct HealthConfig {
    pub command: Option<CommandStep>,
}

/// External command with `{root}`, `{payload}` and `{env}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CommandStep {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Concrete paths substituted into a [`CommandStep`].
#[derive(Debug, Clone, Copy)]
pub struct StepPaths<'a> {
    pub root: &'a Path,
    pub payload: &'a Path,
    pub env: &'a Path,
}

impl CommandStep {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        }
    }

    pub fn resolve(&self, paths: StepPaths<'_>) -> (String, Vec<String>) {
        let substitute = |raw: &str| {
            raw.replace("{root}", &paths.root.display().to_string())
                .replace("{payload}", &paths.payload.display().to_string())
                .replace("{env}", &paths.env.display().to_string())
        };
        (
            substitute(&self.program),
            self.args.iter().map(|arg| substitute(arg)).collect(),
        )
    }
}

impl InstallConfig {
    pub fn with_root(install_root: impl Into<PathBuf>) -> Self {
        Self {
            install_root: install_root.into(),
            ..Self::default()
        }
    }

    /// Reads `<root>/config.toml` (or `explicit`), falling back to defaults
    /// when the default file does not exist.
    pub fn load(install_root: impl Into<PathBuf>, explicit: Option<&Path>) -> anyhow::Result<Self> {
        let install_root = install_root.into();
        let path = explicit
            .map(Path::to_path_buf)
            .unwrap_or_else(|| install_root.join(CONFIG_FILE_NAME));

        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound && explicit.is_none() => {
                return Ok(Self::with_root(install_root));
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read config file: {}", path.display()));
            }
        };

        Self::from_toml_str(install_root, &raw)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    pub fn from_toml_str(install_root: impl Into<PathBuf>, input: &str) -> anyhow::Result<Self> {
        let mut config: Self = toml::from_str(input).context("invalid installer config")?;
        config.install_root = install_root.into();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.release.base_url.trim().is_empty() {
            return Err(anyhow!("release.base_url must not be empty"));
        }
        if self.container.name.trim().is_empty() || self.container.image.trim().is_empty() {
            return Err(anyhow!("container.name and container.image must not be empty"));
        }
        if self.container.host_port == 0 || self.container.container_port == 0 {
            return Err(anyhow!("container ports must be non-zero"));
        }
        for (label, secs) in [
            ("timeouts.network_secs", self.timeouts.network_secs),
            ("timeouts.process_secs", self.timeouts.process_secs),
            ("timeouts.health_secs", self.timeouts.health_secs),
        ] {
            if secs == 0 {
                return Err(anyhow!("{label} must be greater than zero"));
            }
        }
        Ok(())
    }
}

impl TimeoutConfig {
    pub fn network(&self) -> Duration {
        Duration::from_secs(self.network_secs)
    }

    pub fn process(&self) -> Duration {
        Duration::from_secs(self.process_secs)
    }

    pub fn health(&self) -> Duration {
        Duration::from_secs(self.health_secs)
    }
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            install_root: PathBuf::new(),
            release: ReleaseConfig::default(),
            timeouts: TimeoutConfig::default(),
            container: ContainerConfig::default(),
            dependencies: DependencyConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_RELEASE_URL.to_string(),
            allow_insecure_http: false,
            trusted_public_key: None,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            network_secs: 30,
            process_secs: 600,
            health_secs: 60,
        }
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            name: "memoria-chroma".to_string(),
            image: "chromadb/chroma:0.5.23".to_string(),
            host_port: 8001,
            container_port: 8000,
            data_volume: None,
            data_mount: "/chroma/chroma".to_string(),
        }
    }
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            steps: vec![
                CommandStep::new("python3", &["-m", "venv", "{env}"]),
                CommandStep::new(
                    "{env}/bin/python",
                    &[
                        "-m",
                        "pip",
                        "install",
                        "--quiet",
                        "--requirement",
                        "{payload}/requirements.txt",
                    ],
                ),
            ],
        }
    }
}
