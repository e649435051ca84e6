use anyhow::{Context, Result};
use memoria_core::CONFIG_FILE_NAME;
use std::fs;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    root: PathBuf,
}

impl InstallLayout {
    /// A relative root is resolved against the current directory, and `.`
    /// and `..` segments are folded away, so the symlinks and hook lines
    /// written under it stay valid from anywhere.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: resolve_root(root.into()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Live payload pointer; a symlink into `releases/` on unix.
    pub fn payload_dir(&self) -> PathBuf {
        self.root.join("app")
    }

    pub fn releases_dir(&self) -> PathBuf {
        self.root.join("releases")
    }

    pub fn release_dir(&self, id: &str) -> PathBuf {
        self.releases_dir().join(id)
    }

    /// Where a plain-directory payload is moved when it is converted into a
    /// release during `txid`.
    pub fn adopted_release_path(&self, txid: &str) -> PathBuf {
        self.release_dir(&format!("previous-{txid}"))
    }

    pub fn dependency_env_dir(&self) -> PathBuf {
        self.root.join("env")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn shell_dir(&self) -> PathBuf {
        self.root.join("shell")
    }

    pub fn env_script_path(&self) -> PathBuf {
        self.shell_dir().join("memoria-env.sh")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.state_dir().join("logs")
    }

    pub fn record_path(&self) -> PathBuf {
        self.state_dir().join("installation.receipt")
    }

    pub fn version_cache_path(&self) -> PathBuf {
        self.state_dir().join("version-cache.json")
    }

    pub fn transactions_dir(&self) -> PathBuf {
        self.state_dir().join("transactions")
    }

    pub fn transaction_lock_path(&self) -> PathBuf {
        self.transactions_dir().join("active")
    }

    pub fn transaction_metadata_path(&self, txid: &str) -> PathBuf {
        self.transactions_dir().join(format!("{txid}.json"))
    }

    pub fn transaction_journal_path(&self, txid: &str) -> PathBuf {
        self.transactions_dir().join(format!("{txid}.journal"))
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.transactions_dir().join("staging")
    }

    pub fn transaction_staging_path(&self, txid: &str) -> PathBuf {
        self.staging_dir().join(txid)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.transactions_dir().join("backup")
    }

    pub fn transaction_backup_path(&self, txid: &str) -> PathBuf {
        self.backups_dir().join(txid)
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        for dir in [
            self.releases_dir(),
            self.data_dir(),
            self.shell_dir(),
            self.state_dir(),
            self.logs_dir(),
            self.transactions_dir(),
            self.staging_dir(),
            self.backups_dir(),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

fn resolve_root(root: PathBuf) -> PathBuf {
    let absolute = std::path::absolute(&root).unwrap_or(root);
    let mut resolved = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other),
        }
    }
    resolved
}

pub fn default_install_root() -> Result<PathBuf> {
    if cfg!(windows) {
        let app_data = std::env::var("LOCALAPPDATA")
            .context("LOCALAPPDATA is not set; cannot resolve Windows install root")?;
        return Ok(PathBuf::from(app_data).join("Memoria"));
    }

    let home = std::env::var("HOME").context("HOME is not set; cannot resolve install root")?;
    Ok(PathBuf::from(home).join(".memoria"))
}
