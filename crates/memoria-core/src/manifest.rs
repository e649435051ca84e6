use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::version::Version;

/// Per-release metadata published next to every artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseManifest {
    pub version: Version,
    pub artifact: String,
    pub sha256: String,
    pub signature: Option<String>,
    pub source_revision: Option<String>,
}

impl ReleaseManifest {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let manifest: Self = toml::from_str(input).context("failed to parse release manifest")?;
        validate_artifact_name(&manifest.artifact)?;
        validate_sha256_hex(&manifest.sha256)?;
        Ok(manifest)
    }

    /// Bytes covered by the optional release signature.
    pub fn signed_payload(&self) -> String {
        format!("{}\n{}\n{}\n", self.version, self.artifact, self.sha256)
    }
}

fn validate_artifact_name(name: &str) -> anyhow::Result<()> {
    if name.trim().is_empty() {
        return Err(anyhow!("artifact name must not be empty"));
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(anyhow!("artifact name must be a bare file name: {name}"));
    }
    Ok(())
}

fn validate_sha256_hex(value: &str) -> anyhow::Result<()> {
    if value.len() != 64 || !value.bytes().all(|byte| byte.is_ascii_hexdigit()) {
        return Err(anyhow!("sha256 must be 64 hex characters, got '{value}'"));
    }
    Ok(())
}
