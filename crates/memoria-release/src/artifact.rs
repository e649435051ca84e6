use log::warn;
use memoria_core::{Error, ReleaseManifest, Result, Version};
use memoria_security::{verify_sha256, Verification};

/// Artifact bytes exactly as retrieved, not yet trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArtifact {
    pub manifest: ReleaseManifest,
    pub bytes: Vec<u8>,
}

/// Artifact whose bytes matched the manifest digest.
///
/// The only way to obtain one is [`VerifiedArtifact::verify`], so holding a
/// value is proof the check ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedArtifact {
    manifest: ReleaseManifest,
    bytes: Vec<u8>,
}

impl VerifiedArtifact {
    pub fn verify(manifest: ReleaseManifest, bytes: Vec<u8>) -> Result<Self> {
        match verify(&bytes, &manifest.sha256) {
            Verification::Verified => Ok(Self { manifest, bytes }),
            Verification::Mismatch { expected, actual } => {
                warn!(
                    "discarding {} ({} bytes): sha256 {actual} does not match declared {expected}",
                    manifest.artifact,
                    bytes.len()
                );
                Err(Error::integrity(
                    manifest.artifact,
                    format!("sha256 mismatch (expected {expected}, got {actual})"),
                ))
            }
        }
    }

    pub fn manifest(&self) -> &ReleaseManifest {
        &self.manifest
    }

    pub fn version(&self) -> &Version {
        &self.manifest.version
    }

    pub fn file_name(&self) -> &str {
        &self.manifest.artifact
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Compares the digest of `bytes` with the manifest-declared hex digest.
pub fn verify(bytes: &[u8], declared_sha256: &str) -> Verification {
    verify_sha256(bytes, declared_sha256)
}
