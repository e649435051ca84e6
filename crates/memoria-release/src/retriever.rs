use std::io::Read;
use std::time::Duration;

use anyhow::{anyhow, Context};
use log::{debug, info};
use memoria_core::{Error, ReleaseConfig, ReleaseManifest, Result, Version};
use memoria_security::TrustedKey;
use reqwest::blocking::{Client, Response};

use crate::artifact::{FetchedArtifact, VerifiedArtifact};

pub const MANIFEST_FILE_NAME: &str = "release.toml";
const USER_AGENT: &str = concat!("memoria-installer/", env!("CARGO_PKG_VERSION"));
const READ_CHUNK: usize = 64 * 1024;

/// Where releases are published and how far to trust the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSource {
    pub base_url: String,
    pub timeout: Duration,
    pub allow_insecure_http: bool,
    pub trusted_public_key: Option<String>,
}

impl ReleaseSource {
    pub fn from_config(config: &ReleaseConfig, timeout: Duration) -> Self {
        Self {
            base_url: config.base_url.clone(),
            timeout,
            allow_insecure_http: config.allow_insecure_http,
            trusted_public_key: config.trusted_public_key.clone(),
        }
    }
}

/// Fetches release manifests and artifacts, one request each, addressed by tag.
#[derive(Debug)]
pub struct Retriever {
    base_url: String,
    client: Client,
    trusted_key: Option<TrustedKey>,
}

impl Retriever {
    pub fn new(source: ReleaseSource) -> Result<Self> {
        let base_url = source.base_url.trim().trim_end_matches('/').to_string();
        if !base_url.starts_with("https://")
            && !(source.allow_insecure_http && base_url.starts_with("http://"))
        {
            return Err(anyhow!("release base URL must use https (got '{base_url}')").into());
        }

        let trusted_key = source
            .trusted_public_key
            .as_deref()
            .map(TrustedKey::from_hex)
            .transpose()
            .context("invalid release.trusted_public_key")?;

        let client = Client::builder()
            .timeout(source.timeout)
            .connect_timeout(source.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| Error::network("building the HTTP client", err))?;

        Ok(Self {
            base_url,
            client,
            trusted_key,
        })
    }

    pub fn manifest_url(&self, version: &Version) -> String {
        format!(
            "{}/download/{}/{MANIFEST_FILE_NAME}",
            self.base_url,
            version.tag()
        )
    }

    pub fn latest_manifest_url(&self) -> String {
        format!("{}/latest/download/{MANIFEST_FILE_NAME}", self.base_url)
    }

    pub fn artifact_url(&self, version: &Version, artifact: &str) -> String {
        format!("{}/download/{}/{artifact}", self.base_url, version.tag())
    }

    /// Asks the release channel which version is current.
    pub fn fetch_latest_version(&self) -> Result<Version> {
        let url = self.latest_manifest_url();
        let manifest = self.download_manifest(&url)?;
        info!("latest published release is {}", manifest.version);
        Ok(manifest.version)
    }

    pub fn fetch_manifest(&self, version: &Version) -> Result<ReleaseManifest> {
        let url = self.manifest_url(version);
        let manifest = self.download_manifest(&url)?;
        if manifest.version != *version {
            return Err(Error::integrity(
                url,
                format!(
                    "manifest declares version {} but {} was requested",
                    manifest.version, version
                ),
            ));
        }
        Ok(manifest)
    }

    pub fn fetch(&self, version: &Version) -> Result<FetchedArtifact> {
        self.fetch_with_progress(version, |_downloaded, _total| {})
    }

    pub fn fetch_with_progress<F>(&self, version: &Version, progress: F) -> Result<FetchedArtifact>
    where
        F: FnMut(u64, Option<u64>),
    {
        let manifest = self.fetch_manifest(version)?;
        let url = self.artifact_url(version, &manifest.artifact);
        let bytes = self.download_bytes(&url, progress)?;
        debug!("downloaded {} bytes from {url}", bytes.len());
        Ok(FetchedArtifact { manifest, bytes })
    }

    /// Fetch and verify; a digest mismatch discards the bytes and fails
    /// the attempt without retrying.
    pub fn fetch_verified(&self, version: &Version) -> Result<VerifiedArtifact> {
        self.fetch_verified_with_progress(version, |_downloaded, _total| {})
    }

    pub fn fetch_verified_with_progress<F>(
        &self,
        version: &Version,
        progress: F,
    ) -> Result<VerifiedArtifact>
    where
        F: FnMut(u64, Option<u64>),
    {
        let fetched = self.fetch_with_progress(version, progress)?;
        VerifiedArtifact::verify(fetched.manifest, fetched.bytes)
    }

    fn download_manifest(&self, url: &str) -> Result<ReleaseManifest> {
        let bytes = self.download_bytes(url, |_downloaded, _total| {})?;
        let raw = String::from_utf8(bytes)
            .map_err(|_| Error::integrity(url, "release manifest is not valid UTF-8"))?;
        let manifest = ReleaseManifest::from_toml_str(&raw)
            .map_err(|err| Error::integrity(url, format!("{err:#}")))?;
        self.check_signature(url, &manifest)?;
        Ok(manifest)
    }

    fn check_signature(&self, url: &str, manifest: &ReleaseManifest) -> Result<()> {
        let Some(key) = &self.trusted_key else {
            return Ok(());
        };
        let signature = manifest
            .signature
            .as_deref()
            .ok_or_else(|| Error::integrity(url, "release manifest is not signed"))?;
        let verified = key
            .verify(manifest.signed_payload().as_bytes(), signature)
            .map_err(|err| Error::integrity(url, format!("{err:#}")))?;
        if !verified {
            return Err(Error::integrity(
                url,
                "release manifest signature does not match the trusted key",
            ));
        }
        Ok(())
    }

    fn download_bytes<F>(&self, url: &str, mut progress: F) -> Result<Vec<u8>>
    where
        F: FnMut(u64, Option<u64>),
    {
        debug!("GET {url}");
        let operation = || format!("downloading {url}");
        let mut response: Response = self
            .client
            .get(url)
            .send()
            .and_then(Response::error_for_status)
            .map_err(|err| Error::network(operation(), err))?;

        let total = response.content_length();
        let mut bytes = Vec::with_capacity(total.unwrap_or(0).min(64 * 1024 * 1024) as usize);
        let mut chunk = vec![0_u8; READ_CHUNK];
        loop {
            let read = response
                .read(&mut chunk)
                .map_err(|err| Error::network(operation(), err))?;
            if read == 0 {
                break;
            }
            bytes.extend_from_slice(&chunk[..read]);
            progress(bytes.len() as u64, total);
        }

        if let Some(expected) = total {
            if bytes.len() as u64 != expected {
                return Err(Error::network(
                    operation(),
                    anyhow!("connection closed after {} of {expected} bytes", bytes.len()),
                ));
            }
        }
        progress(bytes.len() as u64, total);
        Ok(bytes)
    }
}
