//! Time-boxed memo of the newest published version.
//!
//! The remote query is expensive and rate limited, so the dispatcher asks it
//! at most once per [`VERSION_CACHE_TTL_HOURS`]. Anything wrong with the cache
//! file (missing, corrupt, stale) reads as "no entry" and simply triggers a
//! fresh query.

use std::fs;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use memoria_core::{Result, Version};
use serde::{Deserialize, Serialize};

use crate::fs_utils::write_file_atomic;

pub const VERSION_CACHE_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionCacheEntry {
    #[serde(rename = "latest_version")]
    pub latest_known: Version,
    pub checked_at: DateTime<Utc>,
    #[serde(rename = "current_version")]
    pub installed_at_check: Version,
    #[serde(default = "default_ttl_hours")]
    pub cache_ttl_hours: i64,
    #[serde(default)]
    pub update_available: bool,
    #[serde(default)]
    pub notification_shown: bool,
    /// Why the most recent query failed, cleared by the next success.
    #[serde(default)]
    pub check_error: Option<String>,
}

fn default_ttl_hours() -> i64 {
    VERSION_CACHE_TTL_HOURS
}

impl VersionCacheEntry {
    pub fn new(latest: Version, installed: Version, checked_at: DateTime<Utc>) -> Self {
        Self {
            update_available: latest.is_newer_than(&installed),
            latest_known: latest,
            checked_at,
            installed_at_check: installed,
            cache_ttl_hours: VERSION_CACHE_TTL_HOURS,
            notification_shown: false,
            check_error: None,
        }
    }

    /// A `checked_at` in the future (clock skew) counts as fresh.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.checked_at) <= Duration::hours(VERSION_CACHE_TTL_HOURS)
    }
}

pub fn read_version_cache(path: &Path) -> Option<VersionCacheEntry> {
    read_version_cache_at(path, Utc::now())
}

fn load_entry(path: &Path) -> Option<VersionCacheEntry> {
    let raw = fs::read_to_string(path).ok()?;
    match serde_json::from_str::<VersionCacheEntry>(&raw) {
        Ok(entry) => Some(entry),
        Err(err) => {
            debug!("ignoring unreadable version cache {}: {err}", path.display());
            None
        }
    }
}

pub fn read_version_cache_at(path: &Path, now: DateTime<Utc>) -> Option<VersionCacheEntry> {
    let entry = load_entry(path)?;
    if !entry.is_fresh_at(now) {
        debug!(
            "version cache {} is stale (checked at {})",
            path.display(),
            entry.checked_at
        );
        return None;
    }
    Some(entry)
}

/// The latest known version, or `None` when the cache is absent or stale.
pub fn read_cached_latest(path: &Path) -> Option<Version> {
    read_version_cache(path).map(|entry| entry.latest_known)
}

pub fn write_version_cache(
    path: &Path,
    latest: &Version,
    current_installed: &Version,
) -> Result<VersionCacheEntry> {
    write_version_cache_at(path, latest, current_installed, Utc::now())
}

pub fn write_version_cache_at(
    path: &Path,
    latest: &Version,
    current_installed: &Version,
    now: DateTime<Utc>,
) -> Result<VersionCacheEntry> {
    let entry = VersionCacheEntry::new(latest.clone(), current_installed.clone(), now);
    store_entry(path, &entry)?;
    Ok(entry)
}

/// Version the operator has not been told about yet, if any.
pub fn pending_update_notice(path: &Path) -> Option<Version> {
    let entry = read_version_cache(path)?;
    (entry.update_available && !entry.notification_shown).then_some(entry.latest_known)
}

/// Records that this cycle's update notice was shown. A missing or stale
/// cache is left alone.
pub fn mark_notification_shown(path: &Path) -> Result<()> {
    let Some(mut entry) = read_version_cache(path) else {
        return Ok(());
    };
    entry.notification_shown = true;
    store_entry(path, &entry)
}

/// Notes a failed latest-version query on the existing entry without
/// touching `checked_at`, so the next run still retries on schedule. Without
/// a readable cache there is nothing to annotate.
pub fn record_check_error(path: &Path, message: &str) -> Result<()> {
    let Some(mut entry) = load_entry(path) else {
        return Ok(());
    };
    entry.check_error = Some(message.to_string());
    store_entry(path, &entry)
}

fn store_entry(path: &Path, entry: &VersionCacheEntry) -> Result<()> {
    let content = serde_json::to_string_pretty(entry).context("failed to encode version cache")?;
    write_file_atomic(path, format!("{content}\n").as_bytes())
        .with_context(|| format!("failed to write version cache: {}", path.display()))?;
    Ok(())
}
