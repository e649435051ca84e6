use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};

use crate::fs_utils::{path_exists, remove_path_if_exists, sibling_path};

/// How the live payload looked before a swap, and so how to put it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RetiredPayload {
    /// The live path was a symlink to `previous_target`, which is untouched.
    Symlink { previous_target: PathBuf },
    /// Directory install renamed aside to `retired`, where symlinks are
    /// unavailable.
    #[cfg(not(unix))]
    Directory { retired: PathBuf },
    /// Nothing was live.
    Absent,
}

impl RetiredPayload {
    /// Directory holding the pre-swap payload, if any.
    pub(crate) fn payload_dir(&self) -> Option<&Path> {
        match self {
            Self::Symlink { previous_target } => Some(previous_target),
            #[cfg(not(unix))]
            Self::Directory { retired } => Some(retired),
            Self::Absent => None,
        }
    }
}

fn live_metadata(live: &Path) -> Result<Option<fs::Metadata>> {
    match fs::symlink_metadata(live) {
        Ok(metadata) => Ok(Some(metadata)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to stat {}", live.display())),
    }
}

/// The directory that will hold the current payload once
/// [`swap_live_payload`] has run, so a crash mid-swap can be undone.
pub(crate) fn previous_release(live: &Path, adopt_slot: &Path) -> Result<Option<PathBuf>> {
    match live_metadata(live)? {
        None => Ok(None),
        Some(metadata) if metadata.file_type().is_symlink() => {
            let target = fs::read_link(live)
                .with_context(|| format!("failed to read symlink {}", live.display()))?;
            match live.parent() {
                Some(parent) if target.is_relative() => Ok(Some(parent.join(target))),
                _ => Ok(Some(target)),
            }
        }
        Some(metadata) if metadata.is_dir() => Ok(Some(adopt_slot.to_path_buf())),
        Some(_) => Ok(None),
    }
}

/// Repoints `live` at `new_release` with a single rename.
///
/// A symlinked payload is flipped by renaming a fresh symlink over it. A
/// plain directory is first adopted into `adopt_slot` under a symlink, once,
/// and then flipped the same way.
pub(crate) fn swap_live_payload(
    live: &Path,
    new_release: &Path,
    adopt_slot: &Path,
) -> Result<RetiredPayload> {
    match live_metadata(live)? {
        None => {
            install_release(live, new_release)?;
            Ok(RetiredPayload::Absent)
        }
        Some(metadata) if metadata.file_type().is_symlink() => {
            let previous_target = fs::read_link(live)
                .with_context(|| format!("failed to read symlink {}", live.display()))?;
            point_symlink(live, new_release)?;
            debug!(
                "flipped {} from {} to {}",
                live.display(),
                previous_target.display(),
                new_release.display()
            );
            Ok(RetiredPayload::Symlink { previous_target })
        }
        Some(metadata) if metadata.is_dir() => swap_directory(live, new_release, adopt_slot),
        Some(_) => Err(anyhow!(
            "live payload path is neither a directory nor a symlink: {}",
            live.display()
        )),
    }
}

#[cfg(unix)]
fn swap_directory(live: &Path, new_release: &Path, adopt_slot: &Path) -> Result<RetiredPayload> {
    adopt_directory(live, adopt_slot)?;
    point_symlink(live, new_release)?;
    Ok(RetiredPayload::Symlink {
        previous_target: adopt_slot.to_path_buf(),
    })
}

/// Turns a plain-directory payload into a release that `live` links to.
#[cfg(unix)]
fn adopt_directory(live: &Path, adopted: &Path) -> Result<()> {
    if path_exists(adopted) {
        return Err(anyhow!("adopted release slot already exists: {}", adopted.display()));
    }
    fs::rename(live, adopted).with_context(|| {
        format!(
            "failed to move {} to {}",
            live.display(),
            adopted.display()
        )
    })?;
    if let Err(err) = point_symlink(live, adopted) {
        undo_rename(adopted, live);
        return Err(err);
    }
    info!(
        "converted directory install {} into release {}",
        live.display(),
        adopted.display()
    );
    Ok(())
}

#[cfg(not(unix))]
fn swap_directory(live: &Path, new_release: &Path, retired_slot: &Path) -> Result<RetiredPayload> {
    if path_exists(retired_slot) {
        return Err(anyhow!("retired payload slot already exists: {}", retired_slot.display()));
    }
    fs::rename(live, retired_slot).with_context(|| {
        format!(
            "failed to move {} aside to {}",
            live.display(),
            retired_slot.display()
        )
    })?;
    if let Err(err) = fs::rename(new_release, live) {
        undo_rename(retired_slot, live);
        return Err(err).with_context(|| {
            format!(
                "failed to move {} into {}",
                new_release.display(),
                live.display()
            )
        });
    }
    Ok(RetiredPayload::Directory {
        retired: retired_slot.to_path_buf(),
    })
}

fn undo_rename(moved: &Path, original: &Path) {
    if let Err(err) = fs::rename(moved, original) {
        warn!(
            "failed to move {} back to {}: {err}; the previous payload is kept there",
            moved.display(),
            original.display()
        );
    }
}

/// Undoes [`swap_live_payload`], dropping whatever is live now.
pub(crate) fn restore_live_payload(live: &Path, retired: &RetiredPayload) -> Result<()> {
    match retired {
        RetiredPayload::Symlink { previous_target } => point_symlink(live, previous_target),
        #[cfg(not(unix))]
        RetiredPayload::Directory { retired } => reinstate_release(live, retired),
        RetiredPayload::Absent => remove_path_if_exists(live),
    }
}

/// Makes `previous` live again after an interrupted transaction.
pub(crate) fn reinstate_release(live: &Path, previous: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        point_symlink(live, previous)
    }
    #[cfg(not(unix))]
    {
        remove_path_if_exists(live)?;
        fs::rename(previous, live).with_context(|| {
            format!(
                "failed to move {} back to {}",
                previous.display(),
                live.display()
            )
        })
    }
}

/// Makes `release` the live payload when nothing is live yet.
pub(crate) fn install_release(live: &Path, release: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        point_symlink(live, release)
    }
    #[cfg(not(unix))]
    {
        fs::rename(release, live).with_context(|| {
            format!(
                "failed to move {} into {}",
                release.display(),
                live.display()
            )
        })
    }
}

#[cfg(unix)]
fn point_symlink(live: &Path, target: &Path) -> Result<()> {
    let tmp = sibling_path(live, "swap");
    remove_path_if_exists(&tmp)?;
    std::os::unix::fs::symlink(target, &tmp).with_context(|| {
        format!(
            "failed to create symlink {} -> {}",
            tmp.display(),
            target.display()
        )
    })?;
    if let Err(err) = fs::rename(&tmp, live) {
        let _ = fs::remove_file(&tmp);
        return Err(err).with_context(|| format!("failed to repoint {}", live.display()));
    }
    Ok(())
}

#[cfg(not(unix))]
fn point_symlink(live: &Path, _target: &Path) -> Result<()> {
    Err(anyhow!("symlinked payloads are not supported on this platform: {}", live.display()))
}
