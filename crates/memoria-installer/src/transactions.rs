use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context};
use chrono::{SubsecRound, Utc};
use fs4::FileExt;
use log::{debug, error, info, warn};
use memoria_core::{ApplyStage, Error, Result, Version};
use memoria_release::VerifiedArtifact;

use crate::fs_utils::{
    copy_dir_recursive, path_exists, remove_path_if_exists, write_file_atomic,
};
use crate::gate::ApplyHooks;
use crate::record::write_installation_record;
use crate::swap::{
    previous_release, reinstate_release, restore_live_payload, swap_live_payload, RetiredPayload,
};
use crate::{
    InstallLayout, InstallMethod, InstallationRecord, SweepReport, TransactionJournalEntry,
    TransactionMetadata, UpdateOutcome, UpdateState,
};

const METADATA_VERSION: u32 = 1;
const BACKUP_COMPLETE_MARKER: &str = ".complete";
const BACKUP_PAYLOAD_DIR: &str = "app";
const BACKUP_ENV_DIR: &str = "env";

/// Single-writer lock over an install root.
///
/// An exclusive OS lock on `state/transactions/active`, held for the lifetime
/// of the value. The kernel drops it when the process dies, so a crashed run
/// never locks out the next one; the file itself is left in place.
#[derive(Debug)]
pub struct UpdateLock {
    path: PathBuf,
    file: File,
}

impl UpdateLock {
    pub fn acquire(layout: &InstallLayout, operation: &str) -> Result<Self> {
        let path = layout.transaction_lock_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("failed to open lock file: {}", path.display()))?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                let holder = UpdateLock::holder(layout).unwrap_or_else(|err| {
                    debug!("could not read lock holder: {err:#}");
                    None
                });
                return Err(Error::Locked { path, holder });
            }
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("failed to lock {}", path.display()))
                    .into());
            }
        }

        let holder = format!("{operation} pid={}\n", std::process::id());
        file.set_len(0)
            .and_then(|()| file.write_all(holder.as_bytes()))
            .and_then(|()| file.flush())
            .with_context(|| format!("failed to write lock file: {}", path.display()))?;
        debug!("acquired {} for {operation}", path.display());
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Who holds the lock, as written by [`UpdateLock::acquire`]; `None` once
    /// it has been released.
    pub fn holder(layout: &InstallLayout) -> anyhow::Result<Option<String>> {
        let path = layout.transaction_lock_path();
        match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => Ok(None),
            Ok(raw) => Ok(Some(raw.trim().to_string())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("failed to read lock file: {}", path.display()))
            }
        }
    }
}

impl Drop for UpdateLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.set_len(0) {
            warn!("failed to clear lock file {}: {err}", self.path.display());
        }
        if let Err(err) = FileExt::unlock(&self.file) {
            warn!("failed to release lock {}: {err}", self.path.display());
        }
    }
}

pub fn write_transaction_metadata(
    layout: &InstallLayout,
    metadata: &TransactionMetadata,
) -> anyhow::Result<PathBuf> {
    let path = layout.transaction_metadata_path(&metadata.txid);
    let content =
        serde_json::to_string_pretty(metadata).context("failed to encode transaction metadata")?;
    write_file_atomic(&path, format!("{content}\n").as_bytes()).with_context(|| {
        format!(
            "failed to write transaction metadata file: {}",
            path.display()
        )
    })?;
    Ok(path)
}

pub fn read_transaction_metadata(
    layout: &InstallLayout,
    txid: &str,
) -> anyhow::Result<Option<TransactionMetadata>> {
    let path = layout.transaction_metadata_path(txid);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| {
                format!(
                    "failed to read transaction metadata file: {}",
                    path.display()
                )
            });
        }
    };
    let metadata = serde_json::from_str(&raw).with_context(|| {
        format!(
            "failed parsing transaction metadata file: {}",
            path.display()
        )
    })?;
    Ok(Some(metadata))
}

pub fn append_transaction_journal_entry(
    layout: &InstallLayout,
    txid: &str,
    entry: &TransactionJournalEntry,
) -> anyhow::Result<PathBuf> {
    let path = layout.transaction_journal_path(txid);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let line = serde_json::to_string(entry).context("failed to encode journal entry")?;
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open transaction journal: {}", path.display()))?;
    file.write_all(format!("{line}\n").as_bytes())
        .with_context(|| format!("failed to append transaction journal: {}", path.display()))?;
    file.flush()
        .with_context(|| format!("failed to flush transaction journal: {}", path.display()))?;
    Ok(path)
}

pub fn read_transaction_journal(
    layout: &InstallLayout,
    txid: &str,
) -> anyhow::Result<Vec<TransactionJournalEntry>> {
    let path = layout.transaction_journal_path(txid);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| {
                format!("failed to read transaction journal: {}", path.display())
            });
        }
    };
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).with_context(|| {
                format!("invalid journal line in {}: {line}", path.display())
            })
        })
        .collect()
}

pub fn current_unix_timestamp() -> anyhow::Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system time is before unix epoch")?
        .as_secs())
}

struct Transaction {
    layout: InstallLayout,
    metadata: TransactionMetadata,
    seq: u64,
}

impl Transaction {
    fn begin(
        layout: &InstallLayout,
        operation: &str,
        from: Option<&Version>,
        to: &Version,
    ) -> Result<Self> {
        let started_at_unix = current_unix_timestamp()?;
        let pid = std::process::id();
        let mut txid = format!("tx-{started_at_unix}-{pid}");
        let mut attempt = 1;
        while path_exists(&layout.transaction_metadata_path(&txid))
            || path_exists(&layout.release_dir(&txid))
        {
            attempt += 1;
            txid = format!("tx-{started_at_unix}-{pid}-{attempt}");
        }

        let metadata = TransactionMetadata {
            version: METADATA_VERSION,
            txid,
            operation: operation.to_string(),
            status: "staging".to_string(),
            started_at_unix,
            from_version: from.map(ToString::to_string),
            to_version: Some(to.to_string()),
            previous_target: None,
        };
        write_transaction_metadata(layout, &metadata)?;
        Ok(Self {
            layout: layout.clone(),
            metadata,
            seq: 0,
        })
    }

    fn txid(&self) -> &str {
        &self.metadata.txid
    }

    fn operation(&self) -> &str {
        &self.metadata.operation
    }

    fn set_status(&mut self, status: &str) {
        self.metadata.status = status.to_string();
        if let Err(err) = write_transaction_metadata(&self.layout, &self.metadata) {
            warn!(
                "failed to record status {status} for {}: {err:#}",
                self.metadata.txid
            );
        }
    }

    fn journal(&mut self, step: &str, state: &str, path: Option<&Path>) {
        self.seq += 1;
        let entry = TransactionJournalEntry {
            seq: self.seq,
            step: step.to_string(),
            state: state.to_string(),
            path: path.map(|path| path.display().to_string()),
        };
        if let Err(err) = append_transaction_journal_entry(&self.layout, self.txid(), &entry) {
            warn!("failed to journal {step} for {}: {err:#}", self.txid());
        }
    }
}

struct StageFailure {
    stage: ApplyStage,
    source: anyhow::Error,
}

fn at(stage: ApplyStage) -> impl FnOnce(anyhow::Error) -> StageFailure {
    move |source| StageFailure { stage, source }
}

/// Drives one install or update from a verified artifact to a verified
/// installation, or back to the previous one.
///
/// Callers must hold an [`UpdateLock`] for the same root.
pub struct UpdateCoordinator<H: ApplyHooks> {
    layout: InstallLayout,
    hooks: H,
    state: UpdateState,
}

impl<H: ApplyHooks> UpdateCoordinator<H> {
    pub fn new(layout: InstallLayout, hooks: H) -> Self {
        Self {
            layout,
            hooks,
            state: UpdateState::Idle,
        }
    }

    pub fn state(&self) -> UpdateState {
        self.state
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn update(
        &mut self,
        current: &InstallationRecord,
        artifact: VerifiedArtifact,
    ) -> Result<UpdateOutcome> {
        self.run("update", Some(current), artifact)
    }

    /// First installation; a failure leaves nothing live behind.
    pub fn install(&mut self, artifact: VerifiedArtifact) -> Result<UpdateOutcome> {
        self.run("install", None, artifact)
    }

    fn run(
        &mut self,
        operation: &str,
        current: Option<&InstallationRecord>,
        artifact: VerifiedArtifact,
    ) -> Result<UpdateOutcome> {
        self.state = UpdateState::Idle;
        self.layout.ensure_base_dirs()?;

        let previous_version = current.map(|record| record.version.clone());
        let mut tx = Transaction::begin(
            &self.layout,
            operation,
            previous_version.as_ref(),
            artifact.version(),
        )?;
        info!(
            "{operation} to {} started (txid={})",
            artifact.version(),
            tx.txid()
        );

        let staged = match self.stage(&mut tx, &artifact) {
            Ok(staged) => staged,
            Err(source) => return Err(self.abort_before_apply(&mut tx, ApplyStage::Stage, source)),
        };
        self.state = UpdateState::Staged;

        tx.set_status("backing_up");
        let backup = match self.backup(&mut tx) {
            Ok(backup) => backup,
            Err(source) => {
                return Err(self.abort_before_apply(&mut tx, ApplyStage::Backup, source));
            }
        };

        let release = self.layout.release_dir(tx.txid());
        let mut retired = None;
        if let Err(failure) = self.apply(&mut tx, &staged, &release, &mut retired) {
            return Err(self.roll_back(&mut tx, retired.as_ref(), &release, &backup, failure));
        }

        tx.set_status("committing");
        let record = InstallationRecord {
            version: artifact.version().clone(),
            install_path: self.layout.root().to_path_buf(),
            payload_path: self.layout.payload_dir(),
            dependency_env_path: self.layout.dependency_env_dir(),
            install_method: InstallMethod::Archive,
            installed_at: Utc::now().trunc_subsecs(0),
            source_revision: artifact.manifest().source_revision.clone(),
        };
        if let Err(source) = write_installation_record(&self.layout, &record) {
            let failure = StageFailure {
                stage: ApplyStage::Record,
                source,
            };
            return Err(self.roll_back(&mut tx, retired.as_ref(), &release, &backup, failure));
        }
        tx.journal("record", "done", Some(&self.layout.record_path()));

        self.state = UpdateState::Verified;
        tx.set_status("committed");
        self.clean_up_after_commit(&mut tx, retired.as_ref(), &backup);
        info!(
            "{operation} to {} verified (txid={})",
            record.version,
            tx.txid()
        );

        Ok(UpdateOutcome {
            txid: tx.txid().to_string(),
            state: self.state,
            previous_version,
            record,
        })
    }

    fn stage(
        &self,
        tx: &mut Transaction,
        artifact: &VerifiedArtifact,
    ) -> anyhow::Result<PathBuf> {
        let dir = self.layout.transaction_staging_path(tx.txid());
        remove_path_if_exists(&dir)?;
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

        let archive = dir.join(artifact.file_name());
        fs::write(&archive, artifact.bytes())
            .with_context(|| format!("failed to write {}", archive.display()))?;
        tx.journal("stage_artifact", "done", Some(&archive));

        let payload = dir.join("payload");
        fs::create_dir_all(&payload)
            .with_context(|| format!("failed to create {}", payload.display()))?;
        self.hooks
            .unpack(&archive, &payload)
            .with_context(|| format!("failed to unpack {}", archive.display()))?;
        if fs::read_dir(&payload)
            .with_context(|| format!("failed to read {}", payload.display()))?
            .next()
            .is_none()
        {
            return Err(anyhow!("{} unpacked to an empty payload", artifact.file_name()));
        }
        tx.journal("unpack", "done", Some(&payload));
        debug!("staged {} at {}", artifact.version(), payload.display());
        Ok(payload)
    }

    fn backup(&self, tx: &mut Transaction) -> anyhow::Result<PathBuf> {
        let backup = self.layout.transaction_backup_path(tx.txid());
        remove_path_if_exists(&backup)?;
        fs::create_dir_all(&backup)
            .with_context(|| format!("failed to create {}", backup.display()))?;

        let live = self.layout.payload_dir();
        if path_exists(&live) {
            copy_dir_recursive(&live, &backup.join(BACKUP_PAYLOAD_DIR))?;
        }
        let env = self.layout.dependency_env_dir();
        if path_exists(&env) {
            copy_dir_recursive(&env, &backup.join(BACKUP_ENV_DIR))?;
        }
        let marker = backup.join(BACKUP_COMPLETE_MARKER);
        fs::write(&marker, format!("{}\n", tx.txid()))
            .with_context(|| format!("failed to write {}", marker.display()))?;
        tx.journal("backup", "done", Some(&backup));
        Ok(backup)
    }

    fn apply(
        &mut self,
        tx: &mut Transaction,
        staged: &Path,
        release: &Path,
        retired: &mut Option<RetiredPayload>,
    ) -> std::result::Result<(), StageFailure> {
        let live = self.layout.payload_dir();
        let env = self.layout.dependency_env_dir();
        let adopt_slot = self.layout.adopted_release_path(tx.txid());

        tx.metadata.previous_target = previous_release(&live, &adopt_slot)
            .map_err(at(ApplyStage::Swap))?
            .map(|path| path.display().to_string());
        tx.set_status("applying");

        fs::rename(staged, release)
            .with_context(|| {
                format!(
                    "failed to move {} to {}",
                    staged.display(),
                    release.display()
                )
            })
            .map_err(at(ApplyStage::Swap))?;
        let swapped =
            swap_live_payload(&live, release, &adopt_slot).map_err(at(ApplyStage::Swap))?;
        *retired = Some(swapped);
        self.state = UpdateState::Applied;
        tx.journal("swap", "done", Some(&live));
        info!("live payload now points at {}", release.display());

        remove_path_if_exists(&env).map_err(at(ApplyStage::Dependencies))?;
        self.hooks
            .install_dependencies(&live, &env)
            .map_err(at(ApplyStage::Dependencies))?;
        tx.journal("dependencies", "done", Some(&env));

        tx.set_status("verifying");
        self.hooks
            .install_dependencies(&live, &env)
            .map_err(at(ApplyStage::HealthGate))?;
        self.hooks
            .probe_health()
            .map_err(at(ApplyStage::HealthGate))?;
        tx.journal("health_gate", "done", None);
        Ok(())
    }

    fn abort_before_apply(
        &mut self,
        tx: &mut Transaction,
        stage: ApplyStage,
        source: anyhow::Error,
    ) -> Error {
        warn!(
            "{} {} failed during {}: {source:#}",
            tx.operation(),
            tx.txid(),
            stage.as_str()
        );
        for path in [
            self.layout.transaction_staging_path(tx.txid()),
            self.layout.transaction_backup_path(tx.txid()),
        ] {
            discard(&path);
        }
        tx.set_status("failed");
        self.state = UpdateState::Idle;
        Error::Apply {
            operation: tx.operation().to_string(),
            stage,
            restored: Vec::new(),
            source,
        }
    }

    fn roll_back(
        &mut self,
        tx: &mut Transaction,
        retired: Option<&RetiredPayload>,
        release: &Path,
        backup: &Path,
        failure: StageFailure,
    ) -> Error {
        let StageFailure { stage, source } = failure;
        warn!(
            "{} {} failed during {}: {source:#}; rolling back",
            tx.operation(),
            tx.txid(),
            stage.as_str()
        );
        tx.set_status("rolling_back");

        let mut restored = Vec::new();
        if let Err(restore_err) = self.restore(retired, backup, &mut restored) {
            error!(
                "rollback of {} failed: {restore_err:#}; backup kept at {}",
                tx.txid(),
                backup.display()
            );
            tx.journal("rollback", "failed", Some(backup));
            tx.set_status("rollback_failed");
            return Error::Rollback {
                backup: backup.to_path_buf(),
                apply_cause: format!("{source:#}"),
                source: restore_err,
            };
        }

        for path in [
            release.to_path_buf(),
            self.layout.transaction_staging_path(tx.txid()),
            backup.to_path_buf(),
        ] {
            discard(&path);
        }
        tx.journal("rollback", "done", None);
        tx.set_status("rolled_back");
        self.state = UpdateState::RolledBack;
        info!("{} rolled back; restored {} path(s)", tx.txid(), restored.len());

        Error::Apply {
            operation: tx.operation().to_string(),
            stage,
            restored,
            source,
        }
    }

    fn restore(
        &self,
        retired: Option<&RetiredPayload>,
        backup: &Path,
        restored: &mut Vec<PathBuf>,
    ) -> anyhow::Result<()> {
        let live = self.layout.payload_dir();
        let backup_payload = backup.join(BACKUP_PAYLOAD_DIR);

        let pointer_restored = match retired {
            Some(retired) => match restore_live_payload(&live, retired) {
                Ok(()) => true,
                Err(err) => {
                    warn!(
                        "failed to repoint {}: {err:#}; restoring from backup copy",
                        live.display()
                    );
                    false
                }
            },
            None => path_exists(&live) || !path_exists(&backup_payload),
        };
        if !pointer_restored {
            if !path_exists(&backup_payload) {
                return Err(anyhow!(
                    "no backup copy of the live payload at {}",
                    backup_payload.display()
                ));
            }
            remove_path_if_exists(&live)?;
            copy_dir_recursive(&backup_payload, &live)?;
        }
        if retired.is_some() || !pointer_restored {
            restored.push(live);
        }

        let env = self.layout.dependency_env_dir();
        let backup_env = backup.join(BACKUP_ENV_DIR);
        remove_path_if_exists(&env)?;
        if path_exists(&backup_env) {
            copy_dir_recursive(&backup_env, &env)?;
        }
        restored.push(env);
        Ok(())
    }

    fn clean_up_after_commit(
        &self,
        tx: &mut Transaction,
        retired: Option<&RetiredPayload>,
        backup: &Path,
    ) {
        discard(backup);
        discard(&self.layout.transaction_staging_path(tx.txid()));
        if let Some(previous) = retired.and_then(RetiredPayload::payload_dir) {
            if previous.starts_with(self.layout.releases_dir()) {
                discard(previous);
            }
        }
        tx.journal("cleanup", "done", None);
    }
}

fn discard(path: &Path) {
    if let Err(err) = remove_path_if_exists(path) {
        warn!("failed to clean up {}: {err:#}", path.display());
    }
}

/// Recovers or discards what crashed runs left behind.
///
/// Requires the caller's lock, so nothing found here can belong to a live
/// transaction. Interrupted applies with a complete backup are restored from
/// it; every staging and backup directory is then removed, as is any release
/// the live payload does not point at.
pub fn sweep_stale_transactions(
    layout: &InstallLayout,
    lock: &UpdateLock,
    record: Option<&InstallationRecord>,
) -> Result<SweepReport> {
    debug!(
        "sweeping stale transactions (lock {})",
        lock.path().display()
    );
    let mut report = SweepReport::default();

    for mut metadata in list_transaction_metadata(layout)? {
        let status = metadata.status.clone();
        match status.as_str() {
            "committed" | "rolled_back" | "failed" => continue,
            "committing"
                if record.is_some_and(|record| {
                    metadata.to_version.as_deref() == Some(record.version.to_string().as_str())
                }) =>
            {
                metadata.status = "committed".to_string();
            }
            "applying" | "verifying" | "committing" | "rolling_back" | "rollback_failed"
                if backup_is_complete(layout, &metadata.txid) =>
            {
                restore_interrupted(layout, &metadata)?;
                warn!(
                    "recovered interrupted {} {} from its backup",
                    metadata.operation, metadata.txid
                );
                report.recovered.push(metadata.txid.clone());
                metadata.status = "rolled_back".to_string();
            }
            _ => metadata.status = "failed".to_string(),
        }
        write_transaction_metadata(layout, &metadata)?;
    }

    for dir in [layout.staging_dir(), layout.backups_dir()] {
        for entry in list_dir(&dir)? {
            remove_path_if_exists(&entry)?;
            report.removed.push(entry);
        }
    }

    let live_target = fs::read_link(layout.payload_dir()).ok();
    for entry in list_dir(&layout.releases_dir())? {
        if live_target.as_deref() == Some(entry.as_path()) {
            continue;
        }
        remove_path_if_exists(&entry)?;
        report.removed.push(entry);
    }

    if !report.recovered.is_empty() || !report.removed.is_empty() {
        info!(
            "swept {} stale path(s), recovered {} transaction(s)",
            report.removed.len(),
            report.recovered.len()
        );
    }
    Ok(report)
}

fn backup_is_complete(layout: &InstallLayout, txid: &str) -> bool {
    layout
        .transaction_backup_path(txid)
        .join(BACKUP_COMPLETE_MARKER)
        .is_file()
}

/// Puts back what an interrupted transaction replaced. The live payload is
/// repointed at the release recorded before the swap when it still exists,
/// and copied back from the backup otherwise.
fn restore_interrupted(
    layout: &InstallLayout,
    metadata: &TransactionMetadata,
) -> anyhow::Result<()> {
    let backup = layout.transaction_backup_path(&metadata.txid);
    let live = layout.payload_dir();
    match metadata.previous_target.as_deref().map(Path::new) {
        Some(previous) if previous.is_dir() => reinstate_release(&live, previous)?,
        _ => {
            let saved = backup.join(BACKUP_PAYLOAD_DIR);
            remove_path_if_exists(&live)?;
            if path_exists(&saved) {
                copy_dir_recursive(&saved, &live)?;
            }
        }
    }

    let env = layout.dependency_env_dir();
    let saved_env = backup.join(BACKUP_ENV_DIR);
    remove_path_if_exists(&env)?;
    if path_exists(&saved_env) {
        copy_dir_recursive(&saved_env, &env)?;
    }
    Ok(())
}

fn list_transaction_metadata(layout: &InstallLayout) -> anyhow::Result<Vec<TransactionMetadata>> {
    let mut found = Vec::new();
    for path in list_dir(&layout.transactions_dir())? {
        let Some(txid) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_suffix(".json"))
        else {
            continue;
        };
        match read_transaction_metadata(layout, txid) {
            Ok(Some(metadata)) => found.push(metadata),
            Ok(None) => {}
            Err(err) => warn!("skipping unreadable transaction metadata: {err:#}"),
        }
    }
    found.sort_by_key(|metadata| metadata.started_at_unix);
    Ok(found)
}

fn list_dir(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", dir.display()));
        }
    };
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read {}", dir.display()))?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}
