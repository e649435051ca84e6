mod container;
mod deps;
mod fs_utils;
mod gate;
mod layout;
mod process;
mod record;
mod shell_hook;
mod swap;
mod transactions;
mod types;
mod uninstall;
mod version_cache;

pub use container::{
    ContainerLifecycle, ContainerRuntime, ContainerSpec, ContainerState, DockerCli,
    DEFAULT_PROBE_INTERVAL,
};
pub use deps::DependencyInstaller;
pub use gate::{ApplyHooks, SystemGate};
pub use layout::{default_install_root, InstallLayout};
pub use process::{run_checked, run_with_timeout, CommandOutput};
pub use record::{read_installation_record, write_installation_record};
pub use shell_hook::{
    add_shell_hook, hook_line, remove_shell_hook, startup_files_for, validate_hook_target,
    write_env_script, HookChange, HOOK_MARKER,
};
pub use transactions::{
    append_transaction_journal_entry, current_unix_timestamp, read_transaction_journal,
    read_transaction_metadata, sweep_stale_transactions, write_transaction_metadata,
    UpdateCoordinator, UpdateLock,
};
pub use types::{
    InstallMethod, InstallationRecord, SweepReport, TransactionJournalEntry, TransactionMetadata,
    UninstallResult, UninstallStatus, UpdateOutcome, UpdateState,
};
pub use uninstall::uninstall_installation;
pub use version_cache::{
    mark_notification_shown, pending_update_notice, read_cached_latest, read_version_cache,
    read_version_cache_at, record_check_error, write_version_cache, write_version_cache_at,
    VersionCacheEntry, VERSION_CACHE_TTL_HOURS,
};
