use std::cell::Cell;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{Duration as ChronoDuration, Utc};
use clap::error::ErrorKind;
use clap::Parser;
use log::LevelFilter;
use memoria_core::{ApplyStage, CommandStep, Error, InstallConfig, Version};
use memoria_installer::{
    read_version_cache, read_version_cache_at, write_version_cache, write_version_cache_at,
};

use crate::dispatch::{
    decide_update, is_affirmative, parse_requested_version, required_tools, resolve_latest,
    UpdateDecision,
};
use crate::exit::{exit_code_for, CliError};
use crate::logging::determine_level;
use crate::render::{render_progress_line, render_status_line, OutputStyle};
use crate::{Cli, Commands};

fn v(raw: &str) -> Version {
    Version::parse(raw).expect("test version must parse")
}

fn apply_error(stage: ApplyStage, source: anyhow::Error) -> CliError {
    CliError::Core(Error::Apply {
        operation: "update".to_string(),
        stage,
        restored: vec![PathBuf::from("/tmp/app")],
        source,
    })
}

#[test]
fn cli_parses_update_with_version_and_refresh() {
    let cli = Cli::try_parse_from(["memoria", "update", "--version", "1.4.0", "--refresh"])
        .expect("must parse");
    match cli.command {
        Commands::Update { target, refresh } => {
            assert_eq!(target.as_deref(), Some("1.4.0"));
            assert!(refresh);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn cli_accepts_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from(["memoria", "check", "--root", "/opt/memoria", "-vv"])
        .expect("must parse");
    assert_eq!(cli.root, Some(PathBuf::from("/opt/memoria")));
    assert_eq!(cli.verbose, 2);
    assert!(matches!(cli.command, Commands::Check { refresh: false }));
}

#[test]
fn cli_uninstall_defaults_to_prompting_and_keeping_data() {
    let cli = Cli::try_parse_from(["memoria", "uninstall"]).expect("must parse");
    assert!(matches!(
        cli.command,
        Commands::Uninstall {
            yes: false,
            purge: false
        }
    ));
}

#[test]
fn cli_rejects_quiet_with_verbose() {
    let err = Cli::try_parse_from(["memoria", "-q", "-v", "version"])
        .expect_err("quiet and verbose must conflict");
    assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
}

#[test]
fn cli_requires_a_subcommand() {
    let err = Cli::try_parse_from(["memoria"]).expect_err("must require subcommand");
    assert!(
        matches!(
            err.kind(),
            ErrorKind::MissingSubcommand | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        ),
        "{:?}",
        err.kind()
    );
}

#[test]
fn exit_codes_follow_error_class() {
    let cases: Vec<(CliError, u8)> = vec![
        (
            CliError::Core(Error::from(
                Version::parse("1.x.0").expect_err("must reject"),
            )),
            8,
        ),
        (
            CliError::Core(Error::ValidationRejected {
                path: "/tmp/a;b".to_string(),
                construct: "';'",
            }),
            8,
        ),
        (
            CliError::Core(Error::network("downloading artifact", anyhow!("reset"))),
            3,
        ),
        (
            CliError::Core(Error::integrity("memoria.tar.gz", "sha256 mismatch")),
            4,
        ),
        (apply_error(ApplyStage::HealthGate, anyhow!("port closed")), 5),
        (apply_error(ApplyStage::Dependencies, anyhow!("pip failed")), 5),
        (apply_error(ApplyStage::Stage, anyhow!("disk full")), 1),
        (
            CliError::Core(Error::Rollback {
                backup: PathBuf::from("/tmp/backup"),
                apply_cause: "health gate".to_string(),
                source: anyhow!("rename failed"),
            }),
            7,
        ),
        (
            CliError::Core(Error::MissingPrerequisite {
                tool: "docker".to_string(),
            }),
            2,
        ),
        (
            CliError::Core(Error::Timeout {
                command: "tar".to_string(),
                timeout: Duration::from_secs(5),
            }),
            1,
        ),
        (
            CliError::Core(Error::Locked {
                path: PathBuf::from("/tmp/active"),
                holder: Some("update pid=41".to_string()),
            }),
            9,
        ),
        (CliError::unhealthy(anyhow!("port closed")), 6),
        (CliError::Refused("refusing to downgrade".to_string()), 1),
        (CliError::from(anyhow!("failed to read record")), 1),
    ];

    for (err, expected) in cases {
        assert_eq!(exit_code_for(&err), expected, "{err}");
    }
}

#[test]
fn apply_failure_caused_by_missing_tool_maps_to_prerequisite_code() {
    let source = anyhow::Error::new(Error::MissingPrerequisite {
        tool: "python3".to_string(),
    })
    .context("dependency step failed");
    let err = apply_error(ApplyStage::Dependencies, source);
    assert_eq!(exit_code_for(&err), 2);
}

#[test]
fn only_rollback_failure_is_fatal() {
    let rollback = CliError::Core(Error::Rollback {
        backup: PathBuf::from("/tmp/backup"),
        apply_cause: "swap".to_string(),
        source: anyhow!("restore failed"),
    });
    assert!(rollback.is_fatal());
    assert!(!apply_error(ApplyStage::Swap, anyhow!("rename")).is_fatal());
    assert!(!CliError::unhealthy(anyhow!("down")).is_fatal());
}

#[test]
fn rolled_back_failure_lists_restored_paths() {
    let err = apply_error(ApplyStage::HealthGate, anyhow!("port closed"));
    assert_eq!(
        err.to_string(),
        "update failed during health-gate and was rolled back (1 path(s) restored)"
    );
    assert_eq!(err.rollback_report(), vec!["restored: /tmp/app"]);
}

#[test]
fn failure_before_apply_says_nothing_changed() {
    let err = CliError::Core(Error::Apply {
        operation: "install".to_string(),
        stage: ApplyStage::Backup,
        restored: Vec::new(),
        source: anyhow!("disk full"),
    });
    assert_eq!(
        err.to_string(),
        "install aborted during backup before anything was applied; nothing changed"
    );
    assert!(err.rollback_report().is_empty());
}

#[test]
fn failed_rollback_points_at_the_kept_backup() {
    let err = CliError::Core(Error::Rollback {
        backup: PathBuf::from("/tmp/backup"),
        apply_cause: "swap".to_string(),
        source: anyhow!("restore failed"),
    });
    assert_eq!(err.rollback_report(), vec!["backup kept at: /tmp/backup"]);
}

#[test]
fn locked_error_names_the_holder() {
    let err = CliError::Core(Error::Locked {
        path: PathBuf::from("/tmp/active"),
        holder: Some("update pid=41".to_string()),
    });
    assert_eq!(
        err.to_string(),
        "another memoria operation is in progress (lock held at /tmp/active by update pid=41)"
    );
}

#[test]
fn render_status_line_plain_is_message_only() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "installed memoria 1.2.0"),
        "installed memoria 1.2.0"
    );
}

#[test]
fn render_status_line_rich_prefixes_badge() {
    assert_eq!(
        render_status_line(OutputStyle::Rich, "ok", "done"),
        "[OK] done"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "warn", "update available"),
        "[WARN] update available"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "skip", "up to date"),
        "[SKIP] up to date"
    );
    assert_eq!(render_status_line(OutputStyle::Rich, "other", "x"), "[..] x");
}

#[test]
fn render_progress_line_is_suppressed_in_plain_mode() {
    assert_eq!(
        render_progress_line(OutputStyle::Plain, "download", 5, Some(10), None),
        None
    );
}

#[test]
fn render_progress_line_reports_percent() {
    let line = render_progress_line(OutputStyle::Rich, "download", 512, Some(1024), None)
        .expect("rich mode renders a line");
    assert!(line.contains(" 50% "), "{line}");
}

#[test]
fn resolve_latest_uses_fresh_cache_without_fetching() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let cache = dir.path().join("version-cache.json");
    write_version_cache(&cache, &v("1.3.0"), &v("1.2.0")).expect("must write cache");

    let latest = resolve_latest(&cache, Some(&v("1.2.0")), false, || {
        panic!("fresh cache must not trigger a fetch")
    })
    .expect("must resolve");
    assert_eq!(latest.version, v("1.3.0"));
    assert!(latest.from_cache);
}

#[test]
fn resolve_latest_refresh_fetches_and_rewrites_cache() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let cache = dir.path().join("version-cache.json");
    write_version_cache(&cache, &v("1.3.0"), &v("1.2.0")).expect("must write cache");

    let calls = Cell::new(0);
    let latest = resolve_latest(&cache, Some(&v("1.2.0")), true, || {
        calls.set(calls.get() + 1);
        Ok(v("1.4.0"))
    })
    .expect("must resolve");
    assert_eq!(calls.get(), 1);
    assert_eq!(latest.version, v("1.4.0"));
    assert!(!latest.from_cache);

    let entry = read_version_cache(&cache).expect("cache must be fresh");
    assert_eq!(entry.latest_known, v("1.4.0"));
    assert!(entry.update_available);
}

#[test]
fn resolve_latest_fetches_when_cache_is_stale() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let cache = dir.path().join("version-cache.json");
    let old = Utc::now() - ChronoDuration::hours(25);
    write_version_cache_at(&cache, &v("1.3.0"), &v("1.2.0"), old).expect("must write cache");

    let latest = resolve_latest(&cache, Some(&v("1.2.0")), false, || Ok(v("1.5.0")))
        .expect("must resolve");
    assert_eq!(latest.version, v("1.5.0"));
    assert!(!latest.from_cache);
}

#[test]
fn resolve_latest_propagates_network_failure() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let cache = dir.path().join("version-cache.json");

    let err = resolve_latest(&cache, Some(&v("1.2.0")), false, || {
        Err(Error::network("querying latest release", anyhow!("timed out")))
    })
    .expect_err("fetch failure must surface");
    assert_eq!(exit_code_for(&err), 3);
    assert!(!cache.exists());
}

#[test]
fn resolve_latest_notes_failed_check_in_stale_cache() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let cache = dir.path().join("version-cache.json");
    let old = Utc::now() - ChronoDuration::hours(30);
    write_version_cache_at(&cache, &v("1.3.0"), &v("1.2.0"), old).expect("must write cache");

    resolve_latest(&cache, Some(&v("1.2.0")), false, || {
        Err(Error::network("querying latest release", anyhow!("timed out")))
    })
    .expect_err("fetch failure must surface");

    let entry = read_version_cache_at(&cache, old).expect("entry is kept");
    assert_eq!(
        entry.check_error.as_deref(),
        Some("network error while querying latest release")
    );
    assert_eq!(entry.checked_at, old);
}

#[test]
fn resolve_latest_without_installation_does_not_write_cache() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let cache = dir.path().join("version-cache.json");

    let latest = resolve_latest(&cache, None, false, || Ok(v("2.0.0"))).expect("must resolve");
    assert_eq!(latest.version, v("2.0.0"));
    assert!(!cache.exists());
}

#[test]
fn decide_update_refuses_downgrade() {
    assert_eq!(
        decide_update(&v("1.2.0"), &v("1.3.0")),
        UpdateDecision::Upgrade
    );
    assert_eq!(
        decide_update(&v("1.2.0"), &v("1.2.0")),
        UpdateDecision::UpToDate
    );
    assert_eq!(
        decide_update(&v("1.2.0"), &v("1.1.9")),
        UpdateDecision::Downgrade
    );
    assert_eq!(
        decide_update(&v("1.2.0-rc.1"), &v("1.2.0")),
        UpdateDecision::Upgrade
    );
}

#[test]
fn parse_requested_version_normalizes_loose_input() {
    assert_eq!(
        parse_requested_version("v1.4").expect("must parse"),
        v("1.4.0")
    );
    let err = parse_requested_version("latest").expect_err("must reject");
    assert_eq!(exit_code_for(&err), 8);
}

#[test]
fn required_tools_skip_placeholder_programs() {
    let config = InstallConfig::with_root("/tmp/memoria");
    assert_eq!(required_tools(&config), vec!["tar", "docker", "python3"]);
}

#[test]
fn required_tools_include_health_command_once() {
    let mut config = InstallConfig::with_root("/tmp/memoria");
    config.health.command = Some(CommandStep::new("curl", &["-fsS", "http://127.0.0.1:8001"]));
    config
        .dependencies
        .steps
        .push(CommandStep::new("docker", &["pull", "chromadb/chroma"]));
    assert_eq!(
        required_tools(&config),
        vec!["tar", "docker", "python3", "curl"]
    );
}

#[test]
fn confirmation_accepts_only_yes() {
    assert!(is_affirmative("y\n"));
    assert!(is_affirmative("  YES "));
    assert!(!is_affirmative("\n"));
    assert!(!is_affirmative("no"));
    assert!(!is_affirmative("yep"));
}

#[test]
fn log_level_follows_flags() {
    assert_eq!(determine_level(0, false), LevelFilter::Warn);
    assert_eq!(determine_level(1, false), LevelFilter::Info);
    assert_eq!(determine_level(2, false), LevelFilter::Debug);
    assert_eq!(determine_level(5, false), LevelFilter::Trace);
    assert_eq!(determine_level(3, true), LevelFilter::Error);
}
