use std::cmp::Ordering;
use std::env;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{anyhow, Context as _};
use log::{debug, info, warn};
use memoria_core::{compare, Error, InstallConfig, Version};
use memoria_installer::{
    add_shell_hook, default_install_root, mark_notification_shown, pending_update_notice,
    read_cached_latest, read_installation_record, record_check_error, run_with_timeout,
    startup_files_for, sweep_stale_transactions, uninstall_installation, write_env_script,
    write_version_cache,
    ApplyHooks, ContainerState, HookChange, InstallLayout, InstallationRecord, SystemGate,
    UpdateCoordinator, UpdateLock,
};
use memoria_release::{ReleaseSource, Retriever, VerifiedArtifact};

use crate::exit::CliError;
use crate::render::TerminalRenderer;
use crate::{Cli, Commands};

const PREREQUISITE_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

type CliResult<T = ()> = Result<T, CliError>;

/// Resolved root, layout and config for one invocation.
pub(crate) struct Context {
    layout: InstallLayout,
    config: InstallConfig,
}

impl Context {
    pub(crate) fn load(root: Option<PathBuf>, config: Option<&Path>) -> CliResult<Self> {
        let root = match root {
            Some(root) => root,
            None => default_install_root()?,
        };
        let layout = InstallLayout::new(root);
        let config = InstallConfig::load(layout.root().to_path_buf(), config)?;
        debug!("install root {}", layout.root().display());
        Ok(Self { layout, config })
    }

    fn cache_path(&self) -> PathBuf {
        self.layout.version_cache_path()
    }

    fn retriever(&self) -> memoria_core::Result<Retriever> {
        Retriever::new(ReleaseSource::from_config(
            &self.config.release,
            self.config.timeouts.network(),
        ))
    }
}

pub(crate) fn run_cli(cli: Cli, renderer: TerminalRenderer) -> CliResult {
    let ctx = Context::load(cli.root, cli.config.as_deref())?;

    match cli.command {
        Commands::Install { target } => run_install(&ctx, renderer, target.as_deref()),
        Commands::Update { target, refresh } => {
            run_update(&ctx, renderer, target.as_deref(), refresh)
        }
        Commands::Uninstall { yes, purge } => run_uninstall(&ctx, renderer, yes, purge),
        Commands::Check { refresh } => run_check(&ctx, renderer, refresh),
        Commands::Health => run_health(&ctx, renderer),
        Commands::Version => run_version(&ctx, renderer),
    }
}

/// Latest published version and whether it came from the local cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LatestVersion {
    pub(crate) version: Version,
    pub(crate) from_cache: bool,
}

/// Answers from a fresh cache entry unless `refresh` is set; otherwise calls
/// `fetch` and records the answer. A cache write failure is only logged.
pub(crate) fn resolve_latest<F>(
    cache_path: &Path,
    installed: Option<&Version>,
    refresh: bool,
    fetch: F,
) -> CliResult<LatestVersion>
where
    F: FnOnce() -> memoria_core::Result<Version>,
{
    if !refresh {
        if let Some(version) = read_cached_latest(cache_path) {
            debug!("latest version {version} from cache");
            return Ok(LatestVersion {
                version,
                from_cache: true,
            });
        }
    }

    let version = match fetch() {
        Ok(version) => version,
        Err(err) => {
            if let Err(note_err) = record_check_error(cache_path, &err.to_string()) {
                debug!("could not note failed check in version cache: {note_err}");
            }
            return Err(err.into());
        }
    };
    info!("latest published version is {version}");
    if let Some(installed) = installed {
        if let Err(err) = write_version_cache(cache_path, &version, installed) {
            warn!("failed to update version cache: {err:#}");
        }
    }
    Ok(LatestVersion {
        version,
        from_cache: false,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpdateDecision {
    UpToDate,
    Upgrade,
    Downgrade,
}

pub(crate) fn decide_update(installed: &Version, target: &Version) -> UpdateDecision {
    match compare(target, installed) {
        Ordering::Greater => UpdateDecision::Upgrade,
        Ordering::Equal => UpdateDecision::UpToDate,
        Ordering::Less => UpdateDecision::Downgrade,
    }
}

pub(crate) fn parse_requested_version(raw: &str) -> CliResult<Version> {
    Ok(Version::parse_loose(raw).map_err(Error::from)?)
}

fn run_install(ctx: &Context, renderer: TerminalRenderer, requested: Option<&str>) -> CliResult {
    ctx.layout.ensure_base_dirs()?;
    let lock = UpdateLock::acquire(&ctx.layout, "install")?;
    let existing = read_installation_record(&ctx.layout)?;
    sweep(&ctx.layout, &lock, existing.as_ref())?;

    if let Some(record) = existing {
        renderer.print_status(
            "skip",
            &format!(
                "memoria {} is already installed at {}; use `memoria update`",
                record.version,
                ctx.layout.root().display()
            ),
        );
        return Ok(());
    }

    check_prerequisites(&ctx.config)?;
    let retriever = ctx.retriever()?;
    let target = match requested {
        Some(raw) => parse_requested_version(raw)?,
        None => retriever.fetch_latest_version()?,
    };

    renderer.print_section(&format!("install memoria {target}"));
    let artifact = download(&retriever, &target, renderer)?;
    let mut coordinator = UpdateCoordinator::new(
        ctx.layout.clone(),
        SystemGate::from_config(&ctx.config, &ctx.layout),
    );
    let outcome = coordinator.install(artifact)?;

    integrate_environment(&ctx.layout, renderer)?;
    if let Err(err) = write_version_cache(&ctx.cache_path(), &target, &outcome.record.version) {
        warn!("failed to update version cache: {err:#}");
    }
    renderer.print_status(
        "ok",
        &format!(
            "installed memoria {} at {} (transaction {})",
            outcome.record.version,
            ctx.layout.root().display(),
            outcome.txid
        ),
    );
    drop(lock);
    Ok(())
}

fn run_update(
    ctx: &Context,
    renderer: TerminalRenderer,
    requested: Option<&str>,
    refresh: bool,
) -> CliResult {
    ctx.layout.ensure_base_dirs()?;
    let lock = UpdateLock::acquire(&ctx.layout, "update")?;
    let existing = read_installation_record(&ctx.layout)?;
    sweep(&ctx.layout, &lock, existing.as_ref())?;
    let Some(record) = read_installation_record(&ctx.layout)? else {
        return Err(CliError::Refused(
            "memoria is not installed; run `memoria install` first".to_string(),
        ));
    };

    let retriever = ctx.retriever()?;
    let target = match requested {
        Some(raw) => parse_requested_version(raw)?,
        None => {
            resolve_latest(&ctx.cache_path(), Some(&record.version), refresh, || {
                retriever.fetch_latest_version()
            })?
            .version
        }
    };

    match decide_update(&record.version, &target) {
        UpdateDecision::UpToDate => {
            renderer.print_status(
                "skip",
                &format!("memoria {} is already the latest version", record.version),
            );
            if let Err(err) = mark_notification_shown(&ctx.cache_path()) {
                warn!("failed to update version cache: {err:#}");
            }
            return Ok(());
        }
        UpdateDecision::Downgrade => {
            return Err(CliError::Refused(format!(
                "refusing to downgrade memoria from {} to {target}",
                record.version
            )));
        }
        UpdateDecision::Upgrade => {}
    }

    check_prerequisites(&ctx.config)?;
    renderer.print_section(&format!("update memoria {} -> {target}", record.version));
    let artifact = download(&retriever, &target, renderer)?;
    let mut coordinator = UpdateCoordinator::new(
        ctx.layout.clone(),
        SystemGate::from_config(&ctx.config, &ctx.layout),
    );
    let outcome = coordinator.update(&record, artifact)?;

    write_env_script(&ctx.layout)?;
    if let Err(err) = write_version_cache(&ctx.cache_path(), &target, &outcome.record.version) {
        warn!("failed to update version cache: {err:#}");
    }
    let previous = outcome
        .previous_version
        .map(|version| version.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    renderer.print_status(
        "ok",
        &format!(
            "updated memoria {previous} -> {} (transaction {})",
            outcome.record.version, outcome.txid
        ),
    );
    drop(lock);
    Ok(())
}

fn run_uninstall(ctx: &Context, renderer: TerminalRenderer, yes: bool, purge: bool) -> CliResult {
    if !yes {
        let prompt = format!("Remove memoria from {}?", ctx.layout.root().display());
        if !confirm(&prompt)? {
            renderer.print_status("skip", "uninstall cancelled");
            return Ok(());
        }
    }

    let lock = UpdateLock::acquire(&ctx.layout, "uninstall")?;
    let record = read_installation_record(&ctx.layout).unwrap_or_else(|err| {
        warn!("ignoring unreadable installation record: {err:#}");
        None
    });
    if let Err(err) = sweep(&ctx.layout, &lock, record.as_ref()) {
        warn!("stale transaction sweep failed: {err}");
    }

    let gate = SystemGate::from_config(&ctx.config, &ctx.layout);
    match gate.container().remove() {
        Ok(()) => renderer.print_status(
            "ok",
            &format!("removed container {}", gate.container().spec().name),
        ),
        Err(Error::MissingPrerequisite { tool }) => renderer.print_status(
            "warn",
            &format!("{tool} not found; container left in place"),
        ),
        Err(err) => renderer.print_status(
            "warn",
            &format!("could not remove container: {err}"),
        ),
    }

    let result = uninstall_installation(&ctx.layout, &all_startup_files(), purge)?;
    for file in &result.unhooked {
        renderer.print_status("ok", &format!("removed hook from {}", file.display()));
    }
    let message = match &result.version {
        Some(version) => format!("uninstalled memoria {version} ({})", result.status.as_str()),
        None => format!("uninstall: {}", result.status.as_str()),
    };
    renderer.print_status("ok", &message);
    if !purge && ctx.layout.data_dir().exists() {
        renderer.print_status(
            "skip",
            &format!(
                "kept vector store data at {}; pass --purge to delete it",
                ctx.layout.data_dir().display()
            ),
        );
    }
    drop(lock);
    Ok(())
}

fn run_check(ctx: &Context, renderer: TerminalRenderer, refresh: bool) -> CliResult {
    let Some(record) = read_installation_record(&ctx.layout)? else {
        return Err(CliError::Refused(
            "memoria is not installed; run `memoria install` first".to_string(),
        ));
    };

    let latest = resolve_latest(&ctx.cache_path(), Some(&record.version), refresh, || {
        ctx.retriever()?.fetch_latest_version()
    })?;
    let origin = if latest.from_cache { " (cached)" } else { "" };

    match decide_update(&record.version, &latest.version) {
        UpdateDecision::Upgrade => {
            renderer.print_status(
                "warn",
                &format!(
                    "update available: {} -> {}{origin}; run `memoria update`",
                    record.version, latest.version
                ),
            );
            if let Err(err) = mark_notification_shown(&ctx.cache_path()) {
                warn!("failed to update version cache: {err:#}");
            }
        }
        UpdateDecision::UpToDate | UpdateDecision::Downgrade => {
            renderer.print_status(
                "ok",
                &format!("memoria {} is up to date{origin}", record.version),
            );
        }
    }
    Ok(())
}

fn run_health(ctx: &Context, renderer: TerminalRenderer) -> CliResult {
    let Some(record) = read_installation_record(&ctx.layout)? else {
        return Err(CliError::unhealthy(anyhow!(
            "memoria is not installed at {}",
            ctx.layout.root().display()
        )));
    };

    let gate = SystemGate::from_config(&ctx.config, &ctx.layout);
    let container = gate.container();
    let state = container.state()?;
    if state != ContainerState::Running {
        return Err(CliError::unhealthy(anyhow!(
            "container {} is {}",
            container.spec().name,
            state.as_str()
        )));
    }
    gate.probe_health().map_err(CliError::unhealthy)?;

    renderer.print_status(
        "ok",
        &format!(
            "memoria {} is healthy (container {} on port {})",
            record.version,
            container.spec().name,
            container.spec().host_port
        ),
    );
    Ok(())
}

fn run_version(ctx: &Context, renderer: TerminalRenderer) -> CliResult {
    let mut lines = vec![format!("memoria-cli {}", env!("CARGO_PKG_VERSION"))];
    match read_installation_record(&ctx.layout) {
        Ok(Some(record)) => lines.push(format!(
            "installed: {} ({}, {})",
            record.version,
            record.install_method.as_str(),
            record.installed_at.to_rfc3339()
        )),
        Ok(None) => lines.push("installed: none".to_string()),
        Err(err) => warn!("failed to read installation record: {err:#}"),
    }
    renderer.print_lines(&lines);

    if let Some(latest) = pending_update_notice(&ctx.cache_path()) {
        renderer.print_status(
            "warn",
            &format!("memoria {latest} is available; run `memoria update`"),
        );
        if let Err(err) = mark_notification_shown(&ctx.cache_path()) {
            warn!("failed to update version cache: {err:#}");
        }
    }
    Ok(())
}

fn sweep(
    layout: &InstallLayout,
    lock: &UpdateLock,
    record: Option<&InstallationRecord>,
) -> CliResult {
    let report = sweep_stale_transactions(layout, lock, record)?;
    for txid in &report.recovered {
        warn!("restored the installation interrupted by transaction {txid}");
    }
    if !report.removed.is_empty() {
        debug!("removed {} stale transaction path(s)", report.removed.len());
    }
    Ok(())
}

fn download(
    retriever: &Retriever,
    version: &Version,
    renderer: TerminalRenderer,
) -> CliResult<VerifiedArtifact> {
    let mut progress = renderer.start_progress("download", None);
    let result =
        retriever.fetch_verified_with_progress(version, |done, total| progress.set(done, total));
    match result {
        Ok(artifact) => {
            progress.finish_success();
            renderer.print_status(
                "ok",
                &format!(
                    "verified {} (sha256 {})",
                    artifact.file_name(),
                    artifact.manifest().sha256
                ),
            );
            Ok(artifact)
        }
        Err(err) => {
            progress.finish_abandon();
            Err(err.into())
        }
    }
}

/// Programs that must be on PATH before anything is downloaded.
pub(crate) fn required_tools(config: &InstallConfig) -> Vec<String> {
    let mut tools = vec!["tar".to_string(), "docker".to_string()];
    let configured = config
        .dependencies
        .steps
        .iter()
        .chain(config.health.command.as_ref())
        .map(|step| step.program.as_str())
        // placeholders point inside the install and do not exist yet
        .filter(|program| !program.contains('{'));
    for program in configured {
        if !tools.iter().any(|tool| tool == program) {
            tools.push(program.to_string());
        }
    }
    tools
}

fn check_prerequisites(config: &InstallConfig) -> CliResult {
    for tool in required_tools(config) {
        let mut command = Command::new(&tool);
        command.arg("--version");
        match run_with_timeout(&mut command, PREREQUISITE_PROBE_TIMEOUT) {
            Ok(output) if output.success() => debug!("found {tool}: {}", output.stdout_text()),
            Ok(output) => warn!(
                "`{tool} --version` exited with status {}: {}",
                output.status_code,
                output.stderr_text()
            ),
            Err(err @ Error::MissingPrerequisite { .. }) => return Err(err.into()),
            Err(err) => warn!("could not probe {tool}: {err}"),
        }
    }
    Ok(())
}

fn integrate_environment(layout: &InstallLayout, renderer: TerminalRenderer) -> CliResult {
    let script = write_env_script(layout)?;
    let Some(home) = env::var_os("HOME").map(PathBuf::from) else {
        renderer.print_status(
            "warn",
            &format!(
                "HOME is not set; source {} from your shell startup file",
                script.display()
            ),
        );
        return Ok(());
    };

    let shell = env::var("SHELL").ok();
    for file in startup_files_for(&home, shell.as_deref()) {
        match add_shell_hook(&file, &script)? {
            HookChange::Added => {
                renderer.print_status("ok", &format!("added hook to {}", file.display()))
            }
            _ => debug!("{} already hooked", file.display()),
        }
    }
    Ok(())
}

/// Every startup file an earlier install may have hooked, whatever the
/// current shell.
fn all_startup_files() -> Vec<PathBuf> {
    let Some(home) = env::var_os("HOME").map(PathBuf::from) else {
        warn!("HOME is not set; shell startup files left untouched");
        return Vec::new();
    };
    let mut files = Vec::new();
    for shell in [Some("bash"), Some("zsh"), None] {
        for file in startup_files_for(&home, shell) {
            if !files.contains(&file) {
                files.push(file);
            }
        }
    }
    files
}

fn confirm(prompt: &str) -> CliResult<bool> {
    if !io::stdin().is_terminal() {
        return Err(CliError::Refused(
            "refusing to uninstall without confirmation; pass --yes".to_string(),
        ));
    }
    print!("{prompt} [y/N] ");
    io::stdout().flush().context("failed to flush stdout")?;
    let mut answer = String::new();
    io::stdin()
        .read_line(&mut answer)
        .context("failed to read confirmation")?;
    Ok(is_affirmative(&answer))
}

pub(crate) fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
