//! skillpm - local-first package manager for agent skills
//!
//! Usage:
//!   skillpm install local/forms@1.2.0
//!   skillpm sync --dry-run --json
//!   skillpm leaderboard --limit 10

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skillpm_core::adapter::AdapterRegistry;
use skillpm_core::commands;
use skillpm_core::config::{Config, ConfigStore, Paths, SourceConfig};
use skillpm_core::error::exit_code_of;
use skillpm_core::installer::{InstallOptions, Installer};
use skillpm_core::memory::{
    ConsolidationStore, EventLog, FeedbackLog, Observer, ScoreStore, SkillIndex, bridge,
    compute_scores, consolidate, detect_profile,
};
use skillpm_core::schedule::{FileBackend, ScheduleJob, SchedulerBackend, scheduled_exec};
use skillpm_core::source::{SourceProvider, provider_for};
use skillpm_core::store::StateStore;
use skillpm_core::sync::{SyncEngine, SyncMode};
use skillpm_core::types::{SourceKind, TrustTier};

#[derive(Parser)]
#[command(name = "skillpm")]
#[command(about = "Local-first package manager for agent skills", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to config.toml (overrides OPENCLAW_CONFIG_PATH)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Workspace lockfile path
    #[arg(long, global = true)]
    lockfile: Option<PathBuf>,

    /// Emit machine-readable JSON where supported
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage sources
    Source {
        #[command(subcommand)]
        command: SourceCommands,
    },
    /// Search skills across configured sources
    Search { query: String },
    /// Install skills
    Install {
        /// Skill refs: source/name[@constraint]
        refs: Vec<String>,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        dry_run: bool,
    },
    /// Uninstall skills
    Uninstall { refs: Vec<String> },
    /// Upgrade installed skills
    Upgrade {
        /// Refs to upgrade; all installed skills when omitted
        refs: Vec<String>,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        dry_run: bool,
    },
    /// Materialize an installed skill into an agent
    Inject {
        #[arg(long)]
        agent: String,
        skill_ref: String,
    },
    /// Remove a materialized skill from an agent
    RemoveInjected {
        #[arg(long)]
        agent: String,
        skill_ref: String,
    },
    /// Reconcile sources, installed state, and injections
    Sync {
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        strict: bool,
    },
    /// Report user-authored skill directories found in agent homes
    Harvest,
    /// Manage the platform sync schedule
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommands,
    },
    /// Environment and invariant checks
    Doctor,
    /// Manage this installation
    #[command(name = "self")]
    SelfCmd {
        #[command(subcommand)]
        command: SelfCommands,
    },
    /// Offline config and state validation
    Validate,
    /// Print the version
    Version,
    /// Show skill activation scores
    Leaderboard {
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum SourceCommands {
    /// Add a source
    Add {
        name: String,
        location: String,
        #[arg(long, default_value = "git")]
        kind: String,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long = "scan-path")]
        scan_paths: Vec<String>,
        #[arg(long, default_value = "review")]
        trust_tier: String,
    },
    /// Remove a source
    Remove { name: String },
    /// List sources
    List,
    /// Refresh source caches
    Update {
        /// Source to refresh; all when omitted
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum ScheduleCommands {
    /// Register the periodic sync job
    Install {
        #[arg(long, default_value = "1h")]
        interval: String,
    },
    /// List scheduled jobs
    List,
    /// Remove the periodic sync job
    Remove,
}

#[derive(Subcommand)]
enum SelfCommands {
    /// Report the installed executable and version
    Update {
        #[arg(long)]
        channel: Option<String>,
    },
}

struct App {
    paths: Paths,
    config: Config,
    config_store: ConfigStore,
    providers: BTreeMap<String, Box<dyn SourceProvider>>,
    adapters: AdapterRegistry,
    lockfile: Option<PathBuf>,
    json: bool,
}

impl App {
    fn load(cli: &Cli) -> Result<Self> {
        let paths = Paths::from_env(cli.config.clone())?;
        let config_store = ConfigStore::new(paths.config_path().to_path_buf());
        let config = config_store.load()?;

        let mut providers: BTreeMap<String, Box<dyn SourceProvider>> = BTreeMap::new();
        for source in &config.sources {
            providers.insert(source.name.clone(), provider_for(source, &paths));
        }

        let home = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
        let adapters = AdapterRegistry::builtin(&home);

        Ok(Self {
            paths,
            config,
            config_store,
            providers,
            adapters,
            lockfile: cli.lockfile.clone(),
            json: cli.json,
        })
    }

    fn installer(&self) -> Installer<'_> {
        Installer::new(
            &self.paths,
            &self.config,
            &self.providers,
            &self.adapters,
            self.lockfile.clone(),
        )
    }

    fn refresh_providers(&mut self) {
        self.providers.clear();
        for source in &self.config.sources {
            self.providers
                .insert(source.name.clone(), provider_for(source, &self.paths));
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skillpm=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(exit_code_of(&err).clamp(0, 255) as u8)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut app = App::load(&cli)?;

    match &cli.command {
        Commands::Source { command } => run_source(&mut app, command),
        Commands::Search { query } => {
            let results = commands::search(&app.providers, query)?;
            if app.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else if results.is_empty() {
                println!("no skills matched {query:?}");
            } else {
                for result in results {
                    println!(
                        "{}  {}  {}",
                        result.skill_ref,
                        result.latest.as_deref().unwrap_or("-"),
                        result.description.as_deref().unwrap_or("")
                    );
                }
            }
            Ok(())
        }
        Commands::Install { refs, force, dry_run } => {
            let installer = app.installer();
            let options = InstallOptions {
                force: *force,
                dry_run: *dry_run,
            };
            for skill_ref in refs {
                let report = installer.install(skill_ref, options)?;
                let verb = if report.dry_run { "would install" } else { "installed" };
                println!("{verb} {} {}", report.skill_ref, report.version);
                for risk in &report.risks {
                    eprintln!("  reinject risk: {risk}");
                }
            }
            Ok(())
        }
        Commands::Uninstall { refs } => {
            let installer = app.installer();
            for skill_ref in refs {
                let report = installer.uninstall(skill_ref)?;
                println!(
                    "uninstalled {} (removed from {} agents, {} blobs collected)",
                    report.skill_ref,
                    report.removed_from.len(),
                    report.collected_blobs.len()
                );
                for warning in &report.warnings {
                    eprintln!("  warning: {warning}");
                }
            }
            Ok(())
        }
        Commands::Upgrade { refs, force, dry_run } => {
            let installer = app.installer();
            let options = InstallOptions {
                force: *force,
                dry_run: *dry_run,
            };
            let targets: Vec<String> = if refs.is_empty() {
                installer
                    .state_store()
                    .load()?
                    .installed
                    .keys()
                    .cloned()
                    .collect()
            } else {
                refs.clone()
            };
            for skill_ref in targets {
                let report = installer.upgrade(&skill_ref, options)?;
                if report.changed {
                    println!("upgraded {} to {}", report.skill_ref, report.version);
                } else {
                    println!("{} already up to date", report.skill_ref);
                }
            }
            Ok(())
        }
        Commands::Inject { agent, skill_ref } => {
            let installer = app.installer();
            commands::inject(&installer, &app.adapters, agent, skill_ref)?;
            println!("injected {skill_ref} into {agent}");
            Ok(())
        }
        Commands::RemoveInjected { agent, skill_ref } => {
            let installer = app.installer();
            commands::remove_injected(&installer, &app.adapters, agent, skill_ref)?;
            println!("removed {skill_ref} from {agent}");
            Ok(())
        }
        Commands::Sync { dry_run, strict } => run_sync(&app, *dry_run, *strict),
        Commands::Harvest => {
            let candidates = commands::harvest(&app.adapters)?;
            if app.json {
                println!("{}", serde_json::to_string_pretty(&candidates)?);
            } else if candidates.is_empty() {
                println!("no user-authored skills found");
            } else {
                for candidate in candidates {
                    println!("{}  {}  {}", candidate.agent, candidate.name, candidate.path.display());
                }
            }
            Ok(())
        }
        Commands::Schedule { command } => run_schedule(&app, command),
        Commands::Doctor => {
            let checks = commands::doctor(&app.paths, app.lockfile.clone());
            if app.json {
                println!("{}", serde_json::to_string_pretty(&checks)?);
            } else {
                for check in &checks {
                    let mark = if check.ok { "ok" } else { "FAIL" };
                    println!("{mark:>4}  {}  {}", check.name, check.detail);
                }
            }
            Ok(())
        }
        Commands::SelfCmd { command } => match command {
            SelfCommands::Update { channel } => {
                let exec = scheduled_exec()?;
                println!(
                    "skillpm {} at {} (channel {}); self-update is managed by your package manager",
                    env!("CARGO_PKG_VERSION"),
                    exec.display(),
                    channel.as_deref().unwrap_or("stable")
                );
                Ok(())
            }
        },
        Commands::Validate => {
            let issues = commands::validate(&app.paths, &app.config, app.lockfile.clone())?;
            if issues.is_empty() {
                println!("configuration and state are consistent");
                Ok(())
            } else {
                for issue in &issues {
                    eprintln!("issue: {issue}");
                }
                anyhow::bail!("{} validation issues", issues.len());
            }
        }
        Commands::Version => {
            println!("skillpm {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Leaderboard { category, limit } => {
            refresh_scores(&app)?;
            let store = ScoreStore::new(app.paths.scores_path());
            let entries = commands::leaderboard(&store, category.as_deref(), *limit)?;
            if app.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("no scores yet; run sync with memory enabled first");
            } else {
                for (rank, entry) in entries.iter().enumerate() {
                    let wm = if entry.in_working_memory { "*" } else { " " };
                    println!(
                        "{:>2}. {wm} {:<40} {:.3}",
                        rank + 1,
                        entry.skill_ref,
                        entry.activation
                    );
                }
            }
            Ok(())
        }
    }
}

fn run_source(app: &mut App, command: &SourceCommands) -> Result<()> {
    match command {
        SourceCommands::Add {
            name,
            location,
            kind,
            branch,
            scan_paths,
            trust_tier,
        } => {
            let source = SourceConfig {
                name: name.clone(),
                kind: SourceKind::parse(kind)?,
                location: location.clone(),
                branch: branch.clone(),
                scan_paths: scan_paths.clone(),
                trust_tier: trust_tier.parse::<TrustTier>()?,
            };
            app.config.add_source(source)?;
            app.config_store.save(&app.config)?;
            app.refresh_providers();
            println!("added source {name}");
            Ok(())
        }
        SourceCommands::Remove { name } => {
            app.config.remove_source(name)?;
            app.config_store.save(&app.config)?;
            app.refresh_providers();
            println!("removed source {name}");
            Ok(())
        }
        SourceCommands::List => {
            if app.json {
                println!("{}", serde_json::to_string_pretty(&app.config.sources)?);
            } else if app.config.sources.is_empty() {
                println!("no sources configured");
            } else {
                for source in &app.config.sources {
                    println!(
                        "{}  {}  {}  {}",
                        source.name,
                        source.kind.as_str(),
                        source.trust_tier.as_str(),
                        source.location
                    );
                }
            }
            Ok(())
        }
        SourceCommands::Update { name } => {
            for (source_name, provider) in &app.providers {
                if name.as_ref().is_some_and(|n| n != source_name) {
                    continue;
                }
                match provider.refresh() {
                    Ok(Some(marker)) => println!("{source_name}: new revision {}", marker.0),
                    Ok(None) => println!("{source_name}: up to date"),
                    Err(err) => eprintln!("{source_name}: {err}"),
                }
            }
            Ok(())
        }
    }
}

fn run_sync(app: &App, dry_run: bool, strict: bool) -> Result<()> {
    // Observation runs before the plan so fresh usage feeds scoring.
    if app.config.memory.enabled && app.config.memory.observe_on_sync && !dry_run {
        if let Err(err) = observe_once(app) {
            tracing::warn!("observation skipped: {err}");
        }
    }

    let engine = SyncEngine::new(
        &app.paths,
        &app.config,
        &app.providers,
        &app.adapters,
        app.lockfile.clone(),
    );
    let run = engine.run(SyncMode { dry_run, strict })?;

    if app.json {
        println!("{}", serde_json::to_string_pretty(&run.summary)?);
    } else {
        println!("{}", run.summary.summary_line);
        if let Some(hint) = run.summary.next_step_hint.lines().next() {
            println!("next: {hint}");
        }
    }

    if !dry_run {
        if let Err(err) = consolidate_once(app) {
            tracing::warn!("consolidation skipped: {err}");
        }
    }

    // The JSON is emitted even when strict mode fails the run.
    if let Some(failure) = run.strict_failure {
        return Err(failure.into());
    }
    Ok(())
}

fn observe_once(app: &App) -> Result<()> {
    let home = dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
    skillpm_core::memory::init(&app.paths)?;
    let state = StateStore::new(app.paths.state_file()).load()?;
    let event_log = EventLog::new(app.paths.events_path());
    let observer = Observer::new(
        home,
        Some(&event_log),
        app.paths.scan_state_path(),
        Some(&app.adapters),
        SkillIndex::from_state(&state),
    );
    observer.scan(chrono_now())?;
    Ok(())
}

/// Score the installed skills against current events, feedback, and the
/// detected project context.
fn compute_board(app: &App) -> Result<skillpm_core::memory::ScoreBoard> {
    skillpm_core::memory::init(&app.paths)?;
    let state = StateStore::new(app.paths.state_file()).load()?;
    let event_log = EventLog::new(app.paths.events_path());
    let stats = event_log.stats(None)?;
    let feedback = FeedbackLog::new(app.paths.feedback_path());
    let means = feedback.mean_ratings()?;

    let cwd = std::env::current_dir()?;
    let mut profile = detect_profile(&cwd, current_branch(&cwd).as_deref());

    // Bridge signals from the project memory enrich detection.
    if app.config.memory.bridge_enabled {
        let signals = bridge::read_signals(&cwd.join(".skillpm/memory"));
        profile.frameworks.extend(signals.frameworks);
        if profile.project_type.is_none() {
            profile.project_type = signals.languages.iter().next().cloned();
        }
    }

    Ok(compute_scores(&state, &stats, &means, &profile, &app.config.memory, chrono_now()))
}

fn refresh_scores(app: &App) -> Result<()> {
    if !app.config.memory.enabled {
        return Ok(());
    }
    let board = compute_board(app)?;
    ScoreStore::new(app.paths.scores_path()).save(&board)?;

    if app.config.memory.bridge_enabled {
        let memory_dir = std::env::current_dir()?.join(".skillpm/memory");
        bridge::write_scores(&board, &memory_dir)?;
        if app.config.memory.rules_injection {
            bridge::write_rules(&board, &memory_dir, &app.config.memory.rules_scope)?;
        }
    }
    Ok(())
}

/// Interval-gated consolidation, run after a sync apply.
fn consolidate_once(app: &App) -> Result<()> {
    if !app.config.memory.enabled {
        return Ok(());
    }
    let board = compute_board(app)?;
    let scores = ScoreStore::new(app.paths.scores_path());
    let cons = ConsolidationStore::new(app.paths.consolidation_path());
    if let Some(report) = consolidate(&scores, &cons, &board, chrono_now(), false)? {
        tracing::debug!(
            promoted = report.promoted.len(),
            demoted = report.demoted.len(),
            "memory consolidated"
        );
    }
    Ok(())
}

fn current_branch(root: &std::path::Path) -> Option<String> {
    let output = std::process::Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .current_dir(root)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn run_schedule(app: &App, command: &ScheduleCommands) -> Result<()> {
    let backend = FileBackend::from_env(&app.paths);
    match command {
        ScheduleCommands::Install { interval } => {
            let job = ScheduleJob {
                id: "skillpm-sync".to_string(),
                exec: scheduled_exec()?,
                interval: interval.clone(),
                args: vec!["sync".to_string()],
            };
            backend.install(&job)?;
            if std::env::var_os("SKILLPM_SCHEDULER_SKIP_COMMANDS").is_some() {
                println!("recorded sync schedule every {interval} (platform commands skipped)");
            } else {
                println!("scheduled sync every {interval}");
            }
            Ok(())
        }
        ScheduleCommands::List => {
            let jobs = backend.list()?;
            if app.json {
                println!("{}", serde_json::to_string_pretty(&jobs)?);
            } else if jobs.is_empty() {
                println!("no scheduled jobs");
            } else {
                for job in jobs {
                    println!("{}  every {}  {}", job.id, job.interval, job.exec.display());
                }
            }
            Ok(())
        }
        ScheduleCommands::Remove => {
            backend.remove("skillpm-sync")?;
            println!("removed sync schedule");
            Ok(())
        }
    }
}

fn chrono_now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}
