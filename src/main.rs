//! autotrain - curriculum-driven stage decisions for animal training
//!
//! CLI entry point with global panic handler.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use autotrain::cli::curricula::{CurriculaAction, CurriculaCommand, CurriculaOptions};
use autotrain::cli::stats::{StatsCommand, StatsOptions};
use autotrain::cli::update::{UpdateCommand, UpdateOptions};
use autotrain::config::{autotrain_home, Config, ManagerConfig};
use autotrain::core::{CurriculumKey, CURRICULUM_SCHEMA_VERSION};
use autotrain::error::exit_codes;
use autotrain::ledger::AutoTrainManager;
use autotrain::storage::{FileCurriculumStore, FileLedgerStore, JsonlBehaviorSource};

// =============================================================================
// CLI Definition
// =============================================================================

/// autotrain - curriculum-driven stage decisions for animal training
#[derive(Parser)]
#[command(name = "autotrain")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every new session and append the decisions to the ledger
    Update {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
        /// Manager (ledger) name, overriding the config
        #[arg(long)]
        manager: Option<String>,
    },

    /// Show per-subject, per-stage statistics
    Stats {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
        /// Only show this subject
        #[arg(long)]
        subject: Option<String>,
        /// Manager (ledger) name, overriding the config
        #[arg(long)]
        manager: Option<String>,
    },

    /// Manage curriculum artifacts
    Curricula {
        #[command(subcommand)]
        action: CurriculaSubcommand,
        /// Output as JSON
        #[arg(long, short, global = true)]
        json: bool,
        /// Suppress output
        #[arg(long, short, global = true)]
        quiet: bool,
    },
}

#[derive(Subcommand)]
enum CurriculaSubcommand {
    /// List published curricula
    List,
    /// Print a curriculum as JSON
    Show(KeyArgs),
    /// Publish the built-in curricula
    Install,
    /// Check a curriculum for structural problems
    Validate(KeyArgs),
}

#[derive(Args)]
struct KeyArgs {
    /// Curriculum name
    name: String,
    /// Curriculum version
    version: String,
    /// Curriculum schema version
    #[arg(long, default_value = CURRICULUM_SCHEMA_VERSION)]
    schema_version: String,
}

impl From<KeyArgs> for CurriculumKey {
    fn from(args: KeyArgs) -> Self {
        CurriculumKey::new(&args.name, &args.version, &args.schema_version)
    }
}

impl From<CurriculaSubcommand> for CurriculaAction {
    fn from(cmd: CurriculaSubcommand) -> Self {
        match cmd {
            CurriculaSubcommand::List => CurriculaAction::List,
            CurriculaSubcommand::Show(key) => CurriculaAction::Show(key.into()),
            CurriculaSubcommand::Install => CurriculaAction::Install,
            CurriculaSubcommand::Validate(key) => CurriculaAction::Validate(key.into()),
        }
    }
}

// =============================================================================
// Main
// =============================================================================

fn main() -> ExitCode {
    setup_panic_handler();
    init_tracing();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("autotrain error: {}", e);
            ExitCode::from(exit_codes::ERROR as u8)
        }
    }
}

/// Log to stderr, filtered by `AUTOTRAIN_LOG` (default `info`).
fn init_tracing() {
    let filter = EnvFilter::try_from_env("AUTOTRAIN_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("autotrain panic: {}", info);

        if let Some(home) = autotrain_home() {
            let crash_log = home.join("crash.log");
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&crash_log)
            {
                let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
                let _ = writeln!(file, "[{}] {}", timestamp, info);
            }
        }

        std::process::exit(exit_codes::CRASH);
    }));
}

fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load();

    match cli.command {
        Commands::Update {
            json,
            quiet,
            manager,
        } => run_update(&config, json, quiet, manager),
        Commands::Stats {
            json,
            quiet,
            subject,
            manager,
        } => run_stats(&config, json, quiet, subject, manager),
        Commands::Curricula {
            action,
            json,
            quiet,
        } => run_curricula(&config, action.into(), json, quiet),
    }
}

fn success_to_exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::from(exit_codes::SUCCESS as u8)
    } else {
        ExitCode::from(exit_codes::ERROR as u8)
    }
}

fn require_path(path: Option<PathBuf>, what: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    path.ok_or_else(|| format!("cannot determine {what}; set it in config.toml").into())
}

fn manager_config(config: &Config, name: Option<String>) -> Result<ManagerConfig, Box<dyn std::error::Error>> {
    let mut manager = config.manager.clone();
    if let Some(name) = name {
        if !ManagerConfig::is_valid_name(&name) {
            return Err(format!("invalid manager name '{name}'").into());
        }
        manager.name = name;
    }
    Ok(manager)
}

fn print_output(formatted: String) {
    if !formatted.is_empty() {
        println!("{}", formatted);
    }
}

// =============================================================================
// Command Implementations
// =============================================================================

fn run_update(
    config: &Config,
    json: bool,
    quiet: bool,
    manager: Option<String>,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let manager_config = manager_config(config, manager)?;
    let source = JsonlBehaviorSource::new(require_path(
        config.behavior_source_path(),
        "behavior source path",
    )?);
    let curricula =
        FileCurriculumStore::with_dir(require_path(config.curricula_dir(), "curricula directory")?)?;
    let ledger = FileLedgerStore::with_dir(require_path(config.ledger_dir(), "ledger directory")?)?;

    let manager = AutoTrainManager::new(&manager_config, source, curricula, ledger)?;
    let mut cmd = UpdateCommand::new(manager);
    let options = UpdateOptions { json, quiet };

    let output = cmd.run(&options);
    print_output(cmd.format_output(&output, &options));

    Ok(success_to_exit_code(output.success))
}

fn run_stats(
    config: &Config,
    json: bool,
    quiet: bool,
    subject: Option<String>,
    manager: Option<String>,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let manager_config = manager_config(config, manager)?;
    let ledger = FileLedgerStore::with_dir(require_path(config.ledger_dir(), "ledger directory")?)?;

    let cmd = StatsCommand::new(ledger, manager_config.name);
    let options = StatsOptions {
        json,
        quiet,
        subject,
    };

    let output = cmd.run(&options);
    print_output(cmd.format_output(&output, &options));

    Ok(success_to_exit_code(output.success))
}

fn run_curricula(
    config: &Config,
    action: CurriculaAction,
    json: bool,
    quiet: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let store =
        FileCurriculumStore::with_dir(require_path(config.curricula_dir(), "curricula directory")?)?;

    let mut cmd = CurriculaCommand::new(store);
    let options = CurriculaOptions { json, quiet };

    let output = cmd.run(&action);
    print_output(cmd.format_output(&output, &action, &options));

    Ok(success_to_exit_code(output.success))
}

// =============================================================================
// Tests
// =============================================================================
