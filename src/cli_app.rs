//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use overlay_launcher::core::config::{Config, LauncherProfile};
use overlay_launcher::core::errors::OvlError;
use overlay_launcher::daemon::loop_main::{SessionDeps, SessionLoop};
use overlay_launcher::daemon::pidfile::{InstanceRequest, PidFile, signal_instance};
use overlay_launcher::daemon::signals::SignalHandler;
use overlay_launcher::daemon::sink::TerminalSink;
use overlay_launcher::dispatch::SystemProcessControl;
use overlay_launcher::logger::activity::spawn_logger;
use overlay_launcher::logger::jsonl::JsonlConfig;
use overlay_launcher::persist::{FileSettingStore, MarkerFile, SettingStore};
use overlay_launcher::snapshot::{CommandSource, Snapshot, SnapshotSource};
use overlay_launcher::tui::input::help_bindings;
use overlay_launcher::tui::spawn_key_reader;
use overlay_launcher::tui::terminal_guard::TerminalGuard;

/// Overlay launcher: game library and hardware-mode switcher overlays.
#[derive(Debug, Parser)]
#[command(
    name = "ovl",
    author,
    version,
    about = "Overlay launcher engine",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the overlay session in this terminal.
    Run(RunArgs),
    /// Fetch one snapshot and print it.
    Fetch(ProfileArgs),
    /// Toggle the running overlay's visibility.
    Toggle(ProfileArgs),
    /// Ask the running overlay to refetch its snapshot.
    Refresh(ProfileArgs),
    /// Ask the running overlay to quit.
    Stop(ProfileArgs),
    /// Print the effective configuration and its hash.
    Config(ProfileArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct ProfileArgs {
    /// Launcher profile (games or modes).
    #[arg(long, value_name = "PROFILE")]
    profile: Option<LauncherProfile>,
}

#[derive(Debug, Clone, Args, Default)]
struct RunArgs {
    /// Launcher profile (games or modes).
    #[arg(long, value_name = "PROFILE")]
    profile: Option<LauncherProfile>,
    /// Start hidden; show on the first toggle.
    #[arg(long)]
    hidden: bool,
    /// Do not read keys from the terminal; drive the session by signals only.
    #[arg(long)]
    no_terminal: bool,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or configuration.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
        }
    }
}

impl From<OvlError> for CliError {
    fn from(err: OvlError) -> Self {
        match err {
            OvlError::InvalidConfig { .. }
            | OvlError::MissingConfig { .. }
            | OvlError::ConfigParse { .. }
            | OvlError::NoInstance { .. } => Self::User(err.to_string()),
            other => Self::Runtime(other.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Run(args) => run_session(cli, args),
        Command::Fetch(args) => run_fetch(cli, args),
        Command::Toggle(args) => run_signal(cli, args, InstanceRequest::Toggle),
        Command::Refresh(args) => run_signal(cli, args, InstanceRequest::Refresh),
        Command::Stop(args) => run_signal(cli, args, InstanceRequest::Quit),
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn load_config(cli: &Cli, profile: Option<LauncherProfile>) -> Result<Config, CliError> {
    Ok(Config::load(cli.config.as_deref(), profile)?)
}

// ──────────────────── run ────────────────────

fn run_session(cli: &Cli, args: &RunArgs) -> Result<(), CliError> {
    let mut config = load_config(cli, args.profile)?;
    if args.hidden {
        config.launcher.start_hidden = true;
    }

    // Handlers go in before the pidfile advertises us to `ovl toggle`.
    let signals = SignalHandler::new();
    let _pidfile = PidFile::acquire(&config.paths.pidfile)?;
    let (logger, logger_join) = spawn_logger(JsonlConfig::from_paths(&config.paths))?;

    if cli.verbose {
        eprintln!(
            "[OVL-SESSION] config={} hash={} pidfile={}",
            config.paths.config_file.display(),
            config.stable_hash().unwrap_or_default(),
            config.paths.pidfile.display()
        );
    }

    let deps = SessionDeps {
        source: Arc::new(CommandSource::from_config(&config.snapshot)),
        control: Arc::new(SystemProcessControl::new()),
        setting: config
            .persistence
            .setting_file
            .clone()
            .map(|path| Box::new(FileSettingStore::new(path)) as Box<dyn SettingStore>),
        marker: config.persistence.marker_file.clone().map(MarkerFile::new),
        logger: logger.clone(),
        signals,
    };

    let (host_tx, host_rx) = crossbeam_channel::bounded(64);
    let interactive = !args.no_terminal && io::stdin().is_terminal();
    if interactive && !cli.quiet {
        eprint!("{}", key_help());
    }
    let guard = if interactive {
        Some(TerminalGuard::new()?)
    } else {
        None
    };
    if interactive {
        spawn_key_reader(host_tx)?;
    } else {
        // Signals remain the only input.
        drop(host_tx);
    }

    let mut session = SessionLoop::new(&config, deps, TerminalSink::stderr(), host_rx);
    let result = session.run();
    drop(guard);

    logger.shutdown();
    let _ = logger_join.join();
    let dropped = logger.dropped_events();
    if dropped > 0 && !cli.quiet {
        eprintln!("[OVL-JSONL] {dropped} activity events dropped");
    }
    result.map_err(CliError::from)
}

/// Key table printed before the terminal enters raw mode.
fn key_help() -> String {
    let width = help_bindings().iter().map(|b| b.keys.chars().count()).max().unwrap_or(0);
    let mut out = String::from("keys:\n");
    for binding in help_bindings() {
        let pad = width - binding.keys.chars().count();
        out.push_str(&format!(
            "  {}{}  {}\n",
            binding.keys,
            " ".repeat(pad),
            binding.description
        ));
    }
    out
}

// ──────────────────── fetch ────────────────────

fn run_fetch(cli: &Cli, args: &ProfileArgs) -> Result<(), CliError> {
    let config = load_config(cli, args.profile)?;
    let source = CommandSource::from_config(&config.snapshot);
    let snapshot = source.fetch().map_err(OvlError::from)?;

    match output_mode(cli) {
        OutputMode::Human => {
            if !cli.quiet {
                print_snapshot_human(&source.describe(), &snapshot, cli.verbose);
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "fetch",
                "source": source.describe(),
                "snapshot": serde_json::to_value(&snapshot)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn print_snapshot_human(source: &str, snapshot: &Snapshot, verbose: bool) {
    println!(
        "{} {} items from {}",
        "Snapshot:".bold(),
        snapshot.items.len(),
        source.dimmed()
    );
    for (i, item) in snapshot.items.iter().enumerate() {
        let marker = if item.favorite { "★" } else { " " };
        let name = if item.is_launchable() {
            item.name.normal()
        } else {
            item.name.dimmed()
        };
        println!("  {marker} {:>3}  {name}", i + 1);
        if verbose {
            println!("         {}", item.command.dimmed());
        }
    }
    if let Some(brightness) = snapshot.brightness {
        println!("  brightness: {brightness}");
    }
    if verbose && !snapshot.colors.is_empty() {
        println!("  colors: {}", snapshot.colors.len());
    }
}

// ──────────────────── instance signals ────────────────────

fn run_signal(cli: &Cli, args: &ProfileArgs, request: InstanceRequest) -> Result<(), CliError> {
    let config = load_config(cli, args.profile)?;
    let pid = signal_instance(&config.paths.pidfile, request)?;
    let label = match request {
        InstanceRequest::Toggle => "toggle",
        InstanceRequest::Refresh => "refresh",
        InstanceRequest::Quit => "stop",
    };

    match output_mode(cli) {
        OutputMode::Human => {
            if !cli.quiet {
                println!("{} sent {label} to pid {pid}", "ok:".green());
            }
        }
        OutputMode::Json => {
            write_json_line(&json!({
                "command": label,
                "pid": pid,
                "pidfile": config.paths.pidfile.to_string_lossy(),
            }))?;
        }
    }
    Ok(())
}

// ──────────────────── config ────────────────────

fn run_config(cli: &Cli, args: &ProfileArgs) -> Result<(), CliError> {
    let config = load_config(cli, args.profile)?;
    let hash = config.stable_hash()?;

    match output_mode(cli) {
        OutputMode::Human => {
            let toml_str = toml::to_string_pretty(&config)
                .map_err(|e| CliError::Runtime(format!("serialize config: {e}")))?;
            println!("# source: {}", config.paths.config_file.display());
            println!("# hash: {hash}");
            println!("{toml_str}");
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "config",
                "hash": hash,
                "config": serde_json::to_value(&config)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ──────────────────── output helpers ────────────────────

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("OVL_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
