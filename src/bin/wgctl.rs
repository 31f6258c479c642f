//! wgctl - WireGuard profile switcher
//!
//! Command-line front end over `libwgctl`. Keeps at most one of the
//! configured WireGuard profiles up, using `pkexec wg-quick` underneath.
//!
//! ```bash
//! wgctl                 # status of every configured profile
//! wgctl activate usa    # bring up "usa", taking down any other profile
//! wgctl off             # take down every configured profile
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use libwgctl::config::{self, ManagerConfig};
use libwgctl::logging::{self, LogOptions};
use libwgctl::{Completion, Dispatcher, Operation, ProfileInfo, ProfileStatus, WireGuardManager};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "wgctl")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "WireGuard profile switcher - keep one wg-quick profile active at a time", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (default: ~/.local/share/wg-manager/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, value_enum, default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Shortcut for --log-level debug
    #[arg(short, long, global = true)]
    debug: bool,

    /// Do not write ~/.local/share/wg-manager/wgctl.log
    #[arg(long, global = true)]
    no_log_file: bool,

    /// Terse output mode (colon separated, no headers)
    #[arg(short = 't', long, global = true)]
    terse: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_directive(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show every configured profile with its status (default)
    Status,

    /// Print the currently active profile
    Active,

    /// Print the raw `wg show` output
    Show,

    /// Activate a profile, turning off any other active profile first
    Activate {
        /// Profile name
        profile: String,
    },

    /// Turn off every configured profile
    Off,

    /// Check that wg, wg-quick and the elevation program are available
    Check,

    /// Validate a profile's configuration file
    Validate {
        /// Profile name
        profile: String,
    },

    /// Report whether a profile exists
    Exists {
        /// Profile name
        profile: String,
    },

    /// Export the tail of the log file
    ExportLogs {
        /// Destination file
        output: PathBuf,

        /// Number of lines to export
        #[arg(long, default_value_t = 1000)]
        lines: usize,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.debug { LogLevel::Debug } else { cli.log_level };
    let mut options = LogOptions {
        level: level.as_directive().to_string(),
        console: true,
        log_dir: if cli.no_log_file { None } else { config::default_data_dir() },
    };

    if let Err(e) = logging::init_logging(&options) {
        if options.log_dir.is_none() {
            eprintln!("Warning: failed to initialize logging: {}", e);
            return;
        }
        eprintln!("Warning: log file unavailable ({}), logging to stderr only", e);
        options.log_dir = None;
        if let Err(e) = logging::init_logging(&options) {
            eprintln!("Warning: failed to initialize logging: {}", e);
        }
    }
}

/// Returns whether the requested operation succeeded
async fn run(cli: Cli) -> anyhow::Result<bool> {
    init_logging(&cli);

    let config_path = cli.config.clone().or_else(config::default_config_path);
    debug!("Configuration path: {:?}", config_path);
    let config = match &cli.config {
        // An explicitly requested file must load
        Some(path) => ManagerConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => ManagerConfig::load_or_default(config_path.as_deref()),
    };

    let manager = Arc::new(WireGuardManager::new(&config));
    let command = cli.command.unwrap_or(Commands::Status);
    info!("wgctl {} starting", env!("CARGO_PKG_VERSION"));

    match command {
        Commands::Status => {
            let Completion::Refreshed(infos) = dispatch(&manager, Operation::Refresh).await? else {
                anyhow::bail!("Unexpected completion for status refresh");
            };
            print_profiles(&infos, cli.terse);
            Ok(true)
        }
        Commands::Active => {
            let active = blocking(&manager, |manager| manager.get_active_profile()).await?;
            match active {
                Some(profile) => println!("{}", profile),
                None if cli.terse => {}
                None => println!("No active profile"),
            }
            Ok(true)
        }
        Commands::Show => {
            println!("{}", blocking(&manager, |manager| manager.get_status_output()).await?);
            Ok(true)
        }
        Commands::Activate { profile } => {
            eprintln!("Activating {}...", profile);
            let Completion::Activated { result, .. } = dispatch(&manager, Operation::Activate(profile.clone())).await? else {
                anyhow::bail!("Unexpected completion for activation");
            };
            if result.success {
                let message = result.message.trim();
                if message.is_empty() {
                    println!("Profile {} activated", profile);
                } else {
                    println!("{}", message);
                }
            } else {
                eprintln!("Failed to activate {}: {}", profile, result.message.trim());
            }
            Ok(result.success)
        }
        Commands::Off => {
            let Completion::TurnedOff(result) = dispatch(&manager, Operation::TurnOffAll).await? else {
                anyhow::bail!("Unexpected completion for turning off");
            };
            if result.success {
                println!("{}", result.message);
            } else {
                eprintln!("{}", result.message);
            }
            Ok(result.success)
        }
        Commands::Check => {
            let Completion::SystemChecked(readiness) = dispatch(&manager, Operation::CheckSystem).await? else {
                anyhow::bail!("Unexpected completion for system check");
            };
            if cli.terse {
                println!("{}:{}", if readiness.ready { "ready" } else { "not-ready" }, readiness.message);
            } else {
                println!("{}", readiness.message);
            }
            Ok(readiness.ready)
        }
        Commands::Validate { profile } => {
            let validation = manager.validate_profile(&profile);
            if cli.terse {
                println!("{}:{}", if validation.valid { "valid" } else { "invalid" }, validation.reason);
            } else if validation.valid {
                println!("Profile {} is valid: {}", profile, validation.reason);
            } else {
                println!("Profile {} is invalid: {}", profile, validation.reason);
            }
            Ok(validation.valid)
        }
        Commands::Exists { profile } => {
            let exists = manager.check_profile_exists(&profile);
            println!("{}", if exists { "yes" } else { "no" });
            Ok(exists)
        }
        Commands::ExportLogs { output, lines } => {
            let data_dir = config::default_data_dir().context("Cannot locate home directory")?;
            let exported = logging::export_logs(&data_dir.join(logging::LOG_FILE), &output, lines)
                .context("Failed to export logs")?;
            println!("Exported {} lines to {}", exported, output.display());
            Ok(true)
        }
    }
}

/// Run one operation on the dispatcher and wait for its completion
async fn dispatch(manager: &Arc<WireGuardManager>, operation: Operation) -> anyhow::Result<Completion> {
    let (dispatcher, mut completions) = Dispatcher::new(manager.clone())?;
    if !dispatcher.submit(operation) {
        anyhow::bail!("Another operation of the same kind is already running");
    }
    completions
        .recv()
        .await
        .context("Operation ended without reporting a result")
}

/// Run a blocking manager call off the async worker threads
async fn blocking<T, F>(manager: &Arc<WireGuardManager>, call: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&WireGuardManager) -> T + Send + 'static,
{
    let manager = manager.clone();
    tokio::task::spawn_blocking(move || call(&manager))
        .await
        .context("Blocking task failed")
}

fn print_profiles(infos: &[ProfileInfo], terse: bool) {
    if terse {
        for info in infos {
            println!("{}:{}:{}:{}", info.name, info.status, info.transfer_rx, info.transfer_tx);
        }
        return;
    }

    println!("{:<16} {:<10} {:<16} {:>12} {:>12}", "NAME", "STATUS", "INTERFACE", "RECEIVED", "SENT");
    for info in infos {
        let (rx, tx) = if info.status == ProfileStatus::Active {
            (format_bytes(info.transfer_rx), format_bytes(info.transfer_tx))
        } else {
            ("--".to_string(), "--".to_string())
        };
        let interface = if info.interface_name.is_empty() { "--" } else { info.interface_name.as_str() };
        println!("{:<16} {:<10} {:<16} {:>12} {:>12}", info.name, info.status, interface, rx, tx);
    }
}

/// Human-readable byte count using binary units
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}
