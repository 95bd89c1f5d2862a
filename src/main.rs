use anyhow::{Context, Result, anyhow};
use clap::{ArgAction, Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use homerow_mouse::config::{BackendKind, Config, ModeVariant};
use homerow_mouse::daemon::{self, Daemon};
use homerow_mouse::pidfile::{self, InstanceStatus};

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "homerow-mouse")]
#[command(
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("HOMEROW_MOUSE_GIT_HASH"), ")"),
    about = "Keyboard-driven pointer control for X11 desktops"
)]
struct Cli {
    /// Config file (default: ~/.config/homerow-mouse/config.toml)
    #[arg(long, short = 'c', value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Backend to start with; failures still fall back to the others
    #[arg(long, short = 'b', value_name = "KIND", global = true)]
    backend: Option<BackendKind>,

    /// Use the toggle controller (mode key + toggle key) instead of hold-to-activate
    #[arg(long, short = 't', action = ArgAction::SetTrue, global = true)]
    toggle: bool,

    /// PID file (default: $XDG_RUNTIME_DIR/homerow-mouse.pid)
    #[arg(long, value_name = "PATH", global = true)]
    pid_file: Option<PathBuf>,

    /// Write a documented config file to the config path and exit
    #[arg(long, action = ArgAction::SetTrue)]
    init_config: bool,

    #[command(subcommand)]
    command: Option<Action>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    /// Run the controller in the foreground (default)
    Run,
    /// Run the controller in the background
    Start,
    /// Stop the background controller
    Stop,
    /// Report whether the controller is running
    Status,
    /// Validate the config file and exit
    Check,
}

impl Cli {
    fn config_path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => Config::get_config_path(),
        }
    }

    fn pid_path(&self) -> Result<PathBuf> {
        match &self.pid_file {
            Some(path) => Ok(path.clone()),
            None => pidfile::default_path(),
        }
    }

    /// Loads the config file and applies command-line overrides.
    fn load_config(&self) -> Result<Config> {
        let path = self.config_path()?;
        if self.config.is_some() && !path.exists() {
            return Err(anyhow!("Config file not found: {}", path.display()));
        }
        let mut config = Config::load_from(&path)?;
        if let Some(kind) = self.backend {
            config.backend.kind = kind;
        }
        if self.toggle {
            config.mode.variant = ModeVariant::Toggle;
        }
        Ok(config)
    }

    /// Options a detached `run` needs to behave like this invocation.
    fn forwarded_args(&self, pid_path: PathBuf) -> Result<Vec<OsString>> {
        let mut args = Vec::new();
        if let Some(path) = &self.config {
            let absolute = std::path::absolute(path)
                .with_context(|| format!("Failed to resolve {}", path.display()))?;
            args.push("--config".into());
            args.push(absolute.into_os_string());
        }
        if let Some(kind) = self.backend {
            args.push("--backend".into());
            args.push(kind.as_str().into());
        }
        if self.toggle {
            args.push("--toggle".into());
        }
        args.push("--pid-file".into());
        args.push(std::path::absolute(&pid_path)?.into_os_string());
        Ok(args)
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    if cli.init_config {
        let path = cli.config_path()?;
        Config::create_default_file(&path)?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    match cli.command.unwrap_or(Action::Run) {
        Action::Run => {
            let config = cli.load_config()?;
            let daemon = Daemon::new(config, cli.pid_path()?)?;
            daemon.run()?;
        }
        Action::Start => {
            let config = cli.load_config()?;
            config.validate().context("Invalid configuration")?;
            let pid_path = cli.pid_path()?;
            let pid = daemon::start(&pid_path, &cli.forwarded_args(pid_path.clone())?)?;
            println!("homerow-mouse started (pid {pid})");
        }
        Action::Stop => match daemon::stop(&cli.pid_path()?, STOP_TIMEOUT)? {
            InstanceStatus::Running(pid) => println!("homerow-mouse stopped (pid {pid})"),
            InstanceStatus::Stale(_) => println!("homerow-mouse is not running (removed stale PID file)"),
            InstanceStatus::NotRunning => println!("homerow-mouse is not running"),
        },
        Action::Status => match daemon::status(&cli.pid_path()?)? {
            InstanceStatus::Running(pid) => println!("homerow-mouse is running (pid {pid})"),
            InstanceStatus::Stale(_) | InstanceStatus::NotRunning => {
                println!("homerow-mouse is not running")
            }
        },
        Action::Check => {
            let config = cli.load_config()?;
            config.validate().context("Invalid configuration")?;
            println!(
                "Configuration OK (backend: {}, mode: {:?})",
                config.backend.kind, config.mode.variant
            );
        }
    }

    Ok(())
}
