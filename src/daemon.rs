//! Controller lifecycle: foreground run, detached start, stop and status.
//!
//! `run` owns the process-wide pieces: the PID file, the signal thread, and the
//! shared key/mode state. The keyboard readers and the motion loop are started
//! by a [`ControllerRunner`], which tests replace to exercise the lifecycle
//! without touching real devices.

use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::ffi::OsString;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::backend::{FallbackChain, chain::system_factory};
use crate::config::{Config, Keymap};
use crate::host::{self, ScreensaverGuard};
use crate::input::{InputRouter, KeyState, ModeController, X11KeySuppressor, listener};
use crate::motion::MotionScheduler;
use crate::pidfile::{self, InstanceStatus, PidFile};

/// Starts the input side and the motion loop, returning when the loop ends.
pub type ControllerRunner =
    dyn Fn(&Config, Arc<Keymap>, Arc<KeyState>, Arc<ModeController>) -> Result<()> + Send + Sync;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const START_GRACE: Duration = Duration::from_millis(300);

pub struct Daemon {
    config: Config,
    keymap: Arc<Keymap>,
    pid_path: PathBuf,
    runner: Arc<ControllerRunner>,
}

impl Daemon {
    /// Validates `config` and prepares a daemon that records itself in `pid_path`.
    pub fn new(config: Config, pid_path: PathBuf) -> Result<Self> {
        Self::with_runner(config, pid_path, Arc::new(run_controller))
    }

    pub fn with_runner(
        config: Config,
        pid_path: PathBuf,
        runner: Arc<ControllerRunner>,
    ) -> Result<Self> {
        let keymap = config.validate().context("Invalid configuration")?;
        Ok(Self {
            config,
            keymap: Arc::new(keymap),
            pid_path,
            runner,
        })
    }

    /// Runs in the foreground until quit, a termination signal, or backend exhaustion.
    pub fn run(&self) -> Result<()> {
        let pid_file = PidFile::acquire(&self.pid_path)?;
        info!(
            "Starting homerow-mouse (pid {}, {:?} mode, pid file {})",
            std::process::id(),
            self.config.mode.variant,
            pid_file.path().display()
        );

        let keys = Arc::new(KeyState::new());
        let mode = Arc::new(ModeController::new(self.config.mode.variant));

        let mut signals =
            Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handler")?;
        let signal_handle = signals.handle();
        let signal_mode = mode.clone();
        let signal_thread = thread::Builder::new()
            .name("signals".into())
            .spawn(move || {
                for sig in signals.forever() {
                    info!(
                        "Received {} - shutting down",
                        if sig == SIGTERM { "SIGTERM" } else { "SIGINT" }
                    );
                    signal_mode.request_quit();
                }
            })
            .context("Failed to spawn signal thread")?;

        let result = (self.runner)(&self.config, self.keymap.clone(), keys, mode.clone());

        // Keyboard readers notice this after their next batch of events
        mode.request_quit();
        signal_handle.close();
        if signal_thread.join().is_err() {
            warn!("Signal thread panicked");
        }

        match &result {
            Ok(()) => info!("homerow-mouse stopped"),
            Err(e) => warn!("homerow-mouse stopped with an error: {:#}", e),
        }
        drop(pid_file);
        result
    }
}

fn run_controller(
    config: &Config,
    keymap: Arc<Keymap>,
    keys: Arc<KeyState>,
    mode: Arc<ModeController>,
) -> Result<()> {
    let router = InputRouter::new(keymap.clone(), keys.clone(), mode.clone());
    let keyboards = listener::spawn_keyboard_listeners(router, &config.backend.device_name)?;
    info!("Reading {} keyboard(s)", keyboards.len());

    let chain = FallbackChain::new(config.backend.kind, system_factory(config.backend.clone()));
    let mut scheduler = MotionScheduler::new(config, &keymap, keys, mode, chain);
    if config.mode.restore_cursor {
        scheduler = scheduler.with_cursor_hook(Box::new(host::restore_cursor_visibility));
    }
    if config.mode.suppress_keys {
        match X11KeySuppressor::connect(&keymap) {
            Ok(suppressor) => scheduler = scheduler.with_key_suppressor(Box::new(suppressor)),
            Err(e) => warn!("Bound keys will reach applications; X11 grab unavailable: {}", e),
        }
    }

    let _screensaver = config
        .mode
        .disable_screensaver
        .then(ScreensaverGuard::engage);

    scheduler.run()?;
    Ok(())
}

/// Launches `run` in a new background process and returns its PID.
///
/// `args` are forwarded ahead of the `run` subcommand.
pub fn start(pid_path: &Path, args: &[OsString]) -> Result<u32> {
    if let InstanceStatus::Running(pid) = pidfile::inspect(pid_path)? {
        return Err(anyhow!("homerow-mouse is already running (pid {pid})"));
    }

    let exe = std::env::current_exe().context("Could not locate the homerow-mouse binary")?;
    let mut child = Command::new(exe)
        .args(args)
        .arg("run")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .context("Failed to spawn background process")?;

    thread::sleep(START_GRACE);
    if let Some(status) = child.try_wait().context("Failed to check background process")? {
        return Err(anyhow!(
            "Background process exited immediately ({status}); run in the foreground to see why"
        ));
    }
    debug!("Detached background process {}", child.id());
    Ok(child.id())
}

/// Asks a running instance to shut down and waits up to `timeout` for it to go.
///
/// Returns what was found before stopping. Stale PID files are removed.
pub fn stop(pid_path: &Path, timeout: Duration) -> Result<InstanceStatus> {
    let status = pidfile::inspect(pid_path)?;
    match status {
        InstanceStatus::NotRunning => {}
        InstanceStatus::Stale(_) => pidfile::remove_stale(pid_path)?,
        InstanceStatus::Running(pid) => {
            kill(Pid::from_raw(pid), Signal::SIGTERM)
                .with_context(|| format!("Failed to signal pid {pid}"))?;
            let deadline = Instant::now() + timeout;
            while matches!(pidfile::inspect(pid_path)?, InstanceStatus::Running(_)) {
                if Instant::now() >= deadline {
                    return Err(anyhow!("pid {pid} did not exit within {timeout:?}"));
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
    Ok(status)
}

/// Reports whether an instance is running.
pub fn status(pid_path: &Path) -> Result<InstanceStatus> {
    pidfile::inspect(pid_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModeVariant;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn runner<F>(f: F) -> Arc<ControllerRunner>
    where
        F: Fn(&Config, Arc<Keymap>, Arc<KeyState>, Arc<ModeController>) -> Result<()>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(f)
    }

    fn runner_counter(count: Arc<AtomicUsize>) -> Arc<ControllerRunner> {
        runner(move |_, _, _, mode| {
            count.fetch_add(1, Ordering::SeqCst);
            assert!(!mode.is_shutting_down());
            Ok(())
        })
    }

    #[test]
    fn run_invokes_runner_and_removes_pid_file() {
        let dir = TempDir::new().unwrap();
        let pid_path = dir.path().join("hm.pid");
        let counter = Arc::new(AtomicUsize::new(0));
        let daemon = Daemon::with_runner(
            Config::default(),
            pid_path.clone(),
            runner_counter(counter.clone()),
        )
        .unwrap();

        daemon.run().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!pid_path.exists());
    }

    #[test]
    fn run_holds_pid_file_while_running() {
        let dir = TempDir::new().unwrap();
        let pid_path = dir.path().join("hm.pid");
        let seen = pid_path.clone();
        let check = runner(move |config, _, _, mode| {
            assert_eq!(config.mode.variant, ModeVariant::Toggle);
            assert_eq!(mode.variant(), ModeVariant::Toggle);
            assert_eq!(
                pidfile::inspect(&seen).unwrap(),
                InstanceStatus::Running(std::process::id() as i32)
            );
            assert!(PidFile::acquire(&seen).is_err());
            Ok(())
        });

        let mut config = Config::default();
        config.mode.variant = ModeVariant::Toggle;
        Daemon::with_runner(config, pid_path, check)
            .unwrap()
            .run()
            .unwrap();
    }

    #[test]
    fn runner_error_is_returned_after_cleanup() {
        let dir = TempDir::new().unwrap();
        let pid_path = dir.path().join("hm.pid");
        let failing = runner(|_, _, _, _| Err(anyhow!("all pointer backends failed")));

        let err = Daemon::with_runner(Config::default(), pid_path.clone(), failing)
            .unwrap()
            .run()
            .unwrap_err();
        assert!(err.to_string().contains("all pointer backends failed"));
        assert!(!pid_path.exists());
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let mut config = Config::default();
        config.motion.tick_interval_ms = 0;
        let noop = runner(|_, _, _, _| Ok(()));
        assert!(Daemon::with_runner(config, PathBuf::from("/nonexistent/hm.pid"), noop).is_err());
    }

    #[test]
    fn stop_handles_missing_and_stale_files() {
        let dir = TempDir::new().unwrap();
        let pid_path = dir.path().join("hm.pid");
        assert_eq!(
            stop(&pid_path, Duration::from_millis(10)).unwrap(),
            InstanceStatus::NotRunning
        );

        std::fs::write(&pid_path, "4242\n").unwrap();
        assert_eq!(
            stop(&pid_path, Duration::from_millis(10)).unwrap(),
            InstanceStatus::Stale(Some(4242))
        );
        assert!(!pid_path.exists());
        assert_eq!(status(&pid_path).unwrap(), InstanceStatus::NotRunning);
    }

    #[test]
    fn start_refuses_when_already_running() {
        let dir = TempDir::new().unwrap();
        let pid_path = dir.path().join("hm.pid");
        let _guard = PidFile::acquire(&pid_path).unwrap();
        let err = start(&pid_path, &[]).unwrap_err();
        assert!(err.to_string().contains("already running"));
    }
}
