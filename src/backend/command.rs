//! Command-invocation backend (`xdotool`).
//!
//! Every action is one short-lived process. Actions that belong together
//! (a click wrapped in modifier release/restore) are batched into a single
//! invocation, since xdotool accepts chained sub-commands.

use super::{BackendError, ButtonAction, Held, PointerBackend};
use crate::config::{BackendConfig, BackendKind};
use crate::input::{Modifier, MouseButton};
use log::{debug, info, warn};
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Runs `program args...` and returns its stdout, killing it after `timeout`.
///
/// # Errors
/// - [`BackendError::Unavailable`] if the program does not exist
/// - [`BackendError::Timeout`] if it overran and was killed
/// - [`BackendError::CommandFailed`] on a non-zero exit
pub fn run_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<String, BackendError> {
    let describe = || format!("{} {}", program, args.join(" "));

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BackendError::Unavailable {
                backend: BackendKind::Command,
                reason: format!("`{program}` not found in PATH"),
            },
            std::io::ErrorKind::PermissionDenied => {
                BackendError::PermissionDenied(format!("cannot execute `{program}`: {e}"))
            }
            _ => BackendError::Io(e),
        })?;

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            if let Err(e) = child.kill() {
                warn!("Failed to kill overrunning `{}`: {}", describe(), e);
            }
            // Reap so no zombie is left behind
            let _ = child.wait();
            return Err(BackendError::Timeout {
                command: describe(),
                timeout,
            });
        }
        thread::sleep(POLL_INTERVAL);
    };

    let mut stdout = String::new();
    if let Some(mut out) = child.stdout.take() {
        out.read_to_string(&mut stdout)?;
    }

    if !status.success() {
        let mut stderr = String::new();
        if let Some(mut err) = child.stderr.take() {
            let _ = err.read_to_string(&mut stderr);
        }
        let reason = if stderr.trim().is_empty() {
            format!("exited with {status}")
        } else {
            format!("exited with {status}: {}", stderr.trim())
        };
        return Err(BackendError::CommandFailed {
            command: describe(),
            reason,
        });
    }

    Ok(stdout)
}

fn modifier_name(modifier: Modifier) -> &'static str {
    match modifier {
        Modifier::Alt => "alt",
        Modifier::Ctrl => "ctrl",
        Modifier::Shift => "shift",
        Modifier::Super => "super",
    }
}

fn button_args(action: ButtonAction) -> Vec<String> {
    let number = action.button().x11_number().to_string();
    let verb = match action {
        ButtonAction::Click(_) => "click",
        ButtonAction::Press(_) => "mousedown",
        ButtonAction::Release(_) => "mouseup",
    };
    vec![verb.to_string(), number]
}

/// Parses the `X=..`/`Y=..` lines printed by `getmouselocation --shell`.
fn parse_location(output: &str) -> Option<(i32, i32)> {
    let mut x = None;
    let mut y = None;
    for line in output.lines() {
        if let Some(value) = line.trim().strip_prefix("X=") {
            x = value.parse().ok();
        } else if let Some(value) = line.trim().strip_prefix("Y=") {
            y = value.parse().ok();
        }
    }
    Some((x?, y?))
}

pub struct CommandBackend {
    program: String,
    timeout: Duration,
    held: Held<MouseButton>,
    modifiers: Held<Modifier>,
    closed: bool,
}

impl CommandBackend {
    /// Checks that the automation command can be run at all.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let backend = Self {
            program: config.command.clone(),
            timeout: config.command_timeout(),
            held: Held::default(),
            modifiers: Held::default(),
            closed: false,
        };
        let version = backend.run(vec!["version".to_string()]).map_err(|e| match e {
            BackendError::CommandFailed { reason, .. } => BackendError::Unavailable {
                backend: BackendKind::Command,
                reason,
            },
            other => other,
        })?;
        info!(
            "Command backend ready: {} ({})",
            backend.program,
            version.lines().next().unwrap_or("unknown version").trim()
        );
        Ok(backend)
    }

    fn run(&self, args: Vec<String>) -> Result<String, BackendError> {
        debug!("{} {}", self.program, args.join(" "));
        run_with_timeout(&self.program, &args, self.timeout)
    }

    fn record(&mut self, action: ButtonAction) {
        match action {
            ButtonAction::Click(_) => {}
            ButtonAction::Press(button) => self.held.record(button, true),
            ButtonAction::Release(button) => self.held.record(button, false),
        }
    }
}

impl PointerBackend for CommandBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Command
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), BackendError> {
        // `--` keeps negative offsets from being read as options
        self.run(vec![
            "mousemove_relative".into(),
            "--".into(),
            dx.to_string(),
            dy.to_string(),
        ])
        .map(drop)
    }

    fn move_absolute(&mut self, x: i32, y: i32) -> Result<(), BackendError> {
        self.run(vec!["mousemove".into(), x.to_string(), y.to_string()])
            .map(drop)
    }

    fn button(&mut self, button: MouseButton, pressed: bool) -> Result<(), BackendError> {
        let action = if pressed {
            ButtonAction::Press(button)
        } else {
            ButtonAction::Release(button)
        };
        self.run(button_args(action))?;
        self.record(action);
        Ok(())
    }

    fn scroll(&mut self, delta: i32) -> Result<(), BackendError> {
        if delta == 0 {
            return Ok(());
        }
        let wheel = if delta > 0 { "4" } else { "5" };
        self.run(vec![
            "click".into(),
            "--repeat".into(),
            delta.unsigned_abs().to_string(),
            "--delay".into(),
            "0".into(),
            wheel.into(),
        ])
        .map(drop)
    }

    fn modifier(&mut self, modifier: Modifier, pressed: bool) -> Result<(), BackendError> {
        let verb = if pressed { "keydown" } else { "keyup" };
        self.run(vec![verb.into(), modifier_name(modifier).into()])?;
        self.modifiers.record(modifier, pressed);
        Ok(())
    }

    fn query_position(&mut self) -> Result<(i32, i32), BackendError> {
        let output = self.run(vec!["getmouselocation".into(), "--shell".into()])?;
        parse_location(&output).ok_or_else(|| BackendError::CommandFailed {
            command: format!("{} getmouselocation --shell", self.program),
            reason: format!("unexpected output: {}", output.trim()),
        })
    }

    fn apply(&mut self, action: ButtonAction) -> Result<(), BackendError> {
        self.run(button_args(action))?;
        self.record(action);
        Ok(())
    }

    fn apply_unmodified(
        &mut self,
        action: ButtonAction,
        held: &[Modifier],
    ) -> Result<(), BackendError> {
        if held.is_empty() {
            return self.apply(action);
        }
        let names: Vec<&str> = held.iter().map(|m| modifier_name(*m)).collect();
        let mut args = Vec::new();
        for name in &names {
            args.push("keyup".to_string());
            args.push(name.to_string());
        }
        args.extend(button_args(action));
        for name in names.iter().rev() {
            args.push("keydown".to_string());
            args.push(name.to_string());
        }
        self.run(args)?;
        self.record(action);
        for modifier in held {
            self.modifiers.record(*modifier, true);
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for button in self.held.take() {
            if let Err(e) = self.run(button_args(ButtonAction::Release(button))) {
                warn!("Failed to release {:?} on shutdown: {}", button, e);
            }
        }
        let modifiers = self.modifiers.take();
        if !modifiers.is_empty() {
            let mut args = Vec::new();
            for modifier in &modifiers {
                args.push("keyup".to_string());
                args.push(modifier_name(*modifier).to_string());
            }
            if let Err(e) = self.run(args) {
                warn!("Failed to release {:?} on shutdown: {}", modifiers, e);
            }
        }
        debug!("Command backend shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Writes a stand-in for xdotool that logs its arguments, one invocation per line.
    fn fake_tool(dir: &Path, body: &str) -> (PathBuf, PathBuf) {
        let log = dir.join("calls.log");
        let script = dir.join("fake-xdotool");
        fs::write(
            &script,
            format!(
                "#!/bin/sh\necho \"$*\" >> '{}'\n{}\n",
                log.display(),
                body
            ),
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        (script, log)
    }

    fn backend(script: &Path) -> CommandBackend {
        let config = BackendConfig {
            command: script.display().to_string(),
            command_timeout_ms: 2000,
            ..BackendConfig::default()
        };
        CommandBackend::new(&config).unwrap()
    }

    fn calls(log: &Path) -> Vec<String> {
        fs::read_to_string(log)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn missing_program_is_unavailable() {
        let err = run_with_timeout(
            "homerow-mouse-definitely-missing",
            &[],
            Duration::from_millis(100),
        )
        .unwrap_err();
        assert!(err.is_sustained(), "{err}");
    }

    #[test]
    fn overrunning_child_is_killed() {
        let started = Instant::now();
        let err = run_with_timeout("sleep", &["5".to_string()], Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, BackendError::Timeout { .. }), "{err}");
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn nonzero_exit_is_transient_failure() {
        let err = run_with_timeout("false", &[], Duration::from_secs(2)).unwrap_err();
        assert!(matches!(err, BackendError::CommandFailed { .. }), "{err}");
        assert!(err.is_transient());
    }

    #[test]
    fn actions_map_to_xdotool_subcommands() {
        let temp = TempDir::new().unwrap();
        let (script, log) = fake_tool(temp.path(), "");
        let mut backend = backend(&script);

        backend.move_relative(-3, 4).unwrap();
        backend.move_absolute(10, 20).unwrap();
        backend.scroll(2).unwrap();
        backend.scroll(-1).unwrap();
        backend.scroll(0).unwrap();
        backend.button(MouseButton::Left, true).unwrap();
        backend.button(MouseButton::Left, false).unwrap();

        assert_eq!(
            calls(&log),
            vec![
                "version",
                "mousemove_relative -- -3 4",
                "mousemove 10 20",
                "click --repeat 2 --delay 0 4",
                "click --repeat 1 --delay 0 5",
                "mousedown 1",
                "mouseup 1",
            ]
        );
    }

    #[test]
    fn unmodified_click_is_one_invocation() {
        let temp = TempDir::new().unwrap();
        let (script, log) = fake_tool(temp.path(), "");
        let mut backend = backend(&script);

        backend
            .apply_unmodified(ButtonAction::Click(MouseButton::Right), &[Modifier::Alt])
            .unwrap();

        assert_eq!(calls(&log)[1], "keyup alt click 3 keydown alt");
    }

    #[test]
    fn shutdown_releases_latched_drag_and_restored_modifier_once() {
        let temp = TempDir::new().unwrap();
        let (script, log) = fake_tool(temp.path(), "");
        let mut backend = backend(&script);

        backend
            .apply_unmodified(ButtonAction::Press(MouseButton::Left), &[Modifier::Alt])
            .unwrap();
        backend.shutdown();
        backend.shutdown();

        assert_eq!(
            calls(&log),
            vec![
                "version",
                "keyup alt mousedown 1 keydown alt",
                "mouseup 1",
                "keyup alt",
            ]
        );
    }

    #[test]
    fn released_modifier_is_not_released_again_on_shutdown() {
        let temp = TempDir::new().unwrap();
        let (script, log) = fake_tool(temp.path(), "");
        let mut backend = backend(&script);

        backend
            .apply_unmodified(ButtonAction::Click(MouseButton::Left), &[Modifier::Ctrl, Modifier::Alt])
            .unwrap();
        backend.modifier(Modifier::Alt, false).unwrap();
        backend.shutdown();

        assert_eq!(
            calls(&log),
            vec![
                "version",
                "keyup ctrl keyup alt click 1 keydown alt keydown ctrl",
                "keyup alt",
                "keyup ctrl",
            ]
        );
    }

    #[test]
    fn query_position_parses_shell_output() {
        let temp = TempDir::new().unwrap();
        let (script, _) = fake_tool(temp.path(), "echo X=640\necho Y=480\necho SCREEN=0");
        let mut backend = backend(&script);
        assert_eq!(backend.query_position().unwrap(), (640, 480));
    }

    #[test]
    fn parse_location_requires_both_axes() {
        assert_eq!(parse_location("X=1\nY=2\n"), Some((1, 2)));
        assert_eq!(parse_location("X=1\n"), None);
    }
}
