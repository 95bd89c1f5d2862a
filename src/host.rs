//! X session quirks around mouse mode.
//!
//! Some X setups hide the pointer after keyboard activity or blank the screen
//! while no physical mouse moves. These helpers shell out to `xsetroot` and
//! `xset` through the same bounded runner as the command backend. Failures are
//! logged at debug level and otherwise ignored.

use crate::backend::command::run_with_timeout;
use log::debug;
use std::thread;
use std::time::Duration;

const QUIRK_TIMEOUT: Duration = Duration::from_millis(500);

fn run_quiet(program: &str, args: &[&str]) {
    let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
    if let Err(e) = run_with_timeout(program, &args, QUIRK_TIMEOUT) {
        debug!("{} {} failed: {}", program, args.join(" "), e);
    }
}

/// Re-asserts a visible arrow cursor and resets the screensaver timer.
///
/// The commands run on a detached helper thread; the caller never waits.
pub fn restore_cursor_visibility() {
    let spawned = thread::Builder::new()
        .name("cursor-refresh".into())
        .spawn(|| {
            run_quiet("xsetroot", &["-cursor_name", "left_ptr"]);
            run_quiet("xset", &["s", "reset"]);
        });
    if let Err(e) = spawned {
        debug!("Failed to spawn cursor refresh: {}", e);
    }
}

/// Turns off screen blanking and DPMS for the lifetime of the controller.
pub fn disable_screensaver() {
    run_quiet("xset", &["s", "off"]);
    run_quiet("xset", &["s", "noblank"]);
    run_quiet("xset", &["-dpms"]);
}

/// Undoes [`disable_screensaver`].
pub fn restore_screensaver() {
    run_quiet("xset", &["s", "on"]);
    run_quiet("xset", &["+dpms"]);
}

/// Keeps the screensaver disabled until dropped.
#[derive(Debug)]
pub struct ScreensaverGuard(());

impl ScreensaverGuard {
    pub fn engage() -> Self {
        disable_screensaver();
        Self(())
    }
}

impl Drop for ScreensaverGuard {
    fn drop(&mut self) {
        restore_screensaver();
    }
}
