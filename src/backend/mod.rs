//! Pointer-injection backends.
//!
//! Three implementations of [`PointerBackend`] inject synthetic pointer events:
//! - [`x11::X11Backend`]: XTEST requests over one open X11 connection
//! - [`command::CommandBackend`]: one short-lived `xdotool` process per action
//! - [`uinput::UinputBackend`]: a uinput virtual pointer device
//!
//! The scheduler never talks to a concrete backend; it goes through
//! [`FallbackChain`], which swaps implementations on sustained failure.

pub mod chain;
pub mod command;
pub mod uinput;
pub mod x11;

pub use chain::{BackendFactory, ChainError, FallbackChain};

use crate::config::BackendKind;
use crate::input::{Modifier, MouseButton};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{backend} backend unavailable: {reason}")]
    Unavailable { backend: BackendKind, reason: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Command `{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Command `{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    /// Errors after which retrying the same backend is pointless.
    pub fn is_sustained(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::PermissionDenied(_) | Self::ConnectionLost(_)
        )
    }

    /// Errors that count toward the consecutive-failure threshold.
    pub fn is_transient(&self) -> bool {
        !self.is_sustained() && !matches!(self, Self::Unsupported(_))
    }

    /// Classifies an I/O error raised while opening or writing a device node.
    pub fn from_device_io(err: std::io::Error, what: &str) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                Self::PermissionDenied(format!("{what}: {err}"))
            }
            std::io::ErrorKind::NotFound => Self::Unavailable {
                backend: BackendKind::Device,
                reason: format!("{what}: {err}"),
            },
            _ => Self::Io(err),
        }
    }
}

/// A button action as dispatched by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    /// Press and immediate release
    Click(MouseButton),
    Press(MouseButton),
    Release(MouseButton),
}

impl ButtonAction {
    pub fn button(self) -> MouseButton {
        match self {
            Self::Click(button) | Self::Press(button) | Self::Release(button) => button,
        }
    }
}

/// Capability surface shared by every injection backend.
///
/// All operations are synchronous and bounded in time. Buttons and modifiers
/// pressed through a backend are tracked by it and released again by
/// [`PointerBackend::shutdown`].
pub trait PointerBackend: Send {
    fn kind(&self) -> BackendKind;

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), BackendError>;

    fn move_absolute(&mut self, x: i32, y: i32) -> Result<(), BackendError>;

    fn button(&mut self, button: MouseButton, pressed: bool) -> Result<(), BackendError>;

    /// Positive `delta` scrolls up, negative scrolls down, in wheel clicks.
    fn scroll(&mut self, delta: i32) -> Result<(), BackendError>;

    /// Virtually presses or releases a keyboard modifier.
    fn modifier(&mut self, modifier: Modifier, pressed: bool) -> Result<(), BackendError>;

    fn query_position(&mut self) -> Result<(i32, i32), BackendError>;

    /// Releases held buttons and modifiers and closes the session. Safe to call
    /// repeatedly.
    fn shutdown(&mut self);

    fn apply(&mut self, action: ButtonAction) -> Result<(), BackendError> {
        match action {
            ButtonAction::Click(button) => {
                self.button(button, true)?;
                self.button(button, false)
            }
            ButtonAction::Press(button) => self.button(button, true),
            ButtonAction::Release(button) => self.button(button, false),
        }
    }

    /// Performs `action` with `held` modifiers virtually released around it,
    /// so applications see a plain click rather than Alt+click.
    ///
    /// Modifiers are restored even when the action itself fails.
    fn apply_unmodified(
        &mut self,
        action: ButtonAction,
        held: &[Modifier],
    ) -> Result<(), BackendError> {
        if held.is_empty() {
            return self.apply(action);
        }

        for modifier in held {
            self.modifier(*modifier, false)?;
        }
        let result = self.apply(action);
        let mut restored = Ok(());
        for modifier in held.iter().rev() {
            if let Err(e) = self.modifier(*modifier, true) {
                restored = Err(e);
            }
        }
        result.and(restored)
    }
}

/// Buttons or modifier keys a backend has virtually pressed and not yet released.
#[derive(Debug, Clone)]
pub(crate) struct Held<T>(Vec<T>);

impl<T> Default for Held<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T: Copy + PartialEq> Held<T> {
    pub(crate) fn record(&mut self, item: T, pressed: bool) {
        if pressed {
            if !self.0.contains(&item) {
                self.0.push(item);
            }
        } else {
            self.0.retain(|held| *held != item);
        }
    }

    /// Drains the set, most recently pressed first.
    pub(crate) fn take(&mut self) -> Vec<T> {
        let mut items = std::mem::take(&mut self.0);
        items.reverse();
        items
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, item: T) -> bool {
        self.0.contains(&item)
    }
}
