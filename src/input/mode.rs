//! Mouse-mode state machine.
//!
//! Two controller variants share one state enum:
//! - `Hold`: mouse mode is on exactly while the mode modifier is physically held.
//! - `Toggle`: pressing the toggle key while the mode modifier is held flips a
//!   persistent flag; releasing the modifier does not leave mouse mode.
//!
//! Both variants honour the quit combo (quit key while the leap modifier is held)
//! and an external quit request. Quitting is terminal.
//!
//! The controller itself performs no I/O. Transition side effects (drag
//! cancellation, cursor quirks) are run by the scheduler when it observes a new
//! state or activation generation.

use super::events::ControlKey;
use super::key_state::KeySnapshot;
use crate::config::ModeVariant;
use log::info;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeState {
    /// Keys pass through as ordinary typing
    Idle,
    /// Mouse mode: control keys steer the pointer
    Active,
    /// Terminal; the scheduler stops before its next tick
    ShuttingDown,
}

/// A transition reported back to the caller of [`ModeController::on_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Activated,
    Deactivated,
    Quit,
}

/// State plus activation generation, compared tick to tick by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeObservation {
    pub state: ModeState,
    /// Incremented on every entry into `Active`
    pub generation: u64,
}

impl ModeObservation {
    pub fn is_active(&self) -> bool {
        self.state == ModeState::Active
    }
}

#[derive(Debug)]
struct ModeInner {
    state: ModeState,
    generation: u64,
}

#[derive(Debug)]
pub struct ModeController {
    variant: ModeVariant,
    inner: Mutex<ModeInner>,
}

impl ModeController {
    pub fn new(variant: ModeVariant) -> Self {
        Self {
            variant,
            inner: Mutex::new(ModeInner {
                state: ModeState::Idle,
                generation: 0,
            }),
        }
    }

    pub fn variant(&self) -> ModeVariant {
        self.variant
    }

    pub fn state(&self) -> ModeState {
        self.lock().state
    }

    pub fn observe(&self) -> ModeObservation {
        let inner = self.lock();
        ModeObservation {
            state: inner.state,
            generation: inner.generation,
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state() == ModeState::ShuttingDown
    }

    /// Requests shutdown from outside the key stream (signals, tests).
    ///
    /// Returns true if this call performed the transition.
    pub fn request_quit(&self) -> bool {
        let mut inner = self.lock();
        if inner.state == ModeState::ShuttingDown {
            return false;
        }
        inner.state = ModeState::ShuttingDown;
        info!("Quit requested - shutting down");
        true
    }

    /// Feeds one held-flag change of `key` into the state machine.
    ///
    /// `keys` is the key snapshot taken right after the change was applied.
    pub fn on_key(&self, key: ControlKey, pressed: bool, keys: &KeySnapshot) -> Option<Transition> {
        let mut inner = self.lock();
        if inner.state == ModeState::ShuttingDown {
            return None;
        }

        if key == ControlKey::Quit && pressed && keys.is_held(ControlKey::Leap) {
            inner.state = ModeState::ShuttingDown;
            info!("Quit combo pressed - shutting down");
            return Some(Transition::Quit);
        }

        match self.variant {
            ModeVariant::Hold => match (key, pressed, inner.state) {
                (ControlKey::Mode, true, ModeState::Idle) => Some(Self::activate(&mut inner)),
                (ControlKey::Mode, false, ModeState::Active) => Some(Self::deactivate(&mut inner)),
                _ => None,
            },
            ModeVariant::Toggle => {
                if key != ControlKey::Toggle || !pressed || !keys.is_held(ControlKey::Mode) {
                    return None;
                }
                match inner.state {
                    ModeState::Idle => Some(Self::activate(&mut inner)),
                    ModeState::Active => Some(Self::deactivate(&mut inner)),
                    ModeState::ShuttingDown => None,
                }
            }
        }
    }

    fn activate(inner: &mut ModeInner) -> Transition {
        inner.state = ModeState::Active;
        inner.generation = inner.generation.wrapping_add(1);
        Transition::Activated
    }

    fn deactivate(inner: &mut ModeInner) -> Transition {
        inner.state = ModeState::Idle;
        Transition::Deactivated
    }

    fn lock(&self) -> MutexGuard<'_, ModeInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
