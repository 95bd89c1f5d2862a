//! Thread-safe record of which control keys are currently held.

use super::events::ControlKey;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A consistent copy of every tracked key at one instant.
///
/// Besides the held flag, each key carries a press counter that advances only
/// on real up→down transitions. Edge-triggered consumers compare counters
/// between two snapshots so that a tap shorter than one tick is still seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeySnapshot {
    held: [bool; ControlKey::COUNT],
    presses: [u32; ControlKey::COUNT],
}

impl KeySnapshot {
    pub fn is_held(&self, key: ControlKey) -> bool {
        self.held[key.index()]
    }

    /// Number of up→down transitions seen for `key` (wrapping).
    pub fn press_count(&self, key: ControlKey) -> u32 {
        self.presses[key.index()]
    }

    /// Presses of `key` that happened after `earlier` was taken.
    pub fn presses_since(&self, earlier: &KeySnapshot, key: ControlKey) -> u32 {
        self.press_count(key).wrapping_sub(earlier.press_count(key))
    }

    /// Applies one transition; returns true if the held flag changed.
    fn apply(&mut self, key: ControlKey, pressed: bool) -> bool {
        let slot = &mut self.held[key.index()];
        if *slot == pressed {
            return false;
        }
        *slot = pressed;
        if pressed {
            let count = &mut self.presses[key.index()];
            *count = count.wrapping_add(1);
        }
        true
    }
}

/// Shared key state, written by the listener and read once per tick by the scheduler.
#[derive(Debug, Default)]
pub struct KeyState {
    inner: Mutex<KeySnapshot>,
}

impl KeyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a press or release of `key`.
    ///
    /// Idempotent: a repeated press while already held (autorepeat) is a no-op,
    /// as is a release of a key that is not held. Returns whether anything changed.
    pub fn set_pressed(&self, key: ControlKey, pressed: bool) -> bool {
        self.lock().apply(key, pressed)
    }

    /// Records a transition and returns the snapshot as it stands right after it.
    pub(crate) fn update(&self, key: ControlKey, pressed: bool) -> (bool, KeySnapshot) {
        let mut guard = self.lock();
        let changed = guard.apply(key, pressed);
        (changed, *guard)
    }

    /// Atomic copy of all keys; never observes a partially applied update.
    pub fn snapshot(&self) -> KeySnapshot {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, KeySnapshot> {
        // A panic while holding this lock cannot leave the plain-data snapshot torn.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
