//! Keeps bound keys away from the focused application while mouse mode is on.
//!
//! Key events are read from evdev, which sees them whether or not X delivers
//! them anywhere else. Suppression therefore only has to stop the X server
//! from passing them on: while engaged, the bound non-modifier keys are
//! passively grabbed on the root window and the resulting events discarded.

use super::events::{ControlKey, KeyCode, Modifier};
use crate::config::Keymap;
use log::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::errors::{ConnectError, ConnectionError};
use x11rb::protocol::xproto::{ConnectionExt as _, GrabMode, Keycode, ModMask, Window};
use x11rb::rust_connection::RustConnection;

/// Offset between Linux input event codes and X keycodes under evdev/xkb.
const X_KEYCODE_OFFSET: u16 = 8;

/// Swallows bound keys while mouse mode is active.
pub trait KeySuppressor: Send {
    /// Starts suppressing. Called on every activation.
    fn engage(&mut self);

    /// Stops suppressing. Safe to call when not engaged.
    fn release(&mut self);
}

/// Keys worth suppressing: every bound key that is not itself a modifier.
///
/// Modifiers stay visible so applications never see half a chord.
pub fn suppressed_codes(keymap: &Keymap) -> Vec<KeyCode> {
    let mut codes: Vec<KeyCode> = ControlKey::ALL
        .iter()
        .flat_map(|key| keymap.codes_for(*key))
        .filter(|code| code.modifier().is_none())
        .collect();
    codes.sort();
    codes.dedup();
    codes
}

/// Maps a Linux key code to the X keycode the server assigns it.
pub fn x_keycode(code: KeyCode) -> Option<Keycode> {
    code.0
        .checked_add(X_KEYCODE_OFFSET)
        .and_then(|keycode| Keycode::try_from(keycode).ok())
}

fn modifier_mask(modifier: Modifier) -> ModMask {
    match modifier {
        Modifier::Alt => ModMask::M1,
        Modifier::Ctrl => ModMask::CONTROL,
        Modifier::Shift => ModMask::SHIFT,
        Modifier::Super => ModMask::M4,
    }
}

/// Masks to try when a key cannot be grabbed under any modifier state.
///
/// Covers the mode modifier alone and combined with Caps Lock and Num Lock,
/// since a passive grab matches the modifier state exactly.
fn fallback_masks(mode_modifier: Option<Modifier>) -> Vec<ModMask> {
    let base = mode_modifier.map(modifier_mask).unwrap_or_default();
    vec![
        base,
        base | ModMask::LOCK,
        base | ModMask::M2,
        base | ModMask::LOCK | ModMask::M2,
    ]
}

/// Passive key grabs on the root window over a dedicated X connection.
pub struct X11KeySuppressor {
    conn: RustConnection,
    root: Window,
    keycodes: Vec<Keycode>,
    fallback: Vec<ModMask>,
    active: Vec<(Keycode, ModMask)>,
}

impl X11KeySuppressor {
    /// Connects to `$DISPLAY`. Nothing is grabbed until [`KeySuppressor::engage`].
    pub fn connect(keymap: &Keymap) -> Result<Self, ConnectError> {
        let (conn, screen_num) = x11rb::connect(None)?;
        let root = conn.setup().roots[screen_num].root;
        let keycodes = suppressed_codes(keymap)
            .into_iter()
            .filter_map(x_keycode)
            .collect::<Vec<_>>();
        info!("Suppressing {} bound keys while mouse mode is on", keycodes.len());
        Ok(Self {
            conn,
            root,
            keycodes,
            fallback: fallback_masks(keymap.modifier_for(ControlKey::Mode)),
            active: Vec::new(),
        })
    }

    fn grab(&self, keycode: Keycode, modifiers: ModMask) -> bool {
        let result = self
            .conn
            .grab_key(
                false,
                self.root,
                modifiers,
                keycode,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
            )
            .map_err(|e| e.to_string())
            .and_then(|cookie| cookie.check().map_err(|e| format!("{e:?}")));
        match result {
            Ok(()) => true,
            Err(e) => {
                debug!("Could not grab keycode {} ({:?}): {}", keycode, modifiers, e);
                false
            }
        }
    }

    /// Discards key events delivered through the grabs.
    fn drain(&self) {
        loop {
            match self.conn.poll_for_event() {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) => {
                    warn!("Key suppression connection failed: {}", e);
                    break;
                }
            }
        }
    }

    fn flush(&self) -> Result<(), ConnectionError> {
        self.conn.flush()
    }
}

impl KeySuppressor for X11KeySuppressor {
    fn engage(&mut self) {
        if !self.active.is_empty() {
            return;
        }
        self.drain();
        for keycode in self.keycodes.clone() {
            if self.grab(keycode, ModMask::ANY) {
                self.active.push((keycode, ModMask::ANY));
                continue;
            }
            // Another client holds a grab on some combination of this key
            let mut any = false;
            for mask in self.fallback.clone() {
                if self.grab(keycode, mask) {
                    self.active.push((keycode, mask));
                    any = true;
                }
            }
            if !any {
                warn!("Keycode {} is grabbed by another client; it will not be suppressed", keycode);
            }
        }
    }

    fn release(&mut self) {
        if self.active.is_empty() {
            return;
        }
        for (keycode, mask) in std::mem::take(&mut self.active) {
            if let Err(e) = self.conn.ungrab_key(keycode, self.root, mask) {
                warn!("Failed to ungrab keycode {}: {}", keycode, e);
            }
        }
        if let Err(e) = self.flush() {
            warn!("Failed to flush key ungrabs: {}", e);
        }
        self.drain();
    }
}

impl Drop for X11KeySuppressor {
    fn drop(&mut self) {
        self.release();
    }
}
