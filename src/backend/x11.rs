//! Direct-protocol backend: XTEST fake input over one X11 connection.

use super::{BackendError, Held, PointerBackend};
use crate::config::BackendKind;
use crate::input::{Modifier, MouseButton};
use log::{debug, info, warn};
use std::collections::HashMap;
use x11rb::connection::Connection;
use x11rb::errors::{ConnectionError, ReplyError};
use x11rb::protocol::xproto::{
    BUTTON_PRESS_EVENT, BUTTON_RELEASE_EVENT, ConnectionExt as _, KEY_PRESS_EVENT,
    KEY_RELEASE_EVENT, Keycode, MOTION_NOTIFY_EVENT, Window,
};
use x11rb::protocol::xtest::ConnectionExt as _;
use x11rb::rust_connection::RustConnection;

const WHEEL_UP: u8 = 4;
const WHEEL_DOWN: u8 = 5;

// Left-hand keysyms for each modifier
const XK_SHIFT_L: u32 = 0xffe1;
const XK_CONTROL_L: u32 = 0xffe3;
const XK_ALT_L: u32 = 0xffe9;
const XK_SUPER_L: u32 = 0xffeb;

fn modifier_keysym(modifier: Modifier) -> u32 {
    match modifier {
        Modifier::Alt => XK_ALT_L,
        Modifier::Ctrl => XK_CONTROL_L,
        Modifier::Shift => XK_SHIFT_L,
        Modifier::Super => XK_SUPER_L,
    }
}

impl From<ConnectionError> for BackendError {
    fn from(err: ConnectionError) -> Self {
        BackendError::ConnectionLost(err.to_string())
    }
}

impl From<ReplyError> for BackendError {
    fn from(err: ReplyError) -> Self {
        match err {
            ReplyError::ConnectionError(e) => e.into(),
            ReplyError::X11Error(e) => BackendError::Protocol(format!("{e:?}")),
        }
    }
}

pub struct X11Backend {
    conn: RustConnection,
    root: Window,
    modifier_codes: HashMap<Modifier, Keycode>,
    held: Held<MouseButton>,
    modifiers: Held<Modifier>,
    closed: bool,
}

impl X11Backend {
    /// Connects to `$DISPLAY` and checks for the XTEST extension.
    pub fn connect() -> Result<Self, BackendError> {
        let unavailable = |reason: String| BackendError::Unavailable {
            backend: BackendKind::Direct,
            reason,
        };

        let (conn, screen_num) = RustConnection::connect(None)
            .map_err(|e| unavailable(format!("failed to connect to X11: {e}")))?;

        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .ok_or_else(|| unavailable(format!("screen {screen_num} not found")))?
            .root;

        let version = conn
            .xtest_get_version(2, 2)
            .map_err(|e| unavailable(format!("XTEST extension missing: {e}")))?
            .reply()
            .map_err(|e| unavailable(format!("XTEST extension missing: {e}")))?;

        let modifier_codes = Self::resolve_modifiers(&conn)?;

        info!(
            "Connected to X11 display (XTEST {}.{})",
            version.major_version, version.minor_version
        );
        Ok(Self {
            conn,
            root,
            modifier_codes,
            held: Held::default(),
            modifiers: Held::default(),
            closed: false,
        })
    }

    /// Finds a keycode for each modifier keysym in the current keyboard mapping.
    fn resolve_modifiers(conn: &RustConnection) -> Result<HashMap<Modifier, Keycode>, BackendError> {
        let setup = conn.setup();
        let min = setup.min_keycode;
        let count = setup.max_keycode.saturating_sub(min).saturating_add(1);
        let mapping = conn.get_keyboard_mapping(min, count)?.reply()?;
        let per_code = usize::from(mapping.keysyms_per_keycode);

        let mut codes = HashMap::new();
        if per_code == 0 {
            return Ok(codes);
        }
        for modifier in [Modifier::Alt, Modifier::Ctrl, Modifier::Shift, Modifier::Super] {
            let wanted = modifier_keysym(modifier);
            let found = mapping
                .keysyms
                .chunks(per_code)
                .position(|syms| syms.contains(&wanted));
            match found.and_then(|index| u8::try_from(index).ok()) {
                Some(offset) => {
                    codes.insert(modifier, min.saturating_add(offset));
                }
                None => debug!("No keycode for {:?} in keyboard mapping", modifier),
            }
        }
        Ok(codes)
    }

    fn fake(&self, event_type: u8, detail: u8, x: i16, y: i16, root: Window) -> Result<(), BackendError> {
        self.conn
            .xtest_fake_input(event_type, detail, x11rb::CURRENT_TIME, root, x, y, 0)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), BackendError> {
        self.conn.flush()?;
        Ok(())
    }
}

fn clamp_i16(value: i32) -> i16 {
    value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

impl PointerBackend for X11Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::Direct
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), BackendError> {
        // detail = 1 marks the motion as relative
        self.fake(MOTION_NOTIFY_EVENT, 1, clamp_i16(dx), clamp_i16(dy), x11rb::NONE)?;
        self.flush()
    }

    fn move_absolute(&mut self, x: i32, y: i32) -> Result<(), BackendError> {
        self.fake(MOTION_NOTIFY_EVENT, 0, clamp_i16(x), clamp_i16(y), self.root)?;
        self.flush()
    }

    fn button(&mut self, button: MouseButton, pressed: bool) -> Result<(), BackendError> {
        let event_type = if pressed {
            BUTTON_PRESS_EVENT
        } else {
            BUTTON_RELEASE_EVENT
        };
        self.fake(event_type, button.x11_number(), 0, 0, x11rb::NONE)?;
        self.flush()?;
        self.held.record(button, pressed);
        Ok(())
    }

    fn scroll(&mut self, delta: i32) -> Result<(), BackendError> {
        let wheel = if delta > 0 { WHEEL_UP } else { WHEEL_DOWN };
        for _ in 0..delta.unsigned_abs() {
            self.fake(BUTTON_PRESS_EVENT, wheel, 0, 0, x11rb::NONE)?;
            self.fake(BUTTON_RELEASE_EVENT, wheel, 0, 0, x11rb::NONE)?;
        }
        self.flush()
    }

    fn modifier(&mut self, modifier: Modifier, pressed: bool) -> Result<(), BackendError> {
        let code = *self
            .modifier_codes
            .get(&modifier)
            .ok_or(BackendError::Unsupported("modifier without a keycode"))?;
        let event_type = if pressed {
            KEY_PRESS_EVENT
        } else {
            KEY_RELEASE_EVENT
        };
        self.fake(event_type, code, 0, 0, x11rb::NONE)?;
        self.flush()?;
        self.modifiers.record(modifier, pressed);
        Ok(())
    }

    fn query_position(&mut self) -> Result<(i32, i32), BackendError> {
        let reply = self.conn.query_pointer(self.root)?.reply()?;
        Ok((i32::from(reply.root_x), i32::from(reply.root_y)))
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for button in self.held.take() {
            let released = self
                .fake(BUTTON_RELEASE_EVENT, button.x11_number(), 0, 0, x11rb::NONE)
                .and_then(|_| self.flush());
            if let Err(e) = released {
                warn!("Failed to release {:?} on shutdown: {}", button, e);
            }
        }
        for modifier in self.modifiers.take() {
            let Some(code) = self.modifier_codes.get(&modifier).copied() else {
                continue;
            };
            let released = self
                .fake(KEY_RELEASE_EVENT, code, 0, 0, x11rb::NONE)
                .and_then(|_| self.flush());
            if let Err(e) = released {
                warn!("Failed to release {:?} on shutdown: {}", modifier, e);
            }
        }
        debug!("X11 backend shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_clamped_to_protocol_range() {
        assert_eq!(clamp_i16(40_000), i16::MAX);
        assert_eq!(clamp_i16(-40_000), i16::MIN);
        assert_eq!(clamp_i16(-7), -7);
    }

    #[test]
    fn every_modifier_has_a_keysym() {
        let syms: Vec<u32> = [Modifier::Alt, Modifier::Ctrl, Modifier::Shift, Modifier::Super]
            .into_iter()
            .map(modifier_keysym)
            .collect();
        assert_eq!(syms, vec![0xffe9, 0xffe3, 0xffe1, 0xffeb]);
    }

    #[test]
    fn connection_errors_are_sustained() {
        let err: BackendError = ConnectionError::UnknownError.into();
        assert!(err.is_sustained());
    }
}
