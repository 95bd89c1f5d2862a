//! Device-level backend: a uinput virtual pointer.
//!
//! Needs write access to `/dev/uinput`. Events are relative only, so absolute
//! motion and position queries are unsupported.

use super::{BackendError, Held, PointerBackend};
use crate::config::{BackendConfig, BackendKind};
use crate::input::{KeyCode, Modifier, MouseButton};
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key, RelativeAxisType};
use log::{debug, info, warn};

fn button_key(button: MouseButton) -> Key {
    match button {
        MouseButton::Left => Key::BTN_LEFT,
        MouseButton::Right => Key::BTN_RIGHT,
        MouseButton::Middle => Key::BTN_MIDDLE,
    }
}

fn modifier_key(modifier: Modifier) -> Key {
    let code = match modifier {
        Modifier::Alt => KeyCode::LEFTALT,
        Modifier::Ctrl => KeyCode::LEFTCTRL,
        Modifier::Shift => KeyCode::LEFTSHIFT,
        Modifier::Super => KeyCode::LEFTMETA,
    };
    Key::new(code.0)
}

fn io(what: &'static str) -> impl Fn(std::io::Error) -> BackendError {
    move |e| BackendError::from_device_io(e, what)
}

fn key_event(key: Key, pressed: bool) -> InputEvent {
    InputEvent::new(EventType::KEY, key.code(), i32::from(pressed))
}

pub struct UinputBackend {
    device: VirtualDevice,
    held: Held<MouseButton>,
    modifiers: Held<Modifier>,
    closed: bool,
}

impl UinputBackend {
    pub fn create(config: &BackendConfig) -> Result<Self, BackendError> {
        let mut keys = AttributeSet::<Key>::new();
        for button in [MouseButton::Left, MouseButton::Right, MouseButton::Middle] {
            keys.insert(button_key(button));
        }
        for modifier in [Modifier::Alt, Modifier::Ctrl, Modifier::Shift, Modifier::Super] {
            keys.insert(modifier_key(modifier));
        }

        let mut axes = AttributeSet::<RelativeAxisType>::new();
        axes.insert(RelativeAxisType::REL_X);
        axes.insert(RelativeAxisType::REL_Y);
        axes.insert(RelativeAxisType::REL_WHEEL);

        let device = VirtualDeviceBuilder::new()
            .map_err(io("open /dev/uinput"))?
            .name(config.device_name.as_str())
            .with_keys(&keys)
            .map_err(io("set key capabilities"))?
            .with_relative_axes(&axes)
            .map_err(io("set relative axes"))?
            .build()
            .map_err(io("create virtual device"))?;

        info!("Created uinput device '{}'", config.device_name);
        Ok(Self {
            device,
            held: Held::default(),
            modifiers: Held::default(),
            closed: false,
        })
    }

    fn emit(&mut self, events: &[InputEvent]) -> Result<(), BackendError> {
        // emit() appends the SYN_REPORT
        self.device
            .emit(events)
            .map_err(|e| BackendError::from_device_io(e, "write to uinput device"))
    }
}

impl PointerBackend for UinputBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Device
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), BackendError> {
        let mut events = Vec::with_capacity(2);
        if dx != 0 {
            events.push(InputEvent::new(EventType::RELATIVE, RelativeAxisType::REL_X.0, dx));
        }
        if dy != 0 {
            events.push(InputEvent::new(EventType::RELATIVE, RelativeAxisType::REL_Y.0, dy));
        }
        if events.is_empty() {
            return Ok(());
        }
        self.emit(&events)
    }

    fn move_absolute(&mut self, _x: i32, _y: i32) -> Result<(), BackendError> {
        Err(BackendError::Unsupported("absolute motion"))
    }

    fn button(&mut self, button: MouseButton, pressed: bool) -> Result<(), BackendError> {
        self.emit(&[key_event(button_key(button), pressed)])?;
        self.held.record(button, pressed);
        Ok(())
    }

    fn scroll(&mut self, delta: i32) -> Result<(), BackendError> {
        if delta == 0 {
            return Ok(());
        }
        self.emit(&[InputEvent::new(
            EventType::RELATIVE,
            RelativeAxisType::REL_WHEEL.0,
            delta,
        )])
    }

    fn modifier(&mut self, modifier: Modifier, pressed: bool) -> Result<(), BackendError> {
        self.emit(&[key_event(modifier_key(modifier), pressed)])?;
        self.modifiers.record(modifier, pressed);
        Ok(())
    }

    fn query_position(&mut self) -> Result<(i32, i32), BackendError> {
        Err(BackendError::Unsupported("position query"))
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for button in self.held.take() {
            if let Err(e) = self.emit(&[key_event(button_key(button), false)]) {
                warn!("Failed to release {:?} on shutdown: {}", button, e);
            }
        }
        for modifier in self.modifiers.take() {
            if let Err(e) = self.emit(&[key_event(modifier_key(modifier), false)]) {
                warn!("Failed to release {:?} on shutdown: {}", modifier, e);
            }
        }
        debug!("uinput backend shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buttons_map_to_btn_codes() {
        assert_eq!(button_key(MouseButton::Left), Key::BTN_LEFT);
        assert_eq!(button_key(MouseButton::Right), Key::BTN_RIGHT);
    }

    #[test]
    fn modifiers_map_to_left_hand_keys() {
        assert_eq!(modifier_key(Modifier::Alt), Key::KEY_LEFTALT);
        assert_eq!(modifier_key(Modifier::Ctrl), Key::KEY_LEFTCTRL);
        assert_eq!(modifier_key(Modifier::Super), Key::KEY_LEFTMETA);
    }

    #[test]
    fn key_events_carry_press_state() {
        let event = key_event(Key::BTN_LEFT, true);
        assert_eq!(event.event_type(), EventType::KEY);
        assert_eq!(event.code(), Key::BTN_LEFT.code());
        assert_eq!(event.value(), 1);
        assert_eq!(key_event(Key::BTN_LEFT, false).value(), 0);
    }
}
