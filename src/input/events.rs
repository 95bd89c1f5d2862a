//! Key identities shared by the listener, the keymap, and the backends.

use evdev::Key;
use std::fmt;
use std::str::FromStr;

/// Raw Linux input event code of a physical key (see `linux/input-event-codes.h`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyCode(pub u16);

impl KeyCode {
    pub const LEFTCTRL: KeyCode = KeyCode(29);
    pub const LEFTSHIFT: KeyCode = KeyCode(42);
    pub const RIGHTSHIFT: KeyCode = KeyCode(54);
    pub const LEFTALT: KeyCode = KeyCode(56);
    pub const RIGHTCTRL: KeyCode = KeyCode(97);
    pub const RIGHTALT: KeyCode = KeyCode(100);
    pub const LEFTMETA: KeyCode = KeyCode(125);
    pub const RIGHTMETA: KeyCode = KeyCode(126);

    /// The modifier this physical key produces, if it is a modifier key.
    pub fn modifier(self) -> Option<Modifier> {
        match self {
            Self::LEFTALT | Self::RIGHTALT => Some(Modifier::Alt),
            Self::LEFTCTRL | Self::RIGHTCTRL => Some(Modifier::Ctrl),
            Self::LEFTSHIFT | Self::RIGHTSHIFT => Some(Modifier::Shift),
            Self::LEFTMETA | Self::RIGHTMETA => Some(Modifier::Super),
            _ => None,
        }
    }
}

impl FromStr for KeyCode {
    type Err = String;

    /// Accepts `KEY_SPACE`, `space`, or `Space` (the `KEY_` prefix is optional).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("Empty key name".to_string());
        }
        let upper = trimmed.to_ascii_uppercase();
        let canonical = if upper.starts_with("KEY_") {
            upper
        } else {
            format!("KEY_{upper}")
        };

        Key::from_str(&canonical)
            .map(|key| KeyCode(key.code()))
            .map_err(|_| format!("Unknown key name: {trimmed}"))
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // evdev names known codes and describes unknown ones in prose
        let name = format!("{:?}", Key::new(self.0));
        if name.starts_with("KEY_") {
            f.write_str(&name)
        } else {
            write!(f, "KEY_{}", self.0)
        }
    }
}

/// Logical control keys the pointer controller reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ControlKey {
    Up,
    Down,
    Left,
    Right,
    ScrollUp,
    ScrollDown,
    /// Tap-click (left button), edge-triggered
    Click,
    /// Tap-click (right button), edge-triggered
    RightClick,
    /// Held left button, level-triggered
    Drag,
    /// Switches movement to fixed-distance jumps; also the quit-combo modifier
    Leap,
    /// Mouse-mode modifier
    Mode,
    /// Quit key, only meaningful while `Leap` is held
    Quit,
    /// Toggle key for the toggle controller variant, only meaningful while `Mode` is held
    Toggle,
}

impl ControlKey {
    pub const COUNT: usize = 13;

    pub const ALL: [ControlKey; Self::COUNT] = [
        ControlKey::Up,
        ControlKey::Down,
        ControlKey::Left,
        ControlKey::Right,
        ControlKey::ScrollUp,
        ControlKey::ScrollDown,
        ControlKey::Click,
        ControlKey::RightClick,
        ControlKey::Drag,
        ControlKey::Leap,
        ControlKey::Mode,
        ControlKey::Quit,
        ControlKey::Toggle,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Keyboard modifiers a backend can virtually release and restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Alt,
    Ctrl,
    Shift,
    Super,
}

/// One raw key transition as delivered by the event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTransition {
    Pressed,
    Released,
    /// Autorepeat while held; treated as a redundant press
    Repeat,
}

impl KeyTransition {
    /// Maps an evdev key event value (0 release, 1 press, 2 repeat).
    pub fn from_evdev_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Released),
            1 => Some(Self::Pressed),
            2 => Some(Self::Repeat),
            _ => None,
        }
    }

    pub fn is_down(self) -> bool {
        !matches!(self, Self::Released)
    }
}

/// Pointer buttons the controller synthesizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    /// X11 / xdotool button number.
    pub fn x11_number(self) -> u8 {
        match self {
            Self::Left => 1,
            Self::Middle => 2,
            Self::Right => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names_parse_with_or_without_prefix() {
        assert_eq!("KEY_SPACE".parse::<KeyCode>().unwrap(), KeyCode(57));
        assert_eq!("space".parse::<KeyCode>().unwrap(), KeyCode(57));
        assert_eq!(" semicolon ".parse::<KeyCode>().unwrap(), KeyCode(39));
        assert!("KEY_NOPE".parse::<KeyCode>().is_err());
        assert!("".parse::<KeyCode>().is_err());
    }

    #[test]
    fn keypad_and_extended_keys_parse() {
        assert_eq!("KEY_KP1".parse::<KeyCode>().unwrap(), KeyCode(79));
        assert_eq!("f13".parse::<KeyCode>().unwrap(), KeyCode(183));
        assert_eq!("KEY_102ND".parse::<KeyCode>().unwrap(), KeyCode(86));
        assert_eq!("kpenter".parse::<KeyCode>().unwrap(), KeyCode(96));
    }

    #[test]
    fn display_uses_evdev_names() {
        assert_eq!(KeyCode(103).to_string(), "KEY_UP");
        assert_eq!(KeyCode(79).to_string(), "KEY_KP1");
        assert_eq!("semicolon".parse::<KeyCode>().unwrap().to_string(), "KEY_SEMICOLON");
    }

    #[test]
    fn modifier_keys_are_classified() {
        assert_eq!(KeyCode::LEFTALT.modifier(), Some(Modifier::Alt));
        assert_eq!(KeyCode::RIGHTCTRL.modifier(), Some(Modifier::Ctrl));
        assert_eq!(KeyCode(57).modifier(), None);
    }

    #[test]
    fn control_key_indices_are_dense() {
        for (i, key) in ControlKey::ALL.iter().enumerate() {
            assert_eq!(key.index(), i);
        }
    }

    #[test]
    fn evdev_values_map_to_transitions() {
        assert_eq!(KeyTransition::from_evdev_value(0), Some(KeyTransition::Released));
        assert_eq!(KeyTransition::from_evdev_value(1), Some(KeyTransition::Pressed));
        assert_eq!(KeyTransition::from_evdev_value(2), Some(KeyTransition::Repeat));
        assert_eq!(KeyTransition::from_evdev_value(7), None);
        assert!(KeyTransition::Repeat.is_down());
    }
}
