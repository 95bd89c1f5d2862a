//! Physical-to-logical key configuration.
//!
//! Users bind Linux input key names to each control key in config.toml:
//! ```toml
//! [keys]
//! up = ["KEY_UP", "KEY_I"]
//! drag = ["KEY_SPACE"]
//! mode = ["KEY_LEFTALT", "KEY_RIGHTALT"]
//! ```

use crate::input::{ControlKey, KeyCode, Modifier};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Key names bound to every control key.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct KeysConfig {
    #[serde(default = "default_up")]
    pub up: Vec<String>,

    #[serde(default = "default_down")]
    pub down: Vec<String>,

    #[serde(default = "default_left")]
    pub left: Vec<String>,

    #[serde(default = "default_right")]
    pub right: Vec<String>,

    #[serde(default = "default_scroll_up")]
    pub scroll_up: Vec<String>,

    #[serde(default = "default_scroll_down")]
    pub scroll_down: Vec<String>,

    /// Left click, once per key press
    #[serde(default = "default_click")]
    pub click: Vec<String>,

    /// Right click, once per key press
    #[serde(default = "default_right_click")]
    pub right_click: Vec<String>,

    /// Left button held for as long as the key is held
    #[serde(default = "default_drag")]
    pub drag: Vec<String>,

    /// Fixed-distance jumps while held; also the modifier of the quit combo
    #[serde(default = "default_leap")]
    pub leap: Vec<String>,

    /// Mouse-mode modifier
    #[serde(default = "default_mode")]
    pub mode: Vec<String>,

    /// Exits the controller while `leap` is held
    #[serde(default = "default_quit")]
    pub quit: Vec<String>,

    /// Toggle variant only: flips mouse mode while `mode` is held
    #[serde(default = "default_toggle")]
    pub toggle: Vec<String>,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            up: default_up(),
            down: default_down(),
            left: default_left(),
            right: default_right(),
            scroll_up: default_scroll_up(),
            scroll_down: default_scroll_down(),
            click: default_click(),
            right_click: default_right_click(),
            drag: default_drag(),
            leap: default_leap(),
            mode: default_mode(),
            quit: default_quit(),
            toggle: default_toggle(),
        }
    }
}

impl KeysConfig {
    fn bindings(&self) -> [(ControlKey, &[String]); ControlKey::COUNT] {
        [
            (ControlKey::Up, &self.up),
            (ControlKey::Down, &self.down),
            (ControlKey::Left, &self.left),
            (ControlKey::Right, &self.right),
            (ControlKey::ScrollUp, &self.scroll_up),
            (ControlKey::ScrollDown, &self.scroll_down),
            (ControlKey::Click, &self.click),
            (ControlKey::RightClick, &self.right_click),
            (ControlKey::Drag, &self.drag),
            (ControlKey::Leap, &self.leap),
            (ControlKey::Mode, &self.mode),
            (ControlKey::Quit, &self.quit),
            (ControlKey::Toggle, &self.toggle),
        ]
    }

    /// Build the lookup table used by the listener.
    /// Returns an error if any key name is invalid or a physical key is bound twice.
    pub fn build_keymap(&self) -> Result<Keymap, String> {
        let mut map = HashMap::new();

        for (control, names) in self.bindings() {
            for name in names {
                let code: KeyCode = name.parse()?;
                if let Some(existing) = map.insert(code, control) {
                    return Err(format!(
                        "Duplicate key binding '{}' assigned to both {:?} and {:?}",
                        name, existing, control
                    ));
                }
            }
        }

        Ok(Keymap { map })
    }
}

/// Resolved `KeyCode → ControlKey` table.
#[derive(Debug, Clone, Default)]
pub struct Keymap {
    map: HashMap<KeyCode, ControlKey>,
}

impl Keymap {
    /// Control key bound to `code`; `None` for ordinary typing keys.
    pub fn lookup(&self, code: KeyCode) -> Option<ControlKey> {
        self.map.get(&code).copied()
    }

    /// Physical keys bound to `key`, sorted by code.
    pub fn codes_for(&self, key: ControlKey) -> Vec<KeyCode> {
        let mut codes: Vec<KeyCode> = self
            .map
            .iter()
            .filter(|(_, bound)| **bound == key)
            .map(|(code, _)| *code)
            .collect();
        codes.sort();
        codes
    }

    /// The keyboard modifier produced by `key`'s physical binding, if it is one.
    pub fn modifier_for(&self, key: ControlKey) -> Option<Modifier> {
        self.codes_for(key).into_iter().find_map(KeyCode::modifier)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

// =============================================================================
// Default key binding functions
// =============================================================================

fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn default_up() -> Vec<String> {
    keys(&["KEY_UP", "KEY_I"])
}

fn default_down() -> Vec<String> {
    keys(&["KEY_DOWN", "KEY_K"])
}

fn default_left() -> Vec<String> {
    keys(&["KEY_LEFT", "KEY_J"])
}

fn default_right() -> Vec<String> {
    keys(&["KEY_RIGHT", "KEY_L"])
}

fn default_scroll_up() -> Vec<String> {
    keys(&["KEY_U"])
}

fn default_scroll_down() -> Vec<String> {
    keys(&["KEY_M", "KEY_N"])
}

fn default_click() -> Vec<String> {
    keys(&["KEY_H"])
}

fn default_right_click() -> Vec<String> {
    keys(&["KEY_SEMICOLON"])
}

fn default_drag() -> Vec<String> {
    keys(&["KEY_SPACE"])
}

fn default_leap() -> Vec<String> {
    keys(&["KEY_LEFTCTRL", "KEY_RIGHTCTRL"])
}

fn default_mode() -> Vec<String> {
    keys(&["KEY_LEFTALT", "KEY_RIGHTALT"])
}

fn default_quit() -> Vec<String> {
    keys(&["KEY_Q"])
}

fn default_toggle() -> Vec<String> {
    keys(&["KEY_GRAVE"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_keymap_builds() {
        let keymap = KeysConfig::default().build_keymap().unwrap();
        assert_eq!(keymap.lookup(KeyCode(23)), Some(ControlKey::Up)); // KEY_I
        assert_eq!(keymap.lookup(KeyCode(106)), Some(ControlKey::Right)); // KEY_RIGHT
        assert_eq!(keymap.lookup(KeyCode::LEFTALT), Some(ControlKey::Mode));
        assert_eq!(keymap.lookup(KeyCode(30)), None); // KEY_A passes through
    }

    #[test]
    fn duplicate_physical_key_is_rejected() {
        let mut config = KeysConfig::default();
        config.click = keys(&["KEY_SPACE"]);
        let err = config.build_keymap().unwrap_err();
        assert!(err.contains("Duplicate key binding"), "{err}");
    }

    #[test]
    fn unknown_key_name_is_rejected() {
        let mut config = KeysConfig::default();
        config.quit = keys(&["KEY_HYPER"]);
        let err = config.build_keymap().unwrap_err();
        assert!(err.contains("Unknown key name"), "{err}");
    }

    #[test]
    fn modifier_is_derived_from_physical_binding() {
        let keymap = KeysConfig::default().build_keymap().unwrap();
        assert_eq!(keymap.modifier_for(ControlKey::Mode), Some(Modifier::Alt));
        assert_eq!(keymap.modifier_for(ControlKey::Leap), Some(Modifier::Ctrl));
        assert_eq!(keymap.modifier_for(ControlKey::Drag), None);
    }

    #[test]
    fn codes_for_lists_every_binding() {
        let keymap = KeysConfig::default().build_keymap().unwrap();
        assert_eq!(
            keymap.codes_for(ControlKey::ScrollDown),
            vec![KeyCode(49), KeyCode(50)]
        );
    }
}
