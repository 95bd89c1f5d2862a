//! Single entry point for raw key transitions.

use super::events::{KeyCode, KeyTransition};
use super::key_state::KeyState;
use super::mode::{ModeController, Transition};
use crate::config::Keymap;
use log::{debug, trace};
use std::sync::Arc;

/// Routes raw key transitions into [`KeyState`] and the [`ModeController`].
///
/// Performs no I/O and holds each lock only for the length of one update, so
/// it is safe to call from any number of device reader threads.
#[derive(Debug, Clone)]
pub struct InputRouter {
    keymap: Arc<Keymap>,
    keys: Arc<KeyState>,
    mode: Arc<ModeController>,
}

impl InputRouter {
    pub fn new(keymap: Arc<Keymap>, keys: Arc<KeyState>, mode: Arc<ModeController>) -> Self {
        Self { keymap, keys, mode }
    }

    /// Handles one transition. Unbound codes are ignored.
    pub fn on_key(&self, code: KeyCode, transition: KeyTransition) -> Option<Transition> {
        let key = self.keymap.lookup(code)?;
        let pressed = transition.is_down();

        let (changed, snapshot) = self.keys.update(key, pressed);
        if !changed {
            trace!("{code} {transition:?} ({key:?}) - no change");
            return None;
        }
        trace!("{code} {transition:?} -> {key:?} held={pressed}");

        let outcome = self.mode.on_key(key, pressed, &snapshot);
        if let Some(transition) = outcome {
            debug!("Mode transition {transition:?} after {key:?}");
        }
        outcome
    }

    pub fn keys(&self) -> &Arc<KeyState> {
        &self.keys
    }

    pub fn mode(&self) -> &Arc<ModeController> {
        &self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KeysConfig, ModeVariant};
    use crate::input::{ControlKey, ModeState};

    fn router(variant: ModeVariant) -> InputRouter {
        let keymap = KeysConfig::default().build_keymap().unwrap();
        InputRouter::new(
            Arc::new(keymap),
            Arc::new(KeyState::new()),
            Arc::new(ModeController::new(variant)),
        )
    }

    #[test]
    fn unbound_codes_pass_through() {
        let router = router(ModeVariant::Hold);
        assert_eq!(router.on_key(KeyCode(30), KeyTransition::Pressed), None); // KEY_A
        assert_eq!(router.keys().snapshot(), Default::default());
    }

    #[test]
    fn either_bound_key_drives_the_same_control() {
        let router = router(ModeVariant::Hold);
        router.on_key(KeyCode(38), KeyTransition::Pressed); // KEY_L
        assert!(router.keys().snapshot().is_held(ControlKey::Right));
        router.on_key(KeyCode(38), KeyTransition::Released);
        router.on_key(KeyCode(106), KeyTransition::Pressed); // KEY_RIGHT
        assert!(router.keys().snapshot().is_held(ControlKey::Right));
    }

    #[test]
    fn repeat_is_a_redundant_press() {
        let router = router(ModeVariant::Hold);
        assert_eq!(
            router.on_key(KeyCode::LEFTALT, KeyTransition::Pressed),
            Some(Transition::Activated)
        );
        assert_eq!(router.on_key(KeyCode::LEFTALT, KeyTransition::Repeat), None);
        assert_eq!(router.mode().observe().generation, 1);
        assert_eq!(
            router.on_key(KeyCode::LEFTALT, KeyTransition::Released),
            Some(Transition::Deactivated)
        );
    }

    #[test]
    fn ctrl_q_quits() {
        let router = router(ModeVariant::Hold);
        router.on_key(KeyCode::LEFTCTRL, KeyTransition::Pressed);
        assert_eq!(
            router.on_key(KeyCode(16), KeyTransition::Pressed), // KEY_Q
            Some(Transition::Quit)
        );
        assert_eq!(router.mode().state(), ModeState::ShuttingDown);
    }

    #[test]
    fn toggle_variant_uses_alt_grave() {
        let router = router(ModeVariant::Toggle);
        router.on_key(KeyCode::RIGHTALT, KeyTransition::Pressed);
        assert_eq!(
            router.on_key(KeyCode(41), KeyTransition::Pressed), // KEY_GRAVE
            Some(Transition::Activated)
        );
        router.on_key(KeyCode(41), KeyTransition::Released);
        router.on_key(KeyCode::RIGHTALT, KeyTransition::Released);
        assert_eq!(router.mode().state(), ModeState::Active);
    }
}
