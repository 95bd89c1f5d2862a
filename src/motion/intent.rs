//! Per-tick motion decisions.
//!
//! [`MotionPlanner`] turns a key snapshot into a [`MotionIntent`]: a displacement,
//! a scroll delta, and the button edges for the tick. It performs no I/O.

use crate::backend::ButtonAction;
use crate::config::MotionConfig;
use crate::input::{ControlKey, KeySnapshot, MouseButton};

/// Everything the scheduler dispatches for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MotionIntent {
    pub dx: i32,
    pub dy: i32,
    /// Wheel clicks; positive is up
    pub scroll: i32,
    pub buttons: Vec<ButtonAction>,
}

impl MotionIntent {
    pub fn has_motion(&self) -> bool {
        self.dx != 0 || self.dy != 0
    }

    pub fn is_empty(&self) -> bool {
        !self.has_motion() && self.scroll == 0 && self.buttons.is_empty()
    }
}

/// How the pointer is moving this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionKind {
    Still,
    /// One axis; may ramp across consecutive ticks
    Straight,
    /// Both axes; base speed times the acceleration multiplier, this tick only
    Diagonal,
    /// Fixed-distance jump
    Leap,
}

/// Speed memory carried between ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct AccelerationState {
    base: f64,
    current: f64,
}

impl AccelerationState {
    pub fn new(base: f64) -> Self {
        Self {
            base,
            current: base,
        }
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }

    /// Advances the state for a tick of `kind` and returns the per-axis speed to use.
    fn advance(&mut self, kind: MotionKind, config: &MotionConfig, continuing: bool) -> f64 {
        match kind {
            MotionKind::Straight if continuing => {
                self.current = (self.current + config.speed_ramp).min(config.max_speed);
                self.current
            }
            MotionKind::Straight => {
                self.reset();
                self.current
            }
            MotionKind::Diagonal => {
                self.reset();
                self.base * config.acceleration
            }
            MotionKind::Leap => {
                self.reset();
                f64::from(config.leap_distance)
            }
            MotionKind::Still => {
                self.reset();
                0.0
            }
        }
    }
}

fn axis(snapshot: &KeySnapshot, negative: ControlKey, positive: ControlKey) -> i32 {
    i32::from(snapshot.is_held(positive)) - i32::from(snapshot.is_held(negative))
}

/// Whole pixels per tick along one axis; never below one while moving.
fn step(speed: f64) -> i32 {
    speed.round().max(1.0) as i32
}

/// Computes intents tick by tick, owning the acceleration memory.
#[derive(Debug, Clone)]
pub struct MotionPlanner {
    config: MotionConfig,
    acceleration: AccelerationState,
    last_kind: MotionKind,
}

impl MotionPlanner {
    pub fn new(config: MotionConfig) -> Self {
        let acceleration = AccelerationState::new(config.move_speed);
        Self {
            config,
            acceleration,
            last_kind: MotionKind::Still,
        }
    }

    pub fn acceleration(&self) -> &AccelerationState {
        &self.acceleration
    }

    pub fn last_kind(&self) -> MotionKind {
        self.last_kind
    }

    /// Forgets speed memory, e.g. when mouse mode ends.
    pub fn reset(&mut self) {
        self.acceleration.reset();
        self.last_kind = MotionKind::Still;
    }

    /// Computes the intent for one active tick.
    ///
    /// `previous` is the snapshot taken on the tick before; tap-clicks fire once
    /// per press counted between the two. `drag_latched` says whether the drag
    /// button is currently held down through the backend.
    pub fn plan(
        &mut self,
        snapshot: &KeySnapshot,
        previous: &KeySnapshot,
        drag_latched: bool,
    ) -> MotionIntent {
        let x = axis(snapshot, ControlKey::Left, ControlKey::Right);
        let y = axis(snapshot, ControlKey::Up, ControlKey::Down);

        let kind = match (x != 0, y != 0) {
            (false, false) => MotionKind::Still,
            _ if snapshot.is_held(ControlKey::Leap) => MotionKind::Leap,
            (true, true) => MotionKind::Diagonal,
            _ => MotionKind::Straight,
        };
        let continuing = self.last_kind == MotionKind::Straight;
        let speed = self.acceleration.advance(kind, &self.config, continuing);
        self.last_kind = kind;

        let (dx, dy) = if kind == MotionKind::Still {
            (0, 0)
        } else {
            let magnitude = step(speed);
            (x * magnitude, y * magnitude)
        };

        let scroll_step = i32::try_from(self.config.scroll_step).unwrap_or(i32::MAX);
        let scroll = (i32::from(snapshot.is_held(ControlKey::ScrollUp))
            - i32::from(snapshot.is_held(ControlKey::ScrollDown)))
            * scroll_step;

        let mut buttons = Vec::new();
        for (key, button) in [
            (ControlKey::Click, MouseButton::Left),
            (ControlKey::RightClick, MouseButton::Right),
        ] {
            for _ in 0..snapshot.presses_since(previous, key) {
                buttons.push(ButtonAction::Click(button));
            }
        }
        match (snapshot.is_held(ControlKey::Drag), drag_latched) {
            (true, false) => buttons.push(ButtonAction::Press(MouseButton::Left)),
            (false, true) => buttons.push(ButtonAction::Release(MouseButton::Left)),
            _ => {}
        }

        MotionIntent {
            dx,
            dy,
            scroll,
            buttons,
        }
    }
}

/// Splits a move into `steps` smaller moves whose sum is exactly `(dx, dy)`.
pub fn interpolate(dx: i32, dy: i32, steps: u32) -> Vec<(i32, i32)> {
    let steps = i64::from(steps.max(1));
    let (dx, dy) = (i64::from(dx), i64::from(dy));
    let mut moves = Vec::with_capacity(steps as usize);
    let (mut done_x, mut done_y) = (0i64, 0i64);
    for i in 1..=steps {
        let target_x = dx * i / steps;
        let target_y = dy * i / steps;
        let (sx, sy) = (target_x - done_x, target_y - done_y);
        done_x = target_x;
        done_y = target_y;
        if sx != 0 || sy != 0 {
            moves.push((sx as i32, sy as i32));
        }
    }
    moves
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::KeyState;

    fn snapshot(held: &[ControlKey]) -> KeySnapshot {
        let state = KeyState::new();
        for key in held {
            state.set_pressed(*key, true);
        }
        state.snapshot()
    }

    fn planner() -> MotionPlanner {
        MotionPlanner::new(MotionConfig::default())
    }

    #[test]
    fn opposing_keys_cancel() {
        let mut planner = planner();
        let keys = snapshot(&[ControlKey::Left, ControlKey::Right, ControlKey::Up, ControlKey::Down]);
        let intent = planner.plan(&keys, &keys, false);
        assert_eq!((intent.dx, intent.dy), (0, 0));
        assert!(intent.is_empty());
    }

    #[test]
    fn straight_motion_starts_at_base_speed() {
        let mut planner = planner();
        let keys = snapshot(&[ControlKey::Up]);
        let intent = planner.plan(&keys, &keys, false);
        assert_eq!((intent.dx, intent.dy), (0, -2));
    }

    #[test]
    fn diagonal_applies_multiplier_without_compounding() {
        let mut planner = planner();
        let keys = snapshot(&[ControlKey::Right, ControlKey::Down]);
        for _ in 0..10 {
            let intent = planner.plan(&keys, &keys, false);
            assert_eq!((intent.dx, intent.dy), (3, 3));
        }
        assert_eq!(planner.acceleration().current(), 2.0);
    }

    #[test]
    fn straight_motion_ramps_to_cap_and_resets() {
        let config = MotionConfig {
            speed_ramp: 1.0,
            max_speed: 5.0,
            ..MotionConfig::default()
        };
        let mut planner = MotionPlanner::new(config);
        let keys = snapshot(&[ControlKey::Right]);
        let steps: Vec<i32> = (0..6).map(|_| planner.plan(&keys, &keys, false).dx).collect();
        assert_eq!(steps, vec![2, 3, 4, 5, 5, 5]);

        let none = snapshot(&[]);
        planner.plan(&none, &none, false);
        assert_eq!(planner.acceleration().current(), 2.0);
        assert_eq!(planner.plan(&keys, &keys, false).dx, 2);
    }

    #[test]
    fn leap_ignores_speed_and_acceleration() {
        let config = MotionConfig {
            move_speed: 7.0,
            acceleration: 4.0,
            max_speed: 50.0,
            leap_distance: 40,
            ..MotionConfig::default()
        };
        let mut planner = MotionPlanner::new(config);
        let keys = snapshot(&[ControlKey::Leap, ControlKey::Right]);
        for _ in 0..3 {
            let intent = planner.plan(&keys, &keys, false);
            assert_eq!((intent.dx, intent.dy), (40, 0));
        }
    }

    #[test]
    fn scroll_keys_add_and_cancel() {
        let mut planner = planner();
        let up = snapshot(&[ControlKey::ScrollUp]);
        assert_eq!(planner.plan(&up, &up, false).scroll, 1);
        let down = snapshot(&[ControlKey::ScrollDown]);
        assert_eq!(planner.plan(&down, &down, false).scroll, -1);
        let both = snapshot(&[ControlKey::ScrollUp, ControlKey::ScrollDown]);
        assert_eq!(planner.plan(&both, &both, false).scroll, 0);
    }

    #[test]
    fn tap_click_fires_once_per_press() {
        let mut planner = planner();
        let state = KeyState::new();
        let before = state.snapshot();
        state.set_pressed(ControlKey::Click, true);
        let held = state.snapshot();

        let first = planner.plan(&held, &before, false);
        assert_eq!(first.buttons, vec![ButtonAction::Click(MouseButton::Left)]);
        let second = planner.plan(&held, &held, false);
        assert!(second.buttons.is_empty());
    }

    #[test]
    fn drag_follows_key_level() {
        let mut planner = planner();
        let held = snapshot(&[ControlKey::Drag]);
        assert_eq!(
            planner.plan(&held, &held, false).buttons,
            vec![ButtonAction::Press(MouseButton::Left)]
        );
        assert!(planner.plan(&held, &held, true).buttons.is_empty());
        let released = snapshot(&[]);
        assert_eq!(
            planner.plan(&released, &released, true).buttons,
            vec![ButtonAction::Release(MouseButton::Left)]
        );
    }

    #[test]
    fn interpolation_sums_exactly() {
        let moves = interpolate(7, -3, 4);
        let total = moves.iter().fold((0, 0), |acc, m| (acc.0 + m.0, acc.1 + m.1));
        assert_eq!(total, (7, -3));
        assert!(moves.len() <= 4);
        assert_eq!(interpolate(5, 0, 1), vec![(5, 0)]);
        assert!(interpolate(0, 0, 3).is_empty());
    }
}
