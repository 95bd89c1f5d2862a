//! Configuration type definitions.

use super::enums::{BackendKind, ModeVariant};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backend selection and failure policy.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BackendConfig {
    /// Backend to start with: "direct" (X11/XTEST), "command" (xdotool), or "device" (uinput)
    #[serde(default)]
    pub kind: BackendKind,

    /// Automation command used by the command backend
    #[serde(default = "default_command")]
    pub command: String,

    /// Upper bound for a single command invocation in milliseconds (valid range: 1 - 5000)
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Consecutive failed ticks before falling back to the next backend (valid range: 1 - 100)
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Name of the uinput virtual device created by the device backend
    #[serde(default = "default_device_name")]
    pub device_name: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            command: default_command(),
            command_timeout_ms: default_command_timeout_ms(),
            failure_threshold: default_failure_threshold(),
            device_name: default_device_name(),
        }
    }
}

impl BackendConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

/// Cursor speed, acceleration, and scroll settings.
///
/// Speeds are pixels per tick along one axis.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MotionConfig {
    /// Base speed in pixels per tick (valid range: 0 < speed <= 500)
    #[serde(default = "default_move_speed")]
    pub move_speed: f64,

    /// Multiplier applied to the base speed on diagonal ticks (valid range: 1.0 - 10.0)
    #[serde(default = "default_acceleration")]
    pub acceleration: f64,

    /// Speed added per consecutive tick of single-axis movement (0 disables ramping)
    #[serde(default = "default_speed_ramp")]
    pub speed_ramp: f64,

    /// Cap for the single-axis ramp, at least `move_speed`
    #[serde(default = "default_max_speed")]
    pub max_speed: f64,

    /// Time between motion ticks in milliseconds (valid range: 1 - 1000)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Per-tick jump in pixels while the leap modifier is held (valid range: 1 - 2000)
    #[serde(default = "default_leap_distance")]
    pub leap_distance: u32,

    /// Wheel clicks emitted per tick while a scroll key is held (valid range: 1 - 100)
    #[serde(default = "default_scroll_step")]
    pub scroll_step: u32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            move_speed: default_move_speed(),
            acceleration: default_acceleration(),
            speed_ramp: default_speed_ramp(),
            max_speed: default_max_speed(),
            tick_interval_ms: default_tick_interval_ms(),
            leap_distance: default_leap_distance(),
            scroll_step: default_scroll_step(),
        }
    }
}

impl MotionConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Sub-tick interpolation of larger moves.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SmoothingConfig {
    /// Split each tick's move into several smaller moves
    #[serde(default = "default_smoothing_enabled")]
    pub enabled: bool,

    /// Number of interpolation steps per tick (valid range: 1 - 32)
    #[serde(default = "default_smoothing_steps")]
    pub steps: u32,

    /// Delay between interpolation steps in milliseconds (valid range: 0 - 100)
    #[serde(default = "default_smoothing_delay_ms")]
    pub delay_ms: u64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            enabled: default_smoothing_enabled(),
            steps: default_smoothing_steps(),
            delay_ms: default_smoothing_delay_ms(),
        }
    }
}

impl SmoothingConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Mode controller behaviour and host quirks.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ModeConfig {
    /// "hold" (mouse mode while the modifier is held) or "toggle"
    #[serde(default)]
    pub variant: ModeVariant,

    /// Re-assert a visible cursor when mouse mode starts (and when toggled off)
    #[serde(default = "default_restore_cursor")]
    pub restore_cursor: bool,

    /// Turn off the X screensaver/DPMS while running so the cursor is not blanked
    #[serde(default = "default_disable_screensaver")]
    pub disable_screensaver: bool,

    /// Keep bound keys from reaching the focused window while mouse mode is on
    #[serde(default = "default_suppress_keys")]
    pub suppress_keys: bool,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            variant: ModeVariant::default(),
            restore_cursor: default_restore_cursor(),
            disable_screensaver: default_disable_screensaver(),
            suppress_keys: default_suppress_keys(),
        }
    }
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_command() -> String {
    "xdotool".to_string()
}

fn default_command_timeout_ms() -> u64 {
    250
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_device_name() -> String {
    "homerow-mouse virtual pointer".to_string()
}

fn default_move_speed() -> f64 {
    2.0
}

fn default_acceleration() -> f64 {
    1.5
}

fn default_speed_ramp() -> f64 {
    0.05
}

fn default_max_speed() -> f64 {
    12.0
}

fn default_tick_interval_ms() -> u64 {
    4 // 250 Hz
}

fn default_leap_distance() -> u32 {
    10
}

fn default_scroll_step() -> u32 {
    1
}

fn default_smoothing_enabled() -> bool {
    true
}

fn default_smoothing_steps() -> u32 {
    2
}

fn default_smoothing_delay_ms() -> u64 {
    2
}

fn default_restore_cursor() -> bool {
    true
}

fn default_disable_screensaver() -> bool {
    true
}

fn default_suppress_keys() -> bool {
    true
}
