//! Configuration enum types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which pointer-injection backend to start with.
///
/// Whatever is selected, sustained failures still fall back along the chain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
    clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Direct X11 connection using the XTEST extension (lowest latency)
    #[default]
    #[serde(alias = "xlib", alias = "x11")]
    #[value(alias = "xlib", alias = "x11")]
    Direct,
    /// One external automation command per action (most compatible)
    #[serde(alias = "xdotool")]
    #[value(alias = "xdotool")]
    Command,
    /// uinput virtual pointer device (needs write access to /dev/uinput)
    #[serde(alias = "uinput", alias = "xinput")]
    #[value(alias = "uinput", alias = "xinput")]
    Device,
}

impl BackendKind {
    /// Preference order used when building the fallback chain.
    pub const PREFERENCE: [BackendKind; 3] =
        [BackendKind::Direct, BackendKind::Command, BackendKind::Device];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Command => "command",
            Self::Device => "device",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mouse-mode controller flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ModeVariant {
    /// Mouse mode only while the mode modifier is held
    #[default]
    Hold,
    /// Mode modifier + toggle key switches mouse mode on and off
    Toggle,
}
