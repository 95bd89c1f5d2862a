//! Keyboard-driven pointer control.
//!
//! While a mode modifier is held (or toggled on), home-row keys steer the
//! pointer, scroll, and click through one of several injection backends.
//! The binary wires these modules together; the library exposes them so the
//! schema dumper and tests can share configuration and validation code.

pub mod backend;
pub mod config;
pub mod daemon;
pub mod host;
pub mod input;
pub mod motion;
pub mod pidfile;

pub use config::Config;
