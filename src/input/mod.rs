//! Keyboard input: key identities, held-key state, and the mouse-mode controller.
//!
//! Raw transitions arrive on listener threads and go through [`InputRouter`],
//! which updates [`KeyState`] and the [`ModeController`]. The motion scheduler
//! only ever reads snapshots of both.

pub mod events;
pub mod key_state;
pub mod listener;
pub mod mode;
pub mod router;
pub mod suppress;

// Re-export commonly used types at module level
pub use events::{ControlKey, KeyCode, KeyTransition, Modifier, MouseButton};
pub use key_state::{KeySnapshot, KeyState};
pub use mode::{ModeController, ModeObservation, ModeState, Transition};
pub use router::InputRouter;
pub use suppress::{KeySuppressor, X11KeySuppressor};
