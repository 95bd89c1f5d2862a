//! Pointer motion: per-tick intent computation and the fixed-rate scheduler.

pub mod intent;
pub mod scheduler;


pub use intent::{AccelerationState, MotionIntent, MotionKind, MotionPlanner};
pub use scheduler::{CursorHook, MotionScheduler, TickOutcome};
