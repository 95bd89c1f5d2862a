//! Fixed-rate motion loop.
//!
//! Each tick the scheduler observes the mode controller, runs transition side
//! effects, snapshots the held keys once, and dispatches the tick's intent to
//! the active backend in the order scroll, move, buttons. Backend calls only
//! ever happen on this thread, one at a time.

use super::intent::{MotionIntent, MotionPlanner, interpolate};
use crate::backend::{BackendError, ButtonAction, ChainError, FallbackChain, PointerBackend};
use crate::config::{BackendKind, Config, Keymap, ModeVariant, SmoothingConfig};
use crate::input::{
    ControlKey, KeySnapshot, KeyState, KeySuppressor, ModeController, ModeObservation, ModeState,
    Modifier, MouseButton,
};
use log::{Level, debug, error, info, log_enabled, warn};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Side effect run when the cursor should be made visible again.
pub type CursorHook = Box<dyn Fn() + Send>;

/// Minimum spacing between cursor refreshes on activation.
const CURSOR_REFRESH_INTERVAL: Duration = Duration::from_millis(250);

/// Whether the loop should keep going after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Stop,
}

/// Input the active backend holds down on the user's behalf.
#[derive(Debug, Default)]
struct Latched {
    drag: bool,
    /// Modifiers re-pressed on the injection device after a click
    modifiers: Vec<Modifier>,
}

impl Latched {
    fn restored(&mut self, held: &[Modifier]) {
        for modifier in held {
            if !self.modifiers.contains(modifier) {
                self.modifiers.push(*modifier);
            }
        }
    }
}

pub struct MotionScheduler {
    keys: Arc<KeyState>,
    mode: Arc<ModeController>,
    chain: FallbackChain,
    planner: MotionPlanner,
    smoothing: SmoothingConfig,
    tick_interval: Duration,
    failure_threshold: u32,
    /// Modifiers produced by the mode and leap keys, stripped around clicks
    strip: Vec<(ControlKey, Modifier)>,
    restore_cursor: Option<CursorHook>,
    last_cursor_refresh: Option<Instant>,
    suppressor: Option<Box<dyn KeySuppressor>>,
    last_mode: ModeObservation,
    previous_keys: KeySnapshot,
    latched: Latched,
    failures: u32,
    stopped: bool,
}

impl MotionScheduler {
    pub fn new(
        config: &Config,
        keymap: &Keymap,
        keys: Arc<KeyState>,
        mode: Arc<ModeController>,
        chain: FallbackChain,
    ) -> Self {
        let mut strip = Vec::new();
        for key in [ControlKey::Mode, ControlKey::Leap] {
            if let Some(modifier) = keymap.modifier_for(key) {
                strip.push((key, modifier));
            }
        }
        let last_mode = mode.observe();
        let previous_keys = keys.snapshot();

        Self {
            keys,
            mode,
            chain,
            planner: MotionPlanner::new(config.motion.clone()),
            smoothing: config.smoothing.clone(),
            tick_interval: config.motion.tick_interval(),
            failure_threshold: config.backend.failure_threshold.max(1),
            strip,
            restore_cursor: None,
            last_cursor_refresh: None,
            suppressor: None,
            last_mode,
            previous_keys,
            latched: Latched::default(),
            failures: 0,
            stopped: false,
        }
    }

    /// Runs `hook` whenever cursor visibility should be re-asserted.
    pub fn with_cursor_hook(mut self, hook: CursorHook) -> Self {
        self.restore_cursor = Some(hook);
        self
    }

    /// Grabs bound keys through `suppressor` for as long as mouse mode is on.
    pub fn with_key_suppressor(mut self, suppressor: Box<dyn KeySuppressor>) -> Self {
        self.suppressor = Some(suppressor);
        self
    }

    /// Activates the first usable backend.
    pub fn start(&mut self) -> Result<BackendKind, ChainError> {
        self.chain.start()
    }

    pub fn active_backend(&self) -> Option<BackendKind> {
        self.chain.active_kind()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    pub fn is_drag_latched(&self) -> bool {
        self.latched.drag
    }

    /// Modifiers currently pressed on the injection device.
    pub fn latched_modifiers(&self) -> &[Modifier] {
        &self.latched.modifiers
    }

    /// Ticks until quit or backend exhaustion. The backend is shut down on return.
    pub fn run(&mut self) -> Result<(), ChainError> {
        let result = self.run_loop();
        self.shutdown();
        result
    }

    fn run_loop(&mut self) -> Result<(), ChainError> {
        let kind = self.start()?;
        info!(
            "Motion loop running every {:?} on the {} backend",
            self.tick_interval, kind
        );
        loop {
            let started = Instant::now();
            if self.tick()? == TickOutcome::Stop {
                return Ok(());
            }
            if let Some(rest) = self.tick_interval.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        }
    }

    /// One iteration of the loop.
    ///
    /// # Errors
    /// Returns [`ChainError::Exhausted`] once no backend is left.
    pub fn tick(&mut self) -> Result<TickOutcome, ChainError> {
        let observed = self.mode.observe();
        if observed.state == ModeState::ShuttingDown || self.stopped {
            return Ok(TickOutcome::Stop);
        }

        let snapshot = self.keys.snapshot();
        let previous = std::mem::replace(&mut self.previous_keys, snapshot);
        let last = std::mem::replace(&mut self.last_mode, observed);

        let reactivated = last.is_active() && observed.generation != last.generation;
        let deactivated = last.is_active() && (!observed.is_active() || reactivated);
        if deactivated {
            self.on_deactivate();
        }

        // Leaving Active drops the drag; a failed release is retried next tick
        let mut settled = true;
        if self.latched.drag && (deactivated || !observed.is_active()) {
            settled = self.release_drag(&snapshot)?;
        }
        if settled {
            settled = self.release_lifted_modifiers(&snapshot)?;
        }

        if observed.is_active() && (!last.is_active() || reactivated) {
            self.on_activate()?;
        }
        if !observed.is_active() || !settled {
            return Ok(TickOutcome::Continue);
        }

        let intent = self.planner.plan(&snapshot, &previous, self.latched.drag);
        if intent.is_empty() {
            return Ok(TickOutcome::Continue);
        }
        let held = self.held_modifiers(&snapshot);
        let backend = self.chain.backend()?;
        let result = dispatch(backend, &intent, &held, &self.smoothing, &mut self.latched);
        self.settle(result)?;
        Ok(TickOutcome::Continue)
    }

    fn on_activate(&mut self) -> Result<(), ChainError> {
        info!("Mouse mode ON");
        self.planner.reset();
        if let Some(suppressor) = &mut self.suppressor {
            suppressor.engage();
        }
        self.refresh_cursor(true);
        if log_enabled!(Level::Debug) {
            match self.chain.backend()?.query_position() {
                Ok((x, y)) => debug!("Pointer at ({}, {})", x, y),
                Err(e) => debug!("Pointer position unknown: {}", e),
            }
        }
        Ok(())
    }

    fn on_deactivate(&mut self) {
        info!("Mouse mode OFF");
        self.planner.reset();
        if let Some(suppressor) = &mut self.suppressor {
            suppressor.release();
        }
        if self.mode.variant() == ModeVariant::Toggle {
            self.refresh_cursor(false);
        }
    }

    fn refresh_cursor(&mut self, throttled: bool) {
        let Some(hook) = &self.restore_cursor else {
            return;
        };
        let now = Instant::now();
        let recent = self
            .last_cursor_refresh
            .is_some_and(|last| now.duration_since(last) < CURSOR_REFRESH_INTERVAL);
        if throttled && recent {
            debug!("Skipped cursor refresh");
            return;
        }
        self.last_cursor_refresh = Some(now);
        hook();
    }

    /// Releases the latched drag. Returns whether the backend took the release.
    fn release_drag(&mut self, snapshot: &KeySnapshot) -> Result<bool, ChainError> {
        let held = self.held_modifiers(snapshot);
        let result = self
            .chain
            .backend()?
            .apply_unmodified(ButtonAction::Release(MouseButton::Left), &held);
        self.latched.restored(&held);
        match result {
            Ok(()) => {
                debug!("Released drag on mode exit");
                self.latched.drag = false;
                self.failures = 0;
                Ok(true)
            }
            Err(e) => {
                self.settle(Err(e))?;
                Ok(false)
            }
        }
    }

    /// Releases injected modifiers whose physical key is no longer held.
    fn release_lifted_modifiers(&mut self, snapshot: &KeySnapshot) -> Result<bool, ChainError> {
        if self.latched.modifiers.is_empty() {
            return Ok(true);
        }
        let held = self.held_modifiers(snapshot);
        let lifted: Vec<Modifier> = self
            .latched
            .modifiers
            .iter()
            .copied()
            .filter(|modifier| !held.contains(modifier))
            .collect();
        if lifted.is_empty() {
            return Ok(true);
        }

        let backend = self.chain.backend()?;
        let mut result = Ok(());
        for modifier in lifted {
            if let Err(e) = backend.modifier(modifier, false) {
                result = Err(e);
                break;
            }
            self.latched.modifiers.retain(|latched| *latched != modifier);
        }
        let released = result.is_ok();
        self.settle(result)?;
        Ok(released)
    }

    fn held_modifiers(&self, snapshot: &KeySnapshot) -> Vec<Modifier> {
        let mut held = Vec::new();
        for (key, modifier) in &self.strip {
            if snapshot.is_held(*key) && !held.contains(modifier) {
                held.push(*modifier);
            }
        }
        held
    }

    /// Applies the failure policy to one dispatch result.
    fn settle(&mut self, result: Result<(), BackendError>) -> Result<(), ChainError> {
        let err = match result {
            Ok(()) => {
                self.failures = 0;
                return Ok(());
            }
            Err(err) => err,
        };

        if err.is_sustained() {
            return self.fall_back(&err);
        }
        if !err.is_transient() {
            debug!("Skipped unsupported action: {}", err);
            return Ok(());
        }

        self.failures += 1;
        warn!(
            "Backend call failed ({}/{}): {}",
            self.failures, self.failure_threshold, err
        );
        if self.failures >= self.failure_threshold {
            return self.fall_back(&err);
        }
        Ok(())
    }

    fn fall_back(&mut self, cause: &BackendError) -> Result<(), ChainError> {
        self.failures = 0;
        // The failed backend releases whatever it held when it shuts down
        self.latched = Latched::default();
        match self.chain.fall_back(cause) {
            Ok(kind) => {
                info!("Continuing on the {} backend", kind);
                Ok(())
            }
            Err(e) => {
                error!("{}", e);
                Err(e)
            }
        }
    }

    /// Releases held buttons and modifiers and closes the backend. Runs at most once.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if let Some(suppressor) = &mut self.suppressor {
            suppressor.release();
        }
        let modifiers = std::mem::take(&mut self.latched.modifiers);
        if !modifiers.is_empty() {
            if let Ok(backend) = self.chain.backend() {
                for modifier in modifiers.into_iter().rev() {
                    if let Err(e) = backend.modifier(modifier, false) {
                        warn!("Failed to release {:?} on shutdown: {}", modifier, e);
                    }
                }
            }
        }
        self.latched.drag = false;
        self.chain.shutdown();
    }
}

/// Sends one tick's actions; the first failure skips the rest.
fn dispatch(
    backend: &mut dyn PointerBackend,
    intent: &MotionIntent,
    held: &[Modifier],
    smoothing: &SmoothingConfig,
    latched: &mut Latched,
) -> Result<(), BackendError> {
    if intent.scroll != 0 {
        backend.scroll(intent.scroll)?;
    }

    if intent.has_motion() {
        let steps = if smoothing.enabled { smoothing.steps } else { 1 };
        let delay = smoothing.delay();
        let moves = interpolate(intent.dx, intent.dy, steps);
        let last = moves.len().saturating_sub(1);
        for (i, (dx, dy)) in moves.into_iter().enumerate() {
            backend.move_relative(dx, dy)?;
            if i < last && !delay.is_zero() {
                thread::sleep(delay);
            }
        }
    }

    for action in &intent.buttons {
        let result = backend.apply_unmodified(*action, held);
        latched.restored(held);
        result?;
        match action {
            ButtonAction::Press(MouseButton::Left) => latched.drag = true,
            ButtonAction::Release(MouseButton::Left) => latched.drag = false,
            _ => {}
        }
    }
    Ok(())
}

impl Drop for MotionScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
