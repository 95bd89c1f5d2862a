//! Ordered fallback between backend implementations.

use super::command::CommandBackend;
use super::uinput::UinputBackend;
use super::x11::X11Backend;
use super::{BackendError, PointerBackend};
use crate::config::{BackendConfig, BackendKind};
use log::{error, info, warn};
use thiserror::Error;

/// Builds a backend of the requested kind.
pub type BackendFactory =
    Box<dyn FnMut(BackendKind) -> Result<Box<dyn PointerBackend>, BackendError> + Send>;

#[derive(Debug, Error, PartialEq)]
pub enum ChainError {
    #[error("All pointer backends failed (tried: {tried})")]
    Exhausted { tried: String },
}

/// Factory that constructs the real X11, xdotool, and uinput backends.
pub fn system_factory(config: BackendConfig) -> BackendFactory {
    Box::new(move |kind| -> Result<Box<dyn PointerBackend>, BackendError> {
        Ok(match kind {
            BackendKind::Direct => Box::new(X11Backend::connect()?),
            BackendKind::Command => Box::new(CommandBackend::new(&config)?),
            BackendKind::Device => Box::new(UinputBackend::create(&config)?),
        })
    })
}

/// Owns the active backend and the ones still left to try.
///
/// Backends are constructed lazily, one at a time. Once every kind has been
/// tried the chain is exhausted for good.
pub struct FallbackChain {
    order: Vec<BackendKind>,
    next: usize,
    active: Option<Box<dyn PointerBackend>>,
    factory: BackendFactory,
}

impl FallbackChain {
    /// Try order: `selected`, then the command backend, then the rest by preference.
    pub fn fallback_order(selected: BackendKind) -> Vec<BackendKind> {
        let mut order = vec![selected];
        if selected != BackendKind::Command {
            order.push(BackendKind::Command);
        }
        for kind in BackendKind::PREFERENCE {
            if !order.contains(&kind) {
                order.push(kind);
            }
        }
        order
    }

    pub fn new(selected: BackendKind, factory: BackendFactory) -> Self {
        Self {
            order: Self::fallback_order(selected),
            next: 0,
            active: None,
            factory,
        }
    }

    /// Activates the first backend that can be constructed.
    pub fn start(&mut self) -> Result<BackendKind, ChainError> {
        if let Some(active) = &self.active {
            return Ok(active.kind());
        }
        self.advance()
    }

    pub fn active_kind(&self) -> Option<BackendKind> {
        self.active.as_ref().map(|backend| backend.kind())
    }

    /// The active backend.
    pub fn backend(&mut self) -> Result<&mut dyn PointerBackend, ChainError> {
        let Self {
            active, order, next, ..
        } = self;
        match active.as_deref_mut() {
            Some(backend) => Ok(backend),
            None => Err(exhausted(&order[..*next])),
        }
    }

    /// Shuts the active backend down and moves on to the next one.
    pub fn fall_back(&mut self, cause: &BackendError) -> Result<BackendKind, ChainError> {
        if let Some(mut failed) = self.active.take() {
            warn!("{} backend failed: {} - falling back", failed.kind(), cause);
            failed.shutdown();
        }
        self.advance()
    }

    /// Shuts the active backend down. Later calls do nothing.
    pub fn shutdown(&mut self) {
        if let Some(mut backend) = self.active.take() {
            info!("Shutting down {} backend", backend.kind());
            backend.shutdown();
        }
        self.next = self.order.len();
    }

    fn advance(&mut self) -> Result<BackendKind, ChainError> {
        while let Some(kind) = self.order.get(self.next).copied() {
            self.next += 1;
            match (self.factory)(kind) {
                Ok(backend) => {
                    info!("Using {} backend", kind);
                    self.active = Some(backend);
                    return Ok(kind);
                }
                Err(e) => warn!("{} backend unavailable: {}", kind, e),
            }
        }
        let err = exhausted(&self.order);
        error!("{}", err);
        Err(err)
    }
}

fn exhausted(tried: &[BackendKind]) -> ChainError {
    let tried: Vec<&str> = tried.iter().map(|kind| kind.as_str()).collect();
    ChainError::Exhausted {
        tried: tried.join(", "),
    }
}
