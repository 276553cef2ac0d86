//! Probing the host for its model.

use arc_swap::ArcSwapOption;
use std::fmt;
use std::sync::Arc;
use std::sync::RwLock;
use thiserror::Error;

/// A probe tripped over a half-built host model. Always retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransientCheckError {
    pub message: String,
}

impl TransientCheckError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A probe failed in a way retrying cannot fix. Fails the current attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProbeError {
    pub message: String,
}

impl ProbeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result of one existence check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome<M> {
    Ready(M),
    NotReady,
    Transient(TransientCheckError),
}

impl<M> ProbeOutcome<M> {
    pub fn is_ready(&self) -> bool {
        matches!(self, ProbeOutcome::Ready(_))
    }

    pub fn ready(self) -> Option<M> {
        match self {
            ProbeOutcome::Ready(m) => Some(m),
            _ => None,
        }
    }
}

/// Checks whether the host model exists.
///
/// `probe` may run many times per second and must not block. `peek` is the
/// direct low-level reference used by synchronous getters; implementations that
/// have no cheaper path than `probe` leave it at the default.
pub trait ModelProbe<M>: Send + Sync {
    fn probe(&self) -> Result<ProbeOutcome<M>, ProbeError>;

    fn peek(&self) -> Option<M> {
        None
    }
}

impl<M, F> ModelProbe<M> for F
where
    F: Fn() -> Result<ProbeOutcome<M>, ProbeError> + Send + Sync,
{
    fn probe(&self) -> Result<ProbeOutcome<M>, ProbeError> {
        self()
    }
}

/// In-process stand-in for a page global such as `window.ikariam.model`.
///
/// Host code publishes the model once it has finished bootstrapping. While
/// `initializing` is set, probes report a transient error, the way reading a
/// half-constructed global throws in the page.
pub struct HostGlobal<T> {
    slot: ArcSwapOption<T>,
    initializing: RwLock<Option<String>>,
}

impl<T> HostGlobal<T> {
    pub fn new() -> Self {
        Self {
            slot: ArcSwapOption::empty(),
            initializing: RwLock::new(None),
        }
    }

    pub fn publish(&self, model: T) -> Arc<T> {
        let model = Arc::new(model);
        self.publish_arc(Arc::clone(&model));
        model
    }

    pub fn publish_arc(&self, model: Arc<T>) {
        self.slot.store(Some(model));
        if let Ok(mut init) = self.initializing.write() {
            *init = None;
        }
    }

    pub fn clear(&self) {
        self.slot.store(None);
    }

    /// Mark the global as mid-construction; probes fail transiently with `reason`.
    pub fn set_initializing(&self, reason: impl Into<String>) {
        if let Ok(mut init) = self.initializing.write() {
            *init = Some(reason.into());
        }
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.slot.load_full()
    }
}

impl<T> Default for HostGlobal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for HostGlobal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostGlobal")
            .field("published", &self.slot.load().is_some())
            .finish()
    }
}

impl<T: Send + Sync> ModelProbe<Arc<T>> for HostGlobal<T> {
    fn probe(&self) -> Result<ProbeOutcome<Arc<T>>, ProbeError> {
        let init = self
            .initializing
            .read()
            .map_err(|_| ProbeError::new("host global lock poisoned"))?;
        if let Some(reason) = init.as_ref() {
            return Ok(ProbeOutcome::Transient(TransientCheckError::new(reason.clone())));
        }
        Ok(match self.slot.load_full() {
            Some(model) => ProbeOutcome::Ready(model),
            None => ProbeOutcome::NotReady,
        })
    }

    fn peek(&self) -> Option<Arc<T>> {
        self.slot.load_full()
    }
}
