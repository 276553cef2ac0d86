//! Shared single-assignment readiness signal.

use crate::error::ReadinessError;
use crate::Result;
use futures::future::BoxFuture;
use std::future::IntoFuture;
use tokio::sync::watch;

/// Settlement of a readiness signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalState<M> {
    Pending,
    Resolved(M),
    Failed(ReadinessError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalStatus {
    Pending,
    Resolved,
    Failed,
}

impl<M> SignalState<M> {
    pub fn status(&self) -> SignalStatus {
        match self {
            SignalState::Pending => SignalStatus::Pending,
            SignalState::Resolved(_) => SignalStatus::Resolved,
            SignalState::Failed(_) => SignalStatus::Failed,
        }
    }
}

/// Awaitable "the host model is available" signal.
///
/// Clones observe the same settlement. Await it directly or call [`wait`](Self::wait).
#[derive(Debug, Clone)]
pub struct ReadinessSignal<M> {
    rx: watch::Receiver<SignalState<M>>,
}

/// Write side, held by the attempt that owns the signal.
#[derive(Debug)]
pub(crate) struct SignalSender<M> {
    tx: watch::Sender<SignalState<M>>,
}

impl<M: Clone + Send + Sync + 'static> ReadinessSignal<M> {
    pub(crate) fn pending() -> (SignalSender<M>, Self) {
        let (tx, rx) = watch::channel(SignalState::Pending);
        (SignalSender { tx }, Self { rx })
    }

    pub(crate) fn settled(state: SignalState<M>) -> Self {
        let (_tx, rx) = watch::channel(state);
        Self { rx }
    }

    pub fn resolved(model: M) -> Self {
        Self::settled(SignalState::Resolved(model))
    }

    pub fn failed(err: ReadinessError) -> Self {
        Self::settled(SignalState::Failed(err))
    }

    pub fn status(&self) -> SignalStatus {
        self.rx.borrow().status()
    }

    pub fn state(&self) -> SignalState<M> {
        self.rx.borrow().clone()
    }

    /// Whether both handles belong to the same wait attempt.
    pub fn same_signal(&self, other: &Self) -> bool {
        self.rx.same_channel(&other.rx)
    }

    /// Resolve to the model, or to the failure every sharer of this signal sees.
    pub async fn wait(mut self) -> Result<M> {
        loop {
            let state = self.rx.borrow_and_update().clone();
            match state {
                SignalState::Resolved(m) => return Ok(m),
                SignalState::Failed(e) => return Err(e.into()),
                SignalState::Pending => {}
            }
            if self.rx.changed().await.is_err() {
                // sender gone; it may have settled right before dropping
                return match self.rx.borrow().clone() {
                    SignalState::Resolved(m) => Ok(m),
                    SignalState::Failed(e) => Err(e.into()),
                    SignalState::Pending => Err(ReadinessError::Runtime {
                        message: "readiness attempt ended without settling".to_string(),
                    }
                    .into()),
                };
            }
        }
    }
}

impl<M: Clone + Send + Sync + 'static> IntoFuture for ReadinessSignal<M> {
    type Output = Result<M>;
    type IntoFuture = BoxFuture<'static, Result<M>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

impl<M> SignalSender<M> {
    /// First settlement wins; later calls are ignored.
    pub(crate) fn settle(&self, state: SignalState<M>) -> bool {
        self.tx.send_if_modified(|current| {
            if matches!(current, SignalState::Pending) {
                *current = state;
                true
            } else {
                false
            }
        })
    }
}
