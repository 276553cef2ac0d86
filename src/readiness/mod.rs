//! 就绪等待模块：在宿主模型出现之前挂起调用方，所有调用方共享同一次等待。
//!
//! # Readiness Module
//!
//! Userscripts attach to a page before the game client has finished
//! bootstrapping, so every script needs to wait for `ikariam.model` before it
//! can touch game state. This module provides one shared waiter for that.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ModelReadinessWaiter`] | Single-flight waiter with cached success and reset on failure |
//! | [`ReadinessSignal`] | Awaitable, clonable result of one wait attempt |
//! | [`PollSchedule`] | Phased poll intervals bounded by a total timeout |
//! | [`ModelProbe`] / [`HostGlobal`] | Existence check for the host model |
//! | [`ChangeSource`] / [`DocumentFeed`] | Structural change notifications that trigger early checks |
//!
//! ## Example
//!
//! ```rust
//! use ika_model_wait::readiness::{HostGlobal, ModelReadinessWaiter};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> ika_model_wait::Result<()> {
//! let global: Arc<HostGlobal<String>> = Arc::new(HostGlobal::new());
//! let waiter = ModelReadinessWaiter::<Arc<String>>::builder()
//!     .probe_arc(global.clone())
//!     .build()?;
//!
//! global.publish("model".to_string());
//! let model = waiter.wait_for_ready().await?;
//! assert_eq!(model.as_str(), "model");
//! # Ok(())
//! # }
//! ```

pub mod observe;
pub mod probe;
pub mod schedule;
pub mod signal;
pub mod throttle;
mod waiter;

pub use observe::{
    AddedNode, ChangeBatch, ChangeCallback, ChangeSource, DocumentFeed, NodeKind, Subscription,
};
pub use probe::{HostGlobal, ModelProbe, ProbeError, ProbeOutcome, TransientCheckError};
pub use schedule::{PhaseSlot, PollPhase, PollSchedule};
pub use signal::{ReadinessSignal, SignalState, SignalStatus};
pub use throttle::ErrorThrottle;
pub use waiter::{
    ModelReadinessWaiter, ModelReadinessWaiterBuilder, ResolvedBy, WaiterSnapshot, WaiterState,
};
