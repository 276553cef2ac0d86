//! # ika-model-wait
//!
//! 共享的 Ikariam 模型就绪等待器：多个脚本只需等待一次 `ikariam.model`。
//!
//! Shared readiness waiter for the Ikariam userscripts (slot notifier, map
//! enhancer, navigation enhancer). Each script used to carry its own copy of a
//! "poll until `window.ikariam.model` exists" helper; this crate is the one
//! component they all call instead.
//!
//! ## Overview
//!
//! A [`ModelReadinessWaiter`] answers "is the host model there yet?" by
//! combining three mechanisms:
//!
//! - **Immediate check**: if the model already exists, the returned signal is
//!   resolved on the spot and nothing is scheduled
//! - **Change observation**: script nodes added to the document trigger an
//!   early check, since the game client loads asynchronously
//! - **Phased polling**: a fast interval for the first seconds, then a slower
//!   one until the total timeout
//!
//! All concurrent callers share one in-flight attempt. Success is cached for
//! the life of the waiter; a timeout resets it so the next call starts fresh.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ika_model_wait::readiness::{DocumentFeed, HostGlobal};
//! use ika_model_wait::{ModelReadinessWaiter, WaiterConfig};
//! use std::sync::Arc;
//!
//! struct GameModel {
//!     selected_city: u32,
//! }
//!
//! #[tokio::main]
//! async fn main() -> ika_model_wait::Result<()> {
//!     let global: Arc<HostGlobal<GameModel>> = Arc::new(HostGlobal::new());
//!     let document = DocumentFeed::new();
//!
//!     let waiter = ModelReadinessWaiter::<Arc<GameModel>>::builder()
//!         .config(WaiterConfig::default().with_env_overrides()?)
//!         .probe_arc(global.clone())
//!         .change_source(document.clone())
//!         .build()?;
//!
//!     let city = waiter
//!         .when_ready(|model| Ok(model.selected_city))
//!         .await?;
//!     println!("current city: {}", city);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`readiness`] | Waiter, signal, schedule, probes and change sources |
//! | [`config`] | Timing configuration from code, files or environment |
//! | [`error`] | Error types |

pub mod config;
pub mod error;
pub mod readiness;

pub use config::WaiterConfig;
pub use error::{Error, ErrorContext, ReadinessError};
pub use readiness::{
    ModelReadinessWaiter, ReadinessSignal, ResolvedBy, WaiterSnapshot, WaiterState,
};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
