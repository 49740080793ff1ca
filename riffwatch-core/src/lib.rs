//! # riffwatch-core
//!
//! Telemetry acquisition and reconciliation for a Rocksmith overlay.
//!
//! This library provides:
//! - Transports for the local telemetry source (HTTP polling or a persistent
//!   TCP stream), with bounded retry and timeouts
//! - A normalizer that maps every known payload shape onto one [`Snapshot`]
//! - Rolling accuracy history, a session streak watermark and a last-good
//!   fallback snapshot
//! - A JSON tip store and an LLM-backed tip generator
//! - The polling loop that publishes an atomically swapped [`ReadModel`]
//! - Configuration and logging infrastructure
//!
//! ## Data flow
//!
//! ```text
//! tick → Transport::fetch → SnapshotNormalizer → HistoryAggregator + FallbackCache → ReadModel
//!                                                      ↑
//!                              TipStore ← LiveAiSwitch (on toggle)
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use riffwatch_core::{tips, Config, Engine};
//!
//! # async fn run() -> riffwatch_core::Result<()> {
//! let config = Config::load()?;
//! let generator = tips::create_generator(config.llm.as_ref(), config.tips.tips_per_kind)?;
//! let engine = Engine::start(&config, generator)?;
//!
//! let model = engine.read_model();
//! println!("{} ({})", model.snapshot.song, model.status);
//!
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use engine::{Engine, EngineHandle};
pub use error::{Error, NormalizeError, Result, TransportError};
pub use types::*;

// Public modules
pub mod config;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod history;
pub mod live_ai;
pub mod logging;
pub mod normalize;
pub mod poller;
pub mod tips;
pub mod transport;
pub mod types;
