//! Greenscan Engine - The offline-first core behind the client shell
//!
//! Wires the durable queue, retry executor, record synchronizer and usage
//! reconciler into one [`AnalysisEngine`] facade. The presentation layer
//! talks only to this crate:
//!
//! ```no_run
//! use std::sync::Arc;
//! use greenscan_core::config::Config;
//! use greenscan_core::ports::NullEventSink;
//! use greenscan_backend::HttpBackend;
//! use greenscan_engine::AnalysisEngine;
//! use greenscan_store::{SqliteKeyValueStore, StorePool};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load_or_default(&Config::default_path());
//! let pool = StorePool::new(std::path::Path::new("/tmp/greenscan.db")).await?;
//! let kv = Arc::new(SqliteKeyValueStore::new(pool.pool().clone()));
//! let backend = Arc::new(HttpBackend::new(&config.backend)?);
//! let engine = AnalysisEngine::new(config, backend, kv, Arc::new(NullEventSink)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! A `submit_analysis` call routes directly through the retry executor when
//! online and into the durable queue when not; a transition back online
//! triggers the queue processor via the connectivity monitor.

pub mod engine;
pub mod logging;

pub use engine::{AnalysisEngine, SubmissionOutcome};
