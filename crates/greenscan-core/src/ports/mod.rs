//! Port definitions (hexagonal architecture)
//!
//! Traits that adapter crates implement. Driven (secondary) ports are
//! consumed by the engine; the platform/presentation layer supplies
//! concrete implementations at wiring time.

pub mod connectivity;
pub mod event_sink;
pub mod kv_store;
pub mod remote_backend;

pub use connectivity::{ConnectivityEvent, ConnectivityState};
pub use event_sink::{EngineEvent, IEventSink, NullEventSink};
pub use kv_store::IKeyValueStore;
pub use remote_backend::{
    AnalysisOutcome, IRemoteBackend, RemoteAnalysis, RemoteCounter, RemoteRecord,
};
