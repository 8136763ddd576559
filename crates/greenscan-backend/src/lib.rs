//! Greenscan Backend - HTTP adapter for the remote API
//!
//! Implements the `IRemoteBackend` port from `greenscan-core` over the
//! Greenscan REST API. This crate owns all transport concerns: request
//! timeouts, status-code mapping into the [`RemoteError`] taxonomy, and
//! payload encoding. It performs no retries of its own; the retry executor
//! wraps calls at the orchestration layer.
//!
//! [`RemoteError`]: greenscan_core::domain::RemoteError

pub mod client;

pub use client::HttpBackend;
