//! Greenscan Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Record`, `QueueEntry`, `UsageCounter`
//! - **Port definitions** - Traits for adapters: `IRemoteBackend`, `IKeyValueStore`, `IEventSink`
//! - **Error taxonomy** - `RemoteError` with the single retryable/terminal classification
//! - **Configuration** - Typed YAML config shared by all crates
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no external dependencies.
//! Ports define trait interfaces that adapter crates implement.
//! The engine crate orchestrates domain entities through port interfaces.

pub mod config;
pub mod domain;
pub mod ports;
