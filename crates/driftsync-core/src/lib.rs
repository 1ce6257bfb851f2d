//! DriftSync Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `SyncItem`, `ConflictInfo`, `SyncOperation`,
//!   `TransferSession`, `OfflineCacheItem`
//! - **Port definitions** - Traits for adapters: `CloudTransport`,
//!   `PeerTransport`, `StateStore`
//! - **Event stream types** - `SyncEvent` payloads consumed by the host app
//! - **Configuration** - Typed YAML configuration with defaults
//!
//! # Architecture
//!
//! The domain module contains pure business logic with no I/O. Ports define
//! trait interfaces that adapter crates (store, transports) implement. The
//! orchestration crate (`driftsync-engine`) wires domain entities through
//! port interfaces.

pub mod config;
pub mod domain;
pub mod ports;
