//! IoT Node - Policy-governed data node for simulated IoT devices
//!
//! This library provides the core functionality for the node and its
//! companion storage service:
//! - Hierarchical subject addressing and entitlement policy
//! - Simulated sensors feeding a routing pipeline
//! - Semantic tag harvesting for the metadata catalog
//! - Bucketed time-series storage
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                      Node API                        │
//! │   Entitlements  │  Devices  │  Data  │  Health       │
//! └────────────────────────┬─────────────────────────────┘
//!                          │
//! ┌────────────────────────▼─────────────────────────────┐
//! │                  Routing pipeline                    │
//! │   Sensors  │  Policy lookup  │  Promotion  │  Tags   │
//! └──────────┬──────────────────────────────┬────────────┘
//!            │                              │
//! ┌──────────▼───────────┐       ┌──────────▼────────────┐
//! │   Metadata service   │       │    Storage service    │
//! │   (catalog, remote)  │       │   (time series, SQL)  │
//! └──────────────────────┘       └───────────────────────┘
//! ```

pub mod api;
pub mod clients;
pub mod config;
pub mod daemon;
pub mod data;
pub mod db;
pub mod devices;
pub mod entitlements;
pub mod error;
pub mod graph;
pub mod metadata;
pub mod pipeline;
pub mod sensors;
pub mod subject;
pub mod trie;

pub use clients::{CatalogRequest, MetadataClient, StorageClient, StoredValue};
pub use config::Config;
pub use daemon::{NodeDaemon, StorageDaemon};
pub use db::{DbConn, DbPool, TimeSeries};
pub use entitlements::{AccessLevel, Entitlement, EntitlementManager, EntitlementStore, Status};
pub use error::{Error, Result};
pub use metadata::{Metadata, MetadataStore};
pub use pipeline::DeviceManager;
pub use subject::Subject;
