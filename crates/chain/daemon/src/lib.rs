//! Chain daemon library
//!
//! This module provides the runtime around the chain engine:
//! - Module catalog and HTTP action executor
//! - Storage backends with optimistic versioning
//! - Work queue, worker pool and recovery sweeps
//! - Command service and REST API
//! - Server lifecycle management

pub mod api;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http_executor;
pub mod outbox;
pub mod runtime;
pub mod server;
pub mod service;
pub mod storage;

pub use config::ChainDaemonConfig;
pub use error::{ApiError, DaemonError, ServiceError, StorageError};
pub use outbox::{BroadcastOutbox, EventOutbox};
pub use runtime::{ChainRuntime, RuntimeParts};
pub use server::Server;
pub use service::{ChainService, CreateChainDefinition, TriggerEvent, UpdateChainDefinition};
pub use storage::{InMemoryStorage, Storage};
