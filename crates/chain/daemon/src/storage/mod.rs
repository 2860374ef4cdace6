//! Storage layer for chain-daemon
//!
//! Provides persistence for chain definitions and chain executions.

mod memory;
mod postgres;
mod traits;

pub use memory::InMemoryStorage;
pub use postgres::PostgresStorage;
pub use traits::{DefinitionStorage, ExecutionFilter, ExecutionStorage, Storage, StorageResult};
