//! HTTP API for chain-daemon

pub mod rest;

pub use rest::router::create_router;
