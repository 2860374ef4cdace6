//! REST API: JSON endpoints under `/api/v1`

pub mod handlers;
pub mod router;
pub mod state;
