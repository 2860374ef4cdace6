//! API request handlers

mod definitions;
mod executions;
mod system;

pub use definitions::*;
pub use executions::*;
pub use system::*;

use crate::error::ApiError;
use std::str::FromStr;

/// Parse a UUID-based path or query id
fn parse_id<T>(kind: &str, raw: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = uuid::Error>,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {} id '{}': {}", kind, raw, e)))
}
