//! API request handlers

mod activities;
mod billing;
mod clients;
mod contracts;
mod files;
mod forms;
mod growth;
mod health;
mod invoices;
mod members;
mod messages;
mod portal;

pub use activities::*;
pub use billing::*;
pub use clients::*;
pub use contracts::*;
pub use files::*;
pub use forms::*;
pub use growth::*;
pub use health::*;
pub use invoices::*;
pub use members::*;
pub use messages::*;
pub use portal::*;

use crate::error::ApiError;
use std::str::FromStr;

/// Parse a path identifier, rejecting malformed ids with `400`
pub(crate) fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {} id: {}", what, raw)))
}
