//! SDK Utilities
//!
//! Common utilities for the SDK.

mod glob;
mod hashing;
mod time;
mod validation;

pub use glob::glob_match;
pub use hashing::content_hash;
pub use time::{from_millis, now_utc, to_millis};
pub use validation::{validate_id, validate_version, ValidationError};
