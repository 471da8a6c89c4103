//! Common types, errors, and utilities for Citadel crates.

pub mod error;
pub mod types;

pub use error::{AppError, AppResult};
pub use types::*;
