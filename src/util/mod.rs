//! Shared utility helpers.

pub mod error;

pub use error::{AsterMatchError, AsterMatchResult, Side};
