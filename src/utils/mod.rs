//! Shared value types and helpers

pub mod helpers;
pub mod types;

pub use helpers::*;
pub use types::*;
