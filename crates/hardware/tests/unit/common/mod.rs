//! Tests for shared types.

/// Access sizes, transaction status, and words.
pub mod data;
