//! Shared utilities for jarscope.
//!
//! This crate provides cross-cutting concerns used by all other jarscope
//! crates: error types, filesystem helpers, source-content hashing,
//! subprocess spawning with timeouts, and terminal progress indicators.

pub mod encoding;
pub mod errors;
pub mod fs;
pub mod hash;
pub mod process;
pub mod progress;
