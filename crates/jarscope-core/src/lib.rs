//! Core data types for jarscope.
//!
//! This crate defines the fundamental types of the inventory pipeline:
//! the declarative services config document, path-template rendering,
//! artifact naming and classification rules, and the on-disk layout of
//! decompile output trees.
//!
//! This crate is intentionally free of async code, database access, and
//! remote I/O.

pub mod artifact;
pub mod config;
pub mod layout;
pub mod template;
