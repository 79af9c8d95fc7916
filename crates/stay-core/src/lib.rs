//! Core types and trait definitions for the Stay userscript runtime.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Every other crate depends on it; it performs no I/O of its own.

pub mod error;
pub mod pattern;
pub mod script;
pub mod snapshot;
pub mod store;
pub mod validate;
pub mod version;

pub use error::{Error, Result};
