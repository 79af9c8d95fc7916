//! SQLite backend for the Stay script store.
//!
//! A single [`rusqlite::Connection`] behind a mutex: every store call is
//! synchronous and runs inside its own transaction, which is what serializes
//! mutations and makes each one atomic.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
