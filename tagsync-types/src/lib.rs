//! Core type definitions for tagsync.
//!
//! This crate defines the plugin-agnostic types shared by the storage layer
//! and the sync engine:
//! - Browsed address-space nodes (`NodeTreeEntry`)
//! - Monitored tags and their live values
//! - Store column types
//! - The identifier normalizer that turns node ids into storage-safe names
//!
//! Nothing here performs I/O.

mod column;
mod node;
pub mod normalize;
mod tag;
mod value;

pub use column::{ColumnSpec, ColumnType};
pub use node::{NodeClass, NodeTreeEntry};
pub use normalize::{is_normalized, normalize, MAX_IDENTIFIER_LEN};
pub use tag::TagDescriptor;
pub use value::TagValue;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
}
