//! bucketfs core - shared vocabulary for the object-storage filesystem adapter
//!
//! Provides the error taxonomy, adapter configuration, and the
//! filesystem-shaped attribute types returned by every adapter operation.

pub mod config;
pub mod error;
pub mod types;

pub use config::AdapterConfig;
pub use error::{ClientError, Error, MetadataAttribute, Result};
pub use types::*;
