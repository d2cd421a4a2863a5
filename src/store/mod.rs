// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Object store seam.
//!
//! The engine never mutates an object in place: uploads and rotation
//! are full-object overwrites, and the store's own last-write-wins
//! semantics are accepted. Implementations report metadata only; the
//! engine treats object bodies as opaque bytes.

use std::time::SystemTime;

use async_trait::async_trait;

mod memory;
#[cfg(feature = "aws")]
mod s3;

pub use memory::MemoryObjectStore;
#[cfg(feature = "aws")]
pub use s3::S3ObjectStore;

/// Errors that can occur in object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No object exists at the given key.
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// The store backend failed.
    #[error("object store error: {0}")]
    Backend(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata for one stored object, as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object key.
    pub key: String,
    /// Last modification time.
    pub last_modified: SystemTime,
    /// Object size in bytes.
    pub size: u64,
    /// Content fingerprint.
    pub etag: String,
}

/// Object store interface.
///
/// Implementations are expected to provide their own durability and
/// retry behavior; the engine only relies on `get` failing with
/// [`StoreError::NotFound`] for absent keys and `put` being a full
/// overwrite.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Lists objects whose keys start with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, StoreError>;

    /// Fetches an object's bytes.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Writes an object, overwriting any existing one at the key.
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError>;

    /// Deletes an object. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
