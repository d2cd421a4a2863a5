// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Engine error taxonomy.
//!
//! Single-secret operations fail fast with a specific kind. Batch
//! operations complete the whole pass and report every per-item
//! failure through [`CompositeError`]; no kind is downgraded along the
//! way, so a caller can always tell corruption from a wrong context
//! from a backend outage.

use crate::kms::KmsError;
use crate::store::StoreError;

/// Errors surfaced by the secret engine.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    /// No secret exists at the given path.
    #[error("secret not found: {path}")]
    NotFound { path: String },

    /// The supplied encryption context does not match the one the
    /// data was sealed under.
    #[error("encryption context mismatch")]
    ContextMismatch,

    /// Authentication tag verification failed: the data was tampered
    /// with or corrupted.
    #[error("authentication failed: data is corrupt or was tampered with")]
    Authentication,

    /// The archive was produced by an unknown format version.
    #[error("unsupported archive format version {version}")]
    UnsupportedFormat { version: u8 },

    /// The archive is structurally malformed or an entry failed its
    /// tag check.
    #[error("corrupt archive: {reason}")]
    CorruptArchive {
        /// The offending entry, when the corruption is entry-scoped.
        entry: Option<String>,
        /// Human-readable detail, naming the entry where applicable.
        reason: String,
    },

    /// A listing pattern could not be parsed.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// The key service failed.
    #[error("key service failure: {0}")]
    KeyService(String),

    /// The object store failed.
    #[error("object store failure: {0}")]
    Store(String),

    /// One or more items of a batch operation failed.
    #[error(transparent)]
    Composite(#[from] CompositeError),
}

impl From<KmsError> for SecretError {
    fn from(err: KmsError) -> Self {
        match err {
            KmsError::ContextMismatch => SecretError::ContextMismatch,
            KmsError::Authentication => SecretError::Authentication,
            other => SecretError::KeyService(other.to_string()),
        }
    }
}

impl From<StoreError> for SecretError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { key } => SecretError::NotFound { path: key },
            other => SecretError::Store(other.to_string()),
        }
    }
}

/// Aggregated result of a batch operation that had failures.
///
/// Records every failed item with its error and the items that
/// succeeded in the same pass, so an operator can retry only the
/// failed subset.
#[derive(Debug, Default)]
pub struct CompositeError {
    /// Paths that completed successfully.
    pub succeeded: Vec<String>,
    /// Each failed path with the error that stopped it.
    pub failed: Vec<(String, SecretError)>,
}

impl CompositeError {
    /// Creates an empty composite.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no item failed.
    pub fn is_empty(&self) -> bool {
        self.failed.is_empty()
    }

    /// Converts into a `Result`: `Ok(value)` when nothing failed,
    /// otherwise `Err` carrying the composite.
    pub fn into_result<T>(self, value: T) -> Result<T, SecretError> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(SecretError::Composite(self))
        }
    }
}

impl std::fmt::Display for CompositeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} of {} items failed",
            self.failed.len(),
            self.failed.len() + self.succeeded.len()
        )?;
        for (path, err) in &self.failed {
            write!(f, "; {}: {}", path, err)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompositeError {}
