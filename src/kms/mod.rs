// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Key service seam and key material types.
//!
//! A [`KeyService`] hands out short-lived data keys and keeps the
//! wrapping key (KEK) on its side; plaintext key material only exists
//! in memory for the duration of one seal/open operation and is
//! zeroized on drop.
//!
//! All operations are async to support cloud KMS providers that
//! require network calls.

use std::collections::BTreeMap;

use async_trait::async_trait;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[cfg(feature = "aws")]
mod aws;
mod local;

#[cfg(feature = "aws")]
pub use aws::AwsKeyService;
pub use local::LocalKeyService;

/// Size of AES-256 keys in bytes.
pub const AES_256_KEY_SIZE: usize = 32;

/// Size of AES-GCM nonce in bytes.
pub const AES_GCM_NONCE_SIZE: usize = 12;

/// Size of AES-GCM authentication tag in bytes.
pub const AES_GCM_TAG_SIZE: usize = 16;

/// Errors that can occur in key service operations.
#[derive(Debug, thiserror::Error)]
pub enum KmsError {
    /// Data key generation failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// The supplied encryption context does not match the one used at
    /// wrap time; the key service refused to unwrap.
    #[error("encryption context mismatch")]
    ContextMismatch,

    /// The wrapped key bytes failed integrity verification.
    #[error("wrapped key failed authentication")]
    Authentication,

    /// Unwrapped key material has the wrong length.
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    /// A context string could not be parsed.
    #[error("invalid encryption context: {0}")]
    InvalidContext(String),

    /// The key service backend failed.
    #[error("key service error: {0}")]
    Backend(String),
}

/// Caller-supplied binding data for key operations.
///
/// The context is authenticated associated data at the key service: it
/// must match bit-for-bit between wrap and unwrap or the unwrap is
/// rejected. Pairs are kept sorted so the canonical encoding is
/// independent of insertion order. An empty context and an absent
/// context are treated as equivalent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptionContext {
    pairs: BTreeMap<String, String>,
}

impl EncryptionContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key/value pair, replacing any existing value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.insert(key.into(), value.into());
    }

    /// Adds a pair, builder-style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns true if the context holds no pairs.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Returns the number of pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Iterates over pairs in sorted key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parses the `k1=v1,k2=v2` form used in environment configuration.
    ///
    /// An empty string parses to an empty context.
    pub fn from_kv_str(s: &str) -> Result<Self, KmsError> {
        let mut ctx = Self::new();
        if s.is_empty() {
            return Ok(ctx);
        }
        for pair in s.split(',') {
            let (k, v) = pair
                .split_once('=')
                .ok_or_else(|| KmsError::InvalidContext(format!("unable to parse {:?}", pair)))?;
            ctx.insert(k, v);
        }
        Ok(ctx)
    }

    /// Canonical byte encoding: `[pair-count u32 BE]` followed by
    /// `[key-len u32 BE][key][value-len u32 BE][value]` per pair in
    /// sorted key order.
    ///
    /// Used as AAD by local key services and as the context field of
    /// the archive header.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.pairs.len() as u32).to_be_bytes());
        for (k, v) in &self.pairs {
            out.extend_from_slice(&(k.len() as u32).to_be_bytes());
            out.extend_from_slice(k.as_bytes());
            out.extend_from_slice(&(v.len() as u32).to_be_bytes());
            out.extend_from_slice(v.as_bytes());
        }
        out
    }

    /// Decodes the canonical byte encoding produced by
    /// [`canonical_bytes`](Self::canonical_bytes).
    pub fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, KmsError> {
        fn take<'a>(bytes: &mut &'a [u8], n: usize) -> Result<&'a [u8], KmsError> {
            if bytes.len() < n {
                return Err(KmsError::InvalidContext("truncated encoding".into()));
            }
            let (head, tail) = bytes.split_at(n);
            *bytes = tail;
            Ok(head)
        }
        fn take_u32(bytes: &mut &[u8]) -> Result<u32, KmsError> {
            let b = take(bytes, 4)?;
            Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        }
        fn take_str(bytes: &mut &[u8]) -> Result<String, KmsError> {
            let len = take_u32(bytes)? as usize;
            let raw = take(bytes, len)?;
            String::from_utf8(raw.to_vec())
                .map_err(|_| KmsError::InvalidContext("invalid utf-8".into()))
        }

        let mut rest = bytes;
        let count = take_u32(&mut rest)?;
        let mut ctx = Self::new();
        for _ in 0..count {
            let k = take_str(&mut rest)?;
            let v = take_str(&mut rest)?;
            ctx.insert(k, v);
        }
        if !rest.is_empty() {
            return Err(KmsError::InvalidContext("trailing bytes".into()));
        }
        Ok(ctx)
    }
}

impl FromIterator<(String, String)> for EncryptionContext {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}

/// A data key used for one envelope operation.
///
/// Holds 256-bit AES key material that is zeroized when the key is
/// dropped; the wrapped form lives in [`WrappedDataKey`].
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DataKey {
    /// The raw 256-bit key material.
    key: [u8; AES_256_KEY_SIZE],
    /// Unique identifier for this data key.
    #[zeroize(skip)]
    id: String,
}

impl DataKey {
    /// Creates a new data key from raw material and an ID.
    pub fn new(key: [u8; AES_256_KEY_SIZE], id: String) -> Self {
        Self { key, id }
    }

    /// Returns the key material.
    ///
    /// # Security
    ///
    /// The returned slice references key material that will be
    /// zeroized when this key is dropped. Do not store copies.
    #[inline]
    pub fn key(&self) -> &[u8; AES_256_KEY_SIZE] {
        &self.key
    }

    /// Returns the key ID.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataKey")
            .field("id", &self.id)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// A data key in its key-service-wrapped (encrypted) form.
///
/// Safe to persist; only the key service that produced it can recover
/// the plaintext key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedDataKey(Vec<u8>);

impl WrappedDataKey {
    /// Creates a wrapped key from ciphertext bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the wrapped key bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the length of the wrapped form.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the wrapped form is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Key service interface.
///
/// Generates data keys bound to an encryption context and unwraps them
/// later. Implementations may keep the wrapping key in memory
/// ([`LocalKeyService`]) or delegate to a cloud KMS
/// ([`AwsKeyService`]); the wrapping key itself never crosses this
/// interface.
#[async_trait]
pub trait KeyService: Send + Sync {
    /// Generates a fresh data key bound to `context`.
    ///
    /// Returns both the plaintext key (for immediate use, then drop)
    /// and its wrapped form (for storage).
    async fn generate_data_key(
        &self,
        context: &EncryptionContext,
    ) -> Result<(DataKey, WrappedDataKey), KmsError>;

    /// Unwraps a wrapped data key.
    ///
    /// Fails with [`KmsError::ContextMismatch`] if `context` does not
    /// match the context supplied at generation time.
    async fn unwrap_data_key(
        &self,
        wrapped: &WrappedDataKey,
        context: &EncryptionContext,
    ) -> Result<DataKey, KmsError>;
}
