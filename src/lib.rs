// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Cachette: envelope-encrypted secret storage over a pluggable KMS
//! and object store, with encrypted archive export/import and key
//! rotation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SecretManager                          │
//! │   put / get / get_many / list / delete / pack / rotate      │
//! ├──────────────────────┬──────────────────────────────────────┤
//! │   EnvelopeCipher     │          Archive Codec               │
//! │   one data key per   │     one shared data key per          │
//! │   stored secret      │     archive, per-entry tags          │
//! ├───────────────────────┬─────────────────────────────────────┤
//! │ KeyService (seam)     │ ObjectStore (seam)                  │
//! │  LocalKeyService      │  MemoryObjectStore                  │
//! │  AwsKeyService (aws)  │  S3ObjectStore (aws)                │
//! └───────────────────────┴─────────────────────────────────────┘
//! ```
//!
//! All cryptographic material flows through the envelope layer: a
//! seal asks the key service for a fresh data key, encrypts with
//! AES-256-GCM, and persists only the wrapped key. The encryption
//! context supplied by the caller is bound at the key service, so a
//! mismatched context is rejected by the remote authority rather
//! than only locally.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cachette::{
//!     CancelToken, EncryptionContext, LocalKeyService, ManagerConfig,
//!     MemoryObjectStore, SecretManager,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let keys = Arc::new(LocalKeyService::generate().expect("kms"));
//!     let store = Arc::new(MemoryObjectStore::new());
//!     let config = ManagerConfig::new()
//!         .with_prefix("secrets")
//!         .with_context(EncryptionContext::new().with("env", "prod"));
//!
//!     let manager = SecretManager::new(keys, store, config);
//!
//!     manager.put("db/password", b"hunter2").await.expect("put");
//!     let plaintext = manager.get("db/password").await.expect("get");
//!     assert_eq!(plaintext, b"hunter2");
//!
//!     let token = CancelToken::new();
//!     manager.rotate("", |path| println!("rotating {path}"), &token)
//!         .await
//!         .expect("rotate");
//! }
//! ```

pub mod archive;
pub mod envelope;
pub mod error;
pub mod kms;
pub mod manager;
pub mod secret;
pub mod store;

pub use envelope::{CipherUnit, EnvelopeCipher};
pub use error::{CompositeError, SecretError};
#[cfg(feature = "aws")]
pub use kms::AwsKeyService;
pub use kms::{DataKey, EncryptionContext, KeyService, KmsError, LocalKeyService, WrappedDataKey};
pub use manager::{CancelToken, ManagerConfig, RotationReport, SecretManager};
pub use secret::Secret;
#[cfg(feature = "aws")]
pub use store::S3ObjectStore;
pub use store::{MemoryObjectStore, ObjectStore, StoreError, StoredObject};
