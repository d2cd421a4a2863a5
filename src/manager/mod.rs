// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Secret store adapter and batch operations.
//!
//! Maps logical secret paths to objects in the store, sealing and
//! opening through the envelope cipher with the process-wide default
//! encryption context. Every secret at rest has its own data key;
//! only archives share one.
//!
//! Batch operations (multi-get, pack's download phase, rotation) run
//! under a bounded worker pool, never fail fast on the first bad
//! item, and support cooperative cancellation via [`CancelToken`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use crate::archive;
use crate::envelope::{CipherUnit, EnvelopeCipher};
use crate::error::{CompositeError, SecretError};
use crate::kms::{EncryptionContext, KeyService};
use crate::secret::Secret;
use crate::store::{ObjectStore, StoreError, StoredObject};

mod rotation;

pub use rotation::RotationReport;

/// Cooperative cancellation for batch operations.
///
/// Cancelling stops new work from being dispatched; work already in
/// flight runs to completion, and completed writes are never undone.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Configuration for a [`SecretManager`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Object key prefix under which secrets live.
    pub prefix: String,
    /// Default encryption context for stored secrets.
    pub context: EncryptionContext,
    /// Worker limit for batch operations.
    pub max_concurrency: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            context: EncryptionContext::new(),
            max_concurrency: 8,
        }
    }
}

impl ManagerConfig {
    /// Creates a default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the object key prefix. A trailing slash is added if missing.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        self.prefix = prefix;
        self
    }

    /// Sets the default encryption context.
    pub fn with_context(mut self, context: EncryptionContext) -> Self {
        self.context = context;
        self
    }

    /// Sets the worker limit for batch operations.
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }
}

/// Secret manager: the caller-facing surface of the engine.
///
/// Holds explicit handles to the key service and object store; no
/// process-wide singletons, so tests can substitute fakes for both.
pub struct SecretManager<K, S> {
    keys: Arc<K>,
    store: Arc<S>,
    cipher: EnvelopeCipher<K>,
    config: ManagerConfig,
}

impl<K: KeyService, S: ObjectStore> SecretManager<K, S> {
    /// Creates a manager over the given key service and object store.
    pub fn new(keys: Arc<K>, store: Arc<S>, config: ManagerConfig) -> Self {
        let cipher = EnvelopeCipher::new(Arc::clone(&keys));
        Self {
            keys,
            store,
            cipher,
            config,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    fn object_key(&self, path: &str) -> String {
        format!("{}{}", self.config.prefix, path)
    }

    fn relative_path<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(&self.config.prefix).unwrap_or(key)
    }

    /// Lists stored secrets whose path matches `pattern`.
    ///
    /// `pattern` is a comma-separated list of globs matched against
    /// the prefix-relative path; an empty pattern matches everything.
    /// Returned metadata uses prefix-relative paths.
    #[instrument(skip(self))]
    pub async fn list(&self, pattern: &str) -> Result<Vec<StoredObject>, SecretError> {
        let globs: Vec<glob::Pattern> = pattern
            .split(',')
            .filter(|p| !p.is_empty())
            .map(|p| {
                glob::Pattern::new(p)
                    .map_err(|e| SecretError::InvalidPattern(format!("{}: {}", p, e)))
            })
            .collect::<Result<_, _>>()?;

        // `*` must not cross path separators, matching shell behavior.
        let options = glob::MatchOptions {
            require_literal_separator: true,
            ..glob::MatchOptions::new()
        };

        let objects = self.store.list(&self.config.prefix).await?;

        let mut matched = Vec::new();
        for mut object in objects {
            let path = self.relative_path(&object.key).to_string();
            if globs.is_empty() || globs.iter().any(|g| g.matches_with(&path, options)) {
                object.key = path;
                matched.push(object);
            }
        }
        Ok(matched)
    }

    /// Seals `plaintext` and writes it at `path`, overwriting any
    /// existing secret there.
    #[instrument(skip(self, plaintext), fields(len = plaintext.len()))]
    pub async fn put(&self, path: &str, plaintext: &[u8]) -> Result<(), SecretError> {
        let unit = self.cipher.seal(plaintext, &self.config.context).await?;
        self.store
            .put(&self.object_key(path), unit.encode())
            .await?;
        info!(path = %path, "Stored secret");
        Ok(())
    }

    /// Fetches and opens the secret at `path`.
    #[instrument(skip(self))]
    pub async fn get(&self, path: &str) -> Result<Vec<u8>, SecretError> {
        let bytes = self.store.get(&self.object_key(path)).await.map_err(|e| {
            match e {
                StoreError::NotFound { .. } => SecretError::NotFound {
                    path: path.to_string(),
                },
                other => other.into(),
            }
        })?;

        let unit = CipherUnit::decode(&bytes)?;
        self.cipher.open(&unit, &self.config.context).await
    }

    /// Deletes the secret at `path`.
    #[instrument(skip(self))]
    pub async fn delete(&self, path: &str) -> Result<(), SecretError> {
        self.store.delete(&self.object_key(path)).await?;
        info!(path = %path, "Deleted secret");
        Ok(())
    }

    /// Fetches many secrets concurrently, bounded by the configured
    /// worker limit.
    ///
    /// The whole pass completes before reporting: every failed path is
    /// collected into one [`CompositeError`] rather than failing fast.
    /// When `cancel` fires, paths not yet dispatched are skipped and
    /// the results accumulated so far are returned.
    #[instrument(skip_all, fields(count = paths.len()))]
    pub async fn get_many(
        &self,
        paths: &[String],
        cancel: &CancelToken,
    ) -> Result<HashMap<String, Vec<u8>>, SecretError> {
        let fetched = self.fetch_batch(paths, cancel).await;

        let mut results = HashMap::new();
        let mut composite = CompositeError::new();
        for (path, outcome) in fetched {
            match outcome {
                Some(Ok(plaintext)) => {
                    composite.succeeded.push(path.clone());
                    results.insert(path, plaintext);
                }
                Some(Err(err)) => composite.failed.push((path, err)),
                None => {} // skipped by cancellation
            }
        }
        composite.into_result(results)
    }

    /// Fetches each path once, preserving input order by index.
    ///
    /// `None` outcomes mark paths skipped by cancellation.
    async fn fetch_batch(
        &self,
        paths: &[String],
        cancel: &CancelToken,
    ) -> Vec<(String, Option<Result<Vec<u8>, SecretError>>)> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));

        let mut futures = FuturesUnordered::new();
        for (index, path) in paths.iter().enumerate() {
            let sem = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            futures.push(async move {
                let _permit = sem.acquire().await.ok();
                if cancel.is_cancelled() {
                    return (index, None);
                }
                (index, Some(self.get(path).await))
            });
        }

        let mut outcomes: Vec<Option<Option<Result<Vec<u8>, SecretError>>>> =
            (0..paths.len()).map(|_| None).collect();
        while let Some((index, outcome)) = futures.next().await {
            outcomes[index] = Some(outcome);
        }

        paths
            .iter()
            .cloned()
            .zip(outcomes.into_iter().map(|o| o.expect("every index resolved")))
            .collect()
    }

    /// Downloads `paths` and packs them into one encrypted archive
    /// under `context`.
    ///
    /// Downloads run concurrently; archive order follows the input
    /// order regardless of completion order. Any download failure
    /// aborts the pack with a [`CompositeError`].
    #[instrument(skip_all, fields(count = paths.len()))]
    pub async fn pack(
        &self,
        paths: &[String],
        context: &EncryptionContext,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, SecretError> {
        let fetched = self.fetch_batch(paths, cancel).await;

        let mut secrets = Vec::with_capacity(fetched.len());
        let mut composite = CompositeError::new();
        for (path, outcome) in fetched {
            match outcome {
                Some(Ok(plaintext)) => {
                    composite.succeeded.push(path.clone());
                    secrets.push(Secret::new(path, plaintext));
                }
                Some(Err(err)) => {
                    warn!(path = %path, error = %err, "Failed to download secret for packing");
                    composite.failed.push((path, err));
                }
                None => {} // skipped by cancellation
            }
        }
        if !composite.is_empty() {
            return Err(SecretError::Composite(composite));
        }

        archive::pack(&*self.keys, &secrets, context).await
    }

    /// Unpacks an archive produced by [`pack`](Self::pack).
    pub async fn unpack(
        &self,
        bytes: &[u8],
        context: &EncryptionContext,
    ) -> Result<Vec<Secret>, SecretError> {
        archive::unpack(&*self.keys, bytes, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kms::LocalKeyService;
    use crate::store::MemoryObjectStore;

    fn manager() -> SecretManager<LocalKeyService, MemoryObjectStore> {
        manager_with_config(ManagerConfig::new().with_prefix("secrets"))
    }

    fn manager_with_config(
        config: ManagerConfig,
    ) -> SecretManager<LocalKeyService, MemoryObjectStore> {
        SecretManager::new(
            Arc::new(LocalKeyService::generate().unwrap()),
            Arc::new(MemoryObjectStore::new()),
            config,
        )
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let manager = manager();
        manager.put("db/password", b"hunter2").await.unwrap();

        let plaintext = manager.get("db/password").await.unwrap();
        assert_eq!(plaintext, b"hunter2");
    }

    #[tokio::test]
    async fn test_get_missing_secret() {
        let manager = manager();
        let result = manager.get("nope").await;
        assert!(matches!(result, Err(SecretError::NotFound { path }) if path == "nope"));
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let manager = manager();
        manager.put("k", b"old").await.unwrap();
        manager.put("k", b"new").await.unwrap();

        assert_eq!(manager.get("k").await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_repeated_put_fresh_ciphertext() {
        let manager = manager();
        manager.put("k", b"same").await.unwrap();
        let first = manager.store.get("secrets/k").await.unwrap();

        manager.put("k", b"same").await.unwrap();
        let second = manager.store.get("secrets/k").await.unwrap();

        // Fresh data key and nonce per put: identical plaintext never
        // produces identical stored bytes.
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_wrong_default_context_fails() {
        let keys = Arc::new(LocalKeyService::generate().unwrap());
        let store = Arc::new(MemoryObjectStore::new());

        let prod = SecretManager::new(
            Arc::clone(&keys),
            Arc::clone(&store),
            ManagerConfig::new().with_context(EncryptionContext::new().with("env", "prod")),
        );
        prod.put("k", b"v").await.unwrap();

        let staging = SecretManager::new(
            keys,
            store,
            ManagerConfig::new().with_context(EncryptionContext::new().with("env", "staging")),
        );
        let result = staging.get("k").await;
        assert!(matches!(result, Err(SecretError::ContextMismatch)));
    }

    #[tokio::test]
    async fn test_corrupted_object_fails_authentication() {
        let manager = manager();
        manager.put("k", b"v").await.unwrap();

        let mut stored = manager.store.get("secrets/k").await.unwrap();
        let last = stored.len() - 1;
        stored[last] ^= 0xFF;
        manager.store.put("secrets/k", stored).await.unwrap();

        let result = manager.get("k").await;
        assert!(matches!(result, Err(SecretError::Authentication)));
    }

    #[tokio::test]
    async fn test_list_patterns() {
        let manager = manager();
        manager.put("app/db.txt", b"1").await.unwrap();
        manager.put("app/api.key", b"2").await.unwrap();
        manager.put("notes.txt", b"3").await.unwrap();

        let all = manager.list("").await.unwrap();
        assert_eq!(all.len(), 3);

        let txt = manager.list("*.txt").await.unwrap();
        assert_eq!(txt.len(), 1);
        assert_eq!(txt[0].key, "notes.txt");

        let multi = manager.list("*.txt,*/*.key").await.unwrap();
        assert_eq!(multi.len(), 2);
    }

    #[tokio::test]
    async fn test_list_invalid_pattern() {
        let manager = manager();
        let result = manager.list("[").await;
        assert!(matches!(result, Err(SecretError::InvalidPattern(_))));
    }

    #[tokio::test]
    async fn test_delete() {
        let manager = manager();
        manager.put("k", b"v").await.unwrap();
        manager.delete("k").await.unwrap();

        assert!(matches!(
            manager.get("k").await,
            Err(SecretError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_get_many_success() {
        let manager = manager();
        for i in 0..10 {
            manager
                .put(&format!("s{}", i), format!("v{}", i).as_bytes())
                .await
                .unwrap();
        }

        let paths: Vec<String> = (0..10).map(|i| format!("s{}", i)).collect();
        let token = CancelToken::new();
        let results = manager.get_many(&paths, &token).await.unwrap();

        assert_eq!(results.len(), 10);
        assert_eq!(results["s3"], b"v3");
    }

    #[tokio::test]
    async fn test_get_many_aggregates_all_failures() {
        let manager = manager();
        manager.put("good1", b"a").await.unwrap();
        manager.put("good2", b"b").await.unwrap();

        let paths: Vec<String> = ["good1", "missing1", "good2", "missing2"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let token = CancelToken::new();

        let err = manager.get_many(&paths, &token).await.unwrap_err();
        match err {
            SecretError::Composite(composite) => {
                assert_eq!(composite.failed.len(), 2);
                assert_eq!(composite.succeeded.len(), 2);
                let failed: Vec<&str> =
                    composite.failed.iter().map(|(p, _)| p.as_str()).collect();
                assert!(failed.contains(&"missing1"));
                assert!(failed.contains(&"missing2"));
            }
            other => panic!("expected composite error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_many_cancelled_before_start() {
        let manager = manager();
        manager.put("k", b"v").await.unwrap();

        let token = CancelToken::new();
        token.cancel();

        let results = manager
            .get_many(&["k".to_string()], &token)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_pack_unpack_via_manager() {
        let manager = manager();
        manager.put("a/b", b"secret1").await.unwrap();
        manager.put("a/c", b"secret2").await.unwrap();

        let ctx = EncryptionContext::new().with("env", "prod");
        let token = CancelToken::new();
        let paths = vec!["a/b".to_string(), "a/c".to_string()];

        let archive = manager.pack(&paths, &ctx, &token).await.unwrap();
        let secrets = manager.unpack(&archive, &ctx).await.unwrap();

        assert_eq!(secrets.len(), 2);
        assert_eq!(secrets[0].path, "a/b");
        assert_eq!(secrets[0].plaintext, b"secret1");
        assert_eq!(secrets[1].path, "a/c");
        assert_eq!(secrets[1].plaintext, b"secret2");

        let staging = EncryptionContext::new().with("env", "staging");
        let result = manager.unpack(&archive, &staging).await;
        assert!(matches!(result, Err(SecretError::ContextMismatch)));
    }

    #[tokio::test]
    async fn test_pack_fails_on_missing_secret() {
        let manager = manager();
        manager.put("present", b"v").await.unwrap();

        let ctx = EncryptionContext::new();
        let token = CancelToken::new();
        let paths = vec!["present".to_string(), "absent".to_string()];

        let result = manager.pack(&paths, &ctx, &token).await;
        assert!(matches!(result, Err(SecretError::Composite(_))));
    }

    #[tokio::test]
    async fn test_pack_preserves_input_order() {
        let manager = manager();
        let mut paths = Vec::new();
        for i in 0..12 {
            let path = format!("p{:02}", i);
            manager.put(&path, path.as_bytes()).await.unwrap();
            paths.push(path);
        }

        let ctx = EncryptionContext::new();
        let token = CancelToken::new();

        let archive = manager.pack(&paths, &ctx, &token).await.unwrap();
        let secrets = manager.unpack(&archive, &ctx).await.unwrap();

        let unpacked: Vec<&str> = secrets.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(unpacked, paths.iter().map(String::as_str).collect::<Vec<_>>());
    }
}
