// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! In-memory object store for tests and single-process use.

use std::collections::HashMap;
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::RwLock;
use ring::digest;

use super::{ObjectStore, StoreError, StoredObject};

struct Entry {
    body: Vec<u8>,
    last_modified: SystemTime,
    etag: String,
}

/// An object store backed by a process-local map.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Entry>>,
}

impl MemoryObjectStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns true if the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

/// Content fingerprint: SHA-256 of the body, hex-encoded.
fn etag_for(body: &[u8]) -> String {
    let hash = digest::digest(&digest::SHA256, body);
    let mut out = String::with_capacity(hash.as_ref().len() * 2);
    for byte in hash.as_ref() {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, StoreError> {
        let objects = self.objects.read();
        let mut listed: Vec<StoredObject> = objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| StoredObject {
                key: key.clone(),
                last_modified: entry.last_modified,
                size: entry.body.len() as u64,
                etag: entry.etag.clone(),
            })
            .collect();
        listed.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(listed)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.objects
            .read()
            .get(key)
            .map(|entry| entry.body.clone())
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        let etag = etag_for(&body);
        self.objects.write().insert(
            key.to_string(),
            Entry {
                body,
                last_modified: SystemTime::now(),
                etag,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.objects.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let store = MemoryObjectStore::new();
        store.put("a/b", b"hello".to_vec()).await.unwrap();

        let body = store.get("a/b").await.unwrap();
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let store = MemoryObjectStore::new();
        let result = store.get("nope").await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let store = MemoryObjectStore::new();
        store.put("app/db-password", b"1".to_vec()).await.unwrap();
        store.put("app/api-key", b"2".to_vec()).await.unwrap();
        store.put("other/thing", b"3".to_vec()).await.unwrap();

        let listed = store.list("app/").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].key, "app/api-key");
        assert_eq!(listed[1].key, "app/db-password");
    }

    #[tokio::test]
    async fn test_etag_tracks_content() {
        let store = MemoryObjectStore::new();
        store.put("k", b"one".to_vec()).await.unwrap();
        let first = store.list("k").await.unwrap()[0].etag.clone();

        store.put("k", b"two".to_vec()).await.unwrap();
        let second = store.list("k").await.unwrap()[0].etag.clone();

        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryObjectStore::new();
        store.put("k", b"v".to_vec()).await.unwrap();
        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert!(store.is_empty());
    }
}
