// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Secret rotation: re-encrypting stored secrets under fresh key
//! material.
//!
//! Rotation never mutates a stored secret in place. Each secret goes
//! through fetch → reseal → replace; until the replacing put
//! succeeds, the old cipher unit remains authoritative, so a failure
//! at any step leaves the stored secret exactly as it was. A stuck
//! secret never blocks the rest of the batch: the pass continues past
//! failures and reports them all at the end.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::{error, info, instrument};

use crate::envelope::CipherUnit;
use crate::error::{CompositeError, SecretError};
use crate::kms::KeyService;
use crate::store::ObjectStore;

use super::{CancelToken, SecretManager};

/// Result of a completed rotation pass with no failures.
#[derive(Debug)]
pub struct RotationReport {
    /// Paths rotated to new cipher units, in completion order.
    pub rotated: Vec<String>,
    /// Number of paths skipped because of cancellation.
    pub skipped: usize,
}

impl RotationReport {
    /// Returns true if nothing was skipped.
    pub fn is_complete(&self) -> bool {
        self.skipped == 0
    }
}

impl<K: KeyService, S: ObjectStore> SecretManager<K, S> {
    /// Rotates every stored secret matching `pattern` onto a fresh
    /// data key.
    ///
    /// `progress` is invoked with each path before that path is
    /// processed. Per-secret failures do not stop the pass; if any
    /// occur, the overall result is a [`CompositeError`] listing every
    /// failed path next to the ones that rotated successfully (which
    /// keep their new state). Cancellation stops dispatching new paths
    /// and is reported via [`RotationReport::skipped`].
    #[instrument(skip(self, progress, cancel))]
    pub async fn rotate<F>(
        &self,
        pattern: &str,
        progress: F,
        cancel: &CancelToken,
    ) -> Result<RotationReport, SecretError>
    where
        F: Fn(&str) + Send + Sync,
    {
        let matched = self.list(pattern).await?;
        info!(count = matched.len(), "Starting rotation pass");

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let progress = &progress;

        let mut futures = FuturesUnordered::new();
        for object in &matched {
            let sem = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let path = object.key.as_str();
            futures.push(async move {
                let _permit = sem.acquire().await.ok();
                if cancel.is_cancelled() {
                    return (path, None);
                }
                progress(path);
                (path, Some(self.rotate_one(path).await))
            });
        }

        let mut composite = CompositeError::new();
        let mut skipped = 0usize;
        while let Some((path, outcome)) = futures.next().await {
            match outcome {
                Some(Ok(())) => composite.succeeded.push(path.to_string()),
                Some(Err(err)) => {
                    error!(path = %path, error = %err, "Failed to rotate secret");
                    composite.failed.push((path.to_string(), err));
                }
                None => skipped += 1,
            }
        }

        info!(
            rotated = composite.succeeded.len(),
            failed = composite.failed.len(),
            skipped,
            "Rotation pass finished"
        );

        if composite.is_empty() {
            Ok(RotationReport {
                rotated: composite.succeeded,
                skipped,
            })
        } else {
            Err(SecretError::Composite(composite))
        }
    }

    /// Fetch → reseal → replace for one secret.
    ///
    /// The stored object is only written after the reseal fully
    /// succeeds; there is no delete step, so the old unit stays
    /// authoritative under any failure.
    async fn rotate_one(&self, path: &str) -> Result<(), SecretError> {
        let key = self.object_key(path);

        // Fetch
        let stored = self.store.get(&key).await?;
        let unit = CipherUnit::decode(&stored)?;
        let plaintext = self.cipher.open(&unit, &self.config.context).await?;

        // Reseal under a fresh data key and nonce
        let fresh = self.cipher.seal(&plaintext, &self.config.context).await?;

        // Replace
        self.store.put(&key, fresh.encode()).await?;
        Ok(())
    }
}
