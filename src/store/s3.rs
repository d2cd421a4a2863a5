// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Amazon S3 object store for production deployments.

use std::time::SystemTime;

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::{info, instrument, warn};

use async_trait::async_trait;

use super::{ObjectStore, StoreError, StoredObject};

/// S3-backed object store.
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Creates a new S3 object store against `bucket`.
    pub async fn new(bucket: String) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::from_config(&config, bucket)
    }

    /// Creates from an existing AWS SDK config.
    pub fn from_config(config: &aws_config::SdkConfig, bucket: String) -> Self {
        let client = S3Client::new(config);
        Self { client, bucket }
    }

    /// Returns the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, StoreError> {
        let mut listed = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| StoreError::Backend(format!("S3 ListObjectsV2: {}", e)))?;

            for object in output.contents() {
                let key = object.key().unwrap_or_default().to_string();
                let last_modified = object
                    .last_modified()
                    .and_then(|dt| SystemTime::try_from(*dt).ok())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                listed.push(StoredObject {
                    key,
                    last_modified,
                    size: object.size().unwrap_or(0) as u64,
                    etag: object.e_tag().unwrap_or_default().trim_matches('"').to_string(),
                });
            }

            match output.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        info!(count = listed.len(), "Listed objects");
        Ok(listed)
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_no_such_key() {
                    return Err(StoreError::NotFound {
                        key: key.to_string(),
                    });
                }
                warn!(error = %service_err, "S3 GetObject failed");
                return Err(StoreError::Backend(format!("S3 GetObject: {}", service_err)));
            }
        };

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Backend(format!("S3 body read: {}", e)))?;

        Ok(body.into_bytes().to_vec())
    }

    #[instrument(skip(self, body), fields(bucket = %self.bucket, size = body.len()))]
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StoreError::Backend(format!("S3 PutObject: {}", e)))?;
        Ok(())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StoreError::Backend(format!("S3 DeleteObject: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Integration tests require AWS credentials and a bucket.
    // Run with: CACHETTE_S3_BUCKET=your-bucket cargo test --features aws -- --ignored

    #[tokio::test]
    #[ignore = "requires AWS credentials"]
    async fn test_s3_round_trip() {
        let bucket =
            std::env::var("CACHETTE_S3_BUCKET").expect("Set CACHETTE_S3_BUCKET to run this test");

        let store = S3ObjectStore::new(bucket).await;
        store
            .put("cachette-test/object", b"payload".to_vec())
            .await
            .unwrap();

        let body = store.get("cachette-test/object").await.unwrap();
        assert_eq!(body, b"payload");

        store.delete("cachette-test/object").await.unwrap();
        let result = store.get("cachette-test/object").await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }
}
