// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! AWS KMS key service for production deployments.
//!
//! Data keys are generated inside AWS KMS (GenerateDataKey) and
//! unwrapped server-side (Decrypt); the key encryption key never
//! leaves AWS. The encryption context is passed to KMS on both calls,
//! so a mismatched context is rejected by the remote authority, not
//! only locally.

use aws_sdk_kms::primitives::Blob;
use aws_sdk_kms::types::DataKeySpec;
use aws_sdk_kms::Client as KmsClient;
use tracing::{info, instrument, warn};

use async_trait::async_trait;

use super::{
    DataKey, EncryptionContext, KeyService, KmsError, WrappedDataKey, AES_256_KEY_SIZE,
};

/// AWS KMS-backed key service.
pub struct AwsKeyService {
    client: KmsClient,
    key_id: String,
}

impl AwsKeyService {
    /// Creates a new AWS KMS key service.
    ///
    /// # Arguments
    /// * `key_id` - The ARN or alias of the KMS key used for wrapping
    pub async fn new(key_id: String) -> Result<Self, KmsError> {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = KmsClient::new(&config);

        // Verify the key exists and we have access
        client
            .describe_key()
            .key_id(&key_id)
            .send()
            .await
            .map_err(|e| KmsError::Backend(format!("AWS KMS key {}: {}", key_id, e)))?;

        info!(key_id = %key_id, "Connected to AWS KMS");

        Ok(Self { client, key_id })
    }

    /// Creates from an existing AWS SDK config.
    pub fn from_config(config: &aws_config::SdkConfig, key_id: String) -> Self {
        let client = KmsClient::new(config);
        Self { client, key_id }
    }

    /// Returns the KMS key ID used for wrapping.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    fn context_map(context: &EncryptionContext) -> Option<std::collections::HashMap<String, String>> {
        if context.is_empty() {
            return None;
        }
        Some(
            context
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

#[async_trait]
impl KeyService for AwsKeyService {
    #[instrument(skip(self, context), fields(kms = "aws"))]
    async fn generate_data_key(
        &self,
        context: &EncryptionContext,
    ) -> Result<(DataKey, WrappedDataKey), KmsError> {
        let output = self
            .client
            .generate_data_key()
            .key_id(&self.key_id)
            .key_spec(DataKeySpec::Aes256)
            .set_encryption_context(Self::context_map(context))
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "AWS KMS GenerateDataKey failed");
                KmsError::KeyGeneration(format!("AWS KMS GenerateDataKey: {}", e))
            })?;

        let plaintext = output
            .plaintext()
            .ok_or_else(|| KmsError::KeyGeneration("no plaintext from KMS".into()))?
            .as_ref();

        let ciphertext = output
            .ciphertext_blob()
            .ok_or_else(|| KmsError::KeyGeneration("no ciphertext from KMS".into()))?
            .as_ref()
            .to_vec();

        if plaintext.len() != AES_256_KEY_SIZE {
            return Err(KmsError::InvalidKeyLength {
                expected: AES_256_KEY_SIZE,
                got: plaintext.len(),
            });
        }

        let mut key = [0u8; AES_256_KEY_SIZE];
        key.copy_from_slice(plaintext);

        let id = uuid::Uuid::new_v4().to_string();
        info!(dek_id = %id, "Generated data key from AWS KMS");

        Ok((DataKey::new(key, id), WrappedDataKey::new(ciphertext)))
    }

    #[instrument(skip(self, wrapped, context), fields(kms = "aws"))]
    async fn unwrap_data_key(
        &self,
        wrapped: &WrappedDataKey,
        context: &EncryptionContext,
    ) -> Result<DataKey, KmsError> {
        let result = self
            .client
            .decrypt()
            .key_id(&self.key_id)
            .ciphertext_blob(Blob::new(wrapped.as_bytes().to_vec()))
            .set_encryption_context(Self::context_map(context))
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                let service_err = e.into_service_error();
                // KMS reports a wrong context the same way it reports
                // garbled ciphertext.
                if service_err.is_invalid_ciphertext_exception() {
                    warn!("AWS KMS rejected ciphertext or encryption context");
                    return Err(KmsError::ContextMismatch);
                }
                warn!(error = %service_err, "AWS KMS Decrypt failed");
                return Err(KmsError::Backend(format!("AWS KMS Decrypt: {}", service_err)));
            }
        };

        let plaintext = output
            .plaintext()
            .ok_or_else(|| KmsError::Backend("no plaintext from KMS".into()))?
            .as_ref();

        if plaintext.len() != AES_256_KEY_SIZE {
            return Err(KmsError::InvalidKeyLength {
                expected: AES_256_KEY_SIZE,
                got: plaintext.len(),
            });
        }

        let mut key = [0u8; AES_256_KEY_SIZE];
        key.copy_from_slice(plaintext);

        let id = uuid::Uuid::new_v4().to_string();
        Ok(DataKey::new(key, id))
    }
}
