// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Local in-memory key service implementation.
//!
//! Keeps the wrapping key (KEK) in memory and wraps data keys with
//! AES-256-GCM, binding the encryption context as AAD. Suitable for
//! development and testing, or single-node deployments where the
//! master key is provided at startup.
//!
//! # Wrapped key format
//!
//! ```text
//! [context-len u32 BE][canonical context][nonce 12][ciphertext+tag]
//! ```
//!
//! The canonical context is stored alongside the ciphertext so a
//! mismatched context at unwrap time is reported as a context
//! mismatch rather than a bare authentication failure; the GCM AAD
//! still binds the caller-supplied context, so the stored copy cannot
//! be used to bypass the check.

use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::{Zeroize, ZeroizeOnDrop};

use async_trait::async_trait;

use super::{
    DataKey, EncryptionContext, KeyService, KmsError, WrappedDataKey, AES_256_KEY_SIZE,
    AES_GCM_NONCE_SIZE, AES_GCM_TAG_SIZE,
};

/// A master key (KEK) stored in memory.
#[derive(Zeroize, ZeroizeOnDrop)]
struct MasterKey {
    key: [u8; AES_256_KEY_SIZE],
    #[zeroize(skip)]
    id: String,
}

/// Single-use nonce sequence for AES-GCM.
struct OneShotNonce {
    nonce: [u8; NONCE_LEN],
}

impl OneShotNonce {
    fn new(nonce: [u8; NONCE_LEN]) -> Self {
        Self { nonce }
    }
}

impl NonceSequence for OneShotNonce {
    fn advance(&mut self) -> Result<Nonce, ring::error::Unspecified> {
        Nonce::try_assume_unique_for_key(&self.nonce)
    }
}

/// Local in-memory key service.
///
/// The master key is zeroized on drop and never leaves the process.
pub struct LocalKeyService {
    master_key: MasterKey,
    rng: SystemRandom,
}

impl LocalKeyService {
    /// Creates a new service with the given master key.
    pub fn new(master_key: [u8; AES_256_KEY_SIZE], key_id: String) -> Self {
        Self {
            master_key: MasterKey {
                key: master_key,
                id: key_id,
            },
            rng: SystemRandom::new(),
        }
    }

    /// Generates a new service with a random master key.
    pub fn generate() -> Result<Self, KmsError> {
        let rng = SystemRandom::new();
        let mut key = [0u8; AES_256_KEY_SIZE];
        rng.fill(&mut key)
            .map_err(|_| KmsError::KeyGeneration("failed to generate master key".into()))?;

        let id = uuid::Uuid::new_v4().to_string();
        Ok(Self::new(key, id))
    }

    /// Creates a new service from a hex-encoded master key.
    pub fn from_hex(hex_key: &str, key_id: String) -> Result<Self, KmsError> {
        let bytes = hex_decode(hex_key)?;
        if bytes.len() != AES_256_KEY_SIZE {
            return Err(KmsError::InvalidKeyLength {
                expected: AES_256_KEY_SIZE,
                got: bytes.len(),
            });
        }

        let mut key = [0u8; AES_256_KEY_SIZE];
        key.copy_from_slice(&bytes);
        Ok(Self::new(key, key_id))
    }

    /// Returns the master key ID.
    pub fn key_id(&self) -> String {
        self.master_key.id.clone()
    }

    /// Wraps key material under the master key with `aad` bound.
    fn wrap(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, KmsError> {
        let mut nonce_bytes = [0u8; AES_GCM_NONCE_SIZE];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| KmsError::KeyGeneration("failed to generate nonce".into()))?;

        let unbound_key = aead::UnboundKey::new(&aead::AES_256_GCM, &self.master_key.key)
            .map_err(|_| KmsError::Backend("bad master key".into()))?;
        let mut sealing_key = aead::SealingKey::new(unbound_key, OneShotNonce::new(nonce_bytes));

        let mut in_out = plaintext.to_vec();
        sealing_key
            .seal_in_place_append_tag(Aad::from(aad), &mut in_out)
            .map_err(|_| KmsError::Backend("AES-GCM seal failed".into()))?;

        let mut result = Vec::with_capacity(AES_GCM_NONCE_SIZE + in_out.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&in_out);
        Ok(result)
    }

    /// Unwraps key material wrapped by [`wrap`](Self::wrap).
    fn unwrap(&self, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>, KmsError> {
        if ciphertext.len() < AES_GCM_NONCE_SIZE + AES_GCM_TAG_SIZE {
            return Err(KmsError::Authentication);
        }

        let (nonce_bytes, encrypted) = ciphertext.split_at(AES_GCM_NONCE_SIZE);
        let mut nonce_arr = [0u8; AES_GCM_NONCE_SIZE];
        nonce_arr.copy_from_slice(nonce_bytes);

        let unbound_key = aead::UnboundKey::new(&aead::AES_256_GCM, &self.master_key.key)
            .map_err(|_| KmsError::Backend("bad master key".into()))?;
        let mut opening_key = aead::OpeningKey::new(unbound_key, OneShotNonce::new(nonce_arr));

        let mut in_out = encrypted.to_vec();
        let plaintext = opening_key
            .open_in_place(Aad::from(aad), &mut in_out)
            .map_err(|_| KmsError::Authentication)?;

        Ok(plaintext.to_vec())
    }
}

#[async_trait]
impl KeyService for LocalKeyService {
    async fn generate_data_key(
        &self,
        context: &EncryptionContext,
    ) -> Result<(DataKey, WrappedDataKey), KmsError> {
        let mut key = [0u8; AES_256_KEY_SIZE];
        self.rng
            .fill(&mut key)
            .map_err(|_| KmsError::KeyGeneration("failed to generate data key".into()))?;

        let aad = context.canonical_bytes();
        let sealed = self.wrap(&key, &aad)?;

        let mut blob = Vec::with_capacity(4 + aad.len() + sealed.len());
        blob.extend_from_slice(&(aad.len() as u32).to_be_bytes());
        blob.extend_from_slice(&aad);
        blob.extend_from_slice(&sealed);

        let id = uuid::Uuid::new_v4().to_string();
        Ok((DataKey::new(key, id), WrappedDataKey::new(blob)))
    }

    async fn unwrap_data_key(
        &self,
        wrapped: &WrappedDataKey,
        context: &EncryptionContext,
    ) -> Result<DataKey, KmsError> {
        let blob = wrapped.as_bytes();
        if blob.len() < 4 {
            return Err(KmsError::Authentication);
        }
        let aad_len = u32::from_be_bytes([blob[0], blob[1], blob[2], blob[3]]) as usize;
        if blob.len() < 4 + aad_len {
            return Err(KmsError::Authentication);
        }
        let stored_aad = &blob[4..4 + aad_len];
        let sealed = &blob[4 + aad_len..];

        let aad = context.canonical_bytes();
        if stored_aad != aad.as_slice() {
            return Err(KmsError::ContextMismatch);
        }

        let plaintext = self.unwrap(sealed, &aad)?;

        if plaintext.len() != AES_256_KEY_SIZE {
            return Err(KmsError::InvalidKeyLength {
                expected: AES_256_KEY_SIZE,
                got: plaintext.len(),
            });
        }

        let mut key = [0u8; AES_256_KEY_SIZE];
        key.copy_from_slice(&plaintext);

        let id = uuid::Uuid::new_v4().to_string();
        Ok(DataKey::new(key, id))
    }
}

/// Decodes a hex string to bytes.
fn hex_decode(hex: &str) -> Result<Vec<u8>, KmsError> {
    if hex.len() % 2 != 0 {
        return Err(KmsError::InvalidContext("invalid hex length".into()));
    }

    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| KmsError::InvalidContext("invalid hex character".into()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generate_and_unwrap() {
        let kms = LocalKeyService::generate().unwrap();
        let ctx = EncryptionContext::new().with("env", "prod");

        let (dk, wrapped) = kms.generate_data_key(&ctx).await.unwrap();
        let recovered = kms.unwrap_data_key(&wrapped, &ctx).await.unwrap();

        assert_eq!(recovered.key(), dk.key());
    }

    #[tokio::test]
    async fn test_context_mismatch_rejected() {
        let kms = LocalKeyService::generate().unwrap();
        let prod = EncryptionContext::new().with("env", "prod");
        let staging = EncryptionContext::new().with("env", "staging");

        let (_, wrapped) = kms.generate_data_key(&prod).await.unwrap();
        let result = kms.unwrap_data_key(&wrapped, &staging).await;

        assert!(matches!(result, Err(KmsError::ContextMismatch)));
    }

    #[tokio::test]
    async fn test_empty_context_round_trip() {
        let kms = LocalKeyService::generate().unwrap();
        let ctx = EncryptionContext::new();

        let (dk, wrapped) = kms.generate_data_key(&ctx).await.unwrap();
        let recovered = kms.unwrap_data_key(&wrapped, &ctx).await.unwrap();

        assert_eq!(recovered.key(), dk.key());
    }

    #[tokio::test]
    async fn test_tampered_wrapped_key_fails_authentication() {
        let kms = LocalKeyService::generate().unwrap();
        let ctx = EncryptionContext::new().with("env", "prod");

        let (_, wrapped) = kms.generate_data_key(&ctx).await.unwrap();
        let mut bytes = wrapped.as_bytes().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let result = kms
            .unwrap_data_key(&WrappedDataKey::new(bytes), &ctx)
            .await;
        assert!(matches!(result, Err(KmsError::Authentication)));
    }

    #[tokio::test]
    async fn test_wrap_produces_different_blobs() {
        let kms = LocalKeyService::generate().unwrap();
        let ctx = EncryptionContext::new();

        let (_, wrapped1) = kms.generate_data_key(&ctx).await.unwrap();
        let (_, wrapped2) = kms.generate_data_key(&ctx).await.unwrap();

        assert_ne!(wrapped1.as_bytes(), wrapped2.as_bytes());
    }

    #[test]
    fn test_from_hex() {
        let hex_key = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
        let kms = LocalKeyService::from_hex(hex_key, "test-kek".into()).unwrap();
        assert_eq!(kms.key_id(), "test-kek");
    }

    #[test]
    fn test_from_hex_invalid_length() {
        let result = LocalKeyService::from_hex("0123456789abcdef", "test-kek".into());
        assert!(matches!(result, Err(KmsError::InvalidKeyLength { .. })));
    }
}
