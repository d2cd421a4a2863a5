// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Seal and open operations.

use std::sync::Arc;

use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::instrument;

use crate::error::SecretError;
use crate::kms::{
    DataKey, EncryptionContext, KeyService, AES_GCM_NONCE_SIZE, AES_GCM_TAG_SIZE,
};

use super::unit::CipherUnit;

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

/// Encrypts `plaintext` with AES-256-GCM under `key` and `nonce`.
///
/// Returns the ciphertext and the detached authentication tag.
pub(crate) fn aead_seal(
    key: &DataKey,
    nonce: [u8; AES_GCM_NONCE_SIZE],
    plaintext: &[u8],
) -> Result<(Vec<u8>, [u8; AES_GCM_TAG_SIZE]), SecretError> {
    let unbound_key = aead::UnboundKey::new(&aead::AES_256_GCM, key.key())
        .map_err(|_| SecretError::KeyService("bad data key".into()))?;
    let mut sealing_key = aead::SealingKey::new(unbound_key, OneShotNonce::new(nonce));

    let mut in_out = plaintext.to_vec();
    sealing_key
        .seal_in_place_append_tag(Aad::empty(), &mut in_out)
        .map_err(|_| SecretError::KeyService("AES-GCM seal failed".into()))?;

    let tag_start = in_out.len() - AES_GCM_TAG_SIZE;
    let mut tag = [0u8; AES_GCM_TAG_SIZE];
    tag.copy_from_slice(&in_out[tag_start..]);
    in_out.truncate(tag_start);

    Ok((in_out, tag))
}

/// Decrypts `ciphertext` with AES-256-GCM, verifying `tag` first.
///
/// No plaintext byte is returned unless the whole tag check passes.
pub(crate) fn aead_open(
    key: &DataKey,
    nonce: [u8; AES_GCM_NONCE_SIZE],
    ciphertext: &[u8],
    tag: &[u8; AES_GCM_TAG_SIZE],
) -> Result<Vec<u8>, SecretError> {
    let unbound_key = aead::UnboundKey::new(&aead::AES_256_GCM, key.key())
        .map_err(|_| SecretError::KeyService("bad data key".into()))?;
    let mut opening_key = aead::OpeningKey::new(unbound_key, OneShotNonce::new(nonce));

    let mut in_out = Vec::with_capacity(ciphertext.len() + AES_GCM_TAG_SIZE);
    in_out.extend_from_slice(ciphertext);
    in_out.extend_from_slice(tag);

    let plaintext = opening_key
        .open_in_place(Aad::empty(), &mut in_out)
        .map_err(|_| SecretError::Authentication)?;

    Ok(plaintext.to_vec())
}

/// Envelope cipher over a key service.
///
/// Every seal uses a fresh data key and a fresh nonce; sealing the
/// same plaintext twice never yields the same unit. The encryption
/// context is bound at the key service, so a mismatched context at
/// open time is rejected by the remote authority.
pub struct EnvelopeCipher<K> {
    keys: Arc<K>,
    rng: SystemRandom,
}

impl<K> Clone for EnvelopeCipher<K> {
    fn clone(&self) -> Self {
        Self {
            keys: Arc::clone(&self.keys),
            rng: SystemRandom::new(),
        }
    }
}

impl<K: KeyService> EnvelopeCipher<K> {
    /// Creates a cipher over the given key service.
    pub fn new(keys: Arc<K>) -> Self {
        Self {
            keys,
            rng: SystemRandom::new(),
        }
    }

    /// Returns the underlying key service handle.
    pub fn keys(&self) -> &Arc<K> {
        &self.keys
    }

    /// Generates a fresh random nonce.
    pub(crate) fn fresh_nonce(&self) -> Result<[u8; AES_GCM_NONCE_SIZE], SecretError> {
        let mut nonce = [0u8; AES_GCM_NONCE_SIZE];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| SecretError::KeyService("failed to generate nonce".into()))?;
        Ok(nonce)
    }

    /// Seals `plaintext` under a fresh data key bound to `context`.
    ///
    /// Makes one key service call; the plaintext key is dropped (and
    /// zeroized) before this returns.
    #[instrument(skip_all, fields(len = plaintext.len()))]
    pub async fn seal(
        &self,
        plaintext: &[u8],
        context: &EncryptionContext,
    ) -> Result<CipherUnit, SecretError> {
        let (data_key, wrapped) = self.keys.generate_data_key(context).await?;
        let nonce = self.fresh_nonce()?;
        let (ciphertext, tag) = aead_seal(&data_key, nonce, plaintext)?;
        Ok(CipherUnit::new(wrapped, nonce, tag, ciphertext))
    }

    /// Opens a unit, returning the original plaintext.
    ///
    /// Fails with [`SecretError::ContextMismatch`] when `context`
    /// differs from the one used at seal time and with
    /// [`SecretError::Authentication`] when the unit was tampered
    /// with; the tag is verified before any plaintext is produced.
    #[instrument(skip_all)]
    pub async fn open(
        &self,
        unit: &CipherUnit,
        context: &EncryptionContext,
    ) -> Result<Vec<u8>, SecretError> {
        let data_key = self.keys.unwrap_data_key(unit.wrapped_key(), context).await?;
        aead_open(&data_key, *unit.nonce(), unit.ciphertext(), unit.tag())
    }
}
