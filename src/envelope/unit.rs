// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The at-rest representation of one envelope operation.

use crate::error::SecretError;
use crate::kms::{WrappedDataKey, AES_GCM_NONCE_SIZE, AES_GCM_TAG_SIZE};

/// The output of one seal operation. Immutable once produced.
///
/// Bundles everything needed to recover the plaintext later: the
/// key-service-wrapped data key, the nonce, the ciphertext, and the
/// authentication tag. The plaintext data key is never part of a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherUnit {
    wrapped_key: WrappedDataKey,
    nonce: [u8; AES_GCM_NONCE_SIZE],
    tag: [u8; AES_GCM_TAG_SIZE],
    ciphertext: Vec<u8>,
}

impl CipherUnit {
    /// Creates a unit from its parts.
    pub fn new(
        wrapped_key: WrappedDataKey,
        nonce: [u8; AES_GCM_NONCE_SIZE],
        tag: [u8; AES_GCM_TAG_SIZE],
        ciphertext: Vec<u8>,
    ) -> Self {
        Self {
            wrapped_key,
            nonce,
            tag,
            ciphertext,
        }
    }

    /// Returns the wrapped data key.
    #[inline]
    pub fn wrapped_key(&self) -> &WrappedDataKey {
        &self.wrapped_key
    }

    /// Returns the nonce.
    #[inline]
    pub fn nonce(&self) -> &[u8; AES_GCM_NONCE_SIZE] {
        &self.nonce
    }

    /// Returns the authentication tag.
    #[inline]
    pub fn tag(&self) -> &[u8; AES_GCM_TAG_SIZE] {
        &self.tag
    }

    /// Returns the ciphertext.
    #[inline]
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Serializes to the single-secret object format:
    /// `[wrapped-key-len u32 BE][wrapped-key][nonce][tag][ciphertext]`.
    pub fn encode(&self) -> Vec<u8> {
        let wrapped = self.wrapped_key.as_bytes();
        let mut out = Vec::with_capacity(
            4 + wrapped.len() + AES_GCM_NONCE_SIZE + AES_GCM_TAG_SIZE + self.ciphertext.len(),
        );
        out.extend_from_slice(&(wrapped.len() as u32).to_be_bytes());
        out.extend_from_slice(wrapped);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Deserializes from the single-secret object format.
    ///
    /// Truncated or garbled input fails with
    /// [`SecretError::Authentication`]: a stored unit that no longer
    /// parses is corrupt by definition.
    pub fn decode(bytes: &[u8]) -> Result<Self, SecretError> {
        if bytes.len() < 4 {
            return Err(SecretError::Authentication);
        }
        let wrapped_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;

        let fixed = 4 + wrapped_len + AES_GCM_NONCE_SIZE + AES_GCM_TAG_SIZE;
        if bytes.len() < fixed {
            return Err(SecretError::Authentication);
        }

        let wrapped = bytes[4..4 + wrapped_len].to_vec();

        let mut nonce = [0u8; AES_GCM_NONCE_SIZE];
        nonce.copy_from_slice(&bytes[4 + wrapped_len..4 + wrapped_len + AES_GCM_NONCE_SIZE]);

        let mut tag = [0u8; AES_GCM_TAG_SIZE];
        tag.copy_from_slice(&bytes[4 + wrapped_len + AES_GCM_NONCE_SIZE..fixed]);

        let ciphertext = bytes[fixed..].to_vec();

        Ok(Self {
            wrapped_key: WrappedDataKey::new(wrapped),
            nonce,
            tag,
            ciphertext,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_unit() -> CipherUnit {
        CipherUnit::new(
            WrappedDataKey::new(vec![0xAA; 40]),
            [0x01; AES_GCM_NONCE_SIZE],
            [0x02; AES_GCM_TAG_SIZE],
            vec![0x03, 0x04, 0x05],
        )
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let unit = sample_unit();
        let decoded = CipherUnit::decode(&unit.encode()).unwrap();
        assert_eq!(decoded, unit);
    }

    #[test]
    fn test_decode_empty_ciphertext() {
        let unit = CipherUnit::new(
            WrappedDataKey::new(vec![0xAA; 40]),
            [0x01; AES_GCM_NONCE_SIZE],
            [0x02; AES_GCM_TAG_SIZE],
            Vec::new(),
        );
        let decoded = CipherUnit::decode(&unit.encode()).unwrap();
        assert!(decoded.ciphertext().is_empty());
    }

    #[test]
    fn test_decode_truncated_fails() {
        let encoded = sample_unit().encode();
        for cut in [0, 3, 10, encoded.len() - AES_GCM_TAG_SIZE - 4] {
            let result = CipherUnit::decode(&encoded[..cut]);
            assert!(matches!(result, Err(SecretError::Authentication)), "cut at {}", cut);
        }
    }

    #[test]
    fn test_decode_oversized_length_prefix_fails() {
        let mut encoded = sample_unit().encode();
        encoded[0] = 0xFF;
        assert!(matches!(
            CipherUnit::decode(&encoded),
            Err(SecretError::Authentication)
        ));
    }
}
