// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Encrypted archive codec.
//!
//! Packs a named collection of secrets into a single portable byte
//! stream under one shared data key, with an independent
//! authentication tag per entry. An archive decrypts fully or not at
//! all: a single corrupt entry fails the whole unpack (naming the
//! entry), and partial results are never returned.
//!
//! # Format
//!
//! All integers are big-endian.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ Header                                                        │
//! ├───────┬─────┬─────────┬─────┬─────────────┬─────────┬─────────┤
//! │ magic │ ver │ ctx-len │ ctx │ wrapped-key │ base    │ entry   │
//! │ CCHA  │ u8  │ u32     │     │ len u32 + b │ nonce12 │ cnt u32 │
//! └───────┴─────┴─────────┴─────┴─────────────┴─────────┴─────────┘
//! ┌───────────────────────────────────────────────┐
//! │ Entry (repeated entry-count times, in order)  │
//! ├──────────┬──────┬────────┬────────────┬───────┤
//! │ name-len │ name │ ct-len │ ciphertext │ tag   │
//! │ u32      │ utf8 │ u32    │            │ (16)  │
//! └──────────┴──────┴────────┴────────────┴───────┘
//! ```
//!
//! Entry `i` is encrypted under the shared data key with a nonce
//! derived from the base nonce by folding `i` into its last four
//! bytes, so each entry gets a unique nonce without storing one per
//! entry. The context bytes in the header record which context the
//! archive was packed under; the caller-supplied context is what the
//! key service actually verifies at unpack time.

use ring::rand::{SecureRandom, SystemRandom};
use tracing::{info, instrument};

use crate::envelope::{aead_open, aead_seal};
use crate::error::SecretError;
use crate::kms::{
    EncryptionContext, KeyService, WrappedDataKey, AES_GCM_NONCE_SIZE, AES_GCM_TAG_SIZE,
};
use crate::secret::Secret;

/// Archive file magic.
pub const MAGIC: [u8; 4] = *b"CCHA";

/// Current archive format version.
pub const FORMAT_VERSION: u8 = 1;

fn corrupt(reason: impl Into<String>) -> SecretError {
    SecretError::CorruptArchive {
        entry: None,
        reason: reason.into(),
    }
}

/// Derives the nonce for entry `index` from the archive's base nonce.
fn entry_nonce(base: &[u8; AES_GCM_NONCE_SIZE], index: u32) -> [u8; AES_GCM_NONCE_SIZE] {
    let mut nonce = *base;
    let mut counter = [0u8; 4];
    counter.copy_from_slice(&nonce[AES_GCM_NONCE_SIZE - 4..]);
    let folded = u32::from_be_bytes(counter).wrapping_add(index);
    nonce[AES_GCM_NONCE_SIZE - 4..].copy_from_slice(&folded.to_be_bytes());
    nonce
}

/// Packs `secrets` into one encrypted archive.
///
/// Performs exactly one key service call for the whole archive; all
/// entries share the resulting data key. Input order is preserved. An
/// empty input produces a valid header-only archive.
#[instrument(skip_all, fields(entries = secrets.len()))]
pub async fn pack<K: KeyService>(
    keys: &K,
    secrets: &[Secret],
    context: &EncryptionContext,
) -> Result<Vec<u8>, SecretError> {
    let (data_key, wrapped) = keys.generate_data_key(context).await?;

    let rng = SystemRandom::new();
    let mut base_nonce = [0u8; AES_GCM_NONCE_SIZE];
    rng.fill(&mut base_nonce)
        .map_err(|_| SecretError::KeyService("failed to generate nonce".into()))?;

    let ctx_bytes = context.canonical_bytes();

    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    out.push(FORMAT_VERSION);
    out.extend_from_slice(&(ctx_bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(&ctx_bytes);
    out.extend_from_slice(&(wrapped.len() as u32).to_be_bytes());
    out.extend_from_slice(wrapped.as_bytes());
    out.extend_from_slice(&base_nonce);
    out.extend_from_slice(&(secrets.len() as u32).to_be_bytes());

    for (index, secret) in secrets.iter().enumerate() {
        let nonce = entry_nonce(&base_nonce, index as u32);
        let (ciphertext, tag) = aead_seal(&data_key, nonce, &secret.plaintext)?;

        let name = secret.path.as_bytes();
        out.extend_from_slice(&(name.len() as u32).to_be_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(&(ciphertext.len() as u32).to_be_bytes());
        out.extend_from_slice(&ciphertext);
        out.extend_from_slice(&tag);
    }

    info!(entries = secrets.len(), bytes = out.len(), "Packed archive");
    Ok(out)
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], SecretError> {
        if self.bytes.len() < n {
            return Err(corrupt("truncated archive"));
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn take_u32(&mut self) -> Result<u32, SecretError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Unpacks an archive, returning its secrets in packed order.
///
/// Fails with [`SecretError::UnsupportedFormat`] on an unknown
/// version, [`SecretError::ContextMismatch`] when `context` is not
/// the one the archive was packed under, and
/// [`SecretError::CorruptArchive`] naming the offending entry when
/// any entry fails its tag check. Never returns a partial result.
#[instrument(skip_all, fields(bytes = bytes.len()))]
pub async fn unpack<K: KeyService>(
    keys: &K,
    bytes: &[u8],
    context: &EncryptionContext,
) -> Result<Vec<Secret>, SecretError> {
    let mut reader = Reader { bytes };

    let magic = reader.take(4).map_err(|_| corrupt("missing magic"))?;
    if magic != MAGIC {
        return Err(corrupt("bad magic"));
    }

    let version = reader.take(1)?[0];
    if version != FORMAT_VERSION {
        return Err(SecretError::UnsupportedFormat { version });
    }

    let ctx_len = reader.take_u32()? as usize;
    let ctx_bytes = reader.take(ctx_len)?;
    // Recorded for tooling; the binding check happens at the key service.
    EncryptionContext::from_canonical_bytes(ctx_bytes)
        .map_err(|_| corrupt("malformed context field"))?;

    let wrapped_len = reader.take_u32()? as usize;
    let wrapped = WrappedDataKey::new(reader.take(wrapped_len)?.to_vec());

    let mut base_nonce = [0u8; AES_GCM_NONCE_SIZE];
    base_nonce.copy_from_slice(reader.take(AES_GCM_NONCE_SIZE)?);

    let entry_count = reader.take_u32()?;

    let data_key = keys.unwrap_data_key(&wrapped, context).await?;

    let mut secrets = Vec::with_capacity(entry_count as usize);
    for index in 0..entry_count {
        let name_len = reader.take_u32()? as usize;
        let name = String::from_utf8(reader.take(name_len)?.to_vec())
            .map_err(|_| corrupt("entry name is not valid utf-8"))?;

        let ct_len = reader.take_u32()? as usize;
        let ciphertext = reader.take(ct_len)?;

        let mut tag = [0u8; AES_GCM_TAG_SIZE];
        tag.copy_from_slice(reader.take(AES_GCM_TAG_SIZE)?);

        let nonce = entry_nonce(&base_nonce, index);
        let plaintext = aead_open(&data_key, nonce, ciphertext, &tag).map_err(|_| {
            SecretError::CorruptArchive {
                entry: Some(name.clone()),
                reason: format!("entry {:?} failed authentication", name),
            }
        })?;

        secrets.push(Secret::new(name, plaintext));
    }

    if !reader.is_empty() {
        return Err(corrupt("trailing bytes after last entry"));
    }

    info!(entries = secrets.len(), "Unpacked archive");
    Ok(secrets)
}
