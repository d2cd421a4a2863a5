// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Envelope encryption for individual secrets.
//!
//! Each seal operation requests a fresh data key from the key service,
//! encrypts the plaintext with AES-256-GCM, and bundles the wrapped
//! key with the ciphertext into a self-describing [`CipherUnit`]. The
//! key service never sees bulk data; the engine never persists a
//! plaintext key.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ CipherUnit (at rest)                                     │
//! ├──────────────┬─────────────┬──────────┬─────────┬────────┤
//! │ wrapped-key  │ wrapped key │ nonce    │ tag     │ cipher │
//! │ len (u32 BE) │ bytes       │ (12)     │ (16)    │ text   │
//! └──────────────┴─────────────┴──────────┴─────────┴────────┘
//! ```

mod cipher;
mod unit;

pub use cipher::EnvelopeCipher;
pub(crate) use cipher::{aead_open, aead_seal};
pub use unit::CipherUnit;
