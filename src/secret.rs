// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The transient in-memory form of a secret.

/// A named secret, held in memory only.
///
/// At rest a secret is always a sealed
/// [`CipherUnit`](crate::envelope::CipherUnit) or an archive entry;
/// this type exists between decrypt and use, or between read and
/// encrypt.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    /// Logical path identifying the secret.
    pub path: String,
    /// The secret material.
    pub plaintext: Vec<u8>,
}

impl Secret {
    /// Creates a secret.
    pub fn new(path: impl Into<String>, plaintext: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            plaintext,
        }
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("path", &self.path)
            .field("plaintext", &"[REDACTED]")
            .finish()
    }
}
