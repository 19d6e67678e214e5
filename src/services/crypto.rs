// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Envelope encryption for sensitive persisted fields.
//!
//! OAuth tokens (and any other PHI-adjacent field) are stored as an
//! opaque base64 envelope: `IV[16] || AUTH_TAG[16] || CIPHERTEXT`,
//! AES-256-GCM with a fresh random IV per call. Decryption fails
//! loudly on any tampering; corrupted plaintext is never returned.

use crate::error::SyncError;
use aes_gcm::{
    aead::{
        generic_array::{typenum::U16, GenericArray},
        Aead, KeyInit,
    },
    aes::Aes256,
    AesGcm,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;
/// Envelope IV size in bytes.
pub const IV_SIZE: usize = 16;
/// GCM authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// AES-256-GCM parameterized with the envelope's 16-byte IV.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// An encrypted field value as persisted: the base64 envelope.
///
/// Opaque by construction; `Debug` never prints the ciphertext.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedField(String);

impl EncryptedField {
    /// Wrap an already-encoded envelope (e.g. read back from the store).
    pub fn from_envelope(envelope: String) -> Self {
        Self(envelope)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for EncryptedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EncryptedField").field(&"[REDACTED]").finish()
    }
}

/// Encryption key for the field codec.
#[derive(Clone)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Creates a key from raw bytes; must be exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        if bytes.len() != KEY_SIZE {
            return Err(SyncError::DataIntegrity(format!(
                "invalid key size: expected {}, got {}",
                KEY_SIZE,
                bytes.len()
            )));
        }
        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.bytes.fill(0);
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Field encryption codec shared by everything that persists secrets.
#[derive(Clone)]
pub struct FieldCodec {
    cipher: Aes256Gcm16,
}

impl FieldCodec {
    pub fn new(key: &EncryptionKey) -> Self {
        let cipher = Aes256Gcm16::new(GenericArray::from_slice(&key.bytes));
        Self { cipher }
    }

    /// Encrypt a plaintext field into its storage envelope.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedField, SyncError> {
        let mut iv = [0u8; IV_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);

        // AEAD output is ciphertext || tag; the envelope wants the tag
        // up front, after the IV.
        let sealed = self
            .cipher
            .encrypt(GenericArray::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| SyncError::DataIntegrity("encryption failed".to_string()))?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_SIZE);

        let mut envelope = Vec::with_capacity(IV_SIZE + TAG_SIZE + ciphertext.len());
        envelope.extend_from_slice(&iv);
        envelope.extend_from_slice(tag);
        envelope.extend_from_slice(ciphertext);

        Ok(EncryptedField(BASE64.encode(envelope)))
    }

    /// Decrypt a storage envelope back to the plaintext field.
    ///
    /// Any malformed or tampered envelope yields a
    /// [`SyncError::DataIntegrity`]; the record must be treated as lost.
    pub fn decrypt(&self, field: &EncryptedField) -> Result<String, SyncError> {
        let envelope = BASE64
            .decode(&field.0)
            .map_err(|e| SyncError::DataIntegrity(format!("envelope base64 decode: {}", e)))?;

        if envelope.len() < IV_SIZE + TAG_SIZE {
            return Err(SyncError::DataIntegrity("envelope too short".to_string()));
        }

        let iv = &envelope[..IV_SIZE];
        let tag = &envelope[IV_SIZE..IV_SIZE + TAG_SIZE];
        let ciphertext = &envelope[IV_SIZE + TAG_SIZE..];

        let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_SIZE);
        sealed.extend_from_slice(ciphertext);
        sealed.extend_from_slice(tag);

        let plaintext = self
            .cipher
            .decrypt(GenericArray::from_slice(iv), sealed.as_ref())
            .map_err(|_| {
                SyncError::DataIntegrity("envelope authentication failed".to_string())
            })?;

        String::from_utf8(plaintext)
            .map_err(|e| SyncError::DataIntegrity(format!("plaintext not UTF-8: {}", e)))
    }
}
