//! Binds an item's ciphertext to its decryption key.
//!
//! Unlike a general-purpose encrypt-at-rest scheme, here the "key" *is* a
//! Lightning payment preimage: single-use by construction (a payment hash is
//! unique per offer), so we can use it directly as an AES-256-GCM key with a
//! fixed all-zero nonce — the key-wear-out concern a reusable master key
//! would carry doesn't apply since each key encrypts exactly one message.

use ring::aead::{self, BoundKey};
use thiserror::Error;

const NONCE: [u8; 12] = [0u8; 12];

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed")]
    EncryptFailed,
    #[error("decryption failed: ciphertext is not authentic under this key")]
    DecryptFailed,
}

struct FixedNonce(Option<[u8; 12]>);

impl aead::NonceSequence for FixedNonce {
    fn advance(&mut self) -> Result<aead::Nonce, ring::error::Unspecified> {
        let bytes = self.0.take().ok_or(ring::error::Unspecified)?;
        Ok(aead::Nonce::assume_unique_for_key(bytes))
    }
}

/// Encrypt `plaintext` under `key` (the item's decryption key / payment
/// preimage), returning ciphertext with the authentication tag appended.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key)
        .map_err(|_| CryptoError::EncryptFailed)?;
    let mut sealing_key =
        aead::SealingKey::new(unbound, FixedNonce(Some(NONCE)));

    let mut in_out = plaintext.to_vec();
    sealing_key
        .seal_in_place_append_tag(aead::Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::EncryptFailed)?;
    Ok(in_out)
}

/// Decrypt `ciphertext` (as produced by [`encrypt`]) under `key`.
pub fn decrypt(key: &[u8; 32], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key)
        .map_err(|_| CryptoError::DecryptFailed)?;
    let mut opening_key =
        aead::OpeningKey::new(unbound, FixedNonce(Some(NONCE)));

    let mut in_out = ciphertext.to_vec();
    let plaintext = opening_key
        .open_in_place(aead::Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::DecryptFailed)?;
    Ok(plaintext.to_vec())
}
