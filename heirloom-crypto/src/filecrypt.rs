//! Envelope encryption for document payloads.
//!
//! Each payload is encrypted with a fresh random DEK in fixed 64 KiB
//! AEAD chunks, and the DEK is sealed to the recipient's public key.
//! Encrypting therefore needs no password; decrypting needs the private
//! key unwrapped by the key lifecycle manager.
//!
//! Chunk nonces derive from a random base nonce XOR the chunk index.
//! Each chunk's AAD binds the key version, the chunk index, and a
//! final-chunk flag, so truncated, reordered, or extended ciphertexts
//! fail authentication. No plaintext is released until every chunk has
//! authenticated.

use crate::cipher::{open, seal, NONCE_SIZE};
use crate::envelope::{open_dek, seal_dek, SealedEnvelope};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{generate_random_key, DerivedKey, KEY_SIZE};
use crypto_box::{PublicKey, SecretKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Plaintext chunk size. Bounds memory per chunk independent of payload size.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// An envelope-encrypted payload.
///
/// `key_version` records which user key version sealed the DEK, so the
/// document subsystem knows which private key (active or superseded)
/// can open it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptedFile {
    pub key_version: u32,
    /// DEK sealed to the recipient's public key.
    pub wrapped_dek: SealedEnvelope,
    /// Base nonce; per-chunk nonces are derived from it.
    pub base_nonce: [u8; NONCE_SIZE],
    /// Framed chunks: `[chunk_len(4 LE) | chunk ciphertext + tag]*`
    pub ciphertext: Vec<u8>,
}

/// Derives a per-chunk nonce by XORing the base nonce with the chunk index.
fn chunk_nonce(base: &[u8; NONCE_SIZE], index: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = *base;
    let idx_bytes = index.to_le_bytes();
    for i in 0..8 {
        nonce[i] ^= idx_bytes[i];
    }
    nonce
}

/// AAD: key_version(4 LE) | chunk_index(8 LE) | is_final(1)
fn chunk_aad(key_version: u32, index: u64, is_final: bool) -> [u8; 13] {
    let mut aad = [0u8; 13];
    aad[..4].copy_from_slice(&key_version.to_le_bytes());
    aad[4..12].copy_from_slice(&index.to_le_bytes());
    aad[12] = u8::from(is_final);
    aad
}

/// Encrypts a payload for a recipient's public key.
///
/// Generates a fresh random DEK, encrypts the payload chunk by chunk,
/// and seals the DEK to `recipient_pk`. An empty payload still produces
/// one (empty) authenticated chunk.
pub fn encrypt_file(
    payload: &[u8],
    recipient_pk: &PublicKey,
    key_version: u32,
) -> CryptoResult<EncryptedFile> {
    let dek = generate_random_key();
    let wrapped_dek = seal_dek(dek.as_bytes(), recipient_pk)?;

    let mut base_nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut base_nonce);

    let total_chunks = payload.len().div_ceil(CHUNK_SIZE).max(1);
    let mut ciphertext = Vec::with_capacity(payload.len() + total_chunks * 20);

    for index in 0..total_chunks {
        let start = index * CHUNK_SIZE;
        let end = (start + CHUNK_SIZE).min(payload.len());
        let chunk = &payload[start..end];
        let is_final = index == total_chunks - 1;

        let aad = chunk_aad(key_version, index as u64, is_final);
        let nonce = chunk_nonce(&base_nonce, index as u64);
        let sealed = seal(&dek, &nonce, chunk, &aad)?;

        ciphertext.extend_from_slice(&(sealed.len() as u32).to_le_bytes());
        ciphertext.extend_from_slice(&sealed);
    }

    Ok(EncryptedFile {
        key_version,
        wrapped_dek,
        base_nonce,
        ciphertext,
    })
}

/// Decrypts a payload with the recipient's private key.
///
/// Unwraps the DEK, then authenticates and decrypts every chunk before
/// any plaintext is returned; a failure at any point yields an error and
/// no partial output.
pub fn decrypt_file(file: &EncryptedFile, recipient_sk: &SecretKey) -> CryptoResult<Vec<u8>> {
    let mut dek_bytes = open_dek(&file.wrapped_dek, recipient_sk)?;
    if dek_bytes.len() != KEY_SIZE {
        dek_bytes.zeroize();
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: dek_bytes.len(),
        });
    }
    let mut key_arr = [0u8; KEY_SIZE];
    key_arr.copy_from_slice(&dek_bytes);
    dek_bytes.zeroize();
    let dek = DerivedKey::from_bytes(key_arr);
    key_arr.zeroize();

    let data = &file.ciphertext;
    let mut plaintext = Vec::new();
    let mut offset = 0;
    let mut index: u64 = 0;

    while offset < data.len() {
        if offset + 4 > data.len() {
            return Err(CryptoError::Malformed("truncated chunk header".into()));
        }
        let chunk_len = u32::from_le_bytes(
            data[offset..offset + 4]
                .try_into()
                .map_err(|_| CryptoError::Malformed("truncated chunk header".into()))?,
        ) as usize;
        offset += 4;

        if offset + chunk_len > data.len() {
            return Err(CryptoError::Malformed("truncated chunk data".into()));
        }
        let sealed = &data[offset..offset + chunk_len];
        offset += chunk_len;

        // A ciphertext cut at a frame boundary makes this flag disagree
        // with the one bound at encryption time, so truncation still
        // fails authentication.
        let is_final = offset >= data.len();

        let aad = chunk_aad(file.key_version, index, is_final);
        let nonce = chunk_nonce(&file.base_nonce, index);
        let chunk = open(&dek, &nonce, sealed, &aad)?;

        plaintext.extend_from_slice(&chunk);
        index += 1;
    }

    if index == 0 {
        return Err(CryptoError::Malformed("empty ciphertext".into()));
    }

    Ok(plaintext)
}
