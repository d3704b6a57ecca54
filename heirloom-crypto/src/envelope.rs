//! User keypairs, private-key wrapping, and DEK sealing.
//!
//! Uses X25519 key exchange + XSalsa20-Poly1305 for sealing per-document
//! DEKs (Data Encryption Keys) to a user's public key with an ephemeral
//! sender keypair, and ChaCha20-Poly1305 for wrapping the user's private
//! key under a password-derived KEK.

use crate::cipher::{decrypt, encrypt, EncryptedData};
use crate::error::{CryptoError, CryptoResult};
use crate::key::DerivedKey;
use crypto_box::aead::Aead;
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// X25519 keypair backing a user's encryption identity.
///
/// The secret key implements `ZeroizeOnDrop` automatically (from crypto_box).
pub struct UserKeyPair {
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl UserKeyPair {
    /// Returns the public key as a raw 32-byte array.
    pub fn public_bytes(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }

    /// Returns the secret key as a raw 32-byte array.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Reconstructs a keypair from raw secret key bytes.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = SecretKey::from(bytes);
        let public = secret.public_key();
        Self { secret, public }
    }
}

/// Envelope-encrypted DEK sealed with a recipient's X25519 public key.
///
/// The ephemeral public key is included so the recipient can reconstruct
/// the shared secret; only the matching private key can open the envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SealedEnvelope {
    /// Ephemeral X25519 public key (sender side of DH).
    pub ephemeral_public_key: [u8; 32],
    /// XSalsa20 nonce (24 bytes).
    pub nonce: [u8; 24],
    /// Encrypted DEK (XSalsa20-Poly1305 ciphertext + Poly1305 tag).
    pub ciphertext: Vec<u8>,
}

/// Generates a fresh X25519 keypair for a user.
pub fn generate_user_keypair() -> UserKeyPair {
    let secret = SecretKey::generate(&mut rand::rngs::OsRng);
    let public = secret.public_key();
    UserKeyPair { secret, public }
}

/// Seals a DEK to a recipient's public key.
///
/// An ephemeral X25519 keypair is generated per seal call, so no password
/// or long-lived sender secret is needed to encrypt for a user.
pub fn seal_dek(dek: &[u8], recipient_pk: &PublicKey) -> CryptoResult<SealedEnvelope> {
    let ephemeral = SecretKey::generate(&mut rand::rngs::OsRng);
    let ephemeral_pk = ephemeral.public_key();

    let salsa_box = SalsaBox::new(recipient_pk, &ephemeral);

    let mut nonce_bytes = [0u8; 24];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = salsa_box
        .encrypt(crypto_box::Nonce::from_slice(&nonce_bytes), dek)
        .map_err(|e| CryptoError::Encryption(format!("envelope seal failed: {e}")))?;

    Ok(SealedEnvelope {
        ephemeral_public_key: *ephemeral_pk.as_bytes(),
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Opens a sealed DEK envelope using the recipient's secret key.
pub fn open_dek(envelope: &SealedEnvelope, recipient_sk: &SecretKey) -> CryptoResult<Vec<u8>> {
    let ephemeral_pk = PublicKey::from(envelope.ephemeral_public_key);
    let salsa_box = SalsaBox::new(&ephemeral_pk, recipient_sk);

    salsa_box
        .decrypt(
            crypto_box::Nonce::from_slice(&envelope.nonce),
            envelope.ciphertext.as_ref(),
        )
        .map_err(|_| CryptoError::Decryption)
}

/// Wraps a private key under a password-derived KEK.
///
/// A fresh random nonce is used per wrap call. The salt and cost
/// parameters that produced the KEK are the caller's to persist; the
/// wrapped blob is only meaningful together with them.
pub fn wrap_private_key(sk: &SecretKey, kek: &DerivedKey) -> CryptoResult<EncryptedData> {
    encrypt(kek, &sk.to_bytes())
}

/// Unwraps a private key with a KEK.
///
/// Fails closed: any tag mismatch yields the generic decryption error,
/// whether the KEK was derived from the wrong password or the record was
/// corrupted.
pub fn unwrap_private_key(wrapped: &EncryptedData, kek: &DerivedKey) -> CryptoResult<SecretKey> {
    let plaintext = decrypt(kek, wrapped)?;

    if plaintext.len() != 32 {
        return Err(CryptoError::InvalidKeyLength {
            expected: 32,
            actual: plaintext.len(),
        });
    }

    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&plaintext);
    Ok(SecretKey::from(bytes))
}
