//! Encryption primitives for Heirloom.
//!
//! Provides the cryptographic building blocks for the per-user key
//! lifecycle:
//! - Argon2id for deriving key-encryption-keys (KEKs) from passwords
//! - ChaCha20-Poly1305 for authenticated encryption
//! - X25519 envelope encryption for sealing data-encryption-keys (DEKs)
//!   to a user's public key
//!
//! # Architecture
//!
//! The encryption uses a three-tier key system:
//!
//! 1. **KEK**: Derived from the user's password using Argon2id.
//!    Never stored - it's derived each time the user unlocks.
//!
//! 2. **User keypair**: An X25519 keypair per user. The private key is
//!    wrapped (AEAD-encrypted) under the KEK; the public key is plaintext.
//!
//! 3. **DEK**: A random key generated per document payload. The payload
//!    is encrypted with the DEK; the DEK is sealed to the user's public
//!    key so encryption never needs the password.
//!
//! This architecture allows:
//! - Changing the password without re-encrypting any documents
//! - Encrypting documents with no password present (public key only)
//! - Rotating the keypair without touching payload ciphertexts already
//!   migrated to the new key

mod cipher;
pub mod envelope;
mod error;
pub mod filecrypt;
mod key;

pub use cipher::{decrypt, decrypt_with_aad, encrypt, encrypt_with_aad, EncryptedData, NONCE_SIZE, TAG_SIZE};
pub use envelope::{
    generate_user_keypair, open_dek, seal_dek, unwrap_private_key, wrap_private_key,
    SealedEnvelope, UserKeyPair,
};
pub use error::{CryptoError, CryptoResult};
pub use filecrypt::{decrypt_file, encrypt_file, EncryptedFile, CHUNK_SIZE};
pub use key::{derive_key, generate_random_key, DerivedKey, KdfParams, Salt, KEY_SIZE, SALT_SIZE};

pub use crypto_box::{PublicKey, SecretKey};
