//! Adversarial tests for the chunked envelope file cipher.
//!
//! Tests tampering at every layer of the format: sealed DEK, base nonce,
//! chunk ciphertext, chunk framing, truncation, reordering, and the
//! key-version binding.

use heirloom_crypto::{
    decrypt_file, encrypt_file, generate_user_keypair, CryptoError, CHUNK_SIZE,
};
use proptest::prelude::*;

// ── Round trips ──

#[test]
fn roundtrip_small_payload() {
    let kp = generate_user_keypair();
    let payload = b"last will and testament";

    let file = encrypt_file(payload, &kp.public, 1).unwrap();
    assert_eq!(decrypt_file(&file, &kp.secret).unwrap(), payload);
}

#[test]
fn roundtrip_empty_payload() {
    let kp = generate_user_keypair();
    let file = encrypt_file(b"", &kp.public, 1).unwrap();
    assert!(decrypt_file(&file, &kp.secret).unwrap().is_empty());
}

#[test]
fn roundtrip_multi_chunk_payload() {
    let kp = generate_user_keypair();
    // 3.5 chunks worth of data
    let payload = vec![0xAB; CHUNK_SIZE * 3 + CHUNK_SIZE / 2];

    let file = encrypt_file(&payload, &kp.public, 7).unwrap();
    assert_eq!(decrypt_file(&file, &kp.secret).unwrap(), payload);
}

#[test]
fn roundtrip_exact_chunk_boundary() {
    let kp = generate_user_keypair();
    let payload = vec![0x5C; CHUNK_SIZE * 2];

    let file = encrypt_file(&payload, &kp.public, 1).unwrap();
    assert_eq!(decrypt_file(&file, &kp.secret).unwrap(), payload);
}

#[test]
fn encryption_needs_no_private_key_and_is_randomized() {
    let kp = generate_user_keypair();
    let a = encrypt_file(b"same payload", &kp.public, 1).unwrap();
    let b = encrypt_file(b"same payload", &kp.public, 1).unwrap();

    // Fresh DEK and nonce every call
    assert_ne!(a.ciphertext, b.ciphertext);
    assert_ne!(a.base_nonce, b.base_nonce);
}

// ── Wrong key ──

#[test]
fn wrong_private_key_fails() {
    let kp = generate_user_keypair();
    let other = generate_user_keypair();

    let file = encrypt_file(b"not for you", &kp.public, 1).unwrap();
    assert!(decrypt_file(&file, &other.secret).is_err());
}

// ── Tampering ──

#[test]
fn every_byte_flip_in_small_ciphertext_detected() {
    let kp = generate_user_keypair();
    let file = encrypt_file(b"integrity-protected estate document", &kp.public, 1).unwrap();

    for i in 0..file.ciphertext.len() {
        let mut tampered = file.clone();
        tampered.ciphertext[i] ^= 0x01;
        assert!(
            decrypt_file(&tampered, &kp.secret).is_err(),
            "bit flip at byte {i} should be detected"
        );
    }
}

#[test]
fn sampled_byte_flips_in_multi_chunk_ciphertext_detected() {
    let kp = generate_user_keypair();
    let payload = vec![0x11; CHUNK_SIZE * 2 + 17];
    let file = encrypt_file(&payload, &kp.public, 1).unwrap();

    // Sample positions across all chunks rather than every byte
    let len = file.ciphertext.len();
    for i in (0..len).step_by(len / 64) {
        let mut tampered = file.clone();
        tampered.ciphertext[i] ^= 0xFF;
        assert!(
            decrypt_file(&tampered, &kp.secret).is_err(),
            "tampering at byte {i} should be detected"
        );
    }
}

#[test]
fn tampered_base_nonce_fails() {
    let kp = generate_user_keypair();
    let mut file = encrypt_file(b"nonce-critical", &kp.public, 1).unwrap();
    file.base_nonce[0] ^= 0xFF;
    assert!(decrypt_file(&file, &kp.secret).is_err());
}

#[test]
fn tampered_wrapped_dek_fails() {
    let kp = generate_user_keypair();
    let mut file = encrypt_file(b"dek under attack", &kp.public, 1).unwrap();
    if let Some(byte) = file.wrapped_dek.ciphertext.last_mut() {
        *byte ^= 0x01;
    }
    assert!(decrypt_file(&file, &kp.secret).is_err());
}

#[test]
fn changed_key_version_fails_authentication() {
    let kp = generate_user_keypair();
    let mut file = encrypt_file(b"bound to key version", &kp.public, 3).unwrap();
    file.key_version = 4;
    assert!(decrypt_file(&file, &kp.secret).is_err());
}

// ── Truncation and reordering ──

#[test]
fn truncated_mid_chunk_fails() {
    let kp = generate_user_keypair();
    let mut file = encrypt_file(&vec![0x42; CHUNK_SIZE + 100], &kp.public, 1).unwrap();
    file.ciphertext.truncate(file.ciphertext.len() - 10);
    assert!(decrypt_file(&file, &kp.secret).is_err());
}

#[test]
fn dropping_final_chunk_fails() {
    let kp = generate_user_keypair();
    let payload = vec![0x42; CHUNK_SIZE * 2];
    let mut file = encrypt_file(&payload, &kp.public, 1).unwrap();

    // Cut exactly at the first frame boundary: the surviving chunk was not
    // sealed as final, so the final-chunk flag no longer matches its AAD.
    let first_frame_len =
        4 + u32::from_le_bytes(file.ciphertext[..4].try_into().unwrap()) as usize;
    file.ciphertext.truncate(first_frame_len);
    assert!(decrypt_file(&file, &kp.secret).is_err());
}

#[test]
fn swapped_chunks_fail() {
    let kp = generate_user_keypair();
    let mut payload = vec![0x01; CHUNK_SIZE];
    payload.extend(vec![0x02; CHUNK_SIZE]);
    let mut file = encrypt_file(&payload, &kp.public, 1).unwrap();

    let first_len = 4 + u32::from_le_bytes(file.ciphertext[..4].try_into().unwrap()) as usize;
    let (first, second) = file.ciphertext.split_at(first_len);
    let mut swapped = second.to_vec();
    swapped.extend_from_slice(first);
    file.ciphertext = swapped;

    assert!(decrypt_file(&file, &kp.secret).is_err());
}

#[test]
fn empty_ciphertext_is_rejected() {
    let kp = generate_user_keypair();
    let mut file = encrypt_file(b"payload", &kp.public, 1).unwrap();
    file.ciphertext.clear();
    assert!(matches!(
        decrypt_file(&file, &kp.secret),
        Err(CryptoError::Malformed(_))
    ));
}

// ── Properties ──

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn roundtrip_arbitrary_payloads(payload in proptest::collection::vec(any::<u8>(), 0..(2 * CHUNK_SIZE + 512))) {
        let kp = generate_user_keypair();
        let file = encrypt_file(&payload, &kp.public, 2).unwrap();
        prop_assert_eq!(decrypt_file(&file, &kp.secret).unwrap(), payload);
    }
}
