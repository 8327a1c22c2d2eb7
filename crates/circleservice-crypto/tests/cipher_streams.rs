//! Integration tests for the asset stream ciphers.
//!
//! All tests use fixed keys and fixed nonces; no assertion depends on
//! randomness.

use std::io::{Cursor, Read, Write};

use circleservice_crypto::attachment::{AttachmentCipherReader, AttachmentCipherWriter};
use circleservice_crypto::{MAC_LEN, NONCE_LEN};
use circleservice_types::{AssetKey, CiphertextDigest};

fn fixed_key() -> AssetKey {
    AssetKey::from_bytes([0xA5; 32])
}

fn encrypt_fixture(plaintext: &[u8]) -> (Vec<u8>, CiphertextDigest) {
    let mut writer =
        AttachmentCipherWriter::with_nonce(&fixed_key(), [0x11; NONCE_LEN], Vec::new())
            .expect("writer");
    writer.write_all(plaintext).expect("write");
    writer.finish().expect("finish")
}

/// Round-trip law: correct key and digest recover the exact plaintext,
/// even when the consumer reads in tiny, uneven chunks.
#[test]
fn round_trip_with_small_reads() {
    let plaintext: Vec<u8> = (0..10_000u32).map(|i| (i * 7 % 256) as u8).collect();
    let (ciphertext, digest) = encrypt_fixture(&plaintext);

    let mut reader =
        AttachmentCipherReader::new(Cursor::new(ciphertext), &fixed_key(), digest, None)
            .expect("reader");

    let mut recovered = Vec::new();
    let mut buf = [0u8; 3];
    loop {
        let n = reader.read(&mut buf).expect("read");
        if n == 0 {
            break;
        }
        recovered.extend_from_slice(&buf[..n]);
    }
    assert_eq!(recovered, plaintext);
}

/// The digest check happens exactly once, at stream end: every read
/// before end-of-stream succeeds even on a stream that will fail, and
/// the failure surfaces no later than the final read.
#[test]
fn late_tamper_fails_by_end_of_stream() {
    let plaintext = vec![0x5Au8; 64 * 1024];
    let (mut ciphertext, digest) = encrypt_fixture(&plaintext);

    // Flip a byte near the very end of the ciphertext body.
    let idx = ciphertext.len() - MAC_LEN - 2;
    ciphertext[idx] ^= 0xFF;

    let mut reader =
        AttachmentCipherReader::new(Cursor::new(ciphertext), &fixed_key(), digest, None)
            .expect("reader");

    let mut sink = Vec::new();
    let result = reader.read_to_end(&mut sink);
    assert!(result.is_err(), "tampered stream must not report success");
}

/// A wrong asset key cannot produce the right MAC; decryption fails
/// closed rather than yielding garbage silently.
#[test]
fn wrong_key_fails_closed() {
    let (ciphertext, digest) = encrypt_fixture(b"keyed to someone else");

    let wrong_key = AssetKey::from_bytes([0x00; 32]);
    let mut reader =
        AttachmentCipherReader::new(Cursor::new(ciphertext), &wrong_key, digest, None)
            .expect("reader");

    let mut sink = Vec::new();
    assert!(reader.read_to_end(&mut sink).is_err());
}

/// An empty plaintext still produces a well-formed, verifiable stream.
#[test]
fn empty_plaintext_round_trips() {
    let (ciphertext, digest) = encrypt_fixture(b"");
    assert_eq!(ciphertext.len(), NONCE_LEN + MAC_LEN);

    let mut reader =
        AttachmentCipherReader::new(Cursor::new(ciphertext), &fixed_key(), digest, None)
            .expect("reader");
    let mut recovered = Vec::new();
    reader.read_to_end(&mut recovered).expect("verify");
    assert!(recovered.is_empty());
}
