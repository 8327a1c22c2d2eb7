//! Attachment stream cipher: XChaCha20 with an interleaved HMAC trailer.
//!
//! Stream layout: `nonce(24) || ciphertext || hmac_sha256_tag(32)`.
//! The SHA3-256 stream digest covers all three sections and is what the
//! attachment pointer's expected digest refers to.
//!
//! The write side encrypts bytes as they are written and appends the tag
//! on [`AttachmentCipherWriter::finish`]. The read side decrypts bytes as
//! they are consumed while holding back the trailing 32 bytes — tag bytes
//! are never surfaced as plaintext — and verifies both the tag and the
//! stream digest when the underlying stream ends. Any plaintext handed
//! out before that point is provisional; a late verification failure
//! means the caller must discard everything received.

use std::io::{self, Read, Write};

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::XChaCha20;
use circleservice_types::{AssetKey, CiphertextDigest, CircleError, Result};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use sha3::{Digest, Sha3_256};
use subtle::ConstantTimeEq;

use crate::keys::derive_attachment_keys;
use crate::{MAC_LEN, NONCE_LEN};

type HmacSha256 = Hmac<Sha256>;

/// Wraps an integrity failure into an `io::Error` so it can surface
/// through the `Read` trait without losing the error taxonomy.
fn integrity_io(reason: impl Into<String>) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        CircleError::Integrity {
            reason: reason.into(),
        },
    )
}

// ---------------------------------------------------------------------------
// AttachmentCipherWriter
// ---------------------------------------------------------------------------

/// Write side: encrypt-and-digest into a wrapped sink.
///
/// Every byte written is encrypted, fed into the HMAC, and accumulated
/// into the running stream digest. [`finish`](Self::finish) appends the
/// tag and returns the sink together with the final digest.
pub struct AttachmentCipherWriter<W: Write> {
    sink: W,
    cipher: XChaCha20,
    mac: HmacSha256,
    digest: Sha3_256,
}

impl<W: Write> AttachmentCipherWriter<W> {
    /// Creates a writer with a fresh random nonce.
    ///
    /// The nonce is written to the sink immediately.
    pub fn new(key: &AssetKey, sink: W) -> Result<Self> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        Self::with_nonce(key, nonce, sink)
    }

    /// Creates a writer with an explicit nonce.
    ///
    /// Deterministic construction for tests and resumable uploads; the
    /// nonce must be unique per asset key.
    pub fn with_nonce(key: &AssetKey, nonce: [u8; NONCE_LEN], mut sink: W) -> Result<Self> {
        let keys = derive_attachment_keys(key)?;

        let cipher = XChaCha20::new(&keys.cipher_key.into(), &nonce.into());
        let mut mac =
            HmacSha256::new_from_slice(&keys.mac_key).map_err(|e| CircleError::Integrity {
                reason: format!("HMAC-SHA256 key init failed: {e}"),
            })?;

        sink.write_all(&nonce).map_err(|e| CircleError::Network {
            reason: format!("failed to write stream nonce: {e}"),
        })?;

        let mut digest = Sha3_256::new();
        digest.update(nonce);
        mac.update(&nonce);

        Ok(Self {
            sink,
            cipher,
            mac,
            digest,
        })
    }

    /// Finalizes the stream: appends the HMAC trailer and returns the
    /// sink together with the digest over the complete ciphertext.
    pub fn finish(mut self) -> Result<(W, CiphertextDigest)> {
        let tag = self.mac.finalize().into_bytes();
        self.sink
            .write_all(&tag)
            .and_then(|()| self.sink.flush())
            .map_err(|e| CircleError::Network {
                reason: format!("failed to write MAC trailer: {e}"),
            })?;
        self.digest.update(tag);

        let mut out = [0u8; 32];
        out.copy_from_slice(&self.digest.finalize());
        Ok((self.sink, CiphertextDigest::from_bytes(out)))
    }
}

impl<W: Write> Write for AttachmentCipherWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut block = buf.to_vec();
        self.cipher.apply_keystream(&mut block);
        self.mac.update(&block);
        self.digest.update(&block);
        self.sink.write_all(&block)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

// ---------------------------------------------------------------------------
// AttachmentCipherReader
// ---------------------------------------------------------------------------

/// Read side: decrypt-while-verify over a ciphertext source.
///
/// Consumes the nonce at construction, then streams plaintext while the
/// trailing [`MAC_LEN`] bytes are held back as the candidate tag. At
/// end-of-stream the tag and the expected stream digest are both
/// verified; a mismatch fails closed with [`CircleError::Integrity`]
/// (wrapped in an `io::Error` of kind `InvalidData`).
///
/// When the pointer declared a plaintext size, output is truncated to it;
/// excess ciphertext is still authenticated.
pub struct AttachmentCipherReader<R: Read> {
    inner: R,
    cipher: XChaCha20,
    mac: Option<HmacSha256>,
    digest: Option<Sha3_256>,
    expected: CiphertextDigest,
    /// Trailing bytes that may be the MAC; never more than [`MAC_LEN`].
    holdback: Vec<u8>,
    /// Decrypted plaintext not yet handed to the caller.
    ready: Vec<u8>,
    ready_pos: usize,
    /// Plaintext bytes still owed under the declared size, if any.
    remaining: Option<u64>,
    finished: bool,
}

impl<R: Read> core::fmt::Debug for AttachmentCipherReader<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AttachmentCipherReader")
            .field("ready_pos", &self.ready_pos)
            .field("remaining", &self.remaining)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl<R: Read> AttachmentCipherReader<R> {
    /// Creates a verifying reader over a complete ciphertext stream.
    ///
    /// # Errors
    ///
    /// [`CircleError::Integrity`] if the stream is shorter than the
    /// leading nonce.
    pub fn new(
        mut inner: R,
        key: &AssetKey,
        expected: CiphertextDigest,
        declared_size: Option<u64>,
    ) -> Result<Self> {
        let keys = derive_attachment_keys(key)?;

        let mut nonce = [0u8; NONCE_LEN];
        inner
            .read_exact(&mut nonce)
            .map_err(|e| CircleError::Integrity {
                reason: format!("ciphertext shorter than stream nonce: {e}"),
            })?;

        let cipher = XChaCha20::new(&keys.cipher_key.into(), &nonce.into());
        let mut mac =
            HmacSha256::new_from_slice(&keys.mac_key).map_err(|e| CircleError::Integrity {
                reason: format!("HMAC-SHA256 key init failed: {e}"),
            })?;
        mac.update(&nonce);

        let mut digest = Sha3_256::new();
        digest.update(nonce);

        Ok(Self {
            inner,
            cipher,
            mac: Some(mac),
            digest: Some(digest),
            expected,
            holdback: Vec::with_capacity(MAC_LEN),
            ready: Vec::new(),
            ready_pos: 0,
            remaining: declared_size,
            finished: false,
        })
    }

    /// Pulls one chunk from the source, releasing any bytes that can no
    /// longer be the MAC trailer, or finalizes verification at EOF.
    fn advance(&mut self) -> io::Result<()> {
        let mut chunk = [0u8; 8192];
        let n = self.inner.read(&mut chunk)?;

        if n == 0 {
            return self.finalize();
        }

        self.holdback.extend_from_slice(&chunk[..n]);
        if self.holdback.len() <= MAC_LEN {
            return Ok(());
        }

        let safe_len = self.holdback.len() - MAC_LEN;
        let mut safe: Vec<u8> = self.holdback.drain(..safe_len).collect();

        if let Some(mac) = self.mac.as_mut() {
            mac.update(&safe);
        }
        if let Some(digest) = self.digest.as_mut() {
            digest.update(&safe);
        }
        self.cipher.apply_keystream(&mut safe);

        match self.remaining {
            None => self.ready.extend_from_slice(&safe),
            Some(ref mut rem) => {
                let take = (*rem).min(safe.len() as u64) as usize;
                self.ready.extend_from_slice(&safe[..take]);
                *rem -= take as u64;
            }
        }
        Ok(())
    }

    /// End-of-stream: the holdback must be exactly the MAC trailer, and
    /// both the tag and the stream digest must verify.
    fn finalize(&mut self) -> io::Result<()> {
        if self.holdback.len() < MAC_LEN {
            return Err(integrity_io(format!(
                "ciphertext shorter than MAC trailer ({} bytes held)",
                self.holdback.len()
            )));
        }

        let mac = self
            .mac
            .take()
            .ok_or_else(|| integrity_io("stream already finalized"))?;
        let digest = self
            .digest
            .take()
            .ok_or_else(|| integrity_io("stream already finalized"))?;

        let tag = std::mem::take(&mut self.holdback);
        let mut digest = digest;
        digest.update(&tag);

        mac.verify_slice(&tag)
            .map_err(|_| integrity_io("MAC mismatch on attachment stream"))?;

        let computed = digest.finalize();
        if !bool::from(computed.as_slice().ct_eq(self.expected.as_bytes())) {
            return Err(integrity_io("ciphertext digest mismatch"));
        }

        self.finished = true;
        Ok(())
    }
}

impl<R: Read> Read for AttachmentCipherReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        loop {
            if self.ready_pos < self.ready.len() {
                let n = out.len().min(self.ready.len() - self.ready_pos);
                out[..n].copy_from_slice(&self.ready[self.ready_pos..self.ready_pos + n]);
                self.ready_pos += n;
                return Ok(n);
            }

            // Buffer drained; verification happens before the final Ok(0).
            if self.finished {
                return Ok(0);
            }
            self.ready.clear();
            self.ready_pos = 0;
            self.advance()?;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> AssetKey {
        AssetKey::from_bytes([0x42; 32])
    }

    fn encrypt(plaintext: &[u8]) -> (Vec<u8>, CiphertextDigest) {
        let mut writer =
            AttachmentCipherWriter::with_nonce(&test_key(), [0x07; NONCE_LEN], Vec::new())
                .expect("writer");
        writer.write_all(plaintext).expect("write");
        let (ciphertext, digest) = writer.finish().expect("finish");
        (ciphertext, digest)
    }

    #[test]
    fn stream_layout_has_nonce_and_trailer() {
        let plaintext = b"attachment body";
        let (ciphertext, _) = encrypt(plaintext);
        assert_eq!(ciphertext.len(), NONCE_LEN + plaintext.len() + MAC_LEN);
        assert_eq!(&ciphertext[..NONCE_LEN], &[0x07; NONCE_LEN]);
    }

    #[test]
    fn round_trip_is_byte_identical() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let plaintext: Vec<u8> = (0..40_000u32).map(|i| (i % 251) as u8).collect();
        let (ciphertext, digest) = encrypt(&plaintext);

        let mut reader = AttachmentCipherReader::new(
            io::Cursor::new(ciphertext),
            &test_key(),
            digest,
            None,
        )?;
        let mut recovered = Vec::new();
        reader.read_to_end(&mut recovered)?;
        assert_eq!(recovered, plaintext);
        Ok(())
    }

    #[test]
    fn flipped_ciphertext_byte_fails_closed() {
        let (mut ciphertext, digest) = encrypt(b"tamper with me");
        let mid = NONCE_LEN + 3;
        ciphertext[mid] ^= 0x01;

        let mut reader = AttachmentCipherReader::new(
            io::Cursor::new(ciphertext),
            &test_key(),
            digest,
            None,
        )
        .expect("reader");
        let mut sink = Vec::new();
        let err = reader.read_to_end(&mut sink).expect_err("must fail");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn wrong_expected_digest_fails_closed() {
        let (ciphertext, _) = encrypt(b"digest mismatch case");
        let wrong = CiphertextDigest::from_bytes([0xEE; 32]);

        let mut reader =
            AttachmentCipherReader::new(io::Cursor::new(ciphertext), &test_key(), wrong, None)
                .expect("reader");
        let mut sink = Vec::new();
        assert!(reader.read_to_end(&mut sink).is_err());
    }

    #[test]
    fn truncated_stream_fails_closed() {
        let (ciphertext, digest) = encrypt(b"short");
        let truncated = ciphertext[..ciphertext.len() - 5].to_vec();

        let mut reader = AttachmentCipherReader::new(
            io::Cursor::new(truncated),
            &test_key(),
            digest,
            None,
        )
        .expect("reader");
        let mut sink = Vec::new();
        assert!(reader.read_to_end(&mut sink).is_err());
    }

    #[test]
    fn declared_size_truncates_output() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let (ciphertext, digest) = encrypt(b"padded-plaintext-with-extra");

        let mut reader = AttachmentCipherReader::new(
            io::Cursor::new(ciphertext),
            &test_key(),
            digest,
            Some(6),
        )?;
        let mut recovered = Vec::new();
        reader.read_to_end(&mut recovered)?;
        assert_eq!(recovered, b"padded");
        Ok(())
    }

    #[test]
    fn mac_trailer_never_surfaces_as_plaintext() -> std::result::Result<(), Box<dyn std::error::Error>>
    {
        let plaintext = b"exactly-visible";
        let (ciphertext, digest) = encrypt(plaintext);

        let mut reader = AttachmentCipherReader::new(
            io::Cursor::new(ciphertext),
            &test_key(),
            digest,
            None,
        )?;
        let mut recovered = Vec::new();
        reader.read_to_end(&mut recovered)?;
        // No trailer bytes leak past the plaintext length.
        assert_eq!(recovered.len(), plaintext.len());
        Ok(())
    }
}
