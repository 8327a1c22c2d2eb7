//! Profile-avatar stream cipher: XChaCha20 relying on the digest alone.
//!
//! Stream layout: `nonce(24) || ciphertext` — no interleaved MAC, unlike
//! the attachment purpose. The two formats are independently
//! interoperable with the server and must not be unified. The SHA3-256
//! stream digest (nonce included) is the only integrity anchor; the read
//! side verifies it at end-of-stream when an expected digest is supplied.

use std::io::{self, Read, Write};

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::XChaCha20;
use circleservice_types::{AssetKey, CiphertextDigest, CircleError, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use sha3::{Digest, Sha3_256};
use subtle::ConstantTimeEq;

use crate::NONCE_LEN;

// ---------------------------------------------------------------------------
// ProfileCipherWriter
// ---------------------------------------------------------------------------

/// Write side: encrypt-and-digest a profile avatar into a wrapped sink.
pub struct ProfileCipherWriter<W: Write> {
    sink: W,
    cipher: XChaCha20,
    digest: Sha3_256,
}

impl<W: Write> ProfileCipherWriter<W> {
    /// Creates a writer with a fresh random nonce.
    pub fn new(key: &AssetKey, sink: W) -> Result<Self> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        Self::with_nonce(key, nonce, sink)
    }

    /// Creates a writer with an explicit nonce (deterministic tests).
    pub fn with_nonce(key: &AssetKey, nonce: [u8; NONCE_LEN], mut sink: W) -> Result<Self> {
        let cipher = XChaCha20::new(key.as_bytes().into(), &nonce.into());

        sink.write_all(&nonce).map_err(|e| CircleError::Network {
            reason: format!("failed to write stream nonce: {e}"),
        })?;

        let mut digest = Sha3_256::new();
        digest.update(nonce);

        Ok(Self {
            sink,
            cipher,
            digest,
        })
    }

    /// Finalizes the stream and returns the sink with the digest over
    /// the complete ciphertext.
    pub fn finish(mut self) -> Result<(W, CiphertextDigest)> {
        self.sink.flush().map_err(|e| CircleError::Network {
            reason: format!("failed to flush avatar sink: {e}"),
        })?;

        let mut out = [0u8; 32];
        out.copy_from_slice(&self.digest.finalize());
        Ok((self.sink, CiphertextDigest::from_bytes(out)))
    }
}

impl<W: Write> Write for ProfileCipherWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut block = buf.to_vec();
        self.cipher.apply_keystream(&mut block);
        self.digest.update(&block);
        self.sink.write_all(&block)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

// ---------------------------------------------------------------------------
// ProfileCipherReader
// ---------------------------------------------------------------------------

/// Read side: decrypts an avatar stream, optionally verifying the stream
/// digest at end-of-stream.
///
/// The avatar path has no MAC trailer, so there is nothing to hold back;
/// when an expected digest is present the final read fails closed on a
/// mismatch, mirroring the attachment reader's contract.
pub struct ProfileCipherReader<R: Read> {
    inner: R,
    cipher: XChaCha20,
    digest: Option<Sha3_256>,
    expected: Option<CiphertextDigest>,
    finished: bool,
}

impl<R: Read> ProfileCipherReader<R> {
    /// Creates a decrypting reader over an avatar stream.
    ///
    /// # Errors
    ///
    /// [`CircleError::Integrity`] if the stream is shorter than the
    /// leading nonce.
    pub fn new(mut inner: R, key: &AssetKey, expected: Option<CiphertextDigest>) -> Result<Self> {
        let mut nonce = [0u8; NONCE_LEN];
        inner
            .read_exact(&mut nonce)
            .map_err(|e| CircleError::Integrity {
                reason: format!("avatar stream shorter than nonce: {e}"),
            })?;

        let cipher = XChaCha20::new(key.as_bytes().into(), &nonce.into());
        let mut digest = Sha3_256::new();
        digest.update(nonce);

        Ok(Self {
            inner,
            cipher,
            digest: Some(digest),
            expected,
            finished: false,
        })
    }
}

impl<R: Read> Read for ProfileCipherReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() || self.finished {
            return Ok(0);
        }

        let n = self.inner.read(out)?;
        if n == 0 {
            self.finished = true;
            if let (Some(digest), Some(expected)) = (self.digest.take(), self.expected) {
                let computed = digest.finalize();
                if !bool::from(computed.as_slice().ct_eq(expected.as_bytes())) {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        CircleError::Integrity {
                            reason: "avatar digest mismatch".into(),
                        },
                    ));
                }
            }
            return Ok(0);
        }

        if let Some(digest) = self.digest.as_mut() {
            digest.update(&out[..n]);
        }
        self.cipher.apply_keystream(&mut out[..n]);
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
