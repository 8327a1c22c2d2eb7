//! Purpose-selected digesting-writer capability.
//!
//! Upload paths need "wrap this sink so writes are encrypted and
//! digested" without caring which asset purpose they serve. The purpose
//! is selected by value at call time — the attachment and avatar formats
//! stay distinct (see [`crate::attachment`] and [`crate::profile`]).

use std::io::Write;

use circleservice_types::{AssetKey, CiphertextDigest, Result};

use crate::attachment::AttachmentCipherWriter;
use crate::profile::ProfileCipherWriter;

// ---------------------------------------------------------------------------
// CipherPurpose
// ---------------------------------------------------------------------------

/// Which asset format a digesting writer should produce.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CipherPurpose {
    /// Attachment payload: interleaved HMAC-SHA256 trailer.
    Attachment,
    /// Profile avatar: stream digest only.
    ProfileAvatar,
}

// ---------------------------------------------------------------------------
// DigestingWrite
// ---------------------------------------------------------------------------

/// A sink wrapper that encrypts and digests everything written to it.
///
/// `finish_boxed` finalizes the stream and yields the digest over the
/// complete ciphertext; the wrapped sink is dropped with the writer.
pub trait DigestingWrite: Write {
    /// Finalizes the stream and returns the ciphertext digest.
    fn finish_boxed(self: Box<Self>) -> Result<CiphertextDigest>;
}

impl<W: Write> DigestingWrite for AttachmentCipherWriter<W> {
    fn finish_boxed(self: Box<Self>) -> Result<CiphertextDigest> {
        let (_sink, digest) = (*self).finish()?;
        Ok(digest)
    }
}

impl<W: Write> DigestingWrite for ProfileCipherWriter<W> {
    fn finish_boxed(self: Box<Self>) -> Result<CiphertextDigest> {
        let (_sink, digest) = (*self).finish()?;
        Ok(digest)
    }
}

/// Wraps `sink` in the digesting writer for `purpose`.
pub fn digesting_writer<W: Write + 'static>(
    purpose: CipherPurpose,
    key: &AssetKey,
    sink: W,
) -> Result<Box<dyn DigestingWrite>> {
    match purpose {
        CipherPurpose::Attachment => Ok(Box::new(AttachmentCipherWriter::new(key, sink)?)),
        CipherPurpose::ProfileAvatar => Ok(Box::new(ProfileCipherWriter::new(key, sink)?)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_purposes_produce_a_digest() -> Result<()> {
        let key = AssetKey::from_bytes([0x55; 32]);
        for purpose in [CipherPurpose::Attachment, CipherPurpose::ProfileAvatar] {
            let mut writer = digesting_writer(purpose, &key, Vec::new())?;
            writer
                .write_all(b"payload")
                .map_err(|e| circleservice_types::CircleError::Network {
                    reason: e.to_string(),
                })?;
            let digest = writer.finish_boxed()?;
            assert_ne!(digest.as_bytes(), &[0u8; 32]);
        }
        Ok(())
    }

    #[test]
    fn purposes_yield_different_digests_for_same_input() -> Result<()> {
        let key = AssetKey::from_bytes([0x55; 32]);

        let mut a = crate::attachment::AttachmentCipherWriter::with_nonce(
            &key,
            [0x01; crate::NONCE_LEN],
            Vec::new(),
        )?;
        let mut p = crate::profile::ProfileCipherWriter::with_nonce(
            &key,
            [0x01; crate::NONCE_LEN],
            Vec::new(),
        )?;
        a.write_all(b"payload").expect("write");
        p.write_all(b"payload").expect("write");
        let (_, da) = a.finish()?;
        let (_, dp) = p.finish()?;
        assert_ne!(da, dp);
        Ok(())
    }
}
