//! HKDF-SHA256 subkey derivation for attachment streams.
//!
//! One 256-bit asset key travels with the attachment pointer; the cipher
//! key and MAC key are expanded from it (RFC 5869) so the two concerns
//! never share raw key bytes. Derived material is zeroized on drop.

use circleservice_types::{AssetKey, CircleError, Result};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Domain-separation label for attachment subkey expansion.
const ATTACHMENT_INFO: &[u8] = b"circleservice attachment cipher";

// ---------------------------------------------------------------------------
// AttachmentKeys
// ---------------------------------------------------------------------------

/// Cipher and MAC subkeys expanded from one asset key.
///
/// Zeroized when dropped. Not `Clone`/`Debug` to prevent leakage.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct AttachmentKeys {
    /// XChaCha20 cipher key.
    pub cipher_key: [u8; 32],
    /// HMAC-SHA256 key for the interleaved tag.
    pub mac_key: [u8; 32],
}

/// Expands the per-asset key into cipher and MAC subkeys.
///
/// Deterministic: the sender and receiver derive identical subkeys from
/// the shared asset key.
///
/// # Errors
///
/// [`CircleError::Integrity`] if HKDF expansion fails (cannot happen for
/// a 64-byte output, but we avoid `unwrap`).
pub fn derive_attachment_keys(key: &AssetKey) -> Result<AttachmentKeys> {
    let hk = Hkdf::<Sha256>::new(None, key.as_bytes());

    let mut okm = [0u8; 64];
    hk.expand(ATTACHMENT_INFO, &mut okm)
        .map_err(|e| CircleError::Integrity {
            reason: format!("HKDF-SHA256 expansion failed: {e}"),
        })?;

    let mut cipher_key = [0u8; 32];
    let mut mac_key = [0u8; 32];
    cipher_key.copy_from_slice(&okm[..32]);
    mac_key.copy_from_slice(&okm[32..]);
    okm.zeroize();

    Ok(AttachmentKeys {
        cipher_key,
        mac_key,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
