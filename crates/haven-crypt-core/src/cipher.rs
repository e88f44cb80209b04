//! Symmetric cipher unit.
//!
//! ChaCha20-Poly1305 with a 256-bit key and a 96-bit IV. Ciphertext carries
//! the 16-byte authentication tag appended to the encrypted bytes.
//!
//! [`EncryptionKey`] zeroizes its bytes on drop, so key material is wiped at
//! the end of whatever scope owns it, on success and failure paths alike.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Identifier recorded in metadata for this cipher.
pub const CIPHER_ID: &str = "chacha20-poly1305";

/// Symmetric key length in bytes.
pub const KEY_LEN: usize = 32;

/// IV length in bytes.
pub const IV_LEN: usize = 12;

/// Authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// A 256-bit symmetric key.
///
/// Not `Clone`: each key has exactly one owner, and its bytes are wiped
/// when that owner drops it.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, which must be exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            )));
        }
        let mut arr = [0u8; KEY_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    fn cipher(&self) -> Result<ChaCha20Poly1305, CryptoError> {
        ChaCha20Poly1305::new_from_slice(&self.0).map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// A 96-bit initialization vector, unique per encryption.
///
/// Serialized as standard base64.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Iv(pub [u8; IV_LEN]);

impl Iv {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; IV_LEN]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, which must be exactly 12 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; IV_LEN] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; IV_LEN] {
        &self.0
    }

    /// Encode as standard base64.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }
}

impl fmt::Debug for Iv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Iv({})", hex::encode(self.0))
    }
}

impl Serialize for Iv {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Iv {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = BASE64.decode(s.as_bytes()).map_err(serde::de::Error::custom)?;
        Iv::from_slice(&bytes).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "iv must be exactly {} bytes, got {}",
                IV_LEN,
                bytes.len()
            ))
        })
    }
}

/// Generate a fresh random key from the OS CSPRNG.
pub fn generate_key() -> EncryptionKey {
    let mut key = EncryptionKey([0u8; KEY_LEN]);
    OsRng.fill_bytes(&mut key.0);
    key
}

/// Generate a fresh random IV from the OS CSPRNG.
pub fn generate_iv() -> Iv {
    let mut bytes = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut bytes);
    Iv(bytes)
}

/// Authenticated encryption. Output length is `plaintext.len() + TAG_LEN`.
pub fn seal(plaintext: &[u8], key: &EncryptionKey, iv: &Iv) -> Result<Vec<u8>, CryptoError> {
    let cipher = key.cipher()?;
    cipher
        .encrypt(Nonce::from_slice(&iv.0), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
}

/// Authenticated decryption.
///
/// Fails with [`CryptoError::AuthenticationFailed`] if the tag does not verify.
pub fn open(ciphertext: &[u8], key: &EncryptionKey, iv: &Iv) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < TAG_LEN {
        return Err(CryptoError::AuthenticationFailed);
    }
    let cipher = key.cipher()?;
    cipher
        .decrypt(Nonce::from_slice(&iv.0), ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailed)
}
