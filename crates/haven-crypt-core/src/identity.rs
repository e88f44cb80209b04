//! Signing identity.
//!
//! A secp256k1 key with an Ethereum-style address. Messages are signed with
//! EIP-191 `personal_sign` framing; signatures are 65 bytes (`r || s || v`,
//! `v` in {27, 28}) rendered as `0x`-prefixed hex.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use tiny_keccak::{Hasher, Keccak};
use zeroize::Zeroize;

use crate::error::CryptoError;

/// Length of a recoverable signature in bytes.
pub const SIGNATURE_LEN: usize = 65;

/// A 20-byte account address.
///
/// Displayed and serialized as lowercase `0x`-prefixed hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Derive the address of a verifying key: last 20 bytes of
    /// keccak256 over the uncompressed point without its prefix byte.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        let hash = keccak256(&point.as_bytes()[1..]);

        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&hash[12..]);
        Self(bytes)
    }

    /// Lowercase `0x`-prefixed hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("address must be 20 bytes".to_string()))?;
        Ok(Self(arr))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A signing identity.
///
/// The inner signing key wipes its scalar on drop.
#[derive(Clone)]
pub struct Identity {
    signing_key: SigningKey,
    address: Address,
}

impl Identity {
    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    /// Load from a hex private key (optional `0x` prefix).
    pub fn from_private_key_hex(private_key: &str) -> Result<Self, CryptoError> {
        let raw = private_key.trim();
        let raw = raw.strip_prefix("0x").unwrap_or(raw);

        let mut bytes =
            hex::decode(raw).map_err(|_| CryptoError::InvalidKey("private key is not hex".to_string()))?;
        let result = Self::from_bytes(&bytes);
        bytes.zeroize();
        result
    }

    /// Load from raw 32-byte scalar.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKey(format!(
                "private key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let signing_key =
            SigningKey::from_slice(bytes).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self::from_signing_key(signing_key))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = Address::from_verifying_key(signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    /// The identity's address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// EIP-191 sign `message`, returning `0x`-prefixed hex.
    pub fn sign_message(&self, message: &str) -> Result<String, CryptoError> {
        let hash = eip191_hash(message.as_bytes());
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&hash)
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;

        let mut bytes = [0u8; SIGNATURE_LEN];
        bytes[..64].copy_from_slice(&signature.to_bytes());
        bytes[64] = recovery_id.to_byte() + 27;
        Ok(format!("0x{}", hex::encode(bytes)))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Recover the address that produced an EIP-191 signature over `message`.
pub fn recover_address(message: &str, signature: &str) -> Result<Address, CryptoError> {
    let bytes = hex::decode(signature.trim_start_matches("0x"))
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    if bytes.len() != SIGNATURE_LEN {
        return Err(CryptoError::InvalidSignature(format!(
            "expected {} bytes, got {}",
            SIGNATURE_LEN,
            bytes.len()
        )));
    }

    let v = match bytes[64] {
        v @ 27..=28 => v - 27,
        v @ 0..=1 => v,
        v => {
            return Err(CryptoError::InvalidSignature(format!(
                "invalid recovery byte: {v}"
            )))
        }
    };
    let recovery_id = RecoveryId::from_byte(v)
        .ok_or_else(|| CryptoError::InvalidSignature("invalid recovery id".to_string()))?;
    let signature =
        Signature::from_slice(&bytes[..64]).map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;

    let hash = eip191_hash(message.as_bytes());
    let key = VerifyingKey::recover_from_prehash(&hash, &signature, recovery_id)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;

    Ok(Address::from_verifying_key(&key))
}

fn eip191_hash(message: &[u8]) -> [u8; 32] {
    let prefix = format!("\x19Ethereum Signed Message:\n{}", message.len());
    let mut hasher = Keccak::v256();
    hasher.update(prefix.as_bytes());
    hasher.update(message);

    let mut hash = [0u8; 32];
    hasher.finalize(&mut hash);
    hash
}

fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut hash = [0u8; 32];
    hasher.finalize(&mut hash);
    hash
}
