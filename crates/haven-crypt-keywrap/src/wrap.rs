//! Key wrapping via X25519 key agreement.
//!
//! A symmetric key is sealed to the network's static X25519 public key. The
//! wrap key is derived from the shared secret together with the policy digest
//! and chain, so a blob only opens under the policy it was wrapped for.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::Zeroizing;

use haven_crypt_core::EncryptionKey;

use crate::error::NetworkError;

const WRAP_CONTEXT: &str = "haven-crypt keywrap v1 wrap-key";

/// The wire form of a wrapped key, before base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKeyBlob {
    /// Ephemeral X25519 public key (sender's side of ECDH).
    pub ephemeral_public: [u8; 32],

    pub nonce: [u8; 12],

    /// The symmetric key, sealed under the derived wrap key.
    pub encrypted_key: Vec<u8>,
}

impl WrappedKeyBlob {
    /// Seal `key` to `recipient` for the given policy digest and chain.
    pub fn seal(
        key: &EncryptionKey,
        recipient: &PublicKey,
        policy_digest: &str,
        chain: &str,
    ) -> Result<Self, NetworkError> {
        let ephemeral = EphemeralSecret::random_from_rng(OsRng);
        let ephemeral_public = PublicKey::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(recipient);

        let cipher = wrap_cipher(shared.as_bytes(), policy_digest, chain)?;
        let mut nonce = [0u8; 12];
        OsRng.fill_bytes(&mut nonce);

        let encrypted_key = cipher
            .encrypt(Nonce::from_slice(&nonce), key.as_bytes().as_slice())
            .map_err(|e| NetworkError::WrapFailed(e.to_string()))?;

        Ok(Self {
            ephemeral_public: *ephemeral_public.as_bytes(),
            nonce,
            encrypted_key,
        })
    }

    /// Recover the key with the network's secret.
    ///
    /// Fails if the policy digest or chain differ from the ones used to seal.
    pub fn open(
        &self,
        secret: &StaticSecret,
        policy_digest: &str,
        chain: &str,
    ) -> Result<EncryptionKey, NetworkError> {
        let shared = secret.diffie_hellman(&PublicKey::from(self.ephemeral_public));
        let cipher = wrap_cipher(shared.as_bytes(), policy_digest, chain)?;

        let key_bytes = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(&self.nonce), self.encrypted_key.as_slice())
                .map_err(|_| NetworkError::UnwrapFailed("wrapped key did not authenticate".to_string()))?,
        );

        EncryptionKey::from_slice(&key_bytes).map_err(|e| NetworkError::UnwrapFailed(e.to_string()))
    }

    /// Encode as base64 of CBOR.
    pub fn encode(&self) -> Result<String, NetworkError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| NetworkError::WrapFailed(e.to_string()))?;
        Ok(BASE64.encode(buf))
    }

    /// Decode from base64 of CBOR.
    pub fn decode(text: &str) -> Result<Self, NetworkError> {
        let bytes = BASE64
            .decode(text.as_bytes())
            .map_err(|e| NetworkError::Malformed(e.to_string()))?;
        ciborium::from_reader(bytes.as_slice()).map_err(|e| NetworkError::Malformed(e.to_string()))
    }
}

fn wrap_cipher(shared: &[u8; 32], policy_digest: &str, chain: &str) -> Result<ChaCha20Poly1305, NetworkError> {
    let mut hasher = blake3::Hasher::new_derive_key(WRAP_CONTEXT);
    hasher.update(shared);
    hasher.update(policy_digest.as_bytes());
    hasher.update(&[0u8]);
    hasher.update(chain.as_bytes());
    let wrap_key = Zeroizing::new(*hasher.finalize().as_bytes());

    ChaCha20Poly1305::new_from_slice(wrap_key.as_slice()).map_err(|e| NetworkError::WrapFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use haven_crypt_core::generate_key;

    fn network_keys() -> (StaticSecret, PublicKey) {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        (secret, public)
    }

    #[test]
    fn test_wrap_unwrap() {
        let (secret, public) = network_keys();
        let key = generate_key();

        let blob = WrappedKeyBlob::seal(&key, &public, "digest", "ethereum").unwrap();
        let opened = blob.open(&secret, "digest", "ethereum").unwrap();

        assert_eq!(opened.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_other_policy_fails() {
        let (secret, public) = network_keys();
        let blob = WrappedKeyBlob::seal(&generate_key(), &public, "digest-a", "ethereum").unwrap();

        assert!(matches!(
            blob.open(&secret, "digest-b", "ethereum"),
            Err(NetworkError::UnwrapFailed(_))
        ));
    }

    #[test]
    fn test_other_chain_fails() {
        let (secret, public) = network_keys();
        let blob = WrappedKeyBlob::seal(&generate_key(), &public, "digest", "ethereum").unwrap();

        assert!(blob.open(&secret, "digest", "polygon").is_err());
    }

    #[test]
    fn test_wrong_network_secret_fails() {
        let (_, public) = network_keys();
        let (other_secret, _) = network_keys();
        let blob = WrappedKeyBlob::seal(&generate_key(), &public, "digest", "ethereum").unwrap();

        assert!(blob.open(&other_secret, "digest", "ethereum").is_err());
    }

    #[test]
    fn test_encoding() {
        let (secret, public) = network_keys();
        let key = generate_key();
        let blob = WrappedKeyBlob::seal(&key, &public, "digest", "ethereum").unwrap();

        let text = blob.encode().unwrap();
        let decoded = WrappedKeyBlob::decode(&text).unwrap();
        assert_eq!(decoded, blob);
        assert_eq!(decoded.open(&secret, "digest", "ethereum").unwrap().as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(WrappedKeyBlob::decode("!!!"), Err(NetworkError::Malformed(_))));
        assert!(matches!(
            WrappedKeyBlob::decode(&BASE64.encode(b"not cbor at all")),
            Err(NetworkError::Malformed(_))
        ));
    }
}
