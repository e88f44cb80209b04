//! Encryption metadata envelope.
//!
//! The envelope travels next to the ciphertext and carries everything needed
//! to recover the payload except the key itself: the wrapped key, its digest,
//! the IV, the access policy and the chain it is evaluated on.
//!
//! Encoding is canonical JSON. Decoding is tolerant of unknown fields, which
//! are preserved in [`EncryptionMetadata::extensions`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::canonical::canonical_json;
use crate::cipher::{Iv, CIPHER_ID};
use crate::error::{CoreError, Result, ValidationError};
use crate::policy::AccessCondition;
use crate::types::Sha256Digest;

/// Envelope format tag implemented by this codec.
pub const METADATA_VERSION: &str = "hybrid-v1";

/// Default chain when an envelope does not name one.
pub const DEFAULT_CHAIN: &str = "ethereum";

const REQUIRED_FIELDS: [&str; 4] = ["version", "wrappedKey", "keyDigest", "iv"];

/// Describes how a payload was encrypted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionMetadata {
    pub version: String,

    /// Opaque wrapped key produced by the key-wrapping network.
    pub wrapped_key: String,

    /// Verification tag returned alongside the wrapped key.
    pub key_digest: String,

    pub iv: Iv,

    #[serde(default = "default_cipher")]
    pub cipher: String,

    #[serde(default)]
    pub access_policy: Vec<AccessCondition>,

    #[serde(default = "default_chain")]
    pub chain: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_mime_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_size: Option<u64>,

    /// SHA-256 of the plaintext, checked after decryption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_digest: Option<Sha256Digest>,

    /// Fields this codec does not know about, kept verbatim.
    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

fn default_cipher() -> String {
    CIPHER_ID.to_string()
}

fn default_chain() -> String {
    DEFAULT_CHAIN.to_string()
}

impl EncryptionMetadata {
    /// True if the envelope's format tag is the one this codec implements.
    pub fn is_supported_version(&self) -> bool {
        self.version == METADATA_VERSION
    }

    /// Reject envelopes this codec cannot process.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if !self.is_supported_version() {
            return Err(ValidationError::UnsupportedVersion(self.version.clone()));
        }
        if self.cipher != CIPHER_ID {
            return Err(ValidationError::UnsupportedCipher(self.cipher.clone()));
        }
        if self.wrapped_key.is_empty() {
            return Err(ValidationError::invalid("wrappedKey", "must not be empty"));
        }
        if self.key_digest.is_empty() {
            return Err(ValidationError::invalid("keyDigest", "must not be empty"));
        }
        Ok(())
    }
}

/// Encode to canonical JSON.
pub fn encode_metadata(metadata: &EncryptionMetadata) -> Result<String> {
    canonical_json(metadata)
}

/// Decode and validate an envelope.
pub fn decode_metadata(json: &str) -> Result<EncryptionMetadata> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| ValidationError::Malformed(e.to_string()))?;
    metadata_from_value(value)
}

/// Decode and validate an envelope that was already parsed as JSON.
pub fn metadata_from_value(value: Value) -> Result<EncryptionMetadata> {
    let object = value
        .as_object()
        .ok_or_else(|| ValidationError::Malformed("metadata must be a JSON object".to_string()))?;

    for field in REQUIRED_FIELDS {
        match object.get(field) {
            None | Some(Value::Null) => {
                return Err(ValidationError::MissingField(field.to_string()).into())
            }
            Some(_) => {}
        }
    }

    if let Some(version) = object.get("version") {
        if version.as_str() != Some(METADATA_VERSION) {
            let shown = version.as_str().map_or_else(|| version.to_string(), str::to_string);
            return Err(ValidationError::UnsupportedVersion(shown).into());
        }
    }

    let metadata: EncryptionMetadata = serde_json::from_value(value)
        .map_err(|e| CoreError::from(ValidationError::invalid("metadata", e.to_string())))?;
    metadata.validate()?;
    Ok(metadata)
}
