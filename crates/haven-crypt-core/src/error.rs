//! Error types for Haven Crypt Core.

use thiserror::Error;

/// Validation errors for parameters, policies and metadata envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("unsupported metadata version: {0}")]
    UnsupportedVersion(String),

    #[error("access policy must contain at least one condition")]
    EmptyPolicy,

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("unsupported cipher: {0}")]
    UnsupportedCipher(String),

    #[error("malformed input: {0}")]
    Malformed(String),
}

impl ValidationError {
    /// Shorthand for [`ValidationError::InvalidField`].
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stable name of the variant, suitable for wire-level error data.
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::MissingField(_) => "MissingField",
            ValidationError::UnsupportedVersion(_) => "UnsupportedVersion",
            ValidationError::EmptyPolicy => "EmptyPolicy",
            ValidationError::InvalidField { .. } => "InvalidField",
            ValidationError::UnsupportedCipher(_) => "UnsupportedCipher",
            ValidationError::Malformed(_) => "Malformed",
        }
    }
}

/// Cryptographic failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// The AEAD tag did not verify: wrong key, wrong IV, or tampered ciphertext.
    #[error("authentication failed: ciphertext could not be verified")]
    AuthenticationFailed,

    /// Plaintext decrypted cleanly but does not match the recorded digest.
    #[error("integrity mismatch: expected digest {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The AEAD refused to seal, e.g. the plaintext exceeds its length limit.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}

impl CryptoError {
    /// Stable name of the variant, suitable for wire-level error data.
    pub fn reason(&self) -> &'static str {
        match self {
            CryptoError::AuthenticationFailed => "AuthenticationFailed",
            CryptoError::IntegrityMismatch { .. } => "IntegrityMismatch",
            CryptoError::InvalidKey(_) => "InvalidKey",
            CryptoError::EncryptionFailed(_) => "EncryptionFailed",
            CryptoError::InvalidSignature(_) => "InvalidSignature",
        }
    }
}

/// Umbrella error for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
