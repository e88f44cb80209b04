//! # Haven Crypt Core
//!
//! Pure primitives for hybrid payload encryption: access policies, the
//! encryption metadata envelope, and the local symmetric cipher.
//!
//! This crate contains no I/O and no networking. Key wrapping lives in
//! `haven-crypt-keywrap`; orchestration lives in `haven-crypt`.
//!
//! ## Key Types
//!
//! - [`AccessCondition`] - One clause of an access policy
//! - [`EncryptionMetadata`] - Envelope describing how a payload was encrypted
//! - [`EncryptionKey`] / [`Iv`] - Symmetric key material (zeroized on drop)
//! - [`Identity`] - A secp256k1 signing identity with an Ethereum-style address
//!
//! ## Canonicalization
//!
//! Policies and metadata are serialized as canonical JSON: object keys sorted,
//! no insignificant whitespace. See [`canonical`].

pub mod canonical;
pub mod cipher;
pub mod error;
pub mod identity;
pub mod metadata;
pub mod policy;
pub mod types;

pub use canonical::{canonical_json, canonical_value};
pub use cipher::{generate_iv, generate_key, open, seal, EncryptionKey, Iv, CIPHER_ID};
pub use error::{CoreError, CryptoError, Result, ValidationError};
pub use identity::{recover_address, Address, Identity};
pub use metadata::{
    decode_metadata, encode_metadata, metadata_from_value, EncryptionMetadata, METADATA_VERSION,
};
pub use policy::{
    canonicalize, clause_digest, ensure_non_empty, policy_digest, AccessCondition, AccessPattern,
    Comparator, PolicyClause, ReturnValueTest, TokenStandard, USER_ADDRESS,
};
pub use types::Sha256Digest;
