//! # Haven Crypt Key Wrapping
//!
//! The contract between the hybrid engine and the network that protects its
//! symmetric keys.
//!
//! ## Overview
//!
//! Payloads never leave the process. Only the 32-byte symmetric key is handed
//! to the network, which wraps it under an access policy. To get it back, the
//! caller presents an [`AuthProof`] showing it satisfies that policy.
//!
//! - [`KeyWrapClient`] - connect / wrap / unwrap / disconnect
//! - [`ConnectionGuard`] - single-flight connection slot
//! - [`Authenticator`] - produces time-bounded proofs for an identity
//! - [`MemoryNetwork`] - a complete in-process network backed by a [`Ledger`]
//!
//! ## Wrap Flow
//!
//! ```text
//! Engine                         Network
//!   |-- wrap_key(key, policy) ---->|  seal key to network X25519 key,
//!   |<------ (wrapped, digest) ----|  bound to policy digest + chain
//!   |
//!   |-- unwrap_key(wrapped,        |
//!   |     policy, proof) --------->|  verify proof, evaluate policy,
//!   |<------------ key ------------|  open blob, check digest
//! ```

pub mod auth;
pub mod client;
pub mod connection;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod wrap;

pub use auth::{
    unix_now, AuthProof, Authenticator, ProofRequest, SignedChallengeAuthenticator, DEFAULT_DOMAIN,
    DEFAULT_PROOF_TTL,
};
pub use client::{ConnectionHandle, KeyWrapClient, NetworkId, WrappedKey};
pub use connection::ConnectionGuard;
pub use error::{ConnectionError, KeyWrapError, NetworkError, Result};
pub use ledger::Ledger;
pub use memory::{MemoryKeyWrapClient, MemoryNetwork, KNOWN_NETWORKS};
pub use wrap::WrappedKeyBlob;
