//! The key-wrapping network contract.
//!
//! The engine depends on exactly four operations from the network that
//! protects its symmetric keys: connect, wrap, unwrap and disconnect. Any
//! concrete network binding implements [`KeyWrapClient`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use haven_crypt_core::{EncryptionKey, PolicyClause};

use crate::auth::AuthProof;
use crate::error::{ConnectionError, Result};

/// Identifier of a key-wrapping network (e.g. `datil-dev`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(String);

impl NetworkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NetworkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An established session with a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionHandle {
    pub network: NetworkId,

    /// Opaque per-session identifier.
    pub session_id: String,

    /// Unix seconds at which the session was established.
    pub connected_at: u64,
}

/// A symmetric key as wrapped by the network, with its verification tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedKey {
    /// Opaque wrapped key text.
    pub ciphertext: String,

    /// Tag the network checks on unwrap.
    pub key_digest: String,
}

/// Contract required from a key-wrapping network client.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait KeyWrapClient: Send + Sync {
    /// Establish a session. Connecting again to the same network returns the
    /// existing handle.
    async fn connect(&self, network: &NetworkId) -> std::result::Result<ConnectionHandle, ConnectionError>;

    /// Wrap `key` so it can only be unwrapped by identities satisfying `policy`.
    async fn wrap_key(&self, key: &EncryptionKey, policy: &[PolicyClause], chain: &str) -> Result<WrappedKey>;

    /// Recover a wrapped key, presenting `proof` that the caller satisfies `policy`.
    async fn unwrap_key(
        &self,
        wrapped: &WrappedKey,
        policy: &[PolicyClause],
        proof: &AuthProof,
        chain: &str,
    ) -> Result<EncryptionKey>;

    /// Release the session. Further wraps fail with `NotConnected`.
    async fn disconnect(&self);

    /// The active session, if any.
    async fn session(&self) -> Option<ConnectionHandle>;
}
