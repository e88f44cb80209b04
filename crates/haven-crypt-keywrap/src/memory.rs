//! An in-process key-wrapping network.
//!
//! Holds a static X25519 secret and a [`Ledger`] of chain state. Clients
//! created from the same [`MemoryNetwork`] share that state, so keys wrapped
//! through one client can be unwrapped through another.

use async_trait::async_trait;
use rand::{rngs::OsRng, RngCore};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use x25519_dalek::{PublicKey, StaticSecret};

use haven_crypt_core::{clause_digest, Address, EncryptionKey, PolicyClause, Sha256Digest};

use crate::auth::{unix_now, AuthProof};
use crate::client::{ConnectionHandle, KeyWrapClient, NetworkId, WrappedKey};
use crate::error::{ConnectionError, NetworkError, Result};
use crate::ledger::Ledger;
use crate::wrap::WrappedKeyBlob;

/// Networks this implementation accepts.
pub const KNOWN_NETWORKS: [&str; 6] = ["datil", "datil-dev", "datil-test", "naga", "naga-dev", "local"];

/// Shared state for the in-process network.
pub struct MemoryNetwork {
    secret: StaticSecret,
    public: PublicKey,
    ledger: RwLock<Ledger>,
    available: AtomicBool,
    init_count: AtomicUsize,
    init_delay_ms: AtomicU64,
}

impl MemoryNetwork {
    /// Create a new network with a fresh secret.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a client bound to this network.
    pub fn client(self: &Arc<Self>) -> MemoryKeyWrapClient {
        MemoryKeyWrapClient {
            network: Arc::clone(self),
            session: RwLock::new(None),
        }
    }

    /// Make subsequent connects fail with `InitFailed` (or succeed again).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Simulated initialization latency.
    pub fn set_init_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.init_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Number of initializations performed so far.
    pub fn init_count(&self) -> usize {
        self.init_count.load(Ordering::SeqCst)
    }

    pub async fn set_token_balance(&self, contract: &str, holder: Address, amount: u128) {
        self.ledger.write().await.set_token_balance(contract, holder, amount);
    }

    pub async fn set_native_balance(&self, holder: Address, amount: u128) {
        self.ledger.write().await.set_native_balance(holder, amount);
    }

    fn wrap(&self, key: &EncryptionKey, policy: &[PolicyClause], chain: &str) -> Result<WrappedKey> {
        let digest = clause_digest(policy).map_err(|e| NetworkError::WrapFailed(e.to_string()))?;
        let blob = WrappedKeyBlob::seal(key, &self.public, &digest, chain)?;

        Ok(WrappedKey {
            ciphertext: blob.encode()?,
            key_digest: Sha256Digest::hash(key.as_bytes()).to_hex(),
        })
    }

    async fn unwrap(
        &self,
        wrapped: &WrappedKey,
        policy: &[PolicyClause],
        proof: &AuthProof,
        chain: &str,
    ) -> Result<EncryptionKey> {
        let digest = clause_digest(policy).map_err(|e| NetworkError::UnwrapFailed(e.to_string()))?;

        let caller = proof.verify(unix_now())?;
        if proof.resource != digest {
            return Err(NetworkError::ProofRejected("proof is bound to a different policy".to_string()).into());
        }
        if proof.chain != chain {
            return Err(NetworkError::ProofRejected(format!(
                "proof is bound to chain {}, not {chain}",
                proof.chain
            ))
            .into());
        }

        let conditions: Vec<_> = policy.iter().map(PolicyClause::condition).collect();
        if !self.ledger.read().await.satisfies(&conditions, &caller) {
            warn!(caller = %caller, "policy not satisfied");
            return Err(NetworkError::AccessDenied(format!("{caller} does not satisfy the policy")).into());
        }

        let blob = WrappedKeyBlob::decode(&wrapped.ciphertext)?;
        let key = blob.open(&self.secret, &digest, chain)?;

        if Sha256Digest::hash(key.as_bytes()).to_hex() != wrapped.key_digest.to_lowercase() {
            return Err(NetworkError::KeyDigestMismatch.into());
        }
        Ok(key)
    }
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            secret,
            public,
            ledger: RwLock::new(Ledger::new()),
            available: AtomicBool::new(true),
            init_count: AtomicUsize::new(0),
            init_delay_ms: AtomicU64::new(0),
        }
    }
}

/// A client session on a [`MemoryNetwork`].
pub struct MemoryKeyWrapClient {
    network: Arc<MemoryNetwork>,
    session: RwLock<Option<ConnectionHandle>>,
}

impl MemoryKeyWrapClient {
    /// The network this client talks to.
    pub fn network(&self) -> &Arc<MemoryNetwork> {
        &self.network
    }

    async fn require_session(&self) -> std::result::Result<ConnectionHandle, ConnectionError> {
        self.session.read().await.clone().ok_or(ConnectionError::NotConnected)
    }
}

#[async_trait]
impl KeyWrapClient for MemoryKeyWrapClient {
    async fn connect(&self, network: &NetworkId) -> std::result::Result<ConnectionHandle, ConnectionError> {
        if let Some(handle) = self.session.read().await.as_ref() {
            if &handle.network == network {
                return Ok(handle.clone());
            }
        }

        if !KNOWN_NETWORKS.contains(&network.as_str()) {
            return Err(ConnectionError::UnknownNetwork(network.to_string()));
        }
        if !self.network.available.load(Ordering::SeqCst) {
            return Err(ConnectionError::InitFailed(format!("{network} is unavailable")));
        }

        self.network.init_count.fetch_add(1, Ordering::SeqCst);
        let delay = self.network.init_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let mut session_id = [0u8; 16];
        OsRng.fill_bytes(&mut session_id);
        let handle = ConnectionHandle {
            network: network.clone(),
            session_id: hex::encode(session_id),
            connected_at: unix_now(),
        };
        info!(network = %network, "memory network initialized");

        *self.session.write().await = Some(handle.clone());
        Ok(handle)
    }

    async fn wrap_key(&self, key: &EncryptionKey, policy: &[PolicyClause], chain: &str) -> Result<WrappedKey> {
        self.require_session().await?;
        let wrapped = self.network.wrap(key, policy, chain)?;
        debug!(chain, clauses = policy.len(), "key wrapped");
        Ok(wrapped)
    }

    async fn unwrap_key(
        &self,
        wrapped: &WrappedKey,
        policy: &[PolicyClause],
        proof: &AuthProof,
        chain: &str,
    ) -> Result<EncryptionKey> {
        self.require_session().await?;
        let key = self.network.unwrap(wrapped, policy, proof, chain).await?;
        debug!(chain, caller = %proof.address, "key unwrapped");
        Ok(key)
    }

    async fn disconnect(&self) {
        if let Some(handle) = self.session.write().await.take() {
            debug!(network = %handle.network, "memory session released");
        }
    }

    async fn session(&self) -> Option<ConnectionHandle> {
        self.session.read().await.clone()
    }
}
