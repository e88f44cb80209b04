//! Time-bounded authentication proofs.
//!
//! Before a key can be unwrapped, the caller presents an [`AuthProof`]: a
//! signed challenge binding a domain, the policy resource (its digest), the
//! chain and an expiry. The network recovers the signer from the signature
//! and evaluates the policy against that address.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use haven_crypt_core::{recover_address, Address, Identity};

use crate::error::NetworkError;

/// Default proof lifetime.
pub const DEFAULT_PROOF_TTL: Duration = Duration::from_secs(600);

/// Default signing domain.
pub const DEFAULT_DOMAIN: &str = "localhost";

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// What a proof must be bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofRequest {
    /// Policy digest (hex) the proof authorizes.
    pub resource: String,
    pub chain: String,
}

/// A signed, expiring challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthProof {
    pub address: Address,
    pub domain: String,
    pub resource: String,
    pub chain: String,
    pub issued_at: u64,
    pub expires_at: u64,
    pub signature: String,
}

impl AuthProof {
    /// The exact text that was signed.
    pub fn message(&self) -> String {
        challenge_message(
            &self.domain,
            &self.address,
            &self.resource,
            &self.chain,
            self.issued_at,
            self.expires_at,
        )
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    /// Check expiry and signature. Returns the recovered signer.
    pub fn verify(&self, now: u64) -> Result<Address, NetworkError> {
        if self.is_expired(now) {
            return Err(NetworkError::ProofRejected(format!(
                "proof expired at {}",
                self.expires_at
            )));
        }
        if self.issued_at > self.expires_at {
            return Err(NetworkError::ProofRejected("issued after expiry".to_string()));
        }

        let signer = recover_address(&self.message(), &self.signature)
            .map_err(|e| NetworkError::ProofRejected(e.to_string()))?;
        if signer != self.address {
            return Err(NetworkError::ProofRejected(format!(
                "signature is from {signer}, proof claims {}",
                self.address
            )));
        }
        Ok(signer)
    }
}

fn challenge_message(
    domain: &str,
    address: &Address,
    resource: &str,
    chain: &str,
    issued_at: u64,
    expires_at: u64,
) -> String {
    format!(
        "{domain} wants you to sign in with your Ethereum account:\n\
         {address}\n\
         \n\
         Resource: haven-policy:{resource}\n\
         Chain: {chain}\n\
         Issued At: {issued_at}\n\
         Expiration Time: {expires_at}"
    )
}

/// Produces proofs for an identity.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn prove(&self, identity: &Identity, request: &ProofRequest) -> Result<AuthProof, NetworkError>;
}

/// Signs a challenge locally with the identity's key.
#[derive(Debug, Clone)]
pub struct SignedChallengeAuthenticator {
    pub domain: String,
    pub ttl: Duration,
}

impl SignedChallengeAuthenticator {
    pub fn new(domain: impl Into<String>, ttl: Duration) -> Self {
        Self {
            domain: domain.into(),
            ttl,
        }
    }

    /// Build a proof issued at `now`.
    pub fn prove_at(
        &self,
        identity: &Identity,
        request: &ProofRequest,
        now: u64,
    ) -> Result<AuthProof, NetworkError> {
        let address = identity.address();
        let expires_at = now.saturating_add(self.ttl.as_secs());
        let message = challenge_message(
            &self.domain,
            &address,
            &request.resource,
            &request.chain,
            now,
            expires_at,
        );
        let signature = identity
            .sign_message(&message)
            .map_err(|e| NetworkError::ProofRejected(e.to_string()))?;

        Ok(AuthProof {
            address,
            domain: self.domain.clone(),
            resource: request.resource.clone(),
            chain: request.chain.clone(),
            issued_at: now,
            expires_at,
            signature,
        })
    }
}

impl Default for SignedChallengeAuthenticator {
    fn default() -> Self {
        Self::new(DEFAULT_DOMAIN, DEFAULT_PROOF_TTL)
    }
}

#[async_trait]
impl Authenticator for SignedChallengeAuthenticator {
    async fn prove(&self, identity: &Identity, request: &ProofRequest) -> Result<AuthProof, NetworkError> {
        self.prove_at(identity, request, unix_now())
    }
}
