//! The hybrid encryption engine.
//!
//! Payload bytes are sealed locally under a fresh symmetric key. Only that
//! key crosses to the key-wrapping network, which binds it to the access
//! policy. Decryption reverses the flow: prove the policy is satisfied, get
//! the key back, open locally, check the plaintext digest.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use haven_crypt_core::metadata::DEFAULT_CHAIN;
use haven_crypt_core::{
    canonicalize, clause_digest, ensure_non_empty, generate_iv, generate_key, open, seal, AccessCondition,
    CryptoError, EncryptionMetadata, Identity, Sha256Digest, CIPHER_ID, METADATA_VERSION,
};
use haven_crypt_keywrap::{
    unix_now, Authenticator, ConnectionGuard, ConnectionHandle, KeyWrapClient, NetworkId, ProofRequest,
    WrappedKey,
};

use crate::error::{EngineError, Result};
use crate::progress::{report, ProgressSink, Stage};
use crate::sidecar::{default_ciphertext_path, default_decrypt_output, read_sidecar, sidecar_path, write_sidecar};

/// Default network when none is configured.
pub const DEFAULT_NETWORK: &str = "datil-dev";

/// Default advisory session lifetime.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Network used when `connect` is called without one.
    pub network: NetworkId,
    /// Chain used when an encrypt call does not name one.
    pub chain: String,
    /// Advisory lifetime reported in session state.
    pub session_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            network: NetworkId::from(DEFAULT_NETWORK),
            chain: DEFAULT_CHAIN.to_string(),
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }
}

/// Snapshot of the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub connected: bool,
    pub network: Option<NetworkId>,
    pub connected_at: Option<u64>,
    pub session_expires_at: Option<u64>,
    /// Past the advisory lifetime. The session still works.
    pub expired: bool,
}

impl ConnectionState {
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            network: None,
            connected_at: None,
            session_expires_at: None,
            expired: false,
        }
    }

    fn from_handle(handle: &ConnectionHandle, ttl: Duration, now: u64) -> Self {
        let expires_at = handle.connected_at.saturating_add(ttl.as_secs());
        Self {
            connected: true,
            network: Some(handle.network.clone()),
            connected_at: Some(handle.connected_at),
            session_expires_at: Some(expires_at),
            expired: now >= expires_at,
        }
    }
}

/// Per-call encryption options.
#[derive(Debug, Clone, Default)]
pub struct EncryptOptions {
    /// Overrides the configured chain.
    pub chain: Option<String>,
    pub mime_type: Option<String>,
}

/// Result of an in-memory encryption.
#[derive(Debug, Clone)]
pub struct Encrypted {
    pub ciphertext: Vec<u8>,
    pub metadata: EncryptionMetadata,
    /// SHA-256 of the plaintext.
    pub data_hash: Sha256Digest,
    /// Digest of the canonical policy.
    pub policy_hash: String,
}

/// Result of a file encryption.
#[derive(Debug, Clone)]
pub struct EncryptedFile {
    pub ciphertext_path: PathBuf,
    pub metadata_path: PathBuf,
    pub metadata: EncryptionMetadata,
    pub data_hash: Sha256Digest,
    pub policy_hash: String,
    pub original_size: u64,
}

/// Result of a file decryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedFile {
    pub output_path: PathBuf,
    pub size: u64,
}

/// Orchestrates local sealing and network key wrapping.
pub struct HybridEngine<C, A> {
    client: C,
    authenticator: A,
    guard: ConnectionGuard,
    config: EngineConfig,
}

impl<C: KeyWrapClient, A: Authenticator> HybridEngine<C, A> {
    pub fn new(client: C, authenticator: A, config: EngineConfig) -> Self {
        Self {
            client,
            authenticator,
            guard: ConnectionGuard::new(),
            config,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========== Connection ==========

    /// Connect to `network`, or the configured default. Concurrent callers
    /// share a single initialization.
    pub async fn connect(&self, network: Option<&NetworkId>) -> Result<ConnectionState> {
        let network = network.unwrap_or(&self.config.network);
        let handle = self.guard.connect(&self.client, network).await?;
        Ok(ConnectionState::from_handle(&handle, self.config.session_ttl, unix_now()))
    }

    /// Release the session. Idempotent.
    pub async fn disconnect(&self) -> ConnectionState {
        self.guard.disconnect(&self.client).await;
        ConnectionState::disconnected()
    }

    pub async fn state(&self) -> ConnectionState {
        match self.guard.current().await {
            Some(handle) => ConnectionState::from_handle(&handle, self.config.session_ttl, unix_now()),
            None => ConnectionState::disconnected(),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.guard.current().await.is_some()
    }

    // ========== In-memory payloads ==========

    /// Encrypt `plaintext` so only identities satisfying `policy` can read it.
    pub async fn encrypt(
        &self,
        plaintext: &[u8],
        identity: &Identity,
        policy: &[AccessCondition],
        options: &EncryptOptions,
        progress: Option<&ProgressSink>,
    ) -> Result<Encrypted> {
        let encrypted = self.seal_payload(plaintext, identity, policy, options, progress).await?;
        let total = plaintext.len() as u64;
        report(progress, Stage::Complete, total, total);
        Ok(encrypted)
    }

    /// Recover the plaintext sealed under `metadata`.
    pub async fn decrypt(
        &self,
        ciphertext: &[u8],
        metadata: &EncryptionMetadata,
        identity: &Identity,
        progress: Option<&ProgressSink>,
    ) -> Result<Vec<u8>> {
        let plaintext = self.open_payload(ciphertext, metadata, identity, progress).await?;
        let total = plaintext.len() as u64;
        report(progress, Stage::Complete, total, total);
        Ok(plaintext)
    }

    // ========== Files ==========

    /// Encrypt a file to `output` (default `<input>.enc`) plus a metadata
    /// sidecar next to it. The sidecar is written only after the ciphertext.
    pub async fn encrypt_file(
        &self,
        input: &Path,
        output: Option<&Path>,
        identity: &Identity,
        policy: &[AccessCondition],
        options: &EncryptOptions,
        progress: Option<&ProgressSink>,
    ) -> Result<EncryptedFile> {
        ensure_non_empty(policy)?;
        self.guard.require().await?;

        report(progress, Stage::ReadingInput, 0, 0);
        let plaintext = tokio::fs::read(input)
            .await
            .map_err(|e| EngineError::storage(input, e))?;
        let total = plaintext.len() as u64;

        let options = EncryptOptions {
            chain: options.chain.clone(),
            mime_type: options.mime_type.clone().or_else(|| Some(guess_mime_type(input).to_string())),
        };
        let encrypted = self.seal_payload(&plaintext, identity, policy, &options, progress).await?;

        report(progress, Stage::WritingOutput, total, total);
        let ciphertext_path = output.map_or_else(|| default_ciphertext_path(input), Path::to_path_buf);
        tokio::fs::write(&ciphertext_path, &encrypted.ciphertext)
            .await
            .map_err(|e| EngineError::storage(&ciphertext_path, e))?;
        let metadata_path = sidecar_path(&ciphertext_path);
        write_sidecar(&metadata_path, &encrypted.metadata).await?;

        info!(
            input = %input.display(),
            output = %ciphertext_path.display(),
            bytes = total,
            "encrypted file"
        );
        report(progress, Stage::Complete, total, total);

        Ok(EncryptedFile {
            ciphertext_path,
            metadata_path,
            metadata: encrypted.metadata,
            data_hash: encrypted.data_hash,
            policy_hash: encrypted.policy_hash,
            original_size: total,
        })
    }

    /// Decrypt a file using its sidecar (default `<input>.lit`).
    pub async fn decrypt_file(
        &self,
        input: &Path,
        output: Option<&Path>,
        metadata_path: Option<&Path>,
        identity: &Identity,
        progress: Option<&ProgressSink>,
    ) -> Result<DecryptedFile> {
        report(progress, Stage::ReadingInput, 0, 0);
        let metadata_path = metadata_path.map_or_else(|| sidecar_path(input), Path::to_path_buf);
        let metadata = read_sidecar(&metadata_path).await?;
        let ciphertext = tokio::fs::read(input)
            .await
            .map_err(|e| EngineError::storage(input, e))?;

        let plaintext = self.open_payload(&ciphertext, &metadata, identity, progress).await?;
        let size = plaintext.len() as u64;

        report(progress, Stage::WritingOutput, size, size);
        let output_path = output.map_or_else(|| default_decrypt_output(input), Path::to_path_buf);
        tokio::fs::write(&output_path, &plaintext)
            .await
            .map_err(|e| EngineError::storage(&output_path, e))?;

        info!(input = %input.display(), output = %output_path.display(), bytes = size, "decrypted file");
        report(progress, Stage::Complete, size, size);

        Ok(DecryptedFile { output_path, size })
    }

    // ========== Internals ==========

    async fn seal_payload(
        &self,
        plaintext: &[u8],
        identity: &Identity,
        policy: &[AccessCondition],
        options: &EncryptOptions,
        progress: Option<&ProgressSink>,
    ) -> Result<Encrypted> {
        ensure_non_empty(policy)?;
        self.guard.require().await?;

        let total = plaintext.len() as u64;
        let chain = options.chain.as_deref().unwrap_or(&self.config.chain);

        let key = generate_key();
        let iv = generate_iv();
        report(progress, Stage::KeyGenerated, 0, total);

        let ciphertext = seal(plaintext, &key, &iv)?;
        let data_hash = Sha256Digest::hash(plaintext);
        report(progress, Stage::LocalCipherDone, total, total);

        let clauses = canonicalize(policy);
        let policy_hash = clause_digest(&clauses)?;

        report(progress, Stage::NetworkWrapBegin, total, total);
        let wrapped = self.client.wrap_key(&key, &clauses, chain).await?;
        drop(key);
        report(progress, Stage::NetworkWrapDone, total, total);

        debug!(
            author = %identity.address(),
            bytes = total,
            policy = %policy_hash,
            chain,
            "sealed payload"
        );

        let metadata = EncryptionMetadata {
            version: METADATA_VERSION.to_string(),
            wrapped_key: wrapped.ciphertext,
            key_digest: wrapped.key_digest,
            iv,
            cipher: CIPHER_ID.to_string(),
            access_policy: policy.to_vec(),
            chain: chain.to_string(),
            original_mime_type: options.mime_type.clone(),
            original_size: Some(total),
            original_digest: Some(data_hash),
            extensions: Default::default(),
        };

        Ok(Encrypted {
            ciphertext,
            metadata,
            data_hash,
            policy_hash,
        })
    }

    async fn open_payload(
        &self,
        ciphertext: &[u8],
        metadata: &EncryptionMetadata,
        identity: &Identity,
        progress: Option<&ProgressSink>,
    ) -> Result<Vec<u8>> {
        metadata.validate()?;
        self.guard.require().await?;

        let total = ciphertext.len() as u64;
        let clauses = canonicalize(&metadata.access_policy);
        let request = ProofRequest {
            resource: clause_digest(&clauses)?,
            chain: metadata.chain.clone(),
        };

        let proof = self.authenticator.prove(identity, &request).await?;
        report(progress, Stage::AuthProofReady, 0, total);

        report(progress, Stage::NetworkUnwrapBegin, 0, total);
        let wrapped = WrappedKey {
            ciphertext: metadata.wrapped_key.clone(),
            key_digest: metadata.key_digest.clone(),
        };
        let key = self
            .client
            .unwrap_key(&wrapped, &clauses, &proof, &metadata.chain)
            .await?;
        report(progress, Stage::NetworkUnwrapDone, 0, total);

        let plaintext = open(ciphertext, &key, &metadata.iv)?;
        drop(key);
        report(progress, Stage::LocalDecipherDone, total, total);

        if let Some(expected) = metadata.original_digest {
            let actual = Sha256Digest::hash(&plaintext);
            if actual != expected {
                return Err(CryptoError::IntegrityMismatch {
                    expected: expected.to_hex(),
                    actual: actual.to_hex(),
                }
                .into());
            }
            report(progress, Stage::IntegrityVerified, total, total);
        }

        debug!(reader = %identity.address(), bytes = plaintext.len(), "opened payload");
        Ok(plaintext)
    }
}

/// MIME type from a file extension, `application/octet-stream` otherwise.
pub fn guess_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress;
    use haven_crypt_core::{TokenStandard, ValidationError};
    use haven_crypt_keywrap::{
        ConnectionError, MemoryKeyWrapClient, MemoryNetwork, NetworkError, SignedChallengeAuthenticator,
    };
    use std::sync::Arc;

    type Engine = HybridEngine<MemoryKeyWrapClient, SignedChallengeAuthenticator>;

    fn engine() -> (Arc<MemoryNetwork>, Engine) {
        let network = MemoryNetwork::new();
        let engine = HybridEngine::new(
            network.client(),
            SignedChallengeAuthenticator::default(),
            EngineConfig::default(),
        );
        (network, engine)
    }

    async fn connected() -> (Arc<MemoryNetwork>, Engine) {
        let (network, engine) = engine();
        engine.connect(None).await.unwrap();
        (network, engine)
    }

    fn owner(identity: &Identity) -> Vec<AccessCondition> {
        vec![AccessCondition::owner_only(&identity.address().to_hex(), "ethereum")]
    }

    #[tokio::test]
    async fn test_roundtrip_hello() {
        let (_network, engine) = connected().await;
        let alice = Identity::generate();
        let policy = owner(&alice);

        let encrypted = engine
            .encrypt(b"Hello, Haven!", &alice, &policy, &EncryptOptions::default(), None)
            .await
            .unwrap();

        assert_eq!(encrypted.ciphertext.len(), 29);
        assert_eq!(encrypted.metadata.version, "hybrid-v1");
        assert_eq!(encrypted.metadata.original_size, Some(13));
        assert_eq!(encrypted.data_hash, Sha256Digest::hash(b"Hello, Haven!"));

        let plaintext = engine
            .decrypt(&encrypted.ciphertext, &encrypted.metadata, &alice, None)
            .await
            .unwrap();
        assert_eq!(plaintext, b"Hello, Haven!");
    }

    #[tokio::test]
    async fn test_empty_payload() {
        let (_network, engine) = connected().await;
        let alice = Identity::generate();
        let policy = owner(&alice);

        let encrypted = engine
            .encrypt(b"", &alice, &policy, &EncryptOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(encrypted.ciphertext.len(), 16);

        let plaintext = engine
            .decrypt(&encrypted.ciphertext, &encrypted.metadata, &alice, None)
            .await
            .unwrap();
        assert!(plaintext.is_empty());
    }

    #[tokio::test]
    async fn test_requires_connection() {
        let (_network, engine) = engine();
        let alice = Identity::generate();

        let err = engine
            .encrypt(b"x", &alice, &owner(&alice), &EncryptOptions::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Connection(ConnectionError::NotConnected)));
    }

    #[tokio::test]
    async fn test_empty_policy_checked_before_connection() {
        let (_network, engine) = engine();
        let alice = Identity::generate();

        let err = engine
            .encrypt(b"x", &alice, &[], &EncryptOptions::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(ValidationError::EmptyPolicy)));
    }

    #[tokio::test]
    async fn test_tampered_ciphertext_fails_authentication() {
        let (_network, engine) = connected().await;
        let alice = Identity::generate();
        let encrypted = engine
            .encrypt(b"Hello, Haven!", &alice, &owner(&alice), &EncryptOptions::default(), None)
            .await
            .unwrap();

        let mut tampered = encrypted.ciphertext.clone();
        tampered[0] ^= 0x01;

        let err = engine
            .decrypt(&tampered, &encrypted.metadata, &alice, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Crypto(CryptoError::AuthenticationFailed)));
    }

    #[tokio::test]
    async fn test_other_identity_denied() {
        let (_network, engine) = connected().await;
        let alice = Identity::generate();
        let bob = Identity::generate();
        let encrypted = engine
            .encrypt(b"secret", &alice, &owner(&alice), &EncryptOptions::default(), None)
            .await
            .unwrap();

        let err = engine
            .decrypt(&encrypted.ciphertext, &encrypted.metadata, &bob, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Network(NetworkError::AccessDenied(_))));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_token_gate_follows_ledger() {
        let (network, engine) = connected().await;
        let alice = Identity::generate();
        let bob = Identity::generate();
        let contract = "0x00000000000000000000000000000000000000aa";
        let policy = vec![AccessCondition::token_holder(contract, TokenStandard::Erc721, "ethereum")];

        let encrypted = engine
            .encrypt(b"members", &alice, &policy, &EncryptOptions::default(), None)
            .await
            .unwrap();
        assert!(engine
            .decrypt(&encrypted.ciphertext, &encrypted.metadata, &bob, None)
            .await
            .is_err());

        network.set_token_balance(contract, bob.address(), 1).await;
        let plaintext = engine
            .decrypt(&encrypted.ciphertext, &encrypted.metadata, &bob, None)
            .await
            .unwrap();
        assert_eq!(plaintext, b"members");
    }

    #[tokio::test]
    async fn test_altered_policy_is_rejected() {
        let (_network, engine) = connected().await;
        let alice = Identity::generate();
        let encrypted = engine
            .encrypt(b"secret", &alice, &owner(&alice), &EncryptOptions::default(), None)
            .await
            .unwrap();

        let mut metadata = encrypted.metadata.clone();
        metadata.access_policy = vec![AccessCondition::public("ethereum")];

        assert!(engine
            .decrypt(&encrypted.ciphertext, &metadata, &alice, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_integrity_digest_checked() {
        let (_network, engine) = connected().await;
        let alice = Identity::generate();
        let encrypted = engine
            .encrypt(b"secret", &alice, &owner(&alice), &EncryptOptions::default(), None)
            .await
            .unwrap();

        let mut metadata = encrypted.metadata.clone();
        metadata.original_digest = Some(Sha256Digest::hash(b"something else"));

        let err = engine
            .decrypt(&encrypted.ciphertext, &metadata, &alice, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Crypto(CryptoError::IntegrityMismatch { .. })));
    }

    #[tokio::test]
    async fn test_unsupported_version_rejected_before_network() {
        let (_network, engine) = engine();
        let alice = Identity::generate();
        let (_n2, other) = connected().await;
        let encrypted = other
            .encrypt(b"x", &alice, &owner(&alice), &EncryptOptions::default(), None)
            .await
            .unwrap();

        let mut metadata = encrypted.metadata;
        metadata.version = "hybrid-v0".to_string();

        let err = engine
            .decrypt(&encrypted.ciphertext, &metadata, &alice, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(ValidationError::UnsupportedVersion(_))));
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_completes() {
        let (_network, engine) = connected().await;
        let alice = Identity::generate();
        let (sink, mut stream) = progress::channel();

        let encrypted = engine
            .encrypt(b"Hello, Haven!", &alice, &owner(&alice), &EncryptOptions::default(), Some(&sink))
            .await
            .unwrap();
        let events = stream.drain();

        assert!(events.windows(2).all(|w| w[0].percentage <= w[1].percentage));
        let last = events.last().unwrap();
        assert_eq!(last.stage, Stage::Complete);
        assert_eq!(last.percentage, 100);

        engine
            .decrypt(&encrypted.ciphertext, &encrypted.metadata, &alice, Some(&sink))
            .await
            .unwrap();
        let events = stream.drain();
        assert!(events.iter().any(|e| e.stage == Stage::IntegrityVerified));
        assert_eq!(events.last().map(|e| e.stage), Some(Stage::Complete));
    }

    #[tokio::test]
    async fn test_connection_state() {
        let (_network, engine) = engine();
        assert_eq!(engine.state().await, ConnectionState::disconnected());

        let state = engine.connect(Some(&NetworkId::from("datil"))).await.unwrap();
        assert!(state.connected);
        assert!(!state.expired);
        assert_eq!(state.network, Some(NetworkId::from("datil")));
        assert_eq!(
            state.session_expires_at,
            state.connected_at.map(|t| t + DEFAULT_SESSION_TTL.as_secs())
        );

        assert_eq!(engine.disconnect().await, ConnectionState::disconnected());
        assert!(!engine.is_connected().await);
        assert_eq!(engine.disconnect().await, ConnectionState::disconnected());
    }

    #[tokio::test]
    async fn test_file_roundtrip() {
        let (_network, engine) = connected().await;
        let alice = Identity::generate();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("note.txt");
        tokio::fs::write(&input, b"Hello, Haven!").await.unwrap();

        let encrypted = engine
            .encrypt_file(&input, None, &alice, &owner(&alice), &EncryptOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(encrypted.ciphertext_path, dir.path().join("note.txt.enc"));
        assert_eq!(encrypted.metadata_path, dir.path().join("note.txt.enc.lit"));
        assert_eq!(encrypted.original_size, 13);
        assert_eq!(encrypted.metadata.original_mime_type.as_deref(), Some("text/plain"));

        tokio::fs::remove_file(&input).await.unwrap();
        let decrypted = engine
            .decrypt_file(&encrypted.ciphertext_path, None, None, &alice, None)
            .await
            .unwrap();
        assert_eq!(decrypted.output_path, input);
        assert_eq!(decrypted.size, 13);
        assert_eq!(tokio::fs::read(&input).await.unwrap(), b"Hello, Haven!");
    }

    #[tokio::test]
    async fn test_missing_input_file() {
        let (_network, engine) = connected().await;
        let alice = Identity::generate();
        let dir = tempfile::tempdir().unwrap();

        let err = engine
            .encrypt_file(
                &dir.path().join("absent"),
                None,
                &alice,
                &owner(&alice),
                &EncryptOptions::default(),
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.rpc_code(), -32005);
    }

    #[test]
    fn test_guess_mime_type() {
        assert_eq!(guess_mime_type(Path::new("a.TXT")), "text/plain");
        assert_eq!(guess_mime_type(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(guess_mime_type(Path::new("a")), "application/octet-stream");
    }
}
