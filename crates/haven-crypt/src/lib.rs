//! # Haven Crypt
//!
//! Hybrid payload encryption for Haven, driven over a line-delimited
//! JSON-RPC control protocol.
//!
//! ## Overview
//!
//! - **Local cipher**: payloads are sealed in-process with ChaCha20-Poly1305
//!   under a fresh 32-byte key
//! - **Key wrapping**: only that key is handed to the key-wrapping network,
//!   bound to an access policy
//! - **Metadata**: a versioned envelope (optionally a `.lit` sidecar file)
//!   carries the wrapped key, IV and policy next to the ciphertext
//! - **Control protocol**: a host process drives the engine over stdio
//!
//! ## Usage
//!
//! ```rust,no_run
//! use haven_crypt::{EncryptOptions, EngineConfig, HybridEngine};
//! use haven_crypt::core::{AccessCondition, Identity};
//! use haven_crypt::keywrap::{MemoryNetwork, SignedChallengeAuthenticator};
//!
//! async fn example() {
//!     let network = MemoryNetwork::new();
//!     let engine = HybridEngine::new(
//!         network.client(),
//!         SignedChallengeAuthenticator::default(),
//!         EngineConfig::default(),
//!     );
//!     engine.connect(None).await.unwrap();
//!
//!     let me = Identity::generate();
//!     let policy = vec![AccessCondition::owner_only(&me.address().to_hex(), "ethereum")];
//!     let sealed = engine
//!         .encrypt(b"Hello, Haven!", &me, &policy, &EncryptOptions::default(), None)
//!         .await
//!         .unwrap();
//!
//!     let opened = engine
//!         .decrypt(&sealed.ciphertext, &sealed.metadata, &me, None)
//!         .await
//!         .unwrap();
//!     assert_eq!(opened, b"Hello, Haven!");
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `haven_crypt::core` - policies, metadata envelope, local cipher, identity
//! - `haven_crypt::keywrap` - key-wrapping network contract and memory network
//! - `haven_crypt::rpc` - JSON-RPC framing and server loop

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod progress;
pub mod sidecar;

// Re-export component crates
pub use haven_crypt_core as core;
pub use haven_crypt_keywrap as keywrap;
pub use haven_crypt_rpc as rpc;

// Re-export main types for convenience
pub use config::{NetworkMode, RuntimeConfig};
pub use dispatch::{Dispatcher, DispatcherConfig, DEFAULT_NAMESPACE, VERSION};
pub use engine::{
    guess_mime_type, ConnectionState, DecryptedFile, EncryptOptions, Encrypted, EncryptedFile, EngineConfig,
    HybridEngine, DEFAULT_NETWORK, DEFAULT_SESSION_TTL,
};
pub use error::{EngineError, Result};
pub use progress::{ProgressEvent, ProgressSink, ProgressStream, Stage};
pub use sidecar::{
    default_ciphertext_path, default_decrypt_output, read_sidecar, remove_sidecar, sidecar_path, write_sidecar,
};
