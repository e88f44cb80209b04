//! # Haven Crypt Testkit
//!
//! Testing utilities for Haven Crypt.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: pinned address, policy digest and cipher outputs
//! - **Generators**: Proptest strategies for identities, policies and metadata
//! - **Fixtures**: a memory network, seeded identities, and [`RpcHarness`],
//!   which drives the JSON-RPC server over in-process pipes
//!
//! ## Golden Vectors
//!
//! ```rust
//! use haven_crypt_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, actual) in verify_all_vectors() {
//!     assert!(matches, "{name}: {actual}");
//! }
//! ```
//!
//! ## Protocol Harness
//!
//! ```rust,no_run
//! use haven_crypt_testkit::{RpcHarness, TestFixture};
//! use serde_json::json;
//!
//! async fn example() {
//!     let fixture = TestFixture::new();
//!     let mut rpc = RpcHarness::start(fixture.dispatcher()).await;
//!     rpc.call("lit.connect", json!({})).await;
//!     let sealed = rpc.call("lit.encrypt", json!({ "data": "SGVsbG8sIEhhdmVuIQ==" })).await;
//!     assert!(!sealed.is_error());
//!     rpc.finish().await;
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{
    multi_party_identities, sample_metadata, seeded_identity, Exchange, RpcHarness, TestDispatcher,
    TestEngine, TestFixture,
};
pub use vectors::{cipher_vectors, policy_vectors, verify_all_vectors, CipherVector, PolicyVector};
