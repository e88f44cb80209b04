//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: an in-memory key-wrapping
//! network, identities, engines, and a harness that drives the JSON-RPC
//! server over in-process pipes.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

use haven_crypt::{Dispatcher, DispatcherConfig, EngineConfig, HybridEngine};
use haven_crypt_core::{
    AccessCondition, EncryptionMetadata, Identity, Iv, Sha256Digest, CIPHER_ID, METADATA_VERSION,
};
use haven_crypt_keywrap::{MemoryKeyWrapClient, MemoryNetwork, SignedChallengeAuthenticator};
use haven_crypt_rpc::{Frame, LineReader, Server, ServerConfig, ServerReport};

/// Engine type used throughout the tests.
pub type TestEngine = HybridEngine<MemoryKeyWrapClient, SignedChallengeAuthenticator>;

/// Dispatcher type used throughout the tests.
pub type TestDispatcher = Dispatcher<MemoryKeyWrapClient, SignedChallengeAuthenticator>;

const PIPE_CAPACITY: usize = 1 << 20;
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// A memory network plus one identity.
pub struct TestFixture {
    pub network: Arc<MemoryNetwork>,
    pub identity: Identity,
}

impl TestFixture {
    /// Fresh network, random identity.
    pub fn new() -> Self {
        Self {
            network: MemoryNetwork::new(),
            identity: Identity::generate(),
        }
    }

    /// Fresh network, identity whose secret key is `[seed; 32]`.
    pub fn with_seed(seed: u8) -> Self {
        Self {
            network: MemoryNetwork::new(),
            identity: seeded_identity(seed),
        }
    }

    /// An engine bound to this fixture's network.
    pub fn engine(&self) -> TestEngine {
        HybridEngine::new(
            self.network.client(),
            SignedChallengeAuthenticator::default(),
            EngineConfig::default(),
        )
    }

    /// An engine that is already connected to the default network.
    pub async fn connected_engine(&self) -> TestEngine {
        let engine = self.engine();
        engine
            .connect(None)
            .await
            .expect("memory network connects");
        engine
    }

    /// A dispatcher with the default namespace.
    pub fn dispatcher(&self) -> TestDispatcher {
        Dispatcher::new(self.engine(), self.identity.clone(), DispatcherConfig::default())
    }

    /// Policy only this fixture's identity satisfies.
    pub fn owner_policy(&self) -> Vec<AccessCondition> {
        vec![AccessCondition::owner_only(&self.identity.address().to_hex(), "ethereum")]
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity whose secret key is `[seed; 32]`. `seed` must be non-zero.
pub fn seeded_identity(seed: u8) -> Identity {
    Identity::from_bytes(&[seed; 32]).expect("non-zero seed is a valid scalar")
}

/// Distinct deterministic identities for multi-party tests.
pub fn multi_party_identities(count: usize) -> Vec<Identity> {
    (0..count).map(|i| seeded_identity(i as u8 + 1)).collect()
}

/// Well-formed metadata that does not correspond to any real wrap.
pub fn sample_metadata() -> EncryptionMetadata {
    EncryptionMetadata {
        version: METADATA_VERSION.to_string(),
        wrapped_key: "AAECAwQFBgcICQoLDA0ODw==".to_string(),
        key_digest: "00".repeat(32),
        iv: Iv::from_bytes([0x24; 12]),
        cipher: CIPHER_ID.to_string(),
        access_policy: vec![AccessCondition::public("ethereum")],
        chain: "ethereum".to_string(),
        original_mime_type: Some("text/plain".to_string()),
        original_size: Some(13),
        original_digest: Some(Sha256Digest::hash(b"Hello, Haven!")),
        extensions: Default::default(),
    }
}

/// One request/response exchange.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// Notifications written before the response.
    pub notifications: Vec<Value>,
    pub response: Value,
}

impl Exchange {
    pub fn result(&self) -> Value {
        self.response["result"].clone()
    }

    pub fn error(&self) -> Value {
        self.response["error"].clone()
    }

    pub fn is_error(&self) -> bool {
        self.response.get("error").is_some()
    }

    /// Notifications with the given method name.
    pub fn notifications_named(&self, method: &str) -> Vec<&Value> {
        self.notifications
            .iter()
            .filter(|n| n["method"] == method)
            .collect()
    }
}

/// Drives a running server over in-process pipes.
pub struct RpcHarness {
    input: Option<DuplexStream>,
    output: LineReader<DuplexStream>,
    task: JoinHandle<haven_crypt_rpc::Result<ServerReport>>,
    next_id: i64,
    /// Parameters of the `ready` notification.
    pub ready: Value,
}

impl RpcHarness {
    /// Start a server around `dispatcher` and consume its `ready` line.
    pub async fn start(dispatcher: TestDispatcher) -> Self {
        Self::start_with(dispatcher, ServerConfig::default()).await
    }

    pub async fn start_with(dispatcher: TestDispatcher, config: ServerConfig) -> Self {
        let (input, server_in) = tokio::io::duplex(PIPE_CAPACITY);
        let (server_out, output) = tokio::io::duplex(PIPE_CAPACITY);

        let server = Server::new(dispatcher, config);
        let task = tokio::spawn(async move { server.run(server_in, server_out).await });

        let mut harness = Self {
            input: Some(input),
            output: LineReader::new(output, usize::MAX),
            task,
            next_id: 1,
            ready: Value::Null,
        };
        let ready = harness.next_message().await.expect("server sends ready");
        assert_eq!(ready["method"], "ready");
        harness.ready = ready["params"].clone();
        harness
    }

    /// Write a raw line (a newline is appended).
    pub async fn send_line(&mut self, line: &str) {
        let input = self.input.as_mut().expect("input open");
        input.write_all(line.as_bytes()).await.expect("write line");
        input.write_all(b"\n").await.expect("write newline");
    }

    /// Next message from the server, or `None` once output closes.
    pub async fn next_message(&mut self) -> Option<Value> {
        loop {
            let frame = tokio::time::timeout(READ_TIMEOUT, self.output.next_frame())
                .await
                .expect("server answered in time")
                .expect("read output");
            match frame? {
                Frame::Line(line) => return Some(serde_json::from_str(&line).expect("server writes JSON")),
                Frame::Oversized { .. } | Frame::InvalidUtf8 { .. } => continue,
            }
        }
    }

    /// Read until a message carrying `id` arrives.
    pub async fn response_for(&mut self, id: &Value) -> Exchange {
        let mut notifications = Vec::new();
        loop {
            let message = self.next_message().await.expect("response before close");
            if message.get("id") == Some(id) && message.get("method").is_none() {
                return Exchange {
                    notifications,
                    response: message,
                };
            }
            notifications.push(message);
        }
    }

    /// Send a request with the next numeric id and wait for its response.
    pub async fn call(&mut self, method: &str, params: Value) -> Exchange {
        let id = json!(self.next_id);
        self.next_id += 1;
        let request = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        self.send_line(&request.to_string()).await;
        self.response_for(&id).await
    }

    /// Send a notification (no response expected).
    pub async fn notify(&mut self, method: &str, params: Value) {
        let notification = json!({ "jsonrpc": "2.0", "method": method, "params": params });
        self.send_line(&notification.to_string()).await;
    }

    /// Close input and wait for the server to stop.
    pub async fn finish(mut self) -> ServerReport {
        drop(self.input.take());
        self.task
            .await
            .expect("server task completes")
            .expect("server exits cleanly")
    }
}
