//! Method routing for the control protocol.
//!
//! Core methods (`ping`, `getStatus`, `shutdown`) are unscoped. Everything
//! else lives under a configurable namespace, e.g. `lit.encrypt`. Long
//! operations stream progress as `<namespace>.encryptProgress` and
//! `<namespace>.decryptProgress` notifications before their response.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

use haven_crypt_core::{
    canonical_value, decode_metadata, metadata_from_value, AccessCondition, AccessPattern, Identity,
    TokenStandard, ValidationError,
};
use haven_crypt_keywrap::{Authenticator, KeyWrapClient, NetworkId};
use haven_crypt_rpc::{CallContext, Handler, RpcError};

use crate::engine::{EncryptOptions, HybridEngine};
use crate::error::EngineError;
use crate::progress::{self, ProgressStream};

/// Crate version reported by `ready` and `getStatus`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default method namespace.
pub const DEFAULT_NAMESPACE: &str = "lit";

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub namespace: String,
    pub version: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            version: VERSION.to_string(),
        }
    }
}

// ========== Parameters ==========

/// Policy selection shared by `encrypt` and `encryptFile`.
///
/// Explicit `accessControlConditions` win. Otherwise a preset is built from
/// `accessPattern` (default owner-only).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PolicyParams {
    access_control_conditions: Option<Vec<AccessCondition>>,
    access_pattern: Option<String>,
    contract_address: Option<String>,
    token_standard: Option<String>,
    min_balance: Option<u64>,
    chain: Option<String>,
    mime_type: Option<String>,
}

impl PolicyParams {
    fn resolve(&self, identity: &Identity, chain: &str) -> Result<Vec<AccessCondition>, ValidationError> {
        if let Some(conditions) = &self.access_control_conditions {
            return Ok(conditions.clone());
        }

        let pattern = match &self.access_pattern {
            Some(pattern) => pattern.parse()?,
            None => AccessPattern::default(),
        };
        let condition = match pattern {
            AccessPattern::OwnerOnly => AccessCondition::owner_only(&identity.address().to_hex(), chain),
            AccessPattern::Public => AccessCondition::public(chain),
            AccessPattern::NftGated => AccessCondition::token_holder(self.contract()?, TokenStandard::Erc721, chain),
            AccessPattern::TokenGated => {
                let standard = self
                    .token_standard
                    .as_deref()
                    .map(str::parse::<TokenStandard>)
                    .transpose()?
                    .unwrap_or(TokenStandard::Erc20);
                let min = u128::from(self.min_balance.unwrap_or(1));
                AccessCondition::min_balance(self.contract()?, standard, chain, min)
            }
        };
        Ok(vec![condition])
    }

    fn contract(&self) -> Result<&str, ValidationError> {
        self.contract_address
            .as_deref()
            .ok_or_else(|| ValidationError::MissingField("contractAddress".to_string()))
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConnectParams {
    network: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EncryptParams {
    data: String,
    #[serde(flatten)]
    policy: PolicyParams,
}

#[derive(Debug, Deserialize)]
struct DecryptParams {
    ciphertext: String,
    /// Metadata object, or its JSON text.
    metadata: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncryptFileParams {
    input_path: PathBuf,
    output_path: Option<PathBuf>,
    #[serde(flatten)]
    policy: PolicyParams,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecryptFileParams {
    input_path: PathBuf,
    output_path: Option<PathBuf>,
    metadata_path: Option<PathBuf>,
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).map_err(|e| RpcError::InvalidParams(e.to_string()))
}

fn decode_base64(field: &str, text: &str) -> Result<Vec<u8>, EngineError> {
    BASE64
        .decode(text)
        .map_err(|e| ValidationError::invalid(field, format!("invalid base64: {e}")).into())
}

async fn forward_progress(ctx: &CallContext, method: &str, mut stream: ProgressStream) {
    while let Some(event) = stream.next().await {
        let Ok(params) = serde_json::to_value(&event) else {
            continue;
        };
        if let Err(e) = ctx.notify(method, params).await {
            debug!(method, error = %e, "dropping progress notification");
        }
    }
}

// ========== Dispatcher ==========

/// Routes control-protocol methods onto a [`HybridEngine`].
pub struct Dispatcher<C, A> {
    engine: HybridEngine<C, A>,
    identity: Identity,
    config: DispatcherConfig,
    started: Instant,
}

impl<C: KeyWrapClient, A: Authenticator> Dispatcher<C, A> {
    pub fn new(engine: HybridEngine<C, A>, identity: Identity, config: DispatcherConfig) -> Self {
        info!(address = %identity.address(), namespace = %config.namespace, "dispatcher ready");
        Self {
            engine,
            identity,
            config,
            started: Instant::now(),
        }
    }

    pub fn engine(&self) -> &HybridEngine<C, A> {
        &self.engine
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// `lit.encrypt` -> `encrypt` when the namespace is `lit`.
    fn scoped<'m>(&self, method: &'m str) -> Option<&'m str> {
        method.strip_prefix(self.config.namespace.as_str())?.strip_prefix('.')
    }

    fn progress_method(&self, name: &str) -> String {
        format!("{}.{name}", self.config.namespace)
    }

    async fn status(&self) -> Value {
        let state = self.engine.state().await;
        let network = state.network.unwrap_or_else(|| self.engine.config().network.clone());
        json!({
            "version": self.config.version,
            "uptimeSeconds": self.started.elapsed().as_secs(),
            "litConnected": state.connected,
            "network": network,
        })
    }

    async fn connect(&self, params: Value) -> Result<Value, RpcError> {
        let params: ConnectParams = parse_params(params)?;
        let network = params.network.map(NetworkId::new);
        let state = self.engine.connect(network.as_ref()).await?;
        Ok(serde_json::to_value(state)?)
    }

    async fn session(&self) -> Result<Value, RpcError> {
        let mut value = serde_json::to_value(self.engine.state().await)?;
        value["address"] = json!(self.identity.address());
        Ok(value)
    }

    async fn encrypt(&self, params: Value, ctx: &CallContext) -> Result<Value, RpcError> {
        let params: EncryptParams = parse_params(params)?;
        let data = decode_base64("data", &params.data)?;
        let chain = params
            .policy
            .chain
            .clone()
            .unwrap_or_else(|| self.engine.config().chain.clone());
        let policy = params.policy.resolve(&self.identity, &chain).map_err(EngineError::from)?;
        let options = EncryptOptions {
            chain: Some(chain),
            mime_type: params.policy.mime_type,
        };

        let method = self.progress_method("encryptProgress");
        let (sink, stream) = progress::channel();
        let operation = async move {
            let result = self
                .engine
                .encrypt(&data, &self.identity, &policy, &options, Some(&sink))
                .await;
            drop(sink);
            result
        };
        let (result, ()) = tokio::join!(operation, forward_progress(ctx, &method, stream));
        let encrypted = result?;

        Ok(json!({
            "ciphertext": BASE64.encode(&encrypted.ciphertext),
            "dataToEncryptHash": encrypted.data_hash.to_hex(),
            "accessControlConditionHash": encrypted.policy_hash,
            "metadata": canonical_value(&encrypted.metadata).map_err(EngineError::from)?,
        }))
    }

    async fn decrypt(&self, params: Value, ctx: &CallContext) -> Result<Value, RpcError> {
        let params: DecryptParams = parse_params(params)?;
        let ciphertext = decode_base64("ciphertext", &params.ciphertext)?;
        let metadata = match params.metadata {
            Value::String(text) => decode_metadata(&text),
            other => metadata_from_value(other),
        }
        .map_err(EngineError::from)?;

        let method = self.progress_method("decryptProgress");
        let (sink, stream) = progress::channel();
        let operation = async move {
            let result = self
                .engine
                .decrypt(&ciphertext, &metadata, &self.identity, Some(&sink))
                .await;
            drop(sink);
            result
        };
        let (result, ()) = tokio::join!(operation, forward_progress(ctx, &method, stream));
        let plaintext = result?;

        Ok(json!({ "decryptedData": BASE64.encode(&plaintext) }))
    }

    async fn encrypt_file(&self, params: Value, ctx: &CallContext) -> Result<Value, RpcError> {
        let params: EncryptFileParams = parse_params(params)?;
        let chain = params
            .policy
            .chain
            .clone()
            .unwrap_or_else(|| self.engine.config().chain.clone());
        let policy = params.policy.resolve(&self.identity, &chain).map_err(EngineError::from)?;
        let options = EncryptOptions {
            chain: Some(chain),
            mime_type: params.policy.mime_type,
        };

        let (input_path, output_path) = (params.input_path, params.output_path);

        let method = self.progress_method("encryptProgress");
        let (sink, stream) = progress::channel();
        let operation = async move {
            let result = self
                .engine
                .encrypt_file(
                    &input_path,
                    output_path.as_deref(),
                    &self.identity,
                    &policy,
                    &options,
                    Some(&sink),
                )
                .await;
            drop(sink);
            result
        };
        let (result, ()) = tokio::join!(operation, forward_progress(ctx, &method, stream));
        let encrypted = result?;

        Ok(json!({
            "ciphertextPath": encrypted.ciphertext_path.to_string_lossy(),
            "metadataPath": encrypted.metadata_path.to_string_lossy(),
            "dataToEncryptHash": encrypted.data_hash.to_hex(),
            "accessControlConditionHash": encrypted.policy_hash,
            "originalSize": encrypted.original_size,
        }))
    }

    async fn decrypt_file(&self, params: Value, ctx: &CallContext) -> Result<Value, RpcError> {
        let params: DecryptFileParams = parse_params(params)?;

        let method = self.progress_method("decryptProgress");
        let (sink, stream) = progress::channel();
        let operation = async move {
            let result = self
                .engine
                .decrypt_file(
                    &params.input_path,
                    params.output_path.as_deref(),
                    params.metadata_path.as_deref(),
                    &self.identity,
                    Some(&sink),
                )
                .await;
            drop(sink);
            result
        };
        let (result, ()) = tokio::join!(operation, forward_progress(ctx, &method, stream));
        let decrypted = result?;

        Ok(json!({
            "outputPath": decrypted.output_path.to_string_lossy(),
            "size": decrypted.size,
        }))
    }
}

#[async_trait]
impl<C: KeyWrapClient, A: Authenticator> Handler for Dispatcher<C, A> {
    async fn handle(&self, method: &str, params: Value, ctx: &CallContext) -> Result<Value, RpcError> {
        match method {
            "ping" => return Ok(json!("pong")),
            "getStatus" => return Ok(self.status().await),
            "shutdown" => {
                info!("shutdown requested");
                self.engine.disconnect().await;
                ctx.request_shutdown();
                return Ok(json!(true));
            }
            _ => {}
        }

        match self.scoped(method) {
            Some("connect") => self.connect(params).await,
            Some("disconnect") => Ok(serde_json::to_value(self.engine.disconnect().await)?),
            Some("getSession") => self.session().await,
            Some("encrypt") => self.encrypt(params, ctx).await,
            Some("decrypt") => self.decrypt(params, ctx).await,
            Some("encryptFile") => self.encrypt_file(params, ctx).await,
            Some("decryptFile") => self.decrypt_file(params, ctx).await,
            _ => Err(RpcError::MethodNotFound(method.to_string())),
        }
    }

    fn ready(&self) -> Option<Value> {
        Some(json!({
            "version": self.config.version,
            "namespace": self.config.namespace,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haven_crypt_core::{Comparator, USER_ADDRESS};

    fn params(value: Value) -> PolicyParams {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_default_policy_is_owner_only() {
        let identity = Identity::generate();
        let policy = params(json!({})).resolve(&identity, "ethereum").unwrap();

        assert_eq!(policy.len(), 1);
        assert_eq!(policy[0].parameters, vec![USER_ADDRESS.to_string()]);
        assert_eq!(policy[0].return_value_test.value, identity.address().to_hex());
    }

    #[test]
    fn test_explicit_empty_list_is_kept() {
        let identity = Identity::generate();
        let policy = params(json!({ "accessControlConditions": [] }))
            .resolve(&identity, "ethereum")
            .unwrap();
        assert!(policy.is_empty());
    }

    #[test]
    fn test_token_gated_preset() {
        let identity = Identity::generate();
        let policy = params(json!({
            "accessPattern": "token_gated",
            "contractAddress": "0xabc",
            "minBalance": 5,
        }))
        .resolve(&identity, "polygon")
        .unwrap();

        assert_eq!(policy[0].method, "balanceOf");
        assert_eq!(policy[0].chain, "polygon");
        assert_eq!(policy[0].return_value_test.comparator, Comparator::Ge);
        assert_eq!(policy[0].return_value_test.value, "5");
    }

    #[test]
    fn test_gated_preset_needs_contract() {
        let identity = Identity::generate();
        let err = params(json!({ "accessPattern": "nft_gated" }))
            .resolve(&identity, "ethereum")
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingField("contractAddress".to_string()));
    }

    #[test]
    fn test_unknown_pattern() {
        let identity = Identity::generate();
        let err = params(json!({ "accessPattern": "friends" }))
            .resolve(&identity, "ethereum")
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidField { .. }));
    }

    #[test]
    fn test_missing_params_are_invalid() {
        let err = parse_params::<EncryptParams>(Value::Null).unwrap_err();
        assert_eq!(err.code(), -32602);
    }

    #[test]
    fn test_bad_base64() {
        let err = decode_base64("data", "!!!").unwrap_err();
        assert_eq!(err.reason(), "InvalidField");
    }
}
