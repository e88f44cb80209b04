//! Runtime configuration.
//!
//! Every setting has a command-line flag; the ones a host usually injects
//! also read from the environment.

use clap::{Parser, ValueEnum};
use std::fmt;
use std::time::Duration;

use haven_crypt_core::{CryptoError, Identity};
use haven_crypt_keywrap::{NetworkId, SignedChallengeAuthenticator};
use haven_crypt_rpc::{ServerConfig, DEFAULT_MAX_LINE_BYTES};

use crate::dispatch::DispatcherConfig;
use crate::engine::EngineConfig;

/// Network family selected when no explicit network is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NetworkMode {
    Mainnet,
    Testnet,
}

impl NetworkMode {
    pub fn default_network(self) -> &'static str {
        match self {
            NetworkMode::Mainnet => "datil",
            NetworkMode::Testnet => "datil-dev",
        }
    }
}

/// Command-line and environment settings for the daemon.
#[derive(Clone, Parser)]
#[command(name = "haven-crypt")]
#[command(version, about = "Hybrid encryption daemon speaking JSON-RPC over stdio", long_about = None)]
pub struct RuntimeConfig {
    /// Key-wrapping network; overrides --network-mode
    #[arg(long, env = "HAVEN_LIT_NETWORK")]
    pub network: Option<String>,

    #[arg(long, value_enum, env = "HAVEN_NETWORK_MODE", default_value_t = NetworkMode::Testnet)]
    pub network_mode: NetworkMode,

    /// Chain used when a request names none
    #[arg(long, env = "HAVEN_CHAIN", default_value = "ethereum")]
    pub chain: String,

    /// Method namespace (`<namespace>.encrypt`, ...)
    #[arg(long, default_value = "lit")]
    pub namespace: String,

    /// Hex secp256k1 key; a random identity is generated when absent
    #[arg(long, env = "HAVEN_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    #[arg(long, default_value = "localhost")]
    pub auth_domain: String,

    #[arg(long, default_value_t = 600)]
    pub proof_ttl_secs: u64,

    #[arg(long, default_value_t = 86_400)]
    pub session_ttl_secs: u64,

    #[arg(long, default_value_t = DEFAULT_MAX_LINE_BYTES)]
    pub max_line_bytes: usize,

    /// Log filter directives (stderr)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,
}

impl RuntimeConfig {
    pub fn network_id(&self) -> NetworkId {
        match &self.network {
            Some(network) => NetworkId::new(network.clone()),
            None => NetworkId::from(self.network_mode.default_network()),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            network: self.network_id(),
            chain: self.chain.clone(),
            session_ttl: Duration::from_secs(self.session_ttl_secs),
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            namespace: self.namespace.clone(),
            ..DispatcherConfig::default()
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            max_line_bytes: self.max_line_bytes,
        }
    }

    pub fn authenticator(&self) -> SignedChallengeAuthenticator {
        SignedChallengeAuthenticator::new(self.auth_domain.clone(), Duration::from_secs(self.proof_ttl_secs))
    }

    /// The configured identity, or a fresh one.
    pub fn identity(&self) -> Result<Identity, CryptoError> {
        match &self.private_key {
            Some(key) => Identity::from_private_key_hex(key),
            None => Ok(Identity::generate()),
        }
    }
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("network", &self.network)
            .field("network_mode", &self.network_mode)
            .field("chain", &self.chain)
            .field("namespace", &self.namespace)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("auth_domain", &self.auth_domain)
            .field("proof_ttl_secs", &self.proof_ttl_secs)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("max_line_bytes", &self.max_line_bytes)
            .field("log_filter", &self.log_filter)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> RuntimeConfig {
        let mut argv = vec!["haven-crypt"];
        argv.extend_from_slice(args);
        RuntimeConfig::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_network_selection() {
        assert_eq!(parse(&["--network", "naga"]).network_id(), NetworkId::from("naga"));
        assert_eq!(
            parse(&["--network", "naga", "--network-mode", "mainnet"]).network_id(),
            NetworkId::from("naga")
        );
        assert_eq!(parse(&["--network-mode", "mainnet"]).network_id(), NetworkId::from("datil"));
    }

    #[test]
    fn test_derived_configs() {
        let config = parse(&["--namespace", "vault", "--session-ttl-secs", "60", "--max-line-bytes", "1024"]);

        assert_eq!(config.dispatcher_config().namespace, "vault");
        assert_eq!(config.engine_config().session_ttl, Duration::from_secs(60));
        assert_eq!(config.server_config().max_line_bytes, 1024);
        assert_eq!(config.authenticator().ttl, Duration::from_secs(600));
    }

    #[test]
    fn test_identity_from_key() {
        let key = format!("0x{}", "00".repeat(31) + "01");
        let config = parse(&["--private-key", &key]);

        assert_eq!(
            config.identity().unwrap().address().to_hex(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
        assert!(!format!("{config:?}").contains(&key));
    }

    #[test]
    fn test_bad_key_rejected() {
        assert!(parse(&["--private-key", "zz"]).identity().is_err());
    }
}
