//! Access policy model.
//!
//! A policy is an ordered list of [`AccessCondition`]s, read as their
//! conjunction. Before a policy crosses to the key-wrapping network it is
//! canonicalized: each condition is tagged with its condition family so the
//! wire format is self-describing.
//!
//! [`policy_digest`] is for traceability only. It is not a security boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::canonical::canonical_json;
use crate::error::{Result, ValidationError};
use crate::types::Sha256Digest;

/// Parameter placeholder replaced by the authenticated caller's address.
pub const USER_ADDRESS: &str = ":userAddress";

/// Comparator used by a [`ReturnValueTest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "contains")]
    Contains,
}

impl Comparator {
    /// Apply to an ordered pair of values.
    pub fn compare<T: PartialOrd>(&self, actual: &T, expected: &T) -> bool {
        match self {
            Comparator::Eq => actual == expected,
            Comparator::Ne => actual != expected,
            Comparator::Gt => actual > expected,
            Comparator::Ge => actual >= expected,
            Comparator::Lt => actual < expected,
            Comparator::Le => actual <= expected,
            Comparator::Contains => false,
        }
    }
}

/// Test applied to the value returned by a condition's method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReturnValueTest {
    pub comparator: Comparator,
    pub value: String,
}

/// One clause of an access policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCondition {
    /// Target contract; empty for identity checks.
    #[serde(default)]
    pub contract_address: String,

    /// Declared contract standard (`ERC20`, `ERC721`, ...); empty for identity checks.
    #[serde(default)]
    pub standard_contract_type: String,

    /// Chain the condition is evaluated against.
    pub chain: String,

    /// Method to invoke; empty string denotes an identity/ownership check.
    #[serde(default)]
    pub method: String,

    /// Ordered parameters, possibly containing placeholders such as `:userAddress`.
    #[serde(default)]
    pub parameters: Vec<String>,

    pub return_value_test: ReturnValueTest,
}

impl AccessCondition {
    /// Only `address` may satisfy this condition.
    pub fn owner_only(address: &str, chain: &str) -> Self {
        Self {
            contract_address: String::new(),
            standard_contract_type: String::new(),
            chain: chain.to_string(),
            method: String::new(),
            parameters: vec![USER_ADDRESS.to_string()],
            return_value_test: ReturnValueTest {
                comparator: Comparator::Eq,
                value: address.to_lowercase(),
            },
        }
    }

    /// Any authenticated identity satisfies this condition.
    pub fn public(chain: &str) -> Self {
        Self {
            contract_address: String::new(),
            standard_contract_type: String::new(),
            chain: chain.to_string(),
            method: String::new(),
            parameters: Vec::new(),
            return_value_test: ReturnValueTest {
                comparator: Comparator::Eq,
                value: "true".to_string(),
            },
        }
    }

    /// Holders of a token (`balanceOf(:userAddress) > 0`).
    pub fn token_holder(contract: &str, standard: TokenStandard, chain: &str) -> Self {
        Self::balance_test(contract, standard, chain, Comparator::Gt, "0")
    }

    /// Holders of at least `min_balance` tokens.
    pub fn min_balance(contract: &str, standard: TokenStandard, chain: &str, min_balance: u128) -> Self {
        Self::balance_test(contract, standard, chain, Comparator::Ge, &min_balance.to_string())
    }

    fn balance_test(
        contract: &str,
        standard: TokenStandard,
        chain: &str,
        comparator: Comparator,
        value: &str,
    ) -> Self {
        Self {
            contract_address: contract.to_string(),
            standard_contract_type: standard.to_string(),
            chain: chain.to_string(),
            method: "balanceOf".to_string(),
            parameters: vec![USER_ADDRESS.to_string()],
            return_value_test: ReturnValueTest {
                comparator,
                value: value.to_string(),
            },
        }
    }

    /// True if this is an identity check (no contract call).
    pub fn is_identity_check(&self) -> bool {
        self.method.is_empty()
    }
}

/// Token standards understood by the gated presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenStandard {
    Erc20,
    Erc721,
}

impl fmt::Display for TokenStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenStandard::Erc20 => f.write_str("ERC20"),
            TokenStandard::Erc721 => f.write_str("ERC721"),
        }
    }
}

impl FromStr for TokenStandard {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ERC20" => Ok(TokenStandard::Erc20),
            "ERC721" => Ok(TokenStandard::Erc721),
            other => Err(ValidationError::invalid(
                "tokenStandard",
                format!("unsupported token standard: {other}"),
            )),
        }
    }
}

/// Named policy presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessPattern {
    /// Only the encrypting identity may decrypt.
    #[default]
    OwnerOnly,
    /// ERC721 holders of a contract.
    NftGated,
    /// Token holders above a minimum balance.
    TokenGated,
    /// Any authenticated identity.
    Public,
}

impl FromStr for AccessPattern {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "owner_only" => Ok(AccessPattern::OwnerOnly),
            "nft_gated" => Ok(AccessPattern::NftGated),
            "token_gated" => Ok(AccessPattern::TokenGated),
            "public" => Ok(AccessPattern::Public),
            other => Err(ValidationError::invalid(
                "accessPattern",
                format!("unknown access pattern: {other}"),
            )),
        }
    }
}

/// A canonicalized condition, tagged with its condition family.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "conditionType")]
pub enum PolicyClause {
    /// Basic EVM contract-call condition.
    #[serde(rename = "evmBasic")]
    EvmBasic(AccessCondition),
}

impl PolicyClause {
    /// The underlying condition.
    pub fn condition(&self) -> &AccessCondition {
        match self {
            PolicyClause::EvmBasic(condition) => condition,
        }
    }
}

/// Tag each condition so the wire format is self-describing.
pub fn canonicalize(conditions: &[AccessCondition]) -> Vec<PolicyClause> {
    conditions.iter().cloned().map(PolicyClause::EvmBasic).collect()
}

/// Hex SHA-256 over the canonical JSON of the tagged condition list.
pub fn policy_digest(conditions: &[AccessCondition]) -> Result<String> {
    clause_digest(&canonicalize(conditions))
}

/// Same digest as [`policy_digest`], for an already tagged list.
pub fn clause_digest(clauses: &[PolicyClause]) -> Result<String> {
    let text = canonical_json(clauses)?;
    Ok(Sha256Digest::hash(text.as_bytes()).to_hex())
}

/// Reject policies that cannot gate anything.
pub fn ensure_non_empty(conditions: &[AccessCondition]) -> std::result::Result<(), ValidationError> {
    if conditions.is_empty() {
        return Err(ValidationError::EmptyPolicy);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const OWNER: &str = "0x742d35cc6634c0532925a3b844bc9e7595f0beb0";

    #[test]
    fn test_owner_only_shape() {
        let condition = AccessCondition::owner_only(OWNER, "ethereum");
        let value = serde_json::to_value(&condition).unwrap();

        assert_eq!(
            value,
            json!({
                "contractAddress": "",
                "standardContractType": "",
                "chain": "ethereum",
                "method": "",
                "parameters": [":userAddress"],
                "returnValueTest": { "comparator": "=", "value": OWNER },
            })
        );
    }

    #[test]
    fn test_owner_only_lowercases_address() {
        let condition = AccessCondition::owner_only("0xABCDEF", "ethereum");
        assert_eq!(condition.return_value_test.value, "0xabcdef");
    }

    #[test]
    fn test_token_holder_preset() {
        let condition = AccessCondition::token_holder("0xc0ffee", TokenStandard::Erc721, "ethereum");
        assert_eq!(condition.method, "balanceOf");
        assert_eq!(condition.standard_contract_type, "ERC721");
        assert_eq!(condition.return_value_test.comparator, Comparator::Gt);
        assert_eq!(condition.return_value_test.value, "0");
    }

    #[test]
    fn test_min_balance_preset() {
        let condition = AccessCondition::min_balance("0xc0ffee", TokenStandard::Erc20, "ethereum", 5);
        assert_eq!(condition.return_value_test.comparator, Comparator::Ge);
        assert_eq!(condition.return_value_test.value, "5");
    }

    #[test]
    fn test_canonicalize_tags_each_condition() {
        let policy = vec![
            AccessCondition::owner_only(OWNER, "ethereum"),
            AccessCondition::public("ethereum"),
        ];
        let tagged = canonicalize(&policy);
        let value = serde_json::to_value(&tagged).unwrap();

        assert_eq!(tagged.len(), 2);
        assert_eq!(value[0]["conditionType"], "evmBasic");
        assert_eq!(value[1]["conditionType"], "evmBasic");
        assert_eq!(tagged[0].condition(), &policy[0]);
    }

    #[test]
    fn test_tagged_clause_deserializes() {
        let value = json!({
            "conditionType": "evmBasic",
            "contractAddress": "",
            "standardContractType": "",
            "chain": "ethereum",
            "method": "",
            "parameters": [],
            "returnValueTest": { "comparator": "=", "value": "true" },
        });
        let clause: PolicyClause = serde_json::from_value(value).unwrap();
        assert_eq!(clause.condition(), &AccessCondition::public("ethereum"));
    }

    #[test]
    fn test_digest_is_stable_and_order_sensitive() {
        let a = AccessCondition::owner_only(OWNER, "ethereum");
        let b = AccessCondition::public("ethereum");

        let d1 = policy_digest(&[a.clone(), b.clone()]).unwrap();
        let d2 = policy_digest(&[a.clone(), b.clone()]).unwrap();
        let d3 = policy_digest(&[b, a]).unwrap();

        assert_eq!(d1, d2);
        assert_ne!(d1, d3);
        assert_eq!(d1.len(), 64);
    }

    #[test]
    fn test_digest_ignores_source_key_order() {
        let a: AccessCondition = serde_json::from_str(
            r#"{"chain":"ethereum","method":"","parameters":[],"contractAddress":"","standardContractType":"","returnValueTest":{"value":"true","comparator":"="}}"#,
        )
        .unwrap();
        let b = AccessCondition::public("ethereum");

        assert_eq!(policy_digest(&[a]).unwrap(), policy_digest(&[b]).unwrap());
    }

    #[test]
    fn test_access_pattern_parse() {
        assert_eq!("owner_only".parse::<AccessPattern>().unwrap(), AccessPattern::OwnerOnly);
        assert_eq!("nft_gated".parse::<AccessPattern>().unwrap(), AccessPattern::NftGated);
        assert_eq!("token_gated".parse::<AccessPattern>().unwrap(), AccessPattern::TokenGated);
        assert_eq!("public".parse::<AccessPattern>().unwrap(), AccessPattern::Public);
        assert!(matches!(
            "everyone".parse::<AccessPattern>(),
            Err(ValidationError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_comparator_wire_names() {
        let names: Vec<String> = [
            Comparator::Eq,
            Comparator::Ne,
            Comparator::Gt,
            Comparator::Ge,
            Comparator::Lt,
            Comparator::Le,
            Comparator::Contains,
        ]
        .iter()
        .map(|c| serde_json::to_value(c).unwrap().as_str().unwrap().to_string())
        .collect();

        assert_eq!(names, vec!["=", "!=", ">", ">=", "<", "<=", "contains"]);
    }

    #[test]
    fn test_empty_policy_rejected() {
        assert_eq!(ensure_non_empty(&[]), Err(ValidationError::EmptyPolicy));
        assert!(ensure_non_empty(&[AccessCondition::public("ethereum")]).is_ok());
    }
}
