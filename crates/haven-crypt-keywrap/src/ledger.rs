//! In-memory chain state for evaluating access conditions.

use std::collections::HashMap;

use haven_crypt_core::{AccessCondition, Address, Comparator, USER_ADDRESS};
use tracing::warn;

/// Token and native balances, keyed by lowercase contract address and holder.
#[derive(Debug, Default, Clone)]
pub struct Ledger {
    tokens: HashMap<(String, Address), u128>,
    native: HashMap<Address, u128>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `holder`'s balance of the token at `contract`.
    pub fn set_token_balance(&mut self, contract: &str, holder: Address, amount: u128) {
        self.tokens.insert((contract.to_lowercase(), holder), amount);
    }

    /// Set `holder`'s native balance.
    pub fn set_native_balance(&mut self, holder: Address, amount: u128) {
        self.native.insert(holder, amount);
    }

    pub fn token_balance(&self, contract: &str, holder: &Address) -> u128 {
        self.tokens
            .get(&(contract.to_lowercase(), *holder))
            .copied()
            .unwrap_or(0)
    }

    pub fn native_balance(&self, holder: &Address) -> u128 {
        self.native.get(holder).copied().unwrap_or(0)
    }

    /// Evaluate one condition for `caller`.
    pub fn evaluate(&self, condition: &AccessCondition, caller: &Address) -> bool {
        let test = &condition.return_value_test;
        match condition.method.as_str() {
            "" => {
                let actual = if condition.parameters.iter().any(|p| p == USER_ADDRESS) {
                    caller.to_hex()
                } else {
                    "true".to_string()
                };
                compare_text(test.comparator, &actual, &test.value.to_lowercase())
            }
            "balanceOf" => {
                let balance = self.token_balance(&condition.contract_address, caller);
                compare_amount(test.comparator, balance, &test.value)
            }
            "eth_getBalance" => {
                let balance = self.native_balance(caller);
                compare_amount(test.comparator, balance, &test.value)
            }
            other => {
                warn!(method = other, "unsupported condition method");
                false
            }
        }
    }

    /// Evaluate the conjunction of `conditions` for `caller`.
    pub fn satisfies(&self, conditions: &[&AccessCondition], caller: &Address) -> bool {
        conditions.iter().all(|c| self.evaluate(c, caller))
    }
}

fn compare_text(comparator: Comparator, actual: &str, expected: &str) -> bool {
    match comparator {
        Comparator::Eq => actual == expected,
        Comparator::Ne => actual != expected,
        Comparator::Contains => actual.contains(expected),
        _ => false,
    }
}

fn compare_amount(comparator: Comparator, actual: u128, expected: &str) -> bool {
    match expected.trim().parse::<u128>() {
        Ok(expected) => comparator.compare(&actual, &expected),
        Err(_) => false,
    }
}
