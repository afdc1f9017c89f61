//! chain and pool configuration
//!
//! explicit, validated descriptors instead of point-of-use field checks:
//! every entry point that consumes a descriptor calls `validate()` first
//! and fails fast on a malformed config.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Result, VeilError};

/// one deployed pool (one asset on one chain)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolDescriptor {
    pub chain_id: u64,
    pub pool_address: Address,
    /// entry-point contract withdrawals are processed through
    pub entry_point: Address,
    pub asset_address: Address,
    pub asset: String,
    pub asset_decimals: u8,
    /// domain-separation tag for all secrets and trees of this pool,
    /// fetched from the deployed contract
    pub scope: U256,
    pub deployment_block: u64,
    pub max_deposit: U256,
}

impl PoolDescriptor {
    pub fn validate(&self) -> Result<()> {
        if self.scope.is_zero() {
            return Err(VeilError::InvalidConfig(format!(
                "pool {}: zero scope",
                self.pool_address
            )));
        }
        if self.max_deposit.is_zero() {
            return Err(VeilError::InvalidConfig(format!(
                "pool {}: zero max deposit",
                self.pool_address
            )));
        }
        if self.asset.is_empty() {
            return Err(VeilError::InvalidConfig(format!(
                "pool {}: empty asset symbol",
                self.pool_address
            )));
        }
        if self.asset_decimals > 36 {
            return Err(VeilError::InvalidConfig(format!(
                "pool {}: implausible asset decimals {}",
                self.pool_address, self.asset_decimals
            )));
        }
        Ok(())
    }
}

/// relayer endpoint offered to the user
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayerEndpoint {
    pub name: String,
    pub url: String,
}

/// everything the engine needs to know about one chain
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: String,
    pub asp_url: String,
    pub relayers: Vec<RelayerEndpoint>,
    pub pools: Vec<PoolDescriptor>,
}

impl ChainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() {
            return Err(VeilError::InvalidConfig(format!(
                "chain {}: empty rpc url",
                self.chain_id
            )));
        }
        if self.asp_url.is_empty() {
            return Err(VeilError::InvalidConfig(format!(
                "chain {}: empty asp url",
                self.chain_id
            )));
        }
        let mut scopes = HashSet::new();
        for pool in &self.pools {
            pool.validate()?;
            if pool.chain_id != self.chain_id {
                return Err(VeilError::InvalidConfig(format!(
                    "pool {} declares chain {} inside chain {} config",
                    pool.pool_address, pool.chain_id, self.chain_id
                )));
            }
            if !scopes.insert(pool.scope) {
                return Err(VeilError::InvalidConfig(format!(
                    "duplicate scope {} on chain {}",
                    pool.scope, self.chain_id
                )));
            }
        }
        Ok(())
    }

    pub fn pool_by_scope(&self, scope: U256) -> Option<&PoolDescriptor> {
        self.pools.iter().find(|p| p.scope == scope)
    }
}

#[cfg(feature = "client")]
impl ChainConfig {
    /// parse and validate a config document
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| VeilError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// parse a decimal token amount ("1.5") into its smallest unit
pub fn parse_units(amount: &str, decimals: u8) -> Result<U256> {
    let amount = amount.trim();
    let (whole, frac) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(VeilError::InvalidConfig(format!("invalid amount {amount:?}")));
    }
    if frac.len() > decimals as usize {
        return Err(VeilError::InvalidConfig(format!(
            "amount {amount:?} has more than {decimals} decimal places"
        )));
    }
    let mut digits = String::with_capacity(whole.len() + decimals as usize);
    digits.push_str(if whole.is_empty() { "0" } else { whole });
    digits.push_str(frac);
    for _ in frac.len()..decimals as usize {
        digits.push('0');
    }
    U256::from_str_radix(&digits, 10)
        .map_err(|_| VeilError::InvalidConfig(format!("invalid amount {amount:?}")))
}

/// format a smallest-unit amount as a decimal token string
pub fn format_units(value: U256, decimals: u8) -> String {
    let base = U256::from(10u64).pow(U256::from(decimals));
    let whole = value / base;
    let frac = value % base;
    if frac.is_zero() {
        return whole.to_string();
    }
    let frac = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}


#[cfg(test)]
mod tests {
    use super::testing::pool;
    use super::*;

    fn chain() -> ChainConfig {
        ChainConfig {
            chain_id: 1,
            name: "mainnet".into(),
            rpc_url: "http://localhost:8545".into(),
            asp_url: "http://localhost:3001".into(),
            relayers: vec![RelayerEndpoint {
                name: "fast".into(),
                url: "http://localhost:3000".into(),
            }],
            pools: vec![pool(1, 7)],
        }
    }

    #[test]
    fn valid_config_passes() {
        chain().validate().unwrap();
    }

    #[test]
    fn zero_scope_rejected() {
        let mut config = chain();
        config.pools[0].scope = U256::ZERO;
        assert!(matches!(config.validate(), Err(VeilError::InvalidConfig(_))));
    }

    #[test]
    fn duplicate_scope_rejected() {
        let mut config = chain();
        config.pools.push(pool(1, 7));
        assert!(matches!(config.validate(), Err(VeilError::InvalidConfig(_))));
    }

    #[test]
    fn cross_chain_pool_rejected() {
        let mut config = chain();
        config.pools.push(pool(5, 9));
        assert!(matches!(config.validate(), Err(VeilError::InvalidConfig(_))));
    }

    #[test]
    fn units_round_trip() {
        let wei = parse_units("1.5", 18).unwrap();
        assert_eq!(wei, U256::from(1_500_000_000_000_000_000u64));
        assert_eq!(format_units(wei, 18), "1.5");
        assert_eq!(parse_units("0.000000000000000001", 18).unwrap(), U256::from(1u64));
        assert_eq!(format_units(U256::from(1000u64), 0), "1000");
    }

    #[test]
    fn too_many_decimal_places_rejected() {
        assert!(parse_units("1.23", 1).is_err());
        assert!(parse_units(".", 18).is_err());
    }
}
