use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::gate::{FundingPolicy, DEFAULT_MINIMUM_USD};
use crate::ledger::Address;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("network {0:?} is not configured")]
    UnknownNetwork(String),
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PolicyConfig {
    pub minimum_usd: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            minimum_usd: DEFAULT_MINIMUM_USD,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MockConfig {
    pub decimals: u8,
    pub initial_answer: i128,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            decimals: 8,
            initial_answer: 2_000_0000_0000,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AccountsConfig {
    pub count: usize,
    pub balance: u64,
    pub seed: u64,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            count: 20,
            balance: 10_000,
            seed: 0,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    pub chain_id: Option<u64>,
    pub eth_usd_price_feed: Option<Address>,
    pub block_confirmations: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub policy: PolicyConfig,
    pub mock: MockConfig,
    pub accounts: AccountsConfig,
    pub development_chains: Vec<String>,
    pub networks: BTreeMap<String, NetworkConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let mut networks = BTreeMap::new();
        networks.insert("localhost".to_string(), NetworkConfig::default());
        networks.insert(
            "hardhat".to_string(),
            NetworkConfig {
                chain_id: Some(31_337),
                ..NetworkConfig::default()
            },
        );
        networks.insert(
            "sepolia".to_string(),
            NetworkConfig {
                chain_id: Some(0xaa36a7),
                eth_usd_price_feed: Some(address_literal(
                    "694aa1769357215de4fac081bf1f309adc325306",
                )),
                block_confirmations: Some(6),
            },
        );
        networks.insert(
            "polygon".to_string(),
            NetworkConfig {
                chain_id: Some(137),
                eth_usd_price_feed: Some(address_literal(
                    "f9680d99d6c9589e2a93a78a04a279e509205945",
                )),
                block_confirmations: Some(6),
            },
        );
        Self {
            policy: PolicyConfig::default(),
            mock: MockConfig::default(),
            accounts: AccountsConfig::default(),
            development_chains: vec!["hardhat".to_string(), "localhost".to_string()],
            networks,
        }
    }
}

fn address_literal(hex_str: &str) -> Address {
    let mut bytes = [0u8; 20];
    hex::decode_to_slice(hex_str, &mut bytes).unwrap_or_default();
    Address::from(bytes)
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            None => Ok(Self::default()),
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml(&text)
            }
        }
    }

    pub fn network(&self, name: &str) -> Result<&NetworkConfig, ConfigError> {
        self.networks
            .get(name)
            .ok_or_else(|| ConfigError::UnknownNetwork(name.to_string()))
    }

    pub fn is_development(&self, name: &str) -> bool {
        self.development_chains.iter().any(|chain| chain == name)
    }

    pub fn funding_policy(&self) -> FundingPolicy {
        FundingPolicy::from_whole_usd(self.policy.minimum_usd)
    }
}
