use std::collections::{BTreeMap, BTreeSet};

use rand::{rngs::StdRng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::{Config, ConfigError};
use crate::error::{FundError, TransferError, WithdrawError};
use crate::fund_me::{CallContext, FundMe};
use crate::gate::Admission;
use crate::ledger::{Address, Amount};
use crate::oracle::{MockV3Aggregator, PriceFeed};
use crate::units::pow10;
use crate::withdraw::{Traversal, ValueSink, WithdrawReceipt};

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("unknown signer {0:?}")]
    UnknownSigner(String),
    #[error("{account:?} holds {balance}, needs {needed}")]
    InsufficientBalance {
        account: Address,
        balance: Amount,
        needed: Amount,
    },
    #[error("no escrow deployed")]
    NotDeployed,
    #[error("escrow already deployed at {0:?}")]
    AlreadyDeployed(Address),
    #[error("{network} is a live network; its price feed {feed:?} cannot be simulated")]
    LiveNetwork {
        network: String,
        feed: Option<Address>,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fund(#[from] FundError),
    #[error(transparent)]
    Withdraw(#[from] WithdrawError),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Accounts {
    balances: BTreeMap<Address, Amount>,
    rejecting: BTreeSet<Address>,
}

impl Accounts {
    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or_default()
    }

    pub fn credit(&mut self, account: Address, amount: Amount) -> Result<(), TransferError> {
        let balance = self.balance_of(&account);
        let updated = balance.checked_add(amount).ok_or(TransferError::Overflow)?;
        self.balances.insert(account, updated);
        Ok(())
    }

    pub fn debit(&mut self, account: Address, amount: Amount) -> Result<(), ChainError> {
        let balance = self.balance_of(&account);
        if balance < amount {
            return Err(ChainError::InsufficientBalance {
                account,
                balance,
                needed: amount,
            });
        }
        self.balances.insert(account, balance - amount);
        Ok(())
    }

    pub fn set_rejecting(&mut self, account: Address, rejecting: bool) {
        if rejecting {
            self.rejecting.insert(account);
        } else {
            self.rejecting.remove(&account);
        }
    }

    pub fn total(&self) -> Amount {
        self.balances
            .values()
            .fold(Amount::zero(), |acc, b| acc.saturating_add(*b))
    }
}

impl ValueSink for Accounts {
    fn send_value(&mut self, _escrow: &mut FundMe, to: Address, amount: Amount) -> Result<(), TransferError> {
        if self.rejecting.contains(&to) {
            return Err(TransferError::Rejected(to));
        }
        self.credit(to, amount)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Deployment {
    pub address: Address,
    pub contract: FundMe,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeployReport {
    pub network: String,
    pub chain_id: Option<u64>,
    pub owner: Address,
    pub price_feed: Address,
    pub escrow: Address,
    pub block_confirmations: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chain {
    pub network: String,
    pub chain_id: Option<u64>,
    signers: Vec<Address>,
    accounts: Accounts,
    nonces: BTreeMap<Address, u64>,
    feed: Option<MockV3Aggregator>,
    escrow: Option<Deployment>,
}

impl Chain {
    pub fn development(config: &Config, network: &str) -> Result<Self, ChainError> {
        let settings = config.network(network)?;
        if !config.is_development(network) {
            return Err(ChainError::LiveNetwork {
                network: network.to_string(),
                feed: settings.eth_usd_price_feed,
            });
        }
        let signers = derive_signers(config.accounts.seed, config.accounts.count);
        let mut accounts = Accounts::default();
        let starting = Amount::from(config.accounts.balance) * pow10(18);
        for signer in &signers {
            accounts.balances.insert(*signer, starting);
        }
        Ok(Self {
            network: network.to_string(),
            chain_id: settings.chain_id,
            signers,
            accounts,
            nonces: BTreeMap::new(),
            feed: None,
            escrow: None,
        })
    }

    pub fn deploy(&mut self, config: &Config, deployer: Address) -> Result<DeployReport, ChainError> {
        if let Some(existing) = &self.escrow {
            return Err(ChainError::AlreadyDeployed(existing.address));
        }
        let feed_address = self.next_contract_address(deployer);
        let feed = MockV3Aggregator::new(feed_address, config.mock.decimals, config.mock.initial_answer);
        info!(address = ?feed.address(), decimals = feed.decimals(), "mock price feed deployed");
        let escrow_address = self.next_contract_address(deployer);
        let contract = FundMe::new(deployer, feed_address, config.funding_policy());
        self.feed = Some(feed);
        self.escrow = Some(Deployment {
            address: escrow_address,
            contract,
        });
        let block_confirmations = config
            .network(&self.network)?
            .block_confirmations
            .unwrap_or(1);
        Ok(DeployReport {
            network: self.network.clone(),
            chain_id: self.chain_id,
            owner: deployer,
            price_feed: feed_address,
            escrow: escrow_address,
            block_confirmations,
        })
    }

    pub fn signers(&self) -> &[Address] {
        &self.signers
    }

    /// Accept a signer index (`"3"`) or a hex address.
    pub fn resolve(&self, name: &str) -> Result<Address, ChainError> {
        if let Ok(index) = name.parse::<usize>() {
            return self
                .signers
                .get(index)
                .copied()
                .ok_or_else(|| ChainError::UnknownSigner(name.to_string()));
        }
        parse_address(name).ok_or_else(|| ChainError::UnknownSigner(name.to_string()))
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.accounts.balance_of(account)
    }

    pub fn set_rejecting(&mut self, account: Address, rejecting: bool) {
        self.accounts.set_rejecting(account, rejecting);
    }

    pub fn escrow(&self) -> Result<&Deployment, ChainError> {
        self.escrow.as_ref().ok_or(ChainError::NotDeployed)
    }

    pub fn price_feed(&self) -> Result<&MockV3Aggregator, ChainError> {
        self.feed.as_ref().ok_or(ChainError::NotDeployed)
    }

    pub fn update_price(&mut self, answer: i128) -> Result<(), ChainError> {
        let feed = self.feed.as_mut().ok_or(ChainError::NotDeployed)?;
        feed.update_answer(answer);
        Ok(())
    }

    pub fn fund(&mut self, from: Address, value: Amount) -> Result<Admission, ChainError> {
        let deployment = self.escrow.as_mut().ok_or(ChainError::NotDeployed)?;
        let feed = self.feed.as_ref().ok_or(ChainError::NotDeployed)?;
        self.accounts.debit(from, value)?;
        match deployment.contract.fund(&CallContext::new(from, value), feed) {
            Ok(admission) => Ok(admission),
            Err(err) => {
                warn!(from = ?from, error = %err, "fund reverted");
                let refunded = self.accounts.balance_of(&from) + value;
                self.accounts.balances.insert(from, refunded);
                Err(err.into())
            }
        }
    }

    pub fn withdraw(&mut self, from: Address, traversal: Traversal) -> Result<WithdrawReceipt, ChainError> {
        let deployment = self.escrow.as_mut().ok_or(ChainError::NotDeployed)?;
        let receipt = deployment
            .contract
            .withdraw_with(from, &mut self.accounts, traversal)?;
        Ok(receipt)
    }

    pub fn total_value(&self) -> Amount {
        let held = self
            .escrow
            .as_ref()
            .map(|d| d.contract.balance())
            .unwrap_or_default();
        self.accounts.total().saturating_add(held)
    }

    fn next_contract_address(&mut self, deployer: Address) -> Address {
        let nonce = self.nonces.entry(deployer).or_default();
        let mut hasher = Sha256::new();
        hasher.update(deployer.as_bytes());
        hasher.update(nonce.to_le_bytes());
        *nonce += 1;
        let digest: [u8; 32] = hasher.finalize().into();
        Address::from_slice(&digest[12..])
    }
}

pub fn derive_signers(seed: u64, count: usize) -> Vec<Address> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let mut bytes = [0u8; 20];
            rng.fill_bytes(&mut bytes);
            Address::from(bytes)
        })
        .collect()
}

pub fn parse_address(text: &str) -> Option<Address> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    let mut bytes = [0u8; 20];
    hex::decode_to_slice(digits, &mut bytes).ok()?;
    Some(Address::from(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::parse_ether;

    fn deployed() -> (Chain, Address) {
        let config = Config::default();
        let mut chain = Chain::development(&config, "hardhat").unwrap();
        let deployer = chain.signers()[0];
        chain.deploy(&config, deployer).unwrap();
        (chain, deployer)
    }

    #[test]
    fn signers_are_deterministic_and_funded() {
        let (chain, deployer) = deployed();
        assert_eq!(chain.signers().len(), 20);
        assert_eq!(chain.signers(), derive_signers(0, 20).as_slice());
        assert_eq!(chain.balance_of(&deployer), parse_ether("10000").unwrap());
        assert_eq!(chain.resolve("0").unwrap(), deployer);
        assert_eq!(chain.resolve(&format!("{:?}", deployer)).unwrap(), deployer);
        assert!(chain.resolve("20").is_err());
    }

    #[test]
    fn live_networks_cannot_be_simulated() {
        let err = Chain::development(&Config::default(), "sepolia").unwrap_err();
        assert!(matches!(err, ChainError::LiveNetwork { .. }));
        let err = Chain::development(&Config::default(), "nowhere").unwrap_err();
        assert!(matches!(err, ChainError::Config(ConfigError::UnknownNetwork(_))));
    }

    #[test]
    fn deployment_wires_feed_and_owner() {
        let (chain, deployer) = deployed();
        let deployment = chain.escrow().unwrap();
        assert_eq!(deployment.contract.owner(), deployer);
        assert_eq!(deployment.contract.price_feed(), chain.price_feed().unwrap().address());
        assert_ne!(deployment.address, deployment.contract.price_feed());
    }

    #[test]
    fn redeploy_keeps_the_funded_escrow() {
        let (mut chain, deployer) = deployed();
        let funder = chain.signers()[4];
        chain.fund(funder, parse_ether("3").unwrap()).unwrap();
        let total = chain.total_value();
        let address = chain.escrow().unwrap().address;

        let err = chain.deploy(&Config::default(), deployer).unwrap_err();
        assert!(matches!(err, ChainError::AlreadyDeployed(at) if at == address));
        assert_eq!(chain.total_value(), total);
        assert_eq!(chain.escrow().unwrap().contract.balance(), parse_ether("3").unwrap());
    }

    #[test]
    fn rejected_fund_refunds_the_sender() {
        let (mut chain, _) = deployed();
        let funder = chain.signers()[1];
        let before = chain.balance_of(&funder);
        let err = chain.fund(funder, parse_ether("0.01").unwrap()).unwrap_err();
        assert!(matches!(err, ChainError::Fund(FundError::InsufficientValue { .. })));
        assert_eq!(chain.balance_of(&funder), before);
    }

    #[test]
    fn value_is_conserved_through_fund_and_withdraw() {
        let (mut chain, deployer) = deployed();
        let total = chain.total_value();
        for signer in chain.signers()[1..6].to_vec() {
            chain.fund(signer, parse_ether("1").unwrap()).unwrap();
        }
        assert_eq!(chain.total_value(), total);
        let receipt = chain.withdraw(deployer, Traversal::CachedLength).unwrap();
        assert_eq!(receipt.amount, parse_ether("5").unwrap());
        assert_eq!(chain.balance_of(&deployer), parse_ether("10005").unwrap());
        assert_eq!(chain.total_value(), total);
    }

    #[test]
    fn rejecting_owner_keeps_funds_in_escrow() {
        let (mut chain, deployer) = deployed();
        let funder = chain.signers()[2];
        chain.fund(funder, parse_ether("1").unwrap()).unwrap();
        chain.set_rejecting(deployer, true);
        let err = chain.withdraw(deployer, Traversal::Straightforward).unwrap_err();
        assert!(matches!(
            err,
            ChainError::Withdraw(WithdrawError::TransferFailed(TransferError::Rejected(_)))
        ));
        let escrow = &chain.escrow().unwrap().contract;
        assert_eq!(escrow.balance(), parse_ether("1").unwrap());
        assert_eq!(escrow.address_to_amount_funded(&funder), parse_ether("1").unwrap());
        chain.set_rejecting(deployer, false);
        assert!(chain.withdraw(deployer, Traversal::Straightforward).is_ok());
    }

    #[test]
    fn chain_state_survives_json() {
        let (mut chain, _) = deployed();
        let funder = chain.signers()[3];
        chain.fund(funder, parse_ether("2").unwrap()).unwrap();
        let json = serde_json::to_string(&chain).unwrap();
        let back: Chain = serde_json::from_str(&json).unwrap();
        assert_eq!(back, chain);
    }
}
