use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::OracleError;
use crate::ledger::{Address, Amount, NATIVE_DECIMALS};
use crate::units::pow10;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundData {
    pub round_id: u64,
    pub answer: i128,
    pub started_at: u64,
    pub updated_at: u64,
    pub answered_in_round: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PriceQuote {
    pub price: Amount,
    pub updated_at: u64,
}

pub trait PriceFeed {
    fn address(&self) -> Address;
    fn decimals(&self) -> u8;
    fn description(&self) -> String;
    fn version(&self) -> u64;
    fn latest_round_data(&self) -> Result<RoundData, OracleError>;

    /// Latest answer normalised to 18 fraction digits (truncating).
    fn quote(&self) -> Result<PriceQuote, OracleError> {
        let round = self.latest_round_data()?;
        if round.answer <= 0 {
            return Err(OracleError::NonPositiveAnswer {
                answer: round.answer,
            });
        }
        let answer = Amount::from(round.answer as u128);
        let decimals = u32::from(self.decimals());
        let price = if decimals <= NATIVE_DECIMALS {
            answer
                .checked_mul(pow10(NATIVE_DECIMALS - decimals))
                .ok_or(OracleError::QuoteOverflow)?
        } else {
            // 10^78 already exceeds any 256-bit answer
            let shift = decimals - NATIVE_DECIMALS;
            if shift > 77 {
                Amount::zero()
            } else {
                answer / pow10(shift)
            }
        };
        if price.is_zero() {
            return Err(OracleError::QuoteUnderflow {
                answer: round.answer,
                decimals: self.decimals(),
            });
        }
        Ok(PriceQuote {
            price,
            updated_at: round.updated_at,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MockV3Aggregator {
    address: Address,
    decimals: u8,
    latest_round: u64,
    rounds: BTreeMap<u64, RoundData>,
    clock: u64,
}

impl MockV3Aggregator {
    pub const VERSION: u64 = 0;

    pub fn new(address: Address, decimals: u8, initial_answer: i128) -> Self {
        let mut feed = Self {
            address,
            decimals,
            latest_round: 0,
            rounds: BTreeMap::new(),
            clock: 0,
        };
        feed.update_answer(initial_answer);
        feed
    }

    pub fn update_answer(&mut self, answer: i128) {
        self.clock += 1;
        let round_id = self.latest_round + 1;
        self.publish(RoundData {
            round_id,
            answer,
            started_at: self.clock,
            updated_at: self.clock,
            answered_in_round: round_id,
        });
    }

    pub fn update_round_data(&mut self, round_id: u64, answer: i128, updated_at: u64, started_at: u64) {
        self.clock = self.clock.max(updated_at);
        self.publish(RoundData {
            round_id,
            answer,
            started_at,
            updated_at,
            answered_in_round: round_id,
        });
    }

    pub fn get_round_data(&self, round_id: u64) -> Result<RoundData, OracleError> {
        self.rounds
            .get(&round_id)
            .copied()
            .ok_or(OracleError::UnknownRound(round_id))
    }

    pub fn latest_answer(&self) -> i128 {
        self.rounds
            .get(&self.latest_round)
            .map(|round| round.answer)
            .unwrap_or_default()
    }

    fn publish(&mut self, round: RoundData) {
        debug!(round = round.round_id, answer = %round.answer, "mock aggregator round published");
        self.latest_round = round.round_id;
        self.rounds.insert(round.round_id, round);
    }
}

impl PriceFeed for MockV3Aggregator {
    fn address(&self) -> Address {
        self.address
    }

    fn decimals(&self) -> u8 {
        self.decimals
    }

    fn description(&self) -> String {
        "v0.6/tests/MockV3Aggregator.sol".to_string()
    }

    fn version(&self) -> u64 {
        Self::VERSION
    }

    fn latest_round_data(&self) -> Result<RoundData, OracleError> {
        self.get_round_data(self.latest_round)
    }
}
