use primitive_types::U512;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::FundError;
use crate::ledger::{Amount, NATIVE_DECIMALS};
use crate::oracle::{PriceFeed, PriceQuote};
use crate::units::pow10;

pub const DEFAULT_MINIMUM_USD: u64 = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Admission {
    pub amount: Amount,
    pub usd_value: Amount,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FundingPolicy {
    pub minimum_usd: Amount,
}

impl Default for FundingPolicy {
    fn default() -> Self {
        Self::from_whole_usd(DEFAULT_MINIMUM_USD)
    }
}

impl FundingPolicy {
    pub fn from_whole_usd(usd: u64) -> Self {
        Self {
            minimum_usd: Amount::from(usd) * pow10(NATIVE_DECIMALS),
        }
    }

    pub fn admit<F>(&self, amount: Amount, feed: &F) -> Result<Admission, FundError>
    where
        F: PriceFeed + ?Sized,
    {
        let quote = feed.quote()?;
        let usd_value = conversion_rate(amount, &quote)?;
        if amount.is_zero() || usd_value < self.minimum_usd {
            warn!(%amount, %usd_value, minimum = %self.minimum_usd, "contribution below minimum");
            return Err(FundError::InsufficientValue {
                usd_value,
                minimum_usd: self.minimum_usd,
            });
        }
        Ok(Admission { amount, usd_value })
    }

    /// Smallest amount that passes [`FundingPolicy::admit`] at `quote`.
    pub fn minimum_contribution(&self, quote: &PriceQuote) -> Amount {
        let scaled = self.minimum_usd.full_mul(pow10(NATIVE_DECIMALS));
        let price: U512 = quote.price.into();
        let (mut needed, remainder) = scaled.div_mod(price);
        if !remainder.is_zero() {
            needed = needed + 1u64;
        }
        Amount::try_from(needed).unwrap_or(Amount::MAX).max(Amount::one())
    }
}

pub fn conversion_rate(amount: Amount, quote: &PriceQuote) -> Result<Amount, FundError> {
    quote
        .price
        .checked_mul(amount)
        .map(|product| product / pow10(NATIVE_DECIMALS))
        .ok_or(FundError::ConversionOverflow { amount })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OracleError;
    use crate::ledger::Address;
    use crate::oracle::MockV3Aggregator;
    use crate::units::parse_ether;

    fn eth_at_2000() -> MockV3Aggregator {
        MockV3Aggregator::new(Address::repeat_byte(0xaa), 8, 2_000_0000_0000)
    }

    #[test]
    fn threshold_sits_at_a_fortieth_of_a_unit() {
        let policy = FundingPolicy::default();
        let feed = eth_at_2000();
        let err = policy.admit(parse_ether("0.024").unwrap(), &feed).unwrap_err();
        assert_eq!(
            err,
            FundError::InsufficientValue {
                usd_value: Amount::from(48u64) * pow10(18),
                minimum_usd: Amount::from(50u64) * pow10(18),
            }
        );
        let admitted = policy.admit(parse_ether("0.025").unwrap(), &feed).unwrap();
        assert_eq!(admitted.usd_value, Amount::from(50u64) * pow10(18));
    }

    #[test]
    fn one_base_unit_below_threshold_is_rejected() {
        let policy = FundingPolicy::default();
        let feed = eth_at_2000();
        let threshold = parse_ether("0.025").unwrap();
        assert!(matches!(
            policy.admit(threshold - Amount::one(), &feed),
            Err(FundError::InsufficientValue { .. })
        ));
    }

    #[test]
    fn zero_value_is_rejected_even_without_a_minimum() {
        let policy = FundingPolicy::from_whole_usd(0);
        assert!(matches!(
            policy.admit(Amount::zero(), &eth_at_2000()),
            Err(FundError::InsufficientValue { .. })
        ));
        assert!(policy.admit(Amount::one(), &eth_at_2000()).is_ok());
    }

    #[test]
    fn oracle_failures_surface_through_the_gate() {
        let feed = MockV3Aggregator::new(Address::repeat_byte(0xaa), 8, -1);
        assert_eq!(
            FundingPolicy::default().admit(parse_ether("1").unwrap(), &feed),
            Err(FundError::Oracle(OracleError::NonPositiveAnswer { answer: -1 }))
        );
    }

    #[test]
    fn minimum_contribution_matches_admission_boundary() {
        let policy = FundingPolicy::default();
        let mut feed = eth_at_2000();
        assert_eq!(
            policy.minimum_contribution(&feed.quote().unwrap()),
            parse_ether("0.025").unwrap()
        );
        // 3000 USD: 50 / 3000 is not a whole number of base units
        feed.update_answer(3_000_0000_0000);
        let minimum = policy.minimum_contribution(&feed.quote().unwrap());
        assert!(policy.admit(minimum, &feed).is_ok());
        assert!(policy.admit(minimum - Amount::one(), &feed).is_err());
    }

    #[test]
    fn huge_amounts_report_overflow() {
        assert_eq!(
            FundingPolicy::default().admit(Amount::MAX, &eth_at_2000()),
            Err(FundError::ConversionOverflow { amount: Amount::MAX })
        );
    }
}
