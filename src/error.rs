use thiserror::Error;

use crate::ledger::{Address, Amount, LedgerError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("price feed answered a non-positive price ({answer})")]
    NonPositiveAnswer { answer: i128 },

    #[error("price feed {supplied:?} does not match the configured feed {expected:?}")]
    FeedMismatch { expected: Address, supplied: Address },

    #[error("no data for round {0}")]
    UnknownRound(u64),

    #[error("price quote overflows 256-bit fixed point")]
    QuoteOverflow,

    #[error("price answer {answer} at {decimals} decimals truncates to zero")]
    QuoteUnderflow { answer: i128, decimals: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FundError {
    #[error("You need to spend more ETH! ({usd_value} < {minimum_usd} USD-wei)")]
    InsufficientValue { usd_value: Amount, minimum_usd: Amount },

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("USD conversion of {amount} overflows")]
    ConversionOverflow { amount: Amount },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("recipient {0:?} rejected the transfer")]
    Rejected(Address),

    #[error("recipient balance would overflow")]
    Overflow,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WithdrawError {
    #[error("caller {caller:?} is not the owner")]
    NotOwner { caller: Address },

    #[error("transfer to owner failed: {0}")]
    TransferFailed(#[from] TransferError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    #[error("invalid decimal amount {0:?}")]
    Malformed(String),

    #[error("amount {0:?} has more than 18 fraction digits")]
    TooPrecise(String),

    #[error("amount {0:?} does not fit in 256 bits")]
    Overflow(String),
}
