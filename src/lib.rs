pub mod access;
pub mod chain;
pub mod config;
pub mod fund_me;
pub mod gate;
pub mod ledger;
pub mod oracle;
pub mod units;
pub mod withdraw;

mod error;

pub use error::{FundError, OracleError, TransferError, UnitError, WithdrawError};
pub use fund_me::{CallContext, EscrowEvent, FundMe};
pub use ledger::{Address, Amount, Traversal};
