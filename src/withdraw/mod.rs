use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{TransferError, WithdrawError};
use crate::fund_me::{EscrowEvent, FundMe};
use crate::ledger::{Address, Amount, LedgerSnapshot, StorageUsage};

pub use crate::ledger::Traversal;

/// Moves value out of the escrow on behalf of the hosting environment.
///
/// The sink receives the escrow itself, so a recipient may re-enter any entry
/// point while the transfer is in flight.
pub trait ValueSink {
    fn send_value(
        &mut self,
        escrow: &mut FundMe,
        to: Address,
        amount: Amount,
    ) -> Result<(), TransferError>;
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WithdrawReceipt {
    pub owner: Address,
    pub amount: Amount,
    pub funders: Vec<Address>,
    pub traversal: Traversal,
    pub storage: StorageUsage,
}

struct Checkpoint {
    ledger: LedgerSnapshot,
    balance: Amount,
    events: usize,
}

impl FundMe {
    pub fn withdraw<S>(&mut self, caller: Address, sink: &mut S) -> Result<WithdrawReceipt, WithdrawError>
    where
        S: ValueSink + ?Sized,
    {
        self.withdraw_with(caller, sink, Traversal::Straightforward)
    }

    pub fn cheaper_withdraw<S>(&mut self, caller: Address, sink: &mut S) -> Result<WithdrawReceipt, WithdrawError>
    where
        S: ValueSink + ?Sized,
    {
        self.withdraw_with(caller, sink, Traversal::CachedLength)
    }

    pub fn withdraw_with<S>(
        &mut self,
        caller: Address,
        sink: &mut S,
        traversal: Traversal,
    ) -> Result<WithdrawReceipt, WithdrawError>
    where
        S: ValueSink + ?Sized,
    {
        if let Err(err) = self.access.require_owner(caller) {
            warn!(caller = ?caller, "withdrawal by non-owner refused");
            return Err(err);
        }
        let owner = self.access.owner();
        let checkpoint = Checkpoint {
            ledger: self.ledger.snapshot(),
            balance: self.balance,
            events: self.events.len(),
        };

        let before = self.ledger.storage_usage();
        let amount = self.balance;
        let funders = self.ledger.clear(traversal);
        self.balance = Amount::zero();
        let storage = self.ledger.storage_usage().since(before);

        if let Err(err) = sink.send_value(self, owner, amount) {
            warn!(%amount, error = %err, "transfer to owner failed, restoring ledger");
            self.ledger.restore(&checkpoint.ledger);
            self.balance = checkpoint.balance;
            self.events.truncate(checkpoint.events);
            return Err(err.into());
        }

        self.events.push(EscrowEvent::Withdrawn {
            owner,
            amount,
            funders: funders.len() as u64,
            traversal,
        });
        info!(
            %amount,
            funders = funders.len(),
            method = traversal.label(),
            reads = storage.reads,
            writes = storage.writes,
            "withdrawal complete"
        );
        Ok(WithdrawReceipt {
            owner,
            amount,
            funders,
            traversal,
            storage,
        })
    }
}
