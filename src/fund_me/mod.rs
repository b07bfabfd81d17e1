use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::access::AccessControl;
use crate::error::{FundError, OracleError};
use crate::gate::{Admission, FundingPolicy};
use crate::ledger::{Address, Amount, Ledger, LedgerError, Traversal};
use crate::oracle::PriceFeed;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    pub value: Amount,
}

impl CallContext {
    pub fn new(caller: Address, value: Amount) -> Self {
        Self { caller, value }
    }

    pub fn without_value(caller: Address) -> Self {
        Self::new(caller, Amount::zero())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EscrowEvent {
    Funded {
        funder: Address,
        amount: Amount,
        usd_value: Amount,
    },
    Withdrawn {
        owner: Address,
        amount: Amount,
        funders: u64,
        traversal: Traversal,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(into = "EscrowState", try_from = "EscrowState")]
pub struct FundMe {
    pub(crate) access: AccessControl,
    pub(crate) price_feed: Address,
    pub(crate) policy: FundingPolicy,
    pub(crate) ledger: Ledger,
    pub(crate) balance: Amount,
    pub(crate) events: Vec<EscrowEvent>,
}

#[derive(Serialize, Deserialize)]
struct EscrowState {
    access: AccessControl,
    price_feed: Address,
    policy: FundingPolicy,
    ledger: Ledger,
    balance: Amount,
    events: Vec<EscrowEvent>,
}

impl From<FundMe> for EscrowState {
    fn from(escrow: FundMe) -> Self {
        Self {
            access: escrow.access,
            price_feed: escrow.price_feed,
            policy: escrow.policy,
            ledger: escrow.ledger,
            balance: escrow.balance,
            events: escrow.events,
        }
    }
}

impl TryFrom<EscrowState> for FundMe {
    type Error = LedgerError;

    fn try_from(state: EscrowState) -> Result<Self, Self::Error> {
        let recorded = state.ledger.total();
        if recorded != state.balance {
            return Err(LedgerError::BalanceMismatch {
                balance: state.balance,
                recorded,
            });
        }
        Ok(Self {
            access: state.access,
            price_feed: state.price_feed,
            policy: state.policy,
            ledger: state.ledger,
            balance: state.balance,
            events: state.events,
        })
    }
}

impl FundMe {
    pub fn new(deployer: Address, price_feed: Address, policy: FundingPolicy) -> Self {
        info!(owner = ?deployer, feed = ?price_feed, "escrow deployed");
        Self {
            access: AccessControl::new(deployer),
            price_feed,
            policy,
            ledger: Ledger::new(),
            balance: Amount::zero(),
            events: Vec::new(),
        }
    }

    pub fn fund<F>(&mut self, ctx: &CallContext, feed: &F) -> Result<Admission, FundError>
    where
        F: PriceFeed + ?Sized,
    {
        if feed.address() != self.price_feed {
            return Err(OracleError::FeedMismatch {
                expected: self.price_feed,
                supplied: feed.address(),
            }
            .into());
        }
        let admission = self.policy.admit(ctx.value, feed)?;
        let balance = self
            .balance
            .checked_add(ctx.value)
            .ok_or(LedgerError::Overflow { funder: ctx.caller })?;
        let cumulative = self.ledger.record(ctx.caller, ctx.value)?;
        self.balance = balance;
        self.events.push(EscrowEvent::Funded {
            funder: ctx.caller,
            amount: ctx.value,
            usd_value: admission.usd_value,
        });
        info!(
            funder = ?ctx.caller,
            amount = %ctx.value,
            usd = %admission.usd_value,
            %cumulative,
            "contribution accepted"
        );
        Ok(admission)
    }

    pub fn receive<F>(&mut self, ctx: &CallContext, feed: &F) -> Result<Admission, FundError>
    where
        F: PriceFeed + ?Sized,
    {
        self.fund(ctx, feed)
    }

    pub fn fallback<F>(&mut self, ctx: &CallContext, data: &[u8], feed: &F) -> Result<Admission, FundError>
    where
        F: PriceFeed + ?Sized,
    {
        debug!(len = data.len(), "fallback routed to fund");
        self.fund(ctx, feed)
    }

    pub fn price_feed(&self) -> Address {
        self.price_feed
    }

    pub fn owner(&self) -> Address {
        self.access.owner()
    }

    pub fn policy(&self) -> &FundingPolicy {
        &self.policy
    }

    pub fn address_to_amount_funded(&self, funder: &Address) -> Amount {
        self.ledger.amount_of(funder)
    }

    pub fn funder(&self, index: usize) -> Option<Address> {
        self.ledger.funder(index)
    }

    pub fn funder_count(&self) -> usize {
        self.ledger.funder_count()
    }

    pub fn balance(&self) -> Amount {
        self.balance
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn events(&self) -> &[EscrowEvent] {
        &self.events
    }
}
