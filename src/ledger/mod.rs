use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};

use primitive_types::{H160, U256};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub type Address = H160;
pub type Amount = U256;

pub const NATIVE_DECIMALS: u32 = 18;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("zero contribution from {funder:?}")]
    ZeroAmount { funder: Address },
    #[error("cumulative contribution of {funder:?} overflows")]
    Overflow { funder: Address },
    #[error("funder {0:?} listed more than once")]
    DuplicateFunder(Address),
    #[error("ledger digest does not match its records")]
    DigestMismatch,
    #[error("held balance {balance} differs from recorded total {recorded}")]
    BalanceMismatch { balance: Amount, recorded: Amount },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Traversal {
    /// Re-reads the stored sequence length on every iteration.
    Straightforward,
    /// Loads the sequence once and iterates over the in-memory copy.
    CachedLength,
}

impl Traversal {
    pub fn label(self) -> &'static str {
        match self {
            Traversal::Straightforward => "withdraw",
            Traversal::CachedLength => "cheaper_withdraw",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUsage {
    pub reads: u64,
    pub writes: u64,
}

impl StorageUsage {
    pub fn since(self, earlier: StorageUsage) -> StorageUsage {
        StorageUsage {
            reads: self.reads - earlier.reads,
            writes: self.writes - earlier.writes,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct StorageMeter {
    reads: Cell<u64>,
    writes: Cell<u64>,
}

impl StorageMeter {
    fn read(&self) {
        self.reads.set(self.reads.get() + 1);
    }

    fn write(&self) {
        self.writes.set(self.writes.get() + 1);
    }

    pub fn usage(&self) -> StorageUsage {
        StorageUsage {
            reads: self.reads.get(),
            writes: self.writes.get(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContributorRecord {
    pub funder: Address,
    pub amount: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub records: Vec<ContributorRecord>,
    #[serde(with = "crate::ledger::serde_digest")]
    pub digest: [u8; 32],
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(into = "LedgerSnapshot", try_from = "LedgerSnapshot")]
pub struct Ledger {
    amounts: BTreeMap<Address, Amount>,
    funders: Vec<Address>,
    meter: StorageMeter,
}

impl PartialEq for Ledger {
    fn eq(&self, other: &Self) -> bool {
        self.amounts == other.amounts && self.funders == other.funders
    }
}

impl Eq for Ledger {}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, funder: Address, amount: Amount) -> Result<Amount, LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount { funder });
        }
        self.meter.read();
        let previous = self.amounts.get(&funder).copied();
        let updated = previous
            .unwrap_or_default()
            .checked_add(amount)
            .ok_or(LedgerError::Overflow { funder })?;
        self.meter.write();
        self.amounts.insert(funder, updated);
        if previous.is_none() {
            // length slot + element slot
            self.meter.write();
            self.meter.write();
            self.funders.push(funder);
        }
        Ok(updated)
    }

    pub fn amount_of(&self, funder: &Address) -> Amount {
        self.meter.read();
        self.amounts.get(funder).copied().unwrap_or_default()
    }

    pub fn funder(&self, index: usize) -> Option<Address> {
        self.meter.read();
        self.funders.get(index).copied()
    }

    pub fn funder_count(&self) -> usize {
        self.meter.read();
        self.funders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funders.is_empty()
    }

    pub fn total(&self) -> Amount {
        self.amounts
            .values()
            .fold(Amount::zero(), |acc, amount| acc.saturating_add(*amount))
    }

    pub fn records(&self) -> impl Iterator<Item = ContributorRecord> + '_ {
        self.funders.iter().map(|funder| ContributorRecord {
            funder: *funder,
            amount: self.amounts.get(funder).copied().unwrap_or_default(),
        })
    }

    pub fn storage_usage(&self) -> StorageUsage {
        self.meter.usage()
    }

    pub fn clear(&mut self, traversal: Traversal) -> Vec<Address> {
        let mut zeroed = Vec::new();
        match traversal {
            Traversal::Straightforward => {
                let mut index = 0;
                while index < self.funder_count() {
                    let Some(funder) = self.funder(index) else {
                        break;
                    };
                    self.zero(&funder);
                    zeroed.push(funder);
                    index += 1;
                }
            }
            Traversal::CachedLength => {
                for funder in self.load_funders() {
                    self.zero(&funder);
                    zeroed.push(funder);
                }
            }
        }
        self.meter.write();
        self.funders.clear();
        debug_assert!(self.amounts.is_empty(), "amount without listed funder");
        self.amounts.clear();
        zeroed
    }

    fn load_funders(&self) -> Vec<Address> {
        self.meter.read();
        self.funders
            .iter()
            .map(|funder| {
                self.meter.read();
                *funder
            })
            .collect()
    }

    fn zero(&mut self, funder: &Address) {
        self.meter.write();
        self.amounts.remove(funder);
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let records: Vec<ContributorRecord> = self.records().collect();
        LedgerSnapshot {
            digest: compute_digest(&records),
            records,
        }
    }

    pub fn restore(&mut self, snapshot: &LedgerSnapshot) {
        self.funders = snapshot.records.iter().map(|r| r.funder).collect();
        self.amounts = snapshot
            .records
            .iter()
            .map(|r| (r.funder, r.amount))
            .collect();
    }

    pub fn digest(&self) -> [u8; 32] {
        let records: Vec<ContributorRecord> = self.records().collect();
        compute_digest(&records)
    }
}

impl From<Ledger> for LedgerSnapshot {
    fn from(ledger: Ledger) -> Self {
        ledger.snapshot()
    }
}

impl TryFrom<LedgerSnapshot> for Ledger {
    type Error = LedgerError;

    fn try_from(snapshot: LedgerSnapshot) -> Result<Self, Self::Error> {
        if compute_digest(&snapshot.records) != snapshot.digest {
            return Err(LedgerError::DigestMismatch);
        }
        let mut seen = BTreeSet::new();
        for record in &snapshot.records {
            if record.amount.is_zero() {
                return Err(LedgerError::ZeroAmount {
                    funder: record.funder,
                });
            }
            if !seen.insert(record.funder) {
                return Err(LedgerError::DuplicateFunder(record.funder));
            }
        }
        let mut ledger = Ledger::new();
        ledger.restore(&snapshot);
        Ok(ledger)
    }
}

fn compute_digest(records: &[ContributorRecord]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"fundme-ledger");
    hasher.update((records.len() as u64).to_le_bytes());
    for record in records {
        let mut amount = [0u8; 32];
        record.amount.to_big_endian(&mut amount);
        hasher.update(record.funder.as_bytes());
        hasher.update(amount);
    }
    hasher.finalize().into()
}

pub(crate) mod serde_digest {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(&encoded).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("digest must be 32 bytes"))
    }
}
