use serde::{Deserialize, Serialize};

use crate::error::WithdrawError;
use crate::ledger::Address;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessControl {
    owner: Address,
}

impl AccessControl {
    pub fn new(owner: Address) -> Self {
        Self { owner }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn require_owner(&self, caller: Address) -> Result<(), WithdrawError> {
        if caller != self.owner {
            return Err(WithdrawError::NotOwner { caller });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_deployer_passes() {
        let owner = Address::repeat_byte(1);
        let access = AccessControl::new(owner);
        assert!(access.require_owner(owner).is_ok());
        let stranger = Address::repeat_byte(2);
        assert_eq!(
            access.require_owner(stranger),
            Err(WithdrawError::NotOwner { caller: stranger })
        );
    }
}
