//! # Allowance Table
//!
//! `(owner, spender) -> amount`. `approve` overwrites; it never adds to the
//! previous value. The gateway is the only debiting consumer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::LedgerError;
use crate::units::Amount;

/// One serialized allowance row. JSON object keys must be strings, so the
/// table is stored as a list of rows instead of a tuple-keyed map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceEntry {
    /// Balance owner.
    pub owner: Address,
    /// Authorized spender.
    pub spender: Address,
    /// Authorized amount in base units.
    #[serde(with = "crate::units::as_integer")]
    pub amount: Amount,
}

/// Spender authorizations granted by balance owners.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<AllowanceEntry>", into = "Vec<AllowanceEntry>")]
pub struct AllowanceTable {
    entries: BTreeMap<(Address, Address), Amount>,
}

impl AllowanceTable {
    /// Current allowance from `owner` to `spender`.
    pub fn allowance(&self, owner: Address, spender: Address) -> Amount {
        self.entries.get(&(owner, spender)).copied().unwrap_or(0)
    }

    /// Overwrites the allowance. Returns the previous value.
    pub(crate) fn set(&mut self, owner: Address, spender: Address, amount: Amount) -> Amount {
        self.entries
            .insert((owner, spender), amount)
            .unwrap_or(0)
    }

    /// Checks that `spender` may move `amount` of `owner`'s balance.
    /// Returns the allowance that would remain.
    pub fn check_spend(
        &self,
        owner: Address,
        spender: Address,
        amount: Amount,
    ) -> Result<Amount, LedgerError> {
        let available = self.allowance(owner, spender);
        available
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientAllowance {
                owner,
                spender,
                available,
                requested: amount,
            })
    }

    /// Consumes `amount` of the allowance. Returns the remaining allowance.
    pub(crate) fn spend(
        &mut self,
        owner: Address,
        spender: Address,
        amount: Amount,
    ) -> Result<Amount, LedgerError> {
        let remaining = self.check_spend(owner, spender, amount)?;
        if let Some(entry) = self.entries.get_mut(&(owner, spender)) {
            *entry = remaining;
        }
        Ok(remaining)
    }

    /// Puts back a value captured before a failed operation. `None` removes the row.
    pub(crate) fn restore(&mut self, owner: Address, spender: Address, previous: Option<Amount>) {
        match previous {
            Some(a) => {
                self.entries.insert((owner, spender), a);
            }
            None => {
                self.entries.remove(&(owner, spender));
            }
        }
    }

    /// Raw stored value, distinguishing "never set" from zero.
    pub(crate) fn raw(&self, owner: Address, spender: Address) -> Option<Amount> {
        self.entries.get(&(owner, spender)).copied()
    }
}

impl From<Vec<AllowanceEntry>> for AllowanceTable {
    fn from(rows: Vec<AllowanceEntry>) -> Self {
        Self {
            entries: rows
                .into_iter()
                .map(|r| ((r.owner, r.spender), r.amount))
                .collect(),
        }
    }
}

impl From<AllowanceTable> for Vec<AllowanceEntry> {
    fn from(table: AllowanceTable) -> Self {
        table
            .entries
            .into_iter()
            .map(|((owner, spender), amount)| AllowanceEntry {
                owner,
                spender,
                amount,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Address {
        Address::from_low_u64(1)
    }

    fn spender() -> Address {
        Address::from_low_u64(2)
    }

    #[test]
    fn set_overwrites_instead_of_adding() {
        let mut table = AllowanceTable::default();
        assert_eq!(table.set(owner(), spender(), 5), 0);
        assert_eq!(table.set(owner(), spender(), 3), 5);
        assert_eq!(table.allowance(owner(), spender()), 3);
    }

    #[test]
    fn allowance_is_directional() {
        let mut table = AllowanceTable::default();
        table.set(owner(), spender(), 5);
        assert_eq!(table.allowance(spender(), owner()), 0);
    }

    #[test]
    fn spend_decrements_and_rejects_overdraw() {
        let mut table = AllowanceTable::default();
        table.set(owner(), spender(), 5);
        assert_eq!(table.spend(owner(), spender(), 2).unwrap(), 3);
        let err = table.spend(owner(), spender(), 4).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientAllowance {
                available: 3,
                requested: 4,
                ..
            }
        ));
        assert_eq!(table.allowance(owner(), spender()), 3);
    }

    #[test]
    fn restore_reinstates_previous_row() {
        let mut table = AllowanceTable::default();
        table.set(owner(), spender(), 5);
        let prev = table.raw(owner(), spender());
        table.spend(owner(), spender(), 5).unwrap();
        table.restore(owner(), spender(), prev);
        assert_eq!(table.allowance(owner(), spender()), 5);

        table.restore(owner(), spender(), None);
        assert_eq!(table.raw(owner(), spender()), None);
    }

    #[test]
    fn serde_roundtrip_via_rows() {
        let mut table = AllowanceTable::default();
        table.set(owner(), spender(), 9);
        let json = serde_json::to_string(&table).unwrap();
        assert!(json.starts_with('['));
        assert!(json.contains(r#""amount":"9""#));
        let back: AllowanceTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }
}
