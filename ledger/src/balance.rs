//! # Balance Ledger
//!
//! Custodied native balances per user, plus the two global risk limits.
//!
//! Two totals are tracked alongside the per-user map:
//!
//! - `total_custodied`: the sum of all user balances.
//! - `native_held`: native asset physically held by the ledger.
//!
//! Value enters through [`BalanceLedger::credit`] (both totals grow) and
//! leaves through [`BalanceLedger::debit`] (both shrink). The conservation
//! invariant `total_custodied <= native_held` therefore holds after every
//! committed operation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::LedgerError;
use crate::units::Amount;

/// Saved pre-operation values for one account, used to undo a debit whose
/// payout failed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BalanceCheckpoint {
    account: Address,
    balance: Option<Amount>,
    total_custodied: Amount,
    native_held: Amount,
}

/// Per-user custodied balances and global limits.
///
/// Serialized amounts are raw base-unit integers written as strings; only
/// human-edited files (configs, scenarios) use decimal unit strings.
///
/// The default ledger has both limits at zero, so nothing can be deposited
/// or approved until the initializer sets real limits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceLedger {
    #[serde(with = "crate::units::as_integer_map")]
    balances: BTreeMap<Address, Amount>,
    #[serde(with = "crate::units::as_integer")]
    global_user_limit: Amount,
    #[serde(with = "crate::units::as_integer")]
    global_user_auth_limit: Amount,
    #[serde(with = "crate::units::as_integer")]
    total_custodied: Amount,
    #[serde(with = "crate::units::as_integer")]
    native_held: Amount,
}

impl BalanceLedger {
    /// Creates an empty ledger with the given limits.
    pub fn with_limits(global_user_limit: Amount, global_user_auth_limit: Amount) -> Self {
        Self {
            global_user_limit,
            global_user_auth_limit,
            ..Self::default()
        }
    }

    /// Custodied balance of `user`, zero if never credited.
    pub fn balance_of(&self, user: Address) -> Amount {
        self.balances.get(&user).copied().unwrap_or(0)
    }

    /// Every account that has ever been credited, with its balance.
    pub fn balances(&self) -> impl Iterator<Item = (Address, Amount)> + '_ {
        self.balances.iter().map(|(a, b)| (*a, *b))
    }

    /// Per-user custody cap.
    pub fn global_user_limit(&self) -> Amount {
        self.global_user_limit
    }

    /// Per-approval authorization cap.
    pub fn global_user_auth_limit(&self) -> Amount {
        self.global_user_auth_limit
    }

    /// Sum of all custodied balances.
    pub fn total_custodied(&self) -> Amount {
        self.total_custodied
    }

    /// Native asset physically held.
    pub fn native_held(&self) -> Amount {
        self.native_held
    }

    /// Replaces the per-user cap, returning the previous value.
    ///
    /// Existing balances above a lowered cap stay as they are; only later
    /// deposits are checked against the new value.
    pub(crate) fn set_global_user_limit(&mut self, limit: Amount) -> Amount {
        std::mem::replace(&mut self.global_user_limit, limit)
    }

    /// Replaces the authorization cap, returning the previous value.
    pub(crate) fn set_global_user_auth_limit(&mut self, limit: Amount) -> Amount {
        std::mem::replace(&mut self.global_user_auth_limit, limit)
    }

    /// Fails if `amount` is above the authorization cap.
    pub fn check_auth_limit(&self, amount: Amount) -> Result<(), LedgerError> {
        if amount > self.global_user_auth_limit {
            return Err(LedgerError::AuthLimitExceeded {
                amount,
                limit: self.global_user_auth_limit,
            });
        }
        Ok(())
    }

    /// Checks that crediting `amount` to `user` would succeed, without changing anything.
    pub fn check_credit(&self, user: Address, amount: Amount) -> Result<Amount, LedgerError> {
        let balance = self.balance_of(user);
        let new_balance = balance
            .checked_add(amount)
            .ok_or(LedgerError::AmountOverflow)?;
        if new_balance > self.global_user_limit {
            return Err(LedgerError::UserLimitExceeded {
                balance,
                amount,
                limit: self.global_user_limit,
            });
        }
        self.total_custodied
            .checked_add(amount)
            .ok_or(LedgerError::AmountOverflow)?;
        self.native_held
            .checked_add(amount)
            .ok_or(LedgerError::AmountOverflow)?;
        Ok(new_balance)
    }

    /// Credits value that has just been received into custody.
    /// Returns the new balance.
    pub(crate) fn credit(&mut self, user: Address, amount: Amount) -> Result<Amount, LedgerError> {
        let new_balance = self.check_credit(user, amount)?;
        // check_credit verified both totals have headroom.
        self.total_custodied += amount;
        self.native_held += amount;
        self.balances.insert(user, new_balance);
        Ok(new_balance)
    }

    /// Checks that debiting `amount` from `user` would succeed, without changing anything.
    pub fn check_debit(&self, user: Address, amount: Amount) -> Result<Amount, LedgerError> {
        let available = self.balance_of(user);
        available
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                account: user,
                available,
                requested: amount,
            })
    }

    /// Debits value that is about to leave custody. Returns the new balance.
    pub(crate) fn debit(&mut self, user: Address, amount: Amount) -> Result<Amount, LedgerError> {
        let new_balance = self.check_debit(user, amount)?;
        let total_custodied = self
            .total_custodied
            .checked_sub(amount)
            .ok_or(LedgerError::AmountOverflow)?;
        let native_held = self
            .native_held
            .checked_sub(amount)
            .ok_or(LedgerError::AmountOverflow)?;
        self.total_custodied = total_custodied;
        self.native_held = native_held;
        if self.balances.contains_key(&user) {
            self.balances.insert(user, new_balance);
        }
        Ok(new_balance)
    }

    /// Checks the totals against the per-user map. Describes the first
    /// mismatch found.
    pub(crate) fn verify(&self) -> Result<(), String> {
        let sum = self
            .balances
            .values()
            .try_fold(0 as Amount, |acc, b| acc.checked_add(*b))
            .ok_or_else(|| "sum of balances overflows".to_string())?;
        if sum != self.total_custodied {
            return Err(format!(
                "total_custodied {} does not match sum of balances {}",
                self.total_custodied, sum
            ));
        }
        if self.total_custodied > self.native_held {
            return Err(format!(
                "total_custodied {} exceeds native_held {}",
                self.total_custodied, self.native_held
            ));
        }
        Ok(())
    }

    pub(crate) fn checkpoint(&self, account: Address) -> BalanceCheckpoint {
        BalanceCheckpoint {
            account,
            balance: self.balances.get(&account).copied(),
            total_custodied: self.total_custodied,
            native_held: self.native_held,
        }
    }

    pub(crate) fn restore(&mut self, cp: BalanceCheckpoint) {
        match cp.balance {
            Some(b) => {
                self.balances.insert(cp.account, b);
            }
            None => {
                self.balances.remove(&cp.account);
            }
        }
        self.total_custodied = cp.total_custodied;
        self.native_held = cp.native_held;
    }
}
