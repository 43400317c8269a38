//! # Access Control Registry
//!
//! Owns role membership and the operator threshold. Two roles exist:
//!
//! - **Admin**: exactly one holder after initialization. Manages operators,
//!   global limits and the pause switch. Moved only via
//!   [`AccessControl::renounce_admin`].
//! - **Operator**: any number of holders. Mediates transfers through the
//!   gateway.
//!
//! Membership is kept in a [`RoleSet`]: a dense vector plus an
//! address-to-position index. Removal swaps the last member into the freed
//! slot, so **enumeration order is not stable across removals**. Callers
//! must not rely on an index surviving a revoke.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::config::MAX_OPERATOR_BATCH;
use crate::error::LedgerError;

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// A role tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Governs membership, limits and the pause switch.
    Admin,
    /// Mediates transfers on behalf of users.
    Operator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "Admin"),
            Role::Operator => write!(f, "Operator"),
        }
    }
}

// ---------------------------------------------------------------------------
// RoleSet
// ---------------------------------------------------------------------------

/// Enumerable address set with O(1) insert, remove and membership test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Address>", into = "Vec<Address>")]
pub struct RoleSet {
    members: Vec<Address>,
    positions: HashMap<Address, usize>,
}

impl RoleSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `account`. Returns `false` if it was already present.
    pub fn insert(&mut self, account: Address) -> bool {
        if self.positions.contains_key(&account) {
            return false;
        }
        self.positions.insert(account, self.members.len());
        self.members.push(account);
        true
    }

    /// Removes `account` by moving the last member into its slot.
    /// Returns `false` if it was not present.
    pub fn remove(&mut self, account: &Address) -> bool {
        let Some(index) = self.positions.remove(account) else {
            return false;
        };
        let last = self.members.len() - 1;
        if index != last {
            let moved = self.members[last];
            self.members[index] = moved;
            self.positions.insert(moved, index);
        }
        self.members.pop();
        true
    }

    /// Membership test.
    pub fn contains(&self, account: &Address) -> bool {
        self.positions.contains_key(account)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` when the set has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Member at `index` in current enumeration order.
    pub fn get(&self, index: usize) -> Option<Address> {
        self.members.get(index).copied()
    }

    /// All members in current enumeration order.
    pub fn as_slice(&self) -> &[Address] {
        &self.members
    }
}

impl From<Vec<Address>> for RoleSet {
    fn from(addresses: Vec<Address>) -> Self {
        let mut set = RoleSet::new();
        for a in addresses {
            set.insert(a);
        }
        set
    }
}

impl From<RoleSet> for Vec<Address> {
    fn from(set: RoleSet) -> Self {
        set.members
    }
}

// ---------------------------------------------------------------------------
// AccessControl
// ---------------------------------------------------------------------------

/// Role registry plus the operator threshold parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    admins: RoleSet,
    operators: RoleSet,
    /// Stored and reported only; nothing checks it.
    operator_threshold: u64,
}

impl AccessControl {
    /// Creates an empty registry with no admin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the registry. Only the initializer calls this, on an empty registry.
    pub(crate) fn seed(
        &mut self,
        admin: Address,
        operators: &[Address],
        operator_threshold: u64,
    ) -> Result<(), LedgerError> {
        if admin.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        self.admins = RoleSet::new();
        self.admins.insert(admin);
        self.operators = RoleSet::new();
        for op in operators {
            self.operators.insert(*op);
        }
        self.operator_threshold = operator_threshold;
        Ok(())
    }

    /// Checks role membership of reattached state. An initialized ledger
    /// has exactly one admin; an uninitialized one has no members at all.
    pub(crate) fn verify(&self, initialized: bool) -> Result<(), String> {
        let expected_admins = usize::from(initialized);
        if self.admins.len() != expected_admins {
            return Err(format!(
                "expected {} admin(s), found {}",
                expected_admins,
                self.admins.len()
            ));
        }
        if !initialized && !self.operators.is_empty() {
            return Err("operators present before initialization".into());
        }
        if self
            .admins
            .as_slice()
            .iter()
            .chain(self.operators.as_slice())
            .any(Address::is_zero)
        {
            return Err("zero address holds a role".into());
        }
        Ok(())
    }

    fn set(&self, role: Role) -> &RoleSet {
        match role {
            Role::Admin => &self.admins,
            Role::Operator => &self.operators,
        }
    }

    // -- Guards --------------------------------------------------------------

    /// Fails with [`LedgerError::MissingAdminRole`] unless `caller` is the admin.
    pub fn only_admin(&self, caller: Address) -> Result<(), LedgerError> {
        if self.admins.contains(&caller) {
            Ok(())
        } else {
            tracing::warn!(%caller, "rejected admin-only call");
            Err(LedgerError::MissingAdminRole { account: caller })
        }
    }

    /// Fails with [`LedgerError::MissingOperatorRole`] unless `caller` is an operator.
    pub fn only_operator(&self, caller: Address) -> Result<(), LedgerError> {
        if self.operators.contains(&caller) {
            Ok(())
        } else {
            tracing::warn!(%caller, "rejected operator-only call");
            Err(LedgerError::MissingOperatorRole { account: caller })
        }
    }

    // -- Reads ---------------------------------------------------------------

    /// Whether `account` holds `role`.
    pub fn has_role(&self, role: Role, account: Address) -> bool {
        self.set(role).contains(&account)
    }

    /// Number of holders of `role`.
    pub fn role_member_count(&self, role: Role) -> usize {
        self.set(role).len()
    }

    /// Holder of `role` at `index`. Order changes when members are removed.
    pub fn role_member(&self, role: Role, index: usize) -> Option<Address> {
        self.set(role).get(index)
    }

    /// All holders of `role` in current enumeration order.
    pub fn role_members(&self, role: Role) -> &[Address] {
        self.set(role).as_slice()
    }

    /// The role that administers `role`. Always [`Role::Admin`].
    pub fn role_admin(&self, _role: Role) -> Role {
        Role::Admin
    }

    /// The current admin, if initialized.
    pub fn admin(&self) -> Option<Address> {
        self.admins.get(0)
    }

    /// The stored operator threshold.
    pub fn operator_threshold(&self) -> u64 {
        self.operator_threshold
    }

    // -- Mutations -----------------------------------------------------------

    /// Grants `role` to `account`. Returns `false` if it was already held.
    ///
    /// The admin role cannot be granted this way, since that would leave two
    /// admins. Use [`renounce_admin`](Self::renounce_admin).
    pub fn grant_role(
        &mut self,
        caller: Address,
        role: Role,
        account: Address,
    ) -> Result<bool, LedgerError> {
        self.only_admin(caller)?;
        if role == Role::Admin {
            return Err(LedgerError::AdminRoleNotTransferable);
        }
        if account.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        Ok(self.operators.insert(account))
    }

    /// Revokes `role` from `account`. Returns `false` if it was not held.
    pub fn revoke_role(
        &mut self,
        caller: Address,
        role: Role,
        account: Address,
    ) -> Result<bool, LedgerError> {
        self.only_admin(caller)?;
        if role == Role::Admin {
            return Err(LedgerError::AdminRoleNotTransferable);
        }
        Ok(self.operators.remove(&account))
    }

    /// Drops `role` from the caller. Only the operator role can be renounced.
    pub fn renounce_role(&mut self, caller: Address, role: Role) -> Result<(), LedgerError> {
        if role == Role::Admin {
            return Err(LedgerError::AdminRoleNotTransferable);
        }
        if !self.operators.remove(&caller) {
            return Err(LedgerError::RoleNotHeld {
                role,
                account: caller,
            });
        }
        Ok(())
    }

    /// Hands the admin role to `new_admin` and drops it from `caller`.
    pub fn renounce_admin(&mut self, caller: Address, new_admin: Address) -> Result<(), LedgerError> {
        self.only_admin(caller)?;
        if new_admin == caller {
            return Err(LedgerError::CannotRenounceSelf);
        }
        if new_admin.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        self.admins.insert(new_admin);
        self.admins.remove(&caller);
        debug_assert_eq!(self.admins.len(), 1);
        Ok(())
    }

    /// Adds every address in `accounts` to the operator role, or none of them.
    pub fn add_operators(&mut self, caller: Address, accounts: &[Address]) -> Result<(), LedgerError> {
        self.only_admin(caller)?;
        check_batch(accounts)?;
        let mut pending = HashSet::with_capacity(accounts.len());
        for account in accounts {
            if account.is_zero() {
                return Err(LedgerError::ZeroAddress);
            }
            if self.operators.contains(account) || !pending.insert(*account) {
                return Err(LedgerError::AlreadyOperator { account: *account });
            }
        }
        for account in accounts {
            self.operators.insert(*account);
        }
        Ok(())
    }

    /// Removes every address in `accounts` from the operator role, or none of them.
    pub fn remove_operators(
        &mut self,
        caller: Address,
        accounts: &[Address],
    ) -> Result<(), LedgerError> {
        self.only_admin(caller)?;
        check_batch(accounts)?;
        let mut pending = HashSet::with_capacity(accounts.len());
        for account in accounts {
            if !self.operators.contains(account) || !pending.insert(*account) {
                return Err(LedgerError::NotOperator { account: *account });
            }
        }
        for account in accounts {
            self.operators.remove(account);
        }
        Ok(())
    }

    /// Stores a new operator threshold and returns the previous one.
    pub fn set_operator_threshold(&mut self, caller: Address, value: u64) -> Result<u64, LedgerError> {
        self.only_admin(caller)?;
        Ok(std::mem::replace(&mut self.operator_threshold, value))
    }
}

fn check_batch(accounts: &[Address]) -> Result<(), LedgerError> {
    if accounts.len() > MAX_OPERATOR_BATCH {
        return Err(LedgerError::BatchTooLarge {
            count: accounts.len(),
            max: MAX_OPERATOR_BATCH,
        });
    }
    Ok(())
}
