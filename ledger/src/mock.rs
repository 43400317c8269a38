//! # In-Memory Token Contracts
//!
//! Minimal fungible, unique and multi-item token contracts with the
//! authorization rules of their on-chain counterparts. They back the
//! [`InMemoryHost`](crate::host::InMemoryHost) used by tests, benchmarks
//! and the `custody-node` scenario runner.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::token::{ExternalError, FungibleToken, MultiToken, UniqueToken};
use crate::units::{Amount, TokenId};

/// Events emitted by the in-memory contracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum TokenEvent {
    /// Fungible units or a unique item moved.
    Transfer {
        from: Address,
        to: Address,
        #[serde(with = "crate::units::as_integer")]
        value: u128,
    },
    /// Units of one multi-token item moved.
    TransferSingle {
        operator: Address,
        from: Address,
        to: Address,
        #[serde(with = "crate::units::as_integer")]
        id: TokenId,
        #[serde(with = "crate::units::as_integer")]
        value: Amount,
    },
}

fn revert(contract: Address, reason: &str) -> ExternalError {
    ExternalError::Reverted {
        contract,
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Fungible
// ---------------------------------------------------------------------------

/// An ERC-20-like contract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryFungible {
    address: Address,
    balances: BTreeMap<Address, Amount>,
    allowances: BTreeMap<(Address, Address), Amount>,
    events: Vec<TokenEvent>,
}

impl InMemoryFungible {
    /// Creates an empty contract deployed at `address`.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }

    /// Creates `amount` units for `to`.
    pub fn mint(&mut self, to: Address, amount: Amount) {
        *self.balances.entry(to).or_insert(0) += amount;
        self.events.push(TokenEvent::Transfer {
            from: Address::ZERO,
            to,
            value: amount,
        });
    }

    /// Sets the allowance `owner` grants `spender`.
    pub fn approve(&mut self, owner: Address, spender: Address, amount: Amount) {
        self.allowances.insert((owner, spender), amount);
    }

    pub fn balance_of(&self, account: Address) -> Amount {
        self.balances.get(&account).copied().unwrap_or(0)
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> Amount {
        self.allowances.get(&(owner, spender)).copied().unwrap_or(0)
    }

    /// Everything this contract has emitted.
    pub fn events(&self) -> &[TokenEvent] {
        &self.events
    }
}

impl FungibleToken for InMemoryFungible {
    fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), ExternalError> {
        if to.is_zero() {
            return Err(revert(self.address, "transfer to the zero address"));
        }
        let remaining_allowance = if spender == from {
            None
        } else {
            let allowed = self.allowance(from, spender);
            Some(
                allowed
                    .checked_sub(amount)
                    .ok_or_else(|| revert(self.address, "insufficient allowance"))?,
            )
        };
        let from_balance = self
            .balance_of(from)
            .checked_sub(amount)
            .ok_or_else(|| revert(self.address, "transfer amount exceeds balance"))?;

        if let Some(remaining) = remaining_allowance {
            self.allowances.insert((from, spender), remaining);
        }
        self.balances.insert(from, from_balance);
        *self.balances.entry(to).or_insert(0) += amount;
        self.events.push(TokenEvent::Transfer {
            from,
            to,
            value: amount,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unique
// ---------------------------------------------------------------------------

/// An ERC-721-like contract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryUnique {
    address: Address,
    owners: BTreeMap<TokenId, Address>,
    token_approvals: BTreeMap<TokenId, Address>,
    operator_approvals: BTreeSet<(Address, Address)>,
    events: Vec<TokenEvent>,
}

impl InMemoryUnique {
    /// Creates an empty contract deployed at `address`.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }

    /// Creates item `token_id` owned by `to`. Existing items are left untouched.
    pub fn mint(&mut self, to: Address, token_id: TokenId) -> Result<(), ExternalError> {
        if self.owners.contains_key(&token_id) {
            return Err(revert(self.address, "token already minted"));
        }
        self.owners.insert(token_id, to);
        self.events.push(TokenEvent::Transfer {
            from: Address::ZERO,
            to,
            value: token_id,
        });
        Ok(())
    }

    /// Approves `approved` for a single item.
    pub fn approve(&mut self, token_id: TokenId, approved: Address) {
        self.token_approvals.insert(token_id, approved);
    }

    /// Approves or revokes `operator` for every item `owner` holds.
    pub fn set_approval_for_all(&mut self, owner: Address, operator: Address, approved: bool) {
        if approved {
            self.operator_approvals.insert((owner, operator));
        } else {
            self.operator_approvals.remove(&(owner, operator));
        }
    }

    pub fn owner_of(&self, token_id: TokenId) -> Option<Address> {
        self.owners.get(&token_id).copied()
    }

    pub fn balance_of(&self, owner: Address) -> usize {
        self.owners.values().filter(|o| **o == owner).count()
    }

    /// Everything this contract has emitted.
    pub fn events(&self) -> &[TokenEvent] {
        &self.events
    }
}

impl UniqueToken for InMemoryUnique {
    fn safe_transfer_from(
        &mut self,
        operator: Address,
        from: Address,
        to: Address,
        token_id: TokenId,
    ) -> Result<(), ExternalError> {
        let owner = self
            .owner_of(token_id)
            .ok_or_else(|| revert(self.address, "invalid token ID"))?;
        if owner != from {
            return Err(revert(self.address, "transfer from incorrect owner"));
        }
        let authorized = operator == owner
            || self.token_approvals.get(&token_id) == Some(&operator)
            || self.operator_approvals.contains(&(owner, operator));
        if !authorized {
            return Err(revert(self.address, "caller is not token owner or approved"));
        }
        if to.is_zero() {
            return Err(revert(self.address, "transfer to the zero address"));
        }
        self.token_approvals.remove(&token_id);
        self.owners.insert(token_id, to);
        self.events.push(TokenEvent::Transfer {
            from,
            to,
            value: token_id,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Multi
// ---------------------------------------------------------------------------

/// An ERC-1155-like contract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryMulti {
    address: Address,
    balances: BTreeMap<(TokenId, Address), Amount>,
    operator_approvals: BTreeSet<(Address, Address)>,
    events: Vec<TokenEvent>,
}

impl InMemoryMulti {
    /// Creates an empty contract deployed at `address`.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }

    /// Creates `amount` units of item `token_id` for `to`.
    pub fn mint(&mut self, to: Address, token_id: TokenId, amount: Amount) {
        *self.balances.entry((token_id, to)).or_insert(0) += amount;
        self.events.push(TokenEvent::TransferSingle {
            operator: to,
            from: Address::ZERO,
            to,
            id: token_id,
            value: amount,
        });
    }

    /// Approves or revokes `operator` for every item `owner` holds.
    pub fn set_approval_for_all(&mut self, owner: Address, operator: Address, approved: bool) {
        if approved {
            self.operator_approvals.insert((owner, operator));
        } else {
            self.operator_approvals.remove(&(owner, operator));
        }
    }

    pub fn balance_of(&self, account: Address, token_id: TokenId) -> Amount {
        self.balances
            .get(&(token_id, account))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_approved_for_all(&self, owner: Address, operator: Address) -> bool {
        self.operator_approvals.contains(&(owner, operator))
    }

    /// Everything this contract has emitted.
    pub fn events(&self) -> &[TokenEvent] {
        &self.events
    }
}

impl MultiToken for InMemoryMulti {
    fn safe_transfer_from(
        &mut self,
        operator: Address,
        from: Address,
        to: Address,
        token_id: TokenId,
        amount: Amount,
        _data: &[u8],
    ) -> Result<(), ExternalError> {
        if operator != from && !self.is_approved_for_all(from, operator) {
            return Err(revert(self.address, "caller is not token owner or approved"));
        }
        if to.is_zero() {
            return Err(revert(self.address, "transfer to the zero address"));
        }
        let from_balance = self
            .balance_of(from, token_id)
            .checked_sub(amount)
            .ok_or_else(|| revert(self.address, "insufficient balance for transfer"))?;
        self.balances.insert((token_id, from), from_balance);
        *self.balances.entry((token_id, to)).or_insert(0) += amount;
        self.events.push(TokenEvent::TransferSingle {
            operator,
            from,
            to,
            id: token_id,
            value: amount,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    #[test]
    fn fungible_spender_needs_allowance() {
        let mut token = InMemoryFungible::new(addr(100));
        token.mint(addr(1), 10);
        assert!(token.transfer_from(addr(9), addr(1), addr(2), 1).is_err());
        token.approve(addr(1), addr(9), 4);
        token.transfer_from(addr(9), addr(1), addr(2), 3).unwrap();
        assert_eq!(token.balance_of(addr(1)), 7);
        assert_eq!(token.balance_of(addr(2)), 3);
        assert_eq!(token.allowance(addr(1), addr(9)), 1);
    }

    #[test]
    fn fungible_owner_moves_without_allowance() {
        let mut token = InMemoryFungible::new(addr(100));
        token.mint(addr(1), 10);
        token.transfer_from(addr(1), addr(1), addr(2), 10).unwrap();
        assert_eq!(token.balance_of(addr(2)), 10);
        assert!(token.transfer_from(addr(1), addr(1), addr(2), 1).is_err());
    }

    #[test]
    fn unique_requires_owner_or_approval() {
        let mut token = InMemoryUnique::new(addr(101));
        token.mint(addr(1), 5).unwrap();
        assert!(token.safe_transfer_from(addr(9), addr(1), addr(2), 5).is_err());
        token.approve(5, addr(9));
        token.safe_transfer_from(addr(9), addr(1), addr(2), 5).unwrap();
        assert_eq!(token.owner_of(5), Some(addr(2)));
        // Single-item approval is cleared by the transfer.
        assert!(token.safe_transfer_from(addr(9), addr(2), addr(1), 5).is_err());
    }

    #[test]
    fn unique_rejects_wrong_owner() {
        let mut token = InMemoryUnique::new(addr(101));
        token.mint(addr(1), 5).unwrap();
        token.set_approval_for_all(addr(2), addr(9), true);
        let err = token
            .safe_transfer_from(addr(9), addr(2), addr(3), 5)
            .unwrap_err();
        assert!(err.to_string().contains("incorrect owner"));
    }

    #[test]
    fn multi_moves_partial_amounts() {
        let mut token = InMemoryMulti::new(addr(102));
        token.mint(addr(1), 7, 7);
        token.set_approval_for_all(addr(1), addr(9), true);
        token
            .safe_transfer_from(addr(9), addr(1), addr(2), 7, 3, &[])
            .unwrap();
        assert_eq!(token.balance_of(addr(1), 7), 4);
        assert_eq!(token.balance_of(addr(2), 7), 3);
        assert!(token
            .safe_transfer_from(addr(9), addr(1), addr(2), 7, 5, &[])
            .is_err());
    }
}
