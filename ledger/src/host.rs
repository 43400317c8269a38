//! # Host Environment
//!
//! The [`Host`] is everything outside the ledger: users' external native
//! accounts and the deployed token contracts. The ledger reaches it only
//! through [`Host::execute`], and only with a [`CommittedCall`], which
//! can exist only after the ledger's own effects are final.
//!
//! The host receives `&mut CustodyLedger` alongside the call because an
//! external contract may call back into the ledger. Such re-entrant
//! mutating calls are rejected by the ledger's operation guard; reads see
//! the already-committed state.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::address::Address;
use crate::gateway::{CommittedCall, ExternalCall};
use crate::ledger::CustodyLedger;
use crate::mock::{InMemoryFungible, InMemoryMulti, InMemoryUnique};
use crate::token::{ExternalError, FungibleToken, MultiToken, TokenStandard, UniqueToken};
use crate::units::Amount;

/// Executes the ledger's outbound calls.
pub trait Host {
    /// Performs `call`. An `Err` makes the ledger undo the operation.
    fn execute(
        &mut self,
        ledger: &mut CustodyLedger,
        call: &CommittedCall,
    ) -> Result<(), ExternalError>;
}

/// A host with no external world. Every outbound call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHost;

impl Host for NullHost {
    fn execute(
        &mut self,
        _ledger: &mut CustodyLedger,
        call: &CommittedCall,
    ) -> Result<(), ExternalError> {
        Err(ExternalError::UnknownContract(call.call().target()))
    }
}

// ---------------------------------------------------------------------------
// InMemoryHost
// ---------------------------------------------------------------------------

/// Code that runs when an address receives native value or a token item,
/// like a contract's receive / `onERC721Received` / `onERC1155Received`
/// callback. Returning `Err` rejects the incoming value.
pub type ReceiveHook = Box<dyn FnMut(&mut CustodyLedger) -> Result<(), ExternalError>>;

/// A simulated chain: external native balances, token contracts and
/// receiver callbacks.
#[derive(Default)]
pub struct InMemoryHost {
    native: BTreeMap<Address, Amount>,
    fungibles: BTreeMap<Address, InMemoryFungible>,
    uniques: BTreeMap<Address, InMemoryUnique>,
    multis: BTreeMap<Address, InMemoryMulti>,
    rejecting: BTreeSet<Address>,
    hooks: HashMap<Address, ReceiveHook>,
}

impl InMemoryHost {
    /// Creates an empty host.
    pub fn new() -> Self {
        Self::default()
    }

    // -- Native accounts -----------------------------------------------------

    /// Adds `amount` to `account`'s external native balance.
    pub fn fund_native(&mut self, account: Address, amount: Amount) {
        *self.native.entry(account).or_insert(0) += amount;
    }

    /// External native balance of `account`.
    pub fn native_balance(&self, account: Address) -> Amount {
        self.native.get(&account).copied().unwrap_or(0)
    }

    /// Takes `amount` from `account`'s external balance to accompany a
    /// ledger call (the value a deposit carries).
    pub fn attach_value(&mut self, account: Address, amount: Amount) -> Result<(), ExternalError> {
        let balance = self.native_balance(account);
        let remaining = balance
            .checked_sub(amount)
            .ok_or_else(|| ExternalError::PayoutRejected {
                to: account,
                reason: format!("insufficient native funds: has {balance}, needs {amount}"),
            })?;
        self.native.insert(account, remaining);
        Ok(())
    }

    /// Returns value taken by [`attach_value`](Self::attach_value) when the ledger call failed.
    pub fn refund_value(&mut self, account: Address, amount: Amount) {
        self.fund_native(account, amount);
    }

    /// Makes every native payment to `account` fail.
    pub fn reject_native(&mut self, account: Address) {
        self.rejecting.insert(account);
    }

    /// Installs a receiver callback for `account`.
    pub fn on_receive(&mut self, account: Address, hook: ReceiveHook) {
        self.hooks.insert(account, hook);
    }

    // -- Contracts -----------------------------------------------------------

    /// Deploys an empty fungible token at `address`, replacing any contract there.
    pub fn deploy_fungible(&mut self, address: Address) -> &mut InMemoryFungible {
        self.undeploy(address);
        self.fungibles
            .entry(address)
            .or_insert_with(|| InMemoryFungible::new(address))
    }

    /// Deploys an empty unique-item token at `address`, replacing any contract there.
    pub fn deploy_unique(&mut self, address: Address) -> &mut InMemoryUnique {
        self.undeploy(address);
        self.uniques
            .entry(address)
            .or_insert_with(|| InMemoryUnique::new(address))
    }

    /// Deploys an empty multi-item token at `address`, replacing any contract there.
    pub fn deploy_multi(&mut self, address: Address) -> &mut InMemoryMulti {
        self.undeploy(address);
        self.multis
            .entry(address)
            .or_insert_with(|| InMemoryMulti::new(address))
    }

    fn undeploy(&mut self, address: Address) {
        self.fungibles.remove(&address);
        self.uniques.remove(&address);
        self.multis.remove(&address);
    }

    /// The standard of the contract at `address`, if one is deployed.
    pub fn standard_at(&self, address: Address) -> Option<TokenStandard> {
        if self.fungibles.contains_key(&address) {
            Some(TokenStandard::Fungible)
        } else if self.uniques.contains_key(&address) {
            Some(TokenStandard::Unique)
        } else if self.multis.contains_key(&address) {
            Some(TokenStandard::Multi)
        } else {
            None
        }
    }

    pub fn fungible(&self, address: Address) -> Option<&InMemoryFungible> {
        self.fungibles.get(&address)
    }

    pub fn fungible_mut(&mut self, address: Address) -> Option<&mut InMemoryFungible> {
        self.fungibles.get_mut(&address)
    }

    pub fn unique(&self, address: Address) -> Option<&InMemoryUnique> {
        self.uniques.get(&address)
    }

    pub fn unique_mut(&mut self, address: Address) -> Option<&mut InMemoryUnique> {
        self.uniques.get_mut(&address)
    }

    pub fn multi(&self, address: Address) -> Option<&InMemoryMulti> {
        self.multis.get(&address)
    }

    pub fn multi_mut(&mut self, address: Address) -> Option<&mut InMemoryMulti> {
        self.multis.get_mut(&address)
    }

    fn missing(&self, contract: Address, expected: TokenStandard) -> ExternalError {
        if self.standard_at(contract).is_some() {
            ExternalError::StandardMismatch { contract, expected }
        } else {
            ExternalError::UnknownContract(contract)
        }
    }

    fn run_hook(&mut self, ledger: &mut CustodyLedger, to: Address) -> Result<(), ExternalError> {
        match self.hooks.get_mut(&to) {
            Some(hook) => hook(ledger),
            None => Ok(()),
        }
    }

    fn pay_native(
        &mut self,
        ledger: &mut CustodyLedger,
        to: Address,
        amount: Amount,
    ) -> Result<(), ExternalError> {
        if self.rejecting.contains(&to) {
            return Err(ExternalError::PayoutRejected {
                to,
                reason: "recipient rejects native value".into(),
            });
        }
        self.fund_native(to, amount);
        if let Err(e) = self.run_hook(ledger, to) {
            // The recipient reverted: the value never arrived.
            if let Some(balance) = self.native.get_mut(&to) {
                *balance -= amount;
            }
            return Err(e);
        }
        Ok(())
    }
}

impl Host for InMemoryHost {
    fn execute(
        &mut self,
        ledger: &mut CustodyLedger,
        call: &CommittedCall,
    ) -> Result<(), ExternalError> {
        let operator = call.operator();
        match call.call() {
            ExternalCall::PayNative { to, amount } => self.pay_native(ledger, *to, *amount),

            ExternalCall::Fungible {
                contract,
                from,
                to,
                amount,
            } => match self.fungibles.get_mut(contract) {
                Some(token) => token.transfer_from(operator, *from, *to, *amount),
                None => Err(self.missing(*contract, TokenStandard::Fungible)),
            },

            ExternalCall::Unique {
                contract,
                from,
                to,
                token_id,
            } => {
                let Some(token) = self.uniques.get_mut(contract) else {
                    return Err(self.missing(*contract, TokenStandard::Unique));
                };
                let before = token.clone();
                token.safe_transfer_from(operator, *from, *to, *token_id)?;
                if let Err(e) = self.run_hook(ledger, *to) {
                    self.uniques.insert(*contract, before);
                    return Err(e);
                }
                Ok(())
            }

            ExternalCall::Multi {
                contract,
                from,
                to,
                token_id,
                amount,
                data,
            } => {
                let Some(token) = self.multis.get_mut(contract) else {
                    return Err(self.missing(*contract, TokenStandard::Multi));
                };
                let before = token.clone();
                token.safe_transfer_from(operator, *from, *to, *token_id, *amount, data)?;
                if let Err(e) = self.run_hook(ledger, *to) {
                    self.multis.insert(*contract, before);
                    return Err(e);
                }
                Ok(())
            }
        }
    }
}
