//! # Operator Transfer Gateway
//!
//! The only path by which value or tokens leave custody on a user's
//! behalf. Both gateway operations are operator-only and pause-gated:
//!
//! - [`send`](CustodyLedger::send) moves custodied native value from a
//!   user's balance to a spender's external account, consuming the
//!   allowance the user granted that spender.
//! - [`transfer`](CustodyLedger::transfer) asks an external token contract
//!   to move tokens the user has approved the gateway to move.
//!
//! ## Checks, effects, interactions
//!
//! Every outbound call goes through [`CustodyLedger::settle`]:
//!
//! 1. **Checks**: balance and allowance preconditions are validated.
//! 2. **Effects**: debits are applied. This step is the only place a
//!    [`CommittedCall`] can be constructed.
//! 3. **Interaction**: the host executes the call with the operation
//!    guard raised, so a re-entrant mutating call fails.
//!
//! If the host reports failure, the effects from step 2 are restored
//! exactly and the operation returns the external error.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::LedgerError;
use crate::events::LedgerEvent;
use crate::host::Host;
use crate::ledger::CustodyLedger;
use crate::token::{TokenStandard, TransferRequest};
use crate::units::{Amount, TokenId};

// ---------------------------------------------------------------------------
// Outbound calls
// ---------------------------------------------------------------------------

/// A call to the world outside the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalCall {
    /// Pay native value to an external account.
    PayNative { to: Address, amount: Amount },
    /// Fungible `transfer_from`.
    Fungible {
        contract: Address,
        from: Address,
        to: Address,
        amount: Amount,
    },
    /// Unique-item `safe_transfer_from`.
    Unique {
        contract: Address,
        from: Address,
        to: Address,
        token_id: TokenId,
    },
    /// Multi-item `safe_transfer_from`.
    Multi {
        contract: Address,
        from: Address,
        to: Address,
        token_id: TokenId,
        amount: Amount,
        data: Vec<u8>,
    },
}

impl ExternalCall {
    /// The address the call is sent to.
    pub fn target(&self) -> Address {
        match self {
            ExternalCall::PayNative { to, .. } => *to,
            ExternalCall::Fungible { contract, .. }
            | ExternalCall::Unique { contract, .. }
            | ExternalCall::Multi { contract, .. } => *contract,
        }
    }

    fn is_noop(&self) -> bool {
        matches!(self, ExternalCall::PayNative { amount: 0, .. })
    }
}

/// An [`ExternalCall`] whose ledger-side effects are already committed.
///
/// There is no public constructor. One is produced only after the ledger
/// has applied the operation's debits.
#[derive(Debug)]
pub struct CommittedCall {
    operator: Address,
    call: ExternalCall,
}

impl CommittedCall {
    /// The address the call is made from (the gateway itself).
    pub fn operator(&self) -> Address {
        self.operator
    }

    /// The call to perform.
    pub fn call(&self) -> &ExternalCall {
        &self.call
    }
}

/// Values left after a settled interaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Settlement {
    pub remaining_balance: Amount,
    pub remaining_allowance: Amount,
}

/// Saved pre-effect values, restored if the interaction fails.
struct Rollback {
    balance: Option<crate::balance::BalanceCheckpoint>,
    allowance: Option<(Address, Address, Option<Amount>)>,
}

impl Rollback {
    fn apply(self, ledger: &mut CustodyLedger) {
        if let Some(cp) = self.balance {
            ledger.state.balances.restore(cp);
        }
        if let Some((owner, spender, previous)) = self.allowance {
            ledger.state.allowances.restore(owner, spender, previous);
        }
    }
}

/// Effects to commit, plus the call to make once they are committed.
pub(crate) struct PendingInteraction {
    debit: Option<(Address, Amount)>,
    spend_allowance: Option<(Address, Address, Amount)>,
    call: ExternalCall,
}

impl PendingInteraction {
    /// Debit `account` and pay the amount out to `to`.
    pub(crate) fn payout(account: Address, to: Address, amount: Amount) -> Self {
        Self {
            debit: Some((account, amount)),
            spend_allowance: None,
            call: ExternalCall::PayNative { to, amount },
        }
    }

    /// Also consume `amount` of the allowance `owner` granted `spender`.
    pub(crate) fn spending_allowance(mut self, owner: Address, spender: Address) -> Self {
        let amount = self.debit.map(|(_, a)| a).unwrap_or(0);
        self.spend_allowance = Some((owner, spender, amount));
        self
    }

    /// A call with no ledger-side effects.
    pub(crate) fn call_only(call: ExternalCall) -> Self {
        Self {
            debit: None,
            spend_allowance: None,
            call,
        }
    }

    /// Validates and applies the effects, returning the call to execute.
    fn commit(
        self,
        ledger: &mut CustodyLedger,
    ) -> Result<(CommittedCall, Rollback, Settlement), LedgerError> {
        let state = &mut ledger.state;

        // Checks
        if let Some((owner, spender, amount)) = self.spend_allowance {
            state.allowances.check_spend(owner, spender, amount)?;
        }
        if let Some((account, amount)) = self.debit {
            state.balances.check_debit(account, amount)?;
        }

        // Effects
        let rollback = Rollback {
            balance: self.debit.map(|(a, _)| state.balances.checkpoint(a)),
            allowance: self
                .spend_allowance
                .map(|(o, s, _)| (o, s, state.allowances.raw(o, s))),
        };
        let mut settlement = Settlement::default();
        if let Some((owner, spender, amount)) = self.spend_allowance {
            settlement.remaining_allowance = state.allowances.spend(owner, spender, amount)?;
        }
        if let Some((account, amount)) = self.debit {
            settlement.remaining_balance = state.balances.debit(account, amount)?;
        }

        let committed = CommittedCall {
            operator: state.address,
            call: self.call,
        };
        Ok((committed, rollback, settlement))
    }
}

/// Result of a successful [`CustodyLedger::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    #[serde(with = "crate::units::as_units")]
    pub amount_sent: Amount,
    #[serde(with = "crate::units::as_units")]
    pub remaining_sender_balance: Amount,
    #[serde(with = "crate::units::as_units")]
    pub remaining_allowance: Amount,
}

// ---------------------------------------------------------------------------
// Gateway operations
// ---------------------------------------------------------------------------

impl CustodyLedger {
    /// Commits `pending`'s effects, then executes its call on `host`.
    /// Undoes the effects if the call fails.
    pub(crate) fn settle(
        &mut self,
        host: &mut dyn Host,
        pending: PendingInteraction,
    ) -> Result<Settlement, LedgerError> {
        let (committed, rollback, settlement) = pending.commit(self)?;
        if committed.call.is_noop() {
            return Ok(settlement);
        }

        self.entered = true;
        tracing::debug!(callee = %committed.call.target(), "external call started");
        let result = host.execute(self, &committed);
        self.entered = false;

        if let Err(e) = result {
            tracing::warn!(
                callee = %committed.call.target(),
                error = %e,
                "external call failed, rolling back"
            );
            rollback.apply(self);
            return Err(e.into());
        }
        Ok(settlement)
    }

    /// Pays `amount` of `from`'s custodied balance to `to`'s external account.
    ///
    /// Requires the operator role, `allowance(from, to) >= amount` and
    /// `balance_of(from) >= amount`. The allowance is reduced by `amount`:
    /// repeated sends can never move more than was approved.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Paused`] / [`LedgerError::ReentrantCall`]
    /// - [`LedgerError::MissingOperatorRole`]
    /// - [`LedgerError::ZeroAddress`] if `to` is zero
    /// - [`LedgerError::InsufficientAllowance`] / [`LedgerError::InsufficientBalance`]
    /// - [`LedgerError::External`] if the payout is rejected; nothing changes.
    pub fn send(
        &mut self,
        host: &mut dyn Host,
        caller: Address,
        amount: Amount,
        from: Address,
        to: Address,
    ) -> Result<SendReceipt, LedgerError> {
        self.ensure_active()?;
        self.state.access.only_operator(caller)?;
        if to.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }

        let pending = PendingInteraction::payout(from, to, amount).spending_allowance(from, to);
        let settlement = self.settle(host, pending)?;

        let receipt = SendReceipt {
            amount_sent: amount,
            remaining_sender_balance: settlement.remaining_balance,
            remaining_allowance: settlement.remaining_allowance,
        };
        tracing::info!(
            operator = %caller,
            %from,
            %to,
            amount,
            remaining_balance = receipt.remaining_sender_balance,
            remaining_allowance = receipt.remaining_allowance,
            "send settled"
        );
        self.emit(LedgerEvent::SendSuccessful {
            from,
            to,
            amount_sent: amount,
            remaining_sender_balance: receipt.remaining_sender_balance,
            remaining_allowance: receipt.remaining_allowance,
        });
        Ok(receipt)
    }

    /// Bridges a transfer on an external token contract on behalf of `request.from`.
    ///
    /// The ledger holds no state for this operation; authorization lives
    /// in the external contract (`from` must have approved this gateway
    /// there). The contract's own failure is returned as
    /// [`LedgerError::External`]. An unknown type code fails with
    /// [`LedgerError::UnsupportedTokenType`] once the guards have passed.
    pub fn transfer(
        &mut self,
        host: &mut dyn Host,
        caller: Address,
        request: &TransferRequest,
    ) -> Result<(), LedgerError> {
        self.ensure_active()?;
        self.state.access.only_operator(caller)?;

        let token_type = request.standard()?;
        let TransferRequest {
            amount,
            token_id,
            token_contract: contract,
            from,
            to,
            ..
        } = *request;
        let call = match token_type {
            TokenStandard::Fungible => ExternalCall::Fungible {
                contract,
                from,
                to,
                amount,
            },
            TokenStandard::Unique => ExternalCall::Unique {
                contract,
                from,
                to,
                token_id,
            },
            TokenStandard::Multi => ExternalCall::Multi {
                contract,
                from,
                to,
                token_id,
                amount,
                data: Vec::new(),
            },
        };

        self.settle(host, PendingInteraction::call_only(call))?;
        tracing::info!(
            operator = %caller,
            %contract,
            standard = %token_type,
            %from,
            %to,
            amount,
            token_id,
            "token transfer bridged"
        );
        Ok(())
    }
}
