//! # Custody Ledger
//!
//! [`CustodyLedger`] is the single state object behind every operation.
//! It composes the access registry, pause switch, balance ledger,
//! allowance table and event log, and is the only thing that mutates them.
//!
//! ## Operation discipline
//!
//! Every mutating operation follows the same order:
//!
//! 1. reject re-entrant calls (an external call is in flight),
//! 2. check the pause switch (user and operator operations only),
//! 3. check the caller's role,
//! 4. validate every precondition,
//! 5. apply state changes,
//! 6. append the event.
//!
//! Steps 1 to 4 never mutate anything, so a failure there leaves the
//! ledger untouched. Operations that call out to the host go through the
//! gateway's settle path, which undoes step 5 if the call fails.
//!
//! ## Upgrade model
//!
//! The ledger's logic is separate from its [`LedgerState`]. A state can be
//! exported with [`snapshot`](CustodyLedger::snapshot) and reattached to a
//! new build with [`from_state`](CustodyLedger::from_state). The
//! `initialized` flag travels with the state, so reattached state can
//! never be initialized a second time.

use serde::{Deserialize, Serialize};

use crate::access::{AccessControl, Role};
use crate::address::Address;
use crate::allowance::AllowanceTable;
use crate::balance::BalanceLedger;
use crate::config::{LedgerConfig, STATE_FORMAT_VERSION};
use crate::error::LedgerError;
use crate::events::{EventLog, EventRecord, LedgerEvent};
use crate::gateway::PendingInteraction;
use crate::host::Host;
use crate::pause::PauseSwitch;
use crate::units::Amount;

/// Everything the ledger persists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    pub(crate) format_version: u32,
    /// The ledger's own address; the operator of every outbound call.
    pub(crate) address: Address,
    pub(crate) initialized: bool,
    pub(crate) access: AccessControl,
    pub(crate) pause: PauseSwitch,
    pub(crate) balances: BalanceLedger,
    pub(crate) allowances: AllowanceTable,
    pub(crate) events: EventLog,
}

impl LedgerState {
    fn empty(address: Address) -> Self {
        Self {
            format_version: STATE_FORMAT_VERSION,
            address,
            initialized: false,
            access: AccessControl::new(),
            pause: PauseSwitch::default(),
            balances: BalanceLedger::default(),
            allowances: AllowanceTable::default(),
            events: EventLog::default(),
        }
    }

    /// Format version the state was written with.
    pub fn format_version(&self) -> u32 {
        self.format_version
    }
}

/// The custody ledger.
#[derive(Debug)]
pub struct CustodyLedger {
    pub(crate) state: LedgerState,
    /// Raised while an external call is in flight.
    pub(crate) entered: bool,
}

impl CustodyLedger {
    /// Deploys an uninitialized ledger at `address`.
    pub fn new(address: Address) -> Self {
        Self {
            state: LedgerState::empty(address),
            entered: false,
        }
    }

    /// Reattaches previously exported state.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnsupportedStateVersion`] if the state was written by
    /// an incompatible build, [`LedgerError::CorruptState`] if role
    /// membership or the balance totals are inconsistent.
    pub fn from_state(state: LedgerState) -> Result<Self, LedgerError> {
        if state.format_version != STATE_FORMAT_VERSION {
            return Err(LedgerError::UnsupportedStateVersion {
                found: state.format_version,
                expected: STATE_FORMAT_VERSION,
            });
        }
        state
            .access
            .verify(state.initialized)
            .and_then(|()| state.balances.verify())
            .map_err(|detail| {
                tracing::error!(address = %state.address, %detail, "rejected corrupt state");
                LedgerError::CorruptState(detail)
            })?;
        tracing::info!(
            address = %state.address,
            initialized = state.initialized,
            events = state.events.len(),
            "ledger state reattached"
        );
        Ok(Self {
            state,
            entered: false,
        })
    }

    /// Exports a copy of the full state.
    pub fn snapshot(&self) -> LedgerState {
        self.state.clone()
    }

    // -- Guards --------------------------------------------------------------

    pub(crate) fn ensure_idle(&self) -> Result<(), LedgerError> {
        if self.entered {
            tracing::warn!("rejected re-entrant call");
            return Err(LedgerError::ReentrantCall);
        }
        Ok(())
    }

    /// Idle and not paused.
    pub(crate) fn ensure_active(&self) -> Result<(), LedgerError> {
        self.ensure_idle()?;
        self.state.pause.ensure_not_paused()
    }

    pub(crate) fn emit(&mut self, event: LedgerEvent) {
        self.state.events.push(event);
    }

    // -- Initializer ---------------------------------------------------------

    /// One-time setup. `caller` becomes the sole admin.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AlreadyInitialized`] on any call after the first success.
    /// - [`LedgerError::InvalidConfig`] for duplicate or zero operators.
    /// - [`LedgerError::ZeroAddress`] if `caller` is zero.
    pub fn initialize(&mut self, caller: Address, config: &LedgerConfig) -> Result<(), LedgerError> {
        self.ensure_idle()?;
        if self.state.initialized {
            tracing::warn!(%caller, "rejected second initialization");
            return Err(LedgerError::AlreadyInitialized);
        }
        config.validate()?;
        if caller.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }

        let state = &mut self.state;
        state
            .access
            .seed(caller, &config.operators, config.operator_threshold)?;
        state.balances.set_global_user_limit(config.global_user_limit);
        state
            .balances
            .set_global_user_auth_limit(config.global_user_auth_limit);
        state.initialized = true;

        tracing::info!(
            admin = %caller,
            operators = config.operators.len(),
            threshold = config.operator_threshold,
            "ledger initialized"
        );
        self.emit(LedgerEvent::Initialized {
            admin: caller,
            operators: config.operators.clone(),
            operator_threshold: config.operator_threshold,
            global_user_limit: config.global_user_limit,
            global_user_auth_limit: config.global_user_auth_limit,
        });
        Ok(())
    }

    // -- Balance ledger ------------------------------------------------------

    /// Credits `amount` of native value that accompanied the call.
    ///
    /// The value must already have left the caller's external account; on
    /// error the caller is responsible for returning it. Returns the new
    /// balance.
    pub fn deposit(&mut self, caller: Address, amount: Amount) -> Result<Amount, LedgerError> {
        self.ensure_active()?;
        let new_balance = self.state.balances.credit(caller, amount)?;
        tracing::info!(user = %caller, amount, new_balance, "deposit");
        self.emit(LedgerEvent::DepositSuccessful {
            user: caller,
            amount_deposited: amount,
            new_balance,
        });
        Ok(new_balance)
    }

    /// Pays custodied value back to the caller's external account.
    ///
    /// `amount == 0` withdraws the whole balance. Returns the amount paid.
    pub fn withdraw(
        &mut self,
        host: &mut dyn Host,
        caller: Address,
        amount: Amount,
    ) -> Result<Amount, LedgerError> {
        self.ensure_active()?;
        let amount = match amount {
            0 => self.state.balances.balance_of(caller),
            n => n,
        };

        let settlement = self.settle(host, PendingInteraction::payout(caller, caller, amount))?;

        tracing::info!(
            user = %caller,
            amount,
            new_balance = settlement.remaining_balance,
            "withdrawal"
        );
        self.emit(LedgerEvent::WithdrawalSuccessful {
            user: caller,
            amount_withdrawn: amount,
            new_balance: settlement.remaining_balance,
        });
        Ok(amount)
    }

    // -- Allowance table -----------------------------------------------------

    /// Sets the amount `spender` may move out of the caller's balance,
    /// replacing any previous value.
    pub fn approve(
        &mut self,
        caller: Address,
        spender: Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.ensure_active()?;
        if spender.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        self.state.balances.check_auth_limit(amount)?;

        self.state.allowances.set(caller, spender, amount);
        tracing::info!(owner = %caller, %spender, amount, "approval");
        self.emit(LedgerEvent::Approval {
            owner: caller,
            spender,
            amount,
        });
        Ok(())
    }

    /// Credits `value` through the deposit path, then approves `spender`.
    ///
    /// Both halves are validated before either applies. A zero `value`
    /// skips the deposit and its event.
    pub fn deposit_and_approve(
        &mut self,
        caller: Address,
        value: Amount,
        spender: Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.ensure_active()?;
        if spender.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        self.state.balances.check_auth_limit(amount)?;
        if value > 0 {
            self.state.balances.check_credit(caller, value)?;
            self.deposit(caller, value)?;
        }
        self.approve(caller, spender, amount)
    }

    // -- Access control ------------------------------------------------------

    /// Grants the operator role. Returns `false` (and emits nothing) if
    /// `account` already held it.
    pub fn grant_role(
        &mut self,
        caller: Address,
        role: Role,
        account: Address,
    ) -> Result<bool, LedgerError> {
        self.ensure_idle()?;
        let granted = self.state.access.grant_role(caller, role, account)?;
        if granted {
            tracing::info!(%role, %account, sender = %caller, "role granted");
            self.emit(LedgerEvent::RoleGranted {
                role,
                account,
                sender: caller,
            });
        }
        Ok(granted)
    }

    /// Revokes the operator role. Returns `false` (and emits nothing) if
    /// `account` did not hold it.
    pub fn revoke_role(
        &mut self,
        caller: Address,
        role: Role,
        account: Address,
    ) -> Result<bool, LedgerError> {
        self.ensure_idle()?;
        let revoked = self.state.access.revoke_role(caller, role, account)?;
        if revoked {
            tracing::info!(%role, %account, sender = %caller, "role revoked");
            self.emit(LedgerEvent::RoleRevoked {
                role,
                account,
                sender: caller,
            });
        }
        Ok(revoked)
    }

    /// The caller gives up its own operator role.
    pub fn renounce_role(&mut self, caller: Address, role: Role) -> Result<(), LedgerError> {
        self.ensure_idle()?;
        self.state.access.renounce_role(caller, role)?;
        tracing::info!(%role, account = %caller, "role renounced");
        self.emit(LedgerEvent::RoleRevoked {
            role,
            account: caller,
            sender: caller,
        });
        Ok(())
    }

    /// Hands the admin role to `new_admin`. Exactly one admin exists before
    /// and after.
    pub fn renounce_admin(&mut self, caller: Address, new_admin: Address) -> Result<(), LedgerError> {
        self.ensure_idle()?;
        self.state.access.renounce_admin(caller, new_admin)?;
        tracing::info!(old_admin = %caller, %new_admin, "admin handed over");
        self.emit(LedgerEvent::RoleGranted {
            role: Role::Admin,
            account: new_admin,
            sender: caller,
        });
        self.emit(LedgerEvent::RoleRevoked {
            role: Role::Admin,
            account: caller,
            sender: caller,
        });
        Ok(())
    }

    /// Grants the operator role to every listed address, or to none.
    pub fn admin_add_operators(
        &mut self,
        caller: Address,
        operators: &[Address],
    ) -> Result<(), LedgerError> {
        self.ensure_idle()?;
        self.state.access.add_operators(caller, operators)?;
        tracing::info!(count = operators.len(), "operators added");
        self.emit(LedgerEvent::OperatorsAdded {
            operators: operators.to_vec(),
        });
        Ok(())
    }

    /// Revokes the operator role from every listed address, or from none.
    pub fn admin_remove_operators(
        &mut self,
        caller: Address,
        operators: &[Address],
    ) -> Result<(), LedgerError> {
        self.ensure_idle()?;
        self.state.access.remove_operators(caller, operators)?;
        tracing::info!(count = operators.len(), "operators removed");
        self.emit(LedgerEvent::OperatorsRemoved {
            operators: operators.to_vec(),
        });
        Ok(())
    }

    pub fn admin_change_operator_threshold(
        &mut self,
        caller: Address,
        value: u64,
    ) -> Result<(), LedgerError> {
        self.ensure_idle()?;
        let old_threshold = self.state.access.set_operator_threshold(caller, value)?;
        tracing::info!(old_threshold, new_threshold = value, "operator threshold changed");
        self.emit(LedgerEvent::OperatorThresholdChanged {
            old_threshold,
            new_threshold: value,
        });
        Ok(())
    }

    /// Replaces the per-user custody cap. Balances already above a lowered
    /// cap are kept; only later deposits are limited.
    pub fn admin_change_global_user_limit(
        &mut self,
        caller: Address,
        limit: Amount,
    ) -> Result<(), LedgerError> {
        self.ensure_idle()?;
        self.state.access.only_admin(caller)?;
        let old_limit = self.state.balances.set_global_user_limit(limit);
        tracing::info!(old_limit, new_limit = limit, "global user limit changed");
        self.emit(LedgerEvent::GlobalUserLimitChanged {
            old_limit,
            new_limit: limit,
        });
        Ok(())
    }

    /// Replaces the per-approval authorization cap. Existing allowances
    /// are kept.
    pub fn admin_change_global_user_auth_limit(
        &mut self,
        caller: Address,
        limit: Amount,
    ) -> Result<(), LedgerError> {
        self.ensure_idle()?;
        self.state.access.only_admin(caller)?;
        let old_limit = self.state.balances.set_global_user_auth_limit(limit);
        tracing::info!(old_limit, new_limit = limit, "global user auth limit changed");
        self.emit(LedgerEvent::GlobalUserAuthLimitChanged {
            old_limit,
            new_limit: limit,
        });
        Ok(())
    }

    // -- Pause switch --------------------------------------------------------

    pub fn admin_pause(&mut self, caller: Address) -> Result<(), LedgerError> {
        self.ensure_idle()?;
        self.state.access.only_admin(caller)?;
        self.state.pause.pause()?;
        tracing::warn!(admin = %caller, "ledger paused");
        self.emit(LedgerEvent::Paused { account: caller });
        Ok(())
    }

    pub fn admin_unpause(&mut self, caller: Address) -> Result<(), LedgerError> {
        self.ensure_idle()?;
        self.state.access.only_admin(caller)?;
        self.state.pause.unpause()?;
        tracing::info!(admin = %caller, "ledger unpaused");
        self.emit(LedgerEvent::Unpaused { account: caller });
        Ok(())
    }

    // -- Reads ---------------------------------------------------------------

    /// The ledger's own address.
    pub fn address(&self) -> Address {
        self.state.address
    }

    pub fn is_initialized(&self) -> bool {
        self.state.initialized
    }

    pub fn is_paused(&self) -> bool {
        self.state.pause.is_paused()
    }

    pub fn balance_of(&self, user: Address) -> Amount {
        self.state.balances.balance_of(user)
    }

    /// Every account that has ever been credited, with its current balance.
    pub fn balances(&self) -> impl Iterator<Item = (Address, Amount)> + '_ {
        self.state.balances.balances()
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> Amount {
        self.state.allowances.allowance(owner, spender)
    }

    pub fn global_user_limit(&self) -> Amount {
        self.state.balances.global_user_limit()
    }

    pub fn global_user_auth_limit(&self) -> Amount {
        self.state.balances.global_user_auth_limit()
    }

    /// Sum of all custodied balances.
    pub fn total_custodied(&self) -> Amount {
        self.state.balances.total_custodied()
    }

    /// Native asset held by the ledger. Never less than
    /// [`total_custodied`](Self::total_custodied).
    pub fn native_held(&self) -> Amount {
        self.state.balances.native_held()
    }

    pub fn operator_threshold(&self) -> u64 {
        self.state.access.operator_threshold()
    }

    pub fn has_role(&self, role: Role, account: Address) -> bool {
        self.state.access.has_role(role, account)
    }

    pub fn role_member_count(&self, role: Role) -> usize {
        self.state.access.role_member_count(role)
    }

    /// Holder of `role` at `index`. Enumeration order is not stable across removals.
    pub fn role_member(&self, role: Role, index: usize) -> Option<Address> {
        self.state.access.role_member(role, index)
    }

    pub fn role_members(&self, role: Role) -> &[Address] {
        self.state.access.role_members(role)
    }

    pub fn role_admin(&self, role: Role) -> Role {
        self.state.access.role_admin(role)
    }

    /// The sole admin, once initialized.
    pub fn admin(&self) -> Option<Address> {
        self.state.access.admin()
    }

    /// Full event history.
    pub fn events(&self) -> &[EventRecord] {
        self.state.events.records()
    }

    /// Events recorded after sequence number `seq`.
    pub fn events_since(&self, seq: u64) -> &[EventRecord] {
        self.state.events.since(seq)
    }

    /// The most recent event.
    pub fn last_event(&self) -> Option<&LedgerEvent> {
        self.state.events.last()
    }
}
