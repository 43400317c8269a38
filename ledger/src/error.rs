//! # Ledger Errors
//!
//! Every rejected operation returns a [`LedgerError`]. The `Display` output
//! carries the offending values; [`LedgerError::reason`] gives the short,
//! stable reason string clients match on, and [`LedgerError::kind`] puts the
//! failure into one of five categories.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::access::Role;
use crate::address::Address;
use crate::config::ConfigError;
use crate::token::ExternalError;
use crate::units::Amount;

/// Coarse failure category of a [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Caller lacks the role the operation requires.
    Authorization,
    /// Operation attempted in the wrong pause / initialization / guard state.
    State,
    /// Malformed request: limits, role lists, token types.
    Validation,
    /// Insufficient balance or allowance.
    BusinessRule,
    /// An external contract or payout target rejected its part.
    External,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Authorization => write!(f, "authorization"),
            ErrorKind::State => write!(f, "state"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::BusinessRule => write!(f, "business_rule"),
            ErrorKind::External => write!(f, "external"),
        }
    }
}

/// Errors returned by ledger operations. No variant is ever returned after
/// a partial state change.
#[derive(Debug, Error)]
pub enum LedgerError {
    // --- Authorization ---
    /// Caller is not the admin.
    #[error("sender doesn't have admin role: {account}")]
    MissingAdminRole {
        /// The rejected caller.
        account: Address,
    },

    /// Caller is not an operator.
    #[error("sender doesn't have operator role: {account}")]
    MissingOperatorRole {
        /// The rejected caller.
        account: Address,
    },

    // --- State ---
    /// A mutating operation was attempted while paused.
    #[error("paused")]
    Paused,

    /// `admin_pause` while already paused.
    #[error("already paused")]
    AlreadyPaused,

    /// `admin_unpause` while not paused.
    #[error("not paused")]
    NotPaused,

    /// `initialize` on an instance that has already been initialized.
    #[error("already initialized")]
    AlreadyInitialized,

    /// A mutating operation arrived while an external call was in flight.
    #[error("reentrant call")]
    ReentrantCall,

    /// A saved state was produced by an incompatible format version.
    #[error("unsupported state format version {found} (expected {expected})")]
    UnsupportedStateVersion {
        /// Version found in the snapshot.
        found: u32,
        /// Version this build understands.
        expected: u32,
    },

    /// A saved state breaks one of the ledger's invariants.
    #[error("corrupt state: {0}")]
    CorruptState(String),

    // --- Validation ---
    /// Bulk add listed an address that is already an operator.
    #[error("already has operator role: {account}")]
    AlreadyOperator {
        /// The duplicate address.
        account: Address,
    },

    /// Bulk remove listed an address that is not an operator.
    #[error("removing non-operator: {account}")]
    NotOperator {
        /// The non-member address.
        account: Address,
    },

    /// `renounce_admin` named the caller as successor.
    #[error("cannot renounce self")]
    CannotRenounceSelf,

    /// `grant_role`/`revoke_role`/`renounce_role` on the admin role.
    #[error("admin role can only be moved with renounce_admin")]
    AdminRoleNotTransferable,

    /// `renounce_role` for a role the caller does not hold.
    #[error("account {account} does not hold role {role}")]
    RoleNotHeld {
        /// The role in question.
        role: Role,
        /// The caller.
        account: Address,
    },

    /// The zero address was named where a real account is required.
    #[error("zero address")]
    ZeroAddress,

    /// A bulk operator call listed too many addresses.
    #[error("operator batch too large: {count} (max {max})")]
    BatchTooLarge {
        /// Number of addresses in the call.
        count: usize,
        /// Allowed maximum.
        max: usize,
    },

    /// A deposit would push the user's balance over the global limit.
    #[error("deposit exceeds global user limit: balance {balance} + {amount} > {limit}")]
    UserLimitExceeded {
        /// Balance before the deposit.
        balance: Amount,
        /// Amount being deposited.
        amount: Amount,
        /// Current global user limit.
        limit: Amount,
    },

    /// An approval is larger than the global authorization limit.
    #[error("approval exceeds global auth limit: {amount} > {limit}")]
    AuthLimitExceeded {
        /// Requested allowance.
        amount: Amount,
        /// Current global auth limit.
        limit: Amount,
    },

    /// The numeric token type code does not name a supported standard.
    #[error("unreachable: unsupported token type {0}")]
    UnsupportedTokenType(u8),

    /// Checked arithmetic overflowed.
    #[error("amount overflow")]
    AmountOverflow,

    /// Initializer parameters failed validation.
    #[error("invalid config: {0}")]
    InvalidConfig(#[from] ConfigError),

    // --- Business rule ---
    /// Not enough custodied balance.
    #[error("insufficient balance: {account} has {available}, requested {requested}")]
    InsufficientBalance {
        /// The account being debited.
        account: Address,
        /// Its current balance.
        available: Amount,
        /// The amount requested.
        requested: Amount,
    },

    /// Not enough allowance for the spender.
    #[error("insufficient allowance: {owner} -> {spender} is {available}, requested {requested}")]
    InsufficientAllowance {
        /// Balance owner.
        owner: Address,
        /// Spender.
        spender: Address,
        /// Current allowance.
        available: Amount,
        /// Amount requested.
        requested: Amount,
    },

    // --- External ---
    /// The external contract or payout target rejected the call.
    #[error("external call failed: {0}")]
    External(#[from] ExternalError),
}

impl LedgerError {
    /// Failure category for this error.
    pub fn kind(&self) -> ErrorKind {
        use LedgerError::*;
        match self {
            MissingAdminRole { .. } | MissingOperatorRole { .. } => ErrorKind::Authorization,
            Paused
            | AlreadyPaused
            | NotPaused
            | AlreadyInitialized
            | ReentrantCall
            | UnsupportedStateVersion { .. }
            | CorruptState(_) => ErrorKind::State,
            AlreadyOperator { .. }
            | NotOperator { .. }
            | CannotRenounceSelf
            | AdminRoleNotTransferable
            | RoleNotHeld { .. }
            | ZeroAddress
            | BatchTooLarge { .. }
            | UserLimitExceeded { .. }
            | AuthLimitExceeded { .. }
            | UnsupportedTokenType(_)
            | AmountOverflow
            | InvalidConfig(_) => ErrorKind::Validation,
            InsufficientBalance { .. } | InsufficientAllowance { .. } => ErrorKind::BusinessRule,
            External(_) => ErrorKind::External,
        }
    }

    /// Short, stable, machine-readable reason string.
    pub fn reason(&self) -> &'static str {
        use LedgerError::*;
        match self {
            MissingAdminRole { .. } => "sender doesn't have admin role",
            MissingOperatorRole { .. } => "sender doesn't have operator role",
            Paused => "paused",
            AlreadyPaused => "already paused",
            NotPaused => "not paused",
            AlreadyInitialized => "already initialized",
            ReentrantCall => "reentrant call",
            UnsupportedStateVersion { .. } => "unsupported state version",
            CorruptState(_) => "corrupt state",
            AlreadyOperator { .. } => "already has operator role",
            NotOperator { .. } => "removing non-operator",
            CannotRenounceSelf => "cannot renounce self",
            AdminRoleNotTransferable => "admin role can only be moved with renounce_admin",
            RoleNotHeld { .. } => "role not held",
            ZeroAddress => "zero address",
            BatchTooLarge { .. } => "operator batch too large",
            UserLimitExceeded { .. } => "deposit exceeds global user limit",
            AuthLimitExceeded { .. } => "approval exceeds global auth limit",
            UnsupportedTokenType(_) => "unreachable",
            AmountOverflow => "amount overflow",
            InvalidConfig(_) => "invalid config",
            InsufficientBalance { .. } => "insufficient balance",
            InsufficientAllowance { .. } => "insufficient allowance",
            External(_) => "external call failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        let a = Address::from_low_u64(1);
        assert_eq!(
            LedgerError::MissingAdminRole { account: a }.kind(),
            ErrorKind::Authorization
        );
        assert_eq!(LedgerError::Paused.kind(), ErrorKind::State);
        assert_eq!(LedgerError::ReentrantCall.kind(), ErrorKind::State);
        assert_eq!(
            LedgerError::UnsupportedTokenType(9).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            LedgerError::InsufficientBalance {
                account: a,
                available: 0,
                requested: 1
            }
            .kind(),
            ErrorKind::BusinessRule
        );
        assert_eq!(
            LedgerError::from(ExternalError::UnknownContract(a)).kind(),
            ErrorKind::External
        );
    }

    #[test]
    fn display_starts_with_reason() {
        let a = Address::from_low_u64(1);
        let errors = [
            LedgerError::MissingAdminRole { account: a },
            LedgerError::AlreadyOperator { account: a },
            LedgerError::NotOperator { account: a },
            LedgerError::CannotRenounceSelf,
            LedgerError::AlreadyPaused,
            LedgerError::NotPaused,
        ];
        for err in errors {
            assert!(
                err.to_string().starts_with(err.reason()),
                "{err} should start with {}",
                err.reason()
            );
        }
    }
}
