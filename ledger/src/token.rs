//! # External Token Standards
//!
//! The gateway bridges transfers on three kinds of external contract. The
//! ledger never looks inside them; it only issues the standard transfer
//! call for the contract's shape and propagates the result.
//!
//! | Code | Standard | Call issued |
//! |------|----------|-------------|
//! | 0 | [`TokenStandard::Fungible`] | `transfer_from(from, to, amount)` |
//! | 1 | [`TokenStandard::Unique`] | `safe_transfer_from(from, to, token_id)` |
//! | 2 | [`TokenStandard::Multi`] | `safe_transfer_from(from, to, token_id, amount, data)` |

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Address;
use crate::error::LedgerError;
use crate::units::{Amount, TokenId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures reported by the world outside the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalError {
    /// The contract rejected the call.
    #[error("contract {contract} reverted: {reason}")]
    Reverted {
        /// The rejecting contract.
        contract: Address,
        /// The contract's revert reason.
        reason: String,
    },

    /// No contract is deployed at the address.
    #[error("no contract at {0}")]
    UnknownContract(Address),

    /// The contract does not implement the requested standard.
    #[error("contract {contract} is not a {expected} token")]
    StandardMismatch {
        /// The contract address.
        contract: Address,
        /// The standard the caller asked for.
        expected: TokenStandard,
    },

    /// A native payout target refused the value.
    #[error("payout to {to} rejected: {reason}")]
    PayoutRejected {
        /// The payout target.
        to: Address,
        /// Why it was refused.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// TokenStandard
// ---------------------------------------------------------------------------

/// The shape of an external token contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TokenStandard {
    /// Interchangeable units (ERC-20-like).
    Fungible,
    /// One-of-a-kind items (ERC-721-like).
    Unique,
    /// Many item types, each with a count (ERC-1155-like).
    Multi,
}

impl TokenStandard {
    /// Numeric code used on the wire.
    pub fn code(self) -> u8 {
        match self {
            TokenStandard::Fungible => 0,
            TokenStandard::Unique => 1,
            TokenStandard::Multi => 2,
        }
    }
}

impl TryFrom<u8> for TokenStandard {
    type Error = LedgerError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(TokenStandard::Fungible),
            1 => Ok(TokenStandard::Unique),
            2 => Ok(TokenStandard::Multi),
            other => Err(LedgerError::UnsupportedTokenType(other)),
        }
    }
}

impl From<TokenStandard> for u8 {
    fn from(standard: TokenStandard) -> Self {
        standard.code()
    }
}

impl fmt::Display for TokenStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenStandard::Fungible => write!(f, "fungible"),
            TokenStandard::Unique => write!(f, "unique"),
            TokenStandard::Multi => write!(f, "multi"),
        }
    }
}

// ---------------------------------------------------------------------------
// Contract interfaces
// ---------------------------------------------------------------------------

/// The owner-authorized transfer of a fungible token.
pub trait FungibleToken {
    /// Moves `amount` from `from` to `to`, spending `spender`'s allowance
    /// unless `spender == from`.
    fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), ExternalError>;
}

/// The safe ownership transfer of a unique item.
pub trait UniqueToken {
    /// Moves item `token_id` from `from` to `to`. `operator` must be the
    /// owner, the item's approved address, or an approved-for-all operator.
    fn safe_transfer_from(
        &mut self,
        operator: Address,
        from: Address,
        to: Address,
        token_id: TokenId,
    ) -> Result<(), ExternalError>;
}

/// The safe transfer of a multi-item token.
pub trait MultiToken {
    /// Moves `amount` units of item `token_id` from `from` to `to`.
    /// `operator` must be `from` or approved for all of `from`'s items.
    fn safe_transfer_from(
        &mut self,
        operator: Address,
        from: Address,
        to: Address,
        token_id: TokenId,
        amount: Amount,
        data: &[u8],
    ) -> Result<(), ExternalError>;
}

// ---------------------------------------------------------------------------
// Transfer request
// ---------------------------------------------------------------------------

/// Arguments of a gateway `transfer`.
///
/// `token_type` stays a raw code so an unknown value is rejected by the
/// gateway, after the pause and operator guards, rather than at decode time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Units to move. Ignored for [`TokenStandard::Unique`], which always moves one item.
    #[serde(with = "crate::units::as_integer")]
    pub amount: Amount,
    /// Contract shape code: 0 fungible, 1 unique, 2 multi.
    pub token_type: u8,
    /// Item id. Ignored for [`TokenStandard::Fungible`].
    #[serde(with = "crate::units::as_integer", default)]
    pub token_id: TokenId,
    /// The external contract.
    pub token_contract: Address,
    /// Current holder.
    pub from: Address,
    /// Recipient.
    pub to: Address,
}

impl TransferRequest {
    /// Resolves the type code.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnsupportedTokenType`] for codes other than 0, 1, 2.
    pub fn standard(&self) -> Result<TokenStandard, LedgerError> {
        TokenStandard::try_from(self.token_type)
    }
}
