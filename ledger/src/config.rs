//! # Ledger Configuration & Constants
//!
//! Constants that define the ledger's numeric and storage conventions, plus
//! [`LedgerConfig`], the parameter set handed to the one-time initializer.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Address;
use crate::units::{Amount, ONE_UNIT};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Fractional digits of the native asset. Matches the 18-decimal convention
/// of EVM-style chains so amounts map one-to-one onto wei.
pub const NATIVE_DECIMALS: u32 = 18;

/// Version tag written into every [`LedgerState`](crate::ledger::LedgerState)
/// snapshot. Bump when the snapshot layout changes incompatibly.
pub const STATE_FORMAT_VERSION: u32 = 1;

/// Default per-user custody cap: 1000 native units.
pub const DEFAULT_GLOBAL_USER_LIMIT: Amount = 1000 * ONE_UNIT;

/// Default per-operation authorization cap: 1000 native units.
pub const DEFAULT_GLOBAL_USER_AUTH_LIMIT: Amount = 1000 * ONE_UNIT;

/// Upper bound on the number of addresses accepted in one bulk operator
/// add/remove call. Keeps a single admin call from doing unbounded work.
pub const MAX_OPERATOR_BATCH: usize = 256;

// ---------------------------------------------------------------------------
// LedgerConfig
// ---------------------------------------------------------------------------

/// Problems detected in a [`LedgerConfig`] before it reaches the initializer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The same operator appears twice.
    #[error("duplicate operator in config: {0}")]
    DuplicateOperator(Address),

    /// The zero address was listed as an operator.
    #[error("zero address cannot be an operator")]
    ZeroOperator,

    /// Too many operators for a single initializer call.
    #[error("too many operators: {count} (max {max})")]
    TooManyOperators {
        /// Number of operators listed.
        count: usize,
        /// Allowed maximum.
        max: usize,
    },
}

/// Parameters for [`CustodyLedger::initialize`](crate::ledger::CustodyLedger::initialize).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Stored and reported operator threshold. Not enforced by any operation.
    #[serde(default)]
    pub operator_threshold: u64,

    /// Addresses that receive the operator role at initialization.
    #[serde(default)]
    pub operators: Vec<Address>,

    /// Maximum custodied balance of any single user.
    #[serde(with = "crate::units::as_units")]
    pub global_user_limit: Amount,

    /// Maximum amount a single `approve` may authorize.
    #[serde(with = "crate::units::as_units")]
    pub global_user_auth_limit: Amount,
}

impl LedgerConfig {
    /// Checks the operator list for duplicates, zero addresses and size.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.operators.len() > MAX_OPERATOR_BATCH {
            return Err(ConfigError::TooManyOperators {
                count: self.operators.len(),
                max: MAX_OPERATOR_BATCH,
            });
        }
        let mut seen = HashSet::with_capacity(self.operators.len());
        for op in &self.operators {
            if op.is_zero() {
                return Err(ConfigError::ZeroOperator);
            }
            if !seen.insert(*op) {
                return Err(ConfigError::DuplicateOperator(*op));
            }
        }
        Ok(())
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            operator_threshold: 1,
            operators: Vec::new(),
            global_user_limit: DEFAULT_GLOBAL_USER_LIMIT,
            global_user_auth_limit: DEFAULT_GLOBAL_USER_AUTH_LIMIT,
        }
    }
}
