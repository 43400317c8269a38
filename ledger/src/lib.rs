// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Custody Ledger
//!
//! Custodies user-deposited native value and lets a registered set of
//! operators move it, or bridge external token transfers, on behalf of
//! users who have pre-authorized them. A single admin governs operator
//! membership and the global risk limits.
//!
//! - **Access control** ([`access`]): one admin, an enumerable operator set.
//! - **Pause switch** ([`pause`]): gates every user and operator operation.
//! - **Balances** ([`balance`]): custodied value per user under a global cap.
//! - **Allowances** ([`allowance`]): what each user lets each spender move.
//! - **Gateway** ([`gateway`]): operator `send` and token `transfer`.
//! - **Initializer** ([`ledger::CustodyLedger::initialize`]): one-time setup.
//!
//! ## Design Principles
//!
//! 1. All monetary operations use `checked_add` / `checked_sub`. Amounts are
//!    `u128` base units with 18 decimals.
//! 2. Every operation is atomic. It either commits all of its state changes
//!    and events, or returns an error and changes nothing.
//! 3. External calls happen only after the ledger's own effects are final,
//!    with a guard that rejects re-entrant mutating calls.
//! 4. Every persistent type is serializable (serde) so state can be exported
//!    and reattached to a new build.

pub mod access;
pub mod address;
pub mod allowance;
pub mod balance;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod host;
pub mod ledger;
pub mod mock;
pub mod pause;
pub mod token;
pub mod units;

pub use access::Role;
pub use address::Address;
pub use config::LedgerConfig;
pub use error::{ErrorKind, LedgerError};
pub use events::{EventRecord, LedgerEvent};
pub use gateway::SendReceipt;
pub use host::{Host, InMemoryHost, NullHost};
pub use ledger::{CustodyLedger, LedgerState};
pub use token::{ExternalError, TokenStandard, TransferRequest};
pub use units::{format_units, parse_units, Amount, TokenId, ONE_UNIT};
