//! # Ledger Events
//!
//! Committed operations append their events in order; a bulk operator call
//! appends one event for the whole batch. Failed operations append nothing,
//! so the log is a faithful history of state changes that clients can
//! replay or tail with [`EventLog::since`].
//!
//! Gateway token transfers emit no ledger event; the external contract
//! emits its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access::Role;
use crate::address::Address;
use crate::units::Amount;

/// A state change observed by clients.
///
/// Amounts serialize as decimal native-unit strings (`"1.0"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "PascalCase")]
pub enum LedgerEvent {
    /// One-time setup completed.
    Initialized {
        admin: Address,
        operators: Vec<Address>,
        operator_threshold: u64,
        #[serde(with = "crate::units::as_units")]
        global_user_limit: Amount,
        #[serde(with = "crate::units::as_units")]
        global_user_auth_limit: Amount,
    },
    DepositSuccessful {
        user: Address,
        #[serde(with = "crate::units::as_units")]
        amount_deposited: Amount,
        #[serde(with = "crate::units::as_units")]
        new_balance: Amount,
    },
    WithdrawalSuccessful {
        user: Address,
        #[serde(with = "crate::units::as_units")]
        amount_withdrawn: Amount,
        #[serde(with = "crate::units::as_units")]
        new_balance: Amount,
    },
    Approval {
        owner: Address,
        spender: Address,
        #[serde(with = "crate::units::as_units")]
        amount: Amount,
    },
    SendSuccessful {
        from: Address,
        to: Address,
        #[serde(with = "crate::units::as_units")]
        amount_sent: Amount,
        #[serde(with = "crate::units::as_units")]
        remaining_sender_balance: Amount,
        #[serde(with = "crate::units::as_units")]
        remaining_allowance: Amount,
    },
    RoleGranted {
        role: Role,
        account: Address,
        sender: Address,
    },
    RoleRevoked {
        role: Role,
        account: Address,
        sender: Address,
    },
    OperatorsAdded {
        operators: Vec<Address>,
    },
    OperatorsRemoved {
        operators: Vec<Address>,
    },
    OperatorThresholdChanged {
        old_threshold: u64,
        new_threshold: u64,
    },
    GlobalUserLimitChanged {
        #[serde(with = "crate::units::as_units")]
        old_limit: Amount,
        #[serde(with = "crate::units::as_units")]
        new_limit: Amount,
    },
    GlobalUserAuthLimitChanged {
        #[serde(with = "crate::units::as_units")]
        old_limit: Amount,
        #[serde(with = "crate::units::as_units")]
        new_limit: Amount,
    },
    Paused {
        account: Address,
    },
    Unpaused {
        account: Address,
    },
}

impl LedgerEvent {
    /// The event's name as clients see it.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::Initialized { .. } => "Initialized",
            LedgerEvent::DepositSuccessful { .. } => "DepositSuccessful",
            LedgerEvent::WithdrawalSuccessful { .. } => "WithdrawalSuccessful",
            LedgerEvent::Approval { .. } => "Approval",
            LedgerEvent::SendSuccessful { .. } => "SendSuccessful",
            LedgerEvent::RoleGranted { .. } => "RoleGranted",
            LedgerEvent::RoleRevoked { .. } => "RoleRevoked",
            LedgerEvent::OperatorsAdded { .. } => "OperatorsAdded",
            LedgerEvent::OperatorsRemoved { .. } => "OperatorsRemoved",
            LedgerEvent::OperatorThresholdChanged { .. } => "OperatorThresholdChanged",
            LedgerEvent::GlobalUserLimitChanged { .. } => "GlobalUserLimitChanged",
            LedgerEvent::GlobalUserAuthLimitChanged { .. } => "GlobalUserAuthLimitChanged",
            LedgerEvent::Paused { .. } => "Paused",
            LedgerEvent::Unpaused { .. } => "Unpaused",
        }
    }
}

/// An event with its position in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Monotonic sequence number, starting at 1.
    pub seq: u64,
    /// Wall-clock time the event was recorded.
    pub recorded_at: DateTime<Utc>,
    /// The event itself.
    #[serde(flatten)]
    pub event: LedgerEvent,
}

/// Append-only event history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    /// Appends `event` and returns its sequence number.
    pub(crate) fn push(&mut self, event: LedgerEvent) -> u64 {
        let seq = self.last_seq() + 1;
        tracing::debug!(seq, event = event.name(), "event recorded");
        self.records.push(EventRecord {
            seq,
            recorded_at: Utc::now(),
            event,
        });
        seq
    }

    /// Sequence number of the latest record, or 0 when empty.
    pub fn last_seq(&self) -> u64 {
        self.records.last().map(|r| r.seq).unwrap_or(0)
    }

    /// All records in order.
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Records with `seq > after`.
    pub fn since(&self, after: u64) -> &[EventRecord] {
        let start = self.records.partition_point(|r| r.seq <= after);
        &self.records[start..]
    }

    /// The most recent event, if any.
    pub fn last(&self) -> Option<&LedgerEvent> {
        self.records.last().map(|r| &r.event)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
