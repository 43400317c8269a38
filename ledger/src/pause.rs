//! # Pause Switch
//!
//! A single admin-toggled circuit breaker. Every user- and operator-facing
//! mutating operation calls [`PauseSwitch::ensure_not_paused`] before it
//! touches any state.

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// The paused flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseSwitch {
    paused: bool,
}

impl PauseSwitch {
    /// Whether the switch is engaged.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Fails with [`LedgerError::Paused`] while engaged.
    pub fn ensure_not_paused(&self) -> Result<(), LedgerError> {
        if self.paused {
            Err(LedgerError::Paused)
        } else {
            Ok(())
        }
    }

    /// Engages the switch. Authorization is checked by the caller.
    pub(crate) fn pause(&mut self) -> Result<(), LedgerError> {
        if self.paused {
            return Err(LedgerError::AlreadyPaused);
        }
        self.paused = true;
        Ok(())
    }

    /// Releases the switch. Authorization is checked by the caller.
    pub(crate) fn unpause(&mut self) -> Result<(), LedgerError> {
        if !self.paused {
            return Err(LedgerError::NotPaused);
        }
        self.paused = false;
        Ok(())
    }
}
