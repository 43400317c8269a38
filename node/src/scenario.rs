//! # Scenario Runner
//!
//! A scenario is a JSON document describing a simulated chain and an
//! ordered list of ledger operations:
//!
//! ```json
//! {
//!   "deployer": "0x0000000000000000000000000000000000000001",
//!   "config": { "operators": ["0x...0a"], "global_user_limit": "1000.0",
//!               "global_user_auth_limit": "1000.0" },
//!   "host": { "native": [{ "account": "0x...64", "amount": "10.0" }] },
//!   "operations": [
//!     { "op": "deposit", "caller": "0x...64", "amount": "1.0" }
//!   ]
//! }
//! ```
//!
//! Native amounts are decimal unit strings. External token amounts and ids
//! are plain integer strings. Each operation produces one [`Outcome`];
//! a rejected operation is an outcome like any other, not a runner error.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use custody_ledger::units::{as_integer, as_units};
use custody_ledger::{
    Address, Amount, CustodyLedger, ErrorKind, EventRecord, InMemoryHost, LedgerConfig,
    LedgerError, LedgerState, Role, TokenId, TransferRequest,
};

/// Default ledger address when a scenario does not name one.
pub const DEFAULT_LEDGER_ADDRESS: Address = Address::new([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xc0, 0xde,
]);

// ---------------------------------------------------------------------------
// Scenario document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Address the ledger is deployed at; the operator of outbound token calls.
    #[serde(default = "default_ledger_address")]
    pub ledger: Address,
    /// Caller of `initialize`, who becomes the admin.
    pub deployer: Address,
    #[serde(default)]
    pub config: LedgerConfig,
    #[serde(default)]
    pub host: HostSeed,
    pub operations: Vec<Operation>,
}

fn default_ledger_address() -> Address {
    DEFAULT_LEDGER_ADDRESS
}

/// Initial state of the simulated chain.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HostSeed {
    pub native: Vec<NativeFunds>,
    /// Accounts that refuse native payouts.
    pub rejecting: Vec<Address>,
    pub fungible: Vec<FungibleSeed>,
    pub unique: Vec<UniqueSeed>,
    pub multi: Vec<MultiSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NativeFunds {
    pub account: Address,
    #[serde(with = "as_units")]
    pub amount: Amount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FungibleSeed {
    pub address: Address,
    #[serde(default)]
    pub balances: Vec<TokenBalance>,
    #[serde(default)]
    pub allowances: Vec<TokenAllowance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenBalance {
    pub account: Address,
    #[serde(with = "as_integer")]
    pub amount: Amount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenAllowance {
    pub owner: Address,
    pub spender: Address,
    #[serde(with = "as_integer")]
    pub amount: Amount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UniqueSeed {
    pub address: Address,
    #[serde(default)]
    pub items: Vec<UniqueItem>,
    #[serde(default)]
    pub approvals_for_all: Vec<OperatorApproval>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UniqueItem {
    pub owner: Address,
    #[serde(with = "as_integer")]
    pub token_id: TokenId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MultiSeed {
    pub address: Address,
    #[serde(default)]
    pub balances: Vec<MultiBalance>,
    #[serde(default)]
    pub approvals_for_all: Vec<OperatorApproval>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MultiBalance {
    pub account: Address,
    #[serde(with = "as_integer")]
    pub token_id: TokenId,
    #[serde(with = "as_integer")]
    pub amount: Amount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperatorApproval {
    pub owner: Address,
    pub operator: Address,
}

impl HostSeed {
    /// Builds the simulated chain.
    pub fn build(&self) -> Result<InMemoryHost> {
        let mut host = InMemoryHost::new();
        for funds in &self.native {
            host.fund_native(funds.account, funds.amount);
        }
        for account in &self.rejecting {
            host.reject_native(*account);
        }
        for seed in &self.fungible {
            let token = host.deploy_fungible(seed.address);
            for b in &seed.balances {
                token.mint(b.account, b.amount);
            }
            for a in &seed.allowances {
                token.approve(a.owner, a.spender, a.amount);
            }
        }
        for seed in &self.unique {
            let token = host.deploy_unique(seed.address);
            for item in &seed.items {
                token
                    .mint(item.owner, item.token_id)
                    .with_context(|| format!("seeding unique token {}", seed.address))?;
            }
            for a in &seed.approvals_for_all {
                token.set_approval_for_all(a.owner, a.operator, true);
            }
        }
        for seed in &self.multi {
            let token = host.deploy_multi(seed.address);
            for b in &seed.balances {
                token.mint(b.account, b.token_id, b.amount);
            }
            for a in &seed.approvals_for_all {
                token.set_approval_for_all(a.owner, a.operator, true);
            }
        }
        Ok(host)
    }
}

/// One ledger call.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Deposit {
        caller: Address,
        #[serde(with = "as_units")]
        amount: Amount,
    },
    Withdraw {
        caller: Address,
        /// Zero or omitted withdraws everything.
        #[serde(with = "as_units", default)]
        amount: Amount,
    },
    Approve {
        caller: Address,
        spender: Address,
        #[serde(with = "as_units")]
        amount: Amount,
        /// Native value sent along with the approval, deposited first.
        #[serde(with = "as_units", default)]
        value: Amount,
    },
    Send {
        caller: Address,
        from: Address,
        to: Address,
        #[serde(with = "as_units")]
        amount: Amount,
    },
    Transfer {
        caller: Address,
        request: TransferRequest,
    },
    GrantRole {
        caller: Address,
        role: Role,
        account: Address,
    },
    RevokeRole {
        caller: Address,
        role: Role,
        account: Address,
    },
    RenounceRole {
        caller: Address,
        role: Role,
    },
    RenounceAdmin {
        caller: Address,
        new_admin: Address,
    },
    AddOperators {
        caller: Address,
        operators: Vec<Address>,
    },
    RemoveOperators {
        caller: Address,
        operators: Vec<Address>,
    },
    SetOperatorThreshold {
        caller: Address,
        value: u64,
    },
    SetGlobalUserLimit {
        caller: Address,
        #[serde(with = "as_units")]
        limit: Amount,
    },
    SetGlobalUserAuthLimit {
        caller: Address,
        #[serde(with = "as_units")]
        limit: Amount,
    },
    Pause {
        caller: Address,
    },
    Unpause {
        caller: Address,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Deposit { .. } => "deposit",
            Operation::Withdraw { .. } => "withdraw",
            Operation::Approve { .. } => "approve",
            Operation::Send { .. } => "send",
            Operation::Transfer { .. } => "transfer",
            Operation::GrantRole { .. } => "grant_role",
            Operation::RevokeRole { .. } => "revoke_role",
            Operation::RenounceRole { .. } => "renounce_role",
            Operation::RenounceAdmin { .. } => "renounce_admin",
            Operation::AddOperators { .. } => "add_operators",
            Operation::RemoveOperators { .. } => "remove_operators",
            Operation::SetOperatorThreshold { .. } => "set_operator_threshold",
            Operation::SetGlobalUserLimit { .. } => "set_global_user_limit",
            Operation::SetGlobalUserAuthLimit { .. } => "set_global_user_auth_limit",
            Operation::Pause { .. } => "pause",
            Operation::Unpause { .. } => "unpause",
        }
    }

    /// Submits the operation. Native value attached to a deposit leaves the
    /// caller's external account first and is returned if the ledger rejects it.
    pub fn apply(
        &self,
        ledger: &mut CustodyLedger,
        host: &mut InMemoryHost,
    ) -> Result<(), LedgerError> {
        match self {
            Operation::Deposit { caller, amount } => {
                host.attach_value(*caller, *amount)?;
                match ledger.deposit(*caller, *amount) {
                    Ok(_) => Ok(()),
                    Err(e) => {
                        host.refund_value(*caller, *amount);
                        Err(e)
                    }
                }
            }
            Operation::Withdraw { caller, amount } => {
                ledger.withdraw(host, *caller, *amount).map(|_| ())
            }
            Operation::Approve {
                caller,
                spender,
                amount,
                value,
            } => {
                host.attach_value(*caller, *value)?;
                ledger
                    .deposit_and_approve(*caller, *value, *spender, *amount)
                    .map_err(|e| {
                        host.refund_value(*caller, *value);
                        e
                    })
            }
            Operation::Send {
                caller,
                from,
                to,
                amount,
            } => ledger.send(host, *caller, *amount, *from, *to).map(|_| ()),
            Operation::Transfer { caller, request } => ledger.transfer(host, *caller, request),
            Operation::GrantRole {
                caller,
                role,
                account,
            } => ledger.grant_role(*caller, *role, *account).map(|_| ()),
            Operation::RevokeRole {
                caller,
                role,
                account,
            } => ledger.revoke_role(*caller, *role, *account).map(|_| ()),
            Operation::RenounceRole { caller, role } => ledger.renounce_role(*caller, *role),
            Operation::RenounceAdmin { caller, new_admin } => {
                ledger.renounce_admin(*caller, *new_admin)
            }
            Operation::AddOperators { caller, operators } => {
                ledger.admin_add_operators(*caller, operators)
            }
            Operation::RemoveOperators { caller, operators } => {
                ledger.admin_remove_operators(*caller, operators)
            }
            Operation::SetOperatorThreshold { caller, value } => {
                ledger.admin_change_operator_threshold(*caller, *value)
            }
            Operation::SetGlobalUserLimit { caller, limit } => {
                ledger.admin_change_global_user_limit(*caller, *limit)
            }
            Operation::SetGlobalUserAuthLimit { caller, limit } => {
                ledger.admin_change_global_user_auth_limit(*caller, *limit)
            }
            Operation::Pause { caller } => ledger.admin_pause(*caller),
            Operation::Unpause { caller } => ledger.admin_unpause(*caller),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of one operation, printed as a JSON line.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub index: usize,
    pub op: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Failure>,
    pub events: Vec<EventRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub reason: &'static str,
    pub message: String,
}

impl From<&LedgerError> for Failure {
    fn from(e: &LedgerError) -> Self {
        Self {
            kind: e.kind(),
            reason: e.reason(),
            message: e.to_string(),
        }
    }
}

/// A finished run.
pub struct ScenarioRun {
    pub ledger: CustodyLedger,
    pub host: InMemoryHost,
    pub outcomes: Vec<Outcome>,
}

impl ScenarioRun {
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.ok).count()
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid scenario {}", path.display()))
}

pub fn load_state(path: &Path) -> Result<LedgerState> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read state {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid state file {}", path.display()))
}

pub fn save_state(path: &Path, state: &LedgerState) -> Result<()> {
    let json = serde_json::to_string_pretty(state).context("failed to encode state")?;
    std::fs::write(path, json).with_context(|| format!("failed to write state {}", path.display()))
}

/// Runs `scenario` against a fresh ledger, or against `state` when given.
///
/// A reattached state is already initialized, so the scenario's `config`
/// is ignored in that case.
pub fn run(scenario: &Scenario, state: Option<LedgerState>) -> Result<ScenarioRun> {
    let mut ledger = match state {
        Some(state) => CustodyLedger::from_state(state).context("failed to reattach state")?,
        None => {
            let mut ledger = CustodyLedger::new(scenario.ledger);
            ledger
                .initialize(scenario.deployer, &scenario.config)
                .context("failed to initialize ledger")?;
            ledger
        }
    };
    let mut host = scenario.host.build()?;

    let mut outcomes = Vec::with_capacity(scenario.operations.len());
    for (index, op) in scenario.operations.iter().enumerate() {
        let seen = ledger.events().last().map(|r| r.seq).unwrap_or(0);
        let result = op.apply(&mut ledger, &mut host);
        match &result {
            Ok(()) => tracing::debug!(index, op = op.name(), "operation committed"),
            Err(e) => tracing::info!(index, op = op.name(), error = %e, "operation rejected"),
        }
        outcomes.push(Outcome {
            index,
            op: op.name(),
            ok: result.is_ok(),
            error: result.as_ref().err().map(Failure::from),
            events: ledger.events_since(seen).to_vec(),
        });
    }

    Ok(ScenarioRun {
        ledger,
        host,
        outcomes,
    })
}
