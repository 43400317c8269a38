//! Integration tests for deposits, withdrawals, approvals and the pause gate.
//!
//! Value moves between a simulated chain (`InMemoryHost`) and the ledger,
//! so each test can check both sides of the custody boundary.

use custody_ledger::{
    parse_units, Address, Amount, CustodyLedger, ErrorKind, InMemoryHost, LedgerConfig,
    LedgerError, LedgerEvent, TransferRequest, TokenStandard, ONE_UNIT,
};

const ADMIN: u64 = 1;
const OPERATOR: u64 = 10;
const USER: u64 = 100;
const SPENDER: u64 = 200;

fn addr(n: u64) -> Address {
    Address::from_low_u64(n)
}

fn units(s: &str) -> Amount {
    parse_units(s).unwrap()
}

/// An initialized ledger with default limits and one operator, plus a host
/// where `USER` holds 2000 native units.
fn setup() -> (CustodyLedger, InMemoryHost) {
    let mut ledger = CustodyLedger::new(addr(0xc0de));
    let config = LedgerConfig {
        operators: vec![addr(OPERATOR)],
        ..LedgerConfig::default()
    };
    ledger.initialize(addr(ADMIN), &config).unwrap();

    let mut host = InMemoryHost::new();
    host.fund_native(addr(USER), 2000 * ONE_UNIT);
    (ledger, host)
}

/// Deposits with value taken from the user's external account, returned on failure.
fn deposit(
    ledger: &mut CustodyLedger,
    host: &mut InMemoryHost,
    user: Address,
    amount: Amount,
) -> Result<Amount, LedgerError> {
    host.attach_value(user, amount)?;
    ledger.deposit(user, amount).map_err(|e| {
        host.refund_value(user, amount);
        e
    })
}

// ---------------------------------------------------------------------------
// Deposits
// ---------------------------------------------------------------------------

#[test]
fn deposit_one_unit() {
    let (mut ledger, mut host) = setup();
    let new_balance = deposit(&mut ledger, &mut host, addr(USER), units("1.0")).unwrap();

    assert_eq!(new_balance, ONE_UNIT);
    assert_eq!(ledger.balance_of(addr(USER)), ONE_UNIT);
    assert_eq!(
        ledger.last_event(),
        Some(&LedgerEvent::DepositSuccessful {
            user: addr(USER),
            amount_deposited: ONE_UNIT,
            new_balance: ONE_UNIT,
        })
    );

    let json = serde_json::to_value(ledger.last_event().unwrap()).unwrap();
    assert_eq!(json["event"], "DepositSuccessful");
    assert_eq!(json["amount_deposited"], "1.0");
    assert_eq!(json["new_balance"], "1.0");
}

#[test]
fn deposit_over_limit_reverts_entirely() {
    let (mut ledger, mut host) = setup();
    let events_before = ledger.events().len();
    let external_before = host.native_balance(addr(USER));

    let err = deposit(&mut ledger, &mut host, addr(USER), units("1000.001")).unwrap_err();

    assert!(matches!(err, LedgerError::UserLimitExceeded { .. }));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(ledger.balance_of(addr(USER)), 0);
    assert_eq!(ledger.total_custodied(), 0);
    assert_eq!(ledger.events().len(), events_before);
    assert_eq!(host.native_balance(addr(USER)), external_before);
}

#[test]
fn deposit_cap_counts_existing_balance() {
    let (mut ledger, mut host) = setup();
    deposit(&mut ledger, &mut host, addr(USER), units("600")).unwrap();

    assert!(deposit(&mut ledger, &mut host, addr(USER), units("400.000000000000000001")).is_err());
    assert_eq!(ledger.balance_of(addr(USER)), units("600"));

    // Exactly at the cap is allowed.
    deposit(&mut ledger, &mut host, addr(USER), units("400")).unwrap();
    assert_eq!(ledger.balance_of(addr(USER)), units("1000"));
}

#[test]
fn lowered_limit_keeps_existing_balance() {
    let (mut ledger, mut host) = setup();
    deposit(&mut ledger, &mut host, addr(USER), units("50")).unwrap();
    ledger
        .admin_change_global_user_limit(addr(ADMIN), units("10"))
        .unwrap();

    assert_eq!(ledger.balance_of(addr(USER)), units("50"));
    assert!(deposit(&mut ledger, &mut host, addr(USER), 1).is_err());
    assert_eq!(
        ledger.last_event(),
        Some(&LedgerEvent::GlobalUserLimitChanged {
            old_limit: units("1000"),
            new_limit: units("10"),
        })
    );
}

// ---------------------------------------------------------------------------
// Withdrawals
// ---------------------------------------------------------------------------

#[test]
fn withdraw_exact_amount() {
    let (mut ledger, mut host) = setup();
    deposit(&mut ledger, &mut host, addr(USER), units("5")).unwrap();
    let external = host.native_balance(addr(USER));

    let paid = ledger.withdraw(&mut host, addr(USER), units("2")).unwrap();

    assert_eq!(paid, units("2"));
    assert_eq!(ledger.balance_of(addr(USER)), units("3"));
    assert_eq!(host.native_balance(addr(USER)), external + units("2"));
    assert_eq!(
        ledger.last_event(),
        Some(&LedgerEvent::WithdrawalSuccessful {
            user: addr(USER),
            amount_withdrawn: units("2"),
            new_balance: units("3"),
        })
    );
}

#[test]
fn withdraw_zero_takes_everything() {
    let (mut ledger, mut host) = setup();
    deposit(&mut ledger, &mut host, addr(USER), units("7.25")).unwrap();
    let external = host.native_balance(addr(USER));

    let paid = ledger.withdraw(&mut host, addr(USER), 0).unwrap();

    assert_eq!(paid, units("7.25"));
    assert_eq!(ledger.balance_of(addr(USER)), 0);
    assert_eq!(host.native_balance(addr(USER)), external + units("7.25"));
}

#[test]
fn withdraw_zero_with_empty_balance_is_a_noop() {
    let (mut ledger, mut host) = setup();
    let paid = ledger.withdraw(&mut host, addr(USER), 0).unwrap();
    assert_eq!(paid, 0);
    assert_eq!(
        ledger.last_event(),
        Some(&LedgerEvent::WithdrawalSuccessful {
            user: addr(USER),
            amount_withdrawn: 0,
            new_balance: 0,
        })
    );
}

#[test]
fn withdraw_more_than_balance_fails() {
    let (mut ledger, mut host) = setup();
    deposit(&mut ledger, &mut host, addr(USER), units("1")).unwrap();

    let err = ledger
        .withdraw(&mut host, addr(USER), units("1.5"))
        .unwrap_err();

    assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    assert_eq!(err.kind(), ErrorKind::BusinessRule);
    assert_eq!(ledger.balance_of(addr(USER)), units("1"));
}

#[test]
fn rejected_payout_restores_balance() {
    let (mut ledger, mut host) = setup();
    deposit(&mut ledger, &mut host, addr(USER), units("3")).unwrap();
    host.reject_native(addr(USER));
    let events_before = ledger.events().len();

    let err = ledger.withdraw(&mut host, addr(USER), 0).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::External);
    assert_eq!(ledger.balance_of(addr(USER)), units("3"));
    assert_eq!(ledger.total_custodied(), units("3"));
    assert_eq!(ledger.native_held(), units("3"));
    assert_eq!(ledger.events().len(), events_before);
}

// ---------------------------------------------------------------------------
// Approvals
// ---------------------------------------------------------------------------

#[test]
fn approve_overwrites_instead_of_adding() {
    let (mut ledger, _host) = setup();
    ledger
        .approve(addr(USER), addr(SPENDER), units("3"))
        .unwrap();
    ledger
        .approve(addr(USER), addr(SPENDER), units("5"))
        .unwrap();

    assert_eq!(ledger.allowance(addr(USER), addr(SPENDER)), units("5"));

    ledger.approve(addr(USER), addr(SPENDER), 0).unwrap();
    assert_eq!(ledger.allowance(addr(USER), addr(SPENDER)), 0);
}

#[test]
fn approve_does_not_require_balance() {
    let (mut ledger, _host) = setup();
    ledger
        .approve(addr(USER), addr(SPENDER), units("10"))
        .unwrap();
    assert_eq!(ledger.balance_of(addr(USER)), 0);
    assert_eq!(ledger.allowance(addr(USER), addr(SPENDER)), units("10"));
}

#[test]
fn approve_above_auth_limit_fails() {
    let (mut ledger, _host) = setup();
    ledger
        .admin_change_global_user_auth_limit(addr(ADMIN), units("5"))
        .unwrap();

    let err = ledger
        .approve(addr(USER), addr(SPENDER), units("5.1"))
        .unwrap_err();
    assert!(matches!(err, LedgerError::AuthLimitExceeded { .. }));
    assert_eq!(ledger.allowance(addr(USER), addr(SPENDER)), 0);
}

#[test]
fn deposit_and_approve_emits_both_events() {
    let (mut ledger, mut host) = setup();
    host.attach_value(addr(USER), units("2")).unwrap();
    ledger
        .deposit_and_approve(addr(USER), units("2"), addr(SPENDER), units("1"))
        .unwrap();

    let names: Vec<_> = ledger
        .events_since(1)
        .iter()
        .map(|r| r.event.name())
        .collect();
    assert_eq!(names, ["DepositSuccessful", "Approval"]);
    assert_eq!(ledger.balance_of(addr(USER)), units("2"));
    assert_eq!(ledger.allowance(addr(USER), addr(SPENDER)), units("1"));
}

// ---------------------------------------------------------------------------
// Pause gate
// ---------------------------------------------------------------------------

#[test]
fn paused_ledger_rejects_every_mutation_without_changes() {
    let (mut ledger, mut host) = setup();
    deposit(&mut ledger, &mut host, addr(USER), units("4")).unwrap();
    ledger
        .approve(addr(USER), addr(SPENDER), units("4"))
        .unwrap();
    ledger.admin_pause(addr(ADMIN)).unwrap();
    assert!(ledger.is_paused());

    let before = ledger.snapshot();
    let request = TransferRequest {
        amount: 1,
        token_type: TokenStandard::Fungible.code(),
        token_id: 0,
        token_contract: addr(0xc1),
        from: addr(USER),
        to: addr(SPENDER),
    };

    let results = [
        ledger.deposit(addr(USER), 1),
        ledger.withdraw(&mut host, addr(USER), 0),
        ledger
            .approve(addr(USER), addr(SPENDER), 1)
            .map(|_| 0),
        ledger
            .deposit_and_approve(addr(USER), 1, addr(SPENDER), 1)
            .map(|_| 0),
        ledger
            .send(&mut host, addr(OPERATOR), units("1"), addr(USER), addr(SPENDER))
            .map(|r| r.amount_sent),
        ledger
            .transfer(&mut host, addr(OPERATOR), &request)
            .map(|_| 0),
    ];

    for result in results {
        let err = result.unwrap_err();
        assert!(matches!(err, LedgerError::Paused), "got {err}");
        assert_eq!(err.reason(), "paused");
        assert_eq!(err.kind(), ErrorKind::State);
    }
    assert_eq!(ledger.snapshot(), before);

    ledger.admin_unpause(addr(ADMIN)).unwrap();
    ledger.withdraw(&mut host, addr(USER), 0).unwrap();
}

#[test]
fn pause_and_unpause_are_admin_only_and_not_idempotent() {
    let (mut ledger, _host) = setup();

    let err = ledger.admin_pause(addr(OPERATOR)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    assert!(matches!(
        ledger.admin_unpause(addr(ADMIN)),
        Err(LedgerError::NotPaused)
    ));
    ledger.admin_pause(addr(ADMIN)).unwrap();
    assert!(matches!(
        ledger.admin_pause(addr(ADMIN)),
        Err(LedgerError::AlreadyPaused)
    ));
}

#[test]
fn admin_operations_still_work_while_paused() {
    let (mut ledger, _host) = setup();
    ledger.admin_pause(addr(ADMIN)).unwrap();

    ledger
        .admin_add_operators(addr(ADMIN), &[addr(OPERATOR + 1)])
        .unwrap();
    ledger
        .admin_change_operator_threshold(addr(ADMIN), 3)
        .unwrap();
    assert_eq!(ledger.operator_threshold(), 3);
}

// ---------------------------------------------------------------------------
// Conservation
// ---------------------------------------------------------------------------

#[test]
fn custody_never_exceeds_held_value() {
    let (mut ledger, mut host) = setup();
    let other = addr(USER + 1);
    host.fund_native(other, 500 * ONE_UNIT);
    let external_total =
        host.native_balance(addr(USER)) + host.native_balance(other);

    let check = |ledger: &CustodyLedger, host: &InMemoryHost| {
        let sum: Amount = ledger.balances().map(|(_, b)| b).sum();
        assert_eq!(sum, ledger.total_custodied());
        assert!(ledger.total_custodied() <= ledger.native_held());
        let outside = host.native_balance(addr(USER))
            + host.native_balance(other)
            + host.native_balance(addr(SPENDER));
        assert_eq!(outside + ledger.native_held(), external_total);
    };

    deposit(&mut ledger, &mut host, addr(USER), units("10")).unwrap();
    check(&ledger, &host);
    deposit(&mut ledger, &mut host, other, units("2.5")).unwrap();
    check(&ledger, &host);
    ledger
        .approve(addr(USER), addr(SPENDER), units("4"))
        .unwrap();
    ledger
        .send(&mut host, addr(OPERATOR), units("3"), addr(USER), addr(SPENDER))
        .unwrap();
    check(&ledger, &host);
    ledger.withdraw(&mut host, other, 0).unwrap();
    check(&ledger, &host);
    assert!(deposit(&mut ledger, &mut host, other, units("2000")).is_err());
    check(&ledger, &host);
    ledger.withdraw(&mut host, addr(USER), units("1")).unwrap();
    check(&ledger, &host);

    assert_eq!(ledger.total_custodied(), units("6"));
}
