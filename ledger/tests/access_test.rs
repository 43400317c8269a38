//! Integration tests for role management, the initializer and state
//! reattachment.

use std::collections::BTreeSet;

use custody_ledger::{
    Address, CustodyLedger, ErrorKind, InMemoryHost, LedgerConfig, LedgerError, LedgerEvent,
    LedgerState, Role, ONE_UNIT,
};

const ADMIN: u64 = 1;

fn addr(n: u64) -> Address {
    Address::from_low_u64(n)
}

fn ledger_with_operators(ops: &[u64]) -> CustodyLedger {
    let mut ledger = CustodyLedger::new(addr(0xc0de));
    let config = LedgerConfig {
        operators: ops.iter().map(|n| addr(*n)).collect(),
        operator_threshold: 2,
        ..LedgerConfig::default()
    };
    ledger.initialize(addr(ADMIN), &config).unwrap();
    ledger
}

fn operator_set(ledger: &CustodyLedger) -> BTreeSet<Address> {
    (0..ledger.role_member_count(Role::Operator))
        .map(|i| ledger.role_member(Role::Operator, i).unwrap())
        .collect()
}

// ---------------------------------------------------------------------------
// Operator membership
// ---------------------------------------------------------------------------

#[test]
fn remove_then_readd_keeps_membership() {
    let mut ledger = ledger_with_operators(&[10, 11, 12, 13]);
    let original = operator_set(&ledger);

    ledger
        .admin_remove_operators(addr(ADMIN), &[addr(10), addr(12)])
        .unwrap();
    assert_eq!(ledger.role_member_count(Role::Operator), 2);
    assert!(!ledger.has_role(Role::Operator, addr(10)));

    ledger
        .admin_add_operators(addr(ADMIN), &[addr(10), addr(12)])
        .unwrap();

    assert_eq!(ledger.role_member_count(Role::Operator), original.len());
    assert_eq!(operator_set(&ledger), original);
    assert_eq!(
        ledger.last_event(),
        Some(&LedgerEvent::OperatorsAdded {
            operators: vec![addr(10), addr(12)],
        })
    );
}

#[test]
fn add_operators_is_all_or_nothing() {
    let mut ledger = ledger_with_operators(&[10, 11]);
    let events_before = ledger.events().len();

    let err = ledger
        .admin_add_operators(addr(ADMIN), &[addr(20), addr(11)])
        .unwrap_err();

    assert!(matches!(err, LedgerError::AlreadyOperator { account } if account == addr(11)));
    assert_eq!(err.reason(), "already has operator role");
    assert!(!ledger.has_role(Role::Operator, addr(20)));
    assert_eq!(ledger.events().len(), events_before);

    // A duplicate inside the list is caught as well.
    assert!(ledger
        .admin_add_operators(addr(ADMIN), &[addr(21), addr(21)])
        .is_err());
    assert!(!ledger.has_role(Role::Operator, addr(21)));
}

#[test]
fn remove_operators_is_all_or_nothing() {
    let mut ledger = ledger_with_operators(&[10, 11]);

    let err = ledger
        .admin_remove_operators(addr(ADMIN), &[addr(10), addr(99)])
        .unwrap_err();

    assert_eq!(err.reason(), "removing non-operator");
    assert!(ledger.has_role(Role::Operator, addr(10)));
    assert_eq!(ledger.role_member_count(Role::Operator), 2);
}

#[test]
fn grant_and_revoke_operator_role() {
    let mut ledger = ledger_with_operators(&[]);

    assert!(ledger.grant_role(addr(ADMIN), Role::Operator, addr(30)).unwrap());
    assert_eq!(
        ledger.last_event(),
        Some(&LedgerEvent::RoleGranted {
            role: Role::Operator,
            account: addr(30),
            sender: addr(ADMIN),
        })
    );
    let events = ledger.events().len();
    assert!(!ledger.grant_role(addr(ADMIN), Role::Operator, addr(30)).unwrap());
    assert_eq!(ledger.events().len(), events);

    assert!(ledger.revoke_role(addr(ADMIN), Role::Operator, addr(30)).unwrap());
    assert!(!ledger.has_role(Role::Operator, addr(30)));
    assert!(!ledger.revoke_role(addr(ADMIN), Role::Operator, addr(30)).unwrap());
}

#[test]
fn operator_can_renounce_itself() {
    let mut ledger = ledger_with_operators(&[10]);
    ledger.renounce_role(addr(10), Role::Operator).unwrap();
    assert!(!ledger.has_role(Role::Operator, addr(10)));

    let err = ledger.renounce_role(addr(10), Role::Operator).unwrap_err();
    assert!(matches!(err, LedgerError::RoleNotHeld { .. }));
}

#[test]
fn non_admin_cannot_manage_roles() {
    let mut ledger = ledger_with_operators(&[10]);
    let caller = addr(10);

    let results = [
        ledger.grant_role(caller, Role::Operator, addr(40)).map(|_| ()),
        ledger.revoke_role(caller, Role::Operator, addr(10)).map(|_| ()),
        ledger.renounce_admin(caller, addr(40)),
        ledger.admin_add_operators(caller, &[addr(40)]),
        ledger.admin_remove_operators(caller, &[addr(10)]),
        ledger.admin_change_operator_threshold(caller, 9),
        ledger.admin_change_global_user_limit(caller, 0),
        ledger.admin_change_global_user_auth_limit(caller, 0),
        ledger.admin_pause(caller),
    ];
    for result in results {
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert_eq!(err.reason(), "sender doesn't have admin role");
    }
    assert_eq!(ledger.operator_threshold(), 2);
}

#[test]
fn threshold_is_stored_and_reported() {
    let mut ledger = ledger_with_operators(&[10]);
    assert_eq!(ledger.operator_threshold(), 2);
    ledger
        .admin_change_operator_threshold(addr(ADMIN), 5)
        .unwrap();
    assert_eq!(ledger.operator_threshold(), 5);
    assert_eq!(
        ledger.last_event(),
        Some(&LedgerEvent::OperatorThresholdChanged {
            old_threshold: 2,
            new_threshold: 5,
        })
    );
}

// ---------------------------------------------------------------------------
// Admin uniqueness
// ---------------------------------------------------------------------------

#[test]
fn exactly_one_admin_after_any_role_sequence() {
    let mut ledger = ledger_with_operators(&[10]);

    let err = ledger.renounce_admin(addr(ADMIN), addr(ADMIN)).unwrap_err();
    assert_eq!(err.reason(), "cannot renounce self");

    assert!(matches!(
        ledger.grant_role(addr(ADMIN), Role::Admin, addr(2)),
        Err(LedgerError::AdminRoleNotTransferable)
    ));
    assert!(matches!(
        ledger.revoke_role(addr(ADMIN), Role::Admin, addr(ADMIN)),
        Err(LedgerError::AdminRoleNotTransferable)
    ));
    assert!(matches!(
        ledger.renounce_role(addr(ADMIN), Role::Admin),
        Err(LedgerError::AdminRoleNotTransferable)
    ));
    assert_eq!(ledger.role_member_count(Role::Admin), 1);

    ledger.renounce_admin(addr(ADMIN), addr(2)).unwrap();
    assert_eq!(ledger.role_member_count(Role::Admin), 1);
    assert_eq!(ledger.admin(), Some(addr(2)));
    assert!(!ledger.has_role(Role::Admin, addr(ADMIN)));

    // The old admin has lost every privilege.
    assert!(ledger.admin_pause(addr(ADMIN)).is_err());
    assert!(ledger.renounce_admin(addr(ADMIN), addr(3)).is_err());

    ledger.renounce_admin(addr(2), addr(10)).unwrap();
    assert_eq!(ledger.role_members(Role::Admin), &[addr(10)]);
    assert_eq!(ledger.role_admin(Role::Operator), Role::Admin);
    assert_eq!(ledger.role_admin(Role::Admin), Role::Admin);
}

// ---------------------------------------------------------------------------
// Initializer and reattachment
// ---------------------------------------------------------------------------

#[test]
fn reattached_state_cannot_be_reinitialized() {
    let mut ledger = ledger_with_operators(&[10]);
    let mut host = InMemoryHost::new();
    host.fund_native(addr(100), 5 * ONE_UNIT);
    host.attach_value(addr(100), 5 * ONE_UNIT).unwrap();
    ledger.deposit(addr(100), 5 * ONE_UNIT).unwrap();
    ledger
        .approve(addr(100), addr(200), 2 * ONE_UNIT)
        .unwrap();

    let json = serde_json::to_string(&ledger.snapshot()).unwrap();
    let state: LedgerState = serde_json::from_str(&json).unwrap();
    let mut upgraded = CustodyLedger::from_state(state).unwrap();

    assert_eq!(upgraded.snapshot(), ledger.snapshot());
    assert_eq!(upgraded.balance_of(addr(100)), 5 * ONE_UNIT);
    assert_eq!(upgraded.allowance(addr(100), addr(200)), 2 * ONE_UNIT);
    assert_eq!(upgraded.admin(), Some(addr(ADMIN)));

    let err = upgraded
        .initialize(addr(666), &LedgerConfig::default())
        .unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyInitialized));
    assert_eq!(upgraded.admin(), Some(addr(ADMIN)));
}

#[test]
fn events_since_tails_the_log() {
    let mut ledger = ledger_with_operators(&[10]);
    let seen = ledger.events().last().map(|r| r.seq).unwrap_or(0);

    ledger.admin_pause(addr(ADMIN)).unwrap();
    ledger.admin_unpause(addr(ADMIN)).unwrap();

    let tail: Vec<_> = ledger
        .events_since(seen)
        .iter()
        .map(|r| r.event.clone())
        .collect();
    assert_eq!(
        tail,
        vec![
            LedgerEvent::Paused {
                account: addr(ADMIN)
            },
            LedgerEvent::Unpaused {
                account: addr(ADMIN)
            },
        ]
    );
}

fn funded_snapshot() -> serde_json::Value {
    let mut ledger = ledger_with_operators(&[10]);
    let mut host = InMemoryHost::new();
    host.fund_native(addr(100), ONE_UNIT);
    host.attach_value(addr(100), ONE_UNIT).unwrap();
    ledger.deposit(addr(100), ONE_UNIT).unwrap();
    serde_json::to_value(ledger.snapshot()).unwrap()
}

fn reattach(value: serde_json::Value) -> Result<CustodyLedger, LedgerError> {
    let state: LedgerState = serde_json::from_value(value).unwrap();
    CustodyLedger::from_state(state)
}

#[test]
fn reattach_rejects_inconsistent_totals() {
    let mut value = funded_snapshot();
    assert_eq!(value["balances"]["total_custodied"], ONE_UNIT.to_string());
    value["balances"]["total_custodied"] = "0".into();
    value["balances"]["native_held"] = "0".into();

    let err = reattach(value).unwrap_err();
    assert!(matches!(err, LedgerError::CorruptState(_)));
    assert_eq!(err.reason(), "corrupt state");
    assert_eq!(err.kind(), ErrorKind::State);

    let mut unbacked = funded_snapshot();
    unbacked["balances"]["native_held"] = "1".into();
    assert!(matches!(
        reattach(unbacked),
        Err(LedgerError::CorruptState(_))
    ));
}

#[test]
fn reattach_rejects_broken_role_membership() {
    let mut two_admins = funded_snapshot();
    two_admins["access"]["admins"] = serde_json::json!([addr(ADMIN), addr(2)]);
    assert!(matches!(
        reattach(two_admins),
        Err(LedgerError::CorruptState(_))
    ));

    let mut no_admin = funded_snapshot();
    no_admin["access"]["admins"] = serde_json::json!([]);
    assert!(matches!(
        reattach(no_admin),
        Err(LedgerError::CorruptState(_))
    ));

    let mut zero_operator = funded_snapshot();
    zero_operator["access"]["operators"] = serde_json::json!([Address::ZERO]);
    assert!(matches!(
        reattach(zero_operator),
        Err(LedgerError::CorruptState(_))
    ));

    // The untouched snapshot still reattaches and can pay out.
    let mut ledger = reattach(funded_snapshot()).unwrap();
    let mut host = InMemoryHost::new();
    assert_eq!(ledger.withdraw(&mut host, addr(100), 0).unwrap(), ONE_UNIT);
    assert_eq!(ledger.total_custodied(), 0);
}
