// Account Balance Tests
// Transfer validation and conservation of funds

use lamport_ledger::ledger::Operation;
use lamport_ledger::vault::{AccountBalances, BalanceError};

fn three_accounts() -> AccountBalances {
    AccountBalances::with_initial(["A", "B", "C"], 10)
}

// ============================================================================
// LOOKUPS
// ============================================================================

#[test]
fn test_unknown_account_reads_zero() {
    let balances = AccountBalances::new();

    assert_eq!(balances.get("nobody"), 0);
    assert!(balances.is_empty());
}

#[test]
fn test_initial_seeding() {
    let balances = three_accounts();

    assert_eq!(balances.len(), 3);
    assert_eq!(balances.get("B"), 10);
    assert_eq!(balances.total(), 30);
}

// ============================================================================
// TRANSFERS
// ============================================================================

#[test]
fn test_transfer_moves_funds() {
    let mut balances = three_accounts();
    balances.apply_transfer("A", "B", 5).unwrap();

    assert_eq!(balances.get("A"), 5);
    assert_eq!(balances.get("B"), 15);
}

#[test]
fn test_transfer_creates_receiver_row() {
    let mut balances = three_accounts();
    balances.apply(&Operation::new("A", "D", 4)).unwrap();

    assert_eq!(balances.get("D"), 4);
    assert_eq!(balances.total(), 30);
}

#[test]
fn test_full_balance_can_be_spent() {
    let mut balances = three_accounts();

    assert!(balances.apply_transfer("C", "A", 10).is_ok());
    assert_eq!(balances.get("C"), 0);
}

#[test]
fn test_insufficient_funds_leaves_state_unchanged() {
    let mut balances = three_accounts();
    let before = balances.snapshot();

    let err = balances.apply_transfer("A", "B", 100).unwrap_err();

    assert_eq!(
        err,
        BalanceError::InsufficientFunds {
            account: "A".to_string(),
            available: 10,
            required: 100,
        }
    );
    assert_eq!(balances.snapshot(), before);
}

#[test]
fn test_unknown_sender_has_no_funds() {
    let mut balances = three_accounts();

    assert!(matches!(
        balances.apply_transfer("Z", "A", 1),
        Err(BalanceError::InsufficientFunds { available: 0, .. })
    ));
}

#[test]
fn test_zero_amount_rejected() {
    let mut balances = three_accounts();

    assert_eq!(balances.apply_transfer("A", "B", 0), Err(BalanceError::InvalidAmount));
}

#[test]
fn test_self_transfer_is_noop() {
    let mut balances = three_accounts();
    balances.apply_transfer("A", "A", 3).unwrap();

    assert_eq!(balances.get("A"), 10);
}

#[test]
fn test_overflow_rejected() {
    let mut balances = AccountBalances::new();
    balances.set("A", 10);
    balances.set("B", u64::MAX);

    assert!(matches!(
        balances.apply_transfer("A", "B", 1),
        Err(BalanceError::BalanceOverflow { .. })
    ));
    assert_eq!(balances.get("A"), 10);
}

#[test]
fn test_conservation_over_many_transfers() {
    let mut balances = three_accounts();
    let total = balances.total();
    let names = ["A", "B", "C"];

    for i in 0..60u64 {
        let from = names[(i % 3) as usize];
        let to = names[((i * 7 + 1) % 3) as usize];
        let _ = balances.apply_transfer(from, to, i % 6 + 1);
        assert_eq!(balances.total(), total);
    }
}
