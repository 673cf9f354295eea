// ============================================================================
// LEDGER STORE TESTS — ReDB-backed balance rows, bets, withdrawal intents
// ============================================================================

use house::storage::{BetRecord, IntentState, LedgerStore, RedbLedger, Tier, WithdrawalIntent};
use tempfile::TempDir;

const ALICE: &str = "0xAAAAaaaaAAAAaaaaAAAAaaaaAAAAaaaaAAAAaaaa";
const TOKEN: &str = "0x20c0000000000000000000000000000000000001";

fn open_ledger(dir: &TempDir) -> RedbLedger {
    RedbLedger::open(dir.path().to_str().unwrap()).expect("ledger should open")
}

fn sample_bet(id: &str) -> BetRecord {
    BetRecord {
        id: id.to_string(),
        wallet_address: ALICE.to_lowercase(),
        token_address: TOKEN.to_string(),
        asset: "BTC".to_string(),
        direction: "UP".to_string(),
        amount: 25.0,
        multiplier: 1.9,
        strike_price: 65_000.0,
        end_price: 65_420.0,
        payout: 47.5,
        won: true,
        mode: "classic".to_string(),
        network: "TEMPO".to_string(),
        resolved_at: chrono::Utc::now(),
    }
}

#[test]
fn credit_creates_row_and_accumulates() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);

    assert!(
        ledger.get(ALICE, TOKEN).unwrap().is_none(),
        "fresh ledger should have no row for Alice"
    );

    let balance = ledger.credit(ALICE, TOKEN, 100.0).unwrap();
    assert_eq!(balance, 100.0, "first credit should create the row at 100");

    let balance = ledger.credit(ALICE, TOKEN, 50.0).unwrap();
    assert_eq!(balance, 150.0, "second credit should accumulate to 150");

    let record = ledger.get(ALICE, TOKEN).unwrap().expect("row should exist");
    assert_eq!(record.amount, 150.0);
    assert_eq!(record.tier, Tier::Free, "new rows start at tier free");
}

#[test]
fn balance_key_is_case_insensitive() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);

    ledger.credit(ALICE, TOKEN, 75.0).unwrap();

    let record = ledger
        .get(&ALICE.to_lowercase(), &TOKEN.to_uppercase().replace("0X", "0x"))
        .unwrap()
        .expect("lookup should be case-insensitive on address and token");
    assert_eq!(record.amount, 75.0);
}

#[test]
fn guarded_debit_enforces_minimum_balance() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);

    ledger.credit(ALICE, TOKEN, 100.0).unwrap();

    let balance = ledger.debit_guarded(ALICE, TOKEN, 40.0).unwrap();
    assert_eq!(balance, 60.0, "debit within balance should succeed");

    let err = ledger.debit_guarded(ALICE, TOKEN, 60.01).unwrap_err();
    assert!(
        matches!(err, house::StoreError::Insufficient { .. }),
        "over-debit should be rejected, got: {err}"
    );

    let record = ledger.get(ALICE, TOKEN).unwrap().unwrap();
    assert_eq!(record.amount, 60.0, "rejected debit must not change the row");
}

#[test]
fn debit_and_credit_existing_require_a_row() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);

    assert!(
        matches!(
            ledger.debit_guarded(ALICE, TOKEN, 1.0).unwrap_err(),
            house::StoreError::NotFound
        ),
        "debit against a missing row should be NotFound"
    );
    assert!(
        matches!(
            ledger.credit_existing(ALICE, TOKEN, 1.0).unwrap_err(),
            house::StoreError::NotFound
        ),
        "credit_existing against a missing row should be NotFound"
    );
}

#[test]
fn balances_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let ledger = open_ledger(&dir);
        ledger.credit(ALICE, TOKEN, 123.0).unwrap();
    }

    let reopened = open_ledger(&dir);
    let record = reopened
        .get(ALICE, TOKEN)
        .unwrap()
        .expect("row should survive restart");
    assert_eq!(record.amount, 123.0);
}

#[test]
fn bet_upsert_is_idempotent_last_write_wins() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);

    let mut bet = sample_bet("bet_001");
    ledger.upsert_bet(&bet).unwrap();

    bet.payout = 95.0;
    ledger.upsert_bet(&bet).unwrap();

    let stored = ledger.get_bet("bet_001").unwrap().expect("bet should exist");
    assert_eq!(
        stored.payout, 95.0,
        "resubmission should replace the record, not duplicate it"
    );
}

#[test]
fn withdrawal_intent_lifecycle_and_pending_scan() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);

    let intent = WithdrawalIntent::new(ALICE, TOKEN, 50.0);
    ledger.put_intent(&intent).unwrap();
    assert!(
        ledger.pending_reconciliations().unwrap().is_empty(),
        "a requested intent is not yet a reconciliation case"
    );

    ledger
        .set_intent_state(
            &intent.id,
            IntentState::Transferred {
                tx_hash: "0xdead".to_string(),
            },
        )
        .unwrap();

    let pending = ledger.pending_reconciliations().unwrap();
    assert_eq!(pending.len(), 1, "transferred intent should be pending");
    assert_eq!(pending[0].id, intent.id);
    assert_eq!(pending[0].amount, 50.0);

    ledger
        .set_intent_state(
            &intent.id,
            IntentState::Debited {
                tx_hash: "0xdead".to_string(),
            },
        )
        .unwrap();
    assert!(
        ledger.pending_reconciliations().unwrap().is_empty(),
        "debited intent should no longer be pending"
    );
}

#[test]
fn pending_intents_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let intent = WithdrawalIntent::new(ALICE, TOKEN, 10.0);
    {
        let ledger = open_ledger(&dir);
        ledger.put_intent(&intent).unwrap();
        ledger
            .set_intent_state(
                &intent.id,
                IntentState::Transferred {
                    tx_hash: "0xbeef".to_string(),
                },
            )
            .unwrap();
    }

    let reopened = open_ledger(&dir);
    let pending = reopened.pending_reconciliations().unwrap();
    assert_eq!(
        pending.len(),
        1,
        "a crash inside the inconsistency window must leave evidence"
    );
    assert!(
        matches!(&pending[0].state, IntentState::Transferred { tx_hash } if tx_hash == "0xbeef")
    );
}
