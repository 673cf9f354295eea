// ============================================================================
// TEST DOUBLES — In-memory collaborators with call counting
// ============================================================================
//
// Used by the integration test suites (and available to downstream tooling)
// to exercise the engine without a database or a chain node. Both doubles
// count calls so tests can assert which collaborators an operation touched —
// the demo-mode isolation guarantee is verified this way.
//
// ============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use crate::error::{StoreError, TransferError};
use crate::storage::{
    BalanceRecord, BetRecord, IntentState, LedgerStore, Tier, WithdrawalIntent,
};
use crate::treasury::TreasuryGateway;

fn key(address: &str, token: &str) -> String {
    format!("{}:{}", address.to_lowercase(), token.to_lowercase())
}

/// In-memory ledger store. Mutations take one mutex, so the per-key
/// atomicity contract holds trivially.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    balances: Arc<Mutex<HashMap<String, BalanceRecord>>>,
    bets: Arc<Mutex<HashMap<String, BetRecord>>>,
    intents: Arc<Mutex<HashMap<String, WithdrawalIntent>>>,
    /// When set, balance mutations fail with a backend error (intent and
    /// bet writes are unaffected). Lets tests open the transfer-succeeded/
    /// debit-failed window deterministically.
    fail_balance_writes: Arc<AtomicBool>,
    reads: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a balance row directly, bypassing the operation engine.
    pub fn seed(&self, address: &str, token: &str, amount: f64) {
        self.balances.lock().insert(
            key(address, token),
            BalanceRecord {
                amount,
                tier: Tier::Free,
                updated_at: Utc::now(),
            },
        );
    }

    pub fn set_fail_balance_writes(&self, fail: bool) {
        self.fail_balance_writes.store(fail, Ordering::SeqCst);
    }

    /// Total balance reads + writes observed (any store traffic at all).
    pub fn total_calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst) + self.writes.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn intent(&self, id: &str) -> Option<WithdrawalIntent> {
        self.intents.lock().get(id).cloned()
    }

    pub fn intents(&self) -> Vec<WithdrawalIntent> {
        self.intents.lock().values().cloned().collect()
    }

    fn mutate<F>(&self, address: &str, token: &str, apply: F) -> Result<f64, StoreError>
    where
        F: FnOnce(Option<&BalanceRecord>) -> Result<BalanceRecord, StoreError>,
    {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_balance_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected write failure".to_string()));
        }
        let mut balances = self.balances.lock();
        let k = key(address, token);
        let record = apply(balances.get(&k))?;
        let amount = record.amount;
        balances.insert(k, record);
        Ok(amount)
    }
}

impl LedgerStore for MemoryLedger {
    fn get(&self, address: &str, token: &str) -> Result<Option<BalanceRecord>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.balances.lock().get(&key(address, token)).cloned())
    }

    fn credit(&self, address: &str, token: &str, amount: f64) -> Result<f64, StoreError> {
        self.mutate(address, token, |current| {
            Ok(match current {
                Some(record) => BalanceRecord {
                    amount: record.amount + amount,
                    tier: record.tier,
                    updated_at: Utc::now(),
                },
                None => BalanceRecord {
                    amount,
                    tier: Tier::Free,
                    updated_at: Utc::now(),
                },
            })
        })
    }

    fn credit_existing(
        &self,
        address: &str,
        token: &str,
        amount: f64,
    ) -> Result<f64, StoreError> {
        self.mutate(address, token, |current| match current {
            Some(record) => Ok(BalanceRecord {
                amount: record.amount + amount,
                tier: record.tier,
                updated_at: Utc::now(),
            }),
            None => Err(StoreError::NotFound),
        })
    }

    fn debit_guarded(&self, address: &str, token: &str, amount: f64) -> Result<f64, StoreError> {
        self.mutate(address, token, |current| {
            let record = current.ok_or(StoreError::NotFound)?;
            if record.amount < amount {
                return Err(StoreError::Insufficient {
                    available: record.amount,
                    requested: amount,
                });
            }
            Ok(BalanceRecord {
                amount: record.amount - amount,
                tier: record.tier,
                updated_at: Utc::now(),
            })
        })
    }

    fn upsert_bet(&self, record: &BetRecord) -> Result<(), StoreError> {
        self.bets.lock().insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn get_bet(&self, id: &str) -> Result<Option<BetRecord>, StoreError> {
        Ok(self.bets.lock().get(id).cloned())
    }

    fn put_intent(&self, intent: &WithdrawalIntent) -> Result<(), StoreError> {
        self.intents.lock().insert(intent.id.clone(), intent.clone());
        Ok(())
    }

    fn set_intent_state(&self, id: &str, state: IntentState) -> Result<(), StoreError> {
        let mut intents = self.intents.lock();
        let intent = intents.get_mut(id).ok_or(StoreError::NotFound)?;
        intent.state = state;
        intent.updated_at = Utc::now();
        Ok(())
    }

    fn pending_reconciliations(&self) -> Result<Vec<WithdrawalIntent>, StoreError> {
        Ok(self
            .intents
            .lock()
            .values()
            .filter(|i| matches!(i.state, IntentState::Transferred { .. }))
            .cloned()
            .collect())
    }
}

/// Scripted treasury gateway: returns a fixed transaction hash, or a
/// submission failure when told to.
#[derive(Clone)]
pub struct MockTreasury {
    tx_hash: String,
    fail: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl MockTreasury {
    pub fn returning(tx_hash: &str) -> Self {
        Self {
            tx_hash: tx_hash.to_string(),
            fail: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TreasuryGateway for MockTreasury {
    async fn transfer(
        &self,
        _token: &str,
        _recipient: &str,
        _amount: f64,
    ) -> Result<String, TransferError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransferError::Submission(
                "RPC unavailable (scripted)".to_string(),
            ));
        }
        Ok(self.tx_hash.clone())
    }
}
