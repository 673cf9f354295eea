// ============================================================================
// LEDGER STORE ADAPTER
// ============================================================================
//
// Durable, atomic access to per-(wallet, token) balance rows using:
// - ReDB: ACID-compliant embedded database (MVCC, single writer)
// - DashMap: lock-free concurrent cache for hot balance reads
//
// CONCURRENCY MODEL:
// - Reads: lock-free via DashMap, refreshed only after a successful commit
// - Writes: every credit/debit is a read-modify-write performed INSIDE one
//   ReDB write transaction. ReDB serializes writers, so the minimum-balance
//   guard in debit_guarded() is evaluated against the committed value no
//   matter how many callers race on the same row. This is the single
//   serialization point for the whole service.
// - Cache ordering: a writer holds the write gate across commit AND cache
//   insert, so cache updates land in commit order; a racing reader that
//   loaded an older snapshot from disk can only fill an absent entry, never
//   overwrite one a writer installed.
//
// ============================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::StoreError;

/// Balance rows: "wallet:token" (lowercase) → serialized BalanceRecord
const BALANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("balances");

/// Bet history: bet id → serialized BetRecord (insert-or-replace)
const BETS: TableDefinition<&str, &[u8]> = TableDefinition::new("bet_history");

/// Withdrawal intents: intent id → serialized WithdrawalIntent
const WITHDRAWALS: TableDefinition<&str, &[u8]> = TableDefinition::new("withdrawal_intents");

// ============================================================================
// ROW TYPES
// ============================================================================

/// User tier, informational only for the balance core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Standard,
    Vip,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Standard => "standard",
            Tier::Vip => "vip",
        }
    }
}

/// The authoritative ledger entry for one (wallet, token) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub amount: f64,
    pub tier: Tier,
    pub updated_at: DateTime<Utc>,
}

/// Immutable (after resolution) audit row of a single wager. Keyed by a
/// caller-supplied id; re-submission replaces the same logical record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetRecord {
    pub id: String,
    pub wallet_address: String,
    pub token_address: String,
    pub asset: String,
    pub direction: String,
    pub amount: f64,
    pub multiplier: f64,
    pub strike_price: f64,
    pub end_price: f64,
    pub payout: f64,
    pub won: bool,
    pub mode: String,
    pub network: String,
    pub resolved_at: DateTime<Utc>,
}

/// Where a withdrawal stands between the two systems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IntentState {
    /// Recorded, on-chain transfer not yet attempted.
    Requested,
    /// Tokens left the treasury; ledger not yet debited. A row stuck here
    /// is exactly the reconciliation-needed condition.
    Transferred { tx_hash: String },
    /// Ledger debited; the withdrawal is fully settled.
    Debited { tx_hash: String },
    /// On-chain transfer failed; no ledger mutation happened.
    Failed { reason: String },
}

/// Durable two-phase record of a withdrawal. Written before the treasury is
/// touched so a crash between the transfer and the debit leaves evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalIntent {
    pub id: String,
    pub wallet_address: String,
    pub token_address: String,
    pub amount: f64,
    pub state: IntentState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WithdrawalIntent {
    pub fn new(wallet_address: &str, token_address: &str, amount: f64) -> Self {
        let now = Utc::now();
        Self {
            id: format!("wd_{}_{}", now.timestamp_millis(), addr_tail(wallet_address)),
            wallet_address: wallet_address.to_lowercase(),
            token_address: token_address.to_lowercase(),
            amount,
            state: IntentState::Requested,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Last 6 characters of an address, used to keep generated ids readable.
/// Indexed by char, not byte: demo addresses are caller-supplied and may
/// carry non-ASCII characters.
pub(crate) fn addr_tail(address: &str) -> &str {
    match address.char_indices().rev().nth(5) {
        Some((idx, _)) => &address[idx..],
        None => address,
    }
}

fn balance_key(address: &str, token: &str) -> String {
    format!("{}:{}", address.to_lowercase(), token.to_lowercase())
}


// ============================================================================
// LEDGER STORE TRAIT
// ============================================================================

/// The storage contract the operation engine is written against.
///
/// Implementations must make credit/debit atomic per row: the balance check
/// in `debit_guarded` and the subsequent write may not interleave with any
/// other mutation of the same (address, token) key.
pub trait LedgerStore: Clone + Send + Sync + 'static {
    /// Point read. Absence is NOT an error: callers treat a missing row as
    /// amount 0 / tier free.
    fn get(&self, address: &str, token: &str) -> Result<Option<BalanceRecord>, StoreError>;

    /// Add `amount` to the row, creating it (tier free) if absent.
    /// Returns the new amount.
    fn credit(&self, address: &str, token: &str, amount: f64) -> Result<f64, StoreError>;

    /// Add `amount` to an EXISTING row; fails NotFound otherwise. Winnings
    /// can only be credited to an account that already touched the ledger.
    fn credit_existing(&self, address: &str, token: &str, amount: f64)
        -> Result<f64, StoreError>;

    /// Subtract `amount` if and only if the row exists and holds at least
    /// `amount`. Guard and write share one atomic unit. Returns the new
    /// amount.
    fn debit_guarded(&self, address: &str, token: &str, amount: f64) -> Result<f64, StoreError>;

    /// Insert-or-replace a bet history row, keyed by bet id.
    fn upsert_bet(&self, record: &BetRecord) -> Result<(), StoreError>;

    /// Point read of a bet history row.
    fn get_bet(&self, id: &str) -> Result<Option<BetRecord>, StoreError>;

    /// Record a fresh withdrawal intent.
    fn put_intent(&self, intent: &WithdrawalIntent) -> Result<(), StoreError>;

    /// Advance an intent to a new state.
    fn set_intent_state(&self, id: &str, state: IntentState) -> Result<(), StoreError>;

    /// All intents stuck in `Transferred`: tokens sent, ledger not debited.
    fn pending_reconciliations(&self) -> Result<Vec<WithdrawalIntent>, StoreError>;
}

// ============================================================================
// REDB IMPLEMENTATION
// ============================================================================

/// Production ledger store: ReDB for durability, DashMap for hot reads.
///
/// # Thread safety
/// - `Clone` is cheap (Arc handles)
/// - `get()` is lock-free on the hot path
/// - mutations go through ReDB's single-writer MVCC
#[derive(Clone)]
pub struct RedbLedger {
    db: Arc<Database>,
    cache: Arc<DashMap<String, BalanceRecord>>,
    /// Held across commit + cache insert so cache updates land in commit
    /// order. ReDB already serializes the transactions themselves.
    write_gate: Arc<Mutex<()>>,
}

impl RedbLedger {
    /// Create or open the ledger database under `path`.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        info!(path = %path, "Opening ledger database");

        std::fs::create_dir_all(path).map_err(StoreError::backend)?;
        let db = Database::create(format!("{}/ledger.redb", path)).map_err(StoreError::backend)?;

        // Pre-create tables so later read transactions never race creation.
        let write_txn = db.begin_write().map_err(StoreError::backend)?;
        {
            let _ = write_txn.open_table(BALANCES).map_err(StoreError::backend)?;
            let _ = write_txn.open_table(BETS).map_err(StoreError::backend)?;
            let _ = write_txn
                .open_table(WITHDRAWALS)
                .map_err(StoreError::backend)?;
        }
        write_txn.commit().map_err(StoreError::backend)?;

        // Warm the cache from disk.
        let cache = Arc::new(DashMap::new());
        {
            let read_txn = db.begin_read().map_err(StoreError::backend)?;
            let table = read_txn.open_table(BALANCES).map_err(StoreError::backend)?;
            for row in table.iter().map_err(StoreError::backend)? {
                let (key, value) = row.map_err(StoreError::backend)?;
                match serde_json::from_slice::<BalanceRecord>(value.value()) {
                    Ok(record) => {
                        cache.insert(key.value().to_string(), record);
                    }
                    Err(e) => warn!(key = %key.value(), error = %e, "Skipping corrupt balance row"),
                }
            }
        }

        info!(accounts = cache.len(), "Ledger loaded");
        Ok(Self {
            db: Arc::new(db),
            cache,
            write_gate: Arc::new(Mutex::new(())),
        })
    }

    /// Read-modify-write of one balance row inside a single write
    /// transaction. `apply` sees the committed amount (None if the row is
    /// absent) and returns the record to persist, or an error to abort with
    /// nothing written.
    fn mutate_balance<F>(&self, address: &str, token: &str, apply: F) -> Result<f64, StoreError>
    where
        F: FnOnce(Option<&BalanceRecord>) -> Result<BalanceRecord, StoreError>,
    {
        let key = balance_key(address, token);

        // Without the gate, a writer preempted between its commit and its
        // cache insert could publish a stale record over a later commit.
        let _gate = self.write_gate.lock();
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;

        let record = {
            let mut table = write_txn.open_table(BALANCES).map_err(StoreError::backend)?;

            let current = match table.get(key.as_str()).map_err(StoreError::backend)? {
                Some(access) => Some(
                    serde_json::from_slice::<BalanceRecord>(access.value())
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                ),
                None => None,
            };

            let record = apply(current.as_ref())?;
            let encoded =
                serde_json::to_vec(&record).map_err(|e| StoreError::Corrupt(e.to_string()))?;
            table
                .insert(key.as_str(), encoded.as_slice())
                .map_err(StoreError::backend)?;
            record
        };

        write_txn.commit().map_err(StoreError::backend)?;

        // Cache only ever reflects committed state.
        let amount = record.amount;
        self.cache.insert(key, record);
        Ok(amount)
    }

    fn write_intent(&self, intent: &WithdrawalIntent) -> Result<(), StoreError> {
        let encoded =
            serde_json::to_vec(intent).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        {
            let mut table = write_txn
                .open_table(WITHDRAWALS)
                .map_err(StoreError::backend)?;
            table
                .insert(intent.id.as_str(), encoded.as_slice())
                .map_err(StoreError::backend)?;
        }
        write_txn.commit().map_err(StoreError::backend)
    }
}

impl LedgerStore for RedbLedger {
    fn get(&self, address: &str, token: &str) -> Result<Option<BalanceRecord>, StoreError> {
        let key = balance_key(address, token);

        // Fast path: lock-free cache hit.
        if let Some(record) = self.cache.get(&key) {
            return Ok(Some(record.clone()));
        }

        // Slow path: disk (cache miss after restart).
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let table = read_txn.open_table(BALANCES).map_err(StoreError::backend)?;
        match table.get(key.as_str()).map_err(StoreError::backend)? {
            Some(access) => {
                let record = serde_json::from_slice::<BalanceRecord>(access.value())
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?;
                // Fill only if still absent: this snapshot may predate a
                // write that already cached a newer record.
                self.cache.entry(key).or_insert_with(|| record.clone());
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn credit(&self, address: &str, token: &str, amount: f64) -> Result<f64, StoreError> {
        let new_amount = self.mutate_balance(address, token, |current| {
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
        })?;
        info!(address = %address, token = %token, amount, new_balance = new_amount, "Ledger credited");
        Ok(new_amount)
    }

    fn credit_existing(
        &self,
        address: &str,
        token: &str,
        amount: f64,
    ) -> Result<f64, StoreError> {
        let new_amount = self.mutate_balance(address, token, |current| match current {
            Some(record) => Ok(BalanceRecord {
                amount: record.amount + amount,
                tier: record.tier,
                updated_at: Utc::now(),
            }),
            None => Err(StoreError::NotFound),
        })?;
        info!(address = %address, token = %token, amount, new_balance = new_amount, "Winnings credited");
        Ok(new_amount)
    }

    fn debit_guarded(&self, address: &str, token: &str, amount: f64) -> Result<f64, StoreError> {
        let new_amount = self.mutate_balance(address, token, |current| {
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
        })?;
        info!(address = %address, token = %token, amount, new_balance = new_amount, "Ledger debited");
        Ok(new_amount)
    }

    fn upsert_bet(&self, record: &BetRecord) -> Result<(), StoreError> {
        let encoded =
            serde_json::to_vec(record).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        {
            let mut table = write_txn.open_table(BETS).map_err(StoreError::backend)?;
            // insert replaces any existing row with the same id: resubmitting
            // a bet result is idempotent, never a duplicate.
            table
                .insert(record.id.as_str(), encoded.as_slice())
                .map_err(StoreError::backend)?;
        }
        write_txn.commit().map_err(StoreError::backend)
    }

    fn get_bet(&self, id: &str) -> Result<Option<BetRecord>, StoreError> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let table = read_txn.open_table(BETS).map_err(StoreError::backend)?;
        match table.get(id).map_err(StoreError::backend)? {
            Some(access) => Ok(Some(
                serde_json::from_slice(access.value())
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    fn put_intent(&self, intent: &WithdrawalIntent) -> Result<(), StoreError> {
        self.write_intent(intent)
    }

    fn set_intent_state(&self, id: &str, state: IntentState) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        {
            let mut table = write_txn
                .open_table(WITHDRAWALS)
                .map_err(StoreError::backend)?;

            let mut intent = match table.get(id).map_err(StoreError::backend)? {
                Some(access) => serde_json::from_slice::<WithdrawalIntent>(access.value())
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                None => return Err(StoreError::NotFound),
            };

            intent.state = state;
            intent.updated_at = Utc::now();
            let encoded =
                serde_json::to_vec(&intent).map_err(|e| StoreError::Corrupt(e.to_string()))?;
            table
                .insert(id, encoded.as_slice())
                .map_err(StoreError::backend)?;
        }
        write_txn.commit().map_err(StoreError::backend)
    }

    fn pending_reconciliations(&self) -> Result<Vec<WithdrawalIntent>, StoreError> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let table = read_txn
            .open_table(WITHDRAWALS)
            .map_err(StoreError::backend)?;

        let mut pending = Vec::new();
        for row in table.iter().map_err(StoreError::backend)? {
            let (_, value) = row.map_err(StoreError::backend)?;
            let intent: WithdrawalIntent = serde_json::from_slice(value.value())
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            if matches!(intent.state, IntentState::Transferred { .. }) {
                pending.push(intent);
            }
        }
        Ok(pending)
    }
}
