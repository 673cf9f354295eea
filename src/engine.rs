// ============================================================================
// BALANCE OPERATION ENGINE — Deposit, Withdraw, Bet, Win
// ============================================================================
//
// All four operations validate before any I/O, then go through the ledger
// store adapter; the engine never mutates rows directly. Withdraw is the one
// operation straddling two systems (ledger + chain) with no shared
// transaction, so it runs a two-phase protocol around a durable intent row:
//
//   requested ──transfer──▶ transferred ──debit──▶ debited
//        │ (transfer fails)       │ (debit fails)
//        ▼                        ▼
//      failed               stays `transferred`  →  ReconciliationNeeded
//
// The on-chain transfer is attempted BEFORE the ledger decrement: a failed
// transfer never produces a false debit. The transfer-ok/debit-fail window
// is the one irreducible inconsistency and is surfaced distinctly, never as
// a generic success or failure.
//
// ============================================================================

use chrono::Utc;
use tracing::{error, info, warn};

use crate::error::{BalanceError, StoreError};
use crate::storage::{
    addr_tail, BalanceRecord, BetRecord, IntentState, LedgerStore, WithdrawalIntent,
};
use crate::treasury::TreasuryGateway;

/// Outcome of a withdrawal. ReconciliationNeeded is a partial success —
/// tokens moved — so it lives on the Ok side, not in BalanceError.
#[derive(Debug, Clone, PartialEq)]
pub enum Withdrawal {
    Complete {
        new_balance: f64,
        tx_hash: String,
    },
    /// Tokens were sent on-chain but the ledger decrement did not commit.
    /// Carries everything an operator needs to align the ledger by hand.
    ReconciliationNeeded {
        tx_hash: String,
        intended_balance: f64,
        detail: String,
    },
}

/// Result of placing a bet: generated bet id plus remaining balance.
#[derive(Debug, Clone, PartialEq)]
pub struct BetTicket {
    pub bet_id: String,
    pub remaining_balance: f64,
}

/// A syntactically valid Tempo account: 0x + 40 hex chars (standard
/// 20-byte), or 0x + 64 hex chars (32-byte alternate scheme).
pub fn valid_address(address: &str) -> bool {
    let Some(body) = address.strip_prefix("0x") else {
        return false;
    };
    match hex::decode(body) {
        Ok(bytes) => bytes.len() == 20 || bytes.len() == 32,
        Err(_) => false,
    }
}

fn check_preconditions(address: &str, token: &str, amount: f64) -> Result<(), BalanceError> {
    if !valid_address(address) {
        return Err(BalanceError::Validation(
            "Invalid Tempo wallet address format".to_string(),
        ));
    }
    if token.is_empty() {
        return Err(BalanceError::Validation(
            "Missing token address".to_string(),
        ));
    }
    if !(amount > 0.0) {
        return Err(BalanceError::Validation(
            "Amount must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// The balance operation engine, generic over its two collaborators.
#[derive(Clone)]
pub struct Engine<S: LedgerStore, G: TreasuryGateway> {
    store: S,
    treasury: G,
}

impl<S: LedgerStore, G: TreasuryGateway> Engine<S, G> {
    pub fn new(store: S, treasury: G) -> Self {
        Self { store, treasury }
    }

    /// Read the current balance. A missing row is an implicit zero, not an
    /// error; only a malformed address is rejected.
    pub fn get_balance(
        &self,
        address: &str,
        token: &str,
    ) -> Result<Option<BalanceRecord>, BalanceError> {
        if !valid_address(address) {
            return Err(BalanceError::Validation(
                "Invalid Tempo wallet address format".to_string(),
            ));
        }
        if token.is_empty() {
            return Err(BalanceError::Validation(
                "Missing token address".to_string(),
            ));
        }
        self.store
            .get(address, token)
            .map_err(BalanceError::from_store)
    }

    /// Credit the ledger for an on-chain deposit the caller claims to have
    /// made. Trust-on-submit: `external_tx_ref` is recorded and logged but
    /// NOT verified against the chain before crediting. An on-chain
    /// confirmation check belongs to a separate collaborator and is not
    /// assumed here.
    pub fn deposit(
        &self,
        address: &str,
        token: &str,
        amount: f64,
        external_tx_ref: &str,
    ) -> Result<f64, BalanceError> {
        check_preconditions(address, token, amount)?;
        if external_tx_ref.is_empty() {
            return Err(BalanceError::Validation(
                "Missing deposit transaction reference".to_string(),
            ));
        }

        let new_balance = self
            .store
            .credit(address, token, amount)
            .map_err(BalanceError::from_store)?;

        info!(
            address = %address,
            token = %token,
            amount,
            tx_ref = %external_tx_ref,
            "Deposit credited (unverified claim)"
        );
        Ok(new_balance)
    }

    /// Withdraw house balance back to the user's wallet on-chain.
    ///
    /// Order of legs is load-bearing: balance check → durable intent →
    /// on-chain transfer → ledger debit. The transfer gateway is never
    /// invoked for an insufficient or unknown account.
    pub async fn withdraw(
        &self,
        address: &str,
        token: &str,
        amount: f64,
    ) -> Result<Withdrawal, BalanceError> {
        check_preconditions(address, token, amount)?;

        let record = self
            .store
            .get(address, token)
            .map_err(BalanceError::from_store)?
            .ok_or(BalanceError::NotFound)?;

        if record.amount < amount {
            return Err(BalanceError::InsufficientFunds {
                available: record.amount,
                requested: amount,
            });
        }

        // Phase 0: durable intent. If even this write fails, nothing has
        // moved and the whole withdrawal is safely retryable.
        let intent = WithdrawalIntent::new(address, token, amount);
        self.store
            .put_intent(&intent)
            .map_err(BalanceError::from_store)?;

        // Phase 1: on-chain transfer.
        let tx_hash = match self.treasury.transfer(token, address, amount).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                // No ledger mutation has happened; mark the intent and
                // propagate. Intent bookkeeping is best-effort from here on.
                if let Err(ie) = self.store.set_intent_state(
                    &intent.id,
                    IntentState::Failed {
                        reason: e.to_string(),
                    },
                ) {
                    warn!(intent = %intent.id, error = %ie, "Failed to mark withdrawal intent failed");
                }
                return Err(BalanceError::Transfer(e));
            }
        };

        if let Err(ie) = self.store.set_intent_state(
            &intent.id,
            IntentState::Transferred {
                tx_hash: tx_hash.clone(),
            },
        ) {
            warn!(intent = %intent.id, error = %ie, "Failed to advance withdrawal intent to transferred");
        }

        // Phase 2: ledger debit. Any failure past this point means tokens
        // already moved — surface it distinctly, never swallow it.
        match self.store.debit_guarded(address, token, amount) {
            Ok(new_balance) => {
                if let Err(ie) = self.store.set_intent_state(
                    &intent.id,
                    IntentState::Debited {
                        tx_hash: tx_hash.clone(),
                    },
                ) {
                    warn!(intent = %intent.id, error = %ie, "Failed to close withdrawal intent");
                }
                info!(address = %address, token = %token, amount, tx_hash = %tx_hash, "Withdrawal complete");
                Ok(Withdrawal::Complete {
                    new_balance,
                    tx_hash,
                })
            }
            Err(e) => {
                let intended_balance = record.amount - amount;
                error!(
                    address = %address,
                    token = %token,
                    amount,
                    tx_hash = %tx_hash,
                    intended_balance,
                    error = %e,
                    "RECONCILIATION NEEDED: tokens sent, ledger debit failed"
                );
                Ok(Withdrawal::ReconciliationNeeded {
                    tx_hash,
                    intended_balance,
                    detail: e.to_string(),
                })
            }
        }
    }

    /// Stake a bet against the house balance. No on-chain interaction.
    pub fn bet(&self, address: &str, token: &str, stake: f64) -> Result<BetTicket, BalanceError> {
        check_preconditions(address, token, stake)?;

        let remaining_balance = self
            .store
            .debit_guarded(address, token, stake)
            .map_err(BalanceError::from_store)?;

        let bet_id = format!(
            "bet_{}_{}",
            Utc::now().timestamp_millis(),
            addr_tail(address)
        );
        info!(address = %address, token = %token, stake, bet_id = %bet_id, "Bet placed");
        Ok(BetTicket {
            bet_id,
            remaining_balance,
        })
    }

    /// Credit winnings. Requires a pre-existing ledger relationship: an
    /// account that never deposited cannot be paid out.
    pub fn win(
        &self,
        address: &str,
        token: &str,
        payout: f64,
        bet_id: &str,
    ) -> Result<f64, BalanceError> {
        check_preconditions(address, token, payout)?;

        let new_balance = self
            .store
            .credit_existing(address, token, payout)
            .map_err(BalanceError::from_store)?;

        info!(address = %address, token = %token, payout, bet_id = %bet_id, "Winnings credited");
        Ok(new_balance)
    }

    /// Persist a resolved bet to the audit history. Idempotent on the bet
    /// id: resubmission replaces the same logical record.
    pub fn save_bet(&self, mut record: BetRecord) -> Result<(), BalanceError> {
        if record.id.is_empty() || record.wallet_address.is_empty() {
            return Err(BalanceError::Validation(
                "Missing required fields".to_string(),
            ));
        }
        record.wallet_address = record.wallet_address.to_lowercase();
        self.store
            .upsert_bet(&record)
            .map_err(BalanceError::from_store)
    }

    /// Withdrawals whose tokens left the treasury without a matching ledger
    /// debit. Scanned at startup so a crash in the inconsistency window is
    /// reported, not lost.
    pub fn pending_reconciliations(&self) -> Result<Vec<WithdrawalIntent>, StoreError> {
        self.store.pending_reconciliations()
    }
}
