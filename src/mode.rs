// ============================================================================
// ACCOUNT MODE ROUTER — Real vs demo bifurcation
// ============================================================================
//
// A pure routing decision: real-mode calls forward to the balance operation
// engine; demo-mode calls touch only an in-memory book. The demo arms never
// hold a reference to the store or the gateway, so demo play is structurally
// incapable of reaching real funds.
//
// ============================================================================

use dashmap::DashMap;
use std::sync::Arc;

use crate::engine::{BetTicket, Engine, Withdrawal};
use crate::error::BalanceError;
use crate::storage::{addr_tail, LedgerStore};
use crate::treasury::TreasuryGateway;

/// Per-session account mode. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountMode {
    Real,
    Demo,
}

/// Starting balance for a fresh demo account: 10,000 practice credits.
pub const DEMO_STARTING_BALANCE: f64 = 10_000.0;

/// Ephemeral demo balances, one counter per wallet address. Debits clamp at
/// a floor of zero instead of rejecting.
#[derive(Clone, Default)]
pub struct DemoBook {
    balances: Arc<DashMap<String, f64>>,
}

impl DemoBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, address: &str) -> f64 {
        *self
            .balances
            .entry(address.to_lowercase())
            .or_insert(DEMO_STARTING_BALANCE)
    }

    pub fn credit(&self, address: &str, amount: f64) -> f64 {
        let mut entry = self
            .balances
            .entry(address.to_lowercase())
            .or_insert(DEMO_STARTING_BALANCE);
        *entry = (*entry + amount).max(0.0);
        *entry
    }

    pub fn debit(&self, address: &str, amount: f64) -> f64 {
        let mut entry = self
            .balances
            .entry(address.to_lowercase())
            .or_insert(DEMO_STARTING_BALANCE);
        *entry = (*entry - amount).max(0.0);
        *entry
    }
}

/// Demo arms skip address/token checks (demo addresses follow their own
/// scheme) but amounts obey the same rule as real play.
fn check_amount(amount: f64) -> Result<(), BalanceError> {
    if !(amount > 0.0) {
        return Err(BalanceError::Validation(
            "Amount must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Routes each operation to the engine (real) or the demo book (demo).
#[derive(Clone)]
pub struct ModeRouter<S: LedgerStore, G: TreasuryGateway> {
    engine: Engine<S, G>,
    demo: DemoBook,
}

impl<S: LedgerStore, G: TreasuryGateway> ModeRouter<S, G> {
    pub fn new(engine: Engine<S, G>) -> Self {
        Self {
            engine,
            demo: DemoBook::new(),
        }
    }

    pub fn demo_balance(&self, address: &str) -> f64 {
        self.demo.balance(address)
    }

    pub fn deposit(
        &self,
        mode: AccountMode,
        address: &str,
        token: &str,
        amount: f64,
        external_tx_ref: &str,
    ) -> Result<f64, BalanceError> {
        match mode {
            AccountMode::Demo => {
                check_amount(amount)?;
                Ok(self.demo.credit(address, amount))
            }
            AccountMode::Real => self.engine.deposit(address, token, amount, external_tx_ref),
        }
    }

    pub async fn withdraw(
        &self,
        mode: AccountMode,
        address: &str,
        token: &str,
        amount: f64,
    ) -> Result<Withdrawal, BalanceError> {
        match mode {
            AccountMode::Demo => {
                check_amount(amount)?;
                Ok(Withdrawal::Complete {
                    new_balance: self.demo.debit(address, amount),
                    // Demo withdrawals move no tokens, so there is no
                    // transaction to reference.
                    tx_hash: String::new(),
                })
            }
            AccountMode::Real => self.engine.withdraw(address, token, amount).await,
        }
    }

    pub fn bet(
        &self,
        mode: AccountMode,
        address: &str,
        token: &str,
        stake: f64,
    ) -> Result<BetTicket, BalanceError> {
        match mode {
            AccountMode::Demo => {
                check_amount(stake)?;
                Ok(BetTicket {
                    bet_id: format!(
                        "demo_bet_{}_{}",
                        chrono::Utc::now().timestamp_millis(),
                        addr_tail(address)
                    ),
                    remaining_balance: self.demo.debit(address, stake),
                })
            }
            AccountMode::Real => self.engine.bet(address, token, stake),
        }
    }

    pub fn win(
        &self,
        mode: AccountMode,
        address: &str,
        token: &str,
        payout: f64,
        bet_id: &str,
    ) -> Result<f64, BalanceError> {
        match mode {
            AccountMode::Demo => {
                check_amount(payout)?;
                Ok(self.demo.credit(address, payout))
            }
            AccountMode::Real => self.engine.win(address, token, payout, bet_id),
        }
    }
}
