// ============================================================================
// TEMPNOMO HOUSE — Custodial balance ledger for Tempo gameplay
// ============================================================================
//
// Deposits, withdrawals, bets and winnings against per-(wallet, token) house
// balance rows, with the on-chain treasury leg for withdrawals and a durable
// reconciliation trail for the one window the two systems can disagree in.
//
// ============================================================================

pub mod api;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod mocks;
pub mod mode;
pub mod storage;
pub mod treasury;

pub use engine::{BetTicket, Engine, Withdrawal};
pub use error::{BalanceError, StoreError, TransferError};
pub use mode::{AccountMode, ModeRouter, DEMO_STARTING_BALANCE};
pub use storage::{BalanceRecord, BetRecord, LedgerStore, RedbLedger, WithdrawalIntent};
pub use treasury::{TempoTreasury, TreasuryGateway};
