// ============================================================================
// HOUSE CLIENT + SYNC COORDINATOR
// ============================================================================
//
// Two layers:
//
// - HouseClient: thin typed HTTP client over the balance API. One method per
//   route, camelCase wire shapes, API errors surfaced with status + message.
// - SyncCoordinator: keeps a local balance view consistent with the server
//   using optimistic updates plus a delayed authoritative re-fetch. Demo
//   mode never leaves the process.
//
// STALENESS RULE: every local mutation bumps a generation counter; a delayed
// re-fetch only applies its result if the generation is unchanged when it
// lands. A slow response from before the latest bet can never clobber a
// newer optimistic value.
//
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{BALANCE_REFRESH_DELAY_MS, WALLET_POLL_SECS};
use crate::mode::{AccountMode, DemoBook};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status and a reason.
    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },
}

// ============================================================================
// WIRE SHAPES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceView {
    pub balance: f64,
    pub updated_at: Option<String>,
    pub tier: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositAck {
    pub new_balance: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawAck {
    pub tx_hash: String,
    /// Present on a clean withdrawal.
    pub new_balance: Option<f64>,
    /// Present when the server reports a partial success: tokens moved but
    /// the ledger was not debited.
    pub intended_balance: Option<f64>,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetAck {
    pub bet_id: String,
    pub remaining_balance: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiError {
    error: String,
}

// ============================================================================
// HTTP CLIENT
// ============================================================================

/// Typed client for the house balance API.
#[derive(Clone)]
pub struct HouseClient {
    http: reqwest::Client,
    base_url: String,
}

impl HouseClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        let message = response
            .json::<ApiError>()
            .await
            .map(|e| e.error)
            .unwrap_or_else(|_| status.to_string());
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    pub async fn fetch_balance(
        &self,
        address: &str,
        token: &str,
    ) -> Result<BalanceView, ClientError> {
        let response = self
            .http
            .get(format!("{}/balance/{}", self.base_url, address))
            .query(&[("token", token)])
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn deposit(
        &self,
        address: &str,
        token: &str,
        amount: f64,
        tx_hash: &str,
    ) -> Result<DepositAck, ClientError> {
        let response = self
            .http
            .post(format!("{}/balance/deposit", self.base_url))
            .json(&json!({
                "userAddress": address,
                "amount": amount,
                "txHash": tx_hash,
                "tokenAddress": token,
            }))
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn withdraw(
        &self,
        address: &str,
        token: &str,
        amount: f64,
    ) -> Result<WithdrawAck, ClientError> {
        let response = self
            .http
            .post(format!("{}/balance/withdraw", self.base_url))
            .json(&json!({
                "userAddress": address,
                "amount": amount,
                "tokenAddress": token,
            }))
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn bet(
        &self,
        address: &str,
        token: &str,
        stake: f64,
    ) -> Result<BetAck, ClientError> {
        let response = self
            .http
            .post(format!("{}/balance/bet", self.base_url))
            .json(&json!({
                "userAddress": address,
                "betAmount": stake,
                "tokenAddress": token,
            }))
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn win(
        &self,
        address: &str,
        token: &str,
        payout: f64,
        bet_id: &str,
    ) -> Result<DepositAck, ClientError> {
        let response = self
            .http
            .post(format!("{}/balance/win", self.base_url))
            .json(&json!({
                "userAddress": address,
                "winAmount": payout,
                "betId": bet_id,
                "tokenAddress": token,
            }))
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn save_bet(&self, record: serde_json::Value) -> Result<(), ClientError> {
        let response = self
            .http
            .post(format!("{}/bets/save", self.base_url))
            .json(&record)
            .send()
            .await?;
        Self::decode::<serde_json::Value>(response).await.map(|_| ())
    }
}

// ============================================================================
// SYNC COORDINATOR
// ============================================================================

/// Addresses with this prefix belong to practice sessions and never reach
/// the server.
const DEMO_ADDRESS_PREFIX: &str = "0xDEMO";

pub fn is_demo_address(address: &str) -> bool {
    address.starts_with(DEMO_ADDRESS_PREFIX)
}

struct SyncInner {
    client: HouseClient,
    address: String,
    token: String,
    mode: RwLock<AccountMode>,
    /// Locally visible house balance (real mode only).
    view: RwLock<f64>,
    /// Tier from the last authoritative fetch.
    tier: RwLock<String>,
    /// Last observed on-chain wallet balance, if the poll is running.
    wallet: RwLock<Option<f64>>,
    demo: DemoBook,
    /// Bumped on every local mutation; delayed re-fetches check it before
    /// applying their result.
    generation: AtomicU64,
}

/// Keeps a session's balance view in sync with the house server.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<SyncInner>,
}

impl SyncCoordinator {
    pub fn new(client: HouseClient, address: &str, token: &str) -> Self {
        let mode = if is_demo_address(address) {
            AccountMode::Demo
        } else {
            AccountMode::Real
        };
        Self {
            inner: Arc::new(SyncInner {
                client,
                address: address.to_string(),
                token: token.to_string(),
                mode: RwLock::new(mode),
                view: RwLock::new(0.0),
                tier: RwLock::new("free".to_string()),
                wallet: RwLock::new(None),
                demo: DemoBook::new(),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn mode(&self) -> AccountMode {
        *self.inner.mode.read()
    }

    pub fn set_mode(&self, mode: AccountMode) {
        *self.inner.mode.write() = mode;
    }

    /// The balance the UI should render right now.
    pub fn balance(&self) -> f64 {
        match self.mode() {
            AccountMode::Demo => self.inner.demo.balance(&self.inner.address),
            AccountMode::Real => *self.inner.view.read(),
        }
    }

    pub fn wallet_balance(&self) -> Option<f64> {
        *self.inner.wallet.read()
    }

    pub fn tier(&self) -> String {
        self.inner.tier.read().clone()
    }

    /// Fetch the authoritative balance and replace the local view.
    pub async fn refresh(&self) -> Result<f64, ClientError> {
        if self.mode() == AccountMode::Demo {
            return Ok(self.inner.demo.balance(&self.inner.address));
        }
        let view = self
            .inner
            .client
            .fetch_balance(&self.inner.address, &self.inner.token)
            .await?;
        self.apply(view.balance);
        *self.inner.tier.write() = view.tier;
        Ok(view.balance)
    }

    pub async fn deposit(&self, amount: f64, tx_hash: &str) -> Result<f64, ClientError> {
        if self.mode() == AccountMode::Demo {
            return Ok(self.inner.demo.credit(&self.inner.address, amount));
        }
        let ack = self
            .inner
            .client
            .deposit(&self.inner.address, &self.inner.token, amount, tx_hash)
            .await?;
        self.apply(ack.new_balance);
        self.schedule_refresh();
        Ok(ack.new_balance)
    }

    pub async fn withdraw(&self, amount: f64) -> Result<WithdrawAck, ClientError> {
        if self.mode() == AccountMode::Demo {
            let new_balance = self.inner.demo.debit(&self.inner.address, amount);
            return Ok(WithdrawAck {
                tx_hash: String::new(),
                new_balance: Some(new_balance),
                intended_balance: None,
                warning: None,
            });
        }
        let ack = self
            .inner
            .client
            .withdraw(&self.inner.address, &self.inner.token, amount)
            .await?;
        if let Some(new_balance) = ack.new_balance {
            self.apply(new_balance);
        } else if let Some(warning) = &ack.warning {
            // Partial success: leave the view alone until the operator
            // reconciles; the re-fetch below will pick up whatever the
            // ledger actually says.
            warn!(warning = %warning, tx_hash = %ack.tx_hash, "Withdrawal needs reconciliation");
        }
        self.schedule_refresh();
        Ok(ack)
    }

    pub async fn place_bet(&self, stake: f64) -> Result<BetAck, ClientError> {
        if self.mode() == AccountMode::Demo {
            let remaining = self.inner.demo.debit(&self.inner.address, stake);
            return Ok(BetAck {
                bet_id: format!("demo_bet_{}", chrono::Utc::now().timestamp_millis()),
                remaining_balance: remaining,
            });
        }
        let ack = self
            .inner
            .client
            .bet(&self.inner.address, &self.inner.token, stake)
            .await?;
        self.apply(ack.remaining_balance);
        self.schedule_refresh();
        Ok(ack)
    }

    pub async fn record_win(&self, payout: f64, bet_id: &str) -> Result<f64, ClientError> {
        if self.mode() == AccountMode::Demo {
            return Ok(self.inner.demo.credit(&self.inner.address, payout));
        }
        let ack = self
            .inner
            .client
            .win(&self.inner.address, &self.inner.token, payout, bet_id)
            .await?;
        self.apply(ack.new_balance);
        self.schedule_refresh();
        Ok(ack.new_balance)
    }

    fn apply(&self, balance: f64) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        *self.inner.view.write() = balance;
    }

    /// Re-fetch the authoritative balance after a short delay. The result is
    /// dropped if any newer local mutation happened while it was in flight.
    fn schedule_refresh(&self) {
        let inner = self.inner.clone();
        let generation = inner.generation.load(Ordering::SeqCst);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(BALANCE_REFRESH_DELAY_MS)).await;
            if *inner.mode.read() == AccountMode::Demo {
                return;
            }
            match inner.client.fetch_balance(&inner.address, &inner.token).await {
                Ok(view) => {
                    if inner.generation.load(Ordering::SeqCst) == generation {
                        *inner.view.write() = view.balance;
                        *inner.tier.write() = view.tier;
                        debug!(balance = view.balance, "Authoritative balance applied");
                    } else {
                        debug!("Stale balance refresh dropped");
                    }
                }
                Err(e) => warn!(error = %e, "Balance refresh failed"),
            }
        });
    }

    /// Poll an external wallet-balance source at a fixed interval. Runs
    /// until the coordinator is dropped everywhere else.
    pub fn spawn_wallet_poll<F, Fut>(&self, fetch: F)
    where
        F: Fn(String) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Option<f64>> + Send,
    {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(WALLET_POLL_SECS));
            loop {
                tick.tick().await;
                if let Some(balance) = fetch(inner.address.clone()).await {
                    *inner.wallet.write() = Some(balance);
                }
            }
        });
    }
}
