// ============================================================================
// TREASURY TRANSFER GATEWAY — On-chain leg of withdrawals
// ============================================================================
//
// Moves TIP-20 tokens from the treasury account to a user wallet. TIP-20
// follows the ERC-20 ABI, so the gateway is an ethers SignerMiddleware over
// the Tempo RPC endpoint with the treasury's key.
//
// The gateway only SUBMITS: confirmation tracking is out of scope. Every
// failure mode (bad recipient, decimals resolution, RPC down, revert,
// timeout) classifies as a TransferError so the engine can abort the
// withdrawal before any ledger mutation.
//
// ============================================================================

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use ethers::abi::Address;
use ethers::middleware::SignerMiddleware;
use ethers::prelude::abigen;
use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::U256;
use ethers::utils::parse_units;
use tracing::{info, warn};

use crate::config::{token_descriptor, Config};
use crate::error::TransferError;

abigen!(
    Tip20Token,
    r#"[
        function transfer(address to, uint256 amount) external returns (bool)
        function decimals() external view returns (uint8)
        function balanceOf(address account) external view returns (uint256)
    ]"#
);

/// The engine's view of the on-chain client: submit a transfer, get back a
/// transaction hash or a classified failure.
pub trait TreasuryGateway: Clone + Send + Sync + 'static {
    fn transfer(
        &self,
        token: &str,
        recipient: &str,
        amount: f64,
    ) -> impl Future<Output = Result<String, TransferError>> + Send;
}

type TreasuryClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Production gateway: treasury-signed TIP-20 transfers on Tempo.
#[derive(Clone)]
pub struct TempoTreasury {
    client: Arc<TreasuryClient>,
    timeout: Duration,
}

impl TempoTreasury {
    pub fn new(config: &Config) -> Result<Self, TransferError> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| TransferError::Config(format!("invalid RPC URL: {}", e)))?;

        let wallet: LocalWallet = config
            .treasury_key
            .trim_start_matches("0x")
            .parse()
            .map_err(|e| TransferError::Config(format!("invalid treasury key: {}", e)))?;
        let wallet = wallet.with_chain_id(config.chain_id);

        info!(treasury = %format!("{:#x}", wallet.address()), chain_id = config.chain_id, "Treasury gateway ready");

        Ok(Self {
            client: Arc::new(SignerMiddleware::new(provider, wallet)),
            timeout: Duration::from_secs(config.transfer_timeout_secs),
        })
    }

    /// Resolve a token's decimal precision: static descriptor table first,
    /// on-chain decimals() only for tokens we don't know. A failed on-chain
    /// resolution is a TransferFailure — never a silent default, since an
    /// amount scaled with the wrong precision corrupts the withdrawal.
    async fn resolve_decimals(&self, token: Address, token_hex: &str) -> Result<u8, TransferError> {
        if let Some(descriptor) = token_descriptor(token_hex) {
            return Ok(descriptor.decimals);
        }

        let contract = Tip20Token::new(token, self.client.clone());
        contract
            .decimals()
            .call()
            .await
            .map_err(|e| TransferError::Decimals(e.to_string()))
    }

    async fn submit(
        &self,
        token: Address,
        recipient: Address,
        units: U256,
    ) -> Result<String, TransferError> {
        let contract = Tip20Token::new(token, self.client.clone());
        let call = contract.transfer(recipient, units);
        let pending = call
            .send()
            .await
            .map_err(|e| TransferError::Submission(e.to_string()))?;
        Ok(format!("{:#x}", pending.tx_hash()))
    }
}

impl TreasuryGateway for TempoTreasury {
    async fn transfer(
        &self,
        token: &str,
        recipient: &str,
        amount: f64,
    ) -> Result<String, TransferError> {
        let token_addr = Address::from_str(token)
            .map_err(|_| TransferError::InvalidToken(token.to_string()))?;
        let recipient_addr = Address::from_str(recipient)
            .map_err(|_| TransferError::InvalidRecipient(recipient.to_string()))?;

        let fut = async {
            let decimals = self.resolve_decimals(token_addr, token).await?;

            let units: U256 = parse_units(amount.to_string(), u32::from(decimals))
                .map_err(|e| TransferError::Submission(format!("amount conversion: {}", e)))?
                .into();

            let tx_hash = self.submit(token_addr, recipient_addr, units).await?;
            info!(token = %token, recipient = %recipient, amount, tx_hash = %tx_hash, "Treasury transfer submitted");
            Ok(tx_hash)
        };

        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(token = %token, recipient = %recipient, amount, "Treasury transfer timed out");
                Err(TransferError::Timeout(self.timeout.as_secs()))
            }
        }
    }
}
