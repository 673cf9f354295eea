// ============================================================================
// CONFIGURATION — Tempo network, treasury, and service settings
// ============================================================================
//
// Environment variables (loaded via dotenv in main):
//
//   HOUSE_PORT                  HTTP listen port          (default 8080)
//   HOUSE_DATA_PATH             ReDB data directory       (default ./house_data)
//   TEMPO_RPC_URL               Chain RPC endpoint        (default Moderato testnet)
//   TEMPO_CHAIN_ID              EVM chain id              (default 42431)
//   TEMPO_TREASURY_SECRET_KEY   Treasury signing key      (required)
//   HOUSE_TRANSFER_TIMEOUT_SECS On-chain call bound       (default 30)
//
// ============================================================================

use std::env;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NETWORK: &str = "TEMPO";

/// Delay before the client re-fetches the authoritative balance after an
/// optimistic update (absorbs eventual consistency in the store).
pub const BALANCE_REFRESH_DELAY_MS: u64 = 1_500;

/// Interval for polling the on-chain wallet balance while connected.
pub const WALLET_POLL_SECS: u64 = 10;

/// Static description of a TIP-20 token the house accepts.
#[derive(Debug, Clone, Copy)]
pub struct TokenDescriptor {
    pub address: &'static str,
    pub symbol: &'static str,
    pub name: &'static str,
    pub decimals: u8,
}

/// Tempo testnet (Moderato) token table. Decimal precision here is
/// authoritative: tokens in this table never need an on-chain decimals()
/// round trip.
pub const TEMPO_TOKENS: &[TokenDescriptor] = &[
    TokenDescriptor {
        address: "0x20c0000000000000000000000000000000000001",
        symbol: "αUSD",
        name: "AlphaUSD",
        decimals: 6,
    },
    TokenDescriptor {
        address: "0x20c0000000000000000000000000000000000002",
        symbol: "βUSD",
        name: "BetaUSD",
        decimals: 6,
    },
    TokenDescriptor {
        address: "0x20c0000000000000000000000000000000000003",
        symbol: "θUSD",
        name: "ThetaUSD",
        decimals: 6,
    },
    TokenDescriptor {
        address: "0x20c0000000000000000000000000000000000000",
        symbol: "pUSD",
        name: "PathUSD",
        decimals: 6,
    },
];

/// Default token for gameplay (AlphaUSD).
pub const DEFAULT_TOKEN: &str = "0x20c0000000000000000000000000000000000001";

/// Look up a token descriptor by contract address (case-insensitive).
pub fn token_descriptor(address: &str) -> Option<&'static TokenDescriptor> {
    TEMPO_TOKENS
        .iter()
        .find(|t| t.address.eq_ignore_ascii_case(address))
}

/// Runtime configuration for the server binary.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_path: String,
    pub rpc_url: String,
    pub chain_id: u64,
    pub treasury_key: String,
    pub transfer_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let port = env::var("HOUSE_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);
        let data_path =
            env::var("HOUSE_DATA_PATH").unwrap_or_else(|_| "./house_data".to_string());
        let rpc_url = env::var("TEMPO_RPC_URL")
            .unwrap_or_else(|_| "https://rpc.moderato.tempo.xyz".to_string());
        let chain_id = env::var("TEMPO_CHAIN_ID")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(42431);
        let treasury_key = env::var("TEMPO_TREASURY_SECRET_KEY")
            .map_err(|_| "Missing TEMPO_TREASURY_SECRET_KEY".to_string())?;
        let transfer_timeout_secs = env::var("HOUSE_TRANSFER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Ok(Self {
            port,
            data_path,
            rpc_url,
            chain_id,
            treasury_key,
            transfer_timeout_secs,
        })
    }
}
