//! Environment-driven configuration structures shared by all binaries.

use std::{env, fmt, str::FromStr, sync::Arc, time::Duration};

use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use thiserror::Error;

use crate::endpoint::{EndpointError, EndpointUrl};

/// Destination used when `TARGET_ADDRESS` is not set.
pub const DEFAULT_TARGET_ADDRESS: &str = "XX4k8NidriAUsGKTjAvYHonxcKJj99R859vMAAGSLQ9";
/// Lamports withheld from every sweep to pay the network fee.
pub const DEFAULT_FEE_RESERVE_LAMPORTS: u64 = 5_000;
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_API_PORT: u16 = 5000;

/// Dashboard configuration so the HTTP surface does not depend on
/// monitor-only environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    api_bind_address: String,
}

impl ApiConfig {
    /// Loads only the environment variables required by the dashboard.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let api_bind_address = match get_optional_var("API_BIND_ADDRESS") {
            Some(address) => address,
            None => {
                let port = parse_optional("PORT", DEFAULT_API_PORT)?;
                format!("0.0.0.0:{port}")
            }
        };

        Ok(Self { api_bind_address })
    }

    pub fn api_bind_address(&self) -> &str {
        &self.api_bind_address
    }
}

/// The account being watched and swept, plus its signing keypair.
#[derive(Clone)]
pub struct WatchedAccount {
    keypair: Arc<Keypair>,
}

impl WatchedAccount {
    /// Decodes a base58-encoded 64-byte secret key.
    pub fn from_base58(secret: &str) -> Result<Self, ConfigError> {
        let bytes = bs58::decode(secret.trim())
            .into_vec()
            .map_err(|err| ConfigError::InvalidPrivateKey(err.to_string()))?;
        let keypair = Keypair::from_bytes(&bytes)
            .map_err(|err| ConfigError::InvalidPrivateKey(err.to_string()))?;
        Ok(Self::from_keypair(keypair))
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

impl fmt::Debug for WatchedAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchedAccount")
            .field("pubkey", &self.pubkey())
            .finish_non_exhaustive()
    }
}

/// Everything the sweep pipeline needs: credential, destination and the
/// ordered endpoint list (the first entry is the primary).
#[derive(Debug, Clone)]
pub struct RelayConfig {
    account: WatchedAccount,
    target: Pubkey,
    endpoints: Vec<EndpointUrl>,
    fee_reserve_lamports: u64,
    submit_timeout: Duration,
}

impl RelayConfig {
    /// Loads configuration by hydrating `.env` (if present) and reading the
    /// process variables. Malformed keys, addresses and endpoint schemes are
    /// fatal here so nothing downstream has to revalidate them.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let account = WatchedAccount::from_base58(&get_required_var("PRIVATE_KEY")?)?;

        let target_raw =
            get_optional_var("TARGET_ADDRESS").unwrap_or_else(|| DEFAULT_TARGET_ADDRESS.into());
        let target = Pubkey::from_str(&target_raw).map_err(|err| ConfigError::InvalidAddress {
            key: "TARGET_ADDRESS",
            reason: err.to_string(),
        })?;

        let mut raw_urls = vec![get_required_var("RPC_URL")?];
        for key in ["RPC_URL2", "RPC_URL3"] {
            if let Some(url) = get_optional_var(key) {
                tracing::info!(key, "additional rpc endpoint configured");
                raw_urls.push(url);
            }
        }
        let endpoints = raw_urls
            .iter()
            .map(|raw| EndpointUrl::normalize(raw))
            .collect::<Result<Vec<_>, _>>()?;

        let fee_reserve_lamports =
            parse_optional("FEE_RESERVE_LAMPORTS", DEFAULT_FEE_RESERVE_LAMPORTS)?;
        let submit_timeout = Duration::from_millis(parse_optional(
            "RPC_SUBMIT_TIMEOUT_MS",
            DEFAULT_SUBMIT_TIMEOUT.as_millis() as u64,
        )?);

        Ok(Self {
            account,
            target,
            endpoints,
            fee_reserve_lamports,
            submit_timeout,
        })
    }

    pub fn account(&self) -> &WatchedAccount {
        &self.account
    }

    pub fn target(&self) -> Pubkey {
        self.target
    }

    pub fn endpoints(&self) -> &[EndpointUrl] {
        &self.endpoints
    }

    pub fn fee_reserve_lamports(&self) -> u64 {
        self.fee_reserve_lamports
    }

    pub fn submit_timeout(&self) -> Duration {
        self.submit_timeout
    }
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    get_optional_var(key).ok_or(ConfigError::MissingVar { key })
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn parse_optional<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr<Err = std::num::ParseIntError>,
{
    match get_optional_var(key) {
        Some(value) => value
            .parse()
            .map_err(|source| ConfigError::InvalidNumber { key, source }),
        None => Ok(default),
    }
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("SWEEP_RELAY_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),
    #[error("invalid address in `{key}`: {reason}")]
    InvalidAddress { key: &'static str, reason: String },
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_GUARD: Mutex<()> = Mutex::new(());

    fn encoded_keypair() -> (Keypair, String) {
        let keypair = Keypair::new();
        let encoded = bs58::encode(keypair.to_bytes()).into_string();
        (keypair, encoded)
    }

    fn set_env(secret: &str) {
        env::set_var("SWEEP_RELAY_SKIP_DOTENV", "1");
        env::set_var("PRIVATE_KEY", secret);
        env::set_var("RPC_URL", "https://api.mainnet-beta.solana.com");
        env::remove_var("RPC_URL2");
        env::remove_var("RPC_URL3");
        env::remove_var("TARGET_ADDRESS");
        env::remove_var("FEE_RESERVE_LAMPORTS");
        env::remove_var("RPC_SUBMIT_TIMEOUT_MS");
        env::remove_var("API_BIND_ADDRESS");
        env::remove_var("PORT");
    }

    #[test]
    fn relay_config_reads_env_with_defaults() {
        let _guard = ENV_GUARD.lock().unwrap();
        let (keypair, secret) = encoded_keypair();
        set_env(&secret);

        let config = RelayConfig::load_from_env().expect("config loads");
        assert_eq!(config.account().pubkey(), keypair.pubkey());
        assert_eq!(config.target().to_string(), DEFAULT_TARGET_ADDRESS);
        assert_eq!(config.endpoints().len(), 1);
        assert_eq!(config.fee_reserve_lamports(), 5_000);
        assert_eq!(config.submit_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn extra_endpoints_are_normalized_in_order() {
        let _guard = ENV_GUARD.lock().unwrap();
        let (_, secret) = encoded_keypair();
        set_env(&secret);
        env::set_var("RPC_URL2", " wss://mainnet.helius-rpc.com ");
        env::set_var("RPC_URL3", "ws://127.0.0.1:8900");

        let config = RelayConfig::load_from_env().expect("config loads");
        let urls: Vec<_> = config.endpoints().iter().map(|u| u.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://api.mainnet-beta.solana.com",
                "https://mainnet.helius-rpc.com",
                "http://127.0.0.1:8900",
            ]
        );

        set_env(&secret);
    }

    #[test]
    fn malformed_endpoint_scheme_is_fatal() {
        let _guard = ENV_GUARD.lock().unwrap();
        let (_, secret) = encoded_keypair();
        set_env(&secret);
        env::set_var("RPC_URL2", "tcp://10.0.0.1:8899");

        let err = RelayConfig::load_from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Endpoint(_)));

        set_env(&secret);
    }

    #[test]
    fn bad_private_key_is_rejected() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env("not-base58-0OIl");

        let err = RelayConfig::load_from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPrivateKey(_)));
    }

    #[test]
    fn empty_required_env_var_is_treated_as_missing() {
        let _guard = ENV_GUARD.lock().unwrap();
        let (_, secret) = encoded_keypair();
        set_env(&secret);
        env::set_var("RPC_URL", "   ");

        let err = RelayConfig::load_from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar { key: "RPC_URL" }));

        set_env(&secret);
    }

    #[test]
    fn fee_reserve_and_timeout_overrides() {
        let _guard = ENV_GUARD.lock().unwrap();
        let (_, secret) = encoded_keypair();
        set_env(&secret);
        env::set_var("FEE_RESERVE_LAMPORTS", "10000");
        env::set_var("RPC_SUBMIT_TIMEOUT_MS", "2500");

        let config = RelayConfig::load_from_env().expect("config loads");
        assert_eq!(config.fee_reserve_lamports(), 10_000);
        assert_eq!(config.submit_timeout(), Duration::from_millis(2500));

        env::set_var("FEE_RESERVE_LAMPORTS", "lots");
        let err = RelayConfig::load_from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidNumber {
                key: "FEE_RESERVE_LAMPORTS",
                ..
            }
        ));

        set_env(&secret);
    }

    #[test]
    fn api_config_defaults_to_port_5000() {
        let _guard = ENV_GUARD.lock().unwrap();
        let (_, secret) = encoded_keypair();
        set_env(&secret);

        let config = ApiConfig::load_from_env().expect("api config loads");
        assert_eq!(config.api_bind_address(), "0.0.0.0:5000");

        env::set_var("PORT", "8081");
        let config = ApiConfig::load_from_env().expect("api config loads");
        assert_eq!(config.api_bind_address(), "0.0.0.0:8081");

        env::set_var("API_BIND_ADDRESS", " 127.0.0.1:9999 ");
        let config = ApiConfig::load_from_env().expect("api config loads");
        assert_eq!(config.api_bind_address(), "127.0.0.1:9999");

        set_env(&secret);
    }
}
