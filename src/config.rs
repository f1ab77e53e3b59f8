use config::{Config, Environment, File};
use dotenv::dotenv;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Loads configuration from a given config file or environment variables.
pub fn load_config(config_file_path: Option<&Path>) -> anyhow::Result<AppConfig> {
    // Load .env file if it exists, ignore if not present
    dotenv().ok();

    let mut settings = Config::builder();

    if let Some(path) = config_file_path {
        settings = settings.add_source(File::from(path).required(true));
    }

    // Environment variables with prefix WITHDRAWAL, e.g. WITHDRAWAL__LOCK__TIMEOUT_SECS
    settings = settings.add_source(
        Environment::with_prefix("WITHDRAWAL")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let app_config = settings.build()?.try_deserialize::<AppConfig>()?;
    app_config.lock.validate()?;

    Ok(app_config)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub processor: ProcessorConfig,
    pub exchange: ExchangeConfig,
    pub wallet: WalletConfig,
    pub telegram: TelegramConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn get_db_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| panic!("DATABASE_URL is not set in environment or .env file"))
    }
}

/// Timing knobs of the advisory withdrawal locks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    /// Age after which a lock is considered abandoned.
    pub timeout_secs: u64,
    /// Window in which a repeated acquire by the holder is treated as a double submit.
    pub duplicate_window_secs: u64,
    pub cleanup_interval_secs: u64,
    pub cleanup_first_delay_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 900,
            duplicate_window_secs: 5,
            cleanup_interval_secs: 300,
            cleanup_first_delay_secs: 10,
        }
    }
}

impl LockConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn duplicate_window(&self) -> Duration {
        Duration::from_secs(self.duplicate_window_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn cleanup_first_delay(&self) -> Duration {
        Duration::from_secs(self.cleanup_first_delay_secs)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timeout_secs == 0 {
            anyhow::bail!("lock.timeout_secs must be greater than zero");
        }
        if self.duplicate_window_secs >= self.timeout_secs {
            anyhow::bail!(
                "lock.duplicate_window_secs ({}) must be shorter than lock.timeout_secs ({})",
                self.duplicate_window_secs,
                self.timeout_secs
            );
        }
        if self.cleanup_interval_secs == 0 {
            anyhow::bail!("lock.cleanup_interval_secs must be greater than zero");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Payout attempts made while holding one lock before giving up.
    pub max_attempts: u32,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub base_url: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub recv_window_ms: u64,
    pub confirm_poll_attempts: u32,
    pub confirm_poll_interval_ms: u64,
}

impl ExchangeConfig {
    pub fn get_api_key(&self) -> String {
        std::env::var("EXCHANGE_API_KEY")
            .unwrap_or_else(|_| panic!("EXCHANGE_API_KEY is not set in environment or .env file"))
    }

    pub fn get_api_secret(&self) -> String {
        std::env::var("EXCHANGE_API_SECRET").unwrap_or_else(|_| {
            panic!("EXCHANGE_API_SECRET is not set in environment or .env file")
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfig {
    pub chain_id: u64,
    pub token_contract: String,
    /// Account managed by the external signer behind the RPC endpoint.
    pub from_address: String,
    pub token_decimals: u32,
    pub gas_limit: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub receipt_poll_attempts: u32,
    pub receipt_poll_interval_ms: u64,
    /// Network code fragments routed to the wallet instead of the exchange.
    pub bep20_networks: Vec<String>,
}

impl WalletConfig {
    pub fn get_rpc_url(&self) -> String {
        std::env::var("BSC_RPC_URL")
            .unwrap_or_else(|_| panic!("BSC_RPC_URL is not set in environment or .env file"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub api_base: String,
    pub admin_chat_ids: Vec<i64>,
}

impl TelegramConfig {
    pub fn get_bot_token(&self) -> String {
        std::env::var("TELEGRAM_BOT_TOKEN")
            .unwrap_or_else(|_| panic!("TELEGRAM_BOT_TOKEN is not set in environment or .env file"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String, // "debug" | "info" | "warn" | "error"
}
