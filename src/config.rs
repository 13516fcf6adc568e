//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chain::client::RpcSettings;
use crate::chain::registry::validate_rpc_url;
use crate::chain::transaction::TRANSFER_GAS_LIMIT;
use crate::chain::types::{Amount, Chain};
use crate::error::Error;
use crate::wallet::safety::DEFAULT_MIN_SECRET_LEN;
use crate::wallet::transfer::FeeSettings;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub chains: ChainsConfig,
    #[serde(default)]
    pub fees: FeesConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries for read-only calls; broadcasts are never retried
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

/// Per-chain RPC URL overrides
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainsConfig {
    #[serde(default)]
    pub eth: Option<String>,
    #[serde(default)]
    pub bnb: Option<String>,
    #[serde(default)]
    pub matic: Option<String>,
    #[serde(default)]
    pub avax: Option<String>,
}

impl ChainsConfig {
    /// Configured overrides, in chain order
    pub fn overrides(&self) -> Vec<(Chain, &str)> {
        [
            (Chain::Eth, &self.eth),
            (Chain::Bnb, &self.bnb),
            (Chain::Matic, &self.matic),
            (Chain::Avax, &self.avax),
        ]
        .into_iter()
        .filter_map(|(chain, url)| url.as_deref().map(|url| (chain, url)))
        .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeesConfig {
    /// Decimal native-coin amount used when the node gas price is unavailable
    #[serde(default = "default_static_fee")]
    pub static_fee: String,
    #[serde(default = "default_true")]
    pub use_node_gas_price: bool,
}

impl Default for FeesConfig {
    fn default() -> Self {
        Self {
            static_fee: default_static_fee(),
            use_node_gas_price: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `storage.json`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_min_secret_len")]
    pub min_secret_len: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            min_secret_len: default_min_secret_len(),
        }
    }
}

// Default value functions
fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_static_fee() -> String {
    "0.001".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".custody")
}

fn default_min_secret_len() -> usize {
    DEFAULT_MIN_SECRET_LEN
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (CUSTODY__FEES__STATIC_FEE etc.)
            .add_source(config::Environment::with_prefix("CUSTODY").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.rpc.timeout_ms == 0 {
            anyhow::bail!("rpc.timeout_ms must be positive");
        }

        for (chain, url) in self.chains.overrides() {
            validate_rpc_url(url)
                .with_context(|| format!("Invalid RPC override for {}", chain))?;
        }

        let static_fee = self
            .static_fee()
            .with_context(|| format!("Invalid fees.static_fee: {}", self.fees.static_fee))?;
        // Signed gas price is static_fee / gas limit and must not round to zero
        if static_fee.wei() < TRANSFER_GAS_LIMIT as u128 {
            anyhow::bail!(
                "fees.static_fee must be at least {} wei, got {}",
                TRANSFER_GAS_LIMIT,
                static_fee.wei()
            );
        }

        if self.security.min_secret_len == 0 {
            anyhow::bail!("security.min_secret_len must be at least 1");
        }

        if self.storage.data_dir.as_os_str().is_empty() {
            anyhow::bail!("storage.data_dir must not be empty");
        }

        Ok(())
    }

    pub fn static_fee(&self) -> crate::error::Result<Amount> {
        self.fees
            .static_fee
            .parse()
            .map_err(|e: Error| Error::Config(format!("fees.static_fee: {}", e)))
    }

    pub fn fee_settings(&self) -> crate::error::Result<FeeSettings> {
        Ok(FeeSettings {
            static_fee: self.static_fee()?,
            use_node_gas_price: self.fees.use_node_gas_price,
        })
    }

    pub fn rpc_settings(&self) -> RpcSettings {
        RpcSettings {
            timeout: Duration::from_millis(self.rpc.timeout_ms),
            max_retries: self.rpc.max_retries,
            ..RpcSettings::default()
        }
    }

    /// Get masked configuration for display (hide URL credentials)
    pub fn masked_display(&self) -> String {
        let overrides = self.chains.overrides();
        let chains = if overrides.is_empty() {
            "    (defaults)\n".to_string()
        } else {
            overrides
                .iter()
                .map(|(chain, url)| format!("    {}: {}\n", chain, mask_url(url)))
                .collect()
        };

        format!(
            r#"Configuration:
  RPC:
    timeout: {}ms
    max_retries: {}
  Chains:
{}  Fees:
    static_fee: {}
    use_node_gas_price: {}
  Storage:
    data_dir: {}
  Security:
    min_secret_len: {}
"#,
            self.rpc.timeout_ms,
            self.rpc.max_retries,
            chains,
            self.fees.static_fee,
            self.fees.use_node_gas_price,
            self.storage.data_dir.display(),
            self.security.min_secret_len,
        )
    }
}

/// Mask URL for display (hide API keys in query params)
pub fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}
