//! Chain registry
//!
//! Maps each supported chain to its current RPC endpoint and a lazily built
//! connection handle. The chain set never changes; only URLs do.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};

use super::client::{ChainClient, Connector};
use super::types::Chain;

/// Endpoint entry for one chain
#[derive(Clone)]
pub struct ChainEndpoint {
    pub chain: Chain,
    pub rpc_url: String,
    pub connection: Arc<dyn ChainClient>,
}

impl fmt::Debug for ChainEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainEndpoint")
            .field("chain", &self.chain)
            .field("rpc_url", &self.rpc_url)
            .finish_non_exhaustive()
    }
}

/// Registry of chain endpoints
pub struct ChainRegistry {
    connector: Arc<dyn Connector>,

    /// Constructed endpoints; a missing entry means "default URL, not yet used"
    endpoints: DashMap<Chain, ChainEndpoint>,
}

impl ChainRegistry {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            endpoints: DashMap::new(),
        }
    }

    /// Resolve a chain id such as `"ETH"` to its endpoint
    pub fn resolve(&self, chain_id: &str) -> Result<ChainEndpoint> {
        let chain: Chain = chain_id.parse()?;
        self.endpoint(chain)
    }

    /// Endpoint for a chain, constructing it from the default URL on first use
    pub fn endpoint(&self, chain: Chain) -> Result<ChainEndpoint> {
        if let Some(existing) = self.endpoints.get(&chain) {
            return Ok(existing.clone());
        }

        let url = chain.default_rpc_url();
        let connection = self.connector.connect(chain, url)?;
        let endpoint = self
            .endpoints
            .entry(chain)
            .or_insert_with(|| ChainEndpoint {
                chain,
                rpc_url: url.to_string(),
                connection,
            })
            .clone();

        debug!("Initialised {} endpoint at {}", chain, endpoint.rpc_url);
        Ok(endpoint)
    }

    /// Replace the URL of one chain and rebuild its connection
    pub fn override_url(&self, chain_id: &str, url: &str) -> Result<()> {
        let chain: Chain = chain_id.parse()?;
        let url = validate_rpc_url(url)?;
        let connection = self.connector.connect(chain, &url)?;

        self.endpoints.insert(
            chain,
            ChainEndpoint {
                chain,
                rpc_url: url.clone(),
                connection,
            },
        );

        info!("{} RPC endpoint set to {}", chain, url);
        Ok(())
    }

    /// Restore every chain to its default URL
    pub fn reset_all(&self) {
        self.endpoints.clear();
        info!("All RPC endpoints reset to defaults");
    }

    /// Current URL of every supported chain
    pub fn rpc_urls(&self) -> Vec<(Chain, String)> {
        Chain::ALL
            .iter()
            .map(|chain| {
                let url = self
                    .endpoints
                    .get(chain)
                    .map(|e| e.rpc_url.clone())
                    .unwrap_or_else(|| chain.default_rpc_url().to_string());
                (*chain, url)
            })
            .collect()
    }

    /// Supported chains
    pub fn supported(&self) -> &'static [Chain] {
        &Chain::ALL
    }
}

/// Accept only absolute http(s) URLs with a host
pub fn validate_rpc_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url.trim()).map_err(|e| Error::InvalidRpcUrl(format!("{}: {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(Error::InvalidRpcUrl(url.to_string()));
    }
    Ok(url.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::testing::MockConnector;

    fn registry() -> (ChainRegistry, Arc<MockConnector>) {
        let connector = Arc::new(MockConnector::default());
        (ChainRegistry::new(connector.clone()), connector)
    }

    #[test]
    fn test_resolve_is_lazy_and_cached() {
        let (registry, connector) = registry();
        assert_eq!(connector.connect_count(), 0);

        let first = registry.resolve("ETH").unwrap();
        assert_eq!(first.rpc_url, "https://cloudflare-eth.com");
        assert_eq!(connector.connect_count(), 1);

        let second = registry.resolve("eth").unwrap();
        assert!(Arc::ptr_eq(&first.connection, &second.connection));
        assert_eq!(connector.connect_count(), 1);
    }

    #[test]
    fn test_unknown_chain() {
        let (registry, _) = registry();
        assert!(matches!(registry.resolve("DOGE"), Err(Error::UnknownChain(_))));
        assert!(matches!(
            registry.override_url("DOGE", "https://example.com"),
            Err(Error::UnknownChain(_))
        ));
    }

    #[test]
    fn test_override_rebuilds_only_that_chain() {
        let (registry, _) = registry();
        let eth_before = registry.resolve("ETH").unwrap();
        let bnb_before = registry.resolve("BNB").unwrap();

        registry.override_url("ETH", "https://eth.example.org/rpc").unwrap();

        let eth_after = registry.resolve("ETH").unwrap();
        assert_eq!(eth_after.rpc_url, "https://eth.example.org/rpc");
        assert_eq!(eth_after.connection.url(), "https://eth.example.org/rpc");
        assert!(!Arc::ptr_eq(&eth_before.connection, &eth_after.connection));

        let bnb_after = registry.resolve("BNB").unwrap();
        assert!(Arc::ptr_eq(&bnb_before.connection, &bnb_after.connection));
    }

    #[test]
    fn test_override_rejects_bad_url() {
        let (registry, _) = registry();
        assert!(matches!(
            registry.override_url("ETH", "not a url"),
            Err(Error::InvalidRpcUrl(_))
        ));
        assert!(matches!(
            registry.override_url("ETH", "ftp://example.com"),
            Err(Error::InvalidRpcUrl(_))
        ));
        assert_eq!(registry.resolve("ETH").unwrap().rpc_url, "https://cloudflare-eth.com");
    }

    #[test]
    fn test_reset_all_restores_defaults() {
        let (registry, _) = registry();
        registry.override_url("MATIC", "https://polygon.example.org").unwrap();
        registry.reset_all();

        let urls = registry.rpc_urls();
        assert_eq!(urls.len(), 4);
        for (chain, url) in urls {
            assert_eq!(url, chain.default_rpc_url());
        }
    }
}
