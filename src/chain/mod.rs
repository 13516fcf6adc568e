//! Multi-chain plumbing
//!
//! Provides:
//! - Supported chain set, fixed-point amounts and addresses
//! - Chain registry (default + overridden RPC endpoints, lazy connections)
//! - JSON-RPC connection handles
//! - Legacy EIP-155 transfer signing
//!
//! # Architecture
//!
//! ```text
//! ChainRegistry → Connector → ChainClient (eth_getBalance / eth_sendRawTransaction)
//!                                  ↑
//!                        TransferRequest::sign
//! ```

pub mod client;
pub mod registry;
pub mod transaction;
pub mod types;

pub use client::{ChainClient, Connector, JsonRpcClient, JsonRpcConnector, RpcSettings};
pub use registry::{ChainEndpoint, ChainRegistry};
pub use transaction::{SignedTransfer, TransferRequest, TRANSFER_GAS_LIMIT};
pub use types::{Address, Amount, Chain};

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory chain connections for unit tests

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::client::{ChainClient, Connector};
    use super::types::{Address, Amount, Chain};
    use crate::error::{Error, Result};

    /// Scripted node behaviour for one chain
    #[derive(Debug, Clone)]
    pub struct MockState {
        /// `None` simulates a transport failure
        pub balance: Option<Amount>,
        pub gas_price: Option<u128>,
        /// `None` simulates a transport failure
        pub nonce: Option<u64>,
        pub broadcast_ok: bool,
        pub latency: Option<Duration>,
    }

    impl Default for MockState {
        fn default() -> Self {
            Self {
                balance: Some(Amount::ZERO),
                gas_price: Some(1_000_000_000),
                nonce: Some(0),
                broadcast_ok: true,
                latency: None,
            }
        }
    }

    #[derive(Default)]
    struct Shared {
        states: Mutex<HashMap<Chain, MockState>>,
        broadcasts: Mutex<Vec<(Chain, String)>>,
        balance_calls: AtomicUsize,
        connects: AtomicUsize,
    }

    #[derive(Default)]
    pub struct MockConnector {
        shared: Arc<Shared>,
    }

    impl MockConnector {
        pub fn update(&self, chain: Chain, f: impl FnOnce(&mut MockState)) {
            let mut states = self.shared.states.lock().unwrap();
            f(states.entry(chain).or_default());
        }

        pub fn set_balance(&self, chain: Chain, balance: Option<Amount>) {
            self.update(chain, |s| s.balance = balance);
        }

        pub fn connect_count(&self) -> usize {
            self.shared.connects.load(Ordering::SeqCst)
        }

        pub fn balance_calls(&self) -> usize {
            self.shared.balance_calls.load(Ordering::SeqCst)
        }

        pub fn broadcasts(&self) -> Vec<(Chain, String)> {
            self.shared.broadcasts.lock().unwrap().clone()
        }
    }

    impl Connector for MockConnector {
        fn connect(&self, chain: Chain, url: &str) -> Result<Arc<dyn ChainClient>> {
            self.shared.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MockClient {
                chain,
                url: url.to_string(),
                shared: self.shared.clone(),
            }))
        }
    }

    pub struct MockClient {
        chain: Chain,
        url: String,
        shared: Arc<Shared>,
    }

    impl MockClient {
        fn state(&self) -> MockState {
            self.shared
                .states
                .lock()
                .unwrap()
                .get(&self.chain)
                .cloned()
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl ChainClient for MockClient {
        fn url(&self) -> &str {
            &self.url
        }

        async fn get_balance(&self, _address: &Address) -> Result<Amount> {
            self.shared.balance_calls.fetch_add(1, Ordering::SeqCst);
            let state = self.state();
            if let Some(latency) = state.latency {
                tokio::time::sleep(latency).await;
            }
            state
                .balance
                .ok_or_else(|| Error::Rpc("connection refused".to_string()))
        }

        async fn transaction_count(&self, _address: &Address) -> Result<u64> {
            self.state()
                .nonce
                .ok_or_else(|| Error::Rpc("connection refused".to_string()))
        }

        async fn gas_price(&self) -> Result<u128> {
            self.state()
                .gas_price
                .ok_or_else(|| Error::Rpc("connection refused".to_string()))
        }

        async fn broadcast(&self, raw_tx: &str) -> Result<String> {
            if !self.state().broadcast_ok {
                return Err(Error::BroadcastFailed("nonce too low".to_string()));
            }
            let mut broadcasts = self.shared.broadcasts.lock().unwrap();
            broadcasts.push((self.chain, raw_tx.to_string()));
            Ok(format!("0x{:064x}", broadcasts.len()))
        }
    }
}
