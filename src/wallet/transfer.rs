//! Transaction engine
//!
//! Reads balances and submits native transfers against the chain registry
//! using the identity held by the key vault.
//!
//! `submit_transfer` runs its checks in a fixed order: session, identity,
//! inputs, then a fresh balance read immediately before signing. A broadcast
//! is attempted at most once per call and never retried.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::chain::registry::ChainRegistry;
use crate::chain::transaction::{TransferRequest, TRANSFER_GAS_LIMIT};
use crate::chain::types::{Address, Amount, Chain};
use crate::error::{Error, Result};

use super::safety::PendingTransfer;
use super::session::CredentialSession;
use super::vault::KeyVault;

/// Default static fee when the node gas price is unavailable
pub const DEFAULT_STATIC_FEE: Amount = Amount::from_wei(1_000_000_000_000_000);

/// Fee estimation settings
#[derive(Debug, Clone)]
pub struct FeeSettings {
    /// Fee used when the node price is disabled or unavailable
    pub static_fee: Amount,

    /// Ask the node for `eth_gasPrice`
    pub use_node_gas_price: bool,
}

impl Default for FeeSettings {
    fn default() -> Self {
        Self {
            static_fee: DEFAULT_STATIC_FEE,
            use_node_gas_price: true,
        }
    }
}

/// Gas price and the resulting fee for a plain transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
    pub gas_price: u128,
    pub fee: Amount,
}

impl FeeQuote {
    fn from_gas_price(gas_price: u128) -> Option<Self> {
        gas_price
            .checked_mul(TRANSFER_GAS_LIMIT as u128)
            .map(|fee| Self {
                gas_price,
                fee: Amount::from_wei(fee),
            })
    }

    /// Signed gas price is `fee / gas_limit`, so the paid fee never exceeds `fee`
    fn from_fee(fee: Amount) -> Self {
        Self {
            gas_price: fee.wei() / TRANSFER_GAS_LIMIT as u128,
            fee,
        }
    }
}

/// Result of a successful broadcast
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub chain: Chain,
    pub hash: String,
    pub from: Address,
    pub to: Address,
    pub amount: Amount,
    pub fee: Amount,
}

/// Balance of the active identity on one chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainBalance {
    pub chain: Chain,
    pub balance: Amount,
}

/// Balance reads and fee-aware transfers across all chains
pub struct TransactionEngine {
    registry: Arc<ChainRegistry>,
    fees: FeeSettings,

    /// Chains with a transfer between balance check and broadcast
    in_flight: DashMap<Chain, ()>,
}

impl TransactionEngine {
    pub fn new(registry: Arc<ChainRegistry>, fees: FeeSettings) -> Self {
        Self {
            registry,
            fees,
            in_flight: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ChainRegistry> {
        &self.registry
    }

    /// Best-effort balance for display
    ///
    /// Transport failures yield zero. Fails only without an active identity.
    pub async fn get_balance(&self, vault: &KeyVault, chain: Chain) -> Result<Amount> {
        let address = *vault
            .current_identity()
            .ok_or(Error::NoActiveIdentity)?
            .address();
        Ok(self.balance_or_zero(chain, &address).await)
    }

    /// Balances on every supported chain, fetched concurrently
    pub async fn balances(&self, vault: &KeyVault) -> Result<Vec<ChainBalance>> {
        let address = *vault
            .current_identity()
            .ok_or(Error::NoActiveIdentity)?
            .address();

        let futures = self.registry.supported().iter().map(|&chain| async move {
            ChainBalance {
                chain,
                balance: self.balance_or_zero(chain, &address).await,
            }
        });
        Ok(join_all(futures).await)
    }

    async fn balance_or_zero(&self, chain: Chain, address: &Address) -> Amount {
        let endpoint = match self.registry.endpoint(chain) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!("No {} endpoint, showing zero balance: {}", chain, e);
                return Amount::ZERO;
            }
        };

        match endpoint.connection.get_balance(address).await {
            Ok(balance) => {
                debug!("{} balance of {}: {}", chain, address, balance);
                balance
            }
            Err(e) => {
                warn!("{} balance query failed, showing zero: {}", chain, e);
                Amount::ZERO
            }
        }
    }

    /// Fee for a plain transfer on `chain`; an estimate, not exact
    pub async fn estimate_fee(&self, chain: Chain) -> Result<Amount> {
        Ok(self.quote_fee(chain).await?.fee)
    }

    /// Gas price and fee, from the node when enabled, else the static fee
    pub async fn quote_fee(&self, chain: Chain) -> Result<FeeQuote> {
        if !self.fees.use_node_gas_price {
            return Ok(FeeQuote::from_fee(self.fees.static_fee));
        }

        let endpoint = self.registry.endpoint(chain)?;
        match endpoint.connection.gas_price().await {
            Ok(gas_price) if gas_price > 0 => {
                if let Some(quote) = FeeQuote::from_gas_price(gas_price) {
                    return Ok(quote);
                }
                warn!("{} gas price {} overflows, using static fee", chain, gas_price);
            }
            Ok(_) => warn!("{} reported zero gas price, using static fee", chain),
            Err(e) => warn!("{} gas price unavailable, using static fee: {}", chain, e),
        }
        Ok(FeeQuote::from_fee(self.fees.static_fee))
    }

    /// Sign and broadcast a native transfer
    ///
    /// # Errors
    /// * `SessionNotVerified` if `secret` does not verify
    /// * `NoActiveIdentity` if the vault is empty
    /// * `InvalidFormat` / `InvalidAmount` for a bad recipient or amount
    /// * `TransferInFlight` if another transfer on `chain` has not finished
    /// * `Rpc` if the fresh balance or the nonce cannot be read (nothing is broadcast)
    /// * `InsufficientFunds` if `amount + fee` exceeds the balance
    /// * `BroadcastFailed` on any error after signing began
    pub async fn submit_transfer(
        &self,
        vault: &KeyVault,
        session: &CredentialSession,
        chain: Chain,
        to: &str,
        amount: Amount,
        secret: &str,
    ) -> Result<TransferReceipt> {
        if !session.verify(secret) {
            return Err(Error::SessionNotVerified);
        }
        let identity = vault
            .current_identity()
            .ok_or(Error::NoActiveIdentity)?
            .clone();

        let to: Address = to.parse()?;
        if amount.is_zero() {
            return Err(Error::InvalidAmount(
                "amount must be greater than zero".to_string(),
            ));
        }

        let _guard = InFlightGuard::acquire(&self.in_flight, chain)?;
        let endpoint = self.registry.endpoint(chain)?;
        let from = *identity.address();

        let quote = self.quote_fee(chain).await?;

        // Fresh balance, read after the fee quote and right before signing
        let balance = endpoint.connection.get_balance(&from).await.map_err(|e| {
            warn!("{} balance re-check failed, transfer aborted: {}", chain, e);
            e
        })?;
        let pending = PendingTransfer::new(chain, to, amount, quote.fee)?;
        pending.validate_against(balance)?;

        let nonce = endpoint.connection.transaction_count(&from).await.map_err(|e| {
            warn!("{} nonce read failed, transfer aborted: {}", chain, e);
            e
        })?;

        let request = TransferRequest {
            nonce,
            gas_price: quote.gas_price,
            gas_limit: TRANSFER_GAS_LIMIT,
            to: pending.to,
            value: pending.amount,
            chain_id: chain.eip155_id(),
        };
        let signed = request
            .sign(identity.signing_key())
            .map_err(|e| Error::BroadcastFailed(e.to_string()))?;

        info!(
            "Broadcasting {} {} from {} to {} (nonce {})",
            pending.amount, chain, from, pending.to, nonce
        );
        let hash = match endpoint.connection.broadcast(&signed.raw_hex()).await {
            Ok(hash) => hash,
            Err(Error::BroadcastFailed(message)) => {
                warn!("{} broadcast failed: {}", chain, message);
                return Err(Error::BroadcastFailed(message));
            }
            Err(e) => {
                warn!("{} broadcast failed: {}", chain, e);
                return Err(Error::BroadcastFailed(e.to_string()));
            }
        };

        info!("{} transfer submitted: {}", chain, hash);
        Ok(TransferReceipt {
            chain,
            hash,
            from,
            to: pending.to,
            amount: pending.amount,
            fee: pending.fee_estimate,
        })
    }
}

/// Marks one chain as having a transfer in flight until dropped
struct InFlightGuard<'a> {
    in_flight: &'a DashMap<Chain, ()>,
    chain: Chain,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(in_flight: &'a DashMap<Chain, ()>, chain: Chain) -> Result<Self> {
        match in_flight.entry(chain) {
            Entry::Occupied(_) => {
                warn!("Rejected concurrent {} transfer", chain);
                Err(Error::TransferInFlight(chain.to_string()))
            }
            Entry::Vacant(entry) => {
                entry.insert(());
                Ok(Self { in_flight, chain })
            }
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.chain);
    }
}
