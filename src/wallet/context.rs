//! Wallet context - the composition root
//!
//! Owns the single key vault, credential session, chain registry, encrypted
//! persistence and transaction engine of a process, and exposes the user
//! flows built on top of them.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::chain::client::{Connector, JsonRpcConnector};
use crate::chain::registry::ChainRegistry;
use crate::chain::types::{Address, Amount, Chain};
use crate::config::Config;
use crate::error::{Error, Result};

use super::persistence::EncryptedPersistence;
use super::safety::SecretPolicy;
use super::session::CredentialSession;
use super::storage::{FileStorage, StorageSlot};
use super::transfer::{ChainBalance, FeeQuote, FeeSettings, TransactionEngine, TransferReceipt};
use super::types::Identity;
use super::vault::KeyVault;

/// Process-wide wallet state
pub struct WalletContext {
    vault: RwLock<KeyVault>,
    session: CredentialSession,
    registry: Arc<ChainRegistry>,
    persistence: EncryptedPersistence,
    engine: TransactionEngine,
    policy: SecretPolicy,
}

impl WalletContext {
    pub fn new(
        connector: Arc<dyn Connector>,
        slot: Arc<dyn StorageSlot>,
        fees: FeeSettings,
        policy: SecretPolicy,
    ) -> Self {
        let registry = Arc::new(ChainRegistry::new(connector));
        Self {
            vault: RwLock::new(KeyVault::new()),
            session: CredentialSession::new(),
            engine: TransactionEngine::new(registry.clone(), fees),
            registry,
            persistence: EncryptedPersistence::new(slot),
            policy,
        }
    }

    /// Build from configuration: JSON-RPC connections, file storage, overrides
    pub fn from_config(config: &Config) -> Result<Self> {
        let connector = Arc::new(JsonRpcConnector::new(config.rpc_settings())?);
        let slot = Arc::new(FileStorage::in_dir(&config.storage.data_dir));
        let context = Self::new(
            connector,
            slot,
            config.fee_settings()?,
            SecretPolicy::new(config.security.min_secret_len),
        );

        for (chain, url) in config.chains.overrides() {
            context.registry.override_url(chain.id(), url)?;
        }
        Ok(context)
    }

    pub fn session(&self) -> &CredentialSession {
        &self.session
    }

    pub fn registry(&self) -> &Arc<ChainRegistry> {
        &self.registry
    }

    // ---- Identity lifecycle ----

    pub fn check_secret_policy(&self, secret: &str, confirmation: &str) -> Result<()> {
        self.policy.check(secret, confirmation)
    }

    /// Create a new identity, arm the session and optionally snapshot it
    ///
    /// A failed snapshot is returned as an error with the new identity still
    /// active, so the caller can still reveal its phrase.
    pub async fn create_wallet(
        &self,
        secret: &str,
        confirmation: &str,
        remember: bool,
    ) -> Result<Identity> {
        self.policy.check(secret, confirmation)?;

        let mut vault = self.vault.write().await;
        let identity = vault.create_identity()?;
        self.activate(&vault, secret, remember).await?;
        Ok(identity)
    }

    /// Import a raw private key; on failure nothing changes
    pub async fn import_private_key(
        &self,
        raw: &str,
        secret: &str,
        confirmation: &str,
        remember: bool,
    ) -> Result<Identity> {
        self.policy.check(secret, confirmation)?;

        let mut vault = self.vault.write().await;
        let identity = vault.import_from_private_key(raw)?;
        self.activate(&vault, secret, remember).await?;
        Ok(identity)
    }

    /// Import a recovery phrase; on failure nothing changes
    pub async fn import_recovery_phrase(
        &self,
        phrase: &str,
        secret: &str,
        confirmation: &str,
        remember: bool,
    ) -> Result<Identity> {
        self.policy.check(secret, confirmation)?;

        let mut vault = self.vault.write().await;
        let identity = vault.import_from_recovery_phrase(phrase)?;
        self.activate(&vault, secret, remember).await?;
        Ok(identity)
    }

    async fn activate(&self, vault: &KeyVault, secret: &str, remember: bool) -> Result<()> {
        self.session.arm(secret);
        if remember {
            self.persistence.snapshot(vault, &self.session, secret).await?;
        }
        Ok(())
    }

    pub async fn current_identity(&self) -> Option<Identity> {
        self.vault.read().await.current_identity().cloned()
    }

    pub async fn current_address(&self) -> Option<Address> {
        self.vault
            .read()
            .await
            .current_identity()
            .map(|identity| *identity.address())
    }

    pub async fn reveal_private_key(&self, secret: &str) -> Result<Zeroizing<String>> {
        if !self.session.verify(secret) {
            return Err(Error::SessionNotVerified);
        }
        let vault = self.vault.read().await;
        let identity = vault.current_identity().ok_or(Error::NoActiveIdentity)?;
        info!("Private key revealed for {}", identity.address());
        Ok(identity.private_key_hex())
    }

    /// `None` for identities imported from a raw key
    pub async fn reveal_recovery_phrase(&self, secret: &str) -> Result<Option<Zeroizing<String>>> {
        if !self.session.verify(secret) {
            return Err(Error::SessionNotVerified);
        }
        let vault = self.vault.read().await;
        let identity = vault.current_identity().ok_or(Error::NoActiveIdentity)?;
        info!("Recovery phrase revealed for {}", identity.address());
        Ok(identity
            .recovery_phrase()
            .map(|phrase| Zeroizing::new(phrase.to_string())))
    }

    // ---- Persistence ----

    pub async fn has_snapshot(&self) -> Result<bool> {
        self.persistence.has_snapshot().await
    }

    pub async fn restore(&self, secret: &str) -> Result<Identity> {
        let mut vault = self.vault.write().await;
        self.persistence.restore(secret, &mut vault, &self.session).await
    }

    /// Forget the stored snapshot without touching the active identity
    pub async fn decline_restore(&self) -> Result<()> {
        self.persistence.discard().await
    }

    /// Tear down every piece of wallet state
    ///
    /// The timer and any pending snapshot write are cancelled before the
    /// vault is cleared, so a late write cannot bring the identity back.
    pub async fn logout(&self) -> Result<()> {
        self.session.disarm();
        let discarded = self.persistence.discard().await;

        self.vault.write().await.clear();
        self.registry.reset_all();

        if let Err(e) = &discarded {
            warn!("Logout could not remove the stored snapshot: {}", e);
        }
        info!("Logged out");
        discarded
    }

    // ---- Chains and transfers ----

    pub fn override_rpc(&self, chain_id: &str, url: &str) -> Result<()> {
        self.registry.override_url(chain_id, url)
    }

    pub fn rpc_urls(&self) -> Vec<(Chain, String)> {
        self.registry.rpc_urls()
    }

    pub async fn balance(&self, chain_id: &str) -> Result<Amount> {
        let chain: Chain = chain_id.parse()?;
        let vault = self.vault.read().await;
        self.engine.get_balance(&vault, chain).await
    }

    pub async fn balances(&self) -> Result<Vec<ChainBalance>> {
        let vault = self.vault.read().await;
        self.engine.balances(&vault).await
    }

    pub async fn estimate_fee(&self, chain_id: &str) -> Result<Amount> {
        self.engine.estimate_fee(chain_id.parse()?).await
    }

    pub async fn quote_fee(&self, chain_id: &str) -> Result<FeeQuote> {
        self.engine.quote_fee(chain_id.parse()?).await
    }

    pub async fn send(
        &self,
        chain_id: &str,
        to: &str,
        amount: Amount,
        secret: &str,
    ) -> Result<TransferReceipt> {
        let chain: Chain = chain_id.parse()?;
        let vault = self.vault.read().await;
        self.engine
            .submit_transfer(&vault, &self.session, chain, to, amount, secret)
            .await
    }
}
