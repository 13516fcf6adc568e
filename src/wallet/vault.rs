//! Key vault
//!
//! Owns at most one active identity. Never touches durable storage; see
//! `persistence` for the encrypted snapshot.

use tracing::{info, warn};

use crate::error::Result;

use super::types::Identity;

/// Holder of the single active identity
#[derive(Default)]
pub struct KeyVault {
    active: Option<Identity>,
}

impl KeyVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a new phrase-backed identity and make it active
    pub fn create_identity(&mut self) -> Result<Identity> {
        let identity = Identity::generate()?;
        info!("Created identity {}", identity.address());
        Ok(self.replace(identity))
    }

    /// Import a raw private key
    ///
    /// On malformed input the previous identity stays active.
    pub fn import_from_private_key(&mut self, raw: &str) -> Result<Identity> {
        let identity = Identity::from_private_key(raw).map_err(|e| {
            warn!("Rejected private key import");
            e
        })?;
        info!("Imported identity {} from private key", identity.address());
        Ok(self.replace(identity))
    }

    /// Import a BIP-39 recovery phrase
    ///
    /// On an invalid phrase the previous identity stays active.
    pub fn import_from_recovery_phrase(&mut self, phrase: &str) -> Result<Identity> {
        let identity = Identity::from_recovery_phrase(phrase).map_err(|e| {
            warn!("Rejected recovery phrase import");
            e
        })?;
        info!("Imported identity {} from recovery phrase", identity.address());
        Ok(self.replace(identity))
    }

    pub fn current_identity(&self) -> Option<&Identity> {
        self.active.as_ref()
    }

    /// Drop the active identity; its key material is wiped on drop
    pub fn clear(&mut self) {
        if let Some(identity) = self.active.take() {
            info!("Cleared identity {}", identity.address());
        }
    }

    /// Activate an already-validated identity (restore path)
    pub(crate) fn install(&mut self, identity: Identity) {
        self.replace(identity);
    }

    fn replace(&mut self, identity: Identity) -> Identity {
        self.active = Some(identity.clone());
        identity
    }
}
