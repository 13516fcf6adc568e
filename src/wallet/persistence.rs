//! Encrypted persistence ("remember me")
//!
//! Serializes the active identity together with the session secret, encrypts
//! it with AES-256-GCM and writes the single storage slot.
//!
//! # Key
//!
//! The AES key is SHA-256 of the session secret itself, so knowing the secret
//! is both proof of ownership and the means of decryption. There is no
//! memory-hard KDF. Swapping one in (for example Argon2id with a stored salt)
//! would strengthen offline resistance without changing this interface.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{Error, Result};

use super::session::CredentialSession;
use super::storage::StorageSlot;
use super::types::{Identity, SerializedIdentity};
use super::vault::KeyVault;

/// Current envelope format version
pub const ENVELOPE_VERSION: u32 = 1;

const NONCE_LEN: usize = 12;

/// Stored blob: JSON envelope around the ciphertext
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    created_at: DateTime<Utc>,
    nonce: String,
    ciphertext: String,
}

/// Plaintext inside the envelope
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct VaultPayload {
    identity: SerializedIdentity,
    secret: String,
}

/// Snapshot writer/reader over one storage slot
pub struct EncryptedPersistence {
    slot: Arc<dyn StorageSlot>,

    /// Serializes writes and removals of the slot
    write_lock: Mutex<()>,

    /// Bumped by `discard`; a snapshot started under an older value is dropped
    generation: AtomicU64,
}

impl EncryptedPersistence {
    pub fn new(slot: Arc<dyn StorageSlot>) -> Self {
        Self {
            slot,
            write_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Encrypt the active identity and secret into the slot, overwriting it
    ///
    /// The secret must verify against the armed session.
    pub async fn snapshot(
        &self,
        vault: &KeyVault,
        session: &CredentialSession,
        secret: &str,
    ) -> Result<()> {
        if !session.verify(secret) {
            return Err(Error::SessionNotVerified);
        }
        let identity = vault.current_identity().ok_or(Error::NoActiveIdentity)?;

        let generation = self.generation.load(Ordering::SeqCst);
        let blob = seal(identity, secret)?;

        let _guard = self.write_lock.lock().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            warn!("Snapshot dropped: vault was discarded while it was being written");
            return Err(Error::SnapshotCancelled);
        }
        self.slot.write(&blob).await?;

        info!("Saved encrypted snapshot of {}", identity.address());
        Ok(())
    }

    /// Decrypt the slot, activate the identity and re-arm the session
    ///
    /// Any failure leaves the vault, the session and the stored blob untouched.
    pub async fn restore(
        &self,
        candidate_secret: &str,
        vault: &mut KeyVault,
        session: &CredentialSession,
    ) -> Result<Identity> {
        let blob = match self.slot.read().await {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                debug!("Restore requested but no snapshot is stored");
                return Err(Error::RestoreFailed);
            }
            Err(e) => {
                warn!("Restore failed reading storage: {}", e);
                return Err(Error::RestoreFailed);
            }
        };

        let payload = open(&blob, candidate_secret).map_err(|_| {
            warn!("Restore failed: incorrect secret or corrupted snapshot");
            Error::RestoreFailed
        })?;

        let identity = Identity::from_serialized(&payload.identity).map_err(|_| {
            warn!("Restore failed: snapshot identity is inconsistent");
            Error::RestoreFailed
        })?;

        vault.install(identity.clone());
        session.arm(&payload.secret);

        info!("Restored identity {} from snapshot", identity.address());
        Ok(identity)
    }

    /// Whether a snapshot is stored
    ///
    /// An unreadable slot is an error, not an absent snapshot.
    pub async fn has_snapshot(&self) -> Result<bool> {
        Ok(self.slot.read().await?.is_some())
    }

    /// Remove the slot and cancel any snapshot still in flight
    pub async fn discard(&self) -> Result<()> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let _guard = self.write_lock.lock().await;
        self.slot.remove().await?;
        info!("Discarded encrypted snapshot");
        Ok(())
    }
}

fn derive_key(secret: &str) -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&Sha256::digest(secret.as_bytes()));
    key
}

fn seal(identity: &Identity, secret: &str) -> Result<String> {
    let payload = VaultPayload {
        identity: identity.to_serialized(),
        secret: secret.to_string(),
    };
    let plaintext = Zeroizing::new(serde_json::to_vec(&payload)?);

    let key = derive_key(secret);
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| Error::Internal(format!("Cipher init failed: {}", e)))?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
        .map_err(|_| Error::Internal("Encryption failed".to_string()))?;

    let envelope = Envelope {
        version: ENVELOPE_VERSION,
        created_at: Utc::now(),
        nonce: BASE64.encode(nonce),
        ciphertext: BASE64.encode(ciphertext),
    };
    Ok(serde_json::to_string(&envelope)?)
}

fn open(blob: &str, secret: &str) -> Result<VaultPayload> {
    let envelope: Envelope = serde_json::from_str(blob)?;
    if envelope.version != ENVELOPE_VERSION {
        return Err(Error::Serialization(format!(
            "Unsupported snapshot version {}",
            envelope.version
        )));
    }

    let nonce = BASE64
        .decode(&envelope.nonce)
        .map_err(|e| Error::Serialization(e.to_string()))?;
    if nonce.len() != NONCE_LEN {
        return Err(Error::Serialization("Invalid nonce length".to_string()));
    }
    let ciphertext = BASE64
        .decode(&envelope.ciphertext)
        .map_err(|e| Error::Serialization(e.to_string()))?;

    let key = derive_key(secret);
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| Error::Internal(format!("Cipher init failed: {}", e)))?;

    let plaintext = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| Error::RestoreFailed)?,
    );

    Ok(serde_json::from_slice(&plaintext)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::storage::{FileStorage, MemoryStorage};

    struct Fixture {
        storage: Arc<MemoryStorage>,
        persistence: EncryptedPersistence,
        vault: KeyVault,
        session: CredentialSession,
    }

    fn fixture() -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        Fixture {
            persistence: EncryptedPersistence::new(storage.clone()),
            storage,
            vault: KeyVault::new(),
            session: CredentialSession::new(),
        }
    }

    #[tokio::test]
    async fn test_snapshot_restore_roundtrip() {
        let mut f = fixture();
        let created = f.vault.create_identity().unwrap();
        f.session.arm("secret1");
        f.persistence
            .snapshot(&f.vault, &f.session, "secret1")
            .await
            .unwrap();
        assert!(f.persistence.has_snapshot().await.unwrap());

        f.vault.clear();
        f.session.disarm();

        let restored = f
            .persistence
            .restore("secret1", &mut f.vault, &f.session)
            .await
            .unwrap();
        assert_eq!(restored.address(), created.address());
        assert_eq!(*restored.private_key_hex(), *created.private_key_hex());
        assert_eq!(restored.recovery_phrase(), created.recovery_phrase());
        assert!(f.session.verify("secret1"));
        assert_eq!(
            f.vault.current_identity().unwrap().address(),
            created.address()
        );
    }

    #[tokio::test]
    async fn test_wrong_secret_preserves_blob() {
        let mut f = fixture();
        f.vault.create_identity().unwrap();
        f.session.arm("secret1");
        f.persistence
            .snapshot(&f.vault, &f.session, "secret1")
            .await
            .unwrap();
        let stored = f.storage.read().await.unwrap();

        f.vault.clear();
        f.session.disarm();

        let result = f.persistence.restore("secret2", &mut f.vault, &f.session).await;
        assert!(matches!(result, Err(Error::RestoreFailed)));
        assert!(f.vault.current_identity().is_none());
        assert!(!f.session.is_armed());
        assert_eq!(f.storage.read().await.unwrap(), stored);
    }

    #[tokio::test]
    async fn test_corrupted_blob_is_restore_failed() {
        let mut f = fixture();
        f.storage.write("{\"garbage\":true}").await.unwrap();

        let result = f.persistence.restore("secret1", &mut f.vault, &f.session).await;
        assert!(matches!(result, Err(Error::RestoreFailed)));
        assert_eq!(
            f.storage.read().await.unwrap().as_deref(),
            Some("{\"garbage\":true}")
        );
    }

    #[tokio::test]
    async fn test_restore_without_snapshot() {
        let mut f = fixture();
        assert!(!f.persistence.has_snapshot().await.unwrap());
        let result = f.persistence.restore("secret1", &mut f.vault, &f.session).await;
        assert!(matches!(result, Err(Error::RestoreFailed)));
    }

    #[tokio::test]
    async fn test_unreadable_storage_is_not_absent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::in_dir(dir.path());
        std::fs::write(storage.path(), "{not json").unwrap();

        let persistence = EncryptedPersistence::new(Arc::new(storage));
        assert!(matches!(
            persistence.has_snapshot().await,
            Err(Error::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_requires_verified_secret() {
        let f = fixture();
        let mut vault = KeyVault::new();
        vault.create_identity().unwrap();

        let unarmed = f.persistence.snapshot(&vault, &f.session, "secret1").await;
        assert!(matches!(unarmed, Err(Error::SessionNotVerified)));

        f.session.arm("secret1");
        let wrong = f.persistence.snapshot(&vault, &f.session, "other").await;
        assert!(matches!(wrong, Err(Error::SessionNotVerified)));
        assert!(!f.persistence.has_snapshot().await.unwrap());
    }

    #[tokio::test]
    async fn test_snapshot_overwrites_previous() {
        let mut f = fixture();
        f.vault.create_identity().unwrap();
        f.session.arm("secret1");
        f.persistence.snapshot(&f.vault, &f.session, "secret1").await.unwrap();

        let second = f.vault.create_identity().unwrap();
        f.session.arm("secret2");
        f.persistence.snapshot(&f.vault, &f.session, "secret2").await.unwrap();

        f.vault.clear();
        assert!(f.persistence.restore("secret1", &mut f.vault, &f.session).await.is_err());
        let restored = f
            .persistence
            .restore("secret2", &mut f.vault, &f.session)
            .await
            .unwrap();
        assert_eq!(restored.address(), second.address());
    }

    #[tokio::test]
    async fn test_blob_contains_no_plaintext() {
        let f = fixture();
        let mut vault = KeyVault::new();
        let identity = vault
            .import_from_recovery_phrase("test test test test test test test test test test test junk")
            .unwrap();
        f.session.arm("secret1");
        f.persistence.snapshot(&vault, &f.session, "secret1").await.unwrap();

        let blob = f.storage.read().await.unwrap().unwrap();
        assert!(!blob.contains("junk"));
        assert!(!blob.contains("secret1"));
        assert!(!blob.contains(&identity.private_key_hex()[2..]));
    }

    #[tokio::test]
    async fn test_discard_removes_slot() {
        let mut f = fixture();
        f.vault.create_identity().unwrap();
        f.session.arm("secret1");
        f.persistence.snapshot(&f.vault, &f.session, "secret1").await.unwrap();

        f.persistence.discard().await.unwrap();
        assert!(!f.persistence.has_snapshot().await.unwrap());
        f.persistence.discard().await.unwrap();
    }

    #[tokio::test]
    async fn test_discard_cancels_pending_snapshot() {
        let f = fixture();
        let mut vault = KeyVault::new();
        vault.create_identity().unwrap();
        f.session.arm("secret1");

        // Hold the write lock so the snapshot parks after sealing
        let guard = f.persistence.write_lock.lock().await;
        let mut snapshot = tokio_test::task::spawn(f.persistence.snapshot(&vault, &f.session, "secret1"));
        tokio_test::assert_pending!(snapshot.poll());

        f.persistence.generation.fetch_add(1, Ordering::SeqCst);
        drop(guard);

        let result = tokio_test::assert_ready!(snapshot.poll());
        assert!(matches!(result, Err(Error::SnapshotCancelled)));
        assert!(!f.persistence.has_snapshot().await.unwrap());
    }
}
