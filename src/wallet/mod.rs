//! Wallet core
//!
//! Provides:
//! - Key vault (single active identity, create/import/clear)
//! - Credential session (in-memory secret, 30-minute expiry)
//! - Encrypted persistence ("remember me" snapshot)
//! - Transaction engine (balances, fee-aware transfers)
//!
//! # Architecture
//!
//! ```text
//!                    WalletContext
//!        ┌──────────┬──────┴───────┬───────────────────┐
//!    KeyVault  CredentialSession  EncryptedPersistence  TransactionEngine
//!                                        ↓                     ↓
//!                                   StorageSlot          ChainRegistry
//! ```
//!
//! # Security
//!
//! - Key material lives only in memory and is wiped on drop
//! - Every sensitive operation verifies the session secret first
//! - The snapshot is AES-256-GCM encrypted; a failed restore never deletes it

pub mod context;
pub mod persistence;
pub mod safety;
pub mod session;
pub mod storage;
pub mod transfer;
pub mod types;
pub mod vault;

pub use context::WalletContext;
pub use persistence::EncryptedPersistence;
pub use safety::{PendingTransfer, SecretPolicy};
pub use session::{CredentialSession, SESSION_TTL};
pub use storage::{FileStorage, MemoryStorage, StorageSlot};
pub use transfer::{ChainBalance, FeeQuote, FeeSettings, TransactionEngine, TransferReceipt};
pub use types::Identity;
pub use vault::KeyVault;
