//! Custody Wallet Library
//!
//! Self-custody EVM wallet core: key vault, credential session, encrypted
//! persistence and multi-chain transfers.

pub mod chain;
pub mod cli;
pub mod config;
pub mod error;
pub mod scan;
pub mod wallet;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use wallet::WalletContext;
