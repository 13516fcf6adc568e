//! Safety checks for wallet operations
//!
//! Local secret policy and the fee-aware sufficiency check every transfer
//! passes immediately before signing.

use tracing::{debug, warn};

use crate::chain::types::{Address, Amount, Chain};
use crate::error::{Error, Result};

/// Default minimum length of a session secret
pub const DEFAULT_MIN_SECRET_LEN: usize = 6;

/// Rules a new session secret must satisfy
#[derive(Debug, Clone)]
pub struct SecretPolicy {
    /// Minimum secret length in characters
    pub min_len: usize,
}

impl Default for SecretPolicy {
    fn default() -> Self {
        Self {
            min_len: DEFAULT_MIN_SECRET_LEN,
        }
    }
}

impl SecretPolicy {
    pub fn new(min_len: usize) -> Self {
        Self { min_len }
    }

    /// Validate a chosen secret and its confirmation
    pub fn check(&self, secret: &str, confirmation: &str) -> Result<()> {
        if secret.chars().count() < self.min_len {
            return Err(Error::WeakSecret {
                min_len: self.min_len,
            });
        }
        if secret != confirmation {
            return Err(Error::SecretMismatch);
        }
        Ok(())
    }
}

/// Transfer awaiting its final balance check
///
/// Never persisted; dropped after the broadcast succeeds or fails.
#[derive(Debug, Clone)]
pub struct PendingTransfer {
    pub chain: Chain,
    pub to: Address,
    pub amount: Amount,
    pub fee_estimate: Amount,
}

impl PendingTransfer {
    pub fn new(chain: Chain, to: Address, amount: Amount, fee_estimate: Amount) -> Result<Self> {
        if amount.is_zero() {
            return Err(Error::InvalidAmount(
                "amount must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            chain,
            to,
            amount,
            fee_estimate,
        })
    }

    /// Amount plus fee, in base units
    pub fn total_cost(&self) -> Result<Amount> {
        self.amount
            .checked_add(self.fee_estimate)
            .ok_or_else(|| Error::InvalidAmount("amount plus fee overflows".to_string()))
    }

    /// Fail with `InsufficientFunds` if `amount + fee` exceeds `balance`
    ///
    /// Exactly equal passes.
    pub fn validate_against(&self, balance: Amount) -> Result<()> {
        let required = self.total_cost()?;
        if required > balance {
            warn!(
                "Insufficient funds on {}: {} required, {} available",
                self.chain, required, balance
            );
            return Err(Error::InsufficientFunds {
                required,
                available: balance,
            });
        }

        debug!(
            "Transfer validated: {} {} + {} fee to {} (balance {})",
            self.amount, self.chain, self.fee_estimate, self.to, balance
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(amount: u128, fee: u128) -> PendingTransfer {
        let to: Address = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".parse().unwrap();
        PendingTransfer::new(
            Chain::Eth,
            to,
            Amount::from_wei(amount),
            Amount::from_wei(fee),
        )
        .unwrap()
    }

    #[test]
    fn test_secret_policy() {
        let policy = SecretPolicy::default();
        assert!(matches!(
            policy.check("12345", "12345"),
            Err(Error::WeakSecret { min_len: 6 })
        ));
        assert!(matches!(
            policy.check("secret1", "secret2"),
            Err(Error::SecretMismatch)
        ));
        assert!(policy.check("secret1", "secret1").is_ok());
    }

    #[test]
    fn test_secret_policy_counts_characters() {
        let policy = SecretPolicy::new(6);
        // Six characters, more than six bytes
        assert!(policy.check("ääääää", "ääääää").is_ok());
    }

    #[test]
    fn test_exact_balance_passes() {
        let transfer = pending(999_000, 1_000);
        assert!(transfer.validate_against(Amount::from_wei(1_000_000)).is_ok());
    }

    #[test]
    fn test_one_wei_short_fails() {
        let transfer = pending(999_001, 1_000);
        match transfer.validate_against(Amount::from_wei(1_000_000)) {
            Err(Error::InsufficientFunds {
                required,
                available,
            }) => {
                assert_eq!(required, Amount::from_wei(1_000_001));
                assert_eq!(available, Amount::from_wei(1_000_000));
            }
            other => panic!("expected InsufficientFunds, got {:?}", other),
        }
    }

    #[test]
    fn test_decimal_boundary_without_float_error() {
        // 0.1 + 0.2 == 0.3 exactly in fixed point
        let to: Address = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".parse().unwrap();
        let transfer = PendingTransfer::new(
            Chain::Bnb,
            to,
            "0.1".parse().unwrap(),
            "0.2".parse().unwrap(),
        )
        .unwrap();
        assert!(transfer.validate_against("0.3".parse().unwrap()).is_ok());
    }

    #[test]
    fn test_zero_amount_rejected() {
        let to: Address = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".parse().unwrap();
        assert!(matches!(
            PendingTransfer::new(Chain::Eth, to, Amount::ZERO, Amount::from_wei(1)),
            Err(Error::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_overflow_rejected() {
        let transfer = pending(u128::MAX, 1);
        assert!(matches!(
            transfer.validate_against(Amount::from_wei(u128::MAX)),
            Err(Error::InvalidAmount(_))
        ));
    }
}
