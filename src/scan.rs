//! Scan resolver
//!
//! Turns text recognized from a QR code into a canonical `0x` address.
//! Pure and synchronous: no network, no storage.

use regex::Regex;

use crate::error::{Error, Result};

lazy_static::lazy_static! {
    /// Bare address: `0x` + exactly 40 hex digits
    static ref BARE_ADDRESS: Regex =
        Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("Invalid bare address regex");

    /// Payment URI, EIP-681 shaped: `scheme:[pay-][0x]<40 hex>[@chainId][/function][?query]`
    static ref PAYMENT_URI: Regex = Regex::new(
        r"^(?i:ethereum|eth|bnb|matic|avax):(?i:pay-)?(?:0[xX])?([0-9a-fA-F]{40})(?:@[0-9]+)?(?:[/?].*)?$"
    )
    .expect("Invalid payment URI regex");
}

/// Resolve scanned text to an address, or `InvalidFormat`
///
/// A bare address is returned unchanged; an address embedded in a payment
/// URI is returned as `0x` + its hex digits, case preserved.
pub fn resolve(raw: &str) -> Result<String> {
    let text = raw.trim();

    if BARE_ADDRESS.is_match(text) {
        return Ok(text.to_string());
    }

    if let Some(captures) = PAYMENT_URI.captures(text) {
        if let Some(hex) = captures.get(1) {
            return Ok(format!("0x{}", hex.as_str()));
        }
    }

    Err(Error::InvalidFormat)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    #[test]
    fn test_bare_address_resolves_to_itself() {
        assert_eq!(resolve(ADDRESS).unwrap(), ADDRESS);
        let lower = ADDRESS.to_lowercase();
        assert_eq!(resolve(&lower).unwrap(), lower);
        assert_eq!(resolve(&format!("  {}\n", ADDRESS)).unwrap(), ADDRESS);
    }

    #[test]
    fn test_payment_uri_extracts_address() {
        for uri in [
            format!("ethereum:{}", ADDRESS),
            format!("bnb:{}", ADDRESS),
            format!("MATIC:{}", ADDRESS),
            format!("avax:{}", ADDRESS),
            format!("ethereum:pay-{}@1", ADDRESS),
            format!("ethereum:{}@56?value=1e18", ADDRESS),
            format!("ethereum:{}/transfer?address=0x0", ADDRESS),
            format!("ethereum:{}", &ADDRESS[2..]),
        ] {
            assert_eq!(resolve(&uri).unwrap(), ADDRESS, "uri: {}", uri);
        }
    }

    #[test]
    fn test_rejects_everything_else() {
        let cases = vec![
            String::new(),
            "hello".to_string(),
            "0x1234".to_string(),
            format!("{}0", ADDRESS),
            ADDRESS[2..].to_string(),
            "0xZZZeb6053F3E94C9b9A09f33669435E7Ef1BeAed".to_string(),
            format!("bitcoin:{}", ADDRESS),
            format!("ethereum:{}extra", ADDRESS),
            format!("ethereum:{}@mainnet", ADDRESS),
            "ethereum:".to_string(),
        ];
        for text in &cases {
            assert!(
                matches!(resolve(text), Err(Error::InvalidFormat)),
                "text: {}",
                text
            );
        }
    }
}
