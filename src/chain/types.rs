//! Core chain types
//!
//! Defines the supported chains, fixed-point native amounts and EVM addresses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::error::{Error, Result};

/// Decimals of every supported native asset
pub const NATIVE_DECIMALS: u32 = 18;

/// Base units (wei) per whole native coin
pub const WEI_PER_COIN: u128 = 1_000_000_000_000_000_000;

/// Supported chains
///
/// The set is fixed; user configuration may only change endpoint URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Chain {
    /// Ethereum mainnet
    Eth,

    /// BNB Smart Chain
    Bnb,

    /// Polygon PoS
    Matic,

    /// Avalanche C-Chain
    Avax,
}

impl Chain {
    /// Every supported chain, in display order
    pub const ALL: [Chain; 4] = [Chain::Eth, Chain::Bnb, Chain::Matic, Chain::Avax];

    /// Chain identifier / native symbol
    pub fn id(&self) -> &'static str {
        match self {
            Chain::Eth => "ETH",
            Chain::Bnb => "BNB",
            Chain::Matic => "MATIC",
            Chain::Avax => "AVAX",
        }
    }

    /// Human-readable network name
    pub fn name(&self) -> &'static str {
        match self {
            Chain::Eth => "Ethereum",
            Chain::Bnb => "BNB Chain",
            Chain::Matic => "Polygon",
            Chain::Avax => "Avalanche",
        }
    }

    /// EIP-155 chain id used for replay protection
    pub fn eip155_id(&self) -> u64 {
        match self {
            Chain::Eth => 1,
            Chain::Bnb => 56,
            Chain::Matic => 137,
            Chain::Avax => 43114,
        }
    }

    /// Default public RPC endpoint
    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            Chain::Eth => "https://cloudflare-eth.com",
            Chain::Bnb => "https://bsc-dataseed1.binance.org",
            Chain::Matic => "https://polygon-rpc.com",
            Chain::Avax => "https://api.avax.network/ext/bc/C/rpc",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Chain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ETH" => Ok(Chain::Eth),
            "BNB" => Ok(Chain::Bnb),
            "MATIC" => Ok(Chain::Matic),
            "AVAX" => Ok(Chain::Avax),
            _ => Err(Error::UnknownChain(s.to_string())),
        }
    }
}

/// Native coin amount in base units (wei)
///
/// All arithmetic and comparisons are integer; decimal strings are only used
/// at the edges for parsing and display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(u128);

impl Amount {
    /// Zero amount
    pub const ZERO: Amount = Amount(0);

    /// Create from base units
    pub const fn from_wei(wei: u128) -> Self {
        Self(wei)
    }

    /// Base units
    pub const fn wei(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Parse a decimal coin string such as `"1.5"` or `".001"`
    ///
    /// Rejects signs, exponents, more than 18 fractional digits and overflow.
    pub fn parse_decimal(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || Error::InvalidAmount(s.to_string());

        let (whole, fraction) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };

        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        if fraction.len() > NATIVE_DECIMALS as usize {
            return Err(invalid());
        }

        let whole_wei = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u128>()
                .ok()
                .and_then(|w| w.checked_mul(WEI_PER_COIN))
                .ok_or_else(invalid)?
        };

        let fraction_wei = if fraction.is_empty() {
            0
        } else {
            let digits = fraction.parse::<u128>().map_err(|_| invalid())?;
            digits * 10u128.pow(NATIVE_DECIMALS - fraction.len() as u32)
        };

        whole_wei
            .checked_add(fraction_wei)
            .map(Amount)
            .ok_or_else(invalid)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / WEI_PER_COIN;
        let fraction = self.0 % WEI_PER_COIN;
        if fraction == 0 {
            return write!(f, "{}.0", whole);
        }
        let digits = format!("{:018}", fraction);
        write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
    }
}

impl FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Amount::parse_decimal(s)
    }
}

/// 20-byte EVM account address
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address([u8; 20]);

impl Address {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// EIP-55 mixed-case checksum encoding
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0);
        let hash = Keccak256::digest(lower.as_bytes());

        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
            if c.is_ascii_alphabetic() && nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_checksum())
    }
}

impl FromStr for Address {
    type Err = Error;

    /// Parse `0x` + 40 hex characters
    ///
    /// All-lowercase and all-uppercase input is accepted as is. Mixed case
    /// must be a valid EIP-55 checksum.
    fn from_str(s: &str) -> Result<Self> {
        let hex_part = s.strip_prefix("0x").ok_or(Error::InvalidFormat)?;
        if hex_part.len() != 40 {
            return Err(Error::InvalidFormat);
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(hex_part, &mut bytes).map_err(|_| Error::InvalidFormat)?;
        let address = Self(bytes);

        let has_lower = hex_part.bytes().any(|b| b.is_ascii_lowercase());
        let has_upper = hex_part.bytes().any(|b| b.is_ascii_uppercase());
        if has_lower && has_upper && address.to_checksum() != s {
            return Err(Error::InvalidFormat);
        }
        Ok(address)
    }
}
