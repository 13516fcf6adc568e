//! Core types for the wallet
//!
//! Defines the identity (address, signing key, optional recovery phrase) and
//! its serialized form used inside the encrypted vault snapshot.

use std::fmt;
use std::str::FromStr;

use bip32::{DerivationPath, XPrv};
use bip39::{Language, Mnemonic};
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::chain::types::Address;
use crate::error::{Error, Result};

/// BIP-44 path of the first Ethereum account
pub const DERIVATION_PATH: &str = "m/44'/60'/0'/0/0";

/// Words in a generated recovery phrase
pub const PHRASE_WORDS: usize = 12;

/// One wallet identity
///
/// The signing key and phrase are wiped when the identity is dropped.
#[derive(Clone)]
pub struct Identity {
    address: Address,
    signing_key: SigningKey,
    recovery_phrase: Option<Zeroizing<String>>,
}

impl Identity {
    /// Generate a fresh phrase-backed identity from the OS random source
    pub fn generate() -> Result<Self> {
        let mut entropy = Zeroizing::new([0u8; 16]);
        OsRng.fill_bytes(&mut entropy[..]);

        let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy[..])
            .map_err(|e| Error::Internal(format!("Mnemonic generation failed: {}", e)))?;

        Self::from_mnemonic(&mnemonic)
            .map_err(|_| Error::Internal("Derivation from generated phrase failed".to_string()))
    }

    /// Parse a hex private key (64 hex chars, optional `0x`)
    pub fn from_private_key(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if hex_part.len() != 64 {
            return Err(Error::InvalidKeyFormat);
        }

        let mut bytes = Zeroizing::new([0u8; 32]);
        hex::decode_to_slice(hex_part, &mut bytes[..]).map_err(|_| Error::InvalidKeyFormat)?;

        let signing_key =
            SigningKey::from_slice(&bytes[..]).map_err(|_| Error::InvalidKeyFormat)?;

        Ok(Self::from_signing_key(signing_key, None))
    }

    /// Validate a BIP-39 phrase (word list + checksum) and derive the first account
    pub fn from_recovery_phrase(phrase: &str) -> Result<Self> {
        let normalized = Zeroizing::new(
            phrase
                .split_whitespace()
                .map(str::to_lowercase)
                .collect::<Vec<_>>()
                .join(" "),
        );

        let mnemonic = Mnemonic::parse_in_normalized(Language::English, &normalized)
            .map_err(|_| Error::InvalidRecoveryPhrase)?;

        Self::from_mnemonic(&mnemonic)
    }

    fn from_mnemonic(mnemonic: &Mnemonic) -> Result<Self> {
        let seed = Zeroizing::new(mnemonic.to_seed(""));
        let path = DerivationPath::from_str(DERIVATION_PATH)
            .map_err(|e| Error::Internal(format!("Invalid derivation path: {}", e)))?;
        let child =
            XPrv::derive_from_path(&seed[..], &path).map_err(|_| Error::InvalidRecoveryPhrase)?;

        let phrase = Zeroizing::new(mnemonic.to_string());
        Ok(Self::from_signing_key(child.private_key().clone(), Some(phrase)))
    }

    fn from_signing_key(signing_key: SigningKey, recovery_phrase: Option<Zeroizing<String>>) -> Self {
        let address = address_of(&signing_key);
        Self {
            address,
            signing_key,
            recovery_phrase,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// `0x`-prefixed lowercase hex of the private key
    pub fn private_key_hex(&self) -> Zeroizing<String> {
        let bytes = Zeroizing::new(<[u8; 32]>::from(self.signing_key.to_bytes()));
        Zeroizing::new(format!("0x{}", hex::encode(&bytes[..])))
    }

    /// Recovery phrase; `None` for identities imported from a raw key
    pub fn recovery_phrase(&self) -> Option<&str> {
        self.recovery_phrase.as_ref().map(|p| p.as_str())
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub(crate) fn to_serialized(&self) -> SerializedIdentity {
        SerializedIdentity {
            address: self.address.to_checksum(),
            private_key: self.private_key_hex().to_string(),
            recovery_phrase: self.recovery_phrase().map(str::to_string),
        }
    }

    /// Rebuild from a decrypted snapshot, checking the stored fields agree
    pub(crate) fn from_serialized(serialized: &SerializedIdentity) -> Result<Self> {
        let identity = match &serialized.recovery_phrase {
            Some(phrase) => {
                let from_phrase = Self::from_recovery_phrase(phrase)?;
                let from_key = Self::from_private_key(&serialized.private_key)?;
                if from_phrase.address != from_key.address {
                    return Err(Error::InvalidRecoveryPhrase);
                }
                from_phrase
            }
            None => Self::from_private_key(&serialized.private_key)?,
        };

        let stored: Address = serialized.address.parse()?;
        if stored != identity.address {
            return Err(Error::InvalidKeyFormat);
        }
        Ok(identity)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .field(
                "recovery_phrase",
                &self.recovery_phrase.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Canonical text form of an identity, only ever written encrypted
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub(crate) struct SerializedIdentity {
    pub address: String,
    pub private_key: String,
    pub recovery_phrase: Option<String>,
}

/// Keccak-256 of the uncompressed public key, last 20 bytes
pub fn address_of(key: &SigningKey) -> Address {
    let point = key.verifying_key().to_encoded_point(false);
    let hash = Keccak256::digest(&point.as_bytes()[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash[12..]);
    Address::from_bytes(bytes)
}
