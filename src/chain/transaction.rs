//! Transaction building for native value transfers
//!
//! Legacy (pre-1559) transactions with EIP-155 replay protection. Every
//! supported chain accepts this format.

use k256::ecdsa::SigningKey;
use sha3::{Digest, Keccak256};

use crate::error::{Error, Result};

use super::types::{Address, Amount};

/// Gas limit of a plain value transfer with no calldata
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;

/// Unsigned native transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: Amount,
    pub chain_id: u64,
}

/// Signed, RLP-encoded transaction ready for broadcast
#[derive(Debug, Clone)]
pub struct SignedTransfer {
    /// Raw transaction bytes
    pub raw: Vec<u8>,

    /// Keccak-256 of the raw bytes, `0x`-prefixed
    pub hash: String,
}

impl SignedTransfer {
    /// `0x`-prefixed hex of the raw bytes, as `eth_sendRawTransaction` expects
    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.raw))
    }
}

impl TransferRequest {
    /// RLP payload hashed for signing: `[nonce, gasPrice, gas, to, value, data, chainId, 0, 0]`
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut fields = self.common_fields();
        fields.push(rlp_uint(self.chain_id as u128));
        fields.push(rlp_uint(0));
        fields.push(rlp_uint(0));
        rlp_list(&fields)
    }

    pub fn signing_hash(&self) -> [u8; 32] {
        Keccak256::digest(self.signing_payload()).into()
    }

    /// Sign with the sender's key
    pub fn sign(&self, key: &SigningKey) -> Result<SignedTransfer> {
        let hash = self.signing_hash();
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(&hash)
            .map_err(|e| Error::Internal(format!("Signing failed: {}", e)))?;

        let v = recovery_id.to_byte() as u128 + 35 + 2 * self.chain_id as u128;
        let r = signature.r().to_bytes();
        let s = signature.s().to_bytes();

        let mut fields = self.common_fields();
        fields.push(rlp_uint(v));
        fields.push(rlp_bytes(strip_leading_zeros(&r)));
        fields.push(rlp_bytes(strip_leading_zeros(&s)));
        let raw = rlp_list(&fields);

        let hash = format!("0x{}", hex::encode(Keccak256::digest(&raw)));
        Ok(SignedTransfer { raw, hash })
    }

    fn common_fields(&self) -> Vec<Vec<u8>> {
        vec![
            rlp_uint(self.nonce as u128),
            rlp_uint(self.gas_price),
            rlp_uint(self.gas_limit as u128),
            rlp_bytes(self.to.as_bytes()),
            rlp_uint(self.value.wei()),
            rlp_bytes(&[]),
        ]
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

fn rlp_length_prefix(len: usize, short_offset: u8) -> Vec<u8> {
    if len <= 55 {
        vec![short_offset + len as u8]
    } else {
        let len_bytes = len.to_be_bytes();
        let len_bytes = strip_leading_zeros(&len_bytes);
        let mut prefix = Vec::with_capacity(1 + len_bytes.len());
        prefix.push(short_offset + 55 + len_bytes.len() as u8);
        prefix.extend_from_slice(len_bytes);
        prefix
    }
}

fn rlp_bytes(bytes: &[u8]) -> Vec<u8> {
    if bytes.len() == 1 && bytes[0] < 0x80 {
        return bytes.to_vec();
    }
    let mut out = rlp_length_prefix(bytes.len(), 0x80);
    out.extend_from_slice(bytes);
    out
}

fn rlp_uint(value: u128) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    rlp_bytes(strip_leading_zeros(&bytes))
}

fn rlp_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload_len: usize = items.iter().map(Vec::len).sum();
    let mut out = rlp_length_prefix(payload_len, 0xc0);
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

    // Example transaction from EIP-155
    fn eip155_example() -> TransferRequest {
        TransferRequest {
            nonce: 9,
            gas_price: 20_000_000_000,
            gas_limit: TRANSFER_GAS_LIMIT,
            to: "0x3535353535353535353535353535353535353535".parse().unwrap(),
            value: Amount::from_wei(1_000_000_000_000_000_000),
            chain_id: 1,
        }
    }

    #[test]
    fn test_rlp_primitives() {
        assert_eq!(rlp_uint(0), vec![0x80]);
        assert_eq!(rlp_uint(0x7f), vec![0x7f]);
        assert_eq!(rlp_uint(0x80), vec![0x81, 0x80]);
        assert_eq!(rlp_uint(1024), vec![0x82, 0x04, 0x00]);
        assert_eq!(rlp_list(&[]), vec![0xc0]);

        let long = vec![0xaa; 56];
        let encoded = rlp_bytes(&long);
        assert_eq!(&encoded[..2], &[0xb8, 56]);
        assert_eq!(encoded.len(), 58);
    }

    #[test]
    fn test_eip155_signing_payload() {
        let tx = eip155_example();
        assert_eq!(
            hex::encode(tx.signing_payload()),
            "ec098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080018080"
        );
        assert_eq!(
            hex::encode(tx.signing_hash()),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn test_signature_recovers_sender() {
        let key = SigningKey::from_slice(&[0x46; 32]).unwrap();
        let tx = eip155_example();
        let signed = tx.sign(&key).unwrap();

        // 0xf86c list header, then the six common fields
        assert_eq!(signed.raw[0], 0xf8);
        assert!(signed.hash.starts_with("0x") && signed.hash.len() == 66);

        // v, r, s are the trailing fields: v (1 byte), 0xa0 + r, 0xa0 + s
        let tail = &signed.raw[signed.raw.len() - 67..];
        let v = tail[0];
        assert!(v == 37 || v == 38, "unexpected v {}", v);
        assert_eq!(tail[1], 0xa0);
        assert_eq!(tail[34], 0xa0);

        let mut rs = [0u8; 64];
        rs[..32].copy_from_slice(&tail[2..34]);
        rs[32..].copy_from_slice(&tail[35..67]);
        let signature = Signature::from_slice(&rs).unwrap();
        let recovery_id = RecoveryId::from_byte(v - 37).unwrap();

        let recovered =
            VerifyingKey::recover_from_prehash(&tx.signing_hash(), &signature, recovery_id)
                .unwrap();
        assert_eq!(&recovered, key.verifying_key());
    }
}
