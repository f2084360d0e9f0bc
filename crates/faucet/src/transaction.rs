//! Legacy (pre EIP-2718) value transfers with EIP-155 replay protection.

use drip_common::{Address, TxHash};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use rlp::RlpStream;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignError {
    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Recovery failed: {0}")]
    Recovery(String),
}

/// Unsigned legacy transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: u128,
    pub data: Vec<u8>,
}

/// Transaction with its secp256k1 signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub tx: LegacyTransaction,
    pub v: u64,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

impl LegacyTransaction {
    fn append_body(&self, stream: &mut RlpStream) {
        stream.append(&self.nonce);
        stream.append(&trim_leading_zeros(&self.gas_price.to_be_bytes()));
        stream.append(&self.gas_limit);
        stream.append(&self.to.0.to_vec());
        stream.append(&trim_leading_zeros(&self.value.to_be_bytes()));
        stream.append(&self.data);
    }

    /// keccak256(rlp([nonce, gasPrice, gasLimit, to, value, data, chainId, 0, 0]))
    pub fn signing_hash(&self, chain_id: u64) -> [u8; 32] {
        let mut stream = RlpStream::new_list(9);
        self.append_body(&mut stream);
        stream.append(&chain_id);
        stream.append(&0u8);
        stream.append(&0u8);
        keccak_hash::keccak(stream.out()).0
    }

    /// Sign for `chain_id`; the signature is only valid on that chain.
    pub fn sign(self, key: &SigningKey, chain_id: u64) -> Result<SignedTransaction, SignError> {
        let hash = self.signing_hash(chain_id);
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(&hash)
            .map_err(|e| SignError::Signing(e.to_string()))?;

        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);

        let v = chain_id
            .checked_mul(2)
            .and_then(|v| v.checked_add(35 + recovery_id.to_byte() as u64))
            .ok_or_else(|| SignError::Signing(format!("chain id {} too large", chain_id)))?;

        Ok(SignedTransaction { tx: self, v, r, s })
    }
}

impl SignedTransaction {
    /// rlp([nonce, gasPrice, gasLimit, to, value, data, v, r, s])
    pub fn raw(&self) -> Vec<u8> {
        let mut stream = RlpStream::new_list(9);
        self.tx.append_body(&mut stream);
        stream.append(&self.v);
        stream.append(&trim_leading_zeros(&self.r));
        stream.append(&trim_leading_zeros(&self.s));
        stream.out().to_vec()
    }

    pub fn hash(&self) -> TxHash {
        TxHash(keccak_hash::keccak(self.raw()).0)
    }

    /// Chain id encoded in `v`, if the signature is EIP-155.
    pub fn chain_id(&self) -> Option<u64> {
        if self.v >= 35 {
            Some((self.v - 35) / 2)
        } else {
            None
        }
    }

    /// Recover the address that produced the signature.
    pub fn recover_sender(&self) -> Result<Address, SignError> {
        let chain_id = self
            .chain_id()
            .ok_or_else(|| SignError::Recovery(format!("not an EIP-155 signature (v = {})", self.v)))?;
        let parity = (self.v - 35 - chain_id * 2) as u8;
        let recovery_id =
            RecoveryId::from_byte(parity).ok_or_else(|| SignError::Recovery(format!("bad parity {}", parity)))?;

        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..].copy_from_slice(&self.s);
        let signature = Signature::from_slice(&bytes).map_err(|e| SignError::Recovery(e.to_string()))?;

        let key = VerifyingKey::recover_from_prehash(&self.tx.signing_hash(chain_id), &signature, recovery_id)
            .map_err(|e| SignError::Recovery(e.to_string()))?;
        Ok(address_from_verifying_key(&key))
    }
}

fn trim_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}

/// Parse a hex private key, with or without `0x`.
pub fn signing_key_from_hex(private_key: &str) -> Result<SigningKey, SignError> {
    let trimmed = private_key.trim();
    let hex_str = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(hex_str).map_err(|e| SignError::InvalidKey(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(SignError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len())));
    }
    SigningKey::from_slice(&bytes).map_err(|e| SignError::InvalidKey(e.to_string()))
}

pub fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let pub_key_bytes = key.to_encoded_point(false);
    let hash = keccak_hash::keccak(&pub_key_bytes.as_bytes()[1..]); // Skip 0x04 tag
    Address::from_slice(&hash.0[12..])
}

/// Account address controlled by `key`.
pub fn address_from_signing_key(key: &SigningKey) -> Address {
    address_from_verifying_key(key.verifying_key())
}
