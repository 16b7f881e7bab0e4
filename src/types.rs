//! Core ledger types

use crate::constants::{VERSION_CONTRACT, VERSION_USER};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hash type: 256-bit hash
pub type Hash = [u8; 32];

/// Byte string type
pub type ByteString = Vec<u8>;

/// Natural number type
pub type Natural = u64;

/// Arbitrary-precision unsigned amount
pub type Amount = BigUint;

/// Address of an account or contract: version byte followed by RIPEMD-160 digest
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PubKeyHash(pub ByteString);

impl PubKeyHash {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn version(&self) -> Option<u8> {
        self.0.first().copied()
    }

    pub fn is_contract(&self) -> bool {
        self.version() == Some(VERSION_CONTRACT)
    }

    pub fn is_user(&self) -> bool {
        self.version() == Some(VERSION_USER)
    }

    /// Hex form, used as the UTXO index key
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for PubKeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Transaction input: reference to a previous output plus unlock data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub txid: ByteString,
    pub vout: i32,
    pub signature: ByteString,
    pub pub_key: ByteString,
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: Amount,
    pub pub_key_hash: PubKeyHash,
    pub contract: Option<String>,
}

impl TxOutput {
    pub fn new(value: Amount, pub_key_hash: PubKeyHash) -> Self {
        TxOutput { value, pub_key_hash, contract: None }
    }

    pub fn new_contract(value: Amount, pub_key_hash: PubKeyHash, contract: String) -> Self {
        TxOutput { value, pub_key_hash, contract: Some(contract) }
    }
}

/// Transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Hash,
    pub vin: Vec<TxInput>,
    pub vout: Vec<TxOutput>,
    pub tip: Amount,
    pub gas_limit: Amount,
    pub gas_price: Amount,
}

/// Block header. `hash` is set once when the block is sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub hash: Hash,
    pub prev_hash: Hash,
    pub height: Natural,
    pub timestamp: i64,
    pub nonce: u64,
}

/// Block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> Hash {
        self.header.hash
    }

    pub fn prev_hash(&self) -> Hash {
        self.header.prev_hash
    }

    pub fn height(&self) -> Natural {
        self.header.height
    }
}

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(String),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }
}

/// Short hex form of a hash for log fields
pub fn short_hash(hash: &[u8]) -> String {
    hex::encode(&hash[..hash.len().min(8)])
}
