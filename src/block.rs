//! Block construction and per-block transaction verification

use crate::constants::*;
use crate::crypto::sha256d;
use crate::error::Result;
use crate::transaction::{verify_coinbase, verify_transaction};
use crate::types::*;
use crate::utxo_index::UtxoIndex;

impl Block {
    /// Child of `parent` holding `transactions`, sealed with nonce 0
    pub fn new(parent: &Block, transactions: Vec<Transaction>, timestamp: i64) -> Block {
        let mut block = Block {
            header: BlockHeader {
                hash: [0; 32],
                prev_hash: parent.hash(),
                height: parent.height() + 1,
                timestamp,
                nonce: 0,
            },
            transactions,
        };
        block.header.hash = block.calculate_hash();
        block
    }

    /// Genesis block paying the subsidy to `to`
    pub fn new_genesis(to: &PubKeyHash) -> Block {
        let coinbase = Transaction::new_coinbase(to, 0, Amount::from(SUBSIDY));
        let mut block = Block {
            header: BlockHeader {
                hash: [0; 32],
                prev_hash: [0; 32],
                height: 0,
                timestamp: GENESIS_TIMESTAMP,
                nonce: 0,
            },
            transactions: vec![coinbase],
        };
        block.header.hash = block.calculate_hash();
        block
    }

    /// Reseal with a different nonce
    pub fn with_nonce(mut self, nonce: u64) -> Block {
        self.header.nonce = nonce;
        self.header.hash = self.calculate_hash();
        self
    }

    /// Double SHA-256 over the header fields and the transaction ids
    pub fn calculate_hash(&self) -> Hash {
        let mut bytes = Vec::with_capacity(32 + 24 + 32 * self.transactions.len());
        bytes.extend_from_slice(&self.header.prev_hash);
        bytes.extend_from_slice(&self.header.height.to_be_bytes());
        bytes.extend_from_slice(&self.header.timestamp.to_be_bytes());
        bytes.extend_from_slice(&self.header.nonce.to_be_bytes());
        for tx in &self.transactions {
            bytes.extend_from_slice(&tx.id);
        }
        sha256d(&bytes)
    }

    pub fn verify_hash(&self) -> bool {
        self.header.hash == self.calculate_hash()
    }

    pub fn total_tips(&self) -> Amount {
        self.transactions
            .iter()
            .filter(|tx| !tx.is_coinbase())
            .map(|tx| &tx.tip)
            .sum()
    }

    pub fn serialize(&self) -> Result<ByteString> {
        Ok(bincode::serialize(self)?)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// VerifyBlockTransactions: ℬ × 𝒰 → {valid, invalid}
///
/// Applies the block to `utxo_index` as it goes, so later transactions may spend
/// outputs created earlier in the same block.
///
/// 1. At most one coinbase, and only in first position
/// 2. Coinbase height matches the block; its output ≤ subsidy + Σ tips
/// 3. Every other transaction verifies against the index as updated so far
/// 4. Each transaction is applied before the next is checked
pub fn verify_block_transactions(block: &Block, utxo_index: &UtxoIndex) -> Result<ValidationResult> {
    // 1. Coinbase placement
    let coinbase_count = block.transactions.iter().filter(|tx| tx.is_coinbase()).count();
    if coinbase_count > 1 {
        return Ok(ValidationResult::Invalid(format!("{} coinbase transactions", coinbase_count)));
    }
    if coinbase_count == 1 && !block.transactions[0].is_coinbase() {
        return Ok(ValidationResult::Invalid("Coinbase must be the first transaction".to_string()));
    }

    for (i, tx) in block.transactions.iter().enumerate() {
        if tx.is_coinbase() {
            // 2. Reward
            let coinbase = verify_coinbase(tx, block.height());
            if !coinbase.is_valid() {
                return Ok(coinbase);
            }
            let limit = Amount::from(SUBSIDY) + block.total_tips();
            if tx.total_output() > limit {
                return Ok(ValidationResult::Invalid(format!(
                    "Coinbase output {} exceeds subsidy + tips {}",
                    tx.total_output(),
                    limit
                )));
            }
        } else {
            // 3. Regular transaction
            match verify_transaction(tx, utxo_index) {
                Ok(ValidationResult::Valid) => {}
                Ok(ValidationResult::Invalid(reason)) => {
                    return Ok(ValidationResult::Invalid(format!("Transaction {}: {}", i, reason)));
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    return Ok(ValidationResult::Invalid(format!("Transaction {}: {}", i, err)));
                }
            }
        }

        // 4. Advance
        if !utxo_index.try_update_utxo(tx)? {
            return Ok(ValidationResult::Invalid(format!("Transaction {} cannot be applied", i)));
        }
    }

    Ok(ValidationResult::Valid)
}
