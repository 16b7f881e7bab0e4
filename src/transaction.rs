//! Transaction construction, hashing and validation

use crate::constants::*;
use crate::crypto::{sha256, verify_signature, KeyPair};
use crate::error::{LedgerError, Result};
use crate::types::*;
use crate::utxo::{utxo_key, Utxo};
use crate::utxo_index::UtxoIndex;
use std::collections::HashSet;

/// Parameters of a transfer built by [`Transaction::new_utxo_transaction`]
#[derive(Debug, Clone)]
pub struct SendTxParams<'a> {
    pub from: &'a KeyPair,
    pub to: PubKeyHash,
    pub amount: Amount,
    pub tip: Amount,
    pub gas_limit: Amount,
    pub gas_price: Amount,
    pub contract: Option<String>,
}

impl<'a> SendTxParams<'a> {
    pub fn new(from: &'a KeyPair, to: PubKeyHash, amount: Amount, tip: Amount) -> Self {
        SendTxParams {
            from,
            to,
            amount,
            tip,
            gas_limit: Amount::default(),
            gas_price: Amount::default(),
            contract: None,
        }
    }
}

impl Transaction {
    /// Coinbase paying `reward` to `to`, with `height` embedded in the input signature
    pub fn new_coinbase(to: &PubKeyHash, height: Natural, reward: Amount) -> Self {
        let mut tx = Transaction {
            id: [0; 32],
            vin: vec![TxInput {
                txid: vec![],
                vout: COINBASE_VOUT,
                signature: height.to_be_bytes().to_vec(),
                pub_key: to.as_bytes().to_vec(),
            }],
            vout: vec![TxOutput::new(reward, to.clone())],
            tip: Amount::default(),
            gas_limit: Amount::default(),
            gas_price: Amount::default(),
        };
        tx.id = tx.hash();
        tx
    }

    /// NewUTXOTransaction: spend `utxos` owned by `params.from`.
    ///
    /// 1. Sum the inputs and require sum ≥ amount + tip + gas_limit × gas_price
    /// 2. Pay `amount` to `params.to`, return any surplus to the sender
    /// 3. Hash, then sign every input
    pub fn new_utxo_transaction(utxos: &[Utxo], params: SendTxParams<'_>) -> Result<Self> {
        let from_pkh = params.from.pub_key_hash()?;

        // 1. Check funds
        let total_in: Amount = utxos.iter().map(|u| &u.output.value).sum();
        let required = &params.amount + &params.tip + &params.gas_limit * &params.gas_price;
        if total_in < required {
            return Err(LedgerError::InsufficientFund);
        }

        // 2. Outputs
        let mut vout = vec![TxOutput {
            value: params.amount,
            pub_key_hash: params.to,
            contract: params.contract,
        }];
        let change = total_in - required;
        if change > Amount::default() {
            vout.push(TxOutput::new(change, from_pkh));
        }

        let vin = utxos
            .iter()
            .map(|u| TxInput {
                txid: u.txid.to_vec(),
                vout: u.tx_index,
                signature: vec![],
                pub_key: params.from.public_key(),
            })
            .collect();

        // 3. Identify and sign
        let mut tx = Transaction {
            id: [0; 32],
            vin,
            vout,
            tip: params.tip,
            gas_limit: params.gas_limit,
            gas_price: params.gas_price,
        };
        tx.id = tx.hash();
        tx.sign(params.from, utxos)?;
        Ok(tx)
    }

    /// Content hash. Covers every field except `id` and the input signatures; a
    /// coinbase's height is part of its identity.
    pub fn hash(&self) -> Hash {
        sha256(&self.content_bytes())
    }

    fn content_bytes(&self) -> Vec<u8> {
        fn put(bytes: &mut Vec<u8>, field: &[u8]) {
            bytes.extend_from_slice(&(field.len() as u32).to_be_bytes());
            bytes.extend_from_slice(field);
        }

        let coinbase = self.is_coinbase();
        let mut bytes = Vec::new();
        for vin in &self.vin {
            put(&mut bytes, &vin.txid);
            bytes.extend_from_slice(&vin.vout.to_be_bytes());
            put(&mut bytes, &vin.pub_key);
            if coinbase {
                put(&mut bytes, &vin.signature);
            }
        }
        for vout in &self.vout {
            put(&mut bytes, &vout.value.to_bytes_be());
            put(&mut bytes, vout.pub_key_hash.as_bytes());
            put(&mut bytes, vout.contract.as_deref().unwrap_or_default().as_bytes());
        }
        put(&mut bytes, &self.tip.to_bytes_be());
        put(&mut bytes, &self.gas_limit.to_bytes_be());
        put(&mut bytes, &self.gas_price.to_bytes_be());
        bytes
    }

    /// Digest signed by input `index`: the hash of a copy whose public keys are
    /// cleared except input `index`, which carries the spent output's owner.
    fn signing_digest(&self, index: usize, owner: &PubKeyHash) -> Hash {
        let mut trimmed = self.clone();
        for (i, vin) in trimmed.vin.iter_mut().enumerate() {
            vin.signature.clear();
            vin.pub_key = if i == index { owner.as_bytes().to_vec() } else { vec![] };
        }
        trimmed.hash()
    }

    /// Sign every input. `prev_utxos[i]` is the output spent by input `i`.
    pub fn sign(&mut self, key: &KeyPair, prev_utxos: &[Utxo]) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }
        if prev_utxos.len() != self.vin.len() {
            return Err(LedgerError::TransactionValidation(format!(
                "{} inputs but {} previous outputs",
                self.vin.len(),
                prev_utxos.len()
            )));
        }
        for index in 0..self.vin.len() {
            let digest = self.signing_digest(index, prev_utxos[index].pub_key_hash());
            self.vin[index].signature = key.sign(&digest)?;
        }
        Ok(())
    }

    /// Coinbase: exactly one input with empty txid and vout -1
    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].txid.is_empty() && self.vin[0].vout == COINBASE_VOUT
    }

    /// Height embedded in a coinbase input
    pub fn coinbase_height(&self) -> Option<Natural> {
        if !self.is_coinbase() {
            return None;
        }
        let bytes: [u8; 8] = self.vin[0].signature.as_slice().try_into().ok()?;
        Some(u64::from_be_bytes(bytes))
    }

    /// Pays to at least one contract address
    pub fn is_contract(&self) -> bool {
        self.vout.iter().any(|o| o.pub_key_hash.is_contract())
    }

    pub fn total_output(&self) -> Amount {
        self.vout.iter().map(|o| &o.value).sum()
    }

    pub fn gas_cost(&self) -> Amount {
        &self.gas_limit * &self.gas_price
    }

    /// Base gas a contract transaction must provision
    pub fn min_gas(&self) -> Amount {
        let payload: usize = self.vout.iter().filter_map(|o| o.contract.as_ref()).map(|c| c.len()).sum();
        Amount::from(MIN_GAS_COUNT_PER_TRANSACTION) + Amount::from(payload as u64 * GAS_COUNT_PER_BYTE)
    }

    pub fn serialize(&self) -> Result<ByteString> {
        Ok(bincode::serialize(self)?)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Serialized size in bytes
    pub fn size(&self) -> usize {
        bincode::serialized_size(self).map(|s| s as usize).unwrap_or(0)
    }

    /// Tip normalized by size: tip × 100000 / size
    pub fn tips_per_byte(&self) -> Amount {
        let size = self.size();
        if size == 0 {
            return Amount::default();
        }
        &self.tip * Amount::from(TIPS_PER_BYTE_SCALE) / Amount::from(size as u64)
    }
}

/// CheckTransaction: context-free structure checks
///
/// 1. Inputs and outputs are non-empty
/// 2. The id matches the content hash
/// 3. No output is referenced twice
/// 4. Non-coinbase inputs reference a real output index
pub fn check_transaction(tx: &Transaction) -> ValidationResult {
    // 1. Non-empty
    if tx.vin.is_empty() || tx.vout.is_empty() {
        return ValidationResult::Invalid("Empty inputs or outputs".to_string());
    }

    // 2. Identity
    if tx.id != tx.hash() {
        return ValidationResult::Invalid("Transaction id does not match its content".to_string());
    }

    if tx.is_coinbase() {
        return ValidationResult::Valid;
    }

    // 3. Duplicate inputs
    let mut seen = HashSet::new();
    for vin in &tx.vin {
        // 4. Index range
        if vin.vout < 0 {
            return ValidationResult::Invalid(format!("Negative output index {}", vin.vout));
        }
        if !seen.insert(utxo_key(&vin.txid, vin.vout)) {
            return ValidationResult::Invalid(format!(
                "Output {} spent twice",
                utxo_key(&vin.txid, vin.vout)
            ));
        }
    }

    ValidationResult::Valid
}

/// VerifyTransaction: a non-coinbase transaction against a UTXO view.
///
/// 1. Structure ([`check_transaction`])
/// 2. Every input resolves to an unspent output (`TxInputNotFound` otherwise)
/// 3. Σ inputs ≥ Σ outputs + tip + gas_limit × gas_price
/// 4. Contract transactions provision at least the base gas
/// 5. Every input's signature unlocks the output it spends
pub fn verify_transaction(tx: &Transaction, utxo_index: &UtxoIndex) -> Result<ValidationResult> {
    if tx.is_coinbase() {
        return Ok(ValidationResult::Invalid("Coinbase outside of block context".to_string()));
    }

    // 1. Structure
    let structure = check_transaction(tx);
    if !structure.is_valid() {
        return Ok(structure);
    }

    // 2. Resolve inputs
    let mut prev_utxos = Vec::with_capacity(tx.vin.len());
    for vin in &tx.vin {
        match utxo_index.find_utxo_by_input(vin) {
            Ok(utxo) => prev_utxos.push(utxo),
            Err(LedgerError::InvalidPubKey(reason)) => {
                return Ok(ValidationResult::Invalid(format!("Invalid input public key: {}", reason)));
            }
            Err(err) => return Err(err),
        }
    }

    // 3. No value creation
    let total_in: Amount = prev_utxos.iter().map(|u| &u.output.value).sum();
    let total_spent = tx.total_output() + &tx.tip + tx.gas_cost();
    if total_in < total_spent {
        return Ok(ValidationResult::Invalid(format!(
            "Insufficient input value: {} < {}",
            total_in, total_spent
        )));
    }

    // 4. Gas
    if tx.is_contract() && tx.gas_limit < tx.min_gas() {
        return Ok(ValidationResult::Invalid(format!(
            "Out of gas: limit {} below base cost {}",
            tx.gas_limit,
            tx.min_gas()
        )));
    }

    // 5. Signatures
    for (i, (vin, prev)) in tx.vin.iter().zip(&prev_utxos).enumerate() {
        let digest = tx.signing_digest(i, prev.pub_key_hash());
        if !verify_signature(&vin.pub_key, &digest, &vin.signature) {
            return Ok(ValidationResult::Invalid(format!("Invalid signature at input {}", i)));
        }
    }

    Ok(ValidationResult::Valid)
}

/// VerifyCoinbase: structure and embedded height of a block's coinbase
pub fn verify_coinbase(tx: &Transaction, height: Natural) -> ValidationResult {
    if !tx.is_coinbase() {
        return ValidationResult::Invalid("Not a coinbase transaction".to_string());
    }
    let structure = check_transaction(tx);
    if !structure.is_valid() {
        return structure;
    }
    match tx.coinbase_height() {
        Some(h) if h == height => ValidationResult::Valid,
        Some(h) => ValidationResult::Invalid(format!("Coinbase height {} at block height {}", h, height)),
        None => ValidationResult::Invalid("Coinbase height is not encoded".to_string()),
    }
}
