//! Unspent outputs and per-address UTXO sets

use crate::error::Result;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// How an unspent output came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UtxoType {
    Normal,
    /// First output ever paid to a contract address
    ContractCreate,
    /// Any later output paid to a contract address
    ContractInvoke,
}

/// UTXO: an unspent output with its origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub output: TxOutput,
    pub txid: Hash,
    pub tx_index: i32,
    pub utxo_type: UtxoType,
}

impl Utxo {
    pub fn new(output: TxOutput, txid: Hash, tx_index: i32, utxo_type: UtxoType) -> Self {
        Utxo { output, txid, tx_index, utxo_type }
    }

    /// `txid:index` key of this output
    pub fn key(&self) -> String {
        utxo_key(&self.txid, self.tx_index)
    }

    pub fn value(&self) -> &Amount {
        &self.output.value
    }

    pub fn pub_key_hash(&self) -> &PubKeyHash {
        &self.output.pub_key_hash
    }
}

/// Key of the output `vout` of transaction `txid`
pub fn utxo_key(txid: &[u8], vout: i32) -> String {
    format!("{}:{}", hex::encode(txid), vout)
}

/// The UTXOs owned by one address, keyed by `txid:index`.
///
/// Cloning is O(1): the map is shared until one of the clones is mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoTx {
    indices: Arc<HashMap<String, Utxo>>,
}

impl UtxoTx {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_utxo(&self, key: &str) -> Option<&Utxo> {
        self.indices.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.indices.contains_key(key)
    }

    pub fn put_utxo(&mut self, utxo: Utxo) {
        Arc::make_mut(&mut self.indices).insert(utxo.key(), utxo);
    }

    pub fn remove_utxo(&mut self, key: &str) -> Option<Utxo> {
        if !self.indices.contains_key(key) {
            return None;
        }
        Arc::make_mut(&mut self.indices).remove(key)
    }

    pub fn size(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Utxo> {
        self.indices.values()
    }

    /// UTXOs ordered by key, for deterministic selection and encoding
    pub fn sorted(&self) -> Vec<&Utxo> {
        let mut utxos: Vec<&Utxo> = self.indices.values().collect();
        utxos.sort_by(|a, b| a.key().cmp(&b.key()));
        utxos
    }

    pub fn total_value(&self) -> Amount {
        self.indices.values().map(|u| &u.output.value).sum()
    }

    /// PrepareUtxos: pick spendable outputs until their sum reaches `amount`.
    ///
    /// Contract-creation outputs are never selected. Returns `None` if the
    /// remaining outputs cannot cover `amount`.
    pub fn prepare_utxos(&self, amount: &Amount) -> Option<Vec<Utxo>> {
        let mut selected = Vec::new();
        let mut sum = Amount::default();
        for utxo in self.sorted() {
            if utxo.utxo_type == UtxoType::ContractCreate {
                continue;
            }
            sum += &utxo.output.value;
            selected.push(utxo.clone());
            if sum >= *amount {
                return Some(selected);
            }
        }
        None
    }

    pub fn serialize(&self) -> Result<ByteString> {
        Ok(bincode::serialize(&self.sorted())?)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let utxos: Vec<Utxo> = bincode::deserialize(bytes)?;
        let indices = utxos.into_iter().map(|u| (u.key(), u)).collect();
        Ok(UtxoTx { indices: Arc::new(indices) })
    }

    /// True if both handles still share one map
    pub fn shares_storage_with(&self, other: &UtxoTx) -> bool {
        Arc::ptr_eq(&self.indices, &other.indices)
    }
}
