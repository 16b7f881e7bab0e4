//! Transaction journal: the outputs of every committed transaction, keyed by txid.
//!
//! Undoing a block needs the outputs its inputs consumed, which are no longer in
//! the UTXO index once spent.

use crate::constants::TX_JOURNAL_KEY_PREFIX;
use crate::error::{LedgerError, Result};
use crate::storage::{BatchOp, Storage};
use crate::types::*;
use crate::utxo::utxo_key;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxJournal {
    pub txid: Hash,
    pub vout: Vec<TxOutput>,
}

impl TxJournal {
    pub fn new(tx: &Transaction) -> Self {
        TxJournal { txid: tx.id, vout: tx.vout.clone() }
    }

    pub fn storage_key(txid: &[u8]) -> Vec<u8> {
        let mut key = TX_JOURNAL_KEY_PREFIX.as_bytes().to_vec();
        key.extend_from_slice(hex::encode(txid).as_bytes());
        key
    }

    pub fn to_batch_op(&self) -> Result<BatchOp> {
        Ok(BatchOp::Put(Self::storage_key(&self.txid), bincode::serialize(self)?))
    }

    pub fn load(db: &dyn Storage, txid: &[u8]) -> Result<Option<Self>> {
        match db.get(&Self::storage_key(txid))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }
}

/// Output referenced by `vin`, looked up in the journal
pub fn get_tx_output(db: &dyn Storage, vin: &TxInput) -> Result<TxOutput> {
    let not_found = || LedgerError::TxInputNotFound(utxo_key(&vin.txid, vin.vout));
    let journal = TxJournal::load(db, &vin.txid)?.ok_or_else(not_found)?;
    usize::try_from(vin.vout)
        .ok()
        .and_then(|index| journal.vout.get(index).cloned())
        .ok_or_else(not_found)
}
