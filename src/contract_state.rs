//! Contract key/value state, snapshotted per committed block.
//!
//! The ledger never interprets the values. Whoever executes contracts fills the
//! state in with [`ContractState::set`] before a block is appended; the chain
//! stores it under that block's hash and hands the snapshot at a fork's
//! attachment point back when the fork is verified and replayed.

use crate::constants::CONTRACT_STATE_KEY_PREFIX;
use crate::error::Result;
use crate::storage::{BatchOp, Storage};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// State of every contract: address -> key -> value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractState {
    states: BTreeMap<String, BTreeMap<String, String>>,
}

impl ContractState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &PubKeyHash, key: &str) -> Option<&str> {
        self.states.get(&address.to_hex())?.get(key).map(String::as_str)
    }

    pub fn set(&mut self, address: &PubKeyHash, key: &str, value: &str) {
        self.states
            .entry(address.to_hex())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    pub fn remove(&mut self, address: &PubKeyHash, key: &str) -> Option<String> {
        self.states.get_mut(&address.to_hex())?.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.states.values().all(BTreeMap::is_empty)
    }

    /// Number of contracts with recorded state
    pub fn len(&self) -> usize {
        self.states.values().filter(|s| !s.is_empty()).count()
    }

    fn storage_key(block_hash: &Hash) -> Vec<u8> {
        let mut key = CONTRACT_STATE_KEY_PREFIX.as_bytes().to_vec();
        key.extend_from_slice(hex::encode(block_hash).as_bytes());
        key
    }

    /// Write op storing this state as of `block_hash`
    pub fn to_batch_op(&self, block_hash: &Hash) -> Result<BatchOp> {
        Ok(BatchOp::Put(Self::storage_key(block_hash), bincode::serialize(self)?))
    }

    /// State as of `block_hash`; empty if that block never recorded any
    pub fn load_at(db: &dyn Storage, block_hash: &Hash) -> Result<Self> {
        match db.get(&Self::storage_key(block_hash))? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Ok(Self::default()),
        }
    }
}
