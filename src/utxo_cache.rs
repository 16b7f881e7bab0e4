//! Bounded in-memory cache of per-address UTXO sets backed by storage

use crate::constants::UTXO_KEY_PREFIX;
use crate::error::Result;
use crate::storage::{BatchOp, Storage};
use crate::utxo::UtxoTx;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::trace;

/// LRU over `UtxoTx` keyed by address (hex public-key hash or the contract sentinel).
///
/// Writes go through to storage; evicted entries are reloaded on demand.
pub struct UtxoCache {
    cache: Mutex<LruCache<String, UtxoTx>>,
    db: Arc<dyn Storage>,
}

impl UtxoCache {
    pub fn new(db: Arc<dyn Storage>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        UtxoCache { cache: Mutex::new(LruCache::new(capacity)), db }
    }

    pub fn db(&self) -> &Arc<dyn Storage> {
        &self.db
    }

    fn storage_key(key: &str) -> Vec<u8> {
        format!("{}{}", UTXO_KEY_PREFIX, key).into_bytes()
    }

    /// Set for `key`, empty if the address owns nothing
    pub fn get_utxo_tx(&self, key: &str) -> Result<UtxoTx> {
        if let Some(hit) = self.cache.lock().get(key) {
            return Ok(hit.clone());
        }

        let utxo_tx = match self.db.get(&Self::storage_key(key))? {
            Some(bytes) => UtxoTx::deserialize(&bytes)?,
            None => UtxoTx::new(),
        };
        trace!(target: "ledger::utxo", key, size = utxo_tx.size(), "loaded utxo set from storage");

        self.cache.lock().put(key.to_string(), utxo_tx.clone());
        Ok(utxo_tx)
    }

    pub fn put_utxo_tx(&self, key: &str, utxo_tx: &UtxoTx) -> Result<()> {
        self.put_batch(vec![(key.to_string(), utxo_tx.clone())])
    }

    /// Write several sets in one storage batch, then refresh the cache
    pub fn put_batch(&self, entries: Vec<(String, UtxoTx)>) -> Result<()> {
        let ops = self.batch_ops(&entries)?;
        self.db.write_batch(ops)?;
        self.refresh(entries);
        Ok(())
    }

    /// Storage writes persisting `entries`; empty sets are deleted
    pub fn batch_ops(&self, entries: &[(String, UtxoTx)]) -> Result<Vec<BatchOp>> {
        let mut ops = Vec::with_capacity(entries.len());
        for (key, utxo_tx) in entries {
            if utxo_tx.is_empty() {
                ops.push(BatchOp::Delete(Self::storage_key(key)));
            } else {
                ops.push(BatchOp::Put(Self::storage_key(key), utxo_tx.serialize()?));
            }
        }
        Ok(ops)
    }

    /// Replace cached sets after their batch has been written
    pub fn refresh(&self, entries: Vec<(String, UtxoTx)>) {
        let mut cache = self.cache.lock();
        for (key, utxo_tx) in entries {
            cache.put(key, utxo_tx);
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::types::*;
    use crate::utxo::{Utxo, UtxoType};

    fn create_test_set(seed: u8) -> UtxoTx {
        let mut set = UtxoTx::new();
        let output = TxOutput::new(Amount::from(seed as u32 + 1), PubKeyHash(vec![0x5A, seed]));
        set.put_utxo(Utxo::new(output, [seed; 32], 0, UtxoType::Normal));
        set
    }

    #[test]
    fn test_missing_address_is_empty() {
        let cache = UtxoCache::new(Arc::new(MemoryStorage::new()), 4);
        assert!(cache.get_utxo_tx("nobody").unwrap().is_empty());
    }

    #[test]
    fn test_write_through_and_reload_after_eviction() {
        let db = Arc::new(MemoryStorage::new());
        let cache = UtxoCache::new(db.clone(), 1);

        cache.put_utxo_tx("a", &create_test_set(1)).unwrap();
        cache.put_utxo_tx("b", &create_test_set(2)).unwrap();
        assert_eq!(cache.cached_len(), 1);

        // "a" was evicted but still lives in storage
        assert_eq!(cache.get_utxo_tx("a").unwrap(), create_test_set(1));
        assert_eq!(db.len(), 2);
    }

    #[test]
    fn test_empty_set_deletes_storage_entry() {
        let db = Arc::new(MemoryStorage::new());
        let cache = UtxoCache::new(db.clone(), 4);
        cache.put_utxo_tx("a", &create_test_set(1)).unwrap();
        cache.put_utxo_tx("a", &UtxoTx::new()).unwrap();
        assert!(db.is_empty());
        assert!(cache.get_utxo_tx("a").unwrap().is_empty());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = UtxoCache::new(Arc::new(MemoryStorage::new()), 0);
        cache.put_utxo_tx("a", &create_test_set(1)).unwrap();
        assert_eq!(cache.cached_len(), 1);
    }
}
