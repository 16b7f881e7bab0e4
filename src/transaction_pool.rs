//! Transaction pool: pending transactions ordered by tip per byte.
//!
//! A transaction spending the output of another pooled transaction is a child of
//! it. Only transactions without pooled parents sit in the tip order; children
//! enter it when their last pooled parent leaves, so block producers always
//! pull parents before children.

use crate::config::TxPoolConfig;
use crate::constants::TX_POOL_KEY;
use crate::error::{LedgerError, Result};
use crate::storage::Storage;
use crate::transaction::{check_transaction, verify_transaction};
use crate::types::*;
use crate::utxo::utxo_key;
use crate::utxo_index::UtxoIndex;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap, HashSet};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct TipKey {
    rate: Amount,
    id: Hash,
}

#[derive(Debug, Clone)]
struct TxNode {
    tx: Transaction,
    size: usize,
    rate: Amount,
    /// Output index -> pooled transaction spending it
    children: BTreeMap<i32, Hash>,
    /// Pooled transactions this one spends from
    parents: HashSet<Hash>,
}

impl TxNode {
    fn key(&self) -> TipKey {
        TipKey { rate: self.rate.clone(), id: self.tx.id }
    }
}

#[derive(Debug, Default)]
struct PoolInner {
    txs: HashMap<Hash, TxNode>,
    tip_order: BTreeSet<TipKey>,
    /// `txid:index` -> pooled transaction spending it
    spent: HashMap<String, Hash>,
    size_bytes: usize,
}

impl PoolInner {
    fn insert(&mut self, tx: Transaction) {
        let id = tx.id;
        let size = tx.size();
        let rate = tx.tips_per_byte();

        let mut parents = HashSet::new();
        for vin in &tx.vin {
            let parent_id: Option<Hash> = vin.txid.as_slice().try_into().ok();
            if let Some(parent) = parent_id.and_then(|p| self.txs.get_mut(&p)) {
                parent.children.insert(vin.vout, id);
                parents.insert(parent.tx.id);
            }
            self.spent.insert(utxo_key(&vin.txid, vin.vout), id);
        }

        // children that arrived before their parent
        let mut children = BTreeMap::new();
        for index in 0..tx.vout.len() as i32 {
            let Some(child_id) = self.spent.get(&utxo_key(&id, index)).copied() else {
                continue;
            };
            if let Some(child) = self.txs.get_mut(&child_id) {
                child.parents.insert(id);
                let key = child.key();
                self.tip_order.remove(&key);
                children.insert(index, child_id);
            }
        }

        let node = TxNode { tx, size, rate, children, parents };
        if node.parents.is_empty() {
            self.tip_order.insert(node.key());
        }
        self.size_bytes += size;
        self.txs.insert(id, node);
    }

    /// Remove one transaction; children whose last pooled parent it was become selectable
    fn remove_entry(&mut self, id: &Hash) -> Option<TxNode> {
        let node = self.txs.remove(id)?;
        self.tip_order.remove(&node.key());
        self.size_bytes -= node.size;

        for vin in &node.tx.vin {
            let key = utxo_key(&vin.txid, vin.vout);
            if self.spent.get(&key) == Some(id) {
                self.spent.remove(&key);
            }
        }
        for parent in &node.parents {
            if let Some(parent_node) = self.txs.get_mut(parent) {
                parent_node.children.retain(|_, child| child != id);
            }
        }
        for child in node.children.values() {
            if let Some(child_node) = self.txs.get_mut(child) {
                child_node.parents.remove(id);
                if child_node.parents.is_empty() {
                    let key = child_node.key();
                    self.tip_order.insert(key);
                }
            }
        }
        Some(node)
    }

    /// `id` and every pooled transaction spending from it, parents before children
    fn descendants(&self, id: &Hash) -> Vec<Hash> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![*id];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            if let Some(node) = self.txs.get(&current) {
                out.push(current);
                stack.extend(node.children.values().copied());
            }
        }
        out
    }

    fn remove_with_descendants(&mut self, id: &Hash) -> Vec<Hash> {
        let doomed = self.descendants(id);
        for hash in doomed.iter().rev() {
            self.remove_entry(hash);
        }
        doomed
    }

    fn conflicts_of(&self, tx: &Transaction) -> Vec<Hash> {
        let mut out: Vec<Hash> = tx
            .vin
            .iter()
            .filter_map(|vin| self.spent.get(&utxo_key(&vin.txid, vin.vout)).copied())
            .filter(|spender| *spender != tx.id)
            .collect();
        out.sort();
        out.dedup();
        out
    }

    fn over_budget(&self, incoming: usize, config: &TxPoolConfig) -> bool {
        self.size_bytes + incoming > config.max_size_bytes || self.txs.len() + 1 > config.max_count
    }
}

/// Shared pending-transaction pool. Every operation runs under one mutex.
#[derive(Debug)]
pub struct TransactionPool {
    inner: Mutex<PoolInner>,
    config: TxPoolConfig,
}

impl TransactionPool {
    pub fn new(config: TxPoolConfig) -> Self {
        TransactionPool { inner: Mutex::new(PoolInner::default()), config }
    }

    pub fn config(&self) -> &TxPoolConfig {
        &self.config
    }

    /// Push: admit a transaction.
    ///
    /// 1. Coinbases, malformed transactions and duplicates are refused
    /// 2. A transaction spending an output another pooled transaction spends is refused
    /// 3. If the budget is exceeded, lower-rate transactions (with their
    ///    descendants) are evicted; if the newcomer has the lowest rate, or
    ///    spends from a transaction that would be evicted, it is refused
    pub fn push(&self, tx: Transaction) -> Result<()> {
        // 1. Structure
        if tx.is_coinbase() {
            return Err(LedgerError::PoolRejected("coinbase transaction".to_string()));
        }
        if let ValidationResult::Invalid(reason) = check_transaction(&tx) {
            return Err(LedgerError::PoolRejected(reason));
        }

        let mut inner = self.inner.lock();
        if inner.txs.contains_key(&tx.id) {
            return Err(LedgerError::PoolRejected("already in pool".to_string()));
        }

        // 2. Conflicts
        if let Some(conflict) = inner.conflicts_of(&tx).first() {
            return Err(LedgerError::PoolRejected(format!(
                "double spend with pooled transaction {}",
                short_hash(conflict)
            )));
        }

        // 3. Budget
        let size = tx.size();
        if size > self.config.max_size_bytes {
            return Err(LedgerError::PoolRejected(format!("transaction of {} bytes exceeds pool", size)));
        }
        let rate = tx.tips_per_byte();
        while inner.over_budget(size, &self.config) {
            let lowest = match inner.tip_order.first() {
                Some(lowest) if lowest.rate < rate => lowest.clone(),
                _ => return Err(LedgerError::PoolRejected("pool is full".to_string())),
            };
            let doomed = inner.descendants(&lowest.id);
            let spends_doomed = tx
                .vin
                .iter()
                .any(|vin| doomed.iter().any(|id| vin.txid.as_slice() == id.as_slice()));
            if spends_doomed {
                return Err(LedgerError::PoolRejected(format!(
                    "pool is full and eviction would remove its parent {}",
                    short_hash(&lowest.id)
                )));
            }
            let evicted = inner.remove_with_descendants(&lowest.id);
            warn!(target: "ledger::txpool", txid = %short_hash(&lowest.id), evicted = evicted.len(), "evicted lowest tip transaction");
        }

        trace!(target: "ledger::txpool", txid = %short_hash(&tx.id), size, %rate, "pushed transaction");
        inner.insert(tx);
        Ok(())
    }

    /// PopTransactionWithMostTips: remove and return the best selectable transaction
    /// whose inputs all exist in `utxo_index`.
    ///
    /// Candidates whose inputs are not there yet stay pooled and are skipped;
    /// candidates that fail verification otherwise are dropped with their
    /// descendants. The caller applies each returned transaction to its index
    /// before popping again.
    pub fn pop_transaction_with_most_tips(&self, utxo_index: &UtxoIndex) -> Result<Option<Transaction>> {
        let mut inner = self.inner.lock();
        let mut cursor: Option<TipKey> = None;

        loop {
            let candidate = match &cursor {
                None => inner.tip_order.last().cloned(),
                Some(below) => inner.tip_order.range(..below.clone()).next_back().cloned(),
            };
            let Some(key) = candidate else {
                return Ok(None);
            };
            let Some(tx) = inner.txs.get(&key.id).map(|n| n.tx.clone()) else {
                inner.tip_order.remove(&key);
                continue;
            };

            match verify_transaction(&tx, utxo_index) {
                Ok(ValidationResult::Valid) => {
                    inner.remove_entry(&key.id);
                    trace!(target: "ledger::txpool", txid = %short_hash(&key.id), rate = %key.rate, "popped transaction");
                    return Ok(Some(tx));
                }
                Ok(ValidationResult::Invalid(reason)) => {
                    let dropped = inner.remove_with_descendants(&key.id);
                    warn!(target: "ledger::txpool", txid = %short_hash(&key.id), %reason, dropped = dropped.len(), "dropping invalid transaction");
                }
                Err(LedgerError::TxInputNotFound(input)) => {
                    debug!(target: "ledger::txpool", txid = %short_hash(&key.id), %input, "inputs not available yet");
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    let dropped = inner.remove_with_descendants(&key.id);
                    warn!(target: "ledger::txpool", txid = %short_hash(&key.id), %err, dropped = dropped.len(), "dropping invalid transaction");
                }
            }
            cursor = Some(key);
        }
    }

    /// CleanUpMinedTxs: forget committed transactions and evict pooled ones that
    /// conflict with them
    pub fn clean_up_mined_txs(&self, txs: &[Transaction]) {
        let mut inner = self.inner.lock();
        let before = inner.txs.len();
        for tx in txs.iter().filter(|tx| !tx.is_coinbase()) {
            inner.remove_entry(&tx.id);
            for conflict in inner.conflicts_of(tx) {
                let evicted = inner.remove_with_descendants(&conflict);
                debug!(target: "ledger::txpool", txid = %short_hash(&conflict), evicted = evicted.len(), "evicted transaction conflicting with block");
            }
        }
        trace!(target: "ledger::txpool", removed = before - inner.txs.len(), remaining = inner.txs.len(), "cleaned mined transactions");
    }

    /// Rollback: re-admit a transaction from a block that left the main chain.
    ///
    /// It takes precedence over pooled transactions spending the same outputs.
    pub fn rollback(&self, tx: Transaction) {
        if tx.is_coinbase() {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.txs.contains_key(&tx.id) {
            return;
        }
        for conflict in inner.conflicts_of(&tx) {
            inner.remove_with_descendants(&conflict);
        }
        let id = tx.id;
        inner.insert(tx);

        while inner.over_budget(0, &self.config) && inner.txs.len() > 1 {
            let Some(lowest) = inner.tip_order.first().cloned() else {
                break;
            };
            inner.remove_with_descendants(&lowest.id);
        }
        trace!(target: "ledger::txpool", txid = %short_hash(&id), "rolled back transaction into pool");
    }

    /// Remove a transaction and everything spending from it
    pub fn remove_transaction(&self, id: &Hash) -> Vec<Hash> {
        self.inner.lock().remove_with_descendants(id)
    }

    /// All pooled transactions, best rate first, parents always before children
    pub fn get_transactions(&self) -> Vec<Transaction> {
        let inner = self.inner.lock();
        let mut pending: HashMap<Hash, usize> = inner
            .txs
            .iter()
            .map(|(id, node)| (*id, node.parents.len()))
            .collect();
        let mut ready: BinaryHeap<TipKey> = inner.tip_order.iter().cloned().collect();
        let mut out = Vec::with_capacity(inner.txs.len());

        while let Some(key) = ready.pop() {
            let Some(node) = inner.txs.get(&key.id) else {
                continue;
            };
            out.push(node.tx.clone());
            for child in node.children.values() {
                if let Some(count) = pending.get_mut(child) {
                    *count -= 1;
                    if *count == 0 {
                        if let Some(child_node) = inner.txs.get(child) {
                            ready.push(child_node.key());
                        }
                    }
                }
            }
        }
        out
    }

    pub fn get_transaction(&self, id: &Hash) -> Option<Transaction> {
        self.inner.lock().txs.get(id).map(|n| n.tx.clone())
    }

    pub fn contains(&self, id: &Hash) -> bool {
        self.inner.lock().txs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().txs.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.inner.lock().size_bytes
    }

    /// Persist the pool in dependency order
    pub fn save(&self, db: &dyn Storage) -> Result<()> {
        let txs = self.get_transactions();
        db.put(TX_POOL_KEY, &bincode::serialize(&txs)?)
    }

    /// Rebuild a pool saved with [`TransactionPool::save`]
    pub fn load(db: &dyn Storage, config: TxPoolConfig) -> Result<Self> {
        let pool = TransactionPool::new(config);
        if let Some(bytes) = db.get(TX_POOL_KEY)? {
            let txs: Vec<Transaction> = bincode::deserialize(&bytes)?;
            for tx in txs {
                let id = tx.id;
                if let Err(err) = pool.push(tx) {
                    warn!(target: "ledger::txpool", txid = %short_hash(&id), %err, "skipping saved transaction");
                }
            }
        }
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::storage::MemoryStorage;
    use crate::transaction::SendTxParams;
    use crate::utxo::Utxo;
    use crate::utxo_cache::UtxoCache;
    use std::sync::Arc;

    fn create_test_keypair(seed: u8) -> KeyPair {
        KeyPair::from_secret_bytes(&[seed; 32]).unwrap()
    }

    fn create_test_index(owner: &KeyPair, coins: &[u64]) -> UtxoIndex {
        let index = UtxoIndex::new(Arc::new(UtxoCache::new(Arc::new(MemoryStorage::new()), 16)));
        for (height, value) in coins.iter().enumerate() {
            let coinbase = Transaction::new_coinbase(&owner.pub_key_hash().unwrap(), height as u64, Amount::from(*value));
            assert!(index.update_utxo(&coinbase));
        }
        index
    }

    fn spend(from: &KeyPair, utxo: &Utxo, amount: u64, tip: u64) -> Transaction {
        let params = SendTxParams::new(from, from.pub_key_hash().unwrap(), Amount::from(amount), Amount::from(tip));
        Transaction::new_utxo_transaction(std::slice::from_ref(utxo), params).unwrap()
    }

    fn output_of(tx: &Transaction, index: i32) -> Utxo {
        Utxo::new(tx.vout[index as usize].clone(), tx.id, index, crate::utxo::UtxoType::Normal)
    }

    fn owned(index: &UtxoIndex, owner: &KeyPair) -> Vec<Utxo> {
        index
            .get_all_utxos_by_pub_key_hash(&owner.pub_key_hash().unwrap())
            .unwrap()
            .sorted()
            .into_iter()
            .cloned()
            .collect()
    }

    fn create_test_pool() -> TransactionPool {
        TransactionPool::new(TxPoolConfig::default())
    }

    #[test]
    fn test_pop_highest_rate_first() {
        let alice = create_test_keypair(1);
        let index = create_test_index(&alice, &[1000, 1000, 1000]);
        let coins = owned(&index, &alice);
        let pool = create_test_pool();

        let low = spend(&alice, &coins[0], 10, 1);
        let high = spend(&alice, &coins[1], 10, 50);
        let mid = spend(&alice, &coins[2], 10, 20);
        for tx in [&low, &high, &mid] {
            pool.push(tx.clone()).unwrap();
        }

        let order: Vec<Hash> = std::iter::from_fn(|| pool.pop_transaction_with_most_tips(&index).unwrap())
            .map(|tx| tx.id)
            .collect();
        assert_eq!(order, vec![high.id, mid.id, low.id]);
        assert!(pool.is_empty());
        assert_eq!(pool.size_bytes(), 0);
    }

    #[test]
    fn test_parent_popped_before_richer_child() {
        let alice = create_test_keypair(1);
        let index = create_test_index(&alice, &[1000]);
        let coin = owned(&index, &alice).remove(0);
        let pool = create_test_pool();

        let parent = spend(&alice, &coin, 500, 1);
        let child = spend(&alice, &output_of(&parent, 0), 100, 100);
        pool.push(parent.clone()).unwrap();
        pool.push(child.clone()).unwrap();

        let first = pool.pop_transaction_with_most_tips(&index).unwrap().unwrap();
        assert_eq!(first.id, parent.id);
        assert!(index.update_utxo(&first));

        let second = pool.pop_transaction_with_most_tips(&index).unwrap().unwrap();
        assert_eq!(second.id, child.id);
    }

    #[test]
    fn test_child_arriving_first_is_reparented() {
        let alice = create_test_keypair(1);
        let index = create_test_index(&alice, &[1000]);
        let coin = owned(&index, &alice).remove(0);
        let pool = create_test_pool();

        let parent = spend(&alice, &coin, 500, 1);
        let child = spend(&alice, &output_of(&parent, 0), 100, 100);
        pool.push(child.clone()).unwrap();
        pool.push(parent.clone()).unwrap();

        let ids: Vec<Hash> = pool.get_transactions().iter().map(|tx| tx.id).collect();
        assert_eq!(ids, vec![parent.id, child.id]);
        assert_eq!(pool.pop_transaction_with_most_tips(&index).unwrap().unwrap().id, parent.id);
    }

    #[test]
    fn test_unavailable_inputs_are_skipped_not_dropped() {
        let alice = create_test_keypair(1);
        let index = create_test_index(&alice, &[1000]);
        let coin = owned(&index, &alice).remove(0);
        let pool = create_test_pool();

        // spends an output of a transaction that is neither pooled nor committed
        let ghost = spend(&alice, &coin, 500, 1);
        let orphan = spend(&alice, &output_of(&ghost, 0), 100, 100);
        pool.push(orphan.clone()).unwrap();

        assert!(pool.pop_transaction_with_most_tips(&index).unwrap().is_none());
        assert!(pool.contains(&orphan.id));
    }

    #[test]
    fn test_invalid_transaction_dropped_on_pop() {
        let alice = create_test_keypair(1);
        let mallory = create_test_keypair(2);
        let index = create_test_index(&alice, &[1000]);
        let coin = owned(&index, &alice).remove(0);
        let pool = create_test_pool();

        let mut forged = spend(&alice, &coin, 10, 5);
        forged.sign(&mallory, std::slice::from_ref(&coin)).unwrap();
        pool.push(forged.clone()).unwrap();

        assert!(pool.pop_transaction_with_most_tips(&index).unwrap().is_none());
        assert!(!pool.contains(&forged.id));
    }

    #[test]
    fn test_push_rejects_duplicates_conflicts_and_coinbase() {
        let alice = create_test_keypair(1);
        let index = create_test_index(&alice, &[1000]);
        let coin = owned(&index, &alice).remove(0);
        let pool = create_test_pool();

        let tx = spend(&alice, &coin, 10, 1);
        pool.push(tx.clone()).unwrap();
        assert!(matches!(pool.push(tx), Err(LedgerError::PoolRejected(_))));

        let rival = spend(&alice, &coin, 20, 1);
        assert!(matches!(pool.push(rival), Err(LedgerError::PoolRejected(_))));

        let coinbase = Transaction::new_coinbase(&alice.pub_key_hash().unwrap(), 9, Amount::from(1u32));
        assert!(matches!(pool.push(coinbase), Err(LedgerError::PoolRejected(_))));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_full_pool_evicts_lowest_rate() {
        let alice = create_test_keypair(1);
        let index = create_test_index(&alice, &[1000, 1000, 1000]);
        let coins = owned(&index, &alice);
        let pool = TransactionPool::new(TxPoolConfig { max_size_bytes: 1 << 20, max_count: 2 });

        let low = spend(&alice, &coins[0], 10, 1);
        let mid = spend(&alice, &coins[1], 10, 20);
        let high = spend(&alice, &coins[2], 10, 50);
        pool.push(low.clone()).unwrap();
        pool.push(mid.clone()).unwrap();
        pool.push(high.clone()).unwrap();

        assert!(!pool.contains(&low.id));
        assert!(pool.contains(&mid.id) && pool.contains(&high.id));
    }

    #[test]
    fn test_full_pool_refuses_lower_rate() {
        let alice = create_test_keypair(1);
        let index = create_test_index(&alice, &[1000, 1000]);
        let coins = owned(&index, &alice);
        let pool = TransactionPool::new(TxPoolConfig { max_size_bytes: 1 << 20, max_count: 1 });

        pool.push(spend(&alice, &coins[0], 10, 50)).unwrap();
        let result = pool.push(spend(&alice, &coins[1], 10, 1));
        assert!(matches!(result, Err(LedgerError::PoolRejected(_))));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_eviction_takes_descendants() {
        let alice = create_test_keypair(1);
        let index = create_test_index(&alice, &[1000, 1000]);
        let coins = owned(&index, &alice);
        let pool = TransactionPool::new(TxPoolConfig { max_size_bytes: 1 << 20, max_count: 2 });

        let parent = spend(&alice, &coins[0], 500, 1);
        let child = spend(&alice, &output_of(&parent, 0), 100, 100);
        pool.push(parent.clone()).unwrap();
        pool.push(child.clone()).unwrap();

        let rich = spend(&alice, &coins[1], 10, 90);
        pool.push(rich.clone()).unwrap();
        assert!(!pool.contains(&parent.id));
        assert!(!pool.contains(&child.id));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_full_pool_never_evicts_newcomers_parent() {
        let alice = create_test_keypair(1);
        let index = create_test_index(&alice, &[1000, 1000]);
        let coins = owned(&index, &alice);
        let pool = TransactionPool::new(TxPoolConfig { max_size_bytes: 1 << 20, max_count: 2 });

        let parent = spend(&alice, &coins[0], 500, 1);
        let other = spend(&alice, &coins[1], 10, 20);
        pool.push(parent.clone()).unwrap();
        pool.push(other.clone()).unwrap();

        // the child outbids everything, but its parent is the lowest root
        let child = spend(&alice, &output_of(&parent, 0), 100, 100);
        assert!(matches!(pool.push(child.clone()), Err(LedgerError::PoolRejected(_))));
        assert!(pool.contains(&parent.id));
        assert!(pool.contains(&other.id));
        assert!(!pool.contains(&child.id));

        let popped: Vec<Hash> = std::iter::from_fn(|| pool.pop_transaction_with_most_tips(&index).unwrap())
            .map(|tx| tx.id)
            .collect();
        assert_eq!(popped, vec![other.id, parent.id]);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_clean_up_mined_txs() {
        let alice = create_test_keypair(1);
        let index = create_test_index(&alice, &[1000, 1000]);
        let coins = owned(&index, &alice);
        let pool = create_test_pool();

        let parent = spend(&alice, &coins[0], 500, 1);
        let child = spend(&alice, &output_of(&parent, 0), 100, 100);
        let pooled_rival = spend(&alice, &coins[1], 10, 5);
        pool.push(parent.clone()).unwrap();
        pool.push(child.clone()).unwrap();
        pool.push(pooled_rival.clone()).unwrap();

        // a block mines `parent` and a different spend of coins[1]
        let mined_rival = spend(&alice, &coins[1], 20, 5);
        pool.clean_up_mined_txs(&[parent.clone(), mined_rival]);

        assert!(!pool.contains(&parent.id));
        assert!(!pool.contains(&pooled_rival.id));
        assert_eq!(pool.get_transactions(), vec![child]);
    }

    #[test]
    fn test_rollback_reinstates_parent_of_pooled_child() {
        let alice = create_test_keypair(1);
        let index = create_test_index(&alice, &[1000]);
        let coin = owned(&index, &alice).remove(0);
        let pool = create_test_pool();

        let parent = spend(&alice, &coin, 500, 1);
        let child = spend(&alice, &output_of(&parent, 0), 100, 100);
        pool.push(child.clone()).unwrap();

        pool.rollback(parent.clone());
        let ids: Vec<Hash> = pool.get_transactions().iter().map(|tx| tx.id).collect();
        assert_eq!(ids, vec![parent.id, child.id]);
    }

    #[test]
    fn test_save_and_load() {
        let alice = create_test_keypair(1);
        let index = create_test_index(&alice, &[1000]);
        let coin = owned(&index, &alice).remove(0);
        let pool = create_test_pool();
        let parent = spend(&alice, &coin, 500, 1);
        let child = spend(&alice, &output_of(&parent, 0), 100, 100);
        pool.push(parent.clone()).unwrap();
        pool.push(child.clone()).unwrap();

        let db = MemoryStorage::new();
        pool.save(&db).unwrap();
        let loaded = TransactionPool::load(&db, TxPoolConfig::default()).unwrap();
        assert_eq!(loaded.get_transactions(), vec![parent, child]);
        assert_eq!(loaded.size_bytes(), pool.size_bytes());
    }
}
