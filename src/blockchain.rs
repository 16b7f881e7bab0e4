//! Committed chain: tail and last irreversible block, persisted blocks, height
//! index and transaction journal.
//!
//! Every append is one storage batch carrying the block, its height entry, its
//! journal entries, the UTXO sets it touched, its contract state and the new
//! tail/LIB pointers.

use crate::config::{ChainConfig, LedgerConfig};
use crate::constants::*;
use crate::consensus::Consensus;
use crate::contract_state::ContractState;
use crate::error::{LedgerError, Result};
use crate::journal::TxJournal;
use crate::storage::{BatchOp, Storage};
use crate::transaction_pool::TransactionPool;
use crate::types::*;
use crate::utxo_cache::UtxoCache;
use crate::utxo_index::UtxoIndex;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Operational mode of the chain. Merges only start from `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockchainState {
    Init,
    Downloading,
    Sync,
    Ready,
}

fn block_key(hash: &Hash) -> Vec<u8> {
    format!("{}{}", BLOCK_KEY_PREFIX, hex::encode(hash)).into_bytes()
}

fn height_key(height: Natural) -> Vec<u8> {
    format!("{}{}", HEIGHT_KEY_PREFIX, height).into_bytes()
}

fn to_hash(bytes: &[u8]) -> Result<Hash> {
    bytes
        .try_into()
        .map_err(|_| LedgerError::Serialization(format!("expected 32-byte hash, got {} bytes", bytes.len())))
}

fn read_block(db: &dyn Storage, hash: &Hash) -> Result<Block> {
    let bytes = db
        .get(&block_key(hash))?
        .ok_or_else(|| LedgerError::BlockDoesNotExist(hex::encode(hash)))?;
    Block::deserialize(&bytes)
}

pub struct Blockchain {
    db: Arc<dyn Storage>,
    utxo_cache: Arc<UtxoCache>,
    tx_pool: Arc<TransactionPool>,
    consensus: Arc<dyn Consensus>,
    tail: RwLock<Block>,
    lib: RwLock<Block>,
    state: RwLock<BlockchainState>,
    config: ChainConfig,
    // serializes tail/LIB writers
    commit: Mutex<()>,
}

impl Blockchain {
    /// Initialize `db` with a genesis block paying `genesis_addr`.
    ///
    /// ```
    /// use ledger_core::*;
    /// use std::sync::Arc;
    ///
    /// let config = LedgerConfig::default();
    /// let chain = Blockchain::create(
    ///     &PubKeyHash(vec![0x5A; 21]),
    ///     Arc::new(MemoryStorage::new()),
    ///     Arc::new(ProofOfWork::new(0)),
    ///     Arc::new(TransactionPool::new(config.tx_pool.clone())),
    ///     &config,
    /// )
    /// .unwrap();
    /// assert_eq!(chain.get_max_height(), 0);
    /// assert_eq!(chain.get_state(), BlockchainState::Ready);
    /// ```
    pub fn create(
        genesis_addr: &PubKeyHash,
        db: Arc<dyn Storage>,
        consensus: Arc<dyn Consensus>,
        tx_pool: Arc<TransactionPool>,
        config: &LedgerConfig,
    ) -> Result<Self> {
        let genesis = Block::new_genesis(genesis_addr);
        let chain = Self::with_tail(genesis.clone(), genesis.clone(), db, consensus, tx_pool, config);

        let index = chain.get_utxo_index();
        for tx in &genesis.transactions {
            if !index.try_update_utxo(tx)? {
                return Err(LedgerError::BlockValidation("genesis transaction cannot be applied".to_string()));
            }
        }
        chain.write_block(&genesis, &index, &ContractState::new(), &genesis)?;

        chain.set_state(BlockchainState::Ready);
        info!(target: "ledger::chain", hash = %short_hash(&genesis.hash()), "created blockchain");
        Ok(chain)
    }

    /// Reopen a chain previously written by [`Blockchain::create`]
    pub fn load(
        db: Arc<dyn Storage>,
        consensus: Arc<dyn Consensus>,
        tx_pool: Arc<TransactionPool>,
        config: &LedgerConfig,
    ) -> Result<Self> {
        let tail_hash = db
            .get(TAIL_BLOCK_HASH_KEY)?
            .ok_or_else(|| LedgerError::BlockDoesNotExist("tail block".to_string()))?;
        let tail = read_block(db.as_ref(), &to_hash(&tail_hash)?)?;
        let lib = match db.get(LIB_HASH_KEY)? {
            Some(hash) => read_block(db.as_ref(), &to_hash(&hash)?)?,
            None => tail.clone(),
        };

        let chain = Self::with_tail(tail, lib, db, consensus, tx_pool, config);
        chain.set_state(BlockchainState::Ready);
        info!(
            target: "ledger::chain",
            tail = %short_hash(&chain.get_tail_block_hash()),
            height = chain.get_max_height(),
            lib_height = chain.get_lib_height(),
            "loaded blockchain"
        );
        Ok(chain)
    }

    fn with_tail(
        tail: Block,
        lib: Block,
        db: Arc<dyn Storage>,
        consensus: Arc<dyn Consensus>,
        tx_pool: Arc<TransactionPool>,
        config: &LedgerConfig,
    ) -> Self {
        Blockchain {
            utxo_cache: Arc::new(UtxoCache::new(db.clone(), config.utxo_cache_limit)),
            db,
            tx_pool,
            consensus,
            tail: RwLock::new(tail),
            lib: RwLock::new(lib),
            state: RwLock::new(BlockchainState::Init),
            config: config.chain.clone(),
            commit: Mutex::new(()),
        }
    }

    pub fn db(&self) -> &Arc<dyn Storage> {
        &self.db
    }

    pub fn consensus(&self) -> &Arc<dyn Consensus> {
        &self.consensus
    }

    pub fn tx_pool(&self) -> &Arc<TransactionPool> {
        &self.tx_pool
    }

    pub fn utxo_cache(&self) -> &Arc<UtxoCache> {
        &self.utxo_cache
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn get_state(&self) -> BlockchainState {
        *self.state.read()
    }

    pub fn set_state(&self, state: BlockchainState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous != state {
            debug!(target: "ledger::chain", ?previous, ?state, "state changed");
        }
    }

    pub fn get_tail_block_hash(&self) -> Hash {
        self.tail.read().hash()
    }

    pub fn get_tail_block(&self) -> Block {
        self.tail.read().clone()
    }

    pub fn get_max_height(&self) -> Natural {
        self.tail.read().height()
    }

    pub fn get_lib_hash(&self) -> Hash {
        self.lib.read().hash()
    }

    pub fn get_lib_height(&self) -> Natural {
        self.lib.read().height()
    }

    /// Any stored block, on the main chain or not
    pub fn get_block_by_hash(&self, hash: &Hash) -> Result<Block> {
        read_block(self.db.as_ref(), hash)
    }

    /// Main-chain block at `height`
    pub fn get_block_by_height(&self, height: Natural) -> Result<Block> {
        let missing = || LedgerError::BlockDoesNotExist(format!("height {}", height));
        if height > self.get_max_height() {
            return Err(missing());
        }
        let hash = self.db.get(&height_key(height))?.ok_or_else(missing)?;
        self.get_block_by_hash(&to_hash(&hash)?)
    }

    /// Whether `hash` is on the main chain
    pub fn is_in_blockchain(&self, hash: &Hash) -> Result<bool> {
        let block = match self.get_block_by_hash(hash) {
            Ok(block) => block,
            Err(LedgerError::BlockDoesNotExist(_)) => return Ok(false),
            Err(err) => return Err(err),
        };
        if block.height() > self.get_max_height() {
            return Ok(false);
        }
        Ok(self.db.get(&height_key(block.height()))?.as_deref() == Some(&hash[..]))
    }

    /// Fresh UTXO index over the committed state
    pub fn get_utxo_index(&self) -> UtxoIndex {
        UtxoIndex::new(self.utxo_cache.clone())
    }

    /// Committed state with every pooled transaction that still applies on top
    pub fn get_updated_utxo_index(&self) -> Result<UtxoIndex> {
        let index = self.get_utxo_index();
        for tx in self.tx_pool.get_transactions() {
            if !index.try_update_utxo(&tx)? {
                debug!(target: "ledger::chain", txid = %short_hash(&tx.id), "pooled transaction does not apply");
            }
        }
        Ok(index)
    }

    /// Blocks from the tail back to genesis
    pub fn iter(&self) -> ChainIter<'_> {
        ChainIter { db: self.db.as_ref(), next: Some(self.get_tail_block_hash()) }
    }

    /// AddBlockContextToTail: append `block`, whose effects are already applied to
    /// `utxo_index`, with the contract state as of that block.
    ///
    /// 1. The block must extend the tail
    /// 2. Block, height index, journals, UTXO sets, contract state, tail and LIB
    ///    are written in one batch
    /// 3. Transactions it mined leave the pool
    pub fn add_block_context_to_tail(
        &self,
        block: &Block,
        utxo_index: &UtxoIndex,
        contract_state: &ContractState,
    ) -> Result<()> {
        let _guard = self.commit.lock();

        // 1. Linkage
        let tail = self.get_tail_block();
        if block.prev_hash() != tail.hash() || block.height() != tail.height() + 1 {
            return Err(LedgerError::PrevHashVerifyFailed(block.height()));
        }

        // 2. Persist
        let lib = self.next_lib(block)?;
        self.write_block(block, utxo_index, contract_state, &lib)?;

        // 3. Pool
        self.tx_pool.clean_up_mined_txs(&block.transactions);

        info!(
            target: "ledger::chain",
            height = block.height(),
            hash = %short_hash(&block.hash()),
            txs = block.transactions.len(),
            lib_height = lib.height(),
            "appended block"
        );
        Ok(())
    }

    /// LIB after appending `block`; never moves backwards
    fn next_lib(&self, block: &Block) -> Result<Block> {
        let current = self.lib.read().clone();
        let height = block.height().saturating_sub(self.config.min_confirmation_num);
        if height <= current.height() {
            return Ok(current);
        }
        if height == block.height() {
            return Ok(block.clone());
        }
        self.get_block_by_height(height)
    }

    fn write_block(&self, block: &Block, utxo_index: &UtxoIndex, contract_state: &ContractState, lib: &Block) -> Result<()> {
        let hash = block.hash();
        let entries = utxo_index.entries();

        let mut ops = self.utxo_cache.batch_ops(&entries)?;
        ops.push(BatchOp::Put(block_key(&hash), block.serialize()?));
        ops.push(BatchOp::Put(height_key(block.height()), hash.to_vec()));
        for tx in &block.transactions {
            ops.push(TxJournal::new(tx).to_batch_op()?);
        }
        ops.push(contract_state.to_batch_op(&hash)?);
        ops.push(BatchOp::Put(TAIL_BLOCK_HASH_KEY.to_vec(), hash.to_vec()));
        ops.push(BatchOp::Put(LIB_HASH_KEY.to_vec(), lib.hash().to_vec()));

        if let Err(err) = self.db.write_batch(ops) {
            error!(target: "ledger::chain", %err, height = block.height(), hash = %short_hash(&hash), "failed to persist block");
            return Err(err);
        }
        self.utxo_cache.refresh(entries);
        *self.tail.write() = block.clone();
        *self.lib.write() = lib.clone();
        Ok(())
    }

    /// Rollback: move the tail back to `target`, a main-chain block at or above the LIB.
    ///
    /// The UTXO effects of the removed blocks are undone in the same batch that
    /// moves the tail. Their non-coinbase transactions return to the pool.
    /// Returns false if `target` is not a reachable rollback point.
    pub fn rollback(&self, target: &Hash) -> Result<bool> {
        let _guard = self.commit.lock();

        let tail = self.get_tail_block();
        if tail.hash() == *target {
            return Ok(true);
        }
        if !self.is_in_blockchain(target)? {
            warn!(target: "ledger::chain", target = %short_hash(target), "rollback target is not on the main chain");
            return Ok(false);
        }
        let target_block = self.get_block_by_hash(target)?;
        if target_block.height() < self.get_lib_height() {
            warn!(
                target: "ledger::chain",
                target = %short_hash(target),
                height = target_block.height(),
                lib_height = self.get_lib_height(),
                "refusing to roll back past the last irreversible block"
            );
            return Ok(false);
        }

        let index = self.get_utxo_index();
        let mut ops = Vec::new();
        let mut reverted = Vec::new();
        let mut current = tail;
        while current.hash() != *target {
            index.undo_txs_in_block(&current, self.db.as_ref())?;
            ops.push(BatchOp::Delete(height_key(current.height())));
            let prev_hash = current.prev_hash();
            reverted.push(current);
            current = self.get_block_by_hash(&prev_hash)?;
        }

        let entries = index.entries();
        let mut batch = self.utxo_cache.batch_ops(&entries)?;
        batch.extend(ops);
        batch.push(BatchOp::Put(TAIL_BLOCK_HASH_KEY.to_vec(), target.to_vec()));
        if let Err(err) = self.db.write_batch(batch) {
            error!(target: "ledger::chain", %err, target = %short_hash(target), "failed to persist rollback");
            return Err(err);
        }
        self.utxo_cache.refresh(entries);
        *self.tail.write() = target_block;

        for block in &reverted {
            for tx in &block.transactions {
                self.tx_pool.rollback(tx.clone());
            }
        }

        warn!(
            target: "ledger::chain",
            target = %short_hash(target),
            height = self.get_max_height(),
            reverted = reverted.len(),
            "rolled back chain"
        );
        Ok(true)
    }
}

/// Iterator over main-chain blocks, tail first
pub struct ChainIter<'a> {
    db: &'a dyn Storage,
    next: Option<Hash>,
}

impl Iterator for ChainIter<'_> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.next.take()?;
        match read_block(self.db, &hash) {
            Ok(block) => {
                if block.height() > 0 {
                    self.next = Some(block.prev_hash());
                }
                Some(Ok(block))
            }
            Err(err) => Some(Err(err)),
        }
    }
}
