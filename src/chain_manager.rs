//! Chain manager: admits network blocks, caches forks and switches the main
//! chain to a longer valid fork.
//!
//! At most one merge runs at a time. A merge first verifies the whole fork
//! against a UTXO snapshot reverted to the attachment point; only if every block
//! passes is the live chain rolled back and the fork appended.

use crate::block::verify_block_transactions;
use crate::block_pool::BlockPool;
use crate::blockchain::{Blockchain, BlockchainState};
use crate::config::{ChainConfig, LedgerConfig};
use crate::contract_state::ContractState;
use crate::error::{LedgerError, Result};
use crate::network::{Network, PeerId};
use crate::types::*;
use crate::utxo_index::UtxoIndex;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// What [`ChainManager::push`] did with a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The block's fork became the main chain
    Merged { tail: Hash, height: Natural },
    /// Cached; its fork is attached but not longer than the main chain
    Cached,
    /// Cached; the missing ancestor was requested from the peer
    RequestedParent(Hash),
    /// Too far ahead; a bulk download was requested instead
    DownloadRequested,
    /// Cached; a merge is already running or the chain is not ready
    Deferred,
    /// Already known
    Ignored,
    Rejected(String),
}

pub struct ChainManager {
    blockchain: Arc<Blockchain>,
    block_pool: BlockPool,
    network: Arc<dyn Network>,
    config: ChainConfig,
    merge_lock: Mutex<()>,
}

impl ChainManager {
    pub fn new(blockchain: Arc<Blockchain>, network: Arc<dyn Network>, config: &LedgerConfig) -> Self {
        ChainManager {
            blockchain,
            block_pool: BlockPool::new(config.block_pool.clone()),
            network,
            config: config.chain.clone(),
            merge_lock: Mutex::new(()),
        }
    }

    pub fn blockchain(&self) -> &Arc<Blockchain> {
        &self.blockchain
    }

    pub fn block_pool(&self) -> &BlockPool {
        &self.block_pool
    }

    pub fn get_state(&self) -> BlockchainState {
        self.blockchain.get_state()
    }

    pub fn set_state(&self, state: BlockchainState) {
        self.blockchain.set_state(state)
    }

    /// Proof and seal check; never fails the caller
    pub fn verify_block(&self, block: &Block) -> ValidationResult {
        if !block.verify_hash() {
            return ValidationResult::Invalid("block hash does not match contents".to_string());
        }
        if !self.blockchain.consensus().validate(block) {
            return ValidationResult::Invalid("consensus validation failed".to_string());
        }
        ValidationResult::Valid
    }

    /// Push: entry point for a block delivered by `peer`.
    ///
    /// 1. Blocks failing the seal or consensus check are rejected
    /// 2. Blocks far above the tail trigger a download request instead
    /// 3. The block is cached in the fork tree
    /// 4. If the fork does not attach to the main chain, its missing parent is requested
    /// 5. Otherwise the longest branch of the fork is merged if it beats the tail
    ///
    /// `Err` is returned only for storage failures; the chain then stays in `Sync`.
    pub fn push(&self, block: Block, peer: &PeerId) -> Result<PushOutcome> {
        let hash = block.hash();
        let height = block.height();

        // 1. Proof
        if let ValidationResult::Invalid(reason) = self.verify_block(&block) {
            warn!(target: "ledger::chain", hash = %short_hash(&hash), height, %peer, %reason, "rejected block");
            return Ok(PushOutcome::Rejected(reason));
        }
        if self.blockchain.is_in_blockchain(&hash)? {
            trace!(target: "ledger::chain", hash = %short_hash(&hash), "block already on chain");
            return Ok(PushOutcome::Ignored);
        }

        // 2. Height gap
        let max_height = self.blockchain.get_max_height();
        if height >= max_height.saturating_add(self.config.height_diff_threshold) {
            info!(target: "ledger::chain", height, max_height, %peer, "block far ahead of tail, requesting download");
            self.network.request_download(peer);
            return Ok(PushOutcome::DownloadRequested);
        }

        // 3. Cache
        let Some(attach) = self.block_pool.cache_block(block, max_height) else {
            return Ok(PushOutcome::Ignored);
        };

        // 4. Attachment
        if !self.blockchain.is_in_blockchain(&attach)? {
            debug!(target: "ledger::chain", hash = %short_hash(&hash), parent = %short_hash(&attach), %peer, "requesting missing parent");
            self.network.request_previous_block(&attach, peer);
            return Ok(PushOutcome::RequestedParent(attach));
        }

        // 5. Merge
        let head = self
            .block_pool
            .fork_root(&hash)
            .and_then(|root| self.block_pool.longest_fork_head(&root))
            .unwrap_or(hash);
        self.try_merge(&head)
    }

    /// Merge every cached fork that attaches to the main chain and beats the
    /// tail, e.g. after the chain returns to `Ready`. Returns the final tail hash
    /// if any fork was merged.
    pub fn merge_pending(&self) -> Result<Option<Hash>> {
        let mut merged = None;
        while let Some(tail) = self.merge_next_pending()? {
            merged = Some(tail);
        }
        Ok(merged)
    }

    /// One pass over the fork heads, highest first, stopping at the first merge.
    /// Rejected forks are dropped and the pass moves on to the next head.
    fn merge_next_pending(&self) -> Result<Option<Hash>> {
        let max_height = self.blockchain.get_max_height();
        for head in self.block_pool.fork_heads() {
            let Some(block) = self.block_pool.get_block(&head) else {
                continue;
            };
            if block.height() <= max_height {
                break;
            }
            let attach = self
                .block_pool
                .fork_root(&head)
                .and_then(|root| self.block_pool.get_block(&root))
                .map(|root| root.prev_hash());
            match attach {
                Some(attach) if self.blockchain.is_in_blockchain(&attach)? => {}
                _ => continue,
            }
            match self.merge_once(&head)? {
                PushOutcome::Merged { tail, .. } => return Ok(Some(tail)),
                // another caller holds the merge and drains after it
                PushOutcome::Deferred => return Ok(None),
                _ => continue,
            }
        }
        Ok(None)
    }

    /// Merge the fork ending at `head`, then pick up forks whose merge was
    /// deferred while this one ran
    fn try_merge(&self, head: &Hash) -> Result<PushOutcome> {
        let outcome = self.merge_once(head)?;
        match outcome {
            PushOutcome::Merged { .. } => match self.merge_pending()? {
                Some(tail) => Ok(PushOutcome::Merged { tail, height: self.blockchain.get_max_height() }),
                None => Ok(outcome),
            },
            PushOutcome::Rejected(_) => {
                self.merge_pending()?;
                Ok(outcome)
            }
            _ => Ok(outcome),
        }
    }

    fn merge_once(&self, head: &Hash) -> Result<PushOutcome> {
        if self.get_state() != BlockchainState::Ready {
            debug!(target: "ledger::chain", head = %short_hash(head), state = ?self.get_state(), "chain not ready, deferring merge");
            return Ok(PushOutcome::Deferred);
        }
        let Some(_guard) = self.merge_lock.try_lock() else {
            debug!(target: "ledger::chain", head = %short_hash(head), "merge in progress, deferring");
            return Ok(PushOutcome::Deferred);
        };

        let max_height = self.blockchain.get_max_height();
        let fork = self.block_pool.generate_fork_blocks(head, max_height);
        let Some(attach) = fork.last().map(Block::prev_hash) else {
            return Ok(PushOutcome::Cached);
        };

        self.set_state(BlockchainState::Sync);
        match self.merge_fork(&fork, &attach) {
            Ok(()) => {
                self.block_pool.clean_cache(head);
                self.block_pool.prune(self.blockchain.get_max_height());
                self.set_state(BlockchainState::Ready);
                let tail = self.blockchain.get_tail_block_hash();
                let height = self.blockchain.get_max_height();
                info!(target: "ledger::chain", tail = %short_hash(&tail), height, blocks = fork.len(), "merged fork");
                Ok(PushOutcome::Merged { tail, height })
            }
            Err(err) if err.is_fatal() => {
                error!(target: "ledger::chain", %err, head = %short_hash(head), "merge failed on storage, halting block acceptance");
                Err(err)
            }
            Err(err) => {
                let dropped = self.block_pool.remove_fork(head);
                self.set_state(BlockchainState::Ready);
                warn!(target: "ledger::chain", %err, head = %short_hash(head), dropped, "rejected fork");
                Ok(PushOutcome::Rejected(err.to_string()))
            }
        }
    }

    /// MergeFork: switch the main chain to `fork` (head first), which attaches at `attach`.
    ///
    /// 1. Rebuild UTXO and contract state as of `attach`
    /// 2. Verify the fork root-to-head against that snapshot
    /// 3. Roll the live chain back to `attach`
    /// 4. Append the fork block by block
    ///
    /// Nothing is written unless step 2 passes.
    pub fn merge_fork(&self, fork: &[Block], attach: &Hash) -> Result<()> {
        let parent = self.blockchain.get_block_by_hash(attach)?;
        if parent.height() < self.blockchain.get_lib_height() {
            return Err(LedgerError::BlockValidation(format!(
                "fork attaches at height {} below last irreversible block {}",
                parent.height(),
                self.blockchain.get_lib_height()
            )));
        }
        let blocks: Vec<Block> = fork.iter().rev().cloned().collect();

        // 1. Snapshot
        let (snapshot, contract_state) = self.revert_utxo_and_state_at_block_hash(attach)?;

        // 2. Verify
        if let ValidationResult::Invalid(reason) =
            self.verify_transactions(&snapshot, &contract_state, &blocks, &parent)?
        {
            return Err(LedgerError::TransactionVerifyFailed(reason));
        }

        // 3. Rollback
        if !self.blockchain.rollback(attach)? {
            return Err(LedgerError::BlockValidation(format!(
                "cannot roll back to {}",
                short_hash(attach)
            )));
        }

        // 4. Replay
        let live = self.blockchain.get_utxo_index();
        for block in &blocks {
            for tx in &block.transactions {
                if !live.try_update_utxo(tx)? {
                    return Err(LedgerError::TransactionVerifyFailed(format!(
                        "transaction {} of verified block {} no longer applies",
                        short_hash(&tx.id),
                        short_hash(&block.hash())
                    )));
                }
            }
            self.blockchain.add_block_context_to_tail(block, &live, &contract_state)?;
        }
        Ok(())
    }

    /// VerifyTransactions: check `blocks` (root to head) in order on top of
    /// `parent`, advancing `utxo_index` after each block.
    pub fn verify_transactions(
        &self,
        utxo_index: &UtxoIndex,
        contract_state: &ContractState,
        blocks: &[Block],
        parent: &Block,
    ) -> Result<ValidationResult> {
        let mut prev_hash = parent.hash();
        let mut prev_height = parent.height();

        for block in blocks {
            if block.prev_hash() != prev_hash || block.height() != prev_height + 1 {
                return Ok(ValidationResult::Invalid(format!(
                    "block {} does not follow {}",
                    short_hash(&block.hash()),
                    short_hash(&prev_hash)
                )));
            }
            if let ValidationResult::Invalid(reason) = verify_block_transactions(block, utxo_index)? {
                return Ok(ValidationResult::Invalid(format!(
                    "block {} at height {}: {}",
                    short_hash(&block.hash()),
                    block.height(),
                    reason
                )));
            }
            trace!(
                target: "ledger::chain",
                hash = %short_hash(&block.hash()),
                height = block.height(),
                contracts = contract_state.len(),
                "verified fork block"
            );
            prev_hash = block.hash();
            prev_height = block.height();
        }
        Ok(ValidationResult::Valid)
    }

    /// UTXO index and contract state as of main-chain block `hash`, built by
    /// undoing blocks from the tail. Nothing is written.
    pub fn revert_utxo_and_state_at_block_hash(&self, hash: &Hash) -> Result<(UtxoIndex, ContractState)> {
        let target = self.blockchain.get_block_by_hash(hash)?;
        let index = self.blockchain.get_utxo_index();
        let db = self.blockchain.db().as_ref();

        for block in self.blockchain.iter() {
            let block = block?;
            if block.hash() == *hash {
                break;
            }
            if block.height() <= target.height() {
                return Err(LedgerError::BlockDoesNotExist(format!(
                    "{} is not on the main chain",
                    short_hash(hash)
                )));
            }
            index.undo_txs_in_block(&block, db)?;
        }

        Ok((index, ContractState::load_at(db, hash)?))
    }
}
