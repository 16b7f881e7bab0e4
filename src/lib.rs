//! # Ledger-Core
//!
//! Ledger-consistency engine for a UTXO blockchain node.
//!
//! This crate decides, under concurrent and possibly conflicting block arrivals,
//! which chain is canonical, which outputs are unspent, and which pending
//! transactions a producer should mine next.
//!
//! ## Architecture
//!
//! The system is built from four cooperating parts:
//! - Block pool (fork tree of blocks not yet on the main chain)
//! - Blockchain and chain manager (verification, rollback and fork merge)
//! - UTXO index and cache (spendable outputs with disposable working copies)
//! - Transaction pool (tip-per-byte ordered, dependency aware)
//!
//! Consensus, networking and storage are collaborators supplied by the node
//! through the [`Consensus`], [`Network`] and [`Storage`] traits.
//!
//! ## Usage
//!
//! ```rust
//! use ledger_core::*;
//! use std::sync::Arc;
//!
//! struct Offline;
//! impl Network for Offline {
//!     fn request_previous_block(&self, _hash: &Hash, _peer: &PeerId) {}
//!     fn request_download(&self, _peer: &PeerId) {}
//! }
//!
//! let miner = KeyPair::from_secret_bytes(&[1; 32]).unwrap();
//! let ledger = Ledger::open(
//!     &miner.pub_key_hash().unwrap(),
//!     Arc::new(MemoryStorage::new()),
//!     Arc::new(ProofOfWork::new(0)),
//!     Arc::new(Offline),
//!     LedgerConfig::default(),
//! )
//! .unwrap();
//!
//! let genesis = ledger.blockchain().get_tail_block();
//! let coinbase = Transaction::new_coinbase(&miner.pub_key_hash().unwrap(), 1, Amount::from(SUBSIDY));
//! let block = Block::new(&genesis, vec![coinbase], GENESIS_TIMESTAMP + 1);
//!
//! let outcome = ledger.push_block(block.clone(), &PeerId::new("peer")).unwrap();
//! assert_eq!(outcome, PushOutcome::Merged { tail: block.hash(), height: 1 });
//! ```

pub mod types;
pub mod constants;
pub mod error;
pub mod config;
pub mod crypto;
pub mod storage;
pub mod utxo;
pub mod utxo_cache;
pub mod utxo_index;
pub mod journal;
pub mod contract_state;
pub mod transaction;
pub mod block;
pub mod block_pool;
pub mod blockchain;
pub mod chain_manager;
pub mod consensus;
pub mod pow;
pub mod network;
pub mod transaction_pool;

// Re-export commonly used types
pub use types::*;
pub use constants::*;
pub use error::{LedgerError, Result};
pub use config::{BlockPoolConfig, ChainConfig, LedgerConfig, TxPoolConfig};
pub use crypto::KeyPair;
pub use storage::{BatchOp, MemoryStorage, Storage};
pub use utxo::{utxo_key, Utxo, UtxoTx, UtxoType};
pub use utxo_cache::UtxoCache;
pub use utxo_index::UtxoIndex;
pub use contract_state::ContractState;
pub use transaction::{check_transaction, verify_coinbase, verify_transaction, SendTxParams};
pub use block::verify_block_transactions;
pub use block_pool::BlockPool;
pub use blockchain::{Blockchain, BlockchainState};
pub use chain_manager::{ChainManager, PushOutcome};
pub use consensus::Consensus;
pub use pow::ProofOfWork;
pub use network::{Network, PeerId};
pub use transaction_pool::TransactionPool;

use std::sync::Arc;
use tracing::{debug, info, warn};

/// A node's ledger: chain manager, committed chain and transaction pool wired
/// over one storage.
pub struct Ledger {
    chain_manager: ChainManager,
    tx_pool: Arc<TransactionPool>,
}

impl Ledger {
    /// Open the ledger stored in `db`, creating a genesis block paying
    /// `genesis_addr` if the storage is empty. A saved transaction pool is restored.
    pub fn open(
        genesis_addr: &PubKeyHash,
        db: Arc<dyn Storage>,
        consensus: Arc<dyn Consensus>,
        network: Arc<dyn Network>,
        config: LedgerConfig,
    ) -> Result<Self> {
        config.validate()?;

        let tx_pool = Arc::new(TransactionPool::load(db.as_ref(), config.tx_pool.clone())?);
        let blockchain = if db.get(TAIL_BLOCK_HASH_KEY)?.is_some() {
            Blockchain::load(db, consensus, tx_pool.clone(), &config)?
        } else {
            Blockchain::create(genesis_addr, db, consensus, tx_pool.clone(), &config)?
        };
        info!(
            target: "ledger::chain",
            height = blockchain.get_max_height(),
            pooled = tx_pool.len(),
            "ledger opened"
        );

        let chain_manager = ChainManager::new(Arc::new(blockchain), network, &config);
        Ok(Ledger { chain_manager, tx_pool })
    }

    pub fn chain_manager(&self) -> &ChainManager {
        &self.chain_manager
    }

    pub fn blockchain(&self) -> &Arc<Blockchain> {
        self.chain_manager.blockchain()
    }

    pub fn tx_pool(&self) -> &Arc<TransactionPool> {
        &self.tx_pool
    }

    pub fn get_state(&self) -> BlockchainState {
        self.chain_manager.get_state()
    }

    pub fn set_state(&self, state: BlockchainState) {
        self.chain_manager.set_state(state)
    }

    /// Hand a network-delivered block to the chain manager
    pub fn push_block(&self, block: Block, peer: &PeerId) -> Result<PushOutcome> {
        self.chain_manager.push(block, peer)
    }

    /// Admit a transaction into the pool
    pub fn push_transaction(&self, tx: Transaction) -> Result<()> {
        self.tx_pool.push(tx)
    }

    /// Pick up to `max` pooled transactions for a new block, best tip per byte
    /// first, each one valid on top of the committed chain and the ones before it.
    ///
    /// # Examples
    ///
    /// ```
    /// use ledger_core::*;
    /// use std::sync::Arc;
    ///
    /// struct Offline;
    /// impl Network for Offline {
    ///     fn request_previous_block(&self, _hash: &Hash, _peer: &PeerId) {}
    ///     fn request_download(&self, _peer: &PeerId) {}
    /// }
    ///
    /// let alice = KeyPair::from_secret_bytes(&[1; 32]).unwrap();
    /// let bob = KeyPair::from_secret_bytes(&[2; 32]).unwrap();
    /// let ledger = Ledger::open(
    ///     &alice.pub_key_hash().unwrap(),
    ///     Arc::new(MemoryStorage::new()),
    ///     Arc::new(ProofOfWork::new(0)),
    ///     Arc::new(Offline),
    ///     LedgerConfig::default(),
    /// )
    /// .unwrap();
    ///
    /// let utxos = ledger
    ///     .blockchain()
    ///     .get_utxo_index()
    ///     .get_utxos_by_amount(&alice.pub_key_hash().unwrap(), &Amount::from(50u32))
    ///     .unwrap();
    /// let params = SendTxParams::new(&alice, bob.pub_key_hash().unwrap(), Amount::from(50u32), Amount::from(1u32));
    /// let tx = Transaction::new_utxo_transaction(&utxos, params).unwrap();
    /// ledger.push_transaction(tx.clone()).unwrap();
    ///
    /// assert_eq!(ledger.select_transactions(10).unwrap(), vec![tx]);
    /// ```
    pub fn select_transactions(&self, max: usize) -> Result<Vec<Transaction>> {
        let index = self.blockchain().get_utxo_index();
        let mut selected = Vec::new();
        let mut unapplied = Vec::new();
        while selected.len() < max {
            let Some(tx) = self.tx_pool.pop_transaction_with_most_tips(&index)? else {
                break;
            };
            if !index.try_update_utxo(&tx)? {
                warn!(target: "ledger::txpool", txid = %short_hash(&tx.id), "selected transaction does not apply, returning it to the pool");
                unapplied.push(tx);
                continue;
            }
            selected.push(tx);
        }
        for tx in unapplied {
            self.tx_pool.rollback(tx);
        }
        debug!(target: "ledger::txpool", selected = selected.len(), remaining = self.tx_pool.len(), "selected transactions");
        Ok(selected)
    }

    /// Persist the transaction pool so the next [`Ledger::open`] restores it
    pub fn save_pool(&self) -> Result<()> {
        self.tx_pool.save(self.blockchain().db().as_ref())
    }
}
