//! UTXO index: the working set of unspent outputs.
//!
//! An index memoizes per-address sets pulled from the shared [`UtxoCache`].
//! Mutations stay local to the index until [`UtxoIndex::save`], so a deep copy
//! can be advanced through a candidate fork and simply dropped if the fork
//! turns out invalid.

use crate::constants::CONTRACT_UTXO_KEY;
use crate::error::{LedgerError, Result};
use crate::journal::get_tx_output;
use crate::storage::Storage;
use crate::types::*;
use crate::utxo::{utxo_key, Utxo, UtxoTx, UtxoType};
use crate::utxo_cache::UtxoCache;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, trace, warn};

pub struct UtxoIndex {
    index: RwLock<HashMap<String, UtxoTx>>,
    cache: Arc<UtxoCache>,
    // serializes writers; readers only contend on `index`
    mutation: Mutex<()>,
}

impl UtxoIndex {
    pub fn new(cache: Arc<UtxoCache>) -> Self {
        UtxoIndex {
            index: RwLock::new(HashMap::new()),
            cache,
            mutation: Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &Arc<UtxoCache> {
        &self.cache
    }

    fn load(&self, key: &str) -> Result<UtxoTx> {
        if let Some(set) = self.index.read().get(key) {
            return Ok(set.clone());
        }
        let loaded = self.cache.get_utxo_tx(key)?;
        Ok(self.index.write().entry(key.to_string()).or_insert(loaded).clone())
    }

    /// GetAllUTXOsByPubKeyHash: the set owned by `pkh` as seen by this index
    pub fn get_all_utxos_by_pub_key_hash(&self, pkh: &PubKeyHash) -> Result<UtxoTx> {
        self.load(&pkh.to_hex())
    }

    /// GetUTXOsByAmount: spendable outputs of `pkh` covering `amount`
    pub fn get_utxos_by_amount(&self, pkh: &PubKeyHash, amount: &Amount) -> Result<Vec<Utxo>> {
        self.get_all_utxos_by_pub_key_hash(pkh)?
            .prepare_utxos(amount)
            .ok_or(LedgerError::InsufficientFund)
    }

    /// The output an input spends. Fails with `TxInputNotFound` if it is not unspent here.
    pub fn find_utxo_by_input(&self, vin: &TxInput) -> Result<Utxo> {
        let pkh = PubKeyHash::from_public_key(&vin.pub_key)?;
        let key = utxo_key(&vin.txid, vin.vout);
        self.get_all_utxos_by_pub_key_hash(&pkh)?
            .get_utxo(&key)
            .cloned()
            .ok_or(LedgerError::TxInputNotFound(key))
    }

    /// All contract-creation outputs
    pub fn get_contract_utxos(&self) -> Result<Vec<Utxo>> {
        Ok(self.load(CONTRACT_UTXO_KEY)?.sorted().into_iter().cloned().collect())
    }

    pub fn get_contract_create_utxo(&self, pkh: &PubKeyHash) -> Result<Option<Utxo>> {
        Ok(self
            .get_all_utxos_by_pub_key_hash(pkh)?
            .iter()
            .find(|u| u.utxo_type == UtxoType::ContractCreate)
            .cloned())
    }

    /// AddUTXO: record output `vout` of transaction `txid` as unspent
    pub fn add_utxo(&self, output: &TxOutput, txid: &Hash, vout: i32) -> Result<()> {
        let _guard = self.mutation.lock();
        let mut staging = Staging::new(self);
        staging.add(output, txid, vout)?;
        staging.commit();
        Ok(())
    }

    /// removeUTXO: spend an output. Fails with `UtxoNotFound` if it is not unspent.
    pub fn remove_utxo(&self, pkh: &PubKeyHash, txid: &[u8], vout: i32) -> Result<()> {
        let _guard = self.mutation.lock();
        let mut staging = Staging::new(self);
        staging.remove(pkh, txid, vout)?;
        staging.commit();
        Ok(())
    }

    /// UpdateUtxo: apply one transaction.
    ///
    /// Returns false, leaving the index untouched, if any input has an invalid
    /// owner key or spends an output that is not unspent.
    pub fn update_utxo(&self, tx: &Transaction) -> bool {
        match self.try_update_utxo(tx) {
            Ok(applied) => applied,
            Err(err) => {
                error!(target: "ledger::utxo", %err, txid = %short_hash(&tx.id), "storage failure while updating utxo");
                false
            }
        }
    }

    /// As [`UtxoIndex::update_utxo`], but storage failures surface as `Err`
    pub fn try_update_utxo(&self, tx: &Transaction) -> Result<bool> {
        let _guard = self.mutation.lock();
        let mut staging = Staging::new(self);

        if !tx.is_coinbase() {
            for vin in &tx.vin {
                let pkh = match PubKeyHash::from_public_key(&vin.pub_key) {
                    Ok(pkh) => pkh,
                    Err(err) => {
                        warn!(target: "ledger::utxo", %err, txid = %short_hash(&tx.id), "input owner is invalid");
                        return Ok(false);
                    }
                };
                match staging.remove(&pkh, &vin.txid, vin.vout) {
                    Ok(_) => {}
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => {
                        warn!(target: "ledger::utxo", %err, txid = %short_hash(&tx.id), "input is not spendable");
                        return Ok(false);
                    }
                }
            }
        }

        for (index, output) in tx.vout.iter().enumerate() {
            staging.add(output, &tx.id, index as i32)?;
        }

        staging.commit();
        trace!(target: "ledger::utxo", txid = %short_hash(&tx.id), "applied transaction");
        Ok(true)
    }

    /// Apply transactions in order, stopping at the first one that does not apply
    pub fn update_utxos(&self, txs: &[Transaction]) -> bool {
        txs.iter().all(|tx| self.update_utxo(tx))
    }

    /// Reverse the effect of `block`: drop the outputs it created and restore the
    /// outputs its inputs spent, read back from the transaction journal.
    pub fn undo_txs_in_block(&self, block: &Block, db: &dyn Storage) -> Result<()> {
        let _guard = self.mutation.lock();
        let mut staging = Staging::new(self);

        for tx in block.transactions.iter().rev() {
            for (index, output) in tx.vout.iter().enumerate() {
                staging.remove(&output.pub_key_hash, &tx.id, index as i32)?;
            }
            if tx.is_coinbase() {
                continue;
            }
            for vin in &tx.vin {
                let output = get_tx_output(db, vin)?;
                let txid: Hash = vin
                    .txid
                    .as_slice()
                    .try_into()
                    .map_err(|_| LedgerError::TxInputNotFound(utxo_key(&vin.txid, vin.vout)))?;
                staging.add(&output, &txid, vin.vout)?;
            }
        }

        staging.commit();
        trace!(target: "ledger::utxo", height = block.height(), hash = %short_hash(&block.hash()), "undid block");
        Ok(())
    }

    /// DeepCopy: an independent working copy over the same backing cache
    pub fn deep_copy(&self) -> UtxoIndex {
        UtxoIndex {
            index: RwLock::new(self.index.read().clone()),
            cache: self.cache.clone(),
            mutation: Mutex::new(()),
        }
    }

    /// Save: flush every set this index has touched into the cache and storage
    pub fn save(&self) -> Result<()> {
        self.cache.put_batch(self.entries())
    }

    /// Every set this index has touched, for callers batching the write themselves
    pub fn entries(&self) -> Vec<(String, UtxoTx)> {
        self.index
            .read()
            .iter()
            .map(|(key, set)| (key.clone(), set.clone()))
            .collect()
    }

    /// Number of address sets loaded into this index
    pub fn loaded_len(&self) -> usize {
        self.index.read().len()
    }
}

/// Copy-on-write view of the sets touched by one mutation, committed all at once
struct Staging<'a> {
    index: &'a UtxoIndex,
    sets: HashMap<String, UtxoTx>,
}

impl<'a> Staging<'a> {
    fn new(index: &'a UtxoIndex) -> Self {
        Staging { index, sets: HashMap::new() }
    }

    fn set_mut(&mut self, key: &str) -> Result<&mut UtxoTx> {
        if !self.sets.contains_key(key) {
            let loaded = self.index.load(key)?;
            self.sets.insert(key.to_string(), loaded);
        }
        self.sets
            .get_mut(key)
            .ok_or_else(|| LedgerError::UtxoNotFound(key.to_string()))
    }

    fn add(&mut self, output: &TxOutput, txid: &Hash, vout: i32) -> Result<()> {
        let owner = output.pub_key_hash.to_hex();
        let utxo_type = if output.pub_key_hash.is_contract() {
            let created = self
                .set_mut(&owner)?
                .iter()
                .any(|u| u.utxo_type == UtxoType::ContractCreate);
            if created {
                UtxoType::ContractInvoke
            } else {
                UtxoType::ContractCreate
            }
        } else {
            UtxoType::Normal
        };

        let utxo = Utxo::new(output.clone(), *txid, vout, utxo_type);
        if utxo_type == UtxoType::ContractCreate {
            self.set_mut(CONTRACT_UTXO_KEY)?.put_utxo(utxo.clone());
        }
        self.set_mut(&owner)?.put_utxo(utxo);
        Ok(())
    }

    fn remove(&mut self, pkh: &PubKeyHash, txid: &[u8], vout: i32) -> Result<Utxo> {
        let key = utxo_key(txid, vout);
        let removed = self
            .set_mut(&pkh.to_hex())?
            .remove_utxo(&key)
            .ok_or_else(|| LedgerError::UtxoNotFound(key.clone()))?;
        if removed.utxo_type == UtxoType::ContractCreate {
            self.set_mut(CONTRACT_UTXO_KEY)?.remove_utxo(&key);
        }
        Ok(removed)
    }

    fn commit(self) {
        let mut index = self.index.index.write();
        for (key, set) in self.sets {
            index.insert(key, set);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::journal::TxJournal;
    use crate::storage::MemoryStorage;

    fn create_test_index() -> (UtxoIndex, Arc<MemoryStorage>) {
        let db = Arc::new(MemoryStorage::new());
        let cache = Arc::new(UtxoCache::new(db.clone(), 16));
        (UtxoIndex::new(cache), db)
    }

    fn create_test_keypair(seed: u8) -> KeyPair {
        KeyPair::from_secret_bytes(&[seed; 32]).unwrap()
    }

    fn create_funding_tx(id: u8, to: &PubKeyHash, value: u64) -> Transaction {
        Transaction {
            id: [id; 32],
            vin: vec![TxInput { txid: vec![], vout: -1, signature: 0u64.to_be_bytes().to_vec(), pub_key: vec![] }],
            vout: vec![TxOutput::new(Amount::from(value), to.clone())],
            tip: Amount::default(),
            gas_limit: Amount::default(),
            gas_price: Amount::default(),
        }
    }

    fn create_spend_tx(id: u8, from: &KeyPair, prev: &Transaction, to: &PubKeyHash, value: u64) -> Transaction {
        Transaction {
            id: [id; 32],
            vin: vec![TxInput { txid: prev.id.to_vec(), vout: 0, signature: vec![], pub_key: from.public_key() }],
            vout: vec![TxOutput::new(Amount::from(value), to.clone())],
            tip: Amount::default(),
            gas_limit: Amount::default(),
            gas_price: Amount::default(),
        }
    }

    #[test]
    fn test_add_and_remove_utxo() {
        let (index, _) = create_test_index();
        let pkh = create_test_keypair(1).pub_key_hash().unwrap();
        let output = TxOutput::new(Amount::from(10u32), pkh.clone());

        index.add_utxo(&output, &[1; 32], 0).unwrap();
        let set = index.get_all_utxos_by_pub_key_hash(&pkh).unwrap();
        assert_eq!(set.size(), 1);
        assert_eq!(set.iter().next().unwrap().utxo_type, UtxoType::Normal);

        index.remove_utxo(&pkh, &[1; 32], 0).unwrap();
        assert!(index.get_all_utxos_by_pub_key_hash(&pkh).unwrap().is_empty());
    }

    #[test]
    fn test_remove_missing_utxo_fails() {
        let (index, _) = create_test_index();
        let pkh = create_test_keypair(1).pub_key_hash().unwrap();
        let result = index.remove_utxo(&pkh, &[1; 32], 0);
        assert!(matches!(result, Err(LedgerError::UtxoNotFound(_))));
    }

    #[test]
    fn test_contract_outputs_are_typed_and_bucketed() {
        let (index, _) = create_test_index();
        let contract = PubKeyHash::new_contract(b"c1");
        let deploy = TxOutput::new_contract(Amount::from(1u32), contract.clone(), "code".to_string());
        let invoke = TxOutput::new(Amount::from(2u32), contract.clone());

        index.add_utxo(&deploy, &[1; 32], 0).unwrap();
        index.add_utxo(&invoke, &[2; 32], 0).unwrap();

        let created = index.get_contract_create_utxo(&contract).unwrap().unwrap();
        assert_eq!(created.txid, [1; 32]);
        let types: Vec<UtxoType> = index
            .get_all_utxos_by_pub_key_hash(&contract)
            .unwrap()
            .sorted()
            .iter()
            .map(|u| u.utxo_type)
            .collect();
        assert_eq!(types, vec![UtxoType::ContractCreate, UtxoType::ContractInvoke]);

        assert_eq!(index.get_contract_utxos().unwrap().len(), 1);
        index.remove_utxo(&contract, &[1; 32], 0).unwrap();
        assert!(index.get_contract_utxos().unwrap().is_empty());
    }

    #[test]
    fn test_update_utxo_spends_and_creates() {
        let (index, _) = create_test_index();
        let alice = create_test_keypair(1);
        let bob = create_test_keypair(2).pub_key_hash().unwrap();
        let funding = create_funding_tx(1, &alice.pub_key_hash().unwrap(), 10);
        let spend = create_spend_tx(2, &alice, &funding, &bob, 10);

        assert!(index.update_utxo(&funding));
        assert!(index.update_utxo(&spend));
        assert!(index.get_all_utxos_by_pub_key_hash(&alice.pub_key_hash().unwrap()).unwrap().is_empty());
        assert_eq!(index.get_all_utxos_by_pub_key_hash(&bob).unwrap().size(), 1);

        // spending again must fail and leave state untouched
        let double = create_spend_tx(3, &alice, &funding, &bob, 10);
        assert!(!index.update_utxo(&double));
        assert_eq!(index.get_all_utxos_by_pub_key_hash(&bob).unwrap().size(), 1);
    }

    #[test]
    fn test_update_utxo_invalid_pub_key() {
        let (index, _) = create_test_index();
        let alice = create_test_keypair(1);
        let funding = create_funding_tx(1, &alice.pub_key_hash().unwrap(), 10);
        assert!(index.update_utxo(&funding));

        let mut spend = create_spend_tx(2, &alice, &funding, &alice.pub_key_hash().unwrap(), 10);
        spend.vin[0].pub_key = vec![1, 2, 3];
        assert!(!index.update_utxo(&spend));
        assert_eq!(index.get_all_utxos_by_pub_key_hash(&alice.pub_key_hash().unwrap()).unwrap().size(), 1);
    }

    #[test]
    fn test_partial_failure_is_not_applied() {
        let (index, _) = create_test_index();
        let alice = create_test_keypair(1);
        let funding = create_funding_tx(1, &alice.pub_key_hash().unwrap(), 10);
        assert!(index.update_utxo(&funding));

        // first input is fine, second spends nothing
        let mut spend = create_spend_tx(2, &alice, &funding, &alice.pub_key_hash().unwrap(), 10);
        let mut bogus = spend.vin[0].clone();
        bogus.vout = 7;
        spend.vin.push(bogus);
        assert!(!index.update_utxo(&spend));

        let set = index.get_all_utxos_by_pub_key_hash(&alice.pub_key_hash().unwrap()).unwrap();
        assert!(set.contains(&utxo_key(&funding.id, 0)));
    }

    #[test]
    fn test_get_utxos_by_amount() {
        let (index, _) = create_test_index();
        let pkh = create_test_keypair(1).pub_key_hash().unwrap();
        index.update_utxo(&create_funding_tx(1, &pkh, 4));
        index.update_utxo(&create_funding_tx(2, &pkh, 5));

        assert_eq!(index.get_utxos_by_amount(&pkh, &Amount::from(9u32)).unwrap().len(), 2);
        let result = index.get_utxos_by_amount(&pkh, &Amount::from(10u32));
        assert!(matches!(result, Err(LedgerError::InsufficientFund)));
    }

    #[test]
    fn test_find_utxo_by_input() {
        let (index, _) = create_test_index();
        let alice = create_test_keypair(1);
        let funding = create_funding_tx(1, &alice.pub_key_hash().unwrap(), 10);
        index.update_utxo(&funding);

        let spend = create_spend_tx(2, &alice, &funding, &alice.pub_key_hash().unwrap(), 10);
        assert_eq!(index.find_utxo_by_input(&spend.vin[0]).unwrap().txid, funding.id);

        let mut missing = spend.vin[0].clone();
        missing.vout = 1;
        assert!(matches!(index.find_utxo_by_input(&missing), Err(LedgerError::TxInputNotFound(_))));
    }

    #[test]
    fn test_deep_copy_is_isolated() {
        let (index, _) = create_test_index();
        let pkh = create_test_keypair(1).pub_key_hash().unwrap();
        index.update_utxo(&create_funding_tx(1, &pkh, 4));

        let copy = index.deep_copy();
        copy.update_utxo(&create_funding_tx(2, &pkh, 5));
        copy.remove_utxo(&pkh, &[1; 32], 0).unwrap();

        let live = index.get_all_utxos_by_pub_key_hash(&pkh).unwrap();
        assert_eq!(live.size(), 1);
        assert!(live.contains(&utxo_key(&[1; 32], 0)));
    }

    #[test]
    fn test_save_is_visible_to_fresh_index() {
        let (index, _) = create_test_index();
        let pkh = create_test_keypair(1).pub_key_hash().unwrap();
        index.update_utxo(&create_funding_tx(1, &pkh, 4));

        let fresh = UtxoIndex::new(index.cache().clone());
        assert!(fresh.get_all_utxos_by_pub_key_hash(&pkh).unwrap().is_empty());

        index.save().unwrap();
        let fresh = UtxoIndex::new(index.cache().clone());
        assert_eq!(fresh.get_all_utxos_by_pub_key_hash(&pkh).unwrap().size(), 1);
    }

    #[test]
    fn test_undo_block_restores_spent_outputs() {
        let (index, db) = create_test_index();
        let alice = create_test_keypair(1);
        let bob = create_test_keypair(2).pub_key_hash().unwrap();
        let funding = create_funding_tx(1, &alice.pub_key_hash().unwrap(), 10);
        let spend = create_spend_tx(2, &alice, &funding, &bob, 10);
        db.write_batch(vec![TxJournal::new(&funding).to_batch_op().unwrap()]).unwrap();

        index.update_utxo(&funding);
        let before = index.get_all_utxos_by_pub_key_hash(&alice.pub_key_hash().unwrap()).unwrap();
        index.update_utxo(&spend);

        let block = Block {
            header: BlockHeader { hash: [7; 32], prev_hash: [6; 32], height: 2, timestamp: 0, nonce: 0 },
            transactions: vec![spend],
        };
        index.undo_txs_in_block(&block, db.as_ref()).unwrap();

        assert_eq!(index.get_all_utxos_by_pub_key_hash(&alice.pub_key_hash().unwrap()).unwrap(), before);
        assert!(index.get_all_utxos_by_pub_key_hash(&bob).unwrap().is_empty());
    }

    #[test]
    fn test_undo_without_journal_fails() {
        let (index, db) = create_test_index();
        let alice = create_test_keypair(1);
        let funding = create_funding_tx(1, &alice.pub_key_hash().unwrap(), 10);
        let spend = create_spend_tx(2, &alice, &funding, &alice.pub_key_hash().unwrap(), 10);
        index.update_utxo(&funding);
        index.update_utxo(&spend);

        let block = Block {
            header: BlockHeader { hash: [7; 32], prev_hash: [6; 32], height: 2, timestamp: 0, nonce: 0 },
            transactions: vec![spend],
        };
        let result = index.undo_txs_in_block(&block, db.as_ref());
        assert!(matches!(result, Err(LedgerError::TxInputNotFound(_))));
    }
}
