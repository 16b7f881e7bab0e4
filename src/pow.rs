//! Proof-of-work block validation

use crate::consensus::Consensus;
use crate::network::Network;
use crate::types::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Number of leading zero bits in a hash
pub fn leading_zero_bits(hash: &Hash) -> u32 {
    let mut bits = 0;
    for byte in hash {
        if *byte == 0 {
            bits += 8;
        } else {
            bits += byte.leading_zeros();
            break;
        }
    }
    bits
}

/// CheckProofOfWork: ℬ × ℕ → {true, false}
///
/// A block satisfies difficulty `target_bits` if its sealed hash is correct and
/// starts with at least `target_bits` zero bits.
pub fn check_proof_of_work(block: &Block, target_bits: u64) -> bool {
    block.verify_hash() && u64::from(leading_zero_bits(&block.hash())) >= target_bits
}

/// Proof-of-work consensus. Only validation lives here; nonce search belongs to
/// the block producer.
pub struct ProofOfWork {
    target_bits: AtomicU64,
    running: AtomicBool,
    minting_requested: AtomicBool,
    network: Mutex<Option<Arc<dyn Network>>>,
    producer: Mutex<String>,
}

impl ProofOfWork {
    pub fn new(target_bits: u64) -> Self {
        ProofOfWork {
            target_bits: AtomicU64::new(target_bits),
            running: AtomicBool::new(false),
            minting_requested: AtomicBool::new(false),
            network: Mutex::new(None),
            producer: Mutex::new(String::new()),
        }
    }

    pub fn target_bits(&self) -> u64 {
        self.target_bits.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Consume a pending minting request
    pub fn take_minting_request(&self) -> bool {
        self.minting_requested.swap(false, Ordering::AcqRel)
    }

    pub fn producer(&self) -> String {
        self.producer.lock().clone()
    }

    pub fn has_network(&self) -> bool {
        self.network.lock().is_some()
    }
}

impl Consensus for ProofOfWork {
    fn validate(&self, block: &Block) -> bool {
        let valid = check_proof_of_work(block, self.target_bits());
        if !valid {
            debug!(target: "ledger::pow", hash = %short_hash(&block.hash()), target_bits = self.target_bits(), "proof of work check failed");
        }
        valid
    }

    fn start(&self) {
        self.running.store(true, Ordering::Release);
        info!(target: "ledger::pow", target_bits = self.target_bits(), "proof of work started");
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
        info!(target: "ledger::pow", "proof of work stopped");
    }

    fn start_new_block_minting(&self) {
        self.minting_requested.store(true, Ordering::Release);
    }

    fn setup(&self, network: Arc<dyn Network>, producer: &str) {
        *self.network.lock() = Some(network);
        *self.producer.lock() = producer.to_string();
    }

    fn set_target_difficulty(&self, value: u64) {
        self.target_bits.store(value, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::PeerId;

    struct SilentNetwork;

    impl Network for SilentNetwork {
        fn request_previous_block(&self, _hash: &Hash, _peer: &PeerId) {}
        fn request_download(&self, _peer: &PeerId) {}
    }

    fn create_test_block() -> Block {
        Block::new_genesis(&PubKeyHash(vec![0x5A; 21]))
    }

    fn mine(block: Block, target_bits: u64) -> Block {
        (0u64..)
            .map(|nonce| block.clone().with_nonce(nonce))
            .find(|b| check_proof_of_work(b, target_bits))
            .unwrap()
    }

    #[test]
    fn test_leading_zero_bits() {
        let mut hash = [0xff; 32];
        assert_eq!(leading_zero_bits(&hash), 0);
        hash[0] = 0x00;
        hash[1] = 0x1f;
        assert_eq!(leading_zero_bits(&hash), 11);
        assert_eq!(leading_zero_bits(&[0; 32]), 256);
    }

    #[test]
    fn test_zero_difficulty_accepts_sealed_blocks() {
        let pow = ProofOfWork::new(0);
        assert!(pow.validate(&create_test_block()));
    }

    #[test]
    fn test_tampered_hash_rejected() {
        let pow = ProofOfWork::new(0);
        let mut block = create_test_block();
        block.header.hash = [0; 32];
        assert!(!pow.validate(&block));
    }

    #[test]
    fn test_mined_block_meets_target() {
        let pow = ProofOfWork::new(8);
        let block = mine(create_test_block(), 8);
        assert!(pow.validate(&block));

        pow.set_target_difficulty(64);
        assert!(!pow.validate(&block) || leading_zero_bits(&block.hash()) >= 64);
    }

    #[test]
    fn test_lifecycle() {
        let pow = ProofOfWork::new(0);
        assert!(!pow.is_running());
        pow.start();
        assert!(pow.is_running());
        pow.start_new_block_minting();
        assert!(pow.take_minting_request());
        assert!(!pow.take_minting_request());
        pow.stop();
        assert!(!pow.is_running());

        pow.setup(Arc::new(SilentNetwork), "producer-1");
        assert!(pow.has_network());
        assert_eq!(pow.producer(), "producer-1");
    }
}
