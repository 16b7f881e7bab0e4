//! Consensus collaborator contract

use crate::network::Network;
use crate::types::*;
use std::sync::Arc;

/// Block-production and block-validation engine.
///
/// The ledger only ever calls [`Consensus::validate`]; the remaining methods are
/// driven by the node that owns both.
pub trait Consensus: Send + Sync {
    /// Structural/cryptographic validity of a block's proof
    fn validate(&self, block: &Block) -> bool;

    fn start(&self);

    fn stop(&self);

    fn start_new_block_minting(&self);

    fn setup(&self, network: Arc<dyn Network>, producer: &str);

    fn set_target_difficulty(&self, value: u64);
}
