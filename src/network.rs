//! Network collaborator used to fetch blocks the ledger is missing

use crate::types::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of the peer a block came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        PeerId(id.into())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Requests handed to the peer-to-peer layer. Both calls must return promptly;
/// retries and timeouts belong to the caller of this crate.
pub trait Network: Send + Sync {
    /// Ask `peer` for the block with `hash`, the missing ancestor of a cached fork
    fn request_previous_block(&self, hash: &Hash, peer: &PeerId);

    /// Ask the sync layer to bulk-download from `peer`, which is far ahead
    fn request_download(&self, peer: &PeerId);
}
