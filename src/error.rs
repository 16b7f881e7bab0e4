//! Error types for ledger state transitions

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("UTXO not found: {0}")]
    UtxoNotFound(String),

    #[error("Transaction input not found: {0}")]
    TxInputNotFound(String),

    #[error("Insufficient fund")]
    InsufficientFund,

    #[error("Invalid public key: {0}")]
    InvalidPubKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Transaction validation failed: {0}")]
    TransactionValidation(String),

    #[error("Block validation failed: {0}")]
    BlockValidation(String),

    #[error("Block does not exist: {0}")]
    BlockDoesNotExist(String),

    #[error("Prev hash verify failed at height {0}")]
    PrevHashVerifyFailed(u64),

    #[error("Transaction verification failed: {0}")]
    TransactionVerifyFailed(String),

    #[error("Transaction pool rejected transaction: {0}")]
    PoolRejected(String),

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl LedgerError {
    /// Errors after which the persisted chain may be inconsistent.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LedgerError::Storage(_) | LedgerError::Serialization(_))
    }
}

impl From<bincode::Error> for LedgerError {
    fn from(err: bincode::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<secp256k1::Error> for LedgerError {
    fn from(err: secp256k1::Error) -> Self {
        LedgerError::InvalidSignature(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
