//! Ledger constants

/// Block reward paid by the coinbase transaction
pub const SUBSIDY: u64 = 10_000_000_000;

/// Base gas charged for any contract transaction
pub const MIN_GAS_COUNT_PER_TRANSACTION: u64 = 20_000;

/// Gas charged per byte of contract payload
pub const GAS_COUNT_PER_BYTE: u64 = 1;

/// Scale applied to tips before dividing by size, keeps small rates distinguishable
pub const TIPS_PER_BYTE_SCALE: u64 = 100_000;

/// Coinbase inputs reference this output index
pub const COINBASE_VOUT: i32 = -1;

/// Blocks this far above the tail are left to the download layer
pub const HEIGHT_DIFF_THRESHOLD: u64 = 10;

/// Maximum number of blocks held by the fork tree
pub const BLOCK_CACHE_LIMIT: usize = 1024;

/// Blocks older than tail height minus this window are not cached
pub const BLOCK_RETENTION_WINDOW: u64 = 100;

/// Number of per-address UTXO sets kept in memory
pub const UTXO_CACHE_LIMIT: usize = 1024;

/// Transaction pool byte budget: 32MB
pub const TX_POOL_SIZE_LIMIT: usize = 32 * 1024 * 1024;

/// Transaction pool entry budget
pub const TX_POOL_COUNT_LIMIT: usize = 10_000;

/// Confirmations before a block becomes irreversible
pub const MIN_CONFIRMATION_NUM: u64 = 6;

/// Address version byte for user accounts
pub const VERSION_USER: u8 = 0x5A;

/// Address version byte for contract accounts
pub const VERSION_CONTRACT: u8 = 0x58;

/// Minimum accepted public key length
pub const MIN_PUB_KEY_LEN: usize = 32;

/// Timestamp of every genesis block
pub const GENESIS_TIMESTAMP: i64 = 1_532_392_928;

/// Sentinel index key for the contract-creation UTXO bucket
pub const CONTRACT_UTXO_KEY: &str = "contractUtxoKey";

/// Storage key of the tail block hash
pub const TAIL_BLOCK_HASH_KEY: &[u8] = b"tailBlockHash";

/// Storage key of the last irreversible block hash
pub const LIB_HASH_KEY: &[u8] = b"lastIrreversibleBlockHash";

/// Storage key of the persisted transaction pool
pub const TX_POOL_KEY: &[u8] = b"txpool";

/// Storage key prefixes
pub const BLOCK_KEY_PREFIX: &str = "block_";
pub const HEIGHT_KEY_PREFIX: &str = "height_";
pub const UTXO_KEY_PREFIX: &str = "utxo_";
pub const TX_JOURNAL_KEY_PREFIX: &str = "tx_journal_";
pub const CONTRACT_STATE_KEY_PREFIX: &str = "scstate_";
