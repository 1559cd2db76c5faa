pub mod sled_store;

use crate::core::{Block, Transaction};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use sled_store::SledStore;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("block not found: {0}")]
    BlockNotFound(u64),
    #[error("not found: {0}")]
    NotFound(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub address: String,
    pub coin_type: String,
    pub balance: Decimal,
    pub frozen_balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stablecoin {
    pub symbol: String,
    pub name: String,
    pub collateral_ratio: Decimal,
    pub backed_by: String,
    pub max_supply: Option<Decimal>,
    pub total_supply: Decimal,
    pub creation_date: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizedMinter {
    pub coin_symbol: String,
    pub minter_address: String,
    pub authorizer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStatsRow {
    pub block_index: u64,
    pub difficulty: u32,
    pub reward: Decimal,
    pub mining_time: f64,
    pub hash_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningAttempt {
    pub id: String,
    pub block_index: u64,
    pub miner: String,
    pub start_time: f64,
    pub end_time: Option<f64>,
    pub success: bool,
    pub attempts_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub address: String,
    pub password_hash: String,
    pub reputation_score: i32,
    pub created_at: f64,
    pub last_activity: f64,
}

/// The durable-store contract (spec §6): unique keyed records for every
/// table the engine needs, atomic commit of a mined block, range reads,
/// and upsert semantics on balances. `SledStore` is the sole
/// implementation; the trait exists so engine modules depend on the
/// contract rather than on `sled` directly.
pub trait Store: Send + Sync {
    fn save_block(&self, block: &Block) -> StorageResult<()>;
    fn load_block(&self, index: u64) -> StorageResult<Block>;
    fn block_by_hash(&self, hash: &str) -> StorageResult<Option<Block>>;
    fn chain_height(&self) -> StorageResult<u64>;
    fn load_chain_tail(&self, limit: u64) -> StorageResult<Vec<Block>>;
    fn load_chain_range(&self, offset: u64, limit: u64) -> StorageResult<Vec<Block>>;

    fn upsert_balance(&self, balance: &Balance) -> StorageResult<()>;
    fn get_balance(&self, address: &str, coin_type: &str) -> StorageResult<Balance>;
    fn get_balances(&self, address: &str) -> StorageResult<Vec<Balance>>;

    fn save_stablecoin(&self, coin: &Stablecoin) -> StorageResult<()>;
    fn get_stablecoin(&self, symbol: &str) -> StorageResult<Option<Stablecoin>>;
    fn all_stablecoins(&self) -> StorageResult<Vec<Stablecoin>>;

    fn save_minter(&self, minter: &AuthorizedMinter) -> StorageResult<()>;
    fn is_authorized_minter(&self, symbol: &str, minter: &str) -> StorageResult<bool>;

    fn enqueue_pending(&self, tx: &Transaction) -> StorageResult<()>;
    fn remove_pending(&self, tx_id: &str) -> StorageResult<()>;
    fn all_pending(&self) -> StorageResult<Vec<Transaction>>;
    fn pending_count(&self) -> StorageResult<usize>;

    fn save_chain_stats(&self, row: &ChainStatsRow) -> StorageResult<()>;
    fn get_chain_stats(&self, block_index: u64) -> StorageResult<Option<ChainStatsRow>>;
    fn chain_stats_tail(&self, limit: u64) -> StorageResult<Vec<ChainStatsRow>>;

    fn save_mining_attempt(&self, attempt: &MiningAttempt) -> StorageResult<()>;
    fn mining_attempts_since(&self, since: f64) -> StorageResult<Vec<MiningAttempt>>;

    fn save_user(&self, user: &User) -> StorageResult<()>;
    fn get_user(&self, address: &str) -> StorageResult<Option<User>>;

    /// Atomically persist a mined block: the block itself, its chain-stats
    /// row, balance deltas, and removal of the processed mempool entries.
    /// Callers hold the engine's single write lock for the duration, which
    /// is this implementation's serialization point (spec §5).
    fn commit_block(
        &self,
        block: &Block,
        stats: &ChainStatsRow,
        balance_deltas: &[Balance],
        mined_tx_ids: &[String],
    ) -> StorageResult<()> {
        self.save_block(block)?;
        self.save_chain_stats(stats)?;
        for b in balance_deltas {
            self.upsert_balance(b)?;
        }
        for id in mined_tx_ids {
            self.remove_pending(id)?;
        }
        Ok(())
    }
}
