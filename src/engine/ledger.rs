use crate::cache::HotCache;
use crate::config::ConsensusConfig;
use crate::core::{Block, Transaction, TransactionType};
use crate::engine::{balance, difficulty, mempool, miner, stablecoin, validator};
use crate::error::{CoreError, CoreResult};
use crate::storage::{Balance, ChainStatsRow, Stablecoin, Store};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[derive(Debug, Serialize, serde::Deserialize)]
pub struct ChainInfo {
    pub chain_length: u64,
    pub current_difficulty: u32,
    pub next_reward: Decimal,
    pub pending_transactions: usize,
    pub max_pending_transactions: usize,
    pub max_block_size: usize,
    pub estimated_hash_rate: f64,
    pub latest_block_hash: String,
    pub stablecoins: Vec<Stablecoin>,
}

#[derive(Debug, Serialize)]
pub struct MinerStat {
    pub miner: String,
    pub successes: u64,
    pub average_success_time: f64,
}

/// A block joined with its chain-stats row (spec §4.9: "each joined with
/// its chain-stats row"), so per-block `hash_rate` and the stats-recorded
/// `reward` are surfaced alongside the block itself.
#[derive(Debug, Serialize)]
pub struct BlockView {
    #[serde(flatten)]
    pub block: Block,
    pub chain_stats: Option<ChainStatsRow>,
}

#[derive(Debug, Serialize)]
pub struct MiningStats {
    pub window_hours: f64,
    pub top_miners: Vec<MinerStat>,
    pub average_difficulty: f64,
    pub average_reward: f64,
    pub average_hash_rate: f64,
}

/// Top-level facade gluing the engine components together: the sole
/// entry point the HTTP layer calls into. Holds no synchronization of its
/// own — spec §5 makes the store the serialization point, and the API
/// layer wraps a `Ledger` in a single process-wide lock (mirroring
/// `quanta::api::handlers::ApiState`'s `Arc<RwLock<Blockchain>>`), so all
/// mutating calls are already serialized by the time they reach here.
pub struct Ledger {
    pub store: Arc<dyn Store>,
    pub cache: Arc<dyn HotCache>,
    pub config: ConsensusConfig,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn HotCache>, config: ConsensusConfig) -> Self {
        Self { store, cache, config }
    }

    /// Seeds the genesis block and the CAD-COIN stablecoin record if the
    /// store is empty. Idempotent.
    pub fn ensure_genesis(&self) -> CoreResult<()> {
        if self.store.chain_height().map_err(CoreError::from)? == 0 {
            let genesis = Block::genesis(self.config.base_difficulty);
            self.store.save_block(&genesis).map_err(CoreError::from)?;
            self.store
                .save_chain_stats(&ChainStatsRow {
                    block_index: 0,
                    difficulty: self.config.base_difficulty,
                    reward: Decimal::from_f64_retain(self.config.base_mining_reward)
                        .unwrap_or(Decimal::ZERO),
                    mining_time: 0.0,
                    hash_rate: 0.0,
                })
                .map_err(CoreError::from)?;
            tracing::info!("genesis block written");
        }
        if self.store.get_stablecoin("CAD-COIN").map_err(CoreError::from)?.is_none() {
            stablecoin::create(
                self.store.as_ref(),
                "CAD-COIN",
                "CAD Coin",
                Decimal::new(1, 0),
                "CAD",
                None,
                now_secs(),
            )?;
        }
        Ok(())
    }

    pub fn submit_transaction(
        &self,
        sender: &str,
        receiver: &str,
        amount: Decimal,
        fee: Option<Decimal>,
        coin_type: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> CoreResult<Transaction> {
        let min_fee =
            Decimal::from_f64_retain(self.config.min_transaction_fee).unwrap_or(Decimal::ZERO);
        let fee = fee.unwrap_or_else(|| mempool::default_fee(amount, min_fee));
        let tx = Transaction::new(
            sender,
            receiver,
            amount,
            fee,
            coin_type,
            TransactionType::Transfer,
            metadata,
            now_secs(),
        );
        mempool::admit(self.store.as_ref(), &tx, &self.config)?;
        self.store.enqueue_pending(&tx).map_err(CoreError::from)?;
        tracing::info!(sender, receiver, %amount, "transaction admitted");
        Ok(tx)
    }

    pub fn mine(&self, miner_address: &str) -> CoreResult<Block> {
        let result = miner::mine(
            self.store.as_ref(),
            self.cache.as_ref(),
            &self.config,
            miner_address,
        )?;
        Ok(result.block)
    }

    pub fn create_stablecoin(
        &self,
        symbol: &str,
        name: &str,
        collateral_ratio: Decimal,
        backed_by: &str,
        max_supply: Option<Decimal>,
    ) -> CoreResult<()> {
        stablecoin::create(
            self.store.as_ref(),
            symbol,
            name,
            collateral_ratio,
            backed_by,
            max_supply,
            now_secs(),
        )
    }

    pub fn authorize_minter(&self, symbol: &str, minter: &str, authorizer: &str) -> CoreResult<()> {
        stablecoin::authorize_minter(self.store.as_ref(), symbol, minter, authorizer)
    }

    pub fn mint(
        &self,
        symbol: &str,
        minter: &str,
        recipient: &str,
        amount: Decimal,
    ) -> CoreResult<Transaction> {
        stablecoin::mint(
            self.store.as_ref(),
            &self.config,
            symbol,
            minter,
            recipient,
            amount,
            now_secs(),
        )
    }

    pub fn balance(&self, address: &str, coin_type: &str) -> CoreResult<Balance> {
        self.store.get_balance(address, coin_type).map_err(CoreError::from)
    }

    pub fn balances(&self, address: &str) -> CoreResult<Vec<Balance>> {
        self.store.get_balances(address).map_err(CoreError::from)
    }

    pub fn pending_transactions(&self, limit: usize) -> CoreResult<Vec<Transaction>> {
        mempool::priority_pending(self.store.as_ref(), limit, now_secs())
    }

    pub fn stable_coins(&self) -> CoreResult<Vec<Stablecoin>> {
        self.store.all_stablecoins().map_err(CoreError::from)
    }

    pub fn validate_chain(&self, depth: u64) -> CoreResult<(bool, String)> {
        validator::validate_chain(self.store.as_ref(), depth).map_err(CoreError::Persistence)
    }

    pub fn blocks(&self, limit: u64, offset: u64) -> CoreResult<Vec<BlockView>> {
        let blocks = self
            .store
            .load_chain_range(offset, limit)
            .map_err(CoreError::from)?;
        blocks
            .into_iter()
            .map(|block| {
                let chain_stats = self
                    .store
                    .get_chain_stats(block.index)
                    .map_err(CoreError::from)?;
                Ok(BlockView { block, chain_stats })
            })
            .collect()
    }

    pub fn chain_info(&self) -> CoreResult<ChainInfo> {
        if let Some(cached) = self.cache.get("chain_info") {
            if let Ok(info) = serde_json::from_value(cached) {
                return Ok(info);
            }
        }
        let height = self.store.chain_height().map_err(CoreError::from)?;
        let tip = self.store.load_block(height.saturating_sub(1)).map_err(CoreError::from)?;
        let current_difficulty =
            difficulty::next_difficulty(self.store.as_ref(), &self.config).map_err(CoreError::Persistence)?;
        let next_reward = difficulty::reward_for_index(height, &self.config);
        let pending = self.store.pending_count().map_err(CoreError::from)?;
        let stats = self.store.chain_stats_tail(11).map_err(CoreError::from)?;
        let hash_rate = difficulty::estimated_hash_rate(&stats);

        let info = ChainInfo {
            chain_length: height,
            current_difficulty,
            next_reward,
            pending_transactions: pending,
            max_pending_transactions: self.config.max_pending_transactions,
            max_block_size: self.config.max_block_size,
            estimated_hash_rate: hash_rate,
            latest_block_hash: tip.hash,
            stablecoins: self.stable_coins()?,
        };
        if let Ok(value) = serde_json::to_value(&info) {
            self.cache.set("chain_info", value, std::time::Duration::from_secs(60));
        }
        Ok(info)
    }

    /// 24-hour top miners by success count with average success time, plus
    /// windowed averages of difficulty, reward, and hash rate.
    pub fn mining_stats(&self) -> CoreResult<MiningStats> {
        let since = now_secs() - 86_400.0;
        let attempts = self
            .store
            .mining_attempts_since(since)
            .map_err(CoreError::from)?;

        let mut by_miner: HashMap<String, (u64, f64)> = HashMap::new();
        for attempt in attempts.iter().filter(|a| a.success) {
            let entry = by_miner.entry(attempt.miner.clone()).or_insert((0, 0.0));
            entry.0 += 1;
            if let Some(end) = attempt.end_time {
                entry.1 += end - attempt.start_time;
            }
        }
        let mut top_miners: Vec<MinerStat> = by_miner
            .into_iter()
            .map(|(miner, (successes, total_time))| MinerStat {
                miner,
                successes,
                average_success_time: if successes > 0 {
                    total_time / successes as f64
                } else {
                    0.0
                },
            })
            .collect();
        top_miners.sort_by(|a, b| b.successes.cmp(&a.successes));

        let stats = self.store.chain_stats_tail(20).map_err(CoreError::from)?;
        let non_genesis: Vec<&ChainStatsRow> = stats.iter().filter(|s| s.block_index > 0).collect();
        let average_difficulty = if non_genesis.is_empty() {
            0.0
        } else {
            non_genesis.iter().map(|s| s.difficulty as f64).sum::<f64>() / non_genesis.len() as f64
        };
        let average_reward = if non_genesis.is_empty() {
            0.0
        } else {
            let sum: Decimal = non_genesis.iter().map(|s| s.reward).sum();
            (sum / Decimal::from(non_genesis.len() as u64))
                .to_string()
                .parse()
                .unwrap_or(0.0)
        };
        let average_hash_rate = difficulty::estimated_hash_rate(&stats);

        Ok(MiningStats {
            window_hours: 24.0,
            top_miners,
            average_difficulty,
            average_reward,
            average_hash_rate,
        })
    }

    pub fn health(&self) -> (bool, serde_json::Value) {
        let store_ok = self.store.chain_height().is_ok();
        let cache_ok = {
            self.cache.set("health_probe", serde_json::json!(true), std::time::Duration::from_secs(5));
            self.cache.get("health_probe").is_some()
        };
        let chain_ok = self
            .validate_chain(self.config.block_validation_depth)
            .map(|(valid, _)| valid)
            .unwrap_or(false);
        let healthy = store_ok && chain_ok;
        (
            healthy,
            serde_json::json!({
                "store": store_ok,
                "cache": cache_ok,
                "chain_valid": chain_ok,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InProcessCache;
    use crate::storage::SledStore;

    #[test]
    fn blocks_are_joined_with_their_chain_stats_row() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn Store> = Arc::new(SledStore::open(dir.path()).unwrap());
        let cache: Arc<dyn HotCache> = Arc::new(InProcessCache::new(60));
        let config = ConsensusConfig {
            base_difficulty: 1,
            mining_timeout: 30,
            ..ConsensusConfig::default()
        };
        let ledger = Ledger::new(store, cache, config);
        ledger.ensure_genesis().unwrap();
        ledger.mine("alice").unwrap();

        let views = ledger.blocks(10, 0).unwrap();
        let mined = views.iter().find(|v| v.block.index == 1).unwrap();
        let stats = mined.chain_stats.as_ref().expect("chain-stats row must be present");
        assert_eq!(stats.block_index, 1);
        assert_eq!(stats.reward, Decimal::new(50, 0));
    }
}
