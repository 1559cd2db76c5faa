use crate::cache::HotCache;
use crate::config::ConsensusConfig;
use crate::core::{Block, Transaction, TransactionType};
use crate::engine::{balance, difficulty, mempool};
use crate::error::{CoreError, CoreResult};
use crate::storage::{ChainStatsRow, MiningAttempt, Store};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Outcome of a mining request.
pub struct MinedBlock {
    pub block: Block,
}

/// Orchestrates block assembly, PoW search, validation, commit, and cache
/// invalidation (spec §4.5, nine-step procedure). Grounded on
/// `quanta::consensus::blockchain::Blockchain::mine_pending_transactions`
/// for overall shape, with the mining-attempt audit row and cache-bust
/// step from `original_source/src/models/blockchain.py::
/// mine_pending_transactions`.
pub fn mine(
    store: &dyn Store,
    cache: &dyn HotCache,
    config: &ConsensusConfig,
    miner: &str,
) -> CoreResult<MinedBlock> {
    // 1. Read tip and the next index.
    let height = store.chain_height().map_err(CoreError::from)?;
    if height == 0 {
        return Err(CoreError::Persistence("chain has no genesis block".to_string()));
    }
    let tip = store.load_block(height - 1).map_err(CoreError::from)?;
    let index = tip.index + 1;

    // 2. Compute difficulty and reward.
    let d = difficulty::next_difficulty(store, config).map_err(CoreError::Persistence)?;
    let r = difficulty::reward_for_index(index, config);

    // 3. Record a mining-attempt row.
    let attempt_id = Uuid::new_v4().to_string();
    let start_time = now_secs();
    store
        .save_mining_attempt(&MiningAttempt {
            id: attempt_id.clone(),
            block_index: index,
            miner: miner.to_string(),
            start_time,
            end_time: None,
            success: false,
            attempts_count: 0,
        })
        .map_err(CoreError::from)?;

    // 4. Select priority transactions, accumulate fees, append reward tx.
    let selected = mempool::priority_pending(store, config.max_block_size - 1, start_time)?;
    let fees: Decimal = selected.iter().map(|t| t.fee).sum();
    let reward_amount = r + fees;
    let reward_tx = Transaction::new(
        "mining_reward",
        miner,
        reward_amount,
        Decimal::ZERO,
        "CAD-COIN",
        TransactionType::MiningReward,
        HashMap::new(),
        start_time,
    );
    let mut transactions = selected.clone();
    transactions.push(reward_tx);

    // 5. Build the block.
    let mut block = Block::new(index, tip.hash.clone(), miner, start_time, d, transactions);

    // 6. Run PoW with MINING_TIMEOUT.
    let mined = block.mine(config.mining_timeout);
    let end_time = now_secs();

    if !mined {
        store
            .save_mining_attempt(&MiningAttempt {
                id: attempt_id,
                block_index: index,
                miner: miner.to_string(),
                start_time,
                end_time: Some(end_time),
                success: false,
                attempts_count: block.nonce,
            })
            .map_err(CoreError::from)?;
        return Err(CoreError::Timeout(format!(
            "mining block {} exceeded {}s timeout",
            index, config.mining_timeout
        )));
    }

    // 7. Validate against the tip.
    if let Err(reason) = block.validate(&tip.hash) {
        store
            .save_mining_attempt(&MiningAttempt {
                id: attempt_id,
                block_index: index,
                miner: miner.to_string(),
                start_time,
                end_time: Some(end_time),
                success: false,
                attempts_count: block.nonce,
            })
            .map_err(CoreError::from)?;
        return Err(CoreError::Contention(reason));
    }

    // 8. Atomically persist block, chain-stats, balance deltas, and
    // delete the processed mempool entries; update the attempt row.
    if store.block_by_hash(&block.hash).map_err(CoreError::from)?.is_some()
        || store.load_block(index).is_ok()
    {
        store
            .save_mining_attempt(&MiningAttempt {
                id: attempt_id,
                block_index: index,
                miner: miner.to_string(),
                start_time,
                end_time: Some(end_time),
                success: false,
                attempts_count: block.nonce,
            })
            .map_err(CoreError::from)?;
        return Err(CoreError::Contention(format!(
            "block {} was already committed by a concurrent miner",
            index
        )));
    }

    let deltas = balance::apply_block_effects(store, &block.transactions)
        .map_err(CoreError::Persistence)?;
    let mint_supply_bumps = supply_bumps(&selected);
    for (symbol, amount) in &mint_supply_bumps {
        if let Some(mut coin) = store.get_stablecoin(symbol).map_err(CoreError::from)? {
            coin.total_supply += *amount;
            store.save_stablecoin(&coin).map_err(CoreError::from)?;
        }
    }

    let stats = ChainStatsRow {
        block_index: index,
        difficulty: d,
        reward: r,
        mining_time: block.mining_time,
        hash_rate: if block.mining_time > 0.0 {
            2f64.powi(d as i32) / block.mining_time
        } else {
            0.0
        },
    };
    let mined_ids: Vec<String> = selected.iter().map(|t| t.id.clone()).collect();
    store
        .commit_block(&block, &stats, &deltas, &mined_ids)
        .map_err(CoreError::from)?;

    store
        .save_mining_attempt(&MiningAttempt {
            id: attempt_id,
            block_index: index,
            miner: miner.to_string(),
            start_time,
            end_time: Some(end_time),
            success: true,
            attempts_count: block.nonce,
        })
        .map_err(CoreError::from)?;

    // 9. Invalidate cached keys.
    cache.invalidate_pattern("latest_block*");
    cache.invalidate_pattern("chain_info*");
    cache.invalidate_pattern(&format!("balance_{}*", miner));

    tracing::info!(index, miner, nonce = block.nonce, "block mined");
    Ok(MinedBlock { block })
}

/// `mint_stable` transactions deferred their `total_supply` increment to
/// commit time (SPEC_FULL.md §F). Sums minted amounts by coin symbol for
/// the set of transactions just committed.
fn supply_bumps(committed: &[Transaction]) -> HashMap<String, Decimal> {
    let mut bumps = HashMap::new();
    for tx in committed {
        if tx.transaction_type == TransactionType::MintStable {
            *bumps.entry(tx.coin_type.clone()).or_insert(Decimal::ZERO) += tx.amount;
        }
    }
    bumps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InProcessCache;
    use crate::storage::{SledStore, Stablecoin};

    fn seeded_store() -> (tempfile::TempDir, SledStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        store.save_block(&Block::genesis(1)).unwrap();
        store
            .save_stablecoin(&Stablecoin {
                symbol: "CAD-COIN".into(),
                name: "CAD Coin".into(),
                collateral_ratio: Decimal::new(1, 0),
                backed_by: "CAD".into(),
                max_supply: None,
                total_supply: Decimal::ZERO,
                creation_date: 0.0,
            })
            .unwrap();
        (dir, store)
    }

    #[test]
    fn mining_empty_mempool_credits_miner_with_base_reward() {
        let (_dir, store) = seeded_store();
        let cache = InProcessCache::new(60);
        let cfg = ConsensusConfig {
            base_difficulty: 1,
            mining_timeout: 30,
            ..ConsensusConfig::default()
        };
        let result = mine(&store, &cache, &cfg, "alice").unwrap();
        assert_eq!(result.block.index, 1);
        let balance = store.get_balance("alice", "CAD-COIN").unwrap();
        assert_eq!(balance.balance, Decimal::new(50, 0));
    }

    #[test]
    fn second_mine_builds_on_first() {
        let (_dir, store) = seeded_store();
        let cache = InProcessCache::new(60);
        let cfg = ConsensusConfig {
            base_difficulty: 1,
            mining_timeout: 30,
            ..ConsensusConfig::default()
        };
        mine(&store, &cache, &cfg, "alice").unwrap();
        let second = mine(&store, &cache, &cfg, "alice").unwrap();
        assert_eq!(second.block.index, 2);
        let balance = store.get_balance("alice", "CAD-COIN").unwrap();
        assert_eq!(balance.balance, Decimal::new(100, 0));
    }
}
