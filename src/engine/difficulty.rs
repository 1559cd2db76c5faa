use crate::config::ConsensusConfig;
use crate::storage::{ChainStatsRow, Store};
use rust_decimal::Decimal;

/// Computes the next block's difficulty from the retarget table in spec
/// §4.4, driven by the mean inter-block time over the most recent
/// `DIFFICULTY_ADJUSTMENT_INTERVAL + 1` blocks. Grounded on
/// `original_source/src/models/blockchain.py::calculate_current_difficulty`
/// — the teacher repo's PoW has no retargeting at all.
pub fn next_difficulty(store: &dyn Store, config: &ConsensusConfig) -> Result<u32, String> {
    let window = config.difficulty_adjustment_interval + 1;
    let blocks = store
        .load_chain_tail(window)
        .map_err(|e| e.to_string())?;

    if (blocks.len() as u64) < window {
        return Ok(config.base_difficulty);
    }

    // `load_chain_tail` returns tip-first; walk it oldest-first to compute
    // consecutive deltas.
    let mut ordered = blocks;
    ordered.reverse();
    let mut deltas = Vec::with_capacity(ordered.len().saturating_sub(1));
    for pair in ordered.windows(2) {
        deltas.push((pair[1].timestamp - pair[0].timestamp).max(0.0));
    }
    let mean: f64 = if deltas.is_empty() {
        config.target_block_time
    } else {
        deltas.iter().sum::<f64>() / deltas.len() as f64
    };

    let d0 = ordered.last().map(|b| b.difficulty).unwrap_or(config.base_difficulty);
    let target = config.target_block_time;

    let next = if mean < 0.5 * target {
        (d0 + 2).min(config.max_difficulty)
    } else if mean < 0.8 * target {
        (d0 + 1).min(config.max_difficulty)
    } else if mean <= 1.5 * target {
        d0
    } else if mean <= 2.0 * target {
        d0.saturating_sub(1).max(config.base_difficulty)
    } else {
        d0.saturating_sub(2).max(config.base_difficulty)
    };

    Ok(next)
}

/// Reward for the block at `index`: `max(BASE_MINING_REWARD /
/// 2^(index / HALVING_INTERVAL), 0.1)`, with integer division in the
/// exponent (the halving step function, not a continuous decay).
pub fn reward_for_index(index: u64, config: &ConsensusConfig) -> Decimal {
    let halvings = (index / config.halving_interval) as u32;
    let base = Decimal::from_f64_or_zero(config.base_mining_reward);
    let divisor = Decimal::from(2u64.saturating_pow(halvings.min(63)));
    let halved = if divisor.is_zero() { Decimal::ZERO } else { base / divisor };
    let floor = Decimal::new(1, 1); // 0.1
    halved.max(floor)
}

trait DecimalExt {
    fn from_f64_or_zero(v: f64) -> Decimal;
}

impl DecimalExt for Decimal {
    fn from_f64_or_zero(v: f64) -> Decimal {
        Decimal::from_f64_retain(v).unwrap_or(Decimal::ZERO)
    }
}

/// Estimated network hash rate: mean of `2^difficulty / mining_time` over
/// the last 10 non-genesis chain-stats rows.
pub fn estimated_hash_rate(rows: &[ChainStatsRow]) -> f64 {
    let samples: Vec<f64> = rows
        .iter()
        .filter(|r| r.block_index > 0 && r.mining_time > 0.0)
        .take(10)
        .map(|r| 2f64.powi(r.difficulty as i32) / r.mining_time)
        .collect();
    if samples.is_empty() {
        0.0
    } else {
        samples.iter().sum::<f64>() / samples.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_halves_at_interval() {
        let cfg = ConsensusConfig {
            base_mining_reward: 50.0,
            halving_interval: 100,
            ..ConsensusConfig::default()
        };
        assert_eq!(reward_for_index(0, &cfg), Decimal::new(50, 0));
        assert_eq!(reward_for_index(100, &cfg), Decimal::new(25, 0));
        assert_eq!(reward_for_index(200, &cfg), Decimal::new(125, 1));
    }

    #[test]
    fn reward_floors_at_one_tenth() {
        let cfg = ConsensusConfig {
            base_mining_reward: 50.0,
            halving_interval: 1,
            ..ConsensusConfig::default()
        };
        assert_eq!(reward_for_index(100, &cfg), Decimal::new(1, 1));
    }

    #[test]
    fn difficulty_defaults_to_base_until_window_full() {
        let cfg = ConsensusConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let store = crate::storage::SledStore::open(dir.path()).unwrap();
        assert_eq!(next_difficulty(&store, &cfg).unwrap(), cfg.base_difficulty);
    }
}
