use crate::storage::Store;

/// Depth-bounded tail validation over the chain's linkage (spec §4.6).
/// Genesis is trusted; every other block in the last `depth` must link to
/// its predecessor's actual hash. Grounded on
/// `quanta::consensus::blockchain::Blockchain::is_chain_valid` and
/// `original_source/src/models/blockchain.py::validate_chain_integrity`.
pub fn validate_chain(store: &dyn Store, depth: u64) -> Result<(bool, String), String> {
    let height = store.chain_height().map_err(|e| e.to_string())?;
    if height == 0 {
        return Ok((true, "chain is empty".to_string()));
    }

    let start = height.saturating_sub(depth).max(1);
    for index in start..height {
        let block = store.load_block(index).map_err(|e| e.to_string())?;
        let previous = store.load_block(index - 1).map_err(|e| e.to_string())?;
        if block.previous_hash != previous.hash {
            return Ok((
                false,
                format!(
                    "block {} previous_hash does not match block {}'s hash",
                    index,
                    index - 1
                ),
            ));
        }
        if block.calculate_hash() != block.hash {
            return Ok((false, format!("block {} hash does not match its contents", index)));
        }
    }
    Ok((true, "chain is valid".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Block, Transaction, TransactionType};
    use crate::storage::SledStore;
    use rust_decimal::Decimal;
    use std::collections::HashMap;

    fn reward_tx() -> Transaction {
        Transaction::new(
            "mining_reward",
            "alice",
            Decimal::new(50, 0),
            Decimal::ZERO,
            "CAD-COIN",
            TransactionType::MiningReward,
            HashMap::new(),
            1.0,
        )
    }

    #[test]
    fn genesis_only_chain_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        store.save_block(&Block::genesis(4)).unwrap();
        let (valid, _) = validate_chain(&store, 10).unwrap();
        assert!(valid);
    }

    #[test]
    fn detects_corrupted_previous_hash() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        let genesis = Block::genesis(4);
        store.save_block(&genesis).unwrap();
        let mut block1 = Block::new(1, &genesis.hash, "alice", 1.0, 1, vec![reward_tx()]);
        block1.mine(30);
        store.save_block(&block1).unwrap();
        let mut corrupt = store.load_block(1).unwrap();
        corrupt.previous_hash = "deadbeef".to_string();
        store.save_block(&corrupt).unwrap();
        let (valid, message) = validate_chain(&store, 10).unwrap();
        assert!(!valid);
        assert!(message.contains('1'));
    }
}
