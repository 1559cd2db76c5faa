use crate::core::{Transaction, TransactionType};
use crate::storage::{Balance, Store};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Deterministic debit/credit effect of a committed block's transactions
/// (spec §4.7 table). Returns the set of balance rows to upsert; the
/// caller persists them inside the same commit as the block itself.
/// Grounded on `quanta::core::transaction::AccountState::credit_account`/
/// `debit_account` and `original_source/src/models/blockchain.py::
/// update_balances_enhanced`.
pub fn apply_block_effects(
    store: &dyn Store,
    transactions: &[Transaction],
) -> Result<Vec<Balance>, String> {
    let mut deltas: HashMap<(String, String), Decimal> = HashMap::new();

    for tx in transactions {
        match tx.transaction_type {
            TransactionType::Transfer => {
                *deltas
                    .entry((tx.sender.clone(), tx.coin_type.clone()))
                    .or_insert(Decimal::ZERO) -= tx.amount + tx.fee;
                *deltas
                    .entry((tx.receiver.clone(), tx.coin_type.clone()))
                    .or_insert(Decimal::ZERO) += tx.amount;
            }
            TransactionType::MiningReward | TransactionType::MintStable => {
                *deltas
                    .entry((tx.receiver.clone(), tx.coin_type.clone()))
                    .or_insert(Decimal::ZERO) += tx.amount;
            }
        }
    }

    let mut rows = Vec::with_capacity(deltas.len());
    for ((address, coin_type), delta) in deltas {
        let mut row = store
            .get_balance(&address, &coin_type)
            .map_err(|e| e.to_string())?;
        row.balance += delta;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SledStore;
    use std::collections::HashMap as Map;

    fn store() -> (tempfile::TempDir, SledStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn transfer_debits_sender_and_credits_receiver() {
        let (_dir, store) = store();
        store
            .upsert_balance(&Balance {
                address: "alice".into(),
                coin_type: "CAD-COIN".into(),
                balance: Decimal::new(50, 0),
                frozen_balance: Decimal::ZERO,
            })
            .unwrap();
        let tx = Transaction::new(
            "alice",
            "bob",
            Decimal::new(10, 0),
            Decimal::new(1, 2),
            "CAD-COIN",
            TransactionType::Transfer,
            Map::new(),
            1.0,
        );
        let rows = apply_block_effects(&store, &[tx]).unwrap();
        let alice = rows.iter().find(|r| r.address == "alice").unwrap();
        let bob = rows.iter().find(|r| r.address == "bob").unwrap();
        assert_eq!(alice.balance, Decimal::new(50, 0) - Decimal::new(1001, 2));
        assert_eq!(bob.balance, Decimal::new(10, 0));
    }

    #[test]
    fn mining_reward_only_credits_miner() {
        let (_dir, store) = store();
        let tx = Transaction::new(
            "mining_reward",
            "alice",
            Decimal::new(50, 0),
            Decimal::ZERO,
            "CAD-COIN",
            TransactionType::MiningReward,
            Map::new(),
            1.0,
        );
        let rows = apply_block_effects(&store, &[tx]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].address, "alice");
        assert_eq!(rows[0].balance, Decimal::new(50, 0));
    }
}
