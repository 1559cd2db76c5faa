use crate::config::ConsensusConfig;
use crate::core::{Transaction, TransactionType};
use crate::error::{CoreError, CoreResult};
use crate::storage::Store;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Default fee when the caller doesn't specify one: `max(MIN_TRANSACTION_FEE,
/// amount * 0.001)`.
pub fn default_fee(amount: Decimal, min_fee: Decimal) -> Decimal {
    let proportional = amount * Decimal::new(1, 3);
    proportional.max(min_fee)
}

/// Five-condition admission gate from spec §4.3. The committed-balance
/// check uses the "effective balance" mitigation for the double-spend
/// window noted in spec §9: committed balance minus the sender's own
/// still-pending debits in the same coin.
pub fn admit(store: &dyn Store, tx: &Transaction, config: &ConsensusConfig) -> CoreResult<()> {
    tx.validate().map_err(CoreError::Validation)?;

    if store
        .get_stablecoin(&tx.coin_type)
        .map_err(CoreError::from)?
        .is_none()
    {
        return Err(CoreError::Validation(format!(
            "unknown coin type: {}",
            tx.coin_type
        )));
    }

    let min_fee = Decimal::from_f64_retain(config.min_transaction_fee).unwrap_or(Decimal::ZERO);
    if tx.fee < min_fee {
        return Err(CoreError::Validation(format!(
            "fee {} below minimum {}",
            tx.fee, min_fee
        )));
    }

    if tx.transaction_type == TransactionType::Transfer {
        let committed = store
            .get_balance(&tx.sender, &tx.coin_type)
            .map_err(CoreError::from)?
            .balance;
        let pending_debits: Decimal = store
            .all_pending()
            .map_err(CoreError::from)?
            .into_iter()
            .filter(|p| {
                p.sender == tx.sender
                    && p.coin_type == tx.coin_type
                    && p.transaction_type == TransactionType::Transfer
            })
            .map(|p| p.amount + p.fee)
            .sum();
        let effective = committed - pending_debits;
        if effective < tx.amount + tx.fee {
            return Err(CoreError::Validation("Insufficient balance".to_string()));
        }
    }

    let pending_count = store.pending_count().map_err(CoreError::from)?;
    if pending_count >= config.max_pending_transactions {
        return Err(CoreError::Admission("mempool is full".to_string()));
    }

    Ok(())
}

/// Effective priority at time `now`: `fee + age_hours`, used to order
/// dequeue (priority DESC, insertion time ASC as tiebreak).
fn priority(tx: &Transaction, now: f64) -> f64 {
    let fee = tx.fee.to_f64().unwrap_or(0.0);
    let age_hours = ((now - tx.timestamp).max(0.0)) / 3600.0;
    fee + age_hours
}

/// Up to `limit` pending transactions ordered by priority, descending,
/// insertion time ascending on ties.
pub fn priority_pending(store: &dyn Store, limit: usize, now: f64) -> CoreResult<Vec<Transaction>> {
    let mut pending = store.all_pending().map_err(CoreError::from)?;
    pending.sort_by(|a, b| {
        let pa = priority(a, now);
        let pb = priority(b, now);
        pb.partial_cmp(&pa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.timestamp.partial_cmp(&b.timestamp).unwrap_or(std::cmp::Ordering::Equal))
    });
    pending.truncate(limit);
    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{SledStore, Stablecoin};
    use std::collections::HashMap;

    fn store_with_cadcoin() -> (tempfile::TempDir, SledStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
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

    fn transfer(sender: &str, receiver: &str, amount: &str, fee: &str) -> Transaction {
        Transaction::new(
            sender,
            receiver,
            amount.parse().unwrap(),
            fee.parse().unwrap(),
            "CAD-COIN",
            TransactionType::Transfer,
            HashMap::new(),
            1000.0,
        )
    }

    #[test]
    fn rejects_unknown_coin() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        let cfg = ConsensusConfig::default();
        let tx = transfer("alice", "bob", "10", "0.01");
        assert!(admit(&store, &tx, &cfg).is_err());
    }

    #[test]
    fn rejects_insufficient_balance() {
        let (_dir, store) = store_with_cadcoin();
        let cfg = ConsensusConfig::default();
        let tx = transfer("alice", "bob", "10", "0.01");
        assert!(admit(&store, &tx, &cfg).is_err());
    }

    #[test]
    fn accepts_when_balance_covers_amount_and_fee() {
        let (_dir, store) = store_with_cadcoin();
        store
            .upsert_balance(&crate::storage::Balance {
                address: "alice".into(),
                coin_type: "CAD-COIN".into(),
                balance: Decimal::new(50, 0),
                frozen_balance: Decimal::ZERO,
            })
            .unwrap();
        let cfg = ConsensusConfig::default();
        let tx = transfer("alice", "bob", "10", "0.01");
        assert!(admit(&store, &tx, &cfg).is_ok());
    }

    #[test]
    fn effective_balance_accounts_for_own_pending_debits() {
        let (_dir, store) = store_with_cadcoin();
        store
            .upsert_balance(&crate::storage::Balance {
                address: "alice".into(),
                coin_type: "CAD-COIN".into(),
                balance: Decimal::new(15, 0),
                frozen_balance: Decimal::ZERO,
            })
            .unwrap();
        let cfg = ConsensusConfig::default();
        let first = transfer("alice", "bob", "10", "0.01");
        assert!(admit(&store, &first, &cfg).is_ok());
        store.enqueue_pending(&first).unwrap();
        let second = transfer("alice", "carol", "10", "0.01");
        assert!(admit(&store, &second, &cfg).is_err());
    }

    #[test]
    fn priority_orders_by_fee_then_age() {
        let high_fee = transfer("alice", "bob", "10", "5");
        let low_fee = transfer("alice", "bob", "10", "0.01");
        assert!(priority(&high_fee, 1000.0) > priority(&low_fee, 1000.0));
    }

    #[test]
    fn default_fee_is_proportional_but_floored() {
        let min = Decimal::new(1, 3);
        assert_eq!(default_fee(Decimal::new(10, 0), min), Decimal::new(1, 2));
        assert_eq!(default_fee(Decimal::new(0, 0), min), min);
    }
}
