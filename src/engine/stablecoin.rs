use crate::config::ConsensusConfig;
use crate::core::{Transaction, TransactionType};
use crate::engine::mempool::default_fee;
use crate::error::{CoreError, CoreResult};
use crate::storage::{AuthorizedMinter, Stablecoin, Store};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Stablecoin creation, minter authorization, and mint enqueue (spec §4.8).
/// No teacher counterpart — `quanta` has no stablecoin concept — grounded
/// directly on `original_source/src/models/blockchain.py::create_stable_coin`
/// / `add_authorized_minter` / `mint_stable_coin`.
pub const AUTHORIZER_MIN_BALANCE: &str = "100";

pub fn create(
    store: &dyn Store,
    symbol: &str,
    name: &str,
    collateral_ratio: Decimal,
    backed_by: &str,
    max_supply: Option<Decimal>,
    now: f64,
) -> CoreResult<()> {
    let symbol = symbol.to_uppercase();
    if store.get_stablecoin(&symbol).map_err(CoreError::from)?.is_some() {
        return Err(CoreError::Admission(format!(
            "stablecoin {} already exists",
            symbol
        )));
    }
    let coin = Stablecoin {
        symbol: symbol.clone(),
        name: name.to_string(),
        collateral_ratio,
        backed_by: backed_by.to_string(),
        max_supply,
        total_supply: Decimal::ZERO,
        creation_date: now,
    };
    store.save_stablecoin(&coin).map_err(CoreError::from)?;
    tracing::info!(symbol, "stablecoin created");
    Ok(())
}

pub fn authorize_minter(
    store: &dyn Store,
    symbol: &str,
    minter: &str,
    authorizer: &str,
) -> CoreResult<()> {
    let symbol = symbol.to_uppercase();
    if store.get_stablecoin(&symbol).map_err(CoreError::from)?.is_none() {
        return Err(CoreError::Validation(format!(
            "unknown stablecoin: {}",
            symbol
        )));
    }
    if authorizer != "system" {
        let threshold: Decimal = AUTHORIZER_MIN_BALANCE.parse().unwrap();
        let balance = store
            .get_balance(authorizer, "CAD-COIN")
            .map_err(CoreError::from)?
            .balance;
        if balance < threshold {
            return Err(CoreError::Admission(
                "authorizer must hold at least 100 CAD-COIN".to_string(),
            ));
        }
    }
    store
        .save_minter(&AuthorizedMinter {
            coin_symbol: symbol.to_string(),
            minter_address: minter.to_string(),
            authorizer: authorizer.to_string(),
        })
        .map_err(CoreError::from)?;
    tracing::info!(symbol, minter, authorizer, "minter authorized");
    Ok(())
}

/// Enqueues a `mint_stable` transaction as a pending mempool entry. Per
/// the Open Questions resolution in SPEC_FULL.md, `total_supply` is NOT
/// incremented here — only at block-commit time, inside
/// [`crate::engine::balance::apply_block_effects`]'s caller. The cap check
/// below counts every still-pending mint for the coin, not just the
/// requester's own, so two authorized minters can't each pass the cap
/// independently and jointly exceed it once both commit.
pub fn mint(
    store: &dyn Store,
    config: &ConsensusConfig,
    symbol: &str,
    minter: &str,
    recipient: &str,
    amount: Decimal,
    now: f64,
) -> CoreResult<Transaction> {
    let symbol = symbol.to_uppercase();
    let coin = store
        .get_stablecoin(&symbol)
        .map_err(CoreError::from)?
        .ok_or_else(|| CoreError::Validation(format!("unknown stablecoin: {}", symbol)))?;

    if !store
        .is_authorized_minter(&symbol, minter)
        .map_err(CoreError::from)?
    {
        return Err(CoreError::Admission(format!(
            "{} is not an authorized minter for {}",
            minter, symbol
        )));
    }

    if let Some(max_supply) = coin.max_supply {
        let pending_mints: Decimal = store
            .all_pending()
            .map_err(CoreError::from)?
            .into_iter()
            .filter(|p| p.transaction_type == TransactionType::MintStable && p.coin_type == symbol)
            .map(|p| p.amount)
            .sum();
        if coin.total_supply + pending_mints + amount > max_supply {
            return Err(CoreError::Admission(format!(
                "mint would exceed max_supply for {}",
                symbol
            )));
        }
    }

    let min_fee = Decimal::from_f64_retain(config.min_transaction_fee).unwrap_or(Decimal::ZERO);
    let fee = default_fee(amount, min_fee);

    let mut metadata = HashMap::new();
    metadata.insert("minter".to_string(), serde_json::Value::String(minter.to_string()));

    let tx = Transaction::new(
        minter,
        recipient,
        amount,
        fee,
        &symbol,
        TransactionType::MintStable,
        metadata,
        now,
    );
    store.enqueue_pending(&tx).map_err(CoreError::from)?;
    tracing::info!(symbol, minter, recipient, %amount, "mint enqueued");
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SledStore;

    fn store() -> (tempfile::TempDir, SledStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn create_rejects_duplicate_symbol() {
        let (_dir, store) = store();
        create(&store, "XCAD", "Test Coin", Decimal::new(1, 0), "CAD", None, 0.0).unwrap();
        assert!(create(&store, "XCAD", "Test Coin", Decimal::new(1, 0), "CAD", None, 0.0).is_err());
    }

    #[test]
    fn create_rejects_duplicate_symbol_regardless_of_case() {
        let (_dir, store) = store();
        create(&store, "XCAD", "Test Coin", Decimal::new(1, 0), "CAD", None, 0.0).unwrap();
        assert!(create(&store, "xcad", "Test Coin", Decimal::new(1, 0), "CAD", None, 0.0).is_err());
    }

    #[test]
    fn mint_enforces_supply_cap_across_all_authorized_minters() {
        let (_dir, store) = store();
        create(
            &store,
            "XCAD",
            "Test Coin",
            Decimal::new(1, 0),
            "CAD",
            Some(Decimal::new(100, 0)),
            0.0,
        )
        .unwrap();
        authorize_minter(&store, "XCAD", "alice", "system").unwrap();
        authorize_minter(&store, "XCAD", "bob", "system").unwrap();
        let cfg = ConsensusConfig::default();
        assert!(mint(&store, &cfg, "XCAD", "alice", "carol", Decimal::new(60, 0), 0.0).is_ok());
        assert!(mint(&store, &cfg, "XCAD", "bob", "carol", Decimal::new(60, 0), 0.0).is_err());
    }

    #[test]
    fn system_authorizer_bypasses_balance_check() {
        let (_dir, store) = store();
        create(&store, "XCAD", "Test Coin", Decimal::new(1, 0), "CAD", None, 0.0).unwrap();
        assert!(authorize_minter(&store, "XCAD", "alice", "system").is_ok());
    }

    #[test]
    fn non_system_authorizer_needs_balance() {
        let (_dir, store) = store();
        create(&store, "XCAD", "Test Coin", Decimal::new(1, 0), "CAD", None, 0.0).unwrap();
        assert!(authorize_minter(&store, "XCAD", "bob", "alice").is_err());
    }

    #[test]
    fn mint_rejects_unauthorized_minter() {
        let (_dir, store) = store();
        create(&store, "XCAD", "Test Coin", Decimal::new(1, 0), "CAD", None, 0.0).unwrap();
        let cfg = ConsensusConfig::default();
        assert!(mint(&store, &cfg, "XCAD", "alice", "bob", Decimal::new(10, 0), 0.0).is_err());
    }

    #[test]
    fn mint_enforces_supply_cap() {
        let (_dir, store) = store();
        create(
            &store,
            "XCAD",
            "Test Coin",
            Decimal::new(1, 0),
            "CAD",
            Some(Decimal::new(100, 0)),
            0.0,
        )
        .unwrap();
        authorize_minter(&store, "XCAD", "system", "system").unwrap();
        let cfg = ConsensusConfig::default();
        assert!(mint(&store, &cfg, "XCAD", "system", "bob", Decimal::new(50, 0), 0.0).is_ok());
        assert!(mint(&store, &cfg, "XCAD", "system", "bob", Decimal::new(60, 0), 0.0).is_err());
    }
}
