use super::{
    AuthorizedMinter, Balance, ChainStatsRow, MiningAttempt, Stablecoin, Store, StorageError,
    StorageResult, User,
};
use crate::core::{Block, Transaction};
use std::path::Path;

/// Embedded, single-process implementation of the durable-store contract.
/// Grounded on `quanta::storage::db::BlockchainStorage`'s sled usage,
/// generalized from a single "blocks + account state" pair to the full
/// table set spec §6 names, one `sled::Tree` per table.
pub struct SledStore {
    blocks: sled::Tree,
    blocks_by_hash: sled::Tree,
    balances: sled::Tree,
    stablecoins: sled::Tree,
    minters: sled::Tree,
    pending: sled::Tree,
    chain_stats: sled::Tree,
    mining_attempts: sled::Tree,
    users: sled::Tree,
    meta: sled::Tree,
}

fn balance_key(address: &str, coin_type: &str) -> String {
    format!("{address}\u{0}{coin_type}")
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let db = sled::open(path)?;
        let store = Self {
            blocks: db.open_tree("blocks")?,
            blocks_by_hash: db.open_tree("blocks_by_hash")?,
            balances: db.open_tree("balances")?,
            stablecoins: db.open_tree("stablecoins")?,
            minters: db.open_tree("minters")?,
            pending: db.open_tree("pending")?,
            chain_stats: db.open_tree("chain_stats")?,
            mining_attempts: db.open_tree("mining_attempts")?,
            users: db.open_tree("users")?,
            meta: db.open_tree("meta")?,
        };
        tracing::info!("ledger store opened");
        Ok(store)
    }
}

impl Store for SledStore {
    fn save_block(&self, block: &Block) -> StorageResult<()> {
        let key = block.index.to_be_bytes();
        let value = serde_json::to_vec(block)?;
        self.blocks.insert(key, value)?;
        self.blocks_by_hash
            .insert(block.hash.as_bytes(), &block.index.to_be_bytes())?;
        self.meta.insert(b"chain_height", &(block.index + 1).to_be_bytes())?;
        self.blocks.flush()?;
        self.blocks_by_hash.flush()?;
        self.meta.flush()?;
        tracing::debug!(index = block.index, "block saved");
        Ok(())
    }

    fn load_block(&self, index: u64) -> StorageResult<Block> {
        let value = self
            .blocks
            .get(index.to_be_bytes())?
            .ok_or(StorageError::BlockNotFound(index))?;
        Ok(serde_json::from_slice(&value)?)
    }

    fn block_by_hash(&self, hash: &str) -> StorageResult<Option<Block>> {
        match self.blocks_by_hash.get(hash.as_bytes())? {
            Some(idx_bytes) => {
                let idx = u64::from_be_bytes(idx_bytes.as_ref().try_into().map_err(|_| {
                    StorageError::Database(sled::Error::Unsupported("corrupt index entry".into()))
                })?);
                Ok(Some(self.load_block(idx)?))
            }
            None => Ok(None),
        }
    }

    fn chain_height(&self) -> StorageResult<u64> {
        match self.meta.get(b"chain_height")? {
            Some(v) => Ok(u64::from_be_bytes(v.as_ref().try_into().map_err(|_| {
                StorageError::Database(sled::Error::Unsupported("corrupt chain_height".into()))
            })?)),
            None => Ok(0),
        }
    }

    fn load_chain_tail(&self, limit: u64) -> StorageResult<Vec<Block>> {
        let height = self.chain_height()?;
        if height == 0 {
            return Ok(Vec::new());
        }
        let start = height.saturating_sub(limit);
        let mut blocks = Vec::new();
        for i in (start..height).rev() {
            blocks.push(self.load_block(i)?);
        }
        Ok(blocks)
    }

    fn load_chain_range(&self, offset: u64, limit: u64) -> StorageResult<Vec<Block>> {
        let height = self.chain_height()?;
        if height == 0 || offset >= height {
            return Ok(Vec::new());
        }
        let top = height - 1;
        let mut blocks = Vec::new();
        let mut idx = top.saturating_sub(offset);
        loop {
            blocks.push(self.load_block(idx)?);
            if blocks.len() as u64 >= limit || idx == 0 {
                break;
            }
            idx -= 1;
        }
        Ok(blocks)
    }

    fn upsert_balance(&self, balance: &Balance) -> StorageResult<()> {
        let key = balance_key(&balance.address, &balance.coin_type);
        let value = serde_json::to_vec(balance)?;
        self.balances.insert(key.as_bytes(), value)?;
        self.balances.flush()?;
        Ok(())
    }

    fn get_balance(&self, address: &str, coin_type: &str) -> StorageResult<Balance> {
        let key = balance_key(address, coin_type);
        match self.balances.get(key.as_bytes())? {
            Some(v) => Ok(serde_json::from_slice(&v)?),
            None => Ok(Balance {
                address: address.to_string(),
                coin_type: coin_type.to_string(),
                balance: rust_decimal::Decimal::ZERO,
                frozen_balance: rust_decimal::Decimal::ZERO,
            }),
        }
    }

    fn get_balances(&self, address: &str) -> StorageResult<Vec<Balance>> {
        let prefix = format!("{address}\u{0}");
        let mut out = Vec::new();
        for item in self.balances.scan_prefix(prefix.as_bytes()) {
            let (_, v) = item?;
            out.push(serde_json::from_slice(&v)?);
        }
        Ok(out)
    }

    fn save_stablecoin(&self, coin: &Stablecoin) -> StorageResult<()> {
        let value = serde_json::to_vec(coin)?;
        self.stablecoins.insert(coin.symbol.as_bytes(), value)?;
        self.stablecoins.flush()?;
        Ok(())
    }

    fn get_stablecoin(&self, symbol: &str) -> StorageResult<Option<Stablecoin>> {
        match self.stablecoins.get(symbol.as_bytes())? {
            Some(v) => Ok(Some(serde_json::from_slice(&v)?)),
            None => Ok(None),
        }
    }

    fn all_stablecoins(&self) -> StorageResult<Vec<Stablecoin>> {
        let mut out = Vec::new();
        for item in self.stablecoins.iter() {
            let (_, v) = item?;
            out.push(serde_json::from_slice(&v)?);
        }
        Ok(out)
    }

    fn save_minter(&self, minter: &AuthorizedMinter) -> StorageResult<()> {
        let key = format!("{}\u{0}{}", minter.coin_symbol, minter.minter_address);
        let value = serde_json::to_vec(minter)?;
        self.minters.insert(key.as_bytes(), value)?;
        self.minters.flush()?;
        Ok(())
    }

    fn is_authorized_minter(&self, symbol: &str, minter: &str) -> StorageResult<bool> {
        if minter == "system" {
            return Ok(true);
        }
        let key = format!("{symbol}\u{0}{minter}");
        Ok(self.minters.contains_key(key.as_bytes())?)
    }

    fn enqueue_pending(&self, tx: &Transaction) -> StorageResult<()> {
        let value = serde_json::to_vec(tx)?;
        self.pending.insert(tx.id.as_bytes(), value)?;
        self.pending.flush()?;
        Ok(())
    }

    fn remove_pending(&self, tx_id: &str) -> StorageResult<()> {
        self.pending.remove(tx_id.as_bytes())?;
        Ok(())
    }

    fn all_pending(&self) -> StorageResult<Vec<Transaction>> {
        let mut out = Vec::new();
        for item in self.pending.iter() {
            let (_, v) = item?;
            out.push(serde_json::from_slice(&v)?);
        }
        Ok(out)
    }

    fn pending_count(&self) -> StorageResult<usize> {
        Ok(self.pending.len())
    }

    fn save_chain_stats(&self, row: &ChainStatsRow) -> StorageResult<()> {
        let value = serde_json::to_vec(row)?;
        self.chain_stats.insert(row.block_index.to_be_bytes(), value)?;
        self.chain_stats.flush()?;
        Ok(())
    }

    fn get_chain_stats(&self, block_index: u64) -> StorageResult<Option<ChainStatsRow>> {
        match self.chain_stats.get(block_index.to_be_bytes())? {
            Some(v) => Ok(Some(serde_json::from_slice(&v)?)),
            None => Ok(None),
        }
    }

    fn chain_stats_tail(&self, limit: u64) -> StorageResult<Vec<ChainStatsRow>> {
        let mut out = Vec::new();
        for item in self.chain_stats.iter().rev().take(limit as usize) {
            let (_, v) = item?;
            out.push(serde_json::from_slice(&v)?);
        }
        Ok(out)
    }

    fn save_mining_attempt(&self, attempt: &MiningAttempt) -> StorageResult<()> {
        let value = serde_json::to_vec(attempt)?;
        self.mining_attempts.insert(attempt.id.as_bytes(), value)?;
        self.mining_attempts.flush()?;
        Ok(())
    }

    fn mining_attempts_since(&self, since: f64) -> StorageResult<Vec<MiningAttempt>> {
        let mut out = Vec::new();
        for item in self.mining_attempts.iter() {
            let (_, v) = item?;
            let attempt: MiningAttempt = serde_json::from_slice(&v)?;
            if attempt.start_time >= since {
                out.push(attempt);
            }
        }
        Ok(out)
    }

    fn save_user(&self, user: &User) -> StorageResult<()> {
        let value = serde_json::to_vec(user)?;
        self.users.insert(user.address.as_bytes(), value)?;
        self.users.flush()?;
        Ok(())
    }

    fn get_user(&self, address: &str) -> StorageResult<Option<User>> {
        match self.users.get(address.as_bytes())? {
            Some(v) => Ok(Some(serde_json::from_slice(&v)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TransactionType;
    use rust_decimal::Decimal;
    use std::collections::HashMap;

    fn temp_store() -> (tempfile::TempDir, SledStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn genesis_height_is_zero_before_any_block() {
        let (_dir, store) = temp_store();
        assert_eq!(store.chain_height().unwrap(), 0);
    }

    #[test]
    fn save_and_load_block_round_trips() {
        let (_dir, store) = temp_store();
        let block = Block::genesis(4);
        store.save_block(&block).unwrap();
        let loaded = store.load_block(0).unwrap();
        assert_eq!(loaded.hash, block.hash);
        assert_eq!(store.chain_height().unwrap(), 1);
    }

    #[test]
    fn balance_defaults_to_zero_when_absent() {
        let (_dir, store) = temp_store();
        let b = store.get_balance("alice", "CAD-COIN").unwrap();
        assert_eq!(b.balance, Decimal::ZERO);
    }

    #[test]
    fn balance_upsert_overwrites() {
        let (_dir, store) = temp_store();
        store
            .upsert_balance(&Balance {
                address: "alice".into(),
                coin_type: "CAD-COIN".into(),
                balance: Decimal::new(10, 0),
                frozen_balance: Decimal::ZERO,
            })
            .unwrap();
        store
            .upsert_balance(&Balance {
                address: "alice".into(),
                coin_type: "CAD-COIN".into(),
                balance: Decimal::new(25, 0),
                frozen_balance: Decimal::ZERO,
            })
            .unwrap();
        let b = store.get_balance("alice", "CAD-COIN").unwrap();
        assert_eq!(b.balance, Decimal::new(25, 0));
    }

    #[test]
    fn pending_transactions_enqueue_and_remove() {
        let (_dir, store) = temp_store();
        let tx = Transaction::new(
            "alice",
            "bob",
            Decimal::new(10, 0),
            Decimal::new(1, 2),
            "CAD-COIN",
            TransactionType::Transfer,
            HashMap::new(),
            1.0,
        );
        store.enqueue_pending(&tx).unwrap();
        assert_eq!(store.pending_count().unwrap(), 1);
        store.remove_pending(&tx.id).unwrap();
        assert_eq!(store.pending_count().unwrap(), 0);
    }

    #[test]
    fn minter_authorization_idempotent() {
        let (_dir, store) = temp_store();
        let minter = AuthorizedMinter {
            coin_symbol: "CAD-COIN".into(),
            minter_address: "alice".into(),
            authorizer: "system".into(),
        };
        store.save_minter(&minter).unwrap();
        store.save_minter(&minter).unwrap();
        assert!(store.is_authorized_minter("CAD-COIN", "alice").unwrap());
    }

    #[test]
    fn system_is_always_an_authorized_minter() {
        let (_dir, store) = temp_store();
        assert!(store.is_authorized_minter("CAD-COIN", "system").unwrap());
    }
}
