use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use uuid::Uuid;

/// Kind of effect a transaction has on balances. `MiningReward` and
/// `MintStable` are synthetic — produced by the engine, never submitted
/// directly by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Transfer,
    MiningReward,
    MintStable,
}

/// Immutable value object. Once admitted to the mempool its fields must
/// never change; a new transaction is created instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub sender: String,
    pub receiver: String,
    pub amount: Decimal,
    pub fee: Decimal,
    pub coin_type: String,
    pub transaction_type: TransactionType,
    pub metadata: HashMap<String, serde_json::Value>,
    pub timestamp: f64,
}

impl Transaction {
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        amount: Decimal,
        fee: Decimal,
        coin_type: impl Into<String>,
        transaction_type: TransactionType,
        metadata: HashMap<String, serde_json::Value>,
        timestamp: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
            fee,
            coin_type: coin_type.into(),
            transaction_type,
            metadata,
            timestamp,
        }
    }

    /// Validate the invariants from the data model: positive amount,
    /// non-negative fee, no self-transfer on `transfer`, address length.
    pub fn validate(&self) -> Result<(), String> {
        if self.amount <= Decimal::ZERO {
            return Err("amount must be greater than zero".to_string());
        }
        if self.fee < Decimal::ZERO {
            return Err("fee must not be negative".to_string());
        }
        if self.sender.len() < 3 {
            return Err("sender address must be at least 3 characters".to_string());
        }
        if self.receiver.len() < 3 {
            return Err("receiver address must be at least 3 characters".to_string());
        }
        if self.transaction_type == TransactionType::Transfer && self.sender == self.receiver {
            return Err("sender and receiver must differ for a transfer".to_string());
        }
        Ok(())
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(
            self.transaction_type,
            TransactionType::MiningReward | TransactionType::MintStable
        )
    }

    /// Canonical hash: SHA-256 over the canonical (sorted-key) JSON
    /// encoding of the transaction. `serde_json`'s default map type is
    /// `BTreeMap`-backed, so `to_value` already yields sorted keys without
    /// any custom canonicalization step.
    pub fn hash(&self) -> String {
        let value = serde_json::to_value(self).expect("Transaction always serializes");
        let canonical = serde_json::to_string(&value).expect("Value always serializes");
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(sender: &str, receiver: &str, amount: &str) -> Transaction {
        Transaction::new(
            sender,
            receiver,
            amount.parse().unwrap(),
            Decimal::new(1, 3),
            "CAD-COIN",
            TransactionType::Transfer,
            HashMap::new(),
            1_700_000_000.0,
        )
    }

    #[test]
    fn rejects_zero_amount() {
        let t = tx("alice", "bob", "0");
        assert!(t.validate().is_err());
    }

    #[test]
    fn rejects_self_transfer() {
        let t = tx("alice", "alice", "10");
        assert!(t.validate().is_err());
    }

    #[test]
    fn rejects_short_address() {
        let t = tx("al", "bob", "10");
        assert!(t.validate().is_err());
    }

    #[test]
    fn accepts_valid_transfer() {
        let t = tx("alice", "bob", "10");
        assert!(t.validate().is_ok());
    }

    #[test]
    fn hash_is_stable() {
        let t = tx("alice", "bob", "10");
        assert_eq!(t.hash(), t.hash());
    }

    #[test]
    fn mining_reward_allows_zero_fee_and_equal_parties() {
        let t = Transaction::new(
            "mining_reward",
            "alice",
            Decimal::new(5000, 2),
            Decimal::ZERO,
            "CAD-COIN",
            TransactionType::MiningReward,
            HashMap::new(),
            1_700_000_000.0,
        );
        assert!(t.validate().is_ok());
    }
}
