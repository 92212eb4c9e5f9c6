// Block - Ordered batch of transactions linked to its parent
use super::primitives::{now_secs, BlockNumber, Hash, Timestamp};
use super::transaction::Transaction;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Height in the chain, genesis is 0
    pub height: BlockNumber,

    pub prev_hash: Hash,

    pub timestamp: Timestamp,

    pub transactions: Vec<Transaction>,

    /// Header hash, see [`Block::compute_hash`]
    pub hash: Hash,
}

impl Block {
    pub fn new(height: BlockNumber, prev_hash: Hash, transactions: Vec<Transaction>) -> Self {
        let mut block = Self {
            height,
            prev_hash,
            timestamp: now_secs(),
            transactions,
            hash: Hash::ZERO,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Hash over the header fields and the transaction ids
    pub fn compute_hash(&self) -> Hash {
        let mut data = Vec::with_capacity(48 + self.transactions.len() * 32);
        data.extend_from_slice(&self.height.to_le_bytes());
        data.extend_from_slice(self.prev_hash.as_bytes());
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        for tx in &self.transactions {
            data.extend_from_slice(tx.id.as_bytes());
        }
        Hash::hash(&data)
    }

    /// Sum of the gas reported by the contained transactions
    pub fn total_gas(&self) -> Option<u64> {
        self.transactions
            .iter()
            .try_fold(0u64, |acc, tx| acc.checked_add(tx.gas_used))
    }
}
