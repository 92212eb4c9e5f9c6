// Transaction - Value transfer with an optional embedded program
use super::primitives::{now_secs, Address, Amount, Hash, Nonce, Timestamp};
use crate::vm::snvm::Instruction;
use serde::{Deserialize, Serialize};

/// Transaction as created by a caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Content hash, see [`Transaction::compute_id`]
    pub id: Hash,

    pub from: Address,

    pub to: Address,

    pub amount: Amount,

    pub fee: Amount,

    pub nonce: Nonce,

    /// Gas consumed by the transaction, reported to block validation
    pub gas_used: u64,

    /// SNVM program, empty for plain transfers
    pub program: Vec<Instruction>,

    pub timestamp: Timestamp,
}

/// Fields covered by the transaction id
#[derive(Serialize)]
struct TransactionBody<'a> {
    from: &'a Address,
    to: &'a Address,
    amount: Amount,
    fee: Amount,
    nonce: Nonce,
    gas_used: u64,
    program: &'a [Instruction],
    timestamp: Timestamp,
}

impl Transaction {
    pub fn new(from: impl Into<Address>, to: impl Into<Address>, amount: Amount, fee: Amount, nonce: Nonce) -> Self {
        let mut tx = Self {
            id: Hash::ZERO,
            from: from.into(),
            to: to.into(),
            amount,
            fee,
            nonce,
            gas_used: 0,
            program: Vec::new(),
            timestamp: now_secs(),
        };
        tx.id = tx.compute_id();
        tx
    }

    /// Attaches an SNVM program
    pub fn with_program(mut self, program: Vec<Instruction>) -> Self {
        self.program = program;
        self.id = self.compute_id();
        self
    }

    pub fn with_gas_used(mut self, gas_used: u64) -> Self {
        self.gas_used = gas_used;
        self.id = self.compute_id();
        self
    }

    /// Hash of every field except the id itself
    pub fn compute_id(&self) -> Hash {
        let body = TransactionBody {
            from: &self.from,
            to: &self.to,
            amount: self.amount,
            fee: self.fee,
            nonce: self.nonce,
            gas_used: self.gas_used,
            program: &self.program,
            timestamp: self.timestamp,
        };
        match bincode::serialize(&body) {
            Ok(bytes) => Hash::hash(&bytes),
            Err(_) => {
                // Fallback: key fields only
                let mut data = Vec::new();
                data.extend_from_slice(self.from.as_str().as_bytes());
                data.extend_from_slice(self.to.as_str().as_bytes());
                data.extend_from_slice(&self.amount.to_le_bytes());
                data.extend_from_slice(&self.fee.to_le_bytes());
                data.extend_from_slice(&self.nonce.to_le_bytes());
                data.extend_from_slice(&self.timestamp.to_le_bytes());
                Hash::hash(&data)
            }
        }
    }

    /// Amount plus fee, `None` on overflow
    pub fn total_cost(&self) -> Option<Amount> {
        self.amount.checked_add(self.fee)
    }

    pub fn has_program(&self) -> bool {
        !self.program.is_empty()
    }
}

/// Outcome of a successfully applied transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub tx_id: Hash,

    /// Amount credited to the recipient
    pub amount: Amount,

    /// Fee debited from the sender
    pub fee_paid: Amount,

    /// Fee destination, `None` when burned
    pub fee_sink: Option<Address>,
}
