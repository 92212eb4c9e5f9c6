// Ledger - Balances, UTXOs, pool and chain behind one lock
//
// All state sits under a single RwLock. Each mutation is one write critical
// section, so readers never see a balance without its outputs.

mod state;
pub mod state_rw;
pub mod validation;

pub use state::SupplyStats;
pub use state_rw::{PrefixIterator, StateRW};
pub use validation::{
    AcceptAllBlocks, BlockValidator, ChainLinkValidator, GasLimitValidator, ValidatorChain,
};

use crate::config::{FeePolicy, LedgerConfig};
use crate::types::{Address, Amount, Block, BlockNumber, Hash, Nonce, Transaction, TransactionReceipt, Utxo};
use parking_lot::RwLock;
use state::LedgerState;
use tracing::{debug, info};

pub struct Ledger {
    state: RwLock<LedgerState>,
    fee_policy: FeePolicy,
    validator: Box<dyn BlockValidator>,
}

impl Ledger {
    /// Empty ledger accepting every block
    pub fn new(fee_policy: FeePolicy) -> Self {
        Self::with_validator(fee_policy, Box::new(AcceptAllBlocks))
    }

    pub fn with_validator(fee_policy: FeePolicy, validator: Box<dyn BlockValidator>) -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
            fee_policy,
            validator,
        }
    }

    /// Ledger per `config`: fee policy plus, when enabled, the block gas
    /// limit validator
    pub fn from_config(config: &LedgerConfig) -> Self {
        let validator: Box<dyn BlockValidator> = if config.enforce_block_gas_limit {
            Box::new(GasLimitValidator::new(config.block_gas_limit))
        } else {
            Box::new(AcceptAllBlocks)
        };
        Self::with_validator(config.fee_policy.clone(), validator)
    }

    pub fn fee_policy(&self) -> &FeePolicy {
        &self.fee_policy
    }

    /// Adds `amount` to `address` as a new output
    pub fn credit(&self, address: &Address, amount: Amount) -> Result<(), LedgerError> {
        self.state.write().issue(address, amount, false)?;
        debug!(%address, amount, "Credited");
        Ok(())
    }

    /// Like [`Ledger::credit`], also counted as issuance
    pub fn mint(&self, address: &Address, amount: Amount) -> Result<(), LedgerError> {
        self.state.write().issue(address, amount, true)?;
        debug!(%address, amount, "Minted");
        Ok(())
    }

    /// Destroys `amount`, returning the change output if one was created
    pub fn burn(&self, address: &Address, amount: Amount) -> Result<Option<Utxo>, LedgerError> {
        let change = self.state.write().burn(address, amount)?;
        debug!(%address, amount, "Burned");
        Ok(change)
    }

    /// Moves `amount` from `from` to `to` and routes `fee` per the fee policy
    pub fn transfer(&self, from: &Address, to: &Address, amount: Amount, fee: Amount) -> Result<(), LedgerError> {
        self.state
            .write()
            .transfer(from, to, amount, fee, &self.fee_policy, false)?;
        debug!(%from, %to, amount, fee, "Transferred");
        Ok(())
    }

    /// Applies `tx` as a transfer, removes it from the pool and bumps the
    /// sender nonce
    pub fn apply_transaction(&self, tx: Option<&Transaction>) -> Result<TransactionReceipt, LedgerError> {
        let tx = tx.ok_or(LedgerError::NilTransaction)?;

        let outcome = {
            let mut state = self.state.write();
            let outcome = state.transfer(&tx.from, &tx.to, tx.amount, tx.fee, &self.fee_policy, true)?;
            state.remove_from_pool(tx);
            outcome
        };
        debug!(tx = %tx.id, from = %tx.from, to = %tx.to, amount = tx.amount, "Applied transaction");

        Ok(TransactionReceipt {
            tx_id: tx.id,
            amount: tx.amount,
            fee_paid: outcome.fee_paid,
            fee_sink: outcome.fee_sink,
        })
    }

    pub fn add_to_pool(&self, tx: Transaction) {
        debug!(tx = %tx.id, "Pooled transaction");
        self.state.write().pool.push(tx);
    }

    /// Pending transactions in insertion order
    pub fn pool(&self) -> Vec<Transaction> {
        self.state.read().pool.clone()
    }

    pub fn pool_len(&self) -> usize {
        self.state.read().pool.len()
    }

    /// Appends `block` once the validator accepts it
    pub fn add_block(&self, block: Option<&Block>) -> Result<(), LedgerError> {
        let block = block.ok_or(LedgerError::NilBlock)?;

        let mut state = self.state.write();
        self.validator
            .validate(block, state.blocks.last())
            .map_err(LedgerError::BlockRejected)?;
        state.blocks.push(block.clone());
        drop(state);

        info!(height = block.height, hash = %block.hash, txs = block.transactions.len(), "Block added");
        Ok(())
    }

    /// Applies `candidates` in order and appends a block of those that
    /// succeeded, linked to the current head, as one unit.
    ///
    /// Each candidate is staged on top of the ones accepted before it. If the
    /// validator rejects the block nothing is committed: balances, nonces and
    /// the pool are left as they were.
    pub fn apply_block(&self, candidates: &[Transaction]) -> Result<AppliedBlock, LedgerError> {
        let mut state = self.state.write();

        let (height, prev_hash) = match state.blocks.last() {
            Some(head) => (head.height.checked_add(1).ok_or(LedgerError::Overflow)?, head.hash),
            None => (0, Hash::ZERO),
        };

        let batch = state.stage_batch(candidates, &self.fee_policy);
        let included: Vec<Transaction> = candidates
            .iter()
            .zip(&batch.outcomes)
            .filter(|(_, outcome)| outcome.is_ok())
            .map(|(tx, _)| tx.clone())
            .collect();
        let receipts = candidates
            .iter()
            .zip(&batch.outcomes)
            .map(|(tx, outcome)| {
                outcome.clone().map(|done| TransactionReceipt {
                    tx_id: tx.id,
                    amount: tx.amount,
                    fee_paid: done.fee_paid,
                    fee_sink: done.fee_sink,
                })
            })
            .collect();

        let block = Block::new(height, prev_hash, included);
        self.validator
            .validate(&block, state.blocks.last())
            .map_err(LedgerError::BlockRejected)?;

        state.commit_batch(batch);
        for tx in &block.transactions {
            state.remove_from_pool(tx);
        }
        state.blocks.push(block.clone());
        drop(state);

        info!(height = block.height, hash = %block.hash, txs = block.transactions.len(), "Block applied");
        Ok(AppliedBlock { block, receipts })
    }

    /// Height and hash of the latest block
    pub fn head(&self) -> Option<(BlockNumber, Hash)> {
        self.state.read().blocks.last().map(|b| (b.height, b.hash))
    }

    pub fn get_block(&self, height: BlockNumber) -> Option<Block> {
        self.state
            .read()
            .blocks
            .iter()
            .rev()
            .find(|b| b.height == height)
            .cloned()
    }

    pub fn block_count(&self) -> usize {
        self.state.read().blocks.len()
    }

    pub fn get_balance(&self, address: &Address) -> Amount {
        self.state.read().balance(address)
    }

    /// Unspent outputs of `address`, oldest first
    pub fn get_utxos(&self, address: &Address) -> Vec<Utxo> {
        self.state.read().utxos(address)
    }

    pub fn nonce_of(&self, address: &Address) -> Nonce {
        self.state.read().nonce(address)
    }

    pub fn supply(&self) -> SupplyStats {
        self.state.read().supply
    }

    /// Checks `balance == sum(utxos)` for every account and that balances
    /// add up to the total supply
    pub fn is_consistent(&self) -> bool {
        self.state.read().is_consistent()
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Ledger")
            .field("accounts", &state.accounts.len())
            .field("pool", &state.pool.len())
            .field("blocks", &state.blocks.len())
            .field("supply", &state.supply)
            .field("fee_policy", &self.fee_policy)
            .finish()
    }
}

/// Result of [`Ledger::apply_block`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedBlock {
    pub block: Block,
    /// One entry per candidate, in order. Only the `Ok` ones are in `block`.
    pub receipts: Vec<Result<TransactionReceipt, LedgerError>>,
}

/// Ledger errors, all recoverable
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Nil block")]
    NilBlock,

    #[error("Nil transaction")]
    NilTransaction,

    #[error("Empty address")]
    EmptyAddress,

    #[error("Invalid amount")]
    InvalidAmount,

    #[error("Insufficient funds for {address}: needed {needed}, available {available}")]
    InsufficientFunds {
        address: Address,
        needed: Amount,
        available: Amount,
    },

    #[error("Amount overflow")]
    Overflow,

    #[error("Block rejected: {0}")]
    BlockRejected(String),
}
