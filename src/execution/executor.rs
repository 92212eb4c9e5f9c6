// Executor - Routes transactions to the SNVM, the ledger or the SimpleVM
use crate::ledger::{Ledger, LedgerError};
use crate::types::{Amount, Block, Hash, Transaction, TransactionReceipt};
use crate::vm::snvm::{self, SnvmError};
use crate::vm::{SimpleVM, VmError, VmOutput};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of one pooled transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub tx_hash: Hash,
    pub success: bool,
    pub fee_paid: Amount,
    /// SNVM result, if the transaction carried a program
    pub program_result: Option<i64>,
    pub error: Option<String>,
}

/// Successful execution of a single transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReceipt {
    pub receipt: TransactionReceipt,
    pub program_result: Option<i64>,
}

#[derive(Debug)]
pub struct TransactionExecutor {
    ledger: Arc<Ledger>,
    vm: Arc<SimpleVM>,
    call_gas_limit: u64,
}

impl TransactionExecutor {
    pub fn new(ledger: Arc<Ledger>, vm: Arc<SimpleVM>, call_gas_limit: u64) -> Self {
        Self {
            ledger,
            vm,
            call_gas_limit,
        }
    }

    /// Runs the transaction's program, if any, then applies its transfer.
    /// A failing program rejects the transaction before the ledger is touched.
    pub fn execute(&self, tx: &Transaction) -> Result<ExecutionReceipt, ExecutionError> {
        let program_result = if tx.has_program() {
            let result = snvm::execute(&tx.program)?;
            debug!(tx = %tx.id, result, "SNVM program finished");
            Some(result)
        } else {
            None
        };

        let receipt = self.ledger.apply_transaction(Some(tx))?;
        Ok(ExecutionReceipt {
            receipt,
            program_result,
        })
    }

    /// Runs opcode bytecode on the SimpleVM under the configured gas limit
    pub fn invoke(&self, bytecode: &[u8], method: &str, args: &[u8]) -> Result<VmOutput, ExecutionError> {
        Ok(self.vm.execute(bytecode, method, args, self.call_gas_limit)?)
    }

    /// Executes a snapshot of the pool in insertion order. Failed
    /// transactions stay pooled.
    pub fn execute_pool(&self) -> Vec<(Transaction, ExecutionResult)> {
        self.ledger
            .pool()
            .into_iter()
            .map(|tx| {
                let result = match self.execute(&tx) {
                    Ok(done) => ExecutionResult {
                        tx_hash: tx.id,
                        success: true,
                        fee_paid: done.receipt.fee_paid,
                        program_result: done.program_result,
                        error: None,
                    },
                    Err(e) => {
                        warn!(tx = %tx.id, error = %e, "Pooled transaction failed");
                        ExecutionResult {
                            tx_hash: tx.id,
                            success: false,
                            fee_paid: 0,
                            program_result: None,
                            error: Some(e.to_string()),
                        }
                    }
                };
                (tx, result)
            })
            .collect()
    }

    /// Executes the pool and appends a block holding the transactions that
    /// succeeded, linked to the current head.
    ///
    /// Programs run first. Transactions whose program fails stay pooled and
    /// never reach the ledger. The rest are applied together with the block
    /// append: if the block is rejected the ledger and pool are unchanged.
    pub fn produce_block(&self) -> Result<(Block, Vec<ExecutionResult>), LedgerError> {
        let pool = self.ledger.pool();

        let mut programs: Vec<Result<Option<i64>, SnvmError>> = Vec::with_capacity(pool.len());
        let mut candidates = Vec::new();
        for tx in &pool {
            let program = if tx.has_program() {
                snvm::execute(&tx.program).map(Some)
            } else {
                Ok(None)
            };
            if program.is_ok() {
                candidates.push(tx.clone());
            }
            programs.push(program);
        }

        let applied = self.ledger.apply_block(&candidates)?;
        let mut receipts = applied.receipts.into_iter();

        let results = pool
            .iter()
            .zip(programs)
            .map(|(tx, program)| {
                let outcome = program
                    .map_err(ExecutionError::from)
                    .and_then(|program_result| {
                        let receipt = receipts
                            .next()
                            .unwrap_or(Err(LedgerError::NilTransaction))?;
                        Ok((receipt, program_result))
                    });
                match outcome {
                    Ok((receipt, program_result)) => ExecutionResult {
                        tx_hash: tx.id,
                        success: true,
                        fee_paid: receipt.fee_paid,
                        program_result,
                        error: None,
                    },
                    Err(e) => {
                        warn!(tx = %tx.id, error = %e, "Transaction left out of block");
                        ExecutionResult {
                            tx_hash: tx.id,
                            success: false,
                            fee_paid: 0,
                            program_result: None,
                            error: Some(e.to_string()),
                        }
                    }
                }
            })
            .collect();

        Ok((applied.block, results))
    }
}

/// Executor errors
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Program rejected: {0}")]
    Program(#[from] SnvmError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Vm(#[from] VmError),
}
