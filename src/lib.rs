// Synnergy core - Opcode catalogue, gas metering, virtual machines and ledger
//
// Passive library: hosts build a `Runtime` from a `CoreConfig` and call into
// the shared components from any number of threads.

pub mod config;
pub mod execution;
pub mod ledger;
pub mod opcodes;
pub mod runtime;
pub mod types;
pub mod vm;

#[cfg(test)]
mod tests;

pub use config::{CoreConfig, FeePolicy, GasConfig, LedgerConfig, VmConfig};
pub use execution::{
    DispatchError, Dispatcher, ExecutionError, GasError, GasTable, MeteredContext, NoopContext,
    OpContext, TransactionExecutor, DEFAULT_GAS_COST,
};
pub use ledger::{Ledger, LedgerError, StateRW};
pub use opcodes::{CatalogueError, IntegrityError, Opcode, OpcodeCatalogue, WellKnownOpcodes};
pub use runtime::{Runtime, StartupError};
pub use vm::{SimpleVM, SnvmError, VmError, VmMode};
