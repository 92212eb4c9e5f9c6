// Execution - Gas pricing, dispatch and transaction routing

pub mod context;
pub mod dispatcher;
pub mod executor;
pub mod gas;
pub mod gas_table;

pub use context::{DispatchError, HandlerTable, MeteredContext, NoopContext, OpContext, OpHandler};
pub use dispatcher::Dispatcher;
pub use executor::{ExecutionError, ExecutionReceipt, ExecutionResult, TransactionExecutor};
pub use gas::{BlockGasMeter, GasError, GasMeter};
pub use gas_table::{GasTable, DEFAULT_GAS_COST};
