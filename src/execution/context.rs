// Context - Capability handed to the dispatcher
use super::gas::{GasError, GasMeter};
use crate::ledger::LedgerError;
use crate::opcodes::{CatalogueError, Opcode, OpcodeCatalogue};
use std::collections::HashMap;
use std::sync::Arc;

/// Execution environment for one dispatch chain.
///
/// `call` runs the side effect bound to an opcode, `gas` deducts units and
/// fails once the budget is exhausted.
pub trait OpContext {
    fn call(&mut self, op: Opcode) -> Result<(), DispatchError>;

    fn gas(&mut self, amount: u64) -> Result<(), DispatchError>;
}

/// Context with no side effects and unlimited gas
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopContext;

impl OpContext for NoopContext {
    fn call(&mut self, _op: Opcode) -> Result<(), DispatchError> {
        Ok(())
    }

    fn gas(&mut self, _amount: u64) -> Result<(), DispatchError> {
        Ok(())
    }
}

/// Side effect bound to an opcode. Receives the chain's meter so it can check
/// gas before committing anything.
pub type OpHandler = Arc<dyn Fn(Opcode, &mut GasMeter) -> Result<(), DispatchError> + Send + Sync>;

/// Opcode-keyed handler table
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<Opcode, OpHandler>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `handler` to `op`, replacing any previous binding
    pub fn bind<F>(&mut self, op: Opcode, handler: F) -> &mut Self
    where
        F: Fn(Opcode, &mut GasMeter) -> Result<(), DispatchError> + Send + Sync + 'static,
    {
        self.handlers.insert(op, Arc::new(handler));
        self
    }

    /// Binds by catalogue name
    pub fn bind_by_name<F>(
        &mut self,
        catalogue: &OpcodeCatalogue,
        name: &str,
        handler: F,
    ) -> Result<&mut Self, CatalogueError>
    where
        F: Fn(Opcode, &mut GasMeter) -> Result<(), DispatchError> + Send + Sync + 'static,
    {
        let op = catalogue
            .lookup(name)
            .ok_or_else(|| CatalogueError::UnknownName(name.to_string()))?;
        Ok(self.bind(op, handler))
    }

    pub fn get(&self, op: Opcode) -> Option<&OpHandler> {
        self.handlers.get(&op)
    }

    pub fn is_bound(&self, op: Opcode) -> bool {
        self.handlers.contains_key(&op)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut bound: Vec<Opcode> = self.handlers.keys().copied().collect();
        bound.sort();
        f.debug_struct("HandlerTable").field("bound", &bound).finish()
    }
}

/// Production context: a shared handler table plus a per-chain gas meter
#[derive(Debug, Clone)]
pub struct MeteredContext {
    handlers: Arc<HandlerTable>,
    meter: GasMeter,
}

impl MeteredContext {
    pub fn new(handlers: Arc<HandlerTable>, gas_limit: u64) -> Self {
        Self {
            handlers,
            meter: GasMeter::new(gas_limit),
        }
    }

    pub fn meter(&self) -> &GasMeter {
        &self.meter
    }

    pub fn gas_used(&self) -> u64 {
        self.meter.used()
    }
}

impl OpContext for MeteredContext {
    fn call(&mut self, op: Opcode) -> Result<(), DispatchError> {
        let handler = self.handlers.get(op).ok_or(DispatchError::NoHandler(op))?;
        handler(op, &mut self.meter)
    }

    fn gas(&mut self, amount: u64) -> Result<(), DispatchError> {
        self.meter.consume(amount)?;
        Ok(())
    }
}

/// Dispatch errors
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Catalogue(#[from] CatalogueError),

    #[error(transparent)]
    Gas(#[from] GasError),

    #[error("No handler bound for opcode {0}")]
    NoHandler(Opcode),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Handler for {op} failed: {reason}")]
    Handler { op: Opcode, reason: String },
}
