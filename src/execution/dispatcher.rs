// Dispatcher - Resolve, invoke, charge
use super::context::{DispatchError, OpContext};
use super::gas_table::GasTable;
use crate::opcodes::{CatalogueError, Opcode, OpcodeCatalogue};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Dispatcher {
    catalogue: Arc<OpcodeCatalogue>,
    gas: Arc<GasTable>,
}

impl Dispatcher {
    pub fn new(catalogue: Arc<OpcodeCatalogue>, gas: Arc<GasTable>) -> Self {
        Self { catalogue, gas }
    }

    pub fn catalogue(&self) -> &Arc<OpcodeCatalogue> {
        &self.catalogue
    }

    pub fn gas_table(&self) -> &Arc<GasTable> {
        &self.gas
    }

    /// Runs `op` through `ctx` and charges its cost afterwards.
    ///
    /// Effects of a successful `call` are not rolled back if the charge fails.
    pub fn dispatch(&self, ctx: &mut dyn OpContext, op: Opcode) -> Result<(), DispatchError> {
        let entry = self
            .catalogue
            .entry(op)
            .ok_or(CatalogueError::UnknownOpcode(op.byte()))?;
        let cost = self.gas.gas_cost(op);

        ctx.call(op)?;
        ctx.gas(cost)?;

        debug!(opcode = %op, name = %entry.name, cost, "Dispatched");
        Ok(())
    }

    pub fn dispatch_by_name(&self, ctx: &mut dyn OpContext, name: &str) -> Result<(), DispatchError> {
        let byte = self.catalogue.to_bytecode(name)?;
        self.dispatch(ctx, Opcode::new(byte))
    }

    /// Dispatches one opcode per byte, stopping at the first failure
    pub fn dispatch_bytecode(&self, ctx: &mut dyn OpContext, code: &[u8]) -> Result<usize, DispatchError> {
        for &byte in code {
            let op = self.catalogue.parse_opcode(byte)?;
            self.dispatch(ctx, op)?;
        }
        Ok(code.len())
    }
}
