// Runtime - Owns and wires the core components
//
// Nothing here is global: hosts construct a Runtime and hand out the shared
// pieces they need.
use crate::config::CoreConfig;
use crate::execution::{
    Dispatcher, GasError, GasTable, HandlerTable, MeteredContext, OpContext, TransactionExecutor,
};
use crate::ledger::Ledger;
use crate::opcodes::{IntegrityError, OpcodeCatalogue, WellKnownOpcodes};
use crate::vm::{bind_vm, gas_resolver, ContextFactory, SimpleVM};
use std::sync::Arc;
use tracing::info;

pub struct Runtime {
    config: CoreConfig,
    catalogue: Arc<OpcodeCatalogue>,
    well_known: WellKnownOpcodes,
    gas: Arc<GasTable>,
    dispatcher: Arc<Dispatcher>,
    handlers: Arc<HandlerTable>,
    vm: Arc<SimpleVM>,
    ledger: Arc<Ledger>,
    executor: TransactionExecutor,
}

impl Runtime {
    /// Runtime over the built-in catalogue with no opcode side effects bound
    pub fn new(config: CoreConfig) -> Result<Self, StartupError> {
        Self::with_handlers(config, |_, _| HandlerTable::new())
    }

    /// Runtime over the built-in catalogue. `handlers` receives the runtime's
    /// ledger and resolved opcodes and returns the side effects to bind.
    pub fn with_handlers<F>(config: CoreConfig, handlers: F) -> Result<Self, StartupError>
    where
        F: FnOnce(&Arc<Ledger>, &WellKnownOpcodes) -> HandlerTable,
    {
        Self::assemble(config, OpcodeCatalogue::builtin()?, handlers)
    }

    /// Builds every component around `catalogue`.
    ///
    /// With an empty handler table VM-initiated dispatches run against a
    /// `NoopContext`; otherwise each one gets a fresh `MeteredContext`.
    pub fn assemble<F>(
        config: CoreConfig,
        catalogue: OpcodeCatalogue,
        handlers: F,
    ) -> Result<Self, StartupError>
    where
        F: FnOnce(&Arc<Ledger>, &WellKnownOpcodes) -> HandlerTable,
    {
        let catalogue = Arc::new(catalogue);
        let well_known = WellKnownOpcodes::resolve(&catalogue)?;

        let gas = Arc::new(GasTable::from_config(catalogue.clone(), &config.gas));
        gas.validate(&WellKnownOpcodes::NAMES)?;

        let ledger = Arc::new(Ledger::from_config(&config.ledger));
        let handlers = Arc::new(handlers(&ledger, &well_known));

        let dispatcher = Arc::new(Dispatcher::new(catalogue.clone(), gas.clone()));

        let vm = Arc::new(SimpleVM::new(config.vm.mode));
        vm.set_gas_resolver(gas_resolver(gas.clone()));
        let factory = if handlers.is_empty() {
            None
        } else {
            Some(metered_factory(handlers.clone(), config.gas.call_gas_limit))
        };
        let bound = bind_vm(&vm, dispatcher.clone(), factory);
        vm.start();

        let executor = TransactionExecutor::new(ledger.clone(), vm.clone(), config.gas.call_gas_limit);

        info!(
            opcodes = catalogue.len(),
            bound,
            handlers = handlers.len(),
            mode = ?config.vm.mode,
            "Runtime ready"
        );

        Ok(Self {
            config,
            catalogue,
            well_known,
            gas,
            dispatcher,
            handlers,
            vm,
            ledger,
            executor,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn catalogue(&self) -> &Arc<OpcodeCatalogue> {
        &self.catalogue
    }

    pub fn well_known(&self) -> &WellKnownOpcodes {
        &self.well_known
    }

    pub fn gas_table(&self) -> &Arc<GasTable> {
        &self.gas
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn vm(&self) -> &Arc<SimpleVM> {
        &self.vm
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn executor(&self) -> &TransactionExecutor {
        &self.executor
    }

    /// Fresh context over the runtime's handlers with the configured call gas
    pub fn metered_context(&self) -> MeteredContext {
        MeteredContext::new(self.handlers.clone(), self.config.gas.call_gas_limit)
    }

    /// Stops the VM, waiting for in-flight executions
    pub fn shutdown(&self) {
        self.vm.stop();
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("opcodes", &self.catalogue.len())
            .field("vm", &self.vm)
            .field("ledger", &self.ledger)
            .finish()
    }
}

fn metered_factory(handlers: Arc<HandlerTable>, gas_limit: u64) -> ContextFactory {
    Arc::new(move || Box::new(MeteredContext::new(handlers.clone(), gas_limit)) as Box<dyn OpContext>)
}

/// Fatal startup failures
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum StartupError {
    #[error("Catalogue integrity: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("Gas table: {0}")]
    Gas(#[from] GasError),
}
