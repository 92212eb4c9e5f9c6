// Binding - Wires catalogue opcodes into the SimpleVM
use super::simple::{GasResolver, SimpleVM, VmError, VmHandler};
use crate::execution::context::{NoopContext, OpContext};
use crate::execution::dispatcher::Dispatcher;
use crate::execution::gas_table::{GasTable, DEFAULT_GAS_COST};
use crate::opcodes::Opcode;
use std::sync::Arc;
use tracing::info;

/// Produces a fresh context for each VM-initiated dispatch
pub type ContextFactory = Arc<dyn Fn() -> Box<dyn OpContext> + Send + Sync>;

/// Registers one handler per catalogued opcode, keyed by its widened value.
///
/// Each handler dispatches through a context from `factory` (a
/// [`NoopContext`] when `None`) and passes its input through unchanged.
/// Returns the number of handlers registered.
pub fn bind_vm(vm: &SimpleVM, dispatcher: Arc<Dispatcher>, factory: Option<ContextFactory>) -> usize {
    let handlers: Vec<(u32, VmHandler)> = dispatcher
        .catalogue()
        .opcodes()
        .map(|op| (op.widen(), dispatch_handler(op, dispatcher.clone(), factory.clone())))
        .collect();

    let count = vm.register_many(handlers);
    info!(count, "Bound catalogue opcodes to SimpleVM");
    count
}

fn dispatch_handler(op: Opcode, dispatcher: Arc<Dispatcher>, factory: Option<ContextFactory>) -> VmHandler {
    Arc::new(move |input: &[u8]| -> Result<Vec<u8>, VmError> {
        let mut ctx: Box<dyn OpContext> = match &factory {
            Some(make) => make(),
            None => Box::new(NoopContext),
        };
        dispatcher.dispatch(ctx.as_mut(), op)?;
        Ok(input.to_vec())
    })
}

/// Prices catalogued words from `table` and everything else at
/// [`DEFAULT_GAS_COST`]
pub fn gas_resolver(table: Arc<GasTable>) -> GasResolver {
    Arc::new(move |code: u32| {
        u8::try_from(code)
            .ok()
            .map(Opcode::new)
            .filter(|op| table.catalogue().contains(*op))
            .map_or(DEFAULT_GAS_COST, |op| table.gas_cost(op))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::context::{DispatchError, HandlerTable, MeteredContext};
    use crate::execution::gas::GasError;
    use crate::opcodes::OpcodeCatalogue;
    use crate::vm::VmMode;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dispatcher(prices: &[(&str, u64)]) -> Arc<Dispatcher> {
        let catalogue = Arc::new(OpcodeCatalogue::builtin().unwrap());
        let prices: HashMap<String, u64> =
            prices.iter().map(|(n, c)| (n.to_string(), *c)).collect();
        let gas = Arc::new(GasTable::new(catalogue.clone(), &prices));
        Arc::new(Dispatcher::new(catalogue, gas))
    }

    fn word(op: Opcode) -> [u8; 3] {
        let b = op.widen().to_be_bytes();
        [b[1], b[2], b[3]]
    }

    #[test]
    fn test_bind_vm_registers_one_handler_per_opcode() {
        let d = dispatcher(&[]);
        let vm = SimpleVM::new(VmMode::Light);

        let count = bind_vm(&vm, d.clone(), None);
        assert_eq!(count, d.catalogue().len());
        for op in d.catalogue().opcodes() {
            assert!(vm.has_handler(op.widen()), "{op} unbound");
        }
        // Noop is word 0, so its binding replaces the echo handler rather than adding one
        assert_eq!(vm.handler_count(), d.catalogue().len());
    }

    #[test]
    fn test_nil_factory_always_succeeds() {
        let d = dispatcher(&[]);
        let vm = SimpleVM::new(VmMode::Light);
        vm.start();
        bind_vm(&vm, d.clone(), None);

        let code: Vec<u8> = d.catalogue().opcodes().flat_map(word).collect();
        let out = vm.execute(&code, "all", b"payload", u64::MAX).unwrap();
        assert_eq!(out.output, b"payload".to_vec());
    }

    #[test]
    fn test_factory_context_receives_dispatch() {
        let d = dispatcher(&[("Mint", 30)]);
        let mint = d.catalogue().lookup("Mint").unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        let mut table = HandlerTable::new();
        let counter = hits.clone();
        table.bind(mint, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let table = Arc::new(table);

        // Budget below the Mint price: the handler runs, the charge fails
        let factory: ContextFactory = {
            let table = table.clone();
            Arc::new(move || Box::new(MeteredContext::new(table.clone(), 10)) as Box<dyn OpContext>)
        };

        let vm = SimpleVM::new(VmMode::Light);
        vm.start();
        bind_vm(&vm, d.clone(), Some(factory));

        let err = vm.execute(&word(mint), "mint", b"", 100).unwrap_err();
        match err {
            VmError::OpcodeFailed { code, source } => {
                assert_eq!(code, mint.widen());
                assert!(matches!(
                    *source,
                    VmError::Dispatch(DispatchError::Gas(GasError::OutOfGas { needed: 30, .. }))
                ));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_gas_resolver_prices_catalogue_words() {
        let d = dispatcher(&[("Transfer", 21)]);
        let resolve = gas_resolver(d.gas_table().clone());
        let transfer = d.catalogue().lookup("Transfer").unwrap();

        assert_eq!(resolve(transfer.widen()), 21);
        assert_eq!(resolve(0xFF), DEFAULT_GAS_COST);
        assert_eq!(resolve(0x01_0010), DEFAULT_GAS_COST);
    }

    #[test]
    fn test_vm_charges_gas_table_prices() {
        let d = dispatcher(&[("Transfer", 21)]);
        let transfer = d.catalogue().lookup("Transfer").unwrap();
        let vm = SimpleVM::new(VmMode::Heavy);
        vm.start();
        vm.set_gas_resolver(gas_resolver(d.gas_table().clone()));
        bind_vm(&vm, d, None);

        let out = vm.execute(&word(transfer), "transfer", b"", 100).unwrap();
        assert_eq!(out.gas_used, 21);
        assert!(matches!(
            vm.execute(&word(transfer), "transfer", b"", 20),
            Err(VmError::GasLimitExceeded { used: 0, limit: 20 })
        ));
    }
}
