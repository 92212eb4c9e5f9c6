// VM - Opcode-dispatch VM and the SNVM stack machine

pub mod binding;
pub mod simple;
pub mod snvm;

pub use binding::{bind_vm, gas_resolver, ContextFactory};
pub use simple::{
    ExecutionObserver, ExecutionStats, GasResolver, SimpleVM, VmError, VmHandler, VmMode, VmOutput,
};
pub use snvm::{Instruction, SnvmError, SnvmOp};
