// SimpleVM - Generic opcode-dispatch VM
//
// Bytecode is read as big-endian 24-bit words. A trailing partial word is
// zero padded. Each word runs its registered handler (the echo handler when
// none is bound) over the running output buffer, which starts as the call
// arguments.
use crate::execution::context::DispatchError;
use crate::execution::gas_table::DEFAULT_GAS_COST;
use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Word handler: transforms the running buffer
pub type VmHandler = Arc<dyn Fn(&[u8]) -> Result<Vec<u8>, VmError> + Send + Sync>;

/// Gas cost of a bytecode word
pub type GasResolver = Arc<dyn Fn(u32) -> u64 + Send + Sync>;

/// Receives statistics after each successful execution
pub type ExecutionObserver = Arc<dyn Fn(&ExecutionStats) + Send + Sync>;

/// Resource profile. Bounds the number of concurrent executions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VmMode {
    Heavy,
    #[default]
    Light,
    SuperLight,
}

impl VmMode {
    pub fn max_concurrency(self) -> usize {
        match self {
            VmMode::Heavy => 10,
            VmMode::Light => 5,
            VmMode::SuperLight => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStats {
    pub method: String,
    pub gas_used: u64,
    /// Words executed
    pub opcodes: usize,
    pub duration: Duration,
    pub last_opcode: u32,
    pub mode: VmMode,
    /// Zero bytes added to complete the final word
    pub padded_bytes: usize,
}

/// Result of a successful execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmOutput {
    pub output: Vec<u8>,
    pub gas_used: u64,
}

struct VmState {
    running: bool,
    observer: Option<ExecutionObserver>,
    gas: GasResolver,
}

/// Counting semaphore bounding concurrent executions
struct Slots {
    in_use: Mutex<usize>,
    changed: Condvar,
    capacity: usize,
}

struct SlotGuard<'a> {
    slots: &'a Slots,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut in_use = self.slots.in_use.lock();
        *in_use -= 1;
        self.slots.changed.notify_all();
    }
}

pub struct SimpleVM {
    mode: VmMode,
    state: RwLock<VmState>,
    /// Copy-on-write so executions never hold the lock while running handlers
    handlers: RwLock<Arc<HashMap<u32, VmHandler>>>,
    default_handler: VmHandler,
    slots: Slots,
}

/// Gas resolver pricing every word at [`DEFAULT_GAS_COST`]
pub fn flat_gas_resolver() -> GasResolver {
    Arc::new(|_: u32| DEFAULT_GAS_COST)
}

fn echo_handler() -> VmHandler {
    Arc::new(|input: &[u8]| Ok(input.to_vec()))
}

impl SimpleVM {
    /// Stopped VM with only the echo handler bound at word 0
    pub fn new(mode: VmMode) -> Self {
        let default_handler = echo_handler();
        let mut handlers = HashMap::new();
        handlers.insert(0u32, default_handler.clone());

        Self {
            mode,
            state: RwLock::new(VmState {
                running: false,
                observer: None,
                gas: flat_gas_resolver(),
            }),
            handlers: RwLock::new(Arc::new(handlers)),
            default_handler,
            slots: Slots {
                in_use: Mutex::new(0),
                changed: Condvar::new(),
                capacity: mode.max_concurrency(),
            },
        }
    }

    pub fn mode(&self) -> VmMode {
        self.mode
    }

    /// Idempotent
    pub fn start(&self) {
        let mut state = self.state.write();
        if !state.running {
            state.running = true;
            info!(mode = ?self.mode, "SimpleVM started");
        }
    }

    /// Stops accepting executions, drops the observer and waits for in-flight
    /// executions to finish. Idempotent.
    pub fn stop(&self) {
        {
            let mut state = self.state.write();
            if !state.running {
                return;
            }
            state.running = false;
            state.observer = None;
        }

        let mut in_use = self.slots.in_use.lock();
        self.slots.changed.notify_all();
        while *in_use > 0 {
            self.slots.changed.wait(&mut in_use);
        }
        info!("SimpleVM stopped");
    }

    pub fn is_running(&self) -> bool {
        self.state.read().running
    }

    pub fn set_gas_resolver(&self, resolver: GasResolver) {
        self.state.write().gas = resolver;
    }

    pub fn set_observer(&self, observer: Option<ExecutionObserver>) {
        self.state.write().observer = observer;
    }

    /// Binds `handler` to `code`, replacing any previous binding
    pub fn register_opcode<F>(&self, code: u32, handler: F)
    where
        F: Fn(&[u8]) -> Result<Vec<u8>, VmError> + Send + Sync + 'static,
    {
        self.register_many(std::iter::once((code, Arc::new(handler) as VmHandler)));
    }

    /// Binds a batch of handlers under one write lock. Returns how many were
    /// registered.
    pub fn register_many<I>(&self, handlers: I) -> usize
    where
        I: IntoIterator<Item = (u32, VmHandler)>,
    {
        let mut guard = self.handlers.write();
        let mut next: HashMap<u32, VmHandler> = (**guard).clone();
        let mut count = 0usize;
        for (code, handler) in handlers {
            next.insert(code, handler);
            count += 1;
        }
        *guard = Arc::new(next);
        debug!(count, "Registered VM handlers");
        count
    }

    pub fn has_handler(&self, code: u32) -> bool {
        self.handlers.read().contains_key(&code)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    fn acquire_slot(&self) -> Result<SlotGuard<'_>, VmError> {
        let mut in_use = self.slots.in_use.lock();
        while *in_use >= self.slots.capacity {
            if !self.is_running() {
                return Err(VmError::NotRunning);
            }
            // Bounded wait so a concurrent stop is noticed
            self.slots
                .changed
                .wait_for(&mut in_use, Duration::from_millis(10));
        }
        *in_use += 1;
        Ok(SlotGuard { slots: &self.slots })
    }

    /// Executes `bytecode` over `args`.
    ///
    /// Every word costs its resolved price (a zero price counts as
    /// [`DEFAULT_GAS_COST`]). A word whose cost would take the total past
    /// `gas_limit` is not executed.
    pub fn execute(
        &self,
        bytecode: &[u8],
        method: &str,
        args: &[u8],
        gas_limit: u64,
    ) -> Result<VmOutput, VmError> {
        if !self.is_running() {
            return Err(VmError::NotRunning);
        }
        let _slot = self.acquire_slot()?;

        let (resolver, observer) = {
            let state = self.state.read();
            if !state.running {
                return Err(VmError::NotRunning);
            }
            (state.gas.clone(), state.observer.clone())
        };
        let handlers = self.handlers.read().clone();

        if bytecode.is_empty() {
            return Err(VmError::BytecodeRequired);
        }
        if gas_limit == 0 {
            return Err(VmError::GasLimitExceeded { used: 0, limit: 0 });
        }

        let start = Instant::now();
        let mut out = args.to_vec();
        let mut gas_used: u64 = 0;
        let mut opcodes = 0usize;
        let mut padded_bytes = 0usize;
        let mut last_opcode = 0u32;

        for chunk in bytecode.chunks(3) {
            let mut word = [0u8; 3];
            word[..chunk.len()].copy_from_slice(chunk);
            padded_bytes += 3 - chunk.len();

            let code = u32::from_be_bytes([0, word[0], word[1], word[2]]);
            last_opcode = code;

            let cost = match resolver(code) {
                0 => DEFAULT_GAS_COST,
                c => c,
            };
            let total = gas_used
                .checked_add(cost)
                .filter(|t| *t <= gas_limit)
                .ok_or(VmError::GasLimitExceeded {
                    used: gas_used,
                    limit: gas_limit,
                })?;

            let handler = handlers.get(&code).unwrap_or(&self.default_handler);
            out = handler(&out).map_err(|e| VmError::OpcodeFailed {
                code,
                source: Box::new(e),
            })?;

            gas_used = total;
            opcodes += 1;
        }

        let stats = ExecutionStats {
            method: method.to_string(),
            gas_used,
            opcodes,
            duration: start.elapsed(),
            last_opcode,
            mode: self.mode,
            padded_bytes,
        };
        debug!(method, gas_used, opcodes, "VM execution finished");
        if let Some(observer) = observer {
            observer(&stats);
        }

        Ok(VmOutput {
            output: out,
            gas_used,
        })
    }
}

impl std::fmt::Debug for SimpleVM {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleVM")
            .field("mode", &self.mode)
            .field("running", &self.is_running())
            .field("handlers", &self.handler_count())
            .finish()
    }
}

/// VM errors
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("VM not running")]
    NotRunning,

    #[error("Bytecode required")]
    BytecodeRequired,

    #[error("Gas limit exceeded: used {used}, limit {limit}")]
    GasLimitExceeded { used: u64, limit: u64 },

    #[error("Opcode 0x{code:06x} failed")]
    OpcodeFailed {
        code: u32,
        #[source]
        source: Box<VmError>,
    },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("{0}")]
    Handler(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn running_vm() -> SimpleVM {
        let vm = SimpleVM::new(VmMode::Light);
        vm.start();
        vm
    }

    #[test]
    fn test_not_running() {
        let vm = SimpleVM::new(VmMode::Light);
        assert_eq!(vm.execute(&[0, 0, 0], "m", b"x", 10), Err(VmError::NotRunning));

        vm.start();
        vm.start();
        assert!(vm.is_running());
        vm.stop();
        vm.stop();
        assert!(!vm.is_running());
    }

    #[test]
    fn test_empty_bytecode_and_zero_gas() {
        let vm = running_vm();
        assert_eq!(vm.execute(&[], "m", b"x", 10), Err(VmError::BytecodeRequired));
        assert!(matches!(
            vm.execute(&[0, 0, 0], "m", b"x", 0),
            Err(VmError::GasLimitExceeded { .. })
        ));
    }

    #[test]
    fn test_echo_for_unbound_words() {
        let vm = running_vm();
        let out = vm.execute(&[0xAB, 0xCD, 0xEF, 0, 0, 0], "m", b"args", 10).unwrap();
        assert_eq!(out.output, b"args".to_vec());
        assert_eq!(out.gas_used, 2);
    }

    #[test]
    fn test_registered_handler_runs_in_order() {
        let vm = running_vm();
        vm.register_opcode(0x000001, |input| {
            let mut v = input.to_vec();
            v.push(b'!');
            Ok(v)
        });
        vm.register_opcode(0x010203, |input| Ok(input.iter().rev().copied().collect()));

        let out = vm
            .execute(&[0, 0, 1, 1, 2, 3, 0, 0, 1], "m", b"ab", 100)
            .unwrap();
        assert_eq!(out.output, b"!ba!".to_vec());
        assert_eq!(out.gas_used, 3);
    }

    #[test]
    fn test_partial_word_is_padded() {
        let vm = running_vm();
        let stats = Arc::new(parking_lot::Mutex::new(None));
        let sink = stats.clone();
        vm.set_observer(Some(Arc::new(move |s: &ExecutionStats| {
            *sink.lock() = Some(s.clone());
        })));
        vm.register_opcode(0x010000, |_| Ok(b"padded".to_vec()));

        let out = vm.execute(&[0, 0, 0, 1], "pad", b"", 10).unwrap();
        assert_eq!(out.output, b"padded".to_vec());

        let stats = stats.lock().clone().unwrap();
        assert_eq!(stats.padded_bytes, 2);
        assert_eq!(stats.opcodes, 2);
        assert_eq!(stats.last_opcode, 0x010000);
        assert_eq!(stats.method, "pad");
        assert_eq!(stats.mode, VmMode::Light);
    }

    #[test]
    fn test_gas_limit_stops_before_handler() {
        let vm = running_vm();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        vm.register_opcode(0x000007, move |input| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(input.to_vec())
        });
        vm.set_gas_resolver(Arc::new(|code: u32| if code == 7 { 5 } else { 0 }));

        let err = vm.execute(&[0, 0, 7, 0, 0, 7, 0, 0, 7], "m", b"", 12).unwrap_err();
        assert_eq!(err, VmError::GasLimitExceeded { used: 10, limit: 12 });
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_zero_cost_counts_as_default() {
        let vm = running_vm();
        vm.set_gas_resolver(Arc::new(|_: u32| 0));
        let out = vm.execute(&[0, 0, 0, 0, 0, 0], "m", b"", 10).unwrap();
        assert_eq!(out.gas_used, 2 * DEFAULT_GAS_COST);
    }

    #[test]
    fn test_handler_error_is_wrapped() {
        let vm = running_vm();
        vm.register_opcode(0x000009, |_| Err(VmError::Handler("boom".into())));

        let err = vm.execute(&[0, 0, 9], "m", b"", 10).unwrap_err();
        assert_eq!(
            err,
            VmError::OpcodeFailed {
                code: 9,
                source: Box::new(VmError::Handler("boom".into())),
            }
        );
        assert_eq!(err.to_string(), "Opcode 0x000009 failed");
    }

    #[test]
    fn test_register_many_counts() {
        let vm = SimpleVM::new(VmMode::SuperLight);
        let before = vm.handler_count();
        let batch = (100..110u32).map(|code| (code, echo_handler()));
        assert_eq!(vm.register_many(batch), 10);
        assert_eq!(vm.handler_count(), before + 10);
        assert!(vm.has_handler(105));
    }

    #[test]
    fn test_stop_drops_observer() {
        let vm = running_vm();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        vm.set_observer(Some(Arc::new(move |_: &ExecutionStats| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        vm.execute(&[0, 0, 0], "m", b"", 1).unwrap();
        vm.stop();
        vm.start();
        vm.execute(&[0, 0, 0], "m", b"", 1).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_executions() {
        let vm = SimpleVM::new(VmMode::SuperLight);
        vm.start();
        vm.register_opcode(0x000001, |input| {
            std::thread::sleep(Duration::from_millis(2));
            Ok(input.to_vec())
        });

        std::thread::scope(|s| {
            for i in 0..8u8 {
                let vm = &vm;
                s.spawn(move || {
                    let out = vm.execute(&[0, 0, 1], "m", &[i], 10).unwrap();
                    assert_eq!(out.output, vec![i]);
                });
            }
        });
    }
}
