// Config - Runtime configuration types
//
// Loading from files or flags is left to the host; these types only carry
// serde derives and defaults.
use crate::execution::gas::DEFAULT_BLOCK_GAS_LIMIT;
use crate::types::Address;
use crate::vm::VmMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable read for `Name=cost` gas overrides by default
pub const DEFAULT_GAS_OVERRIDES_VAR: &str = "SYN_GAS_OVERRIDES";

/// Top-level configuration consumed by [`crate::runtime::Runtime::new`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub gas: GasConfig,
    pub ledger: LedgerConfig,
    pub vm: VmConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    /// Markdown pricing guide, `None` prices everything at the default cost
    pub guide_path: Option<PathBuf>,

    /// Environment variable holding `Name=cost[,Name=cost]` overrides,
    /// applied after the guide
    pub overrides_var: Option<String>,

    /// Gas available to a single dispatch chain
    pub call_gas_limit: u64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            guide_path: None,
            overrides_var: Some(DEFAULT_GAS_OVERRIDES_VAR.to_string()),
            call_gas_limit: crate::execution::gas::DEFAULT_CALL_GAS_LIMIT,
        }
    }
}

/// Destination of transaction fees
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeePolicy {
    /// Fees leave the supply
    #[default]
    Burn,

    /// Fees are credited to a fixed address
    Sink(Address),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub fee_policy: FeePolicy,

    /// Enforced by the gas limit block validator
    pub block_gas_limit: u64,

    /// Install the gas limit validator instead of accepting every block
    pub enforce_block_gas_limit: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            fee_policy: FeePolicy::Burn,
            block_gas_limit: DEFAULT_BLOCK_GAS_LIMIT,
            enforce_block_gas_limit: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    pub mode: VmMode,
}
