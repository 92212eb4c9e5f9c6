// Gas - Metering for dispatch chains and blocks

/// Default block gas limit
pub const DEFAULT_BLOCK_GAS_LIMIT: u64 = 10_000_000;

/// Default gas limit for a single dispatch chain
pub const DEFAULT_CALL_GAS_LIMIT: u64 = 1_000_000;

/// Gas counter for one dispatch chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasMeter {
    gas_limit: u64,

    gas_used: u64,
}

impl GasMeter {
    pub fn new(gas_limit: u64) -> Self {
        Self {
            gas_limit,
            gas_used: 0,
        }
    }

    /// Meter that never runs out, for trusted internal calls
    pub fn unlimited() -> Self {
        Self::new(u64::MAX)
    }

    /// Consumes gas. The meter is unchanged on error.
    pub fn consume(&mut self, amount: u64) -> Result<(), GasError> {
        let new_used = self
            .gas_used
            .checked_add(amount)
            .ok_or(GasError::Overflow)?;

        if new_used > self.gas_limit {
            return Err(GasError::OutOfGas {
                needed: amount,
                remaining: self.gas_limit - self.gas_used,
            });
        }

        self.gas_used = new_used;
        Ok(())
    }

    pub fn refund(&mut self, amount: u64) {
        self.gas_used = self.gas_used.saturating_sub(amount);
    }

    pub fn remaining(&self) -> u64 {
        self.gas_limit.saturating_sub(self.gas_used)
    }

    pub fn used(&self) -> u64 {
        self.gas_used
    }

    pub fn limit(&self) -> u64 {
        self.gas_limit
    }

    /// Lets handlers check before committing side effects
    pub fn check_available(&self, amount: u64) -> Result<(), GasError> {
        if self.remaining() < amount {
            return Err(GasError::OutOfGas {
                needed: amount,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.gas_used = 0;
    }
}

/// Gas counter for a whole block
#[derive(Debug)]
pub struct BlockGasMeter {
    block_gas_limit: u64,

    block_gas_used: u64,
}

impl BlockGasMeter {
    pub fn new(block_gas_limit: u64) -> Self {
        Self {
            block_gas_limit,
            block_gas_used: 0,
        }
    }

    pub fn can_fit_transaction(&self, tx_gas: u64) -> bool {
        self.block_gas_used
            .checked_add(tx_gas)
            .map_or(false, |total| total <= self.block_gas_limit)
    }

    /// Records the gas of one transaction
    pub fn record_transaction(&mut self, gas_used: u64) -> Result<(), GasError> {
        let new_total = self
            .block_gas_used
            .checked_add(gas_used)
            .ok_or(GasError::Overflow)?;

        if new_total > self.block_gas_limit {
            return Err(GasError::BlockGasLimitExceeded {
                limit: self.block_gas_limit,
                used: new_total,
            });
        }

        self.block_gas_used = new_total;
        Ok(())
    }

    pub fn remaining(&self) -> u64 {
        self.block_gas_limit.saturating_sub(self.block_gas_used)
    }

    pub fn used(&self) -> u64 {
        self.block_gas_used
    }
}

/// Gas errors
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum GasError {
    #[error("Out of gas: needed {needed}, remaining {remaining}")]
    OutOfGas { needed: u64, remaining: u64 },

    #[error("Block gas limit exceeded: limit {limit}, used {used}")]
    BlockGasLimitExceeded { limit: u64, used: u64 },

    #[error("Gas overflow")]
    Overflow,

    #[error("Invalid gas registration: {0}")]
    InvalidRegistration(&'static str),

    #[error("Unknown opcode name: {0}")]
    UnknownName(String),

    #[error("Opcode {0:#04x} is not catalogued")]
    Uncatalogued(u8),

    #[error("Gas table incomplete, missing: {}", .0.join(", "))]
    Incomplete(Vec<String>),

    #[error("Gas snapshot encoding failed: {0}")]
    Json(String),

    #[error("Gas snapshot I/O failed: {0}")]
    Io(String),
}
