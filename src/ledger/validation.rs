// Validation - Block acceptance hook for the consensus collaborator
use crate::execution::gas::BlockGasMeter;
use crate::types::Block;

/// Decides whether a block may be appended. Runs inside the ledger's write
/// critical section, so implementations must not call back into the ledger.
pub trait BlockValidator: Send + Sync {
    /// `head` is the current chain tip, `None` before the first block
    fn validate(&self, block: &Block, head: Option<&Block>) -> Result<(), String>;
}

/// Accepts everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllBlocks;

impl BlockValidator for AcceptAllBlocks {
    fn validate(&self, _block: &Block, _head: Option<&Block>) -> Result<(), String> {
        Ok(())
    }
}

/// Rejects blocks whose transactions report more gas than the block limit
#[derive(Debug, Clone, Copy)]
pub struct GasLimitValidator {
    block_gas_limit: u64,
}

impl GasLimitValidator {
    pub fn new(block_gas_limit: u64) -> Self {
        Self { block_gas_limit }
    }
}

impl BlockValidator for GasLimitValidator {
    fn validate(&self, block: &Block, _head: Option<&Block>) -> Result<(), String> {
        let mut meter = BlockGasMeter::new(self.block_gas_limit);
        for tx in &block.transactions {
            meter
                .record_transaction(tx.gas_used)
                .map_err(|e| format!("transaction {}: {}", tx.id, e))?;
        }
        Ok(())
    }
}

/// Requires each block to extend the current head
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainLinkValidator;

impl BlockValidator for ChainLinkValidator {
    fn validate(&self, block: &Block, head: Option<&Block>) -> Result<(), String> {
        let Some(head) = head else {
            return Ok(());
        };
        let expected = head
            .height
            .checked_add(1)
            .ok_or_else(|| format!("head {} is the last representable height", head.height))?;
        if block.height != expected {
            return Err(format!(
                "height {} does not follow head {}",
                block.height, head.height
            ));
        }
        if block.prev_hash != head.hash {
            return Err(format!("parent {} is not head {}", block.prev_hash, head.hash));
        }
        Ok(())
    }
}

/// Runs validators in order, stopping at the first rejection
pub struct ValidatorChain {
    validators: Vec<Box<dyn BlockValidator>>,
}

impl ValidatorChain {
    pub fn new(validators: Vec<Box<dyn BlockValidator>>) -> Self {
        Self { validators }
    }
}

impl BlockValidator for ValidatorChain {
    fn validate(&self, block: &Block, head: Option<&Block>) -> Result<(), String> {
        self.validators
            .iter()
            .try_for_each(|v| v.validate(block, head))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Hash, Transaction};

    fn block_with_gas(gas: &[u64]) -> Block {
        let txs = gas
            .iter()
            .enumerate()
            .map(|(i, g)| Transaction::new("a", "b", 1, 0, i as u64).with_gas_used(*g))
            .collect();
        Block::new(1, Hash::ZERO, txs)
    }

    #[test]
    fn test_gas_limit_validator() {
        let validator = GasLimitValidator::new(100);
        assert!(validator.validate(&block_with_gas(&[40, 60]), None).is_ok());

        let err = validator.validate(&block_with_gas(&[40, 61]), None).unwrap_err();
        assert!(err.contains("Block gas limit exceeded"), "{err}");
    }

    #[test]
    fn test_chain_link_validator() {
        let genesis = Block::new(0, Hash::ZERO, vec![]);
        let next = Block::new(1, genesis.hash, vec![]);
        let orphan = Block::new(1, Hash::ZERO, vec![]);
        let skip = Block::new(2, genesis.hash, vec![]);

        let v = ChainLinkValidator;
        assert!(v.validate(&genesis, None).is_ok());
        assert!(v.validate(&next, Some(&genesis)).is_ok());
        assert!(v.validate(&orphan, Some(&genesis)).is_err());
        assert!(v.validate(&skip, Some(&genesis)).is_err());
    }

    #[test]
    fn test_chain_link_rejects_past_max_height() {
        let head = Block::new(u64::MAX, Hash::ZERO, vec![]);
        let wrapped = Block::new(0, head.hash, vec![]);

        let err = ChainLinkValidator.validate(&wrapped, Some(&head)).unwrap_err();
        assert!(err.contains("last representable height"), "{err}");
    }

    #[test]
    fn test_validator_chain_stops_at_first_rejection() {
        let chain = ValidatorChain::new(vec![
            Box::new(AcceptAllBlocks),
            Box::new(GasLimitValidator::new(10)),
        ]);
        assert!(chain.validate(&block_with_gas(&[5]), None).is_ok());
        assert!(chain.validate(&block_with_gas(&[11]), None).is_err());
    }
}
