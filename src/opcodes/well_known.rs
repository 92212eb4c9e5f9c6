// Well-known opcodes - Names the core itself dispatches on
use super::catalogue::{IntegrityError, Opcode, OpcodeCatalogue};

/// Opcodes the core depends on, resolved once at startup. A missing name
/// fails startup; handler builders bind through these fields instead of
/// looking names up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WellKnownOpcodes {
    pub noop: Opcode,
    pub push: Opcode,
    pub add: Opcode,
    pub sub: Opcode,
    pub mul: Opcode,
    pub div: Opcode,
    pub transfer: Opcode,
    pub mint: Opcode,
    pub burn: Opcode,
    pub credit: Opcode,
    pub apply_transaction: Opcode,
    pub add_block: Opcode,
    pub add_to_pool: Opcode,
}

impl WellKnownOpcodes {
    /// Every name resolved by [`WellKnownOpcodes::resolve`]
    pub const NAMES: [&'static str; 13] = [
        "Noop",
        "Push",
        "Add",
        "Sub",
        "Mul",
        "Div",
        "Transfer",
        "Mint",
        "Burn",
        "Credit",
        "ApplyTransaction",
        "AddBlock",
        "AddToPool",
    ];

    pub fn resolve(catalogue: &OpcodeCatalogue) -> Result<Self, IntegrityError> {
        let get = |name: &'static str| {
            catalogue
                .lookup(name)
                .ok_or(IntegrityError::MissingWellKnown(name))
        };

        Ok(Self {
            noop: get("Noop")?,
            push: get("Push")?,
            add: get("Add")?,
            sub: get("Sub")?,
            mul: get("Mul")?,
            div: get("Div")?,
            transfer: get("Transfer")?,
            mint: get("Mint")?,
            burn: get("Burn")?,
            credit: get("Credit")?,
            apply_transaction: get("ApplyTransaction")?,
            add_block: get("AddBlock")?,
            add_to_pool: get("AddToPool")?,
        })
    }
}
