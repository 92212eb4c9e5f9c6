// Opcodes - Catalogue of metered protocol operations

pub mod catalogue;
pub mod well_known;

pub use catalogue::{
    CatalogueEntry, CatalogueError, IntegrityError, Opcode, OpcodeCatalogue, BUILTIN_OPCODES,
};
pub use well_known::WellKnownOpcodes;
