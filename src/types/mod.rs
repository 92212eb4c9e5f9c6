// Core types shared by the ledger, the dispatcher and both VMs

pub mod primitives;
pub mod account;
pub mod transaction;
pub mod block;

pub use primitives::*;
pub use account::*;
pub use transaction::*;
pub use block::*;
