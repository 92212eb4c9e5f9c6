// Catalogue - Static name <-> opcode registry
//
// Single source of truth for opcode bytes. The gas table, the VM bindings and
// the documentation tables are all derived from it.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Single-byte identifier of a catalogued protocol operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Opcode(u8);

impl Opcode {
    pub const fn new(byte: u8) -> Self {
        Opcode(byte)
    }

    /// Wire encoding
    pub const fn byte(self) -> u8 {
        self.0
    }

    /// Key used by the SimpleVM handler map, shared with extension opcodes
    pub const fn widen(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// Catalogue row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogueEntry {
    pub name: String,
    pub opcode: Opcode,
}

/// Built-in catalogue. Bytes are stable across releases: never renumber,
/// only append.
pub const BUILTIN_OPCODES: &[(&str, u8)] = &[
    // SNVM arithmetic
    ("Noop", 0x00),
    ("Push", 0x01),
    ("Add", 0x02),
    ("Sub", 0x03),
    ("Mul", 0x04),
    ("Div", 0x05),
    // Ledger
    ("Transfer", 0x10),
    ("Mint", 0x11),
    ("Burn", 0x12),
    ("Credit", 0x13),
    ("ApplyTransaction", 0x14),
    ("AddBlock", 0x15),
    ("AddToPool", 0x16),
    ("GetBalance", 0x17),
    ("GetUTXOs", 0x18),
    ("Pool", 0x19),
    ("Head", 0x1A),
    ("GetBlock", 0x1B),
    // Scratch state for registries
    ("SetState", 0x20),
    ("GetState", 0x21),
    ("HasState", 0x22),
    ("PrefixIterator", 0x23),
    ("BalanceOf", 0x24),
    // Gas administration
    ("SetGasCost", 0x30),
    ("GasTableSnapshot", 0x31),
    ("GasCostByName", 0x32),
    // Contracts
    ("InitContracts", 0x40),
    ("DeployContract", 0x41),
    ("InvokeContract", 0x42),
    ("PauseContract", 0x43),
    ("ResumeContract", 0x44),
    ("UpgradeContract", 0x45),
    ("ContractInfo", 0x46),
    ("DeployAIContract", 0x47),
    ("InvokeAIContract", 0x48),
    // Cross-chain
    ("LockAndMint", 0x50),
    ("BurnAndRelease", 0x51),
    ("RegisterBridge", 0x52),
    ("QueryOracle", 0x53),
    // Tokens and liquidity
    ("LiquidityAdd", 0x60),
    ("LiquidityRemove", 0x61),
    ("MintToken", 0x62),
    ("MultiSigSubmit", 0x63),
    ("MultiSigConfirm", 0x64),
    ("MultiSigRevoke", 0x65),
    ("MultiSigExecute", 0x66),
    // Mining, governance and access control
    ("MineBlock", 0x70),
    ("MineUntil", 0x71),
    ("CreateDAO", 0x72),
    ("GrantRole", 0x73),
    ("RevokeRole", 0x74),
    ("HasRole", 0x75),
    ("Access_Audit", 0x76),
    // Node registries
    ("Security_RaiseAlert", 0x80),
    ("Marketplace_ListContract", 0x81),
    ("RegisterContentNode", 0x82),
    ("KademliaDistance", 0x83),
    ("RegNodeApprove", 0x84),
    ("RegNodeFlag", 0x85),
    ("RegNodeLogs", 0x86),
    ("RegNodeAudit", 0x87),
    // Consensus weight accounting
    ("VoteProposal", 0x90),
    ("ConsensusWeight", 0x91),
    // Peripheral managers
    ("FaucetRequest", 0xA0),
    ("FirewallBlock", 0xA1),
    ("SandboxStart", 0xA2),
    ("SandboxStop", 0xA3),
    ("ZeroTrustOpen", 0xA4),
    ("ZeroTrustSend", 0xA5),
];

/// Immutable name <-> opcode mapping
#[derive(Debug, Clone)]
pub struct OpcodeCatalogue {
    /// Sorted by opcode
    entries: Vec<CatalogueEntry>,
    by_name: HashMap<String, usize>,
    by_code: HashMap<Opcode, usize>,
}

impl OpcodeCatalogue {
    /// Catalogue from [`BUILTIN_OPCODES`]
    pub fn builtin() -> Result<Self, IntegrityError> {
        Self::from_entries(BUILTIN_OPCODES.iter().map(|(name, byte)| (*name, *byte)))
    }

    /// Builds a catalogue, rejecting anything that breaks the bijection
    pub fn from_entries<'a, I>(entries: I) -> Result<Self, IntegrityError>
    where
        I: IntoIterator<Item = (&'a str, u8)>,
    {
        let mut rows: Vec<CatalogueEntry> = Vec::new();
        let mut seen_names: HashMap<&'a str, u8> = HashMap::new();
        let mut seen_codes: HashMap<u8, &'a str> = HashMap::new();

        for (name, byte) in entries {
            if name.trim().is_empty() {
                return Err(IntegrityError::EmptyName(byte));
            }
            if seen_names.insert(name, byte).is_some() {
                return Err(IntegrityError::DuplicateName(name.to_string()));
            }
            if let Some(first) = seen_codes.insert(byte, name) {
                return Err(IntegrityError::DuplicateOpcode {
                    opcode: byte,
                    first: first.to_string(),
                    second: name.to_string(),
                });
            }
            rows.push(CatalogueEntry {
                name: name.to_string(),
                opcode: Opcode(byte),
            });
        }

        rows.sort_by_key(|e| e.opcode);
        let by_name = rows
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.clone(), i))
            .collect();
        let by_code = rows.iter().enumerate().map(|(i, e)| (e.opcode, i)).collect();

        Ok(Self {
            entries: rows,
            by_name,
            by_code,
        })
    }

    /// Encodes a name to its wire byte
    pub fn to_bytecode(&self, name: &str) -> Result<u8, CatalogueError> {
        self.lookup(name)
            .map(Opcode::byte)
            .ok_or_else(|| CatalogueError::UnknownName(name.to_string()))
    }

    /// Decodes a wire byte
    pub fn parse_opcode(&self, byte: u8) -> Result<Opcode, CatalogueError> {
        let op = Opcode(byte);
        if self.by_code.contains_key(&op) {
            Ok(op)
        } else {
            Err(CatalogueError::UnknownOpcode(byte))
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Opcode> {
        self.by_name.get(name).map(|&i| self.entries[i].opcode)
    }

    pub fn name_of(&self, op: Opcode) -> Option<&str> {
        self.by_code.get(&op).map(|&i| self.entries[i].name.as_str())
    }

    pub fn entry(&self, op: Opcode) -> Option<&CatalogueEntry> {
        self.by_code.get(&op).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, op: Opcode) -> bool {
        self.by_code.contains_key(&op)
    }

    /// All entries, ordered by opcode
    pub fn entries(&self) -> &[CatalogueEntry] {
        &self.entries
    }

    pub fn opcodes(&self) -> impl Iterator<Item = Opcode> + '_ {
        self.entries.iter().map(|e| e.opcode)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Markdown opcode reference, one row per entry ordered by name
    pub fn render_opcode_table(&self) -> String {
        let mut rows: Vec<&CatalogueEntry> = self.entries.iter().collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));

        let mut out = String::from("| Function | Opcode |\n|---|---|\n");
        for e in rows {
            out.push_str(&format!("| `{}` | `{}` |\n", e.name, e.opcode));
        }
        out
    }
}

/// Lookup failures at the encode/decode boundary
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CatalogueError {
    #[error("Unknown opcode name: {0}")]
    UnknownName(String),

    #[error("Unknown opcode byte: {0:#04x}")]
    UnknownOpcode(u8),
}

/// Catalogue construction failures. Fatal: the process must not start.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("Empty opcode name for byte {0:#04x}")]
    EmptyName(u8),

    #[error("Duplicate opcode name: {0}")]
    DuplicateName(String),

    #[error("Opcode {opcode:#04x} assigned to both {first} and {second}")]
    DuplicateOpcode {
        opcode: u8,
        first: String,
        second: String,
    },

    #[error("Well-known opcode {0} missing from catalogue")]
    MissingWellKnown(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn catalogue() -> OpcodeCatalogue {
        OpcodeCatalogue::builtin().expect("builtin catalogue is consistent")
    }

    #[test]
    fn test_builtin_is_bijective() {
        let cat = catalogue();
        assert_eq!(cat.len(), BUILTIN_OPCODES.len());
        for (name, byte) in BUILTIN_OPCODES {
            assert_eq!(cat.lookup(name), Some(Opcode::new(*byte)));
            assert_eq!(cat.name_of(Opcode::new(*byte)), Some(*name));
        }
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let cat = catalogue();
        for entry in cat.entries() {
            let byte = cat.to_bytecode(&entry.name).unwrap();
            assert_eq!(cat.parse_opcode(byte).ok(), cat.lookup(&entry.name));
        }
    }

    #[test]
    fn test_unknown_name_and_byte() {
        let cat = catalogue();
        assert_eq!(
            cat.to_bytecode("NotARealOp"),
            Err(CatalogueError::UnknownName("NotARealOp".into()))
        );
        assert_eq!(cat.parse_opcode(0xFF), Err(CatalogueError::UnknownOpcode(0xFF)));
        assert_eq!(cat.lookup("NotARealOp"), None);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = OpcodeCatalogue::from_entries([("Add", 1), ("Add", 2)]).unwrap_err();
        assert_eq!(err, IntegrityError::DuplicateName("Add".into()));
    }

    #[test]
    fn test_duplicate_opcode_rejected() {
        let err = OpcodeCatalogue::from_entries([("Add", 1), ("Sub", 1)]).unwrap_err();
        assert_eq!(
            err,
            IntegrityError::DuplicateOpcode {
                opcode: 1,
                first: "Add".into(),
                second: "Sub".into(),
            }
        );
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = OpcodeCatalogue::from_entries([(" ", 7)]).unwrap_err();
        assert_eq!(err, IntegrityError::EmptyName(7));
    }

    #[test]
    fn test_entries_sorted_by_opcode() {
        let cat = OpcodeCatalogue::from_entries([("B", 9), ("A", 3), ("C", 5)]).unwrap();
        let codes: Vec<u8> = cat.opcodes().map(Opcode::byte).collect();
        assert_eq!(codes, vec![3, 5, 9]);
    }

    #[test]
    fn test_render_opcode_table() {
        let cat = OpcodeCatalogue::from_entries([("Sub", 3), ("Add", 2)]).unwrap();
        assert_eq!(
            cat.render_opcode_table(),
            "| Function | Opcode |\n|---|---|\n| `Add` | `0x02` |\n| `Sub` | `0x03` |\n"
        );
    }

    proptest! {
        #[test]
        fn prop_parse_matches_lookup(byte in any::<u8>()) {
            let cat = catalogue();
            match cat.parse_opcode(byte) {
                Ok(op) => {
                    let name = cat.name_of(op).unwrap();
                    prop_assert_eq!(cat.lookup(name), Some(op));
                    prop_assert_eq!(cat.to_bytecode(name).unwrap(), byte);
                }
                Err(e) => prop_assert_eq!(e, CatalogueError::UnknownOpcode(byte)),
            }
        }
    }
}
