// Gas table - Per-opcode pricing derived from the catalogue
//
// Every catalogued opcode always has a cost. Sources, later wins:
// DEFAULT_GAS_COST, the markdown pricing guide, the environment override
// string, then runtime updates.
use super::gas::GasError;
use crate::config::GasConfig;
use crate::opcodes::{Opcode, OpcodeCatalogue};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cost of an opcode the guide does not price
pub const DEFAULT_GAS_COST: u64 = 1;

/// Parses guide rows of the form ``| `Name` | `cost` |``.
///
/// Only lines starting with ``| ` `` are considered, so headers and prose are
/// ignored. Rows with an unparseable cost are priced at [`DEFAULT_GAS_COST`].
/// Later rows win over earlier ones.
pub fn parse_gas_guide(text: &str) -> HashMap<String, u64> {
    let mut prices = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if !line.starts_with("| `") {
            continue;
        }
        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() < 3 {
            continue;
        }
        let name = parts[1].trim_matches(|c| c == ' ' || c == '`');
        if name.is_empty() {
            continue;
        }
        let raw_cost = parts[2].trim_matches(|c| c == ' ' || c == '`');
        let cost = match raw_cost.parse::<u64>() {
            Ok(cost) => cost,
            Err(_) => {
                warn!(opcode = name, raw = raw_cost, "Unparseable gas cost in guide");
                DEFAULT_GAS_COST
            }
        };
        prices.insert(name.to_string(), cost);
    }
    prices
}

/// Reads and parses a pricing guide. A missing or unreadable file yields no
/// prices.
pub fn load_gas_guide(path: &Path) -> HashMap<String, u64> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let prices = parse_gas_guide(&text);
            info!(path = %path.display(), rows = prices.len(), "Loaded gas pricing guide");
            prices
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Gas pricing guide unavailable, using defaults");
            HashMap::new()
        }
    }
}

/// Parses `Name=cost[,Name=cost]`. Malformed pairs are skipped.
pub fn parse_overrides(raw: &str) -> HashMap<String, u64> {
    let mut prices = HashMap::new();
    for pair in raw.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let parsed = pair
            .split_once('=')
            .and_then(|(name, cost)| Some((name.trim(), cost.trim().parse::<u64>().ok()?)))
            .filter(|(name, _)| !name.is_empty());
        match parsed {
            Some((name, cost)) => {
                prices.insert(name.to_string(), cost);
            }
            None => warn!(pair, "Skipping malformed gas override"),
        }
    }
    prices
}

/// Live opcode -> cost mapping
#[derive(Debug)]
pub struct GasTable {
    catalogue: Arc<OpcodeCatalogue>,
    costs: RwLock<HashMap<Opcode, u64>>,
}

impl GasTable {
    /// Complete table: `overrides` by name where given, default elsewhere.
    /// Names outside the catalogue are ignored.
    pub fn new(catalogue: Arc<OpcodeCatalogue>, overrides: &HashMap<String, u64>) -> Self {
        let mut costs: HashMap<Opcode, u64> = catalogue
            .opcodes()
            .map(|op| (op, DEFAULT_GAS_COST))
            .collect();

        let mut applied = 0usize;
        for (name, cost) in overrides {
            match catalogue.lookup(name) {
                Some(op) => {
                    costs.insert(op, *cost);
                    applied += 1;
                }
                None => debug!(opcode = %name, "Ignoring price for uncatalogued opcode"),
            }
        }
        debug!(entries = costs.len(), applied, "Built gas table");

        Self {
            catalogue,
            costs: RwLock::new(costs),
        }
    }

    /// Table with the guide and the environment overrides named by `config`
    pub fn from_config(catalogue: Arc<OpcodeCatalogue>, config: &GasConfig) -> Self {
        let mut overrides = config
            .guide_path
            .as_deref()
            .map(load_gas_guide)
            .unwrap_or_default();

        if let Some(var) = config.overrides_var.as_deref() {
            if let Ok(raw) = std::env::var(var) {
                let env = parse_overrides(&raw);
                info!(var, count = env.len(), "Applying gas overrides from environment");
                overrides.extend(env);
            }
        }

        Self::new(catalogue, &overrides)
    }

    pub fn catalogue(&self) -> &Arc<OpcodeCatalogue> {
        &self.catalogue
    }

    /// Cost of `op`, [`DEFAULT_GAS_COST`] if it has no entry
    pub fn gas_cost(&self, op: Opcode) -> u64 {
        self.costs
            .read()
            .get(&op)
            .copied()
            .unwrap_or(DEFAULT_GAS_COST)
    }

    /// Cost by name, [`DEFAULT_GAS_COST`] for unknown names
    pub fn gas_cost_by_name(&self, name: &str) -> u64 {
        self.catalogue
            .lookup(name)
            .map_or(DEFAULT_GAS_COST, |op| self.gas_cost(op))
    }

    /// Updates the live cost of a catalogued opcode
    pub fn set_gas_cost(&self, op: Opcode, cost: u64) -> Result<(), GasError> {
        if !self.catalogue.contains(op) {
            return Err(GasError::Uncatalogued(op.byte()));
        }
        self.costs.write().insert(op, cost);
        debug!(opcode = %op, cost, "Gas cost updated");
        Ok(())
    }

    /// Runtime registration by name. Empty names and zero costs are rejected.
    pub fn register_gas_cost(&self, name: &str, cost: u64) -> Result<(), GasError> {
        if name.is_empty() {
            return Err(GasError::InvalidRegistration("name"));
        }
        if cost == 0 {
            return Err(GasError::InvalidRegistration("cost"));
        }
        let op = self
            .catalogue
            .lookup(name)
            .ok_or_else(|| GasError::UnknownName(name.to_string()))?;
        self.set_gas_cost(op, cost)
    }

    /// Independent copy of the table
    pub fn snapshot(&self) -> HashMap<Opcode, u64> {
        self.costs.read().clone()
    }

    /// Name -> cost JSON, keys sorted so the output is byte-stable
    pub fn snapshot_json(&self) -> Result<String, GasError> {
        let named: BTreeMap<&str, u64> = {
            let costs = self.costs.read();
            costs
                .iter()
                .filter_map(|(op, cost)| Some((self.catalogue.name_of(*op)?, *cost)))
                .collect()
        };
        serde_json::to_string_pretty(&named).map_err(|e| GasError::Json(e.to_string()))
    }

    pub fn write_snapshot(&self, path: &Path) -> Result<(), GasError> {
        let json = self.snapshot_json()?;
        std::fs::write(path, json).map_err(|e| GasError::Io(e.to_string()))?;
        info!(path = %path.display(), "Wrote gas table snapshot");
        Ok(())
    }

    /// Checks that every name is catalogued and priced
    pub fn validate(&self, names: &[&str]) -> Result<(), GasError> {
        let costs = self.costs.read();
        let missing: Vec<String> = names
            .iter()
            .filter(|name| {
                self.catalogue
                    .lookup(name)
                    .map_or(true, |op| !costs.contains_key(&op))
            })
            .map(|name| name.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(GasError::Incomplete(missing))
        }
    }

    /// Current table in the guide format, ordered by name
    pub fn render_gas_guide(&self) -> String {
        let costs = self.costs.read();
        let mut rows: Vec<(&str, u64)> = costs
            .iter()
            .filter_map(|(op, cost)| Some((self.catalogue.name_of(*op)?, *cost)))
            .collect();
        rows.sort_unstable();

        let mut out = String::from("| Operation | Gas Cost |\n|-----------|----------|\n");
        for (name, cost) in rows {
            out.push_str(&format!("| `{}` | `{}` |\n", name, cost));
        }
        out
    }

    #[cfg(test)]
    pub(crate) fn remove_entry(&self, op: Opcode) {
        self.costs.write().remove(&op);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const GUIDE: &str = "\
# Gas Table

| Operation | Gas Cost |
|-----------|----------|
| `Add` | `3` |
| `Transfer` | `21` |
| `GrantRole` | `100` |
| `NotARealOp` | `5` |
| `Mint` | `lots` |
| broken row
";

    fn catalogue() -> Arc<OpcodeCatalogue> {
        Arc::new(OpcodeCatalogue::builtin().unwrap())
    }

    #[test]
    fn test_parse_gas_guide() {
        let prices = parse_gas_guide(GUIDE);
        assert_eq!(prices.get("Add"), Some(&3));
        assert_eq!(prices.get("Transfer"), Some(&21));
        assert_eq!(prices.get("Mint"), Some(&DEFAULT_GAS_COST));
        assert!(!prices.contains_key("Operation"));
        assert_eq!(prices.len(), 5);
    }

    #[test]
    fn test_malformed_row_replaces_earlier_price() {
        let prices = parse_gas_guide("| `Add` | `7` |\n| `Add` | `seven` |\n| `Sub` | `x` |\n| `Sub` | `4` |\n");
        assert_eq!(prices.get("Add"), Some(&DEFAULT_GAS_COST));
        assert_eq!(prices.get("Sub"), Some(&4));
    }

    #[test]
    fn test_table_is_complete() {
        let cat = catalogue();
        let table = GasTable::new(cat.clone(), &parse_gas_guide(GUIDE));
        let snapshot = table.snapshot();

        assert_eq!(snapshot.len(), cat.len());
        for entry in cat.entries() {
            let expected = match entry.name.as_str() {
                "Add" => 3,
                "Transfer" => 21,
                "GrantRole" => 100,
                _ => DEFAULT_GAS_COST,
            };
            assert_eq!(table.gas_cost(entry.opcode), expected, "{}", entry.name);
        }
    }

    #[test]
    fn test_gas_cost_by_name() {
        let table = GasTable::new(catalogue(), &parse_gas_guide(GUIDE));
        assert_eq!(table.gas_cost_by_name("GrantRole"), 100);
        assert_eq!(table.gas_cost_by_name("NotARealOp"), DEFAULT_GAS_COST);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let cat = catalogue();
        let table = GasTable::new(cat.clone(), &HashMap::new());
        let add = cat.lookup("Add").unwrap();

        let mut snapshot = table.snapshot();
        snapshot.insert(add, 999);
        snapshot.clear();
        assert_eq!(table.gas_cost(add), DEFAULT_GAS_COST);
    }

    #[test]
    fn test_set_gas_cost() {
        let cat = catalogue();
        let table = GasTable::new(cat.clone(), &HashMap::new());
        let add = cat.lookup("Add").unwrap();

        table.set_gas_cost(add, 42).unwrap();
        assert_eq!(table.gas_cost(add), 42);
        assert_eq!(
            table.set_gas_cost(Opcode::new(0xFF), 1),
            Err(GasError::Uncatalogued(0xFF))
        );
    }

    #[test]
    fn test_register_gas_cost_validation() {
        let table = GasTable::new(catalogue(), &HashMap::new());
        assert_eq!(
            table.register_gas_cost("", 10),
            Err(GasError::InvalidRegistration("name"))
        );
        assert_eq!(
            table.register_gas_cost("Add", 0),
            Err(GasError::InvalidRegistration("cost"))
        );
        assert_eq!(
            table.register_gas_cost("NotARealOp", 10),
            Err(GasError::UnknownName("NotARealOp".into()))
        );
        table.register_gas_cost("Add", 10).unwrap();
        assert_eq!(table.gas_cost_by_name("Add"), 10);
    }

    #[test]
    fn test_missing_guide_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = GasConfig {
            guide_path: Some(dir.path().join("absent.md")),
            overrides_var: None,
            ..GasConfig::default()
        };
        let cat = catalogue();
        let table = GasTable::from_config(cat.clone(), &config);
        assert!(table.snapshot().values().all(|c| *c == DEFAULT_GAS_COST));
        assert_eq!(table.snapshot().len(), cat.len());
    }

    #[test]
    fn test_guide_file_and_env_overrides() {
        let mut guide = tempfile::NamedTempFile::new().unwrap();
        guide.write_all(GUIDE.as_bytes()).unwrap();

        // Unique variable so parallel tests cannot interfere
        let var = "SYN_GAS_OVERRIDES_TABLE_TEST";
        std::env::set_var(var, "Add=77, bogus, Transfer=oops,Burn=9");

        let config = GasConfig {
            guide_path: Some(guide.path().to_path_buf()),
            overrides_var: Some(var.to_string()),
            ..GasConfig::default()
        };
        let table = GasTable::from_config(catalogue(), &config);
        std::env::remove_var(var);

        assert_eq!(table.gas_cost_by_name("Add"), 77);
        assert_eq!(table.gas_cost_by_name("Transfer"), 21);
        assert_eq!(table.gas_cost_by_name("Burn"), 9);
        assert_eq!(table.gas_cost_by_name("GrantRole"), 100);
    }

    #[test]
    fn test_parse_overrides_skips_malformed() {
        let prices = parse_overrides("Add=1,=5,Sub,Mul=x, Div = 4 ,");
        assert_eq!(prices.len(), 2);
        assert_eq!(prices.get("Add"), Some(&1));
        assert_eq!(prices.get("Div"), Some(&4));
    }

    #[test]
    fn test_snapshot_json_deterministic() {
        let table = GasTable::new(catalogue(), &parse_gas_guide(GUIDE));
        let first = table.snapshot_json().unwrap();
        let second = table.snapshot_json().unwrap();
        assert_eq!(first, second);

        let parsed: BTreeMap<String, u64> = serde_json::from_str(&first).unwrap();
        assert_eq!(parsed.get("Add"), Some(&3));
        assert_eq!(parsed.len(), table.catalogue().len());
    }

    #[test]
    fn test_write_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.json");
        let table = GasTable::new(catalogue(), &HashMap::new());

        table.write_snapshot(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, table.snapshot_json().unwrap());
    }

    #[test]
    fn test_write_snapshot_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("snap.json");
        let table = GasTable::new(catalogue(), &HashMap::new());
        assert!(matches!(table.write_snapshot(&path), Err(GasError::Io(_))));
    }

    #[test]
    fn test_validate() {
        let cat = catalogue();
        let table = GasTable::new(cat.clone(), &HashMap::new());
        assert!(table.validate(&["Add", "Transfer"]).is_ok());

        table.remove_entry(cat.lookup("Add").unwrap());
        assert_eq!(
            table.validate(&["Add", "Transfer", "NotARealOp"]),
            Err(GasError::Incomplete(vec!["Add".into(), "NotARealOp".into()]))
        );
    }

    #[test]
    fn test_render_gas_guide_parses_back() {
        let table = GasTable::new(catalogue(), &parse_gas_guide(GUIDE));
        let rendered = table.render_gas_guide();
        let reparsed = parse_gas_guide(&rendered);

        assert_eq!(reparsed.len(), table.catalogue().len());
        assert_eq!(reparsed.get("GrantRole"), Some(&100));
        assert!(rendered.starts_with("| Operation | Gas Cost |"));
    }
}
