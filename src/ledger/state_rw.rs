// StateRW - Ledger surface for peripheral registries
use super::{Ledger, LedgerError};
use crate::types::{Address, Amount};

/// Read/write access used by registries that keep their own records in the
/// ledger's key/value scratch space
pub trait StateRW: Send + Sync {
    /// Fee-free transfer
    fn transfer(&self, from: &Address, to: &Address, amount: Amount) -> Result<(), LedgerError>;

    fn balance_of(&self, address: &Address) -> Amount;

    fn set_state(&self, key: &[u8], value: &[u8]);

    fn get_state(&self, key: &[u8]) -> Option<Vec<u8>>;

    fn has_state(&self, key: &[u8]) -> bool;

    fn delete_state(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Entries whose key starts with `prefix`, in key order, as of the call
    fn prefix_iterator(&self, prefix: &[u8]) -> PrefixIterator;
}

/// Key-ordered snapshot of the entries under a prefix
#[derive(Debug, Clone)]
pub struct PrefixIterator {
    entries: std::vec::IntoIter<(Vec<u8>, Vec<u8>)>,
}

impl PrefixIterator {
    pub fn new(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        Self {
            entries: entries.into_iter(),
        }
    }
}

impl Iterator for PrefixIterator {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl ExactSizeIterator for PrefixIterator {}

impl StateRW for Ledger {
    fn transfer(&self, from: &Address, to: &Address, amount: Amount) -> Result<(), LedgerError> {
        Ledger::transfer(self, from, to, amount, 0)
    }

    fn balance_of(&self, address: &Address) -> Amount {
        self.get_balance(address)
    }

    fn set_state(&self, key: &[u8], value: &[u8]) {
        self.state.write().kv.insert(key.to_vec(), value.to_vec());
    }

    fn get_state(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.state.read().kv.get(key).cloned()
    }

    fn has_state(&self, key: &[u8]) -> bool {
        self.state.read().kv.contains_key(key)
    }

    fn delete_state(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.state.write().kv.remove(key)
    }

    fn prefix_iterator(&self, prefix: &[u8]) -> PrefixIterator {
        let state = self.state.read();
        let entries = state
            .kv
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        PrefixIterator::new(entries)
    }
}
