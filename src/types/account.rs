// Account - Per-address UTXO record with derived balance
use super::primitives::{Amount, Nonce};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger-unique identifier of an unspent output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UtxoId(pub u64);

impl fmt::Display for UtxoId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "utxo:{}", self.0)
    }
}

/// Discrete spendable output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub id: UtxoId,
    pub amount: Amount,
}

impl Utxo {
    pub fn new(id: UtxoId, amount: Amount) -> Self {
        Self { id, amount }
    }
}

/// State of an address in the ledger
///
/// The UTXO list is authoritative. `balance` is an index over it that is only
/// ever changed together with the list, so `balance == sum(utxos)` holds after
/// every method returns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountEntry {
    /// Number of applied transactions sent from this address
    pub nonce: Nonce,

    balance: Amount,

    utxos: Vec<Utxo>,
}

impl AccountEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self) -> Amount {
        self.balance
    }

    /// Unspent outputs, oldest first
    pub fn utxos(&self) -> &[Utxo] {
        &self.utxos
    }

    pub fn can_spend(&self, amount: Amount) -> bool {
        self.balance >= amount
    }

    /// Adds an output. Zero-value outputs are not recorded.
    pub fn receive(&mut self, utxo: Utxo) -> Result<(), AccountError> {
        if utxo.amount == 0 {
            return Ok(());
        }
        self.balance = self
            .balance
            .checked_add(utxo.amount)
            .ok_or(AccountError::Overflow)?;
        self.utxos.push(utxo);
        Ok(())
    }

    /// Consumes outputs oldest-first until `amount` is covered and returns the
    /// change output (id `change_id`) if the consumed outputs overshoot.
    ///
    /// On error the entry is left untouched.
    pub fn spend(&mut self, amount: Amount, change_id: UtxoId) -> Result<Option<Utxo>, AccountError> {
        if amount == 0 {
            return Ok(None);
        }
        if !self.can_spend(amount) {
            return Err(AccountError::InsufficientBalance {
                needed: amount,
                available: self.balance,
            });
        }

        let mut covered: Amount = 0;
        let mut consumed = 0usize;
        for utxo in &self.utxos {
            if covered >= amount {
                break;
            }
            // sum(utxos) == balance, so this cannot overflow
            covered = covered.saturating_add(utxo.amount);
            consumed += 1;
        }
        self.utxos.drain(..consumed);
        self.balance -= amount;

        let change = covered - amount;
        if change == 0 {
            return Ok(None);
        }
        let utxo = Utxo::new(change_id, change);
        self.utxos.push(utxo);
        Ok(Some(utxo))
    }

    /// Checks the balance index against the output list
    pub fn is_consistent(&self) -> bool {
        let sum: u128 = self.utxos.iter().map(|u| u.amount as u128).sum();
        sum == self.balance as u128 && self.utxos.iter().all(|u| u.amount > 0)
    }
}

/// Account errors
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum AccountError {
    #[error("Insufficient balance: needed {needed}, available {available}")]
    InsufficientBalance { needed: Amount, available: Amount },

    #[error("Balance overflow")]
    Overflow,
}
