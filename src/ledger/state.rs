// State - Ledger contents and staged mutations
//
// Every mutation runs against a `Staged` overlay holding copies of the touched
// accounts and counters. The overlay is folded back into the state only once
// every check has passed, so a failed operation leaves nothing behind.
use super::LedgerError;
use crate::config::FeePolicy;
use crate::types::{AccountEntry, AccountError, Address, Amount, Block, Transaction, Utxo, UtxoId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Issuance and destruction counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyStats {
    /// Sum of all balances
    pub total_supply: Amount,

    /// Issued through `mint`
    pub minted: Amount,

    /// Destroyed through `burn` and burned fees
    pub burned: Amount,
}

/// Result of a successful transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TransferOutcome {
    pub fee_paid: Amount,
    pub fee_sink: Option<Address>,
}

#[derive(Debug, Default)]
pub(crate) struct LedgerState {
    pub accounts: HashMap<Address, AccountEntry>,
    /// Insertion ordered
    pub pool: Vec<Transaction>,
    pub blocks: Vec<Block>,
    pub kv: BTreeMap<Vec<u8>, Vec<u8>>,
    pub supply: SupplyStats,
    next_utxo_id: u64,
}

/// Copy-on-write view over [`LedgerState`], optionally layered over changes
/// not yet committed
struct Staged<'a> {
    base: &'a LedgerState,
    below: Option<&'a Changes>,
    accounts: HashMap<Address, AccountEntry>,
    supply: SupplyStats,
    next_utxo_id: u64,
}

/// Changes ready to be committed
pub(crate) struct Changes {
    accounts: HashMap<Address, AccountEntry>,
    supply: SupplyStats,
    next_utxo_id: u64,
}

impl Changes {
    fn empty(base: &LedgerState) -> Self {
        Self {
            accounts: HashMap::new(),
            supply: base.supply,
            next_utxo_id: base.next_utxo_id,
        }
    }

    /// Folds `later`, staged on top of `self`, into `self`
    fn absorb(&mut self, later: Changes) {
        self.accounts.extend(later.accounts);
        self.supply = later.supply;
        self.next_utxo_id = later.next_utxo_id;
    }
}

/// Staged effect of a batch of transactions
pub(crate) struct StagedBatch {
    changes: Changes,
    /// One entry per candidate, in order
    pub(crate) outcomes: Vec<Result<TransferOutcome, LedgerError>>,
}

impl<'a> Staged<'a> {
    fn new(base: &'a LedgerState) -> Self {
        Self {
            base,
            below: None,
            accounts: HashMap::new(),
            supply: base.supply,
            next_utxo_id: base.next_utxo_id,
        }
    }

    fn over(base: &'a LedgerState, below: &'a Changes) -> Self {
        Self {
            base,
            below: Some(below),
            accounts: HashMap::new(),
            supply: below.supply,
            next_utxo_id: below.next_utxo_id,
        }
    }

    fn entry(&mut self, address: &Address) -> &mut AccountEntry {
        let base = self.base;
        let below = self.below;
        self.accounts.entry(address.clone()).or_insert_with(|| {
            below
                .and_then(|c| c.accounts.get(address))
                .or_else(|| base.accounts.get(address))
                .cloned()
                .unwrap_or_default()
        })
    }

    fn next_id(&mut self) -> UtxoId {
        let id = UtxoId(self.next_utxo_id);
        self.next_utxo_id += 1;
        id
    }

    /// New output of `amount` for `address`
    fn receive(&mut self, address: &Address, amount: Amount) -> Result<(), LedgerError> {
        let id = self.next_id();
        self.entry(address)
            .receive(Utxo::new(id, amount))
            .map_err(|_| LedgerError::Overflow)
    }

    /// Consumes `amount` from `address`, returning the change output
    fn spend(&mut self, address: &Address, amount: Amount) -> Result<Option<Utxo>, LedgerError> {
        let change_id = self.next_id();
        self.entry(address)
            .spend(amount, change_id)
            .map_err(|e| match e {
                AccountError::InsufficientBalance { needed, available } => {
                    LedgerError::InsufficientFunds {
                        address: address.clone(),
                        needed,
                        available,
                    }
                }
                AccountError::Overflow => LedgerError::Overflow,
            })
    }

    fn destroy(&mut self, amount: Amount) -> Result<(), LedgerError> {
        self.supply.total_supply = self
            .supply
            .total_supply
            .checked_sub(amount)
            .ok_or(LedgerError::Overflow)?;
        self.supply.burned = self
            .supply
            .burned
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        Ok(())
    }

    fn finish(self) -> Changes {
        Changes {
            accounts: self.accounts,
            supply: self.supply,
            next_utxo_id: self.next_utxo_id,
        }
    }
}

fn stage_transfer(
    staged: &mut Staged<'_>,
    from: &Address,
    to: &Address,
    amount: Amount,
    fee: Amount,
    policy: &FeePolicy,
    bump_nonce: bool,
) -> Result<TransferOutcome, LedgerError> {
    if from.is_empty() || to.is_empty() {
        return Err(LedgerError::EmptyAddress);
    }
    if let FeePolicy::Sink(sink) = policy {
        if sink.is_empty() {
            return Err(LedgerError::EmptyAddress);
        }
    }
    let total = amount.checked_add(fee).ok_or(LedgerError::Overflow)?;

    staged.spend(from, total)?;
    staged.receive(to, amount)?;

    let fee_sink = match policy {
        FeePolicy::Burn => {
            staged.destroy(fee)?;
            None
        }
        FeePolicy::Sink(sink) => {
            staged.receive(sink, fee)?;
            Some(sink.clone())
        }
    };

    if bump_nonce {
        let sender = staged.entry(from);
        sender.nonce = sender.nonce.checked_add(1).ok_or(LedgerError::Overflow)?;
    }

    Ok(TransferOutcome {
        fee_paid: fee,
        fee_sink,
    })
}

impl LedgerState {
    fn commit(&mut self, changes: Changes) {
        self.accounts.extend(changes.accounts);
        self.supply = changes.supply;
        self.next_utxo_id = changes.next_utxo_id;
    }

    pub fn balance(&self, address: &Address) -> Amount {
        self.accounts.get(address).map_or(0, AccountEntry::balance)
    }

    pub fn utxos(&self, address: &Address) -> Vec<Utxo> {
        self.accounts
            .get(address)
            .map(|a| a.utxos().to_vec())
            .unwrap_or_default()
    }

    pub fn nonce(&self, address: &Address) -> u64 {
        self.accounts.get(address).map_or(0, |a| a.nonce)
    }

    /// Adds `amount` as a new output. `minted` also counts it as issuance.
    pub fn issue(&mut self, address: &Address, amount: Amount, minted: bool) -> Result<(), LedgerError> {
        let mut staged = Staged::new(self);
        staged.supply.total_supply = staged
            .supply
            .total_supply
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        if minted {
            staged.supply.minted = staged
                .supply
                .minted
                .checked_add(amount)
                .ok_or(LedgerError::Overflow)?;
        }
        staged.receive(address, amount)?;

        let changes = staged.finish();
        self.commit(changes);
        Ok(())
    }

    pub fn burn(&mut self, address: &Address, amount: Amount) -> Result<Option<Utxo>, LedgerError> {
        if address.is_empty() {
            return Err(LedgerError::EmptyAddress);
        }
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }

        let mut staged = Staged::new(self);
        let change = staged.spend(address, amount)?;
        staged.destroy(amount)?;

        let changes = staged.finish();
        self.commit(changes);
        Ok(change)
    }

    /// Moves `amount` and routes `fee` per `policy`. `bump_nonce` marks the
    /// sender as having sent one more transaction.
    pub fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        amount: Amount,
        fee: Amount,
        policy: &FeePolicy,
        bump_nonce: bool,
    ) -> Result<TransferOutcome, LedgerError> {
        let mut staged = Staged::new(self);
        let outcome = stage_transfer(&mut staged, from, to, amount, fee, policy, bump_nonce)?;

        let changes = staged.finish();
        self.commit(changes);
        Ok(outcome)
    }

    /// Stages `txs` in order as sender-nonce-bumping transfers, each on top of
    /// the ones that succeeded before it. A failed transaction contributes
    /// nothing. Nothing is committed.
    pub fn stage_batch(&self, txs: &[Transaction], policy: &FeePolicy) -> StagedBatch {
        let mut changes = Changes::empty(self);
        let mut outcomes = Vec::with_capacity(txs.len());

        for tx in txs {
            let mut staged = Staged::over(self, &changes);
            match stage_transfer(&mut staged, &tx.from, &tx.to, tx.amount, tx.fee, policy, true) {
                Ok(outcome) => {
                    let later = staged.finish();
                    changes.absorb(later);
                    outcomes.push(Ok(outcome));
                }
                Err(e) => outcomes.push(Err(e)),
            }
        }

        StagedBatch { changes, outcomes }
    }

    /// Commits a batch staged by [`LedgerState::stage_batch`] against the
    /// current state
    pub fn commit_batch(&mut self, batch: StagedBatch) {
        self.commit(batch.changes);
    }

    /// Drops every pooled copy of `tx`
    pub fn remove_from_pool(&mut self, tx: &Transaction) {
        self.pool.retain(|pending| pending.id != tx.id);
    }

    /// Every account is internally consistent and the balances add up to the
    /// total supply
    pub fn is_consistent(&self) -> bool {
        let sum: u128 = self.accounts.values().map(|a| a.balance() as u128).sum();
        self.accounts.values().all(AccountEntry::is_consistent)
            && sum == self.supply.total_supply as u128
    }
}
