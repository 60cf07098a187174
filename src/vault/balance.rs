// Account balances - what every account holds as seen by this node

use crate::ledger::Operation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur while applying a transfer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BalanceError {
    #[error("Insufficient funds in {account}: available {available}, required {required}")]
    InsufficientFunds {
        account: String,
        available: u64,
        required: u64,
    },

    #[error("Invalid amount: transfers must move a positive amount")]
    InvalidAmount,

    #[error("Balance of {account} would overflow")]
    BalanceOverflow { account: String },
}

/// Account name -> balance, local to one node
///
/// Accounts that were never referenced read as zero. Only mutated inside the
/// critical section (or when replaying a transfer another node committed).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AccountBalances {
    table: BTreeMap<String, u64>,
}

impl AccountBalances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed every listed account with the same opening balance
    pub fn with_initial<I, S>(accounts: I, amount: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let table = accounts
            .into_iter()
            .map(|account| (account.into(), amount))
            .collect();
        Self { table }
    }

    /// Balance of `account`, zero if unseen
    pub fn get(&self, account: &str) -> u64 {
        self.table.get(account).copied().unwrap_or(0)
    }

    /// Overwrite an account's balance
    pub fn set(&mut self, account: &str, amount: u64) {
        self.table.insert(account.to_string(), amount);
    }

    /// Debit `sender` and credit `receiver`, or change nothing.
    pub fn apply_transfer(&mut self, sender: &str, receiver: &str, amount: u64) -> Result<(), BalanceError> {
        if amount == 0 {
            return Err(BalanceError::InvalidAmount);
        }

        let available = self.get(sender);
        if available < amount {
            return Err(BalanceError::InsufficientFunds {
                account: sender.to_string(),
                available,
                required: amount,
            });
        }

        if sender == receiver {
            return Ok(());
        }

        let credited = self
            .get(receiver)
            .checked_add(amount)
            .ok_or_else(|| BalanceError::BalanceOverflow {
                account: receiver.to_string(),
            })?;

        self.table.insert(sender.to_string(), available - amount);
        self.table.insert(receiver.to_string(), credited);
        Ok(())
    }

    /// [`AccountBalances::apply_transfer`] for a whole operation
    pub fn apply(&mut self, operation: &Operation) -> Result<(), BalanceError> {
        self.apply_transfer(operation.sender(), operation.receiver(), operation.amount())
    }

    /// Sum of every balance
    pub fn total(&self) -> u128 {
        self.table.values().map(|&v| v as u128).sum()
    }

    /// Copy of the whole table, sorted by account
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.table.clone()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
