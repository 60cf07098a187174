// Vault module - Tracks what every account owns

mod balance;

pub use balance::{AccountBalances, BalanceError};
