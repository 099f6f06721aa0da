use std::collections::HashMap;

use thiserror::Error;

use crate::orders::{AccountId, AssetId};

/// Errors from the asset-custody collaborator. A failure during settlement
/// is fatal to the whole create/match/settle call.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CustodyError {
    #[error("account `{account}` holds {available} of `{asset}`, {required} required")]
    InsufficientBalance {
        account: AccountId,
        asset: AssetId,
        required: u64,
        available: u64,
    },
    #[error("account `{account}` approved {approved} of `{asset}`, {required} required")]
    InsufficientAllowance {
        account: AccountId,
        asset: AssetId,
        required: u64,
        approved: u64,
    },
}

/// External asset-custody system, ERC-20 shaped.
///
/// Sell makers pre-authorize the engine (`approve`-style) for at least the
/// order amount; the actual debit happens only at trade settlement via
/// [`Custody::transfer_from`]. The engine treats this collaborator as a
/// synchronous dependency: any error it returns propagates as an abort of
/// the call in flight.
pub trait Custody {
    fn balance_of(&self, account: &str, asset: &str) -> u64;

    /// How much of `asset` the engine is still authorized to move out of
    /// `owner`'s account.
    fn allowance(&self, owner: &str, asset: &str) -> u64;

    /// Move `amount` units of `asset` from `from` to `to`, consuming that
    /// much of `from`'s allowance. Fails without side effects if either the
    /// balance or the allowance is short.
    fn transfer_from(
        &mut self,
        from: &str,
        to: &str,
        asset: &str,
        amount: u64,
    ) -> Result<(), CustodyError>;
}

/// In-memory custody used by the server and the test suite. Balances and
/// allowances are keyed by (account, asset).
#[derive(Debug, Clone, Default)]
pub struct InMemoryCustody {
    balances: HashMap<(AccountId, AssetId), u64>,
    allowances: HashMap<(AccountId, AssetId), u64>,
}

impl InMemoryCustody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` units of `asset` to `account`.
    pub fn deposit(&mut self, account: &str, asset: &str, amount: u64) {
        *self
            .balances
            .entry((account.to_owned(), asset.to_owned()))
            .or_insert(0) += amount;
    }

    /// Authorize the engine to move up to `amount` units of `asset` out of
    /// `owner`'s account. Overwrites any previous approval.
    pub fn approve(&mut self, owner: &str, asset: &str, amount: u64) {
        self.allowances
            .insert((owner.to_owned(), asset.to_owned()), amount);
    }
}

impl Custody for InMemoryCustody {
    fn balance_of(&self, account: &str, asset: &str) -> u64 {
        self.balances
            .get(&(account.to_owned(), asset.to_owned()))
            .copied()
            .unwrap_or(0)
    }

    fn allowance(&self, owner: &str, asset: &str) -> u64 {
        self.allowances
            .get(&(owner.to_owned(), asset.to_owned()))
            .copied()
            .unwrap_or(0)
    }

    fn transfer_from(
        &mut self,
        from: &str,
        to: &str,
        asset: &str,
        amount: u64,
    ) -> Result<(), CustodyError> {
        let approved = self.allowance(from, asset);
        if approved < amount {
            return Err(CustodyError::InsufficientAllowance {
                account: from.to_owned(),
                asset: asset.to_owned(),
                required: amount,
                approved,
            });
        }
        let available = self.balance_of(from, asset);
        if available < amount {
            return Err(CustodyError::InsufficientBalance {
                account: from.to_owned(),
                asset: asset.to_owned(),
                required: amount,
                available,
            });
        }
        self.allowances
            .insert((from.to_owned(), asset.to_owned()), approved - amount);
        self.balances
            .insert((from.to_owned(), asset.to_owned()), available - amount);
        *self
            .balances
            .entry((to.to_owned(), asset.to_owned()))
            .or_insert(0) += amount;
        Ok(())
    }
}
