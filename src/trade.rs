use std::time::SystemTime;

use crate::orders::{AccountId, AssetId};

/// A trade records a matched transaction between one buy and one sell order
/// on the same asset.
///
/// # Terminology
/// - **Resting order**: the order already in the store when the match ran.
/// - **Triggering order**: the incoming order whose creation started the scan.
///
/// # Behavior
/// - The trade always executes at the **resting** order's price, never the
///   triggering order's.
/// - `amount` never exceeds the remaining amount of either matched order at
///   execution time.
/// - `fee` is bookkeeping only: it is computed from the fee rate in force
///   when the trade executed, but no transfer to the fee collector happens.
///
/// Trade records are immutable once appended to the ledger.
#[derive(
    Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, bincode::Encode,
    bincode::Decode,
)]
pub struct Trade {
    pub id: u64,
    pub buy_order_id: u64,
    pub sell_order_id: u64,
    pub buyer: AccountId,
    pub seller: AccountId,
    pub asset: AssetId,
    pub amount: u64,
    pub execution_price: u64,
    pub fee: u128,
    pub timestamp: SystemTime,
}
