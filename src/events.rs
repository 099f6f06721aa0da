use serde::{Deserialize, Serialize};

use crate::orders::{AccountId, AssetId, Order};
use crate::trade::Trade;

/// Structured notification emitted by every state-mutating engine
/// operation, for external observers (websocket subscribers, audit).
///
/// Events are produced only after an operation has fully committed; an
/// aborted call emits nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    OrderCreated {
        order: Order,
    },
    OrderCancelled {
        order_id: u64,
    },
    /// A fill against one side of a trade: `filled` units came off the
    /// order, `remaining` is what is left (0 means the order went inactive).
    OrderFilled {
        order_id: u64,
        filled: u64,
        remaining: u64,
    },
    TradeExecuted {
        trade: Trade,
    },
    AssetWhitelisted {
        asset: AssetId,
    },
    AssetRemoved {
        asset: AssetId,
    },
    TradingEnabled {
        enabled: bool,
    },
    FeeRateChanged {
        bps: u16,
    },
    FeeCollectorChanged {
        collector: AccountId,
    },
}
