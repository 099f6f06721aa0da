use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Identity of a caller (maker, admin, fee collector). The hosting
/// environment is responsible for authenticating these; the matcher
/// only compares them.
pub type AccountId = String;

/// Identifier of a tradable instrument, e.g. "BTC". Assets are admitted
/// through the whitelist in [`crate::settings::Settings`].
pub type AssetId = String;

/// Represents which side of the market the order is on.
///
/// Unlike a price-time-priority book, the default matcher does not look for
/// the best price first: a buy crosses any sell with `sell.price <=
/// buy.price`, scanned in ascending order-id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// An order submitted by a maker.
///
/// - `id` is assigned sequentially by the engine, starting at 1, never reused.
/// - `amount` is the *remaining* fillable quantity; it only ever decreases.
/// - `price` is a limit price in smallest currency units, fixed at creation.
/// - `active` flips to false on full fill or cancellation, and never back.
///
/// Orders are never deleted; inactive orders are retained for audit and the
/// per-user query views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub maker: AccountId,
    pub asset: AssetId,
    pub amount: u64,
    pub price: u64,
    pub side: Side,
    pub created_at: SystemTime,
    pub active: bool,
}

impl Order {
    /// The crossing condition: does `self` (the triggering order) price-cross
    /// the `resting` counter-order? Symmetric statement: a buy crosses any
    /// sell at or below its price, a sell crosses any buy at or above its.
    pub fn crosses(&self, resting: &Order) -> bool {
        match self.side {
            Side::Buy => self.price >= resting.price,
            Side::Sell => self.price <= resting.price,
        }
    }
}
