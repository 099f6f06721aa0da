use std::collections::{BTreeMap, HashMap};
use std::time::SystemTime;

use tracing::{info, warn};

use crate::custody::{Custody, CustodyError};
use crate::errors::{AdmissionError, AuthorizationError, EngineError, StateError};
use crate::events::Event;
use crate::orders::{AccountId, Order, Side};
use crate::settings::Settings;
use crate::trade::Trade;

/// How the matching scan walks the store.
///
/// [`MatchPolicy::IdAscending`] is the default: a linear walk of
/// every order ever created, in ascending id order, so the earliest-created
/// compatible counter-order wins even when a later one has a better price.
/// [`MatchPolicy::BestPriceFirst`] is a variant for performance comparison
/// only; it is never the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPolicy {
    #[default]
    IdAscending,
    BestPriceFirst,
}

/// Result of a successful `create_order` call: the new order's id, the
/// trades it triggered (possibly none), and the notifications emitted.
#[derive(Debug, Clone)]
pub struct CreateOrderReport {
    pub order_id: u64,
    pub trades: Vec<Trade>,
    pub events: Vec<Event>,
}

/// A stable slice of the active orders for one (asset, side), consistent
/// with ascending-id iteration. `total` is the size of the full active
/// subset, computed before slicing.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ActiveOrdersPage {
    pub total: usize,
    pub orders: Vec<Order>,
}

/// A trade the scan decided on, to be settled at commit time. `price` is
/// always the resting order's price.
struct PlannedTrade {
    buy_order_id: u64,
    sell_order_id: u64,
    price: u64,
    amount: u64,
}

/// The order book matcher: order store, matching scan, trade ledger and
/// admin settings gate in one place.
///
/// One engine call is one atomic unit of work. Callers serialize access
/// (the server wraps the engine in a single `Mutex`), so create, match and
/// settle always run to completion before the next call observes anything.
/// A custody failure mid-match aborts the whole call with no orders,
/// trades or balances mutated: the scan is *planned* against read-only
/// custody checks first, and state is only touched once the full plan is
/// known to settle.
#[derive(Clone)]
pub struct Engine<C: Custody> {
    custody: C,
    admin: AccountId,
    policy: MatchPolicy,
    settings: Settings,

    /// Every order ever created, keyed by id. Never removes an entry.
    orders: BTreeMap<u64, Order>,
    /// Append-only trade ledger; `trades[i].id == i + 1`.
    trades: Vec<Trade>,
    next_order_id: u64,
    next_trade_id: u64,

    user_buy_orders: HashMap<AccountId, Vec<u64>>,
    user_sell_orders: HashMap<AccountId, Vec<u64>>,
    user_trades: HashMap<AccountId, Vec<u64>>,

    /// Notifications accumulated by the call in flight, drained into the
    /// report on commit.
    events: Vec<Event>,
}

impl<C: Custody> Engine<C> {
    /// New engine with fresh settings (trading disabled, empty whitelist).
    /// The fee collector starts out as the administrator until changed.
    pub fn new(custody: C, admin: AccountId) -> Self {
        Self {
            custody,
            settings: Settings::new(admin.clone()),
            admin,
            policy: MatchPolicy::default(),
            orders: BTreeMap::new(),
            trades: Vec::new(),
            next_order_id: 1,
            next_trade_id: 1,
            user_buy_orders: HashMap::new(),
            user_sell_orders: HashMap::new(),
            user_trades: HashMap::new(),
            events: Vec::new(),
        }
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn custody(&self) -> &C {
        &self.custody
    }

    /// The in-memory custody stand-in is seeded through this; a real
    /// deployment would credit balances out of band.
    pub fn custody_mut(&mut self) -> &mut C {
        &mut self.custody
    }

    pub fn order(&self, id: u64) -> Option<&Order> {
        self.orders.get(&id)
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Id the next created order will get. Rejected calls never consume it.
    pub fn next_order_id(&self) -> u64 {
        self.next_order_id
    }

    // ---- order lifecycle ---------------------------------------------------

    /// Admit, persist and immediately match a new order.
    ///
    /// Matching runs before this returns: any trades the new order triggers
    /// are settled as part of the same call.
    pub fn create_order(
        &mut self,
        maker: &str,
        asset: &str,
        amount: u64,
        price: u64,
        side: Side,
    ) -> Result<CreateOrderReport, EngineError> {
        self.admit(maker, asset, amount, price, side)?;

        let order = Order {
            id: self.next_order_id,
            maker: maker.to_owned(),
            asset: asset.to_owned(),
            amount,
            price,
            side,
            created_at: SystemTime::now(),
            active: true,
        };
        let plan = self.plan_matches(&order)?;

        // Commit. Nothing above mutated the engine or custody, so a
        // rejection or settlement shortfall left no trace.
        self.next_order_id += 1;
        let order_id = order.id;
        let index = match side {
            Side::Buy => &mut self.user_buy_orders,
            Side::Sell => &mut self.user_sell_orders,
        };
        index.entry(maker.to_owned()).or_default().push(order_id);
        self.events.push(Event::OrderCreated {
            order: order.clone(),
        });
        self.orders.insert(order_id, order);
        info!(order_id, maker, asset, amount, price, ?side, "order created");

        let mut trades = Vec::with_capacity(plan.len());
        for planned in plan {
            let trade =
                self.execute_trade(planned.buy_order_id, planned.sell_order_id, planned.price)?;
            debug_assert_eq!(trade.amount, planned.amount);
            trades.push(trade);
            // Fully filled: stop seeking further matches.
            if !self.orders[&order_id].active {
                break;
            }
        }

        Ok(CreateOrderReport {
            order_id,
            trades,
            events: self.take_events(),
        })
    }

    /// Deactivate an order. Only the maker may cancel, and only while the
    /// order is still active. `amount` is left untouched, and any custody
    /// allowance the maker granted for a sell stays granted (a known gap,
    /// see DESIGN.md).
    pub fn cancel_order(&mut self, order_id: u64, caller: &str) -> Result<Vec<Event>, EngineError> {
        let order = self
            .orders
            .get_mut(&order_id)
            .ok_or(StateError::OrderNotFound(order_id))?;
        if order.maker != caller {
            return Err(AuthorizationError::NotMaker.into());
        }
        if !order.active {
            return Err(StateError::OrderInactive(order_id).into());
        }
        order.active = false;
        info!(order_id, caller, "order cancelled");
        self.events.push(Event::OrderCancelled { order_id });
        Ok(self.take_events())
    }

    /// The admission gate. Each check is a distinct rejection reason; none
    /// of them mutates anything.
    fn admit(
        &self,
        maker: &str,
        asset: &str,
        amount: u64,
        price: u64,
        side: Side,
    ) -> Result<(), EngineError> {
        if !self.settings.trading_enabled {
            return Err(AdmissionError::TradingDisabled.into());
        }
        if !self.settings.is_whitelisted(asset) {
            return Err(AdmissionError::AssetNotWhitelisted(asset.to_owned()).into());
        }
        if amount == 0 {
            return Err(AdmissionError::ZeroAmount.into());
        }
        if price == 0 {
            return Err(AdmissionError::ZeroPrice.into());
        }
        // Sellers must have pre-authorized the engine for at least the full
        // order amount; the debit itself only happens at settlement. Buy
        // orders carry no upfront collateral lock at all - buyer funding is
        // handled outside the engine.
        if side == Side::Sell {
            let allowance = self.custody.allowance(maker, asset);
            if allowance < amount {
                warn!(maker, asset, amount, allowance, "sell order under-approved");
                return Err(AdmissionError::InsufficientAllowance {
                    required: amount,
                    allowance,
                }
                .into());
            }
        }
        Ok(())
    }

    // ---- matching ----------------------------------------------------------

    /// Run the matching scan for `trigger` without touching any state.
    ///
    /// Walks the store per the configured [`MatchPolicy`], collecting the
    /// trades that settlement will perform, and validates against custody
    /// (read-only) that every seller can cover the *cumulative* amount the
    /// plan takes from them. A shortfall surfaces here, before anything has
    /// been mutated, which is what makes the all-or-nothing abort cheap.
    fn plan_matches(&self, trigger: &Order) -> Result<Vec<PlannedTrade>, EngineError> {
        if !trigger.active {
            return Ok(Vec::new());
        }
        let mut remaining = trigger.amount;
        let mut planned = Vec::new();
        let mut debits: HashMap<AccountId, u64> = HashMap::new();

        for resting in self.scan_candidates(trigger) {
            if remaining == 0 {
                break;
            }
            if resting.id == trigger.id || !resting.active {
                continue;
            }
            if resting.asset != trigger.asset || resting.side != trigger.side.opposite() {
                continue;
            }
            if !trigger.crosses(resting) {
                continue;
            }

            let amount = remaining.min(resting.amount);
            let (buy_order_id, sell_order_id, seller) = match trigger.side {
                Side::Buy => (trigger.id, resting.id, resting.maker.clone()),
                Side::Sell => (resting.id, trigger.id, trigger.maker.clone()),
            };

            let owed = debits.entry(seller.clone()).or_insert(0);
            *owed += amount;
            let available = self.custody.balance_of(&seller, &trigger.asset);
            if available < *owed {
                warn!(seller = %seller, required = *owed, available, "settlement would overdraw seller, aborting call");
                return Err(CustodyError::InsufficientBalance {
                    required: *owed,
                    available,
                    account: seller,
                    asset: trigger.asset.clone(),
                }
                .into());
            }
            let approved = self.custody.allowance(&seller, &trigger.asset);
            if approved < *owed {
                return Err(CustodyError::InsufficientAllowance {
                    required: *owed,
                    approved,
                    account: seller,
                    asset: trigger.asset.clone(),
                }
                .into());
            }

            planned.push(PlannedTrade {
                buy_order_id,
                sell_order_id,
                price: resting.price,
                amount,
            });
            remaining -= amount;
        }
        Ok(planned)
    }

    /// Candidate orders in scan order. The default policy is the plain
    /// ascending-id walk of the whole store, O(n) per insert by design.
    fn scan_candidates(&self, trigger: &Order) -> Vec<&Order> {
        let mut candidates: Vec<&Order> = self.orders.values().collect();
        if self.policy == MatchPolicy::BestPriceFirst {
            match trigger.side {
                // Buy trigger wants the cheapest sell first.
                Side::Buy => candidates.sort_by_key(|o| (o.price, o.id)),
                // Sell trigger wants the highest bid first.
                Side::Sell => candidates.sort_by_key(|o| (std::cmp::Reverse(o.price), o.id)),
            }
        }
        candidates
    }

    // ---- settlement --------------------------------------------------------

    /// Settle one trade between an active buy and sell order on the same
    /// asset, at `trade_price` (the resting order's price).
    ///
    /// The fee is computed and recorded on the trade but never transferred
    /// to the collector (a known gap). The asset moves seller to
    /// buyer through custody; planning already validated the debit, so
    /// under serialized execution the transfer cannot fail here.
    fn execute_trade(
        &mut self,
        buy_order_id: u64,
        sell_order_id: u64,
        trade_price: u64,
    ) -> Result<Trade, EngineError> {
        let buy = self
            .orders
            .get(&buy_order_id)
            .ok_or(StateError::OrderNotFound(buy_order_id))?;
        let sell = self
            .orders
            .get(&sell_order_id)
            .ok_or(StateError::OrderNotFound(sell_order_id))?;
        if !buy.active {
            return Err(StateError::OrderInactive(buy_order_id).into());
        }
        if !sell.active {
            return Err(StateError::OrderInactive(sell_order_id).into());
        }
        if buy.side != Side::Buy || sell.side != Side::Sell {
            return Err(StateError::SideMismatch.into());
        }
        if buy.asset != sell.asset {
            return Err(StateError::AssetMismatch.into());
        }

        let trade_amount = buy.amount.min(sell.amount);
        let total_value = trade_amount as u128 * trade_price as u128;
        let fee = total_value * self.settings.fee_rate_bps as u128 / 10_000;
        let buyer = buy.maker.clone();
        let seller = sell.maker.clone();
        let asset = buy.asset.clone();

        self.custody
            .transfer_from(&seller, &buyer, &asset, trade_amount)?;

        for id in [buy_order_id, sell_order_id] {
            let order = self
                .orders
                .get_mut(&id)
                .ok_or(StateError::OrderNotFound(id))?;
            order.amount -= trade_amount;
            if order.amount == 0 {
                order.active = false;
            }
            let remaining = order.amount;
            self.events.push(Event::OrderFilled {
                order_id: id,
                filled: trade_amount,
                remaining,
            });
        }

        let trade = Trade {
            id: self.next_trade_id,
            buy_order_id,
            sell_order_id,
            buyer,
            seller,
            asset,
            amount: trade_amount,
            execution_price: trade_price,
            fee,
            timestamp: SystemTime::now(),
        };
        self.next_trade_id += 1;
        self.trades.push(trade.clone());
        self.user_trades
            .entry(trade.buyer.clone())
            .or_default()
            .push(trade.id);
        if trade.seller != trade.buyer {
            self.user_trades
                .entry(trade.seller.clone())
                .or_default()
                .push(trade.id);
        }
        info!(
            trade_id = trade.id,
            buy_order_id,
            sell_order_id,
            amount = trade_amount,
            price = trade_price,
            "trade executed"
        );
        self.events.push(Event::TradeExecuted {
            trade: trade.clone(),
        });
        Ok(trade)
    }

    // ---- admin settings gate ----------------------------------------------

    fn require_admin(&self, caller: &str) -> Result<(), EngineError> {
        if caller != self.admin {
            return Err(AuthorizationError::NotAdmin.into());
        }
        Ok(())
    }

    pub fn whitelist_asset(&mut self, caller: &str, asset: &str) -> Result<Vec<Event>, EngineError> {
        self.require_admin(caller)?;
        self.settings.whitelisted_assets.insert(asset.to_owned());
        info!(asset, "asset whitelisted");
        self.events.push(Event::AssetWhitelisted {
            asset: asset.to_owned(),
        });
        Ok(self.take_events())
    }

    /// Un-whitelists an asset. Existing orders on it stay matchable: the
    /// whitelist is only consulted when an order is created.
    pub fn remove_from_whitelist(
        &mut self,
        caller: &str,
        asset: &str,
    ) -> Result<Vec<Event>, EngineError> {
        self.require_admin(caller)?;
        self.settings.whitelisted_assets.remove(asset);
        info!(asset, "asset removed from whitelist");
        self.events.push(Event::AssetRemoved {
            asset: asset.to_owned(),
        });
        Ok(self.take_events())
    }

    pub fn set_trading_enabled(
        &mut self,
        caller: &str,
        enabled: bool,
    ) -> Result<Vec<Event>, EngineError> {
        self.require_admin(caller)?;
        self.settings.trading_enabled = enabled;
        info!(enabled, "trading switch changed");
        self.events.push(Event::TradingEnabled { enabled });
        Ok(self.take_events())
    }

    pub fn set_fee_rate(&mut self, caller: &str, bps: u16) -> Result<Vec<Event>, EngineError> {
        self.require_admin(caller)?;
        self.settings.set_fee_rate(bps)?;
        info!(bps, "fee rate changed");
        self.events.push(Event::FeeRateChanged { bps });
        Ok(self.take_events())
    }

    pub fn set_fee_collector(
        &mut self,
        caller: &str,
        collector: &str,
    ) -> Result<Vec<Event>, EngineError> {
        self.require_admin(caller)?;
        self.settings.set_fee_collector(collector.to_owned())?;
        info!(collector, "fee collector changed");
        self.events.push(Event::FeeCollectorChanged {
            collector: collector.to_owned(),
        });
        Ok(self.take_events())
    }

    // ---- query views -------------------------------------------------------

    /// Active orders for one (asset, side), ascending by id. The active
    /// subset is sized first, then sliced at `start_index`/`count`.
    pub fn get_active_orders(
        &self,
        asset: &str,
        side: Side,
        start_index: usize,
        count: usize,
    ) -> ActiveOrdersPage {
        let matching: Vec<&Order> = self
            .orders
            .values()
            .filter(|o| o.active && o.asset == asset && o.side == side)
            .collect();
        let total = matching.len();
        let orders = matching
            .into_iter()
            .skip(start_index)
            .take(count)
            .cloned()
            .collect();
        ActiveOrdersPage { total, orders }
    }

    pub fn get_user_buy_orders(&self, user: &str) -> Vec<Order> {
        self.resolve_orders(&self.user_buy_orders, user)
    }

    pub fn get_user_sell_orders(&self, user: &str) -> Vec<Order> {
        self.resolve_orders(&self.user_sell_orders, user)
    }

    /// Trades the user participated in, on either side, insertion-ordered.
    pub fn get_user_trades(&self, user: &str) -> Vec<Trade> {
        self.user_trades
            .get(user)
            .map(|ids| {
                ids.iter()
                    .map(|id| self.trades[(id - 1) as usize].clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn resolve_orders(&self, index: &HashMap<AccountId, Vec<u64>>, user: &str) -> Vec<Order> {
        index
            .get(user)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.orders.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn take_events(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }
}
