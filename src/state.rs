use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::custody::InMemoryCustody;
use crate::engine::Engine;
use crate::events::Event;
use crate::orders::{AccountId, AssetId};
use crate::store::TradeLedger;

/// Settings applied (as the administrator) when the process starts.
#[derive(Debug, Clone)]
pub struct BootConfig {
    pub admin: AccountId,
    pub fee_collector: Option<AccountId>,
    pub fee_rate_bps: u16,
    pub trading_enabled: bool,
    pub assets: Vec<AssetId>,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            admin: "admin".into(),
            fee_collector: None,
            fee_rate_bps: 0,
            trading_enabled: true,
            assets: Vec::new(),
        }
    }
}

/// Shared server state. The engine sits behind one `Mutex`: a create,
/// its matching scan and its settlement all happen under a single lock
/// acquisition, so no caller ever observes a half-finished match.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Mutex<Engine<InMemoryCustody>>>,
    pub ledger: Arc<Mutex<TradeLedger>>,
    pub events: broadcast::Sender<Event>,
}

impl AppState {
    pub fn new(db_path: impl AsRef<Path>, boot: BootConfig) -> anyhow::Result<Self> {
        let ledger = TradeLedger::open(db_path)?;
        let mut engine = Engine::new(InMemoryCustody::new(), boot.admin.clone());
        for asset in &boot.assets {
            engine.whitelist_asset(&boot.admin, asset)?;
        }
        if boot.fee_rate_bps > 0 {
            engine.set_fee_rate(&boot.admin, boot.fee_rate_bps)?;
        }
        if let Some(collector) = &boot.fee_collector {
            engine.set_fee_collector(&boot.admin, collector)?;
        }
        if boot.trading_enabled {
            engine.set_trading_enabled(&boot.admin, true)?;
        }

        let (events, _) = broadcast::channel(256);
        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
            ledger: Arc::new(Mutex::new(ledger)),
            events,
        })
    }

    /// Fan out committed notifications to websocket subscribers. Dropped
    /// sends (no subscriber) are fine.
    pub fn publish(&self, events: Vec<Event>) {
        for event in events {
            let _ = self.events.send(event);
        }
    }
}
