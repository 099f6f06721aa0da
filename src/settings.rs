use std::collections::HashSet;

use serde::Serialize;

use crate::errors::StateError;
use crate::orders::{AccountId, AssetId};

/// Upper bound on the fee rate: 100 basis points = 1%.
pub const MAX_FEE_RATE_BPS: u16 = 100;

/// Process-wide administrative state gating order admission.
///
/// Initialized once at startup and mutated only through the admin
/// operations on the engine; never reset.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub trading_enabled: bool,
    pub fee_rate_bps: u16,
    pub fee_collector: AccountId,
    pub whitelisted_assets: HashSet<AssetId>,
}

impl Settings {
    /// Fresh settings: trading disabled, empty whitelist, zero fee. The
    /// administrator flips the switches before the first order is accepted.
    pub fn new(fee_collector: AccountId) -> Self {
        Self {
            trading_enabled: false,
            fee_rate_bps: 0,
            fee_collector,
            whitelisted_assets: HashSet::new(),
        }
    }

    pub fn is_whitelisted(&self, asset: &str) -> bool {
        self.whitelisted_assets.contains(asset)
    }

    pub fn set_fee_rate(&mut self, bps: u16) -> Result<(), StateError> {
        if bps > MAX_FEE_RATE_BPS {
            return Err(StateError::FeeRateOutOfRange(bps));
        }
        self.fee_rate_bps = bps;
        Ok(())
    }

    pub fn set_fee_collector(&mut self, collector: AccountId) -> Result<(), StateError> {
        if collector.is_empty() {
            return Err(StateError::EmptyIdentity);
        }
        self.fee_collector = collector;
        Ok(())
    }
}
