use thiserror::Error;

use crate::custody::CustodyError;

/// Admission-gate rejections raised before an order is persisted. None of
/// these mutate any state; in particular the order id counter is untouched.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("trading is disabled")]
    TradingDisabled,
    #[error("asset `{0}` is not whitelisted")]
    AssetNotWhitelisted(String),
    #[error("amount must be > 0")]
    ZeroAmount,
    #[error("price must be > 0")]
    ZeroPrice,
    #[error("allowance {allowance} is below the order amount {required}")]
    InsufficientAllowance { required: u64, allowance: u64 },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("caller is not the order maker")]
    NotMaker,
    #[error("caller is not the administrator")]
    NotAdmin,
}

/// Rejections caused by the current state of the store or settings.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StateError {
    #[error("order {0} not found")]
    OrderNotFound(u64),
    #[error("order {0} is no longer active")]
    OrderInactive(u64),
    #[error("matched orders are not a buy/sell pair")]
    SideMismatch,
    #[error("matched orders reference different assets")]
    AssetMismatch,
    #[error("fee rate {0} bps exceeds the 100 bps bound")]
    FeeRateOutOfRange(u16),
    #[error("identity must be non-empty")]
    EmptyIdentity,
}

/// Top-level error surfaced by every engine operation, one variant per
/// taxonomy category. All failures are synchronous and none are retried;
/// a settlement failure aborts the whole create/match/settle call with no
/// state mutated.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EngineError {
    #[error("admission rejected: {0}")]
    Admission(#[from] AdmissionError),
    #[error("authorization rejected: {0}")]
    Authorization(#[from] AuthorizationError),
    #[error("state rejected: {0}")]
    State(#[from] StateError),
    #[error("settlement failed: {0}")]
    Settlement(#[from] CustodyError),
}
