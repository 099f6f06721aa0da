use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use bincode::{
    config::{self, standard},
    error::{DecodeError, EncodeError},
};
use parity_db::{BTreeIterator, ColId, Db, Options};
use std::path::Path;
use thiserror::Error;

use crate::trade::Trade;

/// Cursor (opaque to clients). Trade ids are unique and assigned in
/// append order, so the id alone pins a position in the ledger.
#[derive(serde::Serialize, serde::Deserialize)]
struct Cursor {
    trade_id: u64,
}

/// Errors from the key/value trade ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ParityDB error: {0}")]
    Parity(#[from] parity_db::Error),
    #[error("Serialization/Deserialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Bincode encode error: {0}")]
    BincodeEncode(#[from] EncodeError),

    #[error("Bincode decode error: {0}")]
    BincodeDecode(#[from] DecodeError),

    #[error("Invalid cursor")]
    BadCursor,
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// A ParityDB-backed append-only ledger of executed trades, keyed by
/// "{asset}:{trade_id}" so one asset's history is a contiguous key range.
pub struct TradeLedger {
    db: Db,
}

impl TradeLedger {
    /// Open (or create) a ParityDB at `path`, with a single column and B-tree index.
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let mut opts = Options::with_columns(path.as_ref(), 1);
        // enable B-tree index on column 0 for prefix scans
        opts.columns[0].btree_index = true;
        let db = Db::open_or_create(&opts)?;
        Ok(TradeLedger { db })
    }

    #[inline]
    fn prefix(asset: &str) -> Vec<u8> {
        let mut k = Vec::with_capacity(asset.len() + 1);
        k.extend_from_slice(asset.as_bytes());
        k.push(b':');
        k
    }

    /// Big-endian trade id after the prefix keeps the B-tree iteration in
    /// append order within one asset.
    #[inline]
    fn encode_key(asset: &str, trade_id: u64) -> Vec<u8> {
        let mut key = Self::prefix(asset);
        key.extend_from_slice(&trade_id.to_be_bytes());
        key
    }

    #[inline]
    fn encode_cursor(trade_id: u64) -> String {
        B64.encode(serde_json::to_vec(&Cursor { trade_id }).unwrap())
    }

    #[inline]
    fn decode_cursor(s: &str) -> LedgerResult<Cursor> {
        let bytes = B64.decode(s).map_err(|_| LedgerError::BadCursor)?;
        serde_json::from_slice(&bytes).map_err(|_| LedgerError::BadCursor)
    }

    /// Append a trade under "{asset}:{trade_id}".
    pub fn append(&mut self, trade: &Trade) -> LedgerResult<()> {
        let config = config::standard();
        let col: ColId = 0;
        let key = Self::encode_key(&trade.asset, trade.id);
        let value = bincode::encode_to_vec(trade, config)?;
        self.db.commit(vec![(col, key, Some(value))])?;
        Ok(())
    }

    /// Page one asset's trades in ascending id order. `after` is a cursor
    /// returned by a previous page; it must reference a trade that exists
    /// under this asset, otherwise the call fails with `BadCursor`.
    pub fn page_asc(
        &self,
        asset: &str,
        after: Option<&str>,
        limit: usize,
    ) -> LedgerResult<(Vec<Trade>, Option<String>)> {
        let col: ColId = 0;
        let mut it: BTreeIterator<'_> = self.db.iter(col)?;
        let prefix = Self::prefix(asset);

        match after {
            Some(s) => {
                let cursor = Self::decode_cursor(s)?;
                let full = Self::encode_key(asset, cursor.trade_id);
                let mut check = self.db.iter(col)?;
                check.seek(&full)?;
                match check.next()? {
                    Some((k, _)) if k == full => {}
                    _ => return Err(LedgerError::BadCursor),
                }
                // Start strictly after that exact key
                it.seek(&full)?;
                let _ = it.next()?; //consume the equal key
            }
            None => it.seek(&prefix)?,
        }

        let mut items = Vec::with_capacity(limit.min(256));
        let mut last_cursor: Option<String> = None;

        while items.len() < limit {
            match it.next()? {
                Some((k, v)) if k.starts_with(&prefix) => {
                    let (trade, _): (Trade, usize) = bincode::decode_from_slice(&v, standard())?;
                    last_cursor = Some(Self::encode_cursor(trade.id));
                    items.push(trade);
                }
                _ => break,
            }
        }

        Ok((items, last_cursor))
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::trade::Trade;
    use tempfile::tempdir;

    fn sample_trade(id: u64, asset: &str, price: u64) -> Trade {
        Trade {
            id,
            buy_order_id: id * 2,
            sell_order_id: id * 2 + 1,
            buyer: "bob".into(),
            seller: "alice".into(),
            asset: asset.into(),
            amount: 1,
            execution_price: price,
            fee: 0,
            timestamp: SystemTime::UNIX_EPOCH + Duration::from_secs(id),
        }
    }

    #[test]
    fn test_paging_two_items_limit_one() {
        let dir = tempdir().unwrap();
        let mut ledger = TradeLedger::open(dir.path()).unwrap();

        ledger.append(&sample_trade(1, "BTC", 50)).unwrap();
        ledger.append(&sample_trade(2, "BTC", 51)).unwrap();

        let (p1, c1) = ledger.page_asc("BTC", None, 1).unwrap();
        assert_eq!(p1.len(), 1);
        assert_eq!(p1[0].id, 1); // ascending by id

        let (p2, c2) = ledger.page_asc("BTC", c1.as_deref(), 1).unwrap();
        assert_eq!(p2.len(), 1);
        assert_eq!(p2[0].id, 2);

        let (p3, c3) = ledger.page_asc("BTC", c2.as_deref(), 1).unwrap();
        assert!(p3.is_empty());
        assert!(c3.is_none());
    }

    #[test]
    fn test_reject_cross_asset_cursor() {
        let dir = tempdir().unwrap();
        let mut ledger = TradeLedger::open(dir.path()).unwrap();

        ledger.append(&sample_trade(1, "BTC", 50)).unwrap();
        ledger.append(&sample_trade(2, "ETH", 70)).unwrap();

        let (_btc_page1, btc_cursor) = ledger.page_asc("BTC", None, 1).unwrap();
        assert!(btc_cursor.is_some(), "expected a BTC cursor");

        // A BTC cursor names a trade id that does not exist under ETH
        let bad = ledger.page_asc("ETH", btc_cursor.as_deref(), 1);
        assert!(matches!(bad, Err(LedgerError::BadCursor)));

        // The same cursor on BTC is valid and yields an empty second page
        let (btc_page2, _c2) = ledger.page_asc("BTC", btc_cursor.as_deref(), 1).unwrap();
        assert!(btc_page2.is_empty());
    }

    #[test]
    fn test_bad_cursor_malformed() {
        let dir = tempdir().unwrap();
        let ledger = TradeLedger::open(dir.path()).unwrap();

        // Not base64 at all
        let c1 = "!!!notbase64!!!";
        assert!(matches!(
            ledger.page_asc("BTC", Some(c1), 10),
            Err(LedgerError::BadCursor)
        ));

        // Base64 but not valid JSON
        let c2 = B64.encode(b"\xFF\xFE\xFD");
        assert!(matches!(
            ledger.page_asc("BTC", Some(&c2), 10),
            Err(LedgerError::BadCursor)
        ));

        // Valid JSON but wrong shape for Cursor
        let c3 = B64.encode(serde_json::to_vec(&serde_json::json!({"x": 1})).unwrap());
        assert!(matches!(
            ledger.page_asc("BTC", Some(&c3), 10),
            Err(LedgerError::BadCursor)
        ));
    }

    #[test]
    fn test_bad_cursor_nonexistent_trade() {
        let dir = tempdir().unwrap();
        let mut ledger = TradeLedger::open(dir.path()).unwrap();

        ledger.append(&sample_trade(1, "BTC", 50)).unwrap();

        // Well-formed cursor pointing at a trade id that was never appended
        let bogus = B64.encode(serde_json::to_vec(&serde_json::json!({"trade_id": 999u64})).unwrap());
        let res = ledger.page_asc("BTC", Some(&bogus), 10);
        assert!(matches!(res, Err(LedgerError::BadCursor)));
    }
}
