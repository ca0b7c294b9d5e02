//! Typed field extractors.
//!
//! Each target field lists well-known nesting paths tried in order, then a
//! lowercase alias set for the breadth-first fallback. An empty alias set
//! disables the fallback for that field.

use serde_json::Value;

use super::walk::{MAX_VISITED_NODES, as_number, find_numeric, lookup};

/// Extraction rule for one numeric field.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Field name, for logs.
    pub name: &'static str,
    /// Dotted paths tried first, in priority order.
    pub paths: &'static [&'static str],
    /// Lowercase alias keys for the graph walk.
    pub aliases: &'static [&'static str],
    /// Reject zero and negative values (prices).
    pub positive: bool,
}

impl FieldSpec {
    /// Resolve the field against a payload. First match wins.
    #[must_use]
    pub fn resolve(&self, payload: &Value) -> Option<f64> {
        let accept = |v: f64| !self.positive || v > 0.0;

        self.paths
            .iter()
            .filter_map(|path| lookup(payload, path).and_then(as_number))
            .find(|v| accept(*v))
            .or_else(|| find_numeric(payload, self.aliases, MAX_VISITED_NODES).filter(|v| accept(*v)))
    }
}

/// Last price.
pub const PRICE: FieldSpec = FieldSpec {
    name: "price",
    paths: &["price", "lastTrade.p", "min.c", "day.c", "last.price", "lastPrice"],
    aliases: &["price", "lastprice", "latestprice", "last_price", "p"],
    positive: true,
};

/// Regular-session open.
pub const OPEN: FieldSpec = FieldSpec {
    name: "open",
    paths: &["open", "day.o", "session.open", "dailyOpen"],
    aliases: &["open", "o", "openprice", "dayopen", "regularopen"],
    positive: true,
};

/// Previous session close.
pub const PREV_CLOSE: FieldSpec = FieldSpec {
    name: "prev_close",
    paths: &["prevClose", "prevDay.c", "previousClose", "session.previous_close"],
    aliases: &["prevclose", "previousclose", "prev_close", "previous_close", "pc"],
    positive: true,
};

/// Regular-session close of the current day (after-hours reference).
pub const DAY_CLOSE: FieldSpec = FieldSpec {
    name: "day_close",
    paths: &["day.c", "regularClose", "session.close"],
    aliases: &["regularclose", "dayclose"],
    positive: true,
};

/// Session volume.
pub const VOLUME: FieldSpec = FieldSpec {
    name: "volume",
    paths: &["volume", "day.v", "min.av", "session.volume"],
    aliases: &["volume", "v", "av", "dayvolume", "totalvolume"],
    positive: false,
};

/// Explicit change percent.
pub const PRICE_PCT: FieldSpec = FieldSpec {
    name: "price_pct",
    paths: &["pricePct", "todaysChangePerc", "changePercent", "session.change_percent"],
    aliases: &["pricepct", "todayschangeperc", "changepercent", "changespercentage"],
    positive: false,
};

/// Explicit gap percent.
pub const GAP_PCT: FieldSpec = FieldSpec {
    name: "gap_pct",
    paths: &["gapPct", "gap"],
    aliases: &["gappct", "gap_pct", "gappercent"],
    positive: false,
};

/// Explicit extended-hours percent.
pub const EXT_PCT: FieldSpec = FieldSpec {
    name: "ext_pct",
    paths: &[
        "extPct",
        "session.early_trading_change_percent",
        "session.late_trading_change_percent",
    ],
    aliases: &["extpct", "ext_pct", "premarketchangepercent", "afterhourschangepercent"],
    positive: false,
};

/// Free-float shares.
pub const FLOAT_SHARES: FieldSpec = FieldSpec {
    name: "float_shares",
    paths: &["floatShares", "float", "sharesFloat", "freeFloat"],
    aliases: &["floatshares", "float", "sharesfloat", "freefloat", "float_shares"],
    positive: true,
};

/// Market capitalisation.
pub const MARKET_CAP: FieldSpec = FieldSpec {
    name: "market_cap",
    paths: &["marketCap", "market_cap", "mktCap"],
    aliases: &["marketcap", "market_cap", "mktcap"],
    positive: true,
};

/// Last update time, any unit.
pub const UPDATED: FieldSpec = FieldSpec {
    name: "updated",
    paths: &["updatedAt", "updated", "lastTrade.t", "min.t", "last_updated"],
    aliases: &["updatedat", "updated", "timestamp", "last_updated"],
    positive: true,
};

/// Session VWAP (day aggregate or computed).
pub const VWAP: FieldSpec = FieldSpec {
    name: "vwap",
    paths: &["vwap", "day.vw"],
    aliases: &[],
    positive: true,
};

/// Indicator fields only ever read back from canonical rows.
pub const VWAP_5M: FieldSpec = FieldSpec {
    name: "vwap5m",
    paths: &["vwap5m"],
    aliases: &[],
    positive: true,
};

/// SMA(20).
pub const SMA20: FieldSpec = FieldSpec {
    name: "sma20",
    paths: &["sma20"],
    aliases: &[],
    positive: false,
};

/// EMA(9).
pub const EMA9: FieldSpec = FieldSpec {
    name: "ema9",
    paths: &["ema9"],
    aliases: &[],
    positive: false,
};

/// EMA(20).
pub const EMA20: FieldSpec = FieldSpec {
    name: "ema20",
    paths: &["ema20"],
    aliases: &[],
    positive: false,
};

/// Awesome Oscillator.
pub const AO: FieldSpec = FieldSpec {
    name: "ao",
    paths: &["ao"],
    aliases: &[],
    positive: false,
};
