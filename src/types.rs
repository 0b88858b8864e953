use serde::{Deserialize, Deserializer};
use std::fmt;

pub type Symbol = String;

#[derive(Deserialize, Debug, Clone)]
pub struct BotConfig {
    pub live: LiveConfig,
}

fn default_snapshot_interval_ms() -> u64 {
    10_000
}

fn default_matrix_depth() -> usize {
    5
}

fn default_change_gap_pct() -> f64 {
    1.0
}

fn default_leverage() -> f64 {
    10.0
}

fn default_max_positions() -> usize {
    3
}

fn default_entry_balance_share() -> f64 {
    0.1
}

fn default_trailing_stop_pct() -> f64 {
    1.0
}

fn default_wallet_poll_ms() -> u64 {
    500
}

fn default_reconcile_interval_secs() -> u64 {
    60
}

#[derive(Deserialize, Debug, Clone)]
pub struct LiveConfig {
    pub strategy: Strategy,
    #[serde(default)]
    pub price_type: PriceType,
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,
    /// Number of snapshots kept per symbol in the price matrix.
    #[serde(default = "default_matrix_depth")]
    pub matrix_depth: usize,
    /// Minimum absolute change (percent) across a full matrix row.
    #[serde(default = "default_change_gap_pct")]
    pub change_gap_pct: f64,
    #[serde(default = "default_leverage")]
    pub leverage: f64,
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    /// Fraction of the available balance used as margin for one entry.
    #[serde(default = "default_entry_balance_share")]
    pub entry_balance_share: f64,
    #[serde(default = "default_trailing_stop_pct")]
    pub trailing_stop_pct: f64,
    #[serde(default)]
    pub take_profit_pnl_pct: Option<f64>,
    #[serde(default)]
    pub stop_loss_pnl_pct: Option<f64>,
    #[serde(default = "default_wallet_poll_ms")]
    pub wallet_poll_ms: u64,
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    #[serde(default)]
    pub approved_coins: Vec<String>,
    #[serde(default)]
    pub ignored_coins: Vec<String>,
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for LiveConfig {
    fn default() -> Self {
        LiveConfig {
            strategy: Strategy::Inertia,
            price_type: PriceType::default(),
            snapshot_interval_ms: default_snapshot_interval_ms(),
            matrix_depth: default_matrix_depth(),
            change_gap_pct: default_change_gap_pct(),
            leverage: default_leverage(),
            max_positions: default_max_positions(),
            entry_balance_share: default_entry_balance_share(),
            trailing_stop_pct: default_trailing_stop_pct(),
            take_profit_pnl_pct: None,
            stop_loss_pnl_pct: None,
            wallet_poll_ms: default_wallet_poll_ms(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            approved_coins: Vec::new(),
            ignored_coins: Vec::new(),
            dry_run: false,
        }
    }
}

/// How a detected move is traded: `Inertia` follows it, `Reverse` fades it.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "String")]
pub enum Strategy {
    Inertia,
    Reverse,
}

impl TryFrom<String> for Strategy {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "INERTIA" => Ok(Strategy::Inertia),
            "REVERSE" => Ok(Strategy::Reverse),
            other => Err(format!("unknown strategy: {}", other)),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(try_from = "String")]
pub enum PriceType {
    #[default]
    LastPrice,
    IndexPrice,
    MarkPrice,
}

impl TryFrom<String> for PriceType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "lastPrice" => Ok(PriceType::LastPrice),
            "indexPrice" => Ok(PriceType::IndexPrice),
            "markPrice" => Ok(PriceType::MarkPrice),
            other => Err(format!("unknown price type: {}", other)),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "Buy",
            Side::Sell => "Sell",
        }
    }

    pub fn position_side(&self) -> PositionSide {
        match self {
            Side::Buy => PositionSide::Long,
            Side::Sell => PositionSide::Short,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSide {
    Long,
    Short,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Untriggered,
    Rejected,
    PartiallyFilledCanceled,
    Filled,
    Cancelled,
    Triggered,
    Deactivated,
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: String,
    pub symbol: Symbol,
    pub side: Side,
    pub order_status: OrderStatus,
    #[serde(default)]
    pub order_type: String,
    #[serde(default, deserialize_with = "de_f64")]
    pub qty: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub price: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub avg_price: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub cum_exec_qty: f64,
    #[serde(default)]
    pub updated_time: String,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub symbol: Symbol,
    /// Empty on the exchange side once the position is closed.
    #[serde(default, deserialize_with = "de_opt_side")]
    pub side: Option<Side>,
    #[serde(default, deserialize_with = "de_f64")]
    pub size: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub avg_price: f64,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub entry_price: Option<f64>,
    #[serde(default, deserialize_with = "de_f64")]
    pub mark_price: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub leverage: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub unrealised_pnl: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub trailing_stop: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub take_profit: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub stop_loss: f64,
}

impl Position {
    /// Average entry price; the private stream reports it as `entryPrice`.
    pub fn entry(&self) -> f64 {
        if self.avg_price > 0.0 {
            self.avg_price
        } else {
            self.entry_price.unwrap_or(0.0)
        }
    }

    pub fn is_open(&self) -> bool {
        self.side.is_some()
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WalletSnapshot {
    #[serde(default)]
    pub account_type: String,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub total_equity: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub total_wallet_balance: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub total_margin_balance: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub total_available_balance: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub total_perp_upl: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub total_initial_margin: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub total_maintenance_margin: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    pub symbol: Symbol,
    pub contract_type: String,
    pub status: String,
    pub quote_coin: String,
    pub qty_step: f64,
    pub min_order_qty: f64,
    pub tick_size: f64,
    pub max_leverage: f64,
}

/// Ticker fields as pushed by the exchange. Delta frames carry only the
/// fields that changed, so every price is optional.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    pub symbol: Symbol,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub last_price: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub index_price: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub mark_price: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub bid1_price: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub ask1_price: Option<f64>,
    #[serde(rename = "price24hPcnt", default, deserialize_with = "de_opt_f64")]
    pub price_24h_pcnt: Option<f64>,
    #[serde(rename = "turnover24h", default, deserialize_with = "de_opt_f64")]
    pub turnover_24h: Option<f64>,
}

impl Ticker {
    pub fn merge(&mut self, delta: Ticker) {
        fn take(dst: &mut Option<f64>, src: Option<f64>) {
            if src.is_some() {
                *dst = src;
            }
        }
        take(&mut self.last_price, delta.last_price);
        take(&mut self.index_price, delta.index_price);
        take(&mut self.mark_price, delta.mark_price);
        take(&mut self.bid1_price, delta.bid1_price);
        take(&mut self.ask1_price, delta.ask1_price);
        take(&mut self.price_24h_pcnt, delta.price_24h_pcnt);
        take(&mut self.turnover_24h, delta.turnover_24h);
    }

    pub fn price(&self, price_type: PriceType) -> Option<f64> {
        let price = match price_type {
            PriceType::LastPrice => self.last_price,
            PriceType::IndexPrice => self.index_price,
            PriceType::MarkPrice => self.mark_price,
        };
        price.filter(|p| *p > 0.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradingStop {
    pub trailing_stop: Option<f64>,
    pub take_profit: Option<f64>,
    pub stop_loss: Option<f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Str(String),
    Num(f64),
}

/// Exchange numbers arrive as strings; an empty string means "not set".
pub(crate) fn de_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawNumber>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawNumber::Num(n)) => Ok(Some(n)),
        Some(RawNumber::Str(s)) if s.trim().is_empty() => Ok(None),
        Some(RawNumber::Str(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}

pub(crate) fn de_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(de_opt_f64(deserializer)?.unwrap_or(0.0))
}

fn de_opt_side<'de, D>(deserializer: D) -> Result<Option<Side>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref() {
        Some("Buy") => Ok(Some(Side::Buy)),
        Some("Sell") => Ok(Some(Side::Sell)),
        _ => Ok(None),
    }
}
