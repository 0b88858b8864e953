pub mod bybit;
pub mod stream;
#[cfg(test)]
pub mod simulated;

use crate::types::{Instrument, Order, Position, Side, Ticker, TradingStop, WalletSnapshot};
use async_trait::async_trait;
use std::collections::HashMap;

pub type SendSyncError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait Exchange: Send + Sync {
    fn clone_box(&self) -> Box<dyn Exchange>;
    async fn load_instruments(&self) -> Result<Vec<Instrument>, SendSyncError>;
    async fn fetch_tickers(&self) -> Result<HashMap<String, Ticker>, SendSyncError>;
    async fn fetch_wallet(&self) -> Result<Option<WalletSnapshot>, SendSyncError>;
    async fn fetch_positions(&self) -> Result<Vec<Position>, SendSyncError>;
    async fn fetch_open_orders(&self) -> Result<Vec<Order>, SendSyncError>;
    /// Submits a market order and returns the exchange order id.
    async fn place_market_order(
        &mut self,
        symbol: &str,
        side: Side,
        qty: f64,
    ) -> Result<String, SendSyncError>;
    async fn set_trading_stop(
        &mut self,
        symbol: &str,
        stop: &TradingStop,
    ) -> Result<(), SendSyncError>;
}

impl Clone for Box<dyn Exchange> {
    fn clone(&self) -> Box<dyn Exchange> {
        self.clone_box()
    }
}
