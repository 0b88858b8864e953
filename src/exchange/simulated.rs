use super::{Exchange, SendSyncError};
use crate::types::{Instrument, Order, Position, Side, Ticker, TradingStop, WalletSnapshot};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    MarketOrder { symbol: String, side: Side, qty: f64 },
    TradingStop { symbol: String, stop: TradingStop },
}

/// In-memory exchange that serves canned state and records every write.
/// Clones share the same state.
#[derive(Clone, Default)]
pub struct SimulatedExchange {
    pub instruments: Arc<Mutex<Vec<Instrument>>>,
    pub tickers: Arc<Mutex<HashMap<String, Ticker>>>,
    pub wallet: Arc<Mutex<Option<WalletSnapshot>>>,
    pub positions: Arc<Mutex<Vec<Position>>>,
    pub orders: Arc<Mutex<Vec<Order>>>,
    pub calls: Arc<Mutex<Vec<Call>>>,
    pub reject_orders: Arc<Mutex<bool>>,
    pub fail_wallet: Arc<Mutex<bool>>,
    pub wallet_fetches: Arc<Mutex<usize>>,
}

impl SimulatedExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instruments(instruments: Vec<Instrument>) -> Self {
        let exchange = Self::default();
        *exchange.instruments.lock().unwrap() = instruments;
        exchange
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Exchange for SimulatedExchange {
    fn clone_box(&self) -> Box<dyn Exchange> {
        Box::new(self.clone())
    }

    async fn load_instruments(&self) -> Result<Vec<Instrument>, SendSyncError> {
        Ok(self.instruments.lock().unwrap().clone())
    }

    async fn fetch_tickers(&self) -> Result<HashMap<String, Ticker>, SendSyncError> {
        Ok(self.tickers.lock().unwrap().clone())
    }

    async fn fetch_wallet(&self) -> Result<Option<WalletSnapshot>, SendSyncError> {
        *self.wallet_fetches.lock().unwrap() += 1;
        if *self.fail_wallet.lock().unwrap() {
            return Err("simulated wallet outage".into());
        }
        Ok(self.wallet.lock().unwrap().clone())
    }

    async fn fetch_positions(&self) -> Result<Vec<Position>, SendSyncError> {
        Ok(self.positions.lock().unwrap().clone())
    }

    async fn fetch_open_orders(&self) -> Result<Vec<Order>, SendSyncError> {
        Ok(self.orders.lock().unwrap().clone())
    }

    async fn place_market_order(
        &mut self,
        symbol: &str,
        side: Side,
        qty: f64,
    ) -> Result<String, SendSyncError> {
        info!("Simulated market order: {} {} {}", symbol, side, qty);
        if *self.reject_orders.lock().unwrap() {
            return Err("simulated rejection".into());
        }
        let mut calls = self.calls.lock().unwrap();
        calls.push(Call::MarketOrder {
            symbol: symbol.to_string(),
            side,
            qty,
        });
        Ok(format!("sim-{}", calls.len()))
    }

    async fn set_trading_stop(
        &mut self,
        symbol: &str,
        stop: &TradingStop,
    ) -> Result<(), SendSyncError> {
        self.calls.lock().unwrap().push(Call::TradingStop {
            symbol: symbol.to_string(),
            stop: stop.clone(),
        });
        Ok(())
    }
}
