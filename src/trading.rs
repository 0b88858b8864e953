use crate::calc::{calculate_markup_price, round_};
use crate::exchange::{Exchange, SendSyncError};
use crate::types::{Instrument, LiveConfig, Position, Side, TradingStop};
use tracing::{error, info};

pub fn trade_url(symbol: &str) -> String {
    format!("https://www.bybit.com/trade/usdt/{}", symbol)
}

/// Submits entries and protective stops, logging every outcome.
pub struct Trader {
    exchange: Box<dyn Exchange>,
    config: LiveConfig,
}

impl Trader {
    pub fn new(exchange: Box<dyn Exchange>, config: LiveConfig) -> Self {
        Self { exchange, config }
    }

    /// Places a market order. Returns the order id, or `None` in dry-run mode.
    pub async fn create_order(
        &mut self,
        symbol: &str,
        side: Side,
        amount: f64,
        price: f64,
    ) -> Result<Option<String>, SendSyncError> {
        if self.config.dry_run {
            info!(
                symbol,
                %side,
                amount,
                price,
                url = %trade_url(symbol),
                "Dry run: order not sent"
            );
            return Ok(None);
        }
        match self.exchange.place_market_order(symbol, side, amount).await {
            Ok(order_id) => {
                info!(
                    symbol,
                    %side,
                    amount,
                    order_id = %order_id,
                    url = %trade_url(symbol),
                    "Order created"
                );
                Ok(Some(order_id))
            }
            Err(e) => {
                error!(
                    symbol,
                    %side,
                    amount,
                    price,
                    url = %trade_url(symbol),
                    "Failed to create order: {}",
                    e
                );
                Err(e)
            }
        }
    }

    /// Stop levels for a freshly opened position.
    ///
    /// The trailing distance is a percentage of the entry price snapped to the
    /// tick size; take-profit and stop-loss are derived from leveraged PnL
    /// targets when configured.
    pub fn stop_for(
        &self,
        position: &Position,
        instrument: Option<&Instrument>,
    ) -> Option<TradingStop> {
        let side = position.side?.position_side();
        let entry = position.entry();
        if entry <= 0.0 {
            return None;
        }
        let tick = instrument.map(|i| i.tick_size).filter(|t| *t > 0.0);
        let snap = |price: f64| match tick {
            Some(tick) => round_(price, tick),
            None => price,
        };
        let leverage = if position.leverage > 0.0 {
            position.leverage
        } else {
            self.config.leverage
        };

        let trailing_stop = Some(self.config.trailing_stop_pct)
            .filter(|pct| *pct > 0.0)
            .map(|pct| snap(entry * pct / 100.0))
            .filter(|distance| *distance > 0.0);
        let take_profit = self
            .config
            .take_profit_pnl_pct
            .map(|pct| snap(calculate_markup_price(entry, leverage, side, pct)));
        let stop_loss = self
            .config
            .stop_loss_pnl_pct
            .map(|pct| snap(calculate_markup_price(entry, leverage, side, -pct)));

        let stop = TradingStop {
            trailing_stop,
            take_profit,
            stop_loss,
        };
        if stop == TradingStop::default() {
            None
        } else {
            Some(stop)
        }
    }

    /// Sets the trading stop for `position`. Returns false when there is nothing to set.
    pub async fn protect(
        &mut self,
        position: &Position,
        instrument: Option<&Instrument>,
    ) -> Result<bool, SendSyncError> {
        let symbol = position.symbol.as_str();
        let stop = match self.stop_for(position, instrument) {
            Some(stop) => stop,
            None => return Ok(false),
        };
        if self.config.dry_run {
            info!(symbol, ?stop, "Dry run: trading stop not sent");
            return Ok(true);
        }
        match self.exchange.set_trading_stop(symbol, &stop).await {
            Ok(()) => {
                info!(symbol, ?stop, url = %trade_url(symbol), "Trading stop set");
                Ok(true)
            }
            Err(e) => {
                error!(
                    symbol,
                    entry_price = position.entry(),
                    ?stop,
                    url = %trade_url(symbol),
                    "Failed to set trading stop: {}",
                    e
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::simulated::{Call, SimulatedExchange};

    fn position(side: Side, entry: f64, leverage: f64) -> Position {
        Position {
            symbol: "ETHUSDT".into(),
            side: Some(side),
            size: 1.0,
            avg_price: entry,
            leverage,
            ..Default::default()
        }
    }

    fn instrument() -> Instrument {
        Instrument {
            symbol: "ETHUSDT".into(),
            contract_type: "LinearPerpetual".into(),
            status: "Trading".into(),
            quote_coin: "USDT".into(),
            qty_step: 0.01,
            min_order_qty: 0.01,
            tick_size: 0.01,
            max_leverage: 100.0,
        }
    }

    #[test]
    fn test_stop_for_trailing_only() {
        let trader = Trader::new(Box::new(SimulatedExchange::new()), LiveConfig::default());
        let stop = trader
            .stop_for(&position(Side::Buy, 2500.0, 10.0), Some(&instrument()))
            .unwrap();
        assert_eq!(stop.trailing_stop, Some(25.0));
        assert_eq!(stop.take_profit, None);
        assert_eq!(stop.stop_loss, None);
    }

    #[test]
    fn test_stop_for_short_with_tp_sl() {
        let config = LiveConfig {
            trailing_stop_pct: 0.0,
            take_profit_pnl_pct: Some(50.0),
            stop_loss_pnl_pct: Some(20.0),
            ..Default::default()
        };
        let trader = Trader::new(Box::new(SimulatedExchange::new()), config);
        let stop = trader
            .stop_for(&position(Side::Sell, 2000.0, 10.0), Some(&instrument()))
            .unwrap();
        // 50% at 10x is a 5% move in the position's favor.
        assert_eq!(stop.take_profit, Some(1900.0));
        assert_eq!(stop.stop_loss, Some(2040.0));
        assert_eq!(stop.trailing_stop, None);
    }

    #[test]
    fn test_stop_for_nothing_configured() {
        let config = LiveConfig {
            trailing_stop_pct: 0.0,
            ..Default::default()
        };
        let trader = Trader::new(Box::new(SimulatedExchange::new()), config);
        assert!(trader.stop_for(&position(Side::Buy, 100.0, 5.0), None).is_none());
        let closed = Position {
            symbol: "ETHUSDT".into(),
            ..Default::default()
        };
        assert!(trader.stop_for(&closed, None).is_none());
    }

    #[tokio::test]
    async fn test_create_order_and_protect_hit_exchange() {
        let exchange = SimulatedExchange::new();
        let mut trader = Trader::new(exchange.clone_box(), LiveConfig::default());
        let id = trader.create_order("ETHUSDT", Side::Buy, 0.2, 2500.0).await.unwrap();
        assert_eq!(id, Some("sim-1".to_string()));
        assert!(trader
            .protect(&position(Side::Buy, 2500.0, 10.0), Some(&instrument()))
            .await
            .unwrap());
        let calls = exchange.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0],
            Call::MarketOrder {
                symbol: "ETHUSDT".into(),
                side: Side::Buy,
                qty: 0.2
            }
        );
        assert!(matches!(&calls[1], Call::TradingStop { symbol, .. } if symbol == "ETHUSDT"));
    }

    #[tokio::test]
    async fn test_dry_run_sends_nothing() {
        let exchange = SimulatedExchange::new();
        let config = LiveConfig {
            dry_run: true,
            ..Default::default()
        };
        let mut trader = Trader::new(exchange.clone_box(), config);
        assert_eq!(trader.create_order("ETHUSDT", Side::Sell, 1.0, 10.0).await.unwrap(), None);
        assert!(trader.protect(&position(Side::Sell, 10.0, 10.0), None).await.unwrap());
        assert!(exchange.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_order_propagates() {
        let exchange = SimulatedExchange::new();
        *exchange.reject_orders.lock().unwrap() = true;
        let mut trader = Trader::new(exchange.clone_box(), LiveConfig::default());
        assert!(trader.create_order("ETHUSDT", Side::Buy, 1.0, 10.0).await.is_err());
    }
}
