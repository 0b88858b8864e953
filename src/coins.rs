use crate::exchange::{Exchange, SendSyncError};
use crate::types::{Instrument, LiveConfig, Symbol};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;

/// Tradeable USDT linear perpetuals, keyed by symbol.
#[derive(Debug, Default, Clone)]
pub struct Coins {
    instruments: HashMap<Symbol, Instrument>,
}

pub fn is_tradeable(instrument: &Instrument) -> bool {
    instrument.status == "Trading"
        && instrument.contract_type == "LinearPerpetual"
        && instrument.quote_coin == "USDT"
}

impl Coins {
    pub fn from_instruments(instruments: Vec<Instrument>, live: &LiveConfig) -> Self {
        let instruments = instruments
            .into_iter()
            .filter(|i| is_tradeable(i) && live.is_symbol_allowed(&i.symbol))
            .map(|i| (i.symbol.clone(), i))
            .collect();
        Coins { instruments }
    }

    pub async fn fetch(exchange: &dyn Exchange, live: &LiveConfig) -> Result<Self, SendSyncError> {
        info!("Fetching coin list...");
        let coins = Coins::from_instruments(exchange.load_instruments().await?, live);
        info!("Fetched {} coins", coins.len());
        Ok(coins)
    }

    pub fn coins(&self) -> &HashMap<Symbol, Instrument> {
        &self.instruments
    }

    /// Symbols in sorted order.
    pub fn symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self.instruments.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn coin(&self, symbol: &str) -> Option<&Instrument> {
        self.instruments.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// Writes the symbol list as a JSON array.
    pub fn write_symbols<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let data = serde_json::to_string_pretty(&self.symbols())?;
        fs::write(path.as_ref(), data)?;
        info!("Wrote {} symbols to {}", self.len(), path.as_ref().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::simulated::SimulatedExchange;

    fn instrument(symbol: &str, contract_type: &str, quote: &str, status: &str) -> Instrument {
        Instrument {
            symbol: symbol.into(),
            contract_type: contract_type.into(),
            status: status.into(),
            quote_coin: quote.into(),
            qty_step: 0.01,
            min_order_qty: 0.01,
            tick_size: 0.01,
            max_leverage: 50.0,
        }
    }

    fn sample() -> Vec<Instrument> {
        vec![
            instrument("BTCUSDT", "LinearPerpetual", "USDT", "Trading"),
            instrument("ETHUSDT", "LinearPerpetual", "USDT", "Trading"),
            instrument("BTCPERP", "LinearPerpetual", "USDC", "Trading"),
            instrument("BTCUSDT-27DEC24", "LinearFutures", "USDT", "Trading"),
            instrument("OLDUSDT", "LinearPerpetual", "USDT", "Closed"),
        ]
    }

    #[test]
    fn test_filters_to_usdt_perpetuals() {
        let coins = Coins::from_instruments(sample(), &LiveConfig::default());
        assert_eq!(coins.symbols(), vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]);
        assert!(coins.coin("BTCPERP").is_none());
        assert_eq!(coins.coin("ETHUSDT").unwrap().qty_step, 0.01);
    }

    #[test]
    fn test_respects_ignored_coins() {
        let live = LiveConfig {
            ignored_coins: vec!["BTCUSDT".into()],
            ..Default::default()
        };
        let coins = Coins::from_instruments(sample(), &live);
        assert_eq!(coins.symbols(), vec!["ETHUSDT".to_string()]);
    }

    #[tokio::test]
    async fn test_fetch_from_exchange() {
        let exchange = SimulatedExchange::with_instruments(sample());
        let coins = Coins::fetch(&exchange, &LiveConfig::default()).await.unwrap();
        assert_eq!(coins.len(), 2);
    }

    #[test]
    fn test_write_symbols() {
        let coins = Coins::from_instruments(sample(), &LiveConfig::default());
        let path = std::env::temp_dir()
            .join(format!("perpbot-symbols-{}.json", std::process::id()));
        coins.write_symbols(&path).unwrap();
        let written: Vec<String> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, coins.symbols());
        fs::remove_file(&path).unwrap();
    }
}
