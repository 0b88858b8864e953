use crate::types::{PriceType, Symbol, Ticker};
use std::collections::HashMap;

/// Latest known ticker per symbol, built by merging snapshot and delta frames.
#[derive(Debug, Default)]
pub struct TickerBook {
    tickers: HashMap<Symbol, Ticker>,
}

impl TickerBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, ticker: Ticker) {
        match self.tickers.get_mut(&ticker.symbol) {
            Some(existing) => existing.merge(ticker),
            None => {
                self.tickers.insert(ticker.symbol.clone(), ticker);
            }
        }
    }

    /// Seeds the book from a REST poll without discarding fields only the stream carries.
    pub fn seed(&mut self, tickers: HashMap<Symbol, Ticker>) {
        for (_, ticker) in tickers {
            self.update(ticker);
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&Ticker> {
        self.tickers.get(symbol)
    }

    pub fn price(&self, symbol: &str, price_type: PriceType) -> Option<f64> {
        self.tickers.get(symbol).and_then(|t| t.price(price_type))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &Ticker)> {
        self.tickers.iter()
    }
}
