use crate::ticker::TickerBook;
use crate::types::{PriceType, Symbol};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoinPrice<'a> {
    pub symbol: &'a str,
    pub price: f64,
}

/// Prices of every tracked symbol at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSnapshot {
    pub taken_at: DateTime<Utc>,
    pub prices: BTreeMap<Symbol, f64>,
}

impl PriceSnapshot {
    /// Reads `price_type` for `symbols` from the ticker book; symbols without a
    /// price yet are left out.
    pub fn capture(book: &TickerBook, symbols: &[Symbol], price_type: PriceType) -> Self {
        let prices = symbols
            .iter()
            .filter_map(|s| book.price(s, price_type).map(|p| (s.clone(), p)))
            .collect();
        PriceSnapshot {
            taken_at: Utc::now(),
            prices,
        }
    }

    pub fn get(&self, symbol: &str) -> Option<CoinPrice<'_>> {
        self.prices
            .get_key_value(symbol)
            .map(|(symbol, price)| CoinPrice {
                symbol: symbol.as_str(),
                price: *price,
            })
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

/// Percentage change from `old_price` to `new_price`.
pub fn calculate_price_change(old_price: f64, new_price: f64) -> f64 {
    new_price / old_price * 100.0 - 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// A symbol whose full matrix row moved consistently in one direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Mover {
    pub symbol: Symbol,
    /// Change in percent from the oldest to the newest snapshot.
    pub change: f64,
    pub price: f64,
    pub direction: Direction,
}

/// Rolling window of the last `depth` prices for every symbol.
#[derive(Debug)]
pub struct PriceMatrix {
    depth: usize,
    rows: HashMap<Symbol, VecDeque<f64>>,
}

impl PriceMatrix {
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(2),
            rows: HashMap::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Appends a snapshot. A symbol missing from the snapshot loses its row,
    /// since its remaining prices are no longer consecutive.
    pub fn push(&mut self, snapshot: &PriceSnapshot) {
        let depth = self.depth;
        self.rows.retain(|symbol, _| snapshot.prices.contains_key(symbol));
        for (symbol, price) in &snapshot.prices {
            let row = self
                .rows
                .entry(symbol.clone())
                .or_insert_with(|| VecDeque::with_capacity(depth));
            row.push_back(*price);
            while row.len() > depth {
                row.pop_front();
            }
        }
    }

    pub fn row(&self, symbol: &str) -> Option<&VecDeque<f64>> {
        self.rows.get(symbol)
    }

    pub fn is_full(&self, symbol: &str) -> bool {
        self.rows.get(symbol).map_or(false, |r| r.len() == self.depth)
    }

    pub fn clear(&mut self, symbol: &str) {
        self.rows.remove(symbol);
    }

    /// Step-by-step percentage changes along a symbol's row.
    pub fn changes(&self, symbol: &str) -> Vec<f64> {
        match self.rows.get(symbol) {
            Some(row) => row
                .iter()
                .zip(row.iter().skip(1))
                .map(|(old, new)| calculate_price_change(*old, *new))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Momentum on a full row: every step strictly in the same direction and
    /// the total change beyond `gap` percent.
    pub fn momentum(&self, symbol: &str, gap: f64) -> Option<Mover> {
        if !self.is_full(symbol) {
            return None;
        }
        let row = self.rows.get(symbol)?;
        let (first, last) = (*row.front()?, *row.back()?);
        if first <= 0.0 {
            return None;
        }
        let steps = self.changes(symbol);
        let direction = if steps.iter().all(|c| *c > 0.0) {
            Direction::Up
        } else if steps.iter().all(|c| *c < 0.0) {
            Direction::Down
        } else {
            return None;
        };
        let change = calculate_price_change(first, last);
        if change.abs() <= gap {
            return None;
        }
        Some(Mover {
            symbol: symbol.to_string(),
            change,
            price: last,
            direction,
        })
    }

    /// All symbols with momentum, strongest move first.
    pub fn movers(&self, gap: f64) -> Vec<Mover> {
        let mut movers: Vec<Mover> = self
            .rows
            .keys()
            .filter_map(|symbol| self.momentum(symbol, gap))
            .collect();
        movers.sort_by(|a, b| {
            b.change
                .abs()
                .partial_cmp(&a.change.abs())
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        movers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn snapshot(prices: &[(&str, f64)]) -> PriceSnapshot {
        PriceSnapshot {
            taken_at: Utc::now(),
            prices: prices.iter().map(|(s, p)| (s.to_string(), *p)).collect(),
        }
    }

    fn fill(matrix: &mut PriceMatrix, rows: &[&[(&str, f64)]]) {
        for row in rows {
            matrix.push(&snapshot(row));
        }
    }

    #[test]
    fn test_calculate_price_change() {
        assert!((calculate_price_change(100.0, 102.0) - 2.0).abs() < EPSILON);
        assert!((calculate_price_change(200.0, 190.0) + 5.0).abs() < EPSILON);
    }

    #[test]
    fn test_row_is_bounded_by_depth() {
        let mut matrix = PriceMatrix::new(3);
        for price in [1.0, 2.0, 3.0, 4.0] {
            matrix.push(&snapshot(&[("BTCUSDT", price)]));
        }
        let row: Vec<f64> = matrix.row("BTCUSDT").unwrap().iter().copied().collect();
        assert_eq!(row, vec![2.0, 3.0, 4.0]);
        assert!(matrix.is_full("BTCUSDT"));
    }

    #[test]
    fn test_missing_symbol_resets_row() {
        let mut matrix = PriceMatrix::new(3);
        fill(
            &mut matrix,
            &[
                &[("BTCUSDT", 1.0), ("ETHUSDT", 1.0)],
                &[("BTCUSDT", 2.0)],
                &[("BTCUSDT", 3.0), ("ETHUSDT", 2.0)],
            ],
        );
        assert!(matrix.is_full("BTCUSDT"));
        assert_eq!(matrix.row("ETHUSDT").unwrap().len(), 1);
    }

    #[test]
    fn test_momentum_requires_full_consistent_row() {
        let mut matrix = PriceMatrix::new(4);
        fill(
            &mut matrix,
            &[
                &[("UPUSDT", 100.0), ("CHOPUSDT", 100.0), ("DNUSDT", 100.0)],
                &[("UPUSDT", 101.0), ("CHOPUSDT", 103.0), ("DNUSDT", 99.0)],
                &[("UPUSDT", 102.0), ("CHOPUSDT", 102.0), ("DNUSDT", 98.0)],
            ],
        );
        assert!(matrix.momentum("UPUSDT", 1.0).is_none());

        matrix.push(&snapshot(&[("UPUSDT", 103.0), ("CHOPUSDT", 104.0), ("DNUSDT", 96.0)]));
        let up = matrix.momentum("UPUSDT", 1.0).unwrap();
        assert_eq!(up.direction, Direction::Up);
        assert!((up.change - 3.0).abs() < EPSILON);
        assert_eq!(up.price, 103.0);

        assert!(matrix.momentum("CHOPUSDT", 1.0).is_none());

        let down = matrix.momentum("DNUSDT", 1.0).unwrap();
        assert_eq!(down.direction, Direction::Down);
        assert!((down.change + 4.0).abs() < EPSILON);
    }

    #[test]
    fn test_flat_step_breaks_momentum() {
        let mut matrix = PriceMatrix::new(3);
        fill(
            &mut matrix,
            &[&[("XUSDT", 100.0)], &[("XUSDT", 100.0)], &[("XUSDT", 110.0)]],
        );
        assert!(matrix.momentum("XUSDT", 0.0).is_none());
    }

    #[test]
    fn test_movers_filter_by_gap_and_sort_by_magnitude() {
        let mut matrix = PriceMatrix::new(2);
        fill(
            &mut matrix,
            &[
                &[("AUSDT", 100.0), ("BUSDT", 100.0), ("CUSDT", 100.0)],
                &[("AUSDT", 101.5), ("BUSDT", 97.0), ("CUSDT", 100.5)],
            ],
        );
        let movers = matrix.movers(1.0);
        let symbols: Vec<&str> = movers.iter().map(|m| m.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BUSDT", "AUSDT"]);

        matrix.clear("BUSDT");
        assert_eq!(matrix.movers(1.0).len(), 1);
    }

    #[test]
    fn test_capture_skips_symbols_without_price() {
        let mut book = TickerBook::new();
        book.update(crate::types::Ticker {
            symbol: "BTCUSDT".into(),
            mark_price: Some(60000.0),
            ..Default::default()
        });
        let symbols = vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()];
        let snap = PriceSnapshot::capture(&book, &symbols, PriceType::MarkPrice);
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.get("BTCUSDT").unwrap().price, 60000.0);
        assert!(PriceSnapshot::capture(&book, &symbols, PriceType::LastPrice).is_empty());
    }
}
