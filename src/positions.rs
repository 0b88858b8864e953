use crate::types::{Position, Symbol};
use std::collections::HashMap;

/// Local mirror of open positions, one per symbol (one-way mode).
#[derive(Debug, Default)]
pub struct PositionMirror {
    positions: HashMap<Symbol, Position>,
}

impl PositionMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a pushed batch. An update without a side closes the position.
    pub fn apply(&mut self, batch: Vec<Position>) -> Vec<Position> {
        for position in &batch {
            if position.is_open() {
                self.positions.insert(position.symbol.clone(), position.clone());
            } else {
                self.positions.remove(&position.symbol);
            }
        }
        batch
    }

    pub fn replace_all(&mut self, positions: Vec<Position>) {
        self.positions = positions
            .into_iter()
            .filter(|p| p.is_open())
            .map(|p| (p.symbol.clone(), p))
            .collect();
    }

    pub fn get(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn count(&self) -> usize {
        self.positions.len()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.positions.keys()
    }
}
