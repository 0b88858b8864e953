use crate::calc::{get_side, qty_for_instrument};
use crate::coins::Coins;
use crate::exchange::stream::StreamEvent;
use crate::exchange::{Exchange, SendSyncError};
use crate::orders::OrderMirror;
use crate::positions::PositionMirror;
use crate::prices::{Mover, PriceMatrix, PriceSnapshot};
use crate::ticker::TickerBook;
use crate::trading::Trader;
use crate::types::{BotConfig, LiveConfig, Order, OrderStatus, Position, Symbol};
use crate::wallet::WalletMirror;
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Live trading bot: keeps the local mirrors in sync with exchange updates,
/// samples prices into the matrix and enters on momentum.
pub struct Bot {
    pub config: BotConfig,
    exchange: Box<dyn Exchange>,
    trader: Trader,
    coins: Coins,
    symbols: Vec<Symbol>,
    orders: OrderMirror,
    positions: PositionMirror,
    wallet: WalletMirror,
    tickers: TickerBook,
    matrix: PriceMatrix,
    /// Entry order id per symbol whose position has not shown up yet.
    pending: HashMap<Symbol, String>,
    /// Symbols whose current position already carries a trading stop.
    protected: HashSet<Symbol>,
}

/// Order outcomes after which a submitted entry will not turn into a position.
fn is_failed_entry(status: OrderStatus) -> bool {
    matches!(
        status,
        OrderStatus::Rejected
            | OrderStatus::Cancelled
            | OrderStatus::Deactivated
            | OrderStatus::PartiallyFilledCanceled
    )
}

impl Bot {
    pub fn new(config: BotConfig, exchange: Box<dyn Exchange>) -> Self {
        let trader = Trader::new(exchange.clone_box(), config.live.clone());
        let matrix = PriceMatrix::new(config.live.matrix_depth);
        Bot {
            config,
            exchange,
            trader,
            coins: Coins::default(),
            symbols: Vec::new(),
            orders: OrderMirror::new(),
            positions: PositionMirror::new(),
            wallet: WalletMirror::new(),
            tickers: TickerBook::new(),
            matrix,
            pending: HashMap::new(),
            protected: HashSet::new(),
        }
    }

    fn live(&self) -> &LiveConfig {
        &self.config.live
    }

    /// Loads the tradeable coins and pulls the initial account state.
    pub async fn init(&mut self) -> Result<(), SendSyncError> {
        info!("Starting bot...");
        self.coins = Coins::fetch(self.exchange.as_ref(), &self.config.live).await?;
        self.symbols = self.coins.symbols();
        if self.symbols.is_empty() {
            return Err("no tradeable coins after applying approved/ignored lists".into());
        }
        self.reconcile().await?;
        self.tickers.seed(self.exchange.fetch_tickers().await?);
        info!(
            "Bot initialized: {} coins, {} positions, {} open orders, available balance {:.2}",
            self.symbols.len(),
            self.positions.count(),
            self.orders.len(),
            self.wallet.available_balance()
        );
        Ok(())
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Runs until the event channel closes.
    pub async fn run(&mut self, mut rx: mpsc::Receiver<StreamEvent>) -> Result<(), SendSyncError> {
        info!("Bot is running...");
        let mut snapshot_timer =
            time::interval(Duration::from_millis(self.live().snapshot_interval_ms));
        snapshot_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut reconcile_timer =
            time::interval(Duration::from_secs(self.live().reconcile_interval_secs));
        reconcile_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // init() has just reconciled.
        reconcile_timer.tick().await;

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        warn!("Event channel closed, stopping bot");
                        return Ok(());
                    }
                },
                _ = snapshot_timer.tick() => {
                    self.on_snapshot().await;
                }
                _ = reconcile_timer.tick() => {
                    if let Err(e) = self.reconcile().await {
                        warn!("Failed to reconcile account state: {}", e);
                    }
                }
            }
        }
    }

    pub async fn handle_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Orders(batch) => {
                let batch = self.orders.apply(batch);
                self.after_orders(&batch);
            }
            StreamEvent::Positions(batch) => {
                let batch = self.positions.apply(batch);
                for position in &batch {
                    self.after_position(position).await;
                }
            }
            StreamEvent::Wallet(wallet) => self.wallet.set(wallet),
            StreamEvent::Ticker(ticker) => self.tickers.update(ticker),
        }
    }

    fn after_orders(&mut self, batch: &[Order]) {
        for order in batch {
            let is_entry = self.pending.get(&order.symbol) == Some(&order.order_id);
            if is_entry && is_failed_entry(order.order_status) {
                self.pending.remove(&order.symbol);
                warn!(
                    "[{}] Entry order {} ended as {:?}",
                    order.symbol, order.order_id, order.order_status
                );
            }
        }
    }

    async fn after_position(&mut self, position: &Position) {
        let symbol = &position.symbol;
        if position.is_open() {
            if self.pending.remove(symbol).is_some() {
                info!(
                    "[{}] Position opened: size {} at {}",
                    symbol,
                    position.size,
                    position.entry()
                );
            }
            self.ensure_protected(position).await;
        } else if self.protected.remove(symbol) {
            info!("[{}] Position closed", symbol);
        }
    }

    /// Sets a trading stop on a position that does not have one yet.
    /// A failed attempt is retried on the next update or reconcile.
    async fn ensure_protected(&mut self, position: &Position) {
        if self.protected.contains(&position.symbol) {
            return;
        }
        if position.trailing_stop > 0.0 {
            self.protected.insert(position.symbol.clone());
            return;
        }
        let instrument = self.coins.coin(&position.symbol);
        if self.trader.protect(position, instrument).await.is_ok() {
            self.protected.insert(position.symbol.clone());
        }
    }

    /// Re-polls wallet, positions and open orders and replaces the mirrors.
    pub async fn reconcile(&mut self) -> Result<(), SendSyncError> {
        debug!("Reconciling account state");
        if let Some(wallet) = self.exchange.fetch_wallet().await? {
            self.wallet.set(wallet);
        }

        let positions = self.exchange.fetch_positions().await?;
        self.positions.replace_all(positions.clone());
        self.orders.replace_all(self.exchange.fetch_open_orders().await?);

        // An entry stays pending only while its order is still live and no
        // position has shown up for the symbol.
        let (mirror, orders) = (&self.positions, &self.orders);
        self.pending
            .retain(|s, order_id| !mirror.has_position(s) && orders.get(order_id).is_some());
        self.protected.retain(|s| mirror.has_position(s));
        for position in positions.iter().filter(|p| p.is_open()) {
            self.ensure_protected(position).await;
        }
        Ok(())
    }

    fn can_enter(&self, symbol: &str) -> bool {
        !self.orders.has_order(symbol)
            && !self.positions.has_position(symbol)
            && !self.pending.contains_key(symbol)
    }

    fn open_slots(&self) -> usize {
        self.live()
            .max_positions
            .saturating_sub(self.positions.count() + self.pending.len())
    }

    /// Samples prices into the matrix and enters on every qualifying mover.
    /// Returns the symbols an entry was submitted for.
    pub async fn on_snapshot(&mut self) -> Vec<Symbol> {
        let snapshot = PriceSnapshot::capture(&self.tickers, &self.symbols, self.live().price_type);
        self.matrix.push(&snapshot);
        let movers = self.matrix.movers(self.live().change_gap_pct);
        debug!(
            "Snapshot of {} prices, {} movers",
            snapshot.len(),
            movers.len()
        );

        let mut entered = Vec::new();
        for mover in movers {
            if self.open_slots() == 0 {
                debug!("Position limit reached, skipping remaining movers");
                break;
            }
            if !self.can_enter(&mover.symbol) {
                debug!("[{}] Already engaged, skipping", mover.symbol);
                continue;
            }
            if self.enter(&mover).await {
                entered.push(mover.symbol);
            }
        }
        entered
    }

    async fn enter(&mut self, mover: &Mover) -> bool {
        let live = &self.config.live;
        let side = get_side(mover.change, live.strategy);
        let margin = self.wallet.available_balance() * live.entry_balance_share;
        let qty = match qty_for_instrument(
            margin,
            mover.price,
            live.leverage,
            self.coins.coin(&mover.symbol),
        ) {
            Some(qty) => qty,
            None => {
                debug!(
                    "[{}] Margin {:.2} too small for an order at {}",
                    mover.symbol, margin, mover.price
                );
                return false;
            }
        };
        info!(
            "[{}] Moved {} {:.2}% to {}, entering {} {}",
            mover.symbol, mover.direction, mover.change, mover.price, side, qty
        );

        self.matrix.clear(&mover.symbol);
        match self
            .trader
            .create_order(&mover.symbol, side, qty, mover.price)
            .await
        {
            Ok(Some(order_id)) => {
                self.pending.insert(mover.symbol.clone(), order_id);
                true
            }
            // Dry run: no position will follow.
            Ok(None) => true,
            Err(_) => false,
        }
    }
}

/// Logs a price snapshot of `symbols` every `interval` from ticker events
/// on `rx`, along with any momentum the matrix picks up. Returns when the
/// channel closes.
pub async fn watch_prices(
    symbols: Vec<Symbol>,
    live: LiveConfig,
    interval: Duration,
    mut rx: mpsc::Receiver<StreamEvent>,
) -> Result<(), SendSyncError> {
    if interval.is_zero() {
        return Err("snapshot interval must be positive".into());
    }
    let mut book = TickerBook::new();
    let mut matrix = PriceMatrix::new(live.matrix_depth);
    let mut timer = time::interval(interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(StreamEvent::Ticker(ticker)) => book.update(ticker),
                Some(_) => {}
                None => {
                    info!("Ticker stream closed");
                    return Ok(());
                }
            },
            _ = timer.tick() => {
                let snapshot = PriceSnapshot::capture(&book, &symbols, live.price_type);
                info!(
                    "Snapshot at {}: {}/{} prices",
                    snapshot.taken_at.format("%H:%M:%S"),
                    snapshot.len(),
                    symbols.len()
                );
                for (symbol, price) in &snapshot.prices {
                    debug!("[{}] {}", symbol, price);
                }
                matrix.push(&snapshot);
                for mover in matrix.movers(live.change_gap_pct) {
                    info!(
                        "[{}] {} {:.2}% to {}",
                        mover.symbol, mover.direction, mover.change, mover.price
                    );
                }
            }
        }
    }
}
