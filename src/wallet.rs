use crate::exchange::stream::StreamEvent;
use crate::exchange::Exchange;
use crate::types::WalletSnapshot;
use tokio::sync::mpsc;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct WalletMirror {
    wallet: WalletSnapshot,
}

impl WalletMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, wallet: WalletSnapshot) {
        self.wallet = wallet;
    }

    pub fn get(&self) -> &WalletSnapshot {
        &self.wallet
    }

    /// Balance that can back new positions.
    pub fn available_balance(&self) -> f64 {
        self.wallet
            .total_available_balance
            .or(self.wallet.total_wallet_balance)
            .unwrap_or(0.0)
    }
}

/// Polls the wallet every `interval` and forwards snapshots as stream events.
/// Failed polls are logged and retried on the next tick.
pub async fn poll_wallet(
    exchange: Box<dyn Exchange>,
    interval: Duration,
    tx: mpsc::Sender<StreamEvent>,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match exchange.fetch_wallet().await {
            Ok(Some(wallet)) => {
                if tx.send(StreamEvent::Wallet(wallet)).await.is_err() {
                    debug!("Wallet receiver dropped, stopping poller");
                    return;
                }
            }
            Ok(None) => warn!("Wallet response carried no account"),
            Err(e) => warn!("Failed to fetch wallet: {}", e),
        }
    }
}
