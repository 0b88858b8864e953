use super::bybit::sign;
use super::SendSyncError;
use crate::config::UserConfig;
use crate::types::{Order, Position, Symbol, Ticker, WalletSnapshot};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

pub const PUBLIC_WS_URL: &str = "wss://stream.bybit.com/v5/public/linear";
pub const PRIVATE_WS_URL: &str = "wss://stream.bybit.com/v5/private";

const PING_INTERVAL: Duration = Duration::from_secs(20);
const MIN_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);
const AUTH_EXPIRES_MS: i64 = 10_000;
// The public linear endpoint caps the number of args per subscribe request.
const SUBSCRIBE_CHUNK: usize = 10;

const PRIVATE_TOPICS: [&str; 3] = ["order.linear", "position.linear", "wallet"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Order,
    Position,
    Wallet,
    Tickers,
}

impl Topic {
    /// Maps `order.linear`, `tickers.BTCUSDT`, `wallet`... to their topic.
    pub fn from_topic(topic: &str) -> Option<Topic> {
        match topic.split('.').next()? {
            "order" => Some(Topic::Order),
            "position" => Some(Topic::Position),
            "wallet" => Some(Topic::Wallet),
            "tickers" => Some(Topic::Tickers),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Orders(Vec<Order>),
    Positions(Vec<Position>),
    Wallet(WalletSnapshot),
    Ticker(Ticker),
}

#[derive(Deserialize, Debug)]
struct Envelope {
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    op: Option<String>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    ret_msg: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

fn decode_list<T: DeserializeOwned>(topic: &str, data: Value) -> Vec<T> {
    let items = match data {
        Value::Array(items) => items,
        other => vec![other],
    };
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("Skipping malformed {} entry: {}", topic, e);
                None
            }
        })
        .collect()
}

/// Decodes one text frame.
///
/// Returns `Ok(None)` for control frames (pong, subscribe/auth acks) and for
/// payloads that cannot be decoded, and an error when the exchange rejects
/// an `op` such as `auth` or `subscribe`.
pub fn parse_message(text: &str) -> Result<Option<StreamEvent>, SendSyncError> {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Unreadable stream frame: {}", e);
            return Ok(None);
        }
    };

    if let Some(op) = &envelope.op {
        if envelope.success == Some(false) {
            return Err(format!(
                "{} rejected: {}",
                op,
                envelope.ret_msg.unwrap_or_default()
            )
            .into());
        }
        debug!("Control frame: {}", op);
        return Ok(None);
    }

    let (topic, data) = match (envelope.topic, envelope.data) {
        (Some(topic), Some(data)) => (topic, data),
        _ => return Ok(None),
    };

    let event = match Topic::from_topic(&topic) {
        Some(Topic::Order) => Some(StreamEvent::Orders(decode_list(&topic, data))),
        Some(Topic::Position) => Some(StreamEvent::Positions(decode_list(&topic, data))),
        Some(Topic::Wallet) => decode_list::<WalletSnapshot>(&topic, data)
            .into_iter()
            .next()
            .map(StreamEvent::Wallet),
        Some(Topic::Tickers) => match serde_json::from_value::<Ticker>(data) {
            Ok(ticker) => Some(StreamEvent::Ticker(ticker)),
            Err(e) => {
                warn!("Skipping malformed ticker on {}: {}", topic, e);
                None
            }
        },
        None => {
            debug!("Ignoring topic {}", topic);
            None
        }
    };
    Ok(event)
}

pub fn subscribe_message(topics: &[String]) -> String {
    json!({ "op": "subscribe", "args": topics }).to_string()
}

pub fn auth_message(
    api_key: &str,
    api_secret: &str,
    expires: i64,
) -> Result<String, SendSyncError> {
    let signature = sign(api_secret, &format!("GET/realtime{}", expires))?;
    Ok(json!({ "op": "auth", "args": [api_key, expires, signature] }).to_string())
}

/// Reconnect delay doubling from 1 s up to 60 s.
#[derive(Debug)]
struct Backoff {
    next: Duration,
}

impl Backoff {
    fn new() -> Self {
        Backoff {
            next: MIN_RETRY_DELAY,
        }
    }

    fn reset(&mut self) {
        self.next = MIN_RETRY_DELAY;
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(MAX_RETRY_DELAY);
        delay
    }
}

enum SessionEnd {
    Disconnected,
    ReceiverClosed,
}

async fn session(
    name: &str,
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    credentials: Option<&UserConfig>,
    topics: &[String],
    tx: &mpsc::Sender<StreamEvent>,
) -> Result<SessionEnd, SendSyncError> {
    let (mut write, mut read) = ws_stream.split();

    if let Some(user) = credentials {
        let expires = Utc::now().timestamp_millis() + AUTH_EXPIRES_MS;
        write
            .send(Message::Text(auth_message(&user.key, &user.secret, expires)?))
            .await?;
    }
    for chunk in topics.chunks(SUBSCRIBE_CHUNK) {
        write.send(Message::Text(subscribe_message(chunk))).await?;
    }

    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.tick().await;
    loop {
        tokio::select! {
            _ = ping.tick() => {
                write.send(Message::Text(json!({ "op": "ping" }).to_string())).await?;
            }
            message = read.next() => {
                let message = match message {
                    Some(message) => message?,
                    None => return Ok(SessionEnd::Disconnected),
                };
                match message {
                    Message::Text(text) => {
                        if let Some(event) = parse_message(&text)? {
                            if tx.send(event).await.is_err() {
                                return Ok(SessionEnd::ReceiverClosed);
                            }
                        }
                    }
                    Message::Ping(data) => write.send(Message::Pong(data)).await?,
                    Message::Close(frame) => {
                        warn!("{} stream closed by server: {:?}", name, frame);
                        return Ok(SessionEnd::Disconnected);
                    }
                    _ => {}
                }
            }
        }
    }
}

async fn run_stream(
    name: &str,
    url: &str,
    credentials: Option<UserConfig>,
    topics: Vec<String>,
    tx: mpsc::Sender<StreamEvent>,
) {
    let mut backoff = Backoff::new();
    loop {
        match connect_async(url).await {
            Ok((ws_stream, _)) => {
                info!("{} stream connected ({})", name, url);
                backoff.reset();
                match session(name, ws_stream, credentials.as_ref(), &topics, &tx).await {
                    Ok(SessionEnd::ReceiverClosed) => {
                        info!("{} stream receiver dropped, stopping", name);
                        return;
                    }
                    Ok(SessionEnd::Disconnected) => warn!("{} stream disconnected", name),
                    Err(e) => warn!("{} stream error: {}", name, e),
                }
            }
            Err(e) => warn!("{} stream failed to connect: {}", name, e),
        }
        if tx.is_closed() {
            return;
        }
        let delay = backoff.next_delay();
        info!("{} stream reconnecting in {}s", name, delay.as_secs());
        sleep(delay).await;
    }
}

/// Streams ticker updates for `symbols` until the receiver is dropped.
pub async fn run_ticker_stream(symbols: Vec<Symbol>, tx: mpsc::Sender<StreamEvent>) {
    let topics = symbols.iter().map(|s| format!("tickers.{}", s)).collect();
    run_stream("tickers", PUBLIC_WS_URL, None, topics, tx).await
}

/// Streams order, position and wallet updates for the account.
pub async fn run_private_stream(user: UserConfig, tx: mpsc::Sender<StreamEvent>) {
    let topics = PRIVATE_TOPICS.iter().map(|t| t.to_string()).collect();
    run_stream("private", PRIVATE_WS_URL, Some(user), topics, tx).await
}
