use super::{Exchange, SendSyncError};
use crate::config::UserConfig;
use crate::types::{Instrument, Order, Position, Side, Ticker, TradingStop, WalletSnapshot};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

pub const BYBIT_API_URL: &str = "https://api.bybit.com";
const RECV_WINDOW: &str = "5000";
const CATEGORY: &str = "linear";
const SETTLE_COIN: &str = "USDT";

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct BybitResponse<T> {
    ret_code: i32,
    ret_msg: String,
    result: T,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct BybitPage<T> {
    list: Vec<T>,
    #[serde(default)]
    next_page_cursor: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct BybitInstrument {
    symbol: String,
    status: String,
    #[serde(default)]
    contract_type: String,
    #[serde(default)]
    quote_coin: String,
    lot_size_filter: LotSizeFilter,
    price_filter: PriceFilter,
    #[serde(default)]
    leverage_filter: Option<LeverageFilter>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct LotSizeFilter {
    qty_step: String,
    min_order_qty: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PriceFilter {
    tick_size: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct LeverageFilter {
    max_leverage: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct BybitOrderResult {
    order_id: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct BybitOrderRequest<'a> {
    category: &'a str,
    symbol: &'a str,
    side: &'a str,
    order_type: &'a str,
    qty: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct BybitTradingStopRequest<'a> {
    category: &'a str,
    symbol: &'a str,
    tpsl_mode: &'a str,
    position_idx: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    trailing_stop: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    take_profit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_loss: Option<String>,
}

impl TryFrom<BybitInstrument> for Instrument {
    type Error = SendSyncError;

    fn try_from(m: BybitInstrument) -> Result<Self, Self::Error> {
        let max_leverage = match m.leverage_filter {
            Some(filter) => filter.max_leverage.parse()?,
            None => 1.0,
        };
        Ok(Instrument {
            qty_step: m.lot_size_filter.qty_step.parse()?,
            min_order_qty: m.lot_size_filter.min_order_qty.parse()?,
            tick_size: m.price_filter.tick_size.parse()?,
            max_leverage,
            symbol: m.symbol,
            contract_type: m.contract_type,
            status: m.status,
            quote_coin: m.quote_coin,
        })
    }
}

/// Hex HMAC-SHA256 of `payload` keyed with the API secret.
pub fn sign(secret: &str, payload: &str) -> Result<String, SendSyncError> {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| e.to_string())?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn decode<T: DeserializeOwned>(body: &str, what: &str) -> Result<T, SendSyncError> {
    let response: BybitResponse<T> = serde_json::from_str(body)?;
    if response.ret_code != 0 {
        error!("Failed to {}: {} ({})", what, response.ret_msg, response.ret_code);
        return Err(response.ret_msg.into());
    }
    Ok(response.result)
}

pub struct Bybit {
    client: reqwest::Client,
    api_key: String,
    api_secret: String,
}

impl Bybit {
    pub fn new(user_config: &UserConfig) -> Self {
        Bybit {
            client: reqwest::Client::new(),
            api_key: user_config.key.clone(),
            api_secret: user_config.secret.clone(),
        }
    }

    /// Public endpoints only; signed calls will be rejected by the exchange.
    pub fn public() -> Self {
        Bybit {
            client: reqwest::Client::new(),
            api_key: String::new(),
            api_secret: String::new(),
        }
    }

    fn sign_request(&self, payload: &str) -> Result<(String, String), SendSyncError> {
        let timestamp = Utc::now().timestamp_millis().to_string();
        let to_sign = format!("{}{}{}{}", timestamp, self.api_key, RECV_WINDOW, payload);
        Ok((timestamp, sign(&self.api_secret, &to_sign)?))
    }

    async fn get_public<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        what: &str,
    ) -> Result<T, SendSyncError> {
        let query = serde_urlencoded::to_string(params)?;
        let url = format!("{}{}?{}", BYBIT_API_URL, path, query);
        let response = self.client.get(&url).send().await?.text().await?;
        decode(&response, what)
    }

    async fn get_signed<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        what: &str,
    ) -> Result<T, SendSyncError> {
        let query = serde_urlencoded::to_string(params)?;
        let (timestamp, signature) = self.sign_request(&query)?;
        let url = format!("{}{}?{}", BYBIT_API_URL, path, query);

        let response = self
            .client
            .get(&url)
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-TIMESTAMP", timestamp)
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW)
            .header("X-BAPI-SIGN", signature)
            .send()
            .await?
            .text()
            .await?;
        decode(&response, what)
    }

    async fn post_signed<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        what: &str,
    ) -> Result<T, SendSyncError> {
        let payload = serde_json::to_string(body)?;
        let (timestamp, signature) = self.sign_request(&payload)?;

        let response = self
            .client
            .post(format!("{}{}", BYBIT_API_URL, path))
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-TIMESTAMP", timestamp)
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW)
            .header("X-BAPI-SIGN", signature)
            .header("Content-Type", "application/json")
            .body(payload)
            .send()
            .await?
            .text()
            .await?;
        debug!("{} response: {}", what, response);
        decode(&response, what)
    }

    /// Follows `nextPageCursor` until the exchange returns an empty one.
    async fn get_signed_pages<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        what: &str,
    ) -> Result<Vec<T>, SendSyncError> {
        let mut items = Vec::new();
        let mut cursor = String::new();
        loop {
            let mut page_params = params.to_vec();
            if !cursor.is_empty() {
                page_params.push(("cursor", cursor.clone()));
            }
            let page: BybitPage<T> = self.get_signed(path, &page_params, what).await?;
            items.extend(page.list);
            if page.next_page_cursor.is_empty() {
                break;
            }
            cursor = page.next_page_cursor;
        }
        Ok(items)
    }
}

#[async_trait]
impl Exchange for Bybit {
    fn clone_box(&self) -> Box<dyn Exchange> {
        Box::new(Bybit {
            client: self.client.clone(),
            api_key: self.api_key.clone(),
            api_secret: self.api_secret.clone(),
        })
    }

    async fn load_instruments(&self) -> Result<Vec<Instrument>, SendSyncError> {
        info!("Loading instruments");
        let mut instruments = Vec::new();
        let mut cursor = String::new();
        loop {
            let mut params = vec![
                ("category", CATEGORY.to_string()),
                ("limit", "1000".to_string()),
            ];
            if !cursor.is_empty() {
                params.push(("cursor", cursor.clone()));
            }
            let page: BybitPage<BybitInstrument> = self
                .get_public("/v5/market/instruments-info", &params, "load instruments")
                .await?;
            for m in page.list {
                let symbol = m.symbol.clone();
                match Instrument::try_from(m) {
                    Ok(instrument) => instruments.push(instrument),
                    Err(e) => warn!("Could not parse instrument {}: {}", symbol, e),
                }
            }
            if page.next_page_cursor.is_empty() {
                break;
            }
            cursor = page.next_page_cursor;
        }
        Ok(instruments)
    }

    async fn fetch_tickers(&self) -> Result<HashMap<String, Ticker>, SendSyncError> {
        let page: BybitPage<Ticker> = self
            .get_public(
                "/v5/market/tickers",
                &[("category", CATEGORY.to_string())],
                "fetch tickers",
            )
            .await?;
        Ok(page
            .list
            .into_iter()
            .map(|t| (t.symbol.clone(), t))
            .collect())
    }

    async fn fetch_wallet(&self) -> Result<Option<WalletSnapshot>, SendSyncError> {
        let page: BybitPage<WalletSnapshot> = self
            .get_signed(
                "/v5/account/wallet-balance",
                &[
                    ("accountType", "UNIFIED".to_string()),
                    ("coin", SETTLE_COIN.to_string()),
                ],
                "fetch wallet",
            )
            .await?;
        Ok(page.list.into_iter().next())
    }

    async fn fetch_positions(&self) -> Result<Vec<Position>, SendSyncError> {
        let positions: Vec<Position> = self
            .get_signed_pages(
                "/v5/position/list",
                &[
                    ("category", CATEGORY.to_string()),
                    ("settleCoin", SETTLE_COIN.to_string()),
                    ("limit", "200".to_string()),
                ],
                "fetch positions",
            )
            .await?;
        Ok(positions.into_iter().filter(|p| p.is_open()).collect())
    }

    async fn fetch_open_orders(&self) -> Result<Vec<Order>, SendSyncError> {
        self.get_signed_pages(
            "/v5/order/realtime",
            &[
                ("category", CATEGORY.to_string()),
                ("settleCoin", SETTLE_COIN.to_string()),
                ("limit", "50".to_string()),
            ],
            "fetch open orders",
        )
        .await
    }

    async fn place_market_order(
        &mut self,
        symbol: &str,
        side: Side,
        qty: f64,
    ) -> Result<String, SendSyncError> {
        info!("[{}] Placing market {} order, qty {}", symbol, side, qty);
        let request = BybitOrderRequest {
            category: CATEGORY,
            symbol,
            side: side.as_str(),
            order_type: "Market",
            qty: qty.to_string(),
        };
        let result: BybitOrderResult = self
            .post_signed("/v5/order/create", &request, "place order")
            .await?;
        Ok(result.order_id)
    }

    async fn set_trading_stop(
        &mut self,
        symbol: &str,
        stop: &TradingStop,
    ) -> Result<(), SendSyncError> {
        info!("[{}] Setting trading stop: {:?}", symbol, stop);
        let request = BybitTradingStopRequest {
            category: CATEGORY,
            symbol,
            tpsl_mode: "Full",
            position_idx: 0,
            trailing_stop: stop.trailing_stop.map(|v| v.to_string()),
            take_profit: stop.take_profit.map(|v| v.to_string()),
            stop_loss: stop.stop_loss.map(|v| v.to_string()),
        };
        let _: serde_json::Value = self
            .post_signed("/v5/position/trading-stop", &request, "set trading stop")
            .await?;
        Ok(())
    }
}
