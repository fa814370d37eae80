//! A signed-REST `ExchangeGateway` implementation, grounded on the same
//! HMAC-SHA256 query-signing shape used by spot-exchange REST clients:
//! every private call appends `timestamp`/`recvWindow` and a signature over
//! the resulting query string. Null/empty returns signal transient failure
//! rather than propagating as errors, per the gateway's documented contract.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::{Candle, ExternalPosition, LotSizeFilter, Order, OrderRequest, OrderSide};

use super::ExchangeGateway;

type HmacSha256 = Hmac<Sha256>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RestGateway {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl RestGateway {
    pub fn new(base_url: String, api_key: String, api_secret: String) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client builds with static config");
        Self {
            client,
            base_url,
            api_key,
            api_secret,
        }
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts a key of any size");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn signed_query(&self, params: &HashMap<&str, String>) -> String {
        let timestamp = Utc::now().timestamp_millis();
        let mut parts: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
        parts.push(format!("timestamp={timestamp}"));
        parts.push("recvWindow=5000".to_string());
        let query = parts.join("&");
        let signature = self.sign(&query);
        format!("{query}&signature={signature}")
    }
}

#[derive(Debug, Deserialize)]
struct TickerResponse {
    #[serde(rename = "lastPrice")]
    last_price: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    #[serde(rename = "orderId")]
    order_id: u64,
    #[serde(rename = "clientOrderId")]
    client_order_id: String,
    symbol: String,
    side: String,
    #[serde(rename = "executedQty")]
    executed_qty: String,
    #[serde(rename = "cummulativeQuoteQty")]
    cumulative_quote_qty: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeFilterResponse {
    #[serde(rename = "minQty")]
    min_qty: Option<String>,
    #[serde(rename = "maxQty")]
    max_qty: Option<String>,
    #[serde(rename = "stepSize")]
    step_size: Option<String>,
}

#[async_trait]
impl ExchangeGateway for RestGateway {
    async fn get_ticker(&self, symbol: &str) -> Option<Decimal> {
        let url = format!("{}/api/v3/ticker/price?symbol={}", self.base_url, symbol);
        let resp = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("ticker fetch failed for {symbol}: {e}");
                return None;
            }
        };
        let parsed: TickerResponse = match resp.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!("ticker response malformed for {symbol}: {e}");
                return None;
            }
        };
        Decimal::from_str(&parsed.last_price).ok()
    }

    async fn get_candles(&self, symbol: &str, interval: &str, limit: u32) -> Vec<Candle> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url, symbol, interval, limit
        );
        match self.client.get(&url).send().await {
            Ok(resp) => resp.json::<Vec<Candle>>().await.unwrap_or_default(),
            Err(e) => {
                debug!("candle fetch failed for {symbol}: {e}");
                Vec::new()
            }
        }
    }

    async fn place_order(&self, request: OrderRequest) -> Option<Order> {
        let mut params = HashMap::new();
        params.insert("symbol", request.symbol.clone());
        params.insert("side", request.side.as_str().to_string());
        params.insert("type", "MARKET".to_string());
        params.insert("quantity", request.quantity.to_string());
        if request.reduce_only {
            params.insert("reduceOnly", "true".to_string());
        }
        let query = self.signed_query(&params);
        let url = format!("{}/api/v3/order?{}", self.base_url, query);

        let resp = match self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("order submission failed for {}: {e}", request.symbol);
                return None;
            }
        };

        if !resp.status().is_success() {
            warn!("order rejected for {}: status {}", request.symbol, resp.status());
            return None;
        }

        let parsed: OrderResponse = match resp.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!("order response malformed for {}: {e}", request.symbol);
                return None;
            }
        };

        let executed_qty = Decimal::from_str(&parsed.executed_qty).ok()?;
        let quote_qty = Decimal::from_str(&parsed.cumulative_quote_qty).ok()?;
        let fill_price = if executed_qty.is_zero() {
            return None;
        } else {
            quote_qty / executed_qty
        };

        Some(Order {
            order_id: parsed.order_id.to_string(),
            client_order_id: parsed.client_order_id,
            symbol: parsed.symbol,
            side: if parsed.side == "BUY" {
                OrderSide::Buy
            } else {
                OrderSide::Sell
            },
            quantity: executed_qty,
            fill_price,
            filled_at: Utc::now(),
        })
    }

    async fn get_open_positions(&self, symbol: &str) -> Vec<ExternalPosition> {
        let mut params = HashMap::new();
        params.insert("symbol", symbol.to_string());
        let query = self.signed_query(&params);
        let url = format!("{}/api/v3/positions?{}", self.base_url, query);

        match self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
        {
            Ok(resp) => resp.json::<Vec<ExternalPosition>>().await.unwrap_or_default(),
            Err(e) => {
                debug!("open positions fetch failed for {symbol}: {e}");
                Vec::new()
            }
        }
    }

    async fn get_lot_size_filter(&self, symbol: &str) -> LotSizeFilter {
        let url = format!("{}/api/v3/exchangeInfo?symbol={}", self.base_url, symbol);
        let default = LotSizeFilter::default();

        let Ok(resp) = self.client.get(&url).send().await else {
            return default;
        };
        let Ok(parsed) = resp.json::<ExchangeFilterResponse>().await else {
            return default;
        };

        LotSizeFilter {
            min_qty: parsed
                .min_qty
                .and_then(|s| Decimal::from_str(&s).ok())
                .unwrap_or(default.min_qty),
            max_qty: parsed
                .max_qty
                .and_then(|s| Decimal::from_str(&s).ok())
                .unwrap_or(default.max_qty),
            step_size: parsed
                .step_size
                .and_then(|s| Decimal::from_str(&s).ok())
                .unwrap_or(default.step_size),
        }
    }

    async fn get_account_balance(&self) -> Option<Decimal> {
        let params = HashMap::new();
        let query = self.signed_query(&params);
        let url = format!("{}/api/v3/account?{}", self.base_url, query);

        #[derive(Deserialize)]
        struct AccountResponse {
            balances: Vec<BalanceEntry>,
        }
        #[derive(Deserialize)]
        struct BalanceEntry {
            asset: String,
            free: String,
        }

        let resp = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .ok()?;
        let parsed: AccountResponse = resp.json().await.ok()?;
        parsed
            .balances
            .into_iter()
            .find(|b| b.asset == "USDT")
            .and_then(|b| Decimal::from_str(&b.free).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_query_appends_timestamp_recv_window_and_signature() {
        let gw = RestGateway::new(
            "https://example.test".to_string(),
            "key".to_string(),
            "secret".to_string(),
        );
        let mut params = HashMap::new();
        params.insert("symbol", "BTCUSDT".to_string());
        let query = gw.signed_query(&params);
        assert!(query.contains("symbol=BTCUSDT"));
        assert!(query.contains("timestamp="));
        assert!(query.contains("recvWindow=5000"));
        assert!(query.contains("signature="));
    }

    #[test]
    fn sign_is_deterministic_for_the_same_key_and_query() {
        let gw = RestGateway::new(
            "https://example.test".to_string(),
            "key".to_string(),
            "secret".to_string(),
        );
        assert_eq!(gw.sign("a=1"), gw.sign("a=1"));
        assert_ne!(gw.sign("a=1"), gw.sign("a=2"));
    }
}
