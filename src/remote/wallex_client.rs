use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{error, warn};

use crate::remote::{ExchangeGateway, GatewayError, MarketInfo, OrderSide, OrderState};

const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Deserialize)]
struct TradesResponse {
    success: bool,
    result: Option<TradesResult>,
}

#[derive(Debug, Deserialize)]
struct TradesResult {
    #[serde(rename = "latestTrades")]
    latest_trades: Vec<LatestTrade>,
}

#[derive(Debug, Deserialize)]
struct LatestTrade {
    price: String,
}

#[derive(Debug, Deserialize)]
struct MarketsResponse {
    success: bool,
    result: Option<MarketsResult>,
}

#[derive(Debug, Deserialize)]
struct MarketsResult {
    markets: Vec<MarketEntry>,
}

#[derive(Debug, Deserialize)]
struct MarketEntry {
    symbol: String,
    #[serde(default)]
    base_asset: String,
    #[serde(default)]
    quote_asset: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    success: bool,
    message: Option<String>,
    result: Option<OrderResult>,
}

#[derive(Debug, Deserialize)]
struct OrderResult {
    #[serde(rename = "clientOrderId")]
    client_order_id: String,
    #[serde(default)]
    status: String,
}

/// REST client for the Wallex spot API. Authentication is a per-request
/// `X-API-Key` header, so one client instance serves every subscriber.
#[derive(Clone)]
pub struct WallexClient {
    client: Client,
    base_url: String,
}

impl WallexClient {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self { client, base_url }
    }
}

#[async_trait]
impl ExchangeGateway for WallexClient {
    async fn last_price(&self, api_key: &str, symbol: &str) -> Option<f64> {
        let url = format!("{}/v1/trades?symbol={}", self.base_url, symbol);
        let resp = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, api_key)
            .send()
            .await
            .ok()?;
        let body = resp.json::<TradesResponse>().await.ok()?;
        if !body.success {
            return None;
        }
        body.result?
            .latest_trades
            .first()
            .and_then(|t| t.price.parse::<f64>().ok())
    }

    async fn market_info(&self, api_key: &str, symbol: &str) -> Option<MarketInfo> {
        let url = format!("{}/hector/web/v1/markets", self.base_url);
        let resp = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, api_key)
            .send()
            .await
            .ok()?;
        let body = resp.json::<MarketsResponse>().await.ok()?;
        if !body.success {
            return None;
        }
        body.result?
            .markets
            .into_iter()
            .find(|m| m.symbol == symbol)
            .map(|m| MarketInfo {
                symbol: m.symbol,
                base_asset: m.base_asset,
                quote_asset: m.quote_asset,
            })
    }

    async fn place_order(
        &self,
        api_key: &str,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
    ) -> Result<String, GatewayError> {
        let url = format!("{}/v1/account/orders", self.base_url);
        // Wallex expects quantity and price as strings.
        let payload = serde_json::json!({
            "symbol": symbol,
            "side": side.as_str(),
            "type": "LIMIT",
            "quantity": quantity.to_string(),
            "price": price.to_string(),
        });

        let resp = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, api_key)
            .json(&payload)
            .send()
            .await?;

        let body = resp.json::<OrderResponse>().await?;
        if !body.success {
            let reason = body.message.unwrap_or_else(|| "unknown error".to_string());
            error!("Wallex order failed: {} {} -> {}", side.as_str(), symbol, reason);
            return Err(GatewayError::Api(reason));
        }
        body.result
            .map(|r| r.client_order_id)
            .ok_or_else(|| GatewayError::Api("order accepted without an id".to_string()))
    }

    async fn order_status(
        &self,
        api_key: &str,
        order_id: &str,
    ) -> Result<OrderState, GatewayError> {
        let url = format!("{}/v1/account/orders/{}", self.base_url, order_id);
        let resp = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, api_key)
            .send()
            .await?;

        let body = resp.json::<OrderResponse>().await?;
        if !body.success {
            let reason = body.message.unwrap_or_else(|| "unknown error".to_string());
            return Err(GatewayError::Api(reason));
        }
        match body.result {
            Some(r) => Ok(OrderState::from_exchange(&r.status)),
            None => Err(GatewayError::Api("status response without a result".to_string())),
        }
    }

    async fn cancel_order(&self, api_key: &str, order_id: &str) -> bool {
        let url = format!("{}/v1/account/orders/{}", self.base_url, order_id);
        match self
            .client
            .delete(&url)
            .header(API_KEY_HEADER, api_key)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!("Cancel request for {} did not reach Wallex: {}", order_id, e);
                false
            }
        }
    }
}
