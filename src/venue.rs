//! Downstream trading venue: order messages and the signed REST call

use crate::error::{OrchestratorError, Result};
use crate::signing::PayloadSigner;
use crate::types::KeyName;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Header carrying the venue API key on REST calls
pub const API_KEY_HEADER: &str = "X-MBX-APIKEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
}

/// A plain order; field order matters for the signed query string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub quantity: String,
    pub timestamp: i64,
}

impl OrderRequest {
    /// Market order stamped with the current time
    pub fn market(symbol: impl Into<String>, side: Side, quantity: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity: quantity.into(),
            timestamp: now_millis(),
        }
    }

    /// URL-encoded query string, the exact bytes that get signed
    pub fn query_string(&self) -> Result<String> {
        serde_urlencoded::to_string(self).map_err(|e| OrchestratorError::venue(e.to_string()))
    }
}

/// Milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// REST client for signed venue requests
pub struct RestVenue {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestVenue {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| OrchestratorError::venue(format!("failed to create HTTP client: {}", e)))?;
        let base_url: String = base_url.into();

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Full order URL with the signature appended to the signed query
    pub async fn signed_order_url(
        &self,
        order: &OrderRequest,
        signer: &dyn PayloadSigner,
        key_name: &KeyName,
    ) -> Result<String> {
        let query = order.query_string()?;
        let signature = signer.sign_payload(key_name, query.as_bytes()).await?;
        Ok(format!(
            "{}/order?{}&signature={}",
            self.base_url,
            query,
            signature.to_hex()
        ))
    }

    /// Sign the order query through the cluster and submit it
    pub async fn place_signed_order(
        &self,
        order: &OrderRequest,
        signer: &dyn PayloadSigner,
        key_name: &KeyName,
    ) -> Result<serde_json::Value> {
        let url = self.signed_order_url(order, signer, key_name).await?;

        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| OrchestratorError::venue(format!("order request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OrchestratorError::venue(e.to_string()))?;

        if !status.is_success() {
            return Err(OrchestratorError::venue(format!(
                "failed to place order: HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        tracing::info!(symbol = %order.symbol, "Order placed");
        serde_json::from_str(&body).map_err(|e| OrchestratorError::venue(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_string_order_and_names() {
        let order = OrderRequest {
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            order_type: OrderType::Market,
            quantity: "0.0001".to_string(),
            timestamp: 1_700_000_000_000,
        };
        assert_eq!(
            order.query_string().unwrap(),
            "symbol=BTCUSDT&side=BUY&type=MARKET&quantity=0.0001&timestamp=1700000000000"
        );
    }

    #[test]
    fn test_market_order_is_stamped() {
        let before = now_millis();
        let order = OrderRequest::market("BTCUSDT", Side::Sell, "1");
        assert!(order.timestamp >= before);
        assert_eq!(order.order_type, OrderType::Market);
    }
}
