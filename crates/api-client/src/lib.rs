use crate::error::ApiError;
use crate::responses::{
    format_unix_time, AccountsResponse, CandlesResponse, CloseTradeBody, MarketOrderRequest,
    OpenTradesResponse, OrderFillResponse, OrderRequestBody,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use configuration::OandaSettings;
use core_types::{Candle, TradePair};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::Method;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub mod error;
pub mod responses;

// --- Public API ---
pub use responses::{AccountProperties, ApiErrorResponse, OrderFillTransaction, TradeResponse};

/// Query for one page of candles.
///
/// OANDA accepts either `count` or a `from`/`to` range, optionally combined
/// with `includeFirst` when paging forward from a known candle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandleRequest {
    pub granularity: String,
    pub count: Option<usize>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub include_first: Option<bool>,
}

/// The generic, abstract interface for a broker REST API client.
/// This trait is the contract that the live orderer and the price sources use,
/// allowing the underlying implementation (live or mock) to be swapped out.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Lists the accounts the token can trade on.
    async fn get_accounts(&self) -> Result<Vec<AccountProperties>, ApiError>;

    /// Fetches one page of bid/ask/mid candles.
    async fn fetch_candles(
        &self,
        pair: TradePair,
        request: &CandleRequest,
    ) -> Result<Vec<Candle>, ApiError>;

    /// Fetches all currently open trades of an account.
    async fn get_open_trades(&self, account_id: &str) -> Result<Vec<TradeResponse>, ApiError>;

    /// Places a market order. Negative units open a short position.
    async fn create_market_order(
        &self,
        account_id: &str,
        pair: TradePair,
        units: Decimal,
    ) -> Result<OrderFillTransaction, ApiError>;

    /// Closes an open trade in full.
    async fn close_trade(
        &self,
        account_id: &str,
        trade_id: &str,
    ) -> Result<OrderFillTransaction, ApiError>;
}

/// A concrete implementation of the `ApiClient` for the OANDA v20 REST API.
#[derive(Clone)]
pub struct OandaClient {
    client: reqwest::Client,
    host: String,
}

impl OandaClient {
    pub fn new(settings: &OandaSettings) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", settings.token))
            .map_err(|e| ApiError::Configuration(format!("invalid OANDA token: {e}")))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert("Accept-Datetime-Format", HeaderValue::from_static("UNIX"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            host: settings.host.trim_end_matches('/').to_string(),
        })
    }

    async fn request<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.host, path);
        let mut builder = self.client.request(method.clone(), &url).query(query);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            serde_json::from_str::<T>(&text).map_err(|e| ApiError::Deserialization(e.to_string()))
        } else {
            let message = serde_json::from_str::<ApiErrorResponse>(&text)
                .map(|e| e.error_message)
                .unwrap_or(text);
            tracing::warn!(%method, path, status = status.as_u16(), %message, "OANDA request failed");
            Err(ApiError::Oanda {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        self.request::<(), T>(Method::GET, path, query, None).await
    }
}

#[async_trait]
impl ApiClient for OandaClient {
    async fn get_accounts(&self) -> Result<Vec<AccountProperties>, ApiError> {
        let response: AccountsResponse = self.get("/v3/accounts", &[]).await?;
        Ok(response.accounts)
    }

    async fn fetch_candles(
        &self,
        pair: TradePair,
        request: &CandleRequest,
    ) -> Result<Vec<Candle>, ApiError> {
        let mut query = vec![
            ("price", "MBA".to_string()),
            ("granularity", request.granularity.clone()),
        ];
        if let Some(count) = request.count {
            query.push(("count", count.to_string()));
        }
        if let Some(from) = request.from {
            query.push(("from", format_unix_time(from)));
        }
        if let Some(to) = request.to {
            query.push(("to", format_unix_time(to)));
        }
        if let Some(include_first) = request.include_first {
            query.push(("includeFirst", include_first.to_string()));
        }

        let path = format!("/v3/instruments/{}/candles", pair.instrument());
        let response: CandlesResponse = self.get(&path, &query).await?;
        Ok(response.candles.into_iter().map(Candle::from).collect())
    }

    async fn get_open_trades(&self, account_id: &str) -> Result<Vec<TradeResponse>, ApiError> {
        let path = format!("/v3/accounts/{account_id}/openTrades");
        let response: OpenTradesResponse = self.get(&path, &[]).await?;
        Ok(response.trades)
    }

    async fn create_market_order(
        &self,
        account_id: &str,
        pair: TradePair,
        units: Decimal,
    ) -> Result<OrderFillTransaction, ApiError> {
        let body = OrderRequestBody {
            order: MarketOrderRequest {
                order_type: "MARKET",
                instrument: pair.instrument(),
                units: units.normalize().to_string(),
            },
        };
        let path = format!("/v3/accounts/{account_id}/orders");
        let response: OrderFillResponse = self
            .request(Method::POST, &path, &[], Some(&body))
            .await?;
        Ok(response.order_fill_transaction)
    }

    async fn close_trade(
        &self,
        account_id: &str,
        trade_id: &str,
    ) -> Result<OrderFillTransaction, ApiError> {
        let body = CloseTradeBody { units: "ALL" };
        let path = format!("/v3/accounts/{account_id}/trades/{trade_id}/close");
        let response: OrderFillResponse = self
            .request(Method::PUT, &path, &[], Some(&body))
            .await?;
        Ok(response.order_fill_transaction)
    }
}
