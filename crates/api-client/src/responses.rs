use chrono::{DateTime, Utc};
use core_types::{Candle, Ohlc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

// OANDA sends numbers and timestamps as strings. Timestamps are requested in
// UNIX format, e.g. "1700000000.000000000".

/// Deserializes a UNIX timestamp string into a UTC datetime.
pub(crate) fn unix_time<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_unix_time(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid UNIX time: {raw}")))
}

pub(crate) fn parse_unix_time(raw: &str) -> Option<DateTime<Utc>> {
    let (secs, frac) = raw.split_once('.').unwrap_or((raw, "0"));
    let secs: i64 = secs.parse().ok()?;
    let digits: String = frac.chars().chain(std::iter::repeat('0')).take(9).collect();
    let nanos: u32 = digits.parse().ok()?;
    DateTime::from_timestamp(secs, nanos)
}

/// Formats a datetime the way the `from`/`to` query parameters expect.
pub(crate) fn format_unix_time(time: DateTime<Utc>) -> String {
    format!("{}.{:09}", time.timestamp(), time.timestamp_subsec_nanos())
}

/// `GET /v3/accounts`
#[derive(Debug, Clone, Deserialize)]
pub struct AccountsResponse {
    pub accounts: Vec<AccountProperties>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountProperties {
    pub id: String,
}

/// `GET /v3/instruments/{instrument}/candles`
#[derive(Debug, Clone, Deserialize)]
pub struct CandlesResponse {
    pub instrument: String,
    pub granularity: String,
    pub candles: Vec<CandleStick>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CandleStick {
    #[serde(deserialize_with = "unix_time")]
    pub time: DateTime<Utc>,
    pub bid: CandleStickData,
    pub ask: CandleStickData,
    pub mid: CandleStickData,
    #[serde(default)]
    pub volume: i64,
    #[serde(default)]
    pub complete: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CandleStickData {
    pub o: Decimal,
    pub h: Decimal,
    pub l: Decimal,
    pub c: Decimal,
}

impl From<CandleStickData> for Ohlc {
    fn from(data: CandleStickData) -> Self {
        Ohlc {
            open: data.o,
            high: data.h,
            low: data.l,
            close: data.c,
        }
    }
}

impl From<CandleStick> for Candle {
    fn from(stick: CandleStick) -> Self {
        Candle {
            time: stick.time,
            bid: stick.bid.into(),
            ask: stick.ask.into(),
            mid: stick.mid.into(),
        }
    }
}

/// `GET /v3/accounts/{id}/openTrades`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenTradesResponse {
    pub trades: Vec<TradeResponse>,
    #[serde(rename = "lastTransactionID")]
    pub last_transaction_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeResponse {
    pub id: String,
    pub instrument: String,
    pub price: Decimal,
    #[serde(deserialize_with = "unix_time")]
    pub open_time: DateTime<Utc>,
    pub state: String,
    pub initial_units: Decimal,
    pub current_units: Decimal,
    #[serde(rename = "realizedPL", default)]
    pub realized_pl: Decimal,
    #[serde(rename = "unrealizedPL", default)]
    pub unrealized_pl: Decimal,
}

/// Response of both the market order and the trade close endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFillResponse {
    pub order_fill_transaction: OrderFillTransaction,
    #[serde(rename = "lastTransactionID")]
    pub last_transaction_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFillTransaction {
    pub id: String,
    #[serde(deserialize_with = "unix_time")]
    pub time: DateTime<Utc>,
    #[serde(rename = "accountID")]
    pub account_id: String,
    pub instrument: String,
    pub units: Decimal,
    pub price: Decimal,
    pub trade_opened: Option<TradeOpen>,
    #[serde(default)]
    pub trades_closed: Vec<TradeReduce>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeOpen {
    #[serde(rename = "tradeID")]
    pub trade_id: String,
    pub units: Decimal,
    pub price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeReduce {
    #[serde(rename = "tradeID")]
    pub trade_id: String,
    pub units: Decimal,
    pub price: Decimal,
    #[serde(rename = "realizedPL")]
    pub realized_pl: Decimal,
}

/// Body of `POST /v3/accounts/{id}/orders`.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequestBody {
    pub order: MarketOrderRequest,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketOrderRequest {
    #[serde(rename = "type")]
    pub order_type: &'static str,
    pub instrument: String,
    /// Signed: negative units open a short position.
    pub units: String,
}

/// Body of `PUT /v3/accounts/{id}/trades/{trade}/close`.
#[derive(Debug, Clone, Serialize)]
pub struct CloseTradeBody {
    pub units: &'static str,
}

/// Represents an error response from the OANDA API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error_message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn candles_decode_string_numbers_and_unix_times() {
        let body = r#"{
            "instrument": "GBP_USD",
            "granularity": "M1",
            "candles": [{
                "complete": true,
                "volume": 12,
                "time": "1704672000.000000000",
                "bid": {"o": "1.27100", "h": "1.27150", "l": "1.27080", "c": "1.27120"},
                "ask": {"o": "1.27110", "h": "1.27160", "l": "1.27090", "c": "1.27130"},
                "mid": {"o": "1.27105", "h": "1.27155", "l": "1.27085", "c": "1.27125"}
            }]
        }"#;
        let response: CandlesResponse = serde_json::from_str(body).unwrap();
        let candle: Candle = response.candles[0].clone().into();
        assert_eq!(candle.time.timestamp(), 1_704_672_000);
        assert_eq!(candle.bid.close, dec!(1.27120));
        assert_eq!(candle.mid.high, dec!(1.27155));
    }

    #[test]
    fn unix_time_keeps_fractional_seconds() {
        let time = parse_unix_time("1704672000.5").unwrap();
        assert_eq!(time.timestamp_subsec_millis(), 500);
        assert_eq!(format_unix_time(time), "1704672000.500000000");
        assert!(parse_unix_time("yesterday").is_none());
    }
}
