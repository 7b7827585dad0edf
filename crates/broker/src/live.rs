use crate::error::BrokerError;
use crate::{Completion, Orderer};
use api_client::{ApiClient, OrderFillTransaction, TradeResponse};
use async_trait::async_trait;
use core_types::{ClosedOrder, CreatedOrder, OpenOrder, OrderId, TradeDirection, TradePair};
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;

/// Places orders on a live OANDA account.
///
/// Each request runs on its own task. Profit figures are the broker's
/// account-currency values, passed through unchanged.
#[derive(Clone)]
pub struct LiveOrderer {
    client: Arc<dyn ApiClient>,
    account_id: String,
}

impl LiveOrderer {
    pub fn new(client: Arc<dyn ApiClient>, account_id: String) -> Self {
        Self { client, account_id }
    }

    /// Uses the first account the token can see when none is configured.
    pub async fn connect(
        client: Arc<dyn ApiClient>,
        account_id: Option<String>,
    ) -> Result<Self, BrokerError> {
        let account_id = match account_id {
            Some(id) => id,
            None => client
                .get_accounts()
                .await?
                .into_iter()
                .next()
                .map(|account| account.id)
                .ok_or_else(|| BrokerError::InvalidResponse("token has no accounts".to_string()))?,
        };
        tracing::info!(account_id = %account_id, "live orderer connected");
        Ok(Self::new(client, account_id))
    }

    fn spawn<T, F>(&self, request: F) -> Completion<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, BrokerError>> + Send + 'static,
    {
        let (reply, completion) = Completion::channel();
        tokio::spawn(async move {
            let _ = reply.send(request.await);
        });
        completion
    }
}

fn parse_order_id(raw: &str) -> Result<OrderId, BrokerError> {
    raw.parse()
        .map(OrderId)
        .map_err(|_| BrokerError::InvalidResponse(format!("non-numeric trade id {raw}")))
}

fn created_from_fill(
    fill: OrderFillTransaction,
    pair: TradePair,
    direction: TradeDirection,
) -> Result<CreatedOrder, BrokerError> {
    let opened = fill.trade_opened.ok_or_else(|| {
        BrokerError::InvalidResponse(format!("order fill {} opened no trade", fill.id))
    })?;
    Ok(CreatedOrder {
        order_id: parse_order_id(&opened.trade_id)?,
        pair,
        direction,
        units: opened.units.abs(),
        time_at_open: fill.time,
        price_at_open: opened.price,
    })
}

fn open_from_trade(trade: TradeResponse) -> Result<OpenOrder, BrokerError> {
    Ok(OpenOrder {
        order: CreatedOrder {
            order_id: parse_order_id(&trade.id)?,
            pair: TradePair::from_instrument(&trade.instrument)?,
            direction: TradeDirection::from_units(trade.current_units),
            units: trade.current_units.abs(),
            time_at_open: trade.open_time,
            price_at_open: trade.price,
        },
        unrealized_profit: trade.unrealized_pl,
    })
}

fn closed_from_fill(fill: OrderFillTransaction, order_id: OrderId) -> Result<ClosedOrder, BrokerError> {
    let reduced = fill
        .trades_closed
        .iter()
        .find(|closed| parse_order_id(&closed.trade_id).ok() == Some(order_id))
        .ok_or_else(|| {
            BrokerError::InvalidResponse(format!("order fill {} did not close trade {order_id}", fill.id))
        })?;
    Ok(ClosedOrder {
        order_id,
        pair: TradePair::from_instrument(&fill.instrument)?,
        // Closing a long sells, so the reduction carries the opposite sign.
        direction: TradeDirection::from_units(-reduced.units),
        time_at_close: fill.time,
        price_at_close: reduced.price,
        realized_profit: reduced.realized_pl,
    })
}

#[async_trait]
impl Orderer for LiveOrderer {
    async fn create_order(
        &self,
        pair: TradePair,
        units: Decimal,
        direction: TradeDirection,
    ) -> Completion<CreatedOrder> {
        let client = self.client.clone();
        let account_id = self.account_id.clone();
        let signed = match direction {
            TradeDirection::Long => units.abs(),
            TradeDirection::Short => -units.abs(),
        };
        self.spawn(async move {
            let fill = client.create_market_order(&account_id, pair, signed).await?;
            created_from_fill(fill, pair, direction)
        })
    }

    async fn open_orders(&self) -> Completion<Vec<OpenOrder>> {
        let client = self.client.clone();
        let account_id = self.account_id.clone();
        self.spawn(async move {
            client
                .get_open_trades(&account_id)
                .await?
                .into_iter()
                .map(open_from_trade)
                .collect::<Result<Vec<_>, _>>()
        })
    }

    async fn close_order(&self, order_id: OrderId) -> Completion<ClosedOrder> {
        let client = self.client.clone();
        let account_id = self.account_id.clone();
        self.spawn(async move {
            let fill = client.close_trade(&account_id, &order_id.to_string()).await?;
            closed_from_fill(fill, order_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_client::error::ApiError;
    use api_client::{AccountProperties, CandleRequest};
    use core_types::Candle;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubClient {
        orders: Mutex<Vec<(String, TradePair, Decimal)>>,
    }

    fn fill(body: serde_json::Value) -> OrderFillTransaction {
        serde_json::from_value(body).unwrap()
    }

    #[async_trait]
    impl ApiClient for StubClient {
        async fn get_accounts(&self) -> Result<Vec<AccountProperties>, ApiError> {
            Ok(serde_json::from_value(serde_json::json!([{ "id": "101-001" }])).unwrap())
        }

        async fn fetch_candles(&self, _pair: TradePair, _request: &CandleRequest) -> Result<Vec<Candle>, ApiError> {
            Ok(Vec::new())
        }

        async fn get_open_trades(&self, _account_id: &str) -> Result<Vec<TradeResponse>, ApiError> {
            Ok(serde_json::from_value(serde_json::json!([{
                "id": "42",
                "instrument": "EUR_USD",
                "price": "1.10000",
                "openTime": "1704672000.000000000",
                "state": "OPEN",
                "initialUnits": "-500",
                "currentUnits": "-500",
                "unrealizedPL": "1.2500"
            }]))
            .unwrap())
        }

        async fn create_market_order(
            &self,
            account_id: &str,
            pair: TradePair,
            units: Decimal,
        ) -> Result<OrderFillTransaction, ApiError> {
            self.orders.lock().unwrap().push((account_id.to_string(), pair, units));
            Ok(fill(serde_json::json!({
                "id": "7",
                "time": "1704672060.000000000",
                "accountID": account_id,
                "instrument": "GBP_USD",
                "units": units.to_string(),
                "price": "1.27130",
                "tradeOpened": { "tradeID": "43", "units": units.to_string(), "price": "1.27130" }
            })))
        }

        async fn close_trade(&self, account_id: &str, trade_id: &str) -> Result<OrderFillTransaction, ApiError> {
            if trade_id != "43" {
                return Err(ApiError::Oanda { status: 404, message: "no such trade".to_string() });
            }
            Ok(fill(serde_json::json!({
                "id": "8",
                "time": "1704672120.000000000",
                "accountID": account_id,
                "instrument": "GBP_USD",
                "units": "1000",
                "price": "1.27050",
                "tradesClosed": [{ "tradeID": "43", "units": "1000", "price": "1.27050", "realizedPL": "-0.8000" }]
            })))
        }
    }

    #[tokio::test]
    async fn short_orders_are_sent_with_negative_units() {
        let stub = Arc::new(StubClient::default());
        let orderer = LiveOrderer::connect(stub.clone(), None).await.unwrap();

        let created = orderer
            .create_order(TradePair::GbpUsd, dec!(1000), TradeDirection::Short)
            .await
            .wait()
            .await
            .unwrap();

        assert_eq!(created.order_id, OrderId(43));
        assert_eq!(created.direction, TradeDirection::Short);
        assert_eq!(created.units, dec!(1000));
        let sent = stub.orders.lock().unwrap().clone();
        assert_eq!(sent, vec![("101-001".to_string(), TradePair::GbpUsd, dec!(-1000))]);
    }

    #[tokio::test]
    async fn open_trades_map_to_open_orders() {
        let orderer = LiveOrderer::new(Arc::new(StubClient::default()), "101-001".to_string());
        let open = orderer.open_orders().await.wait().await.unwrap();

        assert_eq!(open.len(), 1);
        assert_eq!(open[0].order_id(), OrderId(42));
        assert_eq!(open[0].order.pair, TradePair::EurUsd);
        assert_eq!(open[0].order.direction, TradeDirection::Short);
        assert_eq!(open[0].unrealized_profit, dec!(1.25));
    }

    #[tokio::test]
    async fn close_reports_the_reduced_trade_and_surfaces_api_errors() {
        let orderer = LiveOrderer::new(Arc::new(StubClient::default()), "101-001".to_string());

        let closed = orderer.close_order(OrderId(43)).await.wait().await.unwrap();
        assert_eq!(closed.direction, TradeDirection::Short);
        assert_eq!(closed.price_at_close, dec!(1.27050));
        assert_eq!(closed.realized_profit, dec!(-0.8));

        let missing = orderer.close_order(OrderId(99)).await.wait().await;
        assert!(matches!(missing, Err(BrokerError::Api(_))));
    }
}
