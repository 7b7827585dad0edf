use crate::error::PricerError;
use crate::PriceSource;
use api_client::{ApiClient, CandleRequest};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use configuration::SimulationSettings;
use core_types::{Candle, CandleWindow, TradeMaterial, TradePair};
use futures::future::join_all;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Arc;

/// Replays historical candles for a fixed date range.
///
/// Each instrument keeps a read cursor that starts one window in. On every
/// tick the source emits the window ending at each cursor, then moves every
/// cursor whose next candle is due on the simulated clock.
pub struct SimulationPriceSource {
    client: Arc<dyn ApiClient>,
    settings: SimulationSettings,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    history: HashMap<TradePair, Arc<Vec<Candle>>>,
    cursors: HashMap<TradePair, usize>,
    clock: DateTime<Utc>,
    initialized: bool,
    show_progress: bool,
}

impl SimulationPriceSource {
    pub fn new(
        client: Arc<dyn ApiClient>,
        settings: SimulationSettings,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Self {
        Self {
            client,
            settings,
            from,
            to,
            history: HashMap::new(),
            cursors: HashMap::new(),
            clock: from,
            initialized: false,
            show_progress: true,
        }
    }

    /// Disables the terminal progress bars.
    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }

    fn step(&self) -> Duration {
        Duration::seconds(self.settings.granularity_secs)
    }

    fn has_next(&self) -> bool {
        self.history
            .iter()
            .any(|(pair, candles)| self.cursors.get(pair).copied().unwrap_or(0) < candles.len())
    }

    /// Emits the current windows and advances the clock by one step.
    fn advance(&mut self) -> TradeMaterial {
        let window = self.settings.window_size;
        let due = self.clock + self.step();
        let mut windows = HashMap::with_capacity(self.history.len());

        for (pair, candles) in &self.history {
            let cursor = self.cursors.get(pair).copied().unwrap_or(window);
            windows.insert(*pair, CandleWindow::new(candles.clone(), cursor - window..cursor));

            if cursor < candles.len() && due >= candles[cursor].time {
                self.cursors.insert(*pair, cursor + 1);
            }
        }

        let material = TradeMaterial::new(self.clock, windows);
        self.clock = due;
        material
    }
}

/// Downloads every candle of `pair` in `[from, to)`, one page at a time.
async fn fetch_history(
    client: Arc<dyn ApiClient>,
    settings: SimulationSettings,
    pair: TradePair,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    progress: ProgressBar,
) -> Result<(TradePair, Vec<Candle>), PricerError> {
    let page_span = Duration::seconds(settings.granularity_secs * settings.page_size as i64);
    let mut cursor = from;
    let mut include_first = true;
    let mut candles: Vec<Candle> = Vec::new();

    loop {
        if to <= cursor {
            break;
        }
        let mut request = CandleRequest {
            granularity: settings.granularity.clone(),
            from: Some(cursor),
            include_first: Some(include_first),
            ..CandleRequest::default()
        };
        if to - cursor > page_span {
            request.count = Some(settings.page_size);
        } else {
            request.to = Some(to);
        }

        let page = client.fetch_candles(pair, &request).await?;
        let Some(last) = page.last().map(|c| c.time) else {
            break;
        };
        if last <= cursor && !include_first {
            break;
        }

        candles.extend(page);
        progress.set_position(((last - from).num_seconds().max(0)) as u64);
        cursor = last;
        include_first = false;
    }

    progress.finish_with_message(format!("{pair}: {} candles", candles.len()));
    Ok((pair, candles))
}

#[async_trait]
impl PriceSource for SimulationPriceSource {
    async fn initialize(&mut self) -> Result<(), PricerError> {
        tracing::info!(from = %self.from, to = %self.to, pairs = self.settings.pairs.len(), "fetching price history");

        let bars = MultiProgress::new();
        if !self.show_progress {
            bars.set_draw_target(indicatif::ProgressDrawTarget::hidden());
        }
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix:>8} [{bar:40.cyan/blue}] {percent:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        let span = (self.to - self.from).num_seconds().max(0) as u64;

        let tasks = self.settings.pairs.iter().map(|pair| {
            let progress = bars.add(ProgressBar::new(span));
            progress.set_style(style.clone());
            progress.set_prefix(pair.to_string());
            fetch_history(
                self.client.clone(),
                self.settings.clone(),
                *pair,
                self.from,
                self.to,
                progress,
            )
        });

        let window = self.settings.window_size;
        let mut start: Option<DateTime<Utc>> = None;
        for result in join_all(tasks).await {
            let (pair, candles) = result?;
            if candles.len() < window {
                return Err(PricerError::InsufficientHistory {
                    pair,
                    available: candles.len(),
                    required: window,
                });
            }
            let first_due = candles[window - 1].time;
            start = Some(start.map_or(first_due, |s| s.min(first_due)));
            self.cursors.insert(pair, window);
            self.history.insert(pair, Arc::new(candles));
        }

        self.clock = start.unwrap_or(self.from);
        self.initialized = true;
        tracing::info!(start = %self.clock, "price history ready");
        Ok(())
    }

    async fn next_price(&mut self) -> Result<Option<TradeMaterial>, PricerError> {
        if !self.initialized {
            return Err(PricerError::NotInitialized);
        }
        if !self.has_next() {
            return Ok(None);
        }
        Ok(Some(self.advance()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_client::error::ApiError;
    use api_client::{AccountProperties, OrderFillTransaction, TradeResponse};
    use chrono::TimeZone;
    use core_types::Ohlc;
    use rust_decimal::Decimal;
    use std::sync::Mutex;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap()
    }

    fn candle(minute: i64, close: i64) -> Candle {
        let ohlc = Ohlc::flat(Decimal::new(close, 4));
        Candle {
            time: t0() + Duration::minutes(minute),
            bid: ohlc,
            ask: ohlc,
            mid: ohlc,
        }
    }

    /// Serves candles the way the broker pages them.
    struct HistoryClient {
        history: HashMap<TradePair, Vec<Candle>>,
        requests: Mutex<Vec<CandleRequest>>,
    }

    #[async_trait]
    impl ApiClient for HistoryClient {
        async fn get_accounts(&self) -> Result<Vec<AccountProperties>, ApiError> {
            Ok(Vec::new())
        }

        async fn fetch_candles(&self, pair: TradePair, request: &CandleRequest) -> Result<Vec<Candle>, ApiError> {
            self.requests.lock().unwrap().push(request.clone());
            let from = request.from.unwrap_or(t0());
            let include_first = request.include_first.unwrap_or(true);
            let page = self.history[&pair]
                .iter()
                .filter(|c| if include_first { c.time >= from } else { c.time > from })
                .filter(|c| request.to.is_none_or(|to| c.time < to))
                .take(request.count.unwrap_or(usize::MAX))
                .copied()
                .collect();
            Ok(page)
        }

        async fn get_open_trades(&self, _account_id: &str) -> Result<Vec<TradeResponse>, ApiError> {
            Ok(Vec::new())
        }

        async fn create_market_order(&self, _: &str, _: TradePair, _: Decimal) -> Result<OrderFillTransaction, ApiError> {
            Err(ApiError::InvalidData("read only".to_string()))
        }

        async fn close_trade(&self, _: &str, _: &str) -> Result<OrderFillTransaction, ApiError> {
            Err(ApiError::InvalidData("read only".to_string()))
        }
    }

    fn settings(pairs: Vec<TradePair>, window_size: usize, page_size: usize) -> SimulationSettings {
        SimulationSettings {
            pairs,
            window_size,
            page_size,
            ..SimulationSettings::default()
        }
    }

    fn source(history: HashMap<TradePair, Vec<Candle>>, settings: SimulationSettings) -> (SimulationPriceSource, Arc<HistoryClient>) {
        let client = Arc::new(HistoryClient { history, requests: Mutex::new(Vec::new()) });
        let source = SimulationPriceSource::new(client.clone(), settings, t0(), t0() + Duration::hours(1)).quiet();
        (source, client)
    }

    #[tokio::test]
    async fn pages_history_without_duplicates() {
        let candles: Vec<Candle> = (0..7).map(|m| candle(m, 13000 + m)).collect();
        let (mut source, client) = source(
            HashMap::from([(TradePair::GbpUsd, candles)]),
            settings(vec![TradePair::GbpUsd], 3, 2),
        );
        source.initialize().await.unwrap();

        assert_eq!(source.history[&TradePair::GbpUsd].len(), 7);
        let requests = client.requests.lock().unwrap().clone();
        assert_eq!(requests[0].include_first, Some(true));
        assert_eq!(requests[0].count, Some(2));
        assert!(requests[1..].iter().all(|r| r.include_first == Some(false)));
    }

    #[tokio::test]
    async fn cursors_follow_the_simulated_clock() {
        // EUR/USD skips minute 4, so its cursor waits one tick.
        let gbp: Vec<Candle> = (0..6).map(|m| candle(m, 13000 + m)).collect();
        let eur: Vec<Candle> = [0, 1, 2, 3, 5].into_iter().map(|m| candle(m, 11000 + m)).collect();
        let (mut source, _) = source(
            HashMap::from([(TradePair::GbpUsd, gbp), (TradePair::EurUsd, eur)]),
            settings(vec![TradePair::GbpUsd, TradePair::EurUsd], 3, 100),
        );

        assert!(matches!(source.next_price().await, Err(PricerError::NotInitialized)));
        source.initialize().await.unwrap();

        let mut ticks = Vec::new();
        while let Some(material) = source.next_price().await.unwrap() {
            let gbp_close = material.price(TradePair::GbpUsd).unwrap().bid;
            let eur_close = material.price(TradePair::EurUsd).unwrap().bid;
            ticks.push(((material.time - t0()).num_minutes(), gbp_close, eur_close));
        }

        assert_eq!(
            ticks,
            vec![
                (2, Decimal::new(13002, 4), Decimal::new(11002, 4)),
                (3, Decimal::new(13003, 4), Decimal::new(11003, 4)),
                (4, Decimal::new(13004, 4), Decimal::new(11003, 4)),
            ]
        );
        assert!(source.next_price().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn short_history_is_rejected() {
        let (mut source, _) = source(
            HashMap::from([(TradePair::GbpUsd, vec![candle(0, 13000)])]),
            settings(vec![TradePair::GbpUsd], 3, 100),
        );
        let result = source.initialize().await;
        assert!(matches!(
            result,
            Err(PricerError::InsufficientHistory { available: 1, required: 3, .. })
        ));
    }
}
