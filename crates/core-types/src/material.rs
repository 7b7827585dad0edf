use crate::enums::TradePair;
use crate::error::CoreError;
use crate::structs::{Candle, Ohlc, Price};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

/// A view over the most recent candles of one instrument.
///
/// Windows share the underlying history, so cloning a material per tick
/// does not copy candles.
#[derive(Debug, Clone)]
pub struct CandleWindow {
    candles: Arc<Vec<Candle>>,
    range: Range<usize>,
}

impl CandleWindow {
    pub fn new(candles: Arc<Vec<Candle>>, range: Range<usize>) -> Self {
        let end = range.end.min(candles.len());
        let start = range.start.min(end);
        Self {
            candles,
            range: start..end,
        }
    }

    pub fn from_candles(candles: Vec<Candle>) -> Self {
        let len = candles.len();
        Self::new(Arc::new(candles), 0..len)
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles[self.range.clone()]
    }

    pub fn last(&self) -> Option<&Candle> {
        self.as_slice().last()
    }
}

/// The priced snapshot one tick carries through the pipeline.
#[derive(Debug, Clone)]
pub struct TradeMaterial {
    pub time: DateTime<Utc>,
    windows: HashMap<TradePair, CandleWindow>,
}

impl TradeMaterial {
    pub fn new(time: DateTime<Utc>, windows: HashMap<TradePair, CandleWindow>) -> Self {
        Self { time, windows }
    }

    /// Builds a material holding a single flat candle per pair.
    pub fn from_prices(time: DateTime<Utc>, prices: impl IntoIterator<Item = (TradePair, Price)>) -> Self {
        let windows = prices
            .into_iter()
            .map(|(pair, price)| {
                let mid = (price.bid + price.ask) / rust_decimal::Decimal::TWO;
                let candle = Candle {
                    time,
                    bid: Ohlc::flat(price.bid),
                    ask: Ohlc::flat(price.ask),
                    mid: Ohlc::flat(mid),
                };
                (pair, CandleWindow::from_candles(vec![candle]))
            })
            .collect();
        Self { time, windows }
    }

    pub fn pairs(&self) -> impl Iterator<Item = TradePair> + '_ {
        self.windows.keys().copied()
    }

    pub fn candles(&self, pair: TradePair) -> Result<&[Candle], CoreError> {
        self.windows
            .get(&pair)
            .map(CandleWindow::as_slice)
            .ok_or(CoreError::MissingInstrument(pair))
    }

    /// Current price: the close of the latest bid and ask candles.
    pub fn price(&self, pair: TradePair) -> Result<Price, CoreError> {
        let last = self
            .candles(pair)?
            .last()
            .ok_or(CoreError::MissingInstrument(pair))?;
        Ok(Price::new(last.bid.close, last.ask.close))
    }

    /// Every priced instrument in this snapshot.
    pub fn prices(&self) -> HashMap<TradePair, Price> {
        self.windows
            .iter()
            .filter_map(|(pair, window)| {
                window
                    .last()
                    .map(|c| (*pair, Price::new(c.bid.close, c.ask.close)))
            })
            .collect()
    }

    /// Collapses the last `length` mid candles into one bar.
    pub fn frame(&self, pair: TradePair, length: usize) -> Result<Ohlc, CoreError> {
        let candles = self.candles(pair)?;
        if length == 0 || candles.len() < length {
            return Err(CoreError::InsufficientCandles {
                pair,
                required: length,
                available: candles.len(),
            });
        }
        let frame = &candles[candles.len() - length..];
        let mut high = frame[0].mid.high;
        let mut low = frame[0].mid.low;
        for candle in &frame[1..] {
            high = high.max(candle.mid.high);
            low = low.min(candle.mid.low);
        }
        Ok(Ohlc {
            open: frame[0].mid.open,
            high,
            low,
            close: frame[length - 1].mid.close,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn candle(minute: u32, o: rust_decimal::Decimal, h: rust_decimal::Decimal, l: rust_decimal::Decimal, c: rust_decimal::Decimal) -> Candle {
        let mid = Ohlc { open: o, high: h, low: l, close: c };
        Candle {
            time: Utc.with_ymd_and_hms(2024, 1, 8, 0, minute, 0).unwrap(),
            bid: mid,
            ask: mid,
            mid,
        }
    }

    #[test]
    fn frame_takes_extremes_of_the_tail() {
        let candles = vec![
            candle(0, dec!(1.0), dec!(9.0), dec!(0.1), dec!(1.0)),
            candle(1, dec!(1.1), dec!(1.5), dec!(1.0), dec!(1.2)),
            candle(2, dec!(1.2), dec!(1.8), dec!(0.9), dec!(1.3)),
            candle(3, dec!(1.3), dec!(1.4), dec!(1.1), dec!(1.25)),
        ];
        let time = candles[3].time;
        let material = TradeMaterial::new(
            time,
            HashMap::from([(TradePair::GbpUsd, CandleWindow::from_candles(candles))]),
        );

        let frame = material.frame(TradePair::GbpUsd, 3).unwrap();
        assert_eq!(frame.open, dec!(1.1));
        assert_eq!(frame.high, dec!(1.8));
        assert_eq!(frame.low, dec!(0.9));
        assert_eq!(frame.close, dec!(1.25));

        assert!(matches!(
            material.frame(TradePair::GbpUsd, 5),
            Err(CoreError::InsufficientCandles { available: 4, .. })
        ));
        assert_eq!(
            material.price(TradePair::EurUsd),
            Err(CoreError::MissingInstrument(TradePair::EurUsd))
        );
    }
}
