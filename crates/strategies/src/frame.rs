use crate::error::StrategyError;
use crate::{OrderAction, Strategy};
use configuration::FrameParams;
use core_types::{profit_pips, OpenOrder, TradeDirection, TradeMaterial, TradePair};
use rust_decimal::Decimal;

/// Frame breakout strategy.
///
/// Enters when the short frame makes a new extreme of the long frame and
/// closes at that extreme, provided the short frame range clears the gap
/// threshold plus the spread. Exits by take-profit bands that loosen with
/// the age of the position, or by stop loss. Averages down while neither
/// triggers.
pub struct FrameStrategy {
    params: FrameParams,
    direction: TradeDirection,
    units: Decimal,
}

impl FrameStrategy {
    pub fn new(
        params: FrameParams,
        direction: TradeDirection,
        units: Decimal,
    ) -> Result<Self, StrategyError> {
        if params.small_frame_length == 0 || params.small_frame_length > params.large_frame_length {
            return Err(StrategyError::InvalidParameters(
                "small frame must be non-empty and no longer than the large frame".to_string(),
            ));
        }
        if units <= Decimal::ZERO {
            return Err(StrategyError::InvalidParameters(
                "units must be positive".to_string(),
            ));
        }
        if !(params.time_for_profit_1 <= params.time_for_profit_2
            && params.time_for_profit_2 <= params.time_for_profit_3)
        {
            return Err(StrategyError::InvalidParameters(
                "take-profit times must be ascending".to_string(),
            ));
        }
        Ok(Self {
            params,
            direction,
            units,
        })
    }

    fn create(&self, pair: TradePair, direction: TradeDirection) -> OrderAction {
        OrderAction::Create {
            pair,
            units: self.units,
            direction,
        }
    }

    fn take_profit(&self, trade_secs: i64, total_pips: Decimal) -> bool {
        let p = &self.params;
        let (t1, t2, t3) = (
            p.time_for_profit_1 * 60,
            p.time_for_profit_2 * 60,
            p.time_for_profit_3 * 60,
        );
        (trade_secs <= t1 && total_pips >= p.pips_for_profit_1)
            || (t1 < trade_secs && trade_secs <= t2 && total_pips >= p.pips_for_profit_2)
            || (t2 < trade_secs && trade_secs <= t3 && total_pips >= p.pips_for_profit_3)
            || (t3 < trade_secs && total_pips >= Decimal::ZERO)
    }
}

impl Strategy for FrameStrategy {
    fn open(&self, material: &TradeMaterial, pair: TradePair) -> Result<Vec<OrderAction>, StrategyError> {
        let price = material.price(pair)?;
        let small = material.frame(pair, self.params.small_frame_length)?;
        let large = material.frame(pair, self.params.large_frame_length)?;

        let gap = self.params.pips_gap_for_create_order * pair.pip_size() + price.spread();
        if small.high - small.low <= gap {
            return Ok(Vec::new());
        }

        let breakout = match self.direction {
            TradeDirection::Long => {
                small.high == large.high && small.low > large.low && small.low == small.close
            }
            TradeDirection::Short => {
                small.low == large.low && small.high < large.high && small.high == small.close
            }
        };

        if breakout {
            tracing::debug!(%pair, direction = %self.direction, "frame breakout");
            Ok(vec![self.create(pair, self.direction)])
        } else {
            Ok(Vec::new())
        }
    }

    fn manage(
        &self,
        material: &TradeMaterial,
        open_orders: &[OpenOrder],
        pair: TradePair,
    ) -> Result<Vec<OrderAction>, StrategyError> {
        let Some(first) = open_orders.first() else {
            return Ok(Vec::new());
        };
        let price = material.price(pair)?;
        let pip = pair.pip_size();

        let mut initial = first;
        let mut last = first;
        let mut total_pips = Decimal::ZERO;
        for open in open_orders {
            if open.order.time_at_open < initial.order.time_at_open {
                initial = open;
            }
            if open.order.time_at_open > last.order.time_at_open {
                last = open;
            }
            total_pips += profit_pips(pair, open.order.direction, open.order.price_at_open, &price);
        }

        let trade_secs = (material.time - initial.order.time_at_open).num_seconds();
        let stop_loss = total_pips < self.params.pips_for_stop_loss;

        if stop_loss || self.take_profit(trade_secs, total_pips) {
            tracing::debug!(%pair, %total_pips, trade_secs, stop_loss, "closing frame position");
            return Ok(open_orders
                .iter()
                .map(|open| OrderAction::Close(open.order_id()))
                .collect());
        }

        let last_pips = profit_pips(pair, last.order.direction, last.order.price_at_open, &price);
        if last_pips < self.params.pips_for_additional_order - price.spread() / pip {
            return Ok(vec![self.create(pair, last.order.direction)]);
        }

        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use core_types::{Candle, CandleWindow, CreatedOrder, Ohlc, OrderId, Price};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    const PAIR: TradePair = TradePair::GbpUsd;

    fn candle(minute: i64, o: Decimal, h: Decimal, l: Decimal, c: Decimal) -> Candle {
        let mid = Ohlc { open: o, high: h, low: l, close: c };
        let shift = |ohlc: Ohlc, by: Decimal| Ohlc {
            open: ohlc.open + by,
            high: ohlc.high + by,
            low: ohlc.low + by,
            close: ohlc.close + by,
        };
        Candle {
            time: Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap() + Duration::minutes(minute),
            bid: shift(mid, dec!(-0.0001)),
            ask: shift(mid, dec!(0.0001)),
            mid,
        }
    }

    fn params() -> FrameParams {
        FrameParams {
            small_frame_length: 2,
            large_frame_length: 4,
            ..FrameParams::default()
        }
    }

    fn breakout_material() -> TradeMaterial {
        let candles = vec![
            candle(0, dec!(1.3000), dec!(1.3010), dec!(1.2950), dec!(1.3000)),
            candle(1, dec!(1.3000), dec!(1.3020), dec!(1.2990), dec!(1.3000)),
            candle(2, dec!(1.3010), dec!(1.3040), dec!(1.3010), dec!(1.3010)),
            candle(3, dec!(1.3010), dec!(1.3030), dec!(1.3005), dec!(1.3005)),
        ];
        let time = candles[3].time;
        TradeMaterial::new(time, HashMap::from([(PAIR, CandleWindow::from_candles(candles))]))
    }

    fn long_order(id: u64, minutes_ago: i64, price_at_open: Decimal, now: chrono::DateTime<Utc>) -> OpenOrder {
        OpenOrder {
            order: CreatedOrder {
                order_id: OrderId(id),
                pair: PAIR,
                direction: TradeDirection::Long,
                units: dec!(1000),
                time_at_open: now - Duration::minutes(minutes_ago),
                price_at_open,
            },
            unrealized_profit: Decimal::ZERO,
        }
    }

    fn priced(bid: Decimal) -> TradeMaterial {
        let now = Utc.with_ymd_and_hms(2024, 1, 8, 12, 0, 0).unwrap();
        TradeMaterial::from_prices(now, [(PAIR, Price::new(bid, bid + dec!(0.0002)))])
    }

    #[test]
    fn long_breakout_opens_one_order() {
        let strategy = FrameStrategy::new(params(), TradeDirection::Long, dec!(1000)).unwrap();
        let actions = strategy.open(&breakout_material(), PAIR).unwrap();
        assert_eq!(
            actions,
            vec![OrderAction::Create { pair: PAIR, units: dec!(1000), direction: TradeDirection::Long }]
        );

        let short = FrameStrategy::new(params(), TradeDirection::Short, dec!(1000)).unwrap();
        assert!(short.open(&breakout_material(), PAIR).unwrap().is_empty());
    }

    #[test]
    fn narrow_frame_does_not_clear_the_gap() {
        let wide_gap = FrameParams { pips_gap_for_create_order: dec!(40), ..params() };
        let strategy = FrameStrategy::new(wide_gap, TradeDirection::Long, dec!(1000)).unwrap();
        assert!(strategy.open(&breakout_material(), PAIR).unwrap().is_empty());
    }

    #[test]
    fn warm_up_gap_and_missing_pair_are_told_apart() {
        let strategy = FrameStrategy::new(FrameParams::default(), TradeDirection::Long, dec!(1000)).unwrap();
        let short_history = strategy.open(&breakout_material(), PAIR).unwrap_err();
        assert!(!short_history.is_fatal());

        let missing = strategy.open(&breakout_material(), TradePair::EurUsd).unwrap_err();
        assert!(missing.is_fatal());
    }

    #[test]
    fn early_profit_above_first_band_closes_everything() {
        let strategy = FrameStrategy::new(params(), TradeDirection::Long, dec!(1000)).unwrap();
        let material = priced(dec!(1.3025));
        let orders = vec![
            long_order(0, 10, dec!(1.3000), material.time),
            long_order(1, 5, dec!(1.3020), material.time),
        ];
        // 25 + 5 pips within the first 40 minutes.
        let actions = strategy.manage(&material, &orders, PAIR).unwrap();
        assert_eq!(actions, vec![OrderAction::Close(OrderId(0)), OrderAction::Close(OrderId(1))]);
    }

    #[test]
    fn stop_loss_closes_everything() {
        let strategy = FrameStrategy::new(params(), TradeDirection::Long, dec!(1000)).unwrap();
        let material = priced(dec!(1.2850));
        let orders = vec![long_order(3, 10, dec!(1.3000), material.time)];
        let actions = strategy.manage(&material, &orders, PAIR).unwrap();
        assert_eq!(actions, vec![OrderAction::Close(OrderId(3))]);
    }

    #[test]
    fn late_position_closes_at_break_even() {
        let strategy = FrameStrategy::new(params(), TradeDirection::Long, dec!(1000)).unwrap();
        let material = priced(dec!(1.3001));
        let orders = vec![long_order(4, 90, dec!(1.3000), material.time)];
        let actions = strategy.manage(&material, &orders, PAIR).unwrap();
        assert_eq!(actions, vec![OrderAction::Close(OrderId(4))]);
    }

    #[test]
    fn losing_latest_order_adds_to_the_position() {
        let strategy = FrameStrategy::new(params(), TradeDirection::Long, dec!(1000)).unwrap();
        let material = priced(dec!(1.2992));
        let orders = vec![long_order(5, 10, dec!(1.3000), material.time)];
        // -8 pips is below -5 minus the 2 pip spread.
        let actions = strategy.manage(&material, &orders, PAIR).unwrap();
        assert_eq!(
            actions,
            vec![OrderAction::Create { pair: PAIR, units: dec!(1000), direction: TradeDirection::Long }]
        );

        let holding = priced(dec!(1.2997));
        let orders = vec![long_order(5, 10, dec!(1.3000), holding.time)];
        assert!(strategy.manage(&holding, &orders, PAIR).unwrap().is_empty());
    }

    #[test]
    fn rejects_inverted_frames() {
        let inverted = FrameParams { small_frame_length: 90, ..FrameParams::default() };
        assert!(FrameStrategy::new(inverted, TradeDirection::Long, dec!(1000)).is_err());
    }
}
