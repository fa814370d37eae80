//! The long-dip-on-ATR decision layer: consumes the candle/volatility/budget
//! machinery plus an `ExchangeGateway` to turn ticks into entry/exit intents.
//! Owns no I/O timing itself — the worker drives the cadence and calls these
//! methods in the fixed order the lifecycle spec requires.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::atr_calculator::ATRCalculator;
use crate::budget::BudgetManager;
use crate::candle_manager::CandleManager;
use crate::clock::Clock;
use crate::exchange::ExchangeGateway;
use crate::position_manager::PositionManager;
use crate::types::{
    AtrParams, FeeParams, LotSizeFilter, OrderRequest, OrderSide, Position, PositionSide, Signal,
    Trade, TradeExitReason, TrailingStopParams,
};

pub struct LongDipATR {
    symbol: String,
    leverage: Decimal,
    atr_params: AtrParams,
    trailing: TrailingStopParams,
    fees: FeeParams,
    lot_filter: LotSizeFilter,
    gateway: Arc<dyn ExchangeGateway>,
    clock: Arc<dyn Clock>,

    candles: CandleManager,
    atr: ATRCalculator,
    budget: BudgetManager,
    positions: PositionManager,
    recent_high: Option<Decimal>,
}

impl LongDipATR {
    pub async fn new(
        symbol: String,
        timeframe: &str,
        leverage: Decimal,
        atr_params: AtrParams,
        trailing: TrailingStopParams,
        fees: FeeParams,
        budget: BudgetManager,
        gateway: Arc<dyn ExchangeGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let lot_filter = gateway.get_lot_size_filter(&symbol).await;
        let period = atr_params.period;
        Self {
            symbol,
            leverage,
            atr_params,
            trailing,
            fees,
            lot_filter,
            gateway,
            clock,
            candles: CandleManager::new(timeframe),
            atr: ATRCalculator::new(period),
            budget,
            positions: PositionManager::new(),
            recent_high: None,
        }
    }

    pub fn open_positions(&self) -> &[Position] {
        self.positions.open_positions()
    }

    pub fn used_budget(&self) -> Decimal {
        self.budget.used_budget()
    }

    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        self.positions.unrealized_pnl(price)
    }

    /// Folds the tick into the candle history; on rollover, re-derives ATR
    /// from the last `period + 1` finalized candles plus the live price.
    pub fn update(&mut self, price: Decimal, now: DateTime<Utc>) {
        let finalized = self.candles.update(price, now);
        if finalized {
            let window = self.candles.get_completed(self.atr_params.period + 1);
            self.atr.recompute(window, price);
        }
        self.recent_high = Some(self.recent_high.map_or(price, |h| h.max(price)));
    }

    pub fn check_entry(&self, price: Decimal) -> Option<Signal> {
        if !self.atr.is_ready() {
            return None;
        }
        let recent_high = self.recent_high?;
        let atr = self.atr.atr()?;

        let adj_mult = self.atr.adjust_multiplier(self.atr_params.entry_multiplier);
        let trigger = atr * adj_mult;
        let drop = recent_high - price;
        if drop < trigger {
            return None;
        }

        let atr_drop_size = drop / atr;
        let atr_pct = self.atr.atr_pct().unwrap_or(Decimal::ZERO);
        let (qty, info) = self.budget.allocate(price, atr_drop_size, atr_pct);
        let rounded_qty = self.gateway.round_quantity(qty, &self.lot_filter);

        if let Err(reason) = self.budget.can_open(info.actual_cost) {
            info!("entry skipped for {}: {reason}", self.symbol);
            return None;
        }

        Some(Signal {
            trigger_price: price,
            quantity: rounded_qty,
            target: price + atr * self.atr_params.target_multiplier,
            stop: price - atr * self.atr_params.stop_multiplier,
            atr_at_signal: atr,
            atr_drop_size,
        })
    }

    pub async fn execute_entry(
        &mut self,
        signal: Signal,
        bot_id: &str,
        user_id: &str,
    ) -> Option<Position> {
        let request = OrderRequest::open(self.symbol.clone(), OrderSide::Buy, signal.quantity);
        let order = match self.gateway.place_order(request).await {
            Some(order) => order,
            None => {
                warn!("entry order rejected for {}", self.symbol);
                return None;
            }
        };

        let fill_price = order.fill_price;
        let entry_fee = order.quantity * fill_price * self.fees.taker_fee;
        let position = Position::new(
            String::new(),
            bot_id.to_string(),
            user_id.to_string(),
            self.symbol.clone(),
            PositionSide::Long,
            fill_price,
            order.quantity,
            signal.target,
            signal.stop,
            signal.atr_at_signal,
            entry_fee,
            self.clock.now(),
        );

        let cost = order.quantity * fill_price / self.leverage;
        self.budget.reserve(cost);
        self.recent_high = Some(fill_price);
        self.positions.add(position.clone());
        Some(position)
    }

    /// Evaluated in TARGET -> STOP_LOSS -> TRAILING_STOP order; first match wins.
    /// Iterates a snapshot so the strategy never mutates mid-iteration.
    pub fn check_exits(&self, price: Decimal) -> Vec<(Position, TradeExitReason)> {
        self.positions
            .open_positions()
            .iter()
            .filter_map(|pos| {
                if price >= pos.target_price {
                    Some((pos.clone(), TradeExitReason::Target))
                } else if price <= pos.stop_loss {
                    Some((pos.clone(), TradeExitReason::StopLoss))
                } else if self.trailing.enabled {
                    match pos.trailing_stop {
                        Some(ts) if price <= ts => Some((pos.clone(), TradeExitReason::TrailingStop)),
                        _ => None,
                    }
                } else {
                    None
                }
            })
            .collect()
    }

    pub async fn execute_exit(&mut self, position: &Position, price: Decimal, reason: TradeExitReason) -> Option<Trade> {
        let request = OrderRequest::close(self.symbol.clone(), OrderSide::Sell, position.quantity);
        self.gateway.place_order(request).await?;

        let trade = self.positions.close(
            &position.id,
            price,
            self.fees.taker_fee,
            reason,
            self.clock.now(),
        )?;

        let cost = position.quantity * position.entry_price / self.leverage;
        self.budget.release(cost);
        Some(trade)
    }

    pub fn update_trailing_stops(&mut self, price: Decimal) {
        if !self.trailing.enabled || !self.atr.is_ready() {
            return;
        }
        let Some(atr) = self.atr.atr() else { return };
        let ids: Vec<String> = self.positions.open_positions().iter().map(|p| p.id.clone()).collect();
        for id in ids {
            self.positions.update_trailing_stop(
                &id,
                price,
                atr,
                self.trailing.activation_multiplier,
                self.trailing.trail_multiplier,
            );
        }
    }

    /// Assigns the id the state store returned after persisting, so the
    /// in-memory registry and the durable record share the same identity.
    pub fn assign_position_id(&mut self, old_id: &str, new_id: String) {
        self.positions.set_id(old_id, new_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::exchange::MockExchangeGateway;
    use crate::types::{Candle, Order, ExternalPosition};
    use async_trait::async_trait;
    use mockall::Sequence;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    struct FakeGateway {
        fill_price: Decimal,
        reject: bool,
        calls: Mutex<u32>,
    }

    impl FakeGateway {
        fn new(fill_price: Decimal) -> Self {
            Self {
                fill_price,
                reject: false,
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl ExchangeGateway for FakeGateway {
        async fn get_ticker(&self, _symbol: &str) -> Option<Decimal> {
            Some(self.fill_price)
        }
        async fn get_candles(&self, _symbol: &str, _interval: &str, _limit: u32) -> Vec<Candle> {
            Vec::new()
        }
        async fn place_order(&self, request: OrderRequest) -> Option<Order> {
            *self.calls.lock().unwrap() += 1;
            if self.reject {
                return None;
            }
            Some(Order {
                order_id: "1".into(),
                client_order_id: request.client_order_id,
                symbol: request.symbol,
                side: request.side,
                quantity: request.quantity,
                fill_price: self.fill_price,
                filled_at: Utc::now(),
            })
        }
        async fn get_open_positions(&self, _symbol: &str) -> Vec<ExternalPosition> {
            Vec::new()
        }
        async fn get_lot_size_filter(&self, _symbol: &str) -> LotSizeFilter {
            LotSizeFilter::default()
        }
        async fn get_account_balance(&self) -> Option<Decimal> {
            None
        }
    }

    fn budget() -> BudgetManager {
        BudgetManager::new(
            dec!(1000),
            dec!(0.9),
            dec!(10),
            vec![crate::types::SizingLevel {
                atr_multiplier: dec!(1.0),
                budget_percentage: dec!(0.10),
            }],
        )
    }

    async fn strategy_with_fill(fill_price: Decimal) -> LongDipATR {
        let gateway: Arc<dyn ExchangeGateway> = Arc::new(FakeGateway::new(fill_price));
        LongDipATR::new(
            "BTCUSDT".into(),
            "1m",
            dec!(10),
            AtrParams {
                period: 3,
                entry_multiplier: dec!(1.0),
                target_multiplier: dec!(1.0),
                stop_multiplier: dec!(1.5),
            },
            TrailingStopParams {
                enabled: false,
                activation_multiplier: dec!(0.5),
                trail_multiplier: dec!(0.4),
            },
            FeeParams { taker_fee: Decimal::ZERO },
            budget(),
            gateway,
            ManualClock::new(ts(0)),
        )
        .await
    }

    fn feed_constant_tr_candles(strategy: &mut LongDipATR) {
        // Four finalized candles (rollovers at t=60,120,180,240), each with
        // constant true range 2.0 at price level 100 -> atr period 3 is ready
        // once the fourth finalizes.
        let ticks = [
            (dec!(99), 0), (dec!(101), 30),
            (dec!(99), 60), (dec!(101), 90),
            (dec!(99), 120), (dec!(101), 150),
            (dec!(99), 180), (dec!(101), 210),
            (dec!(99), 240),
        ];
        for (price, secs) in ticks {
            strategy.update(price, ts(secs));
        }
    }

    #[tokio::test]
    async fn no_signal_before_atr_is_ready() {
        let mut strategy = strategy_with_fill(dec!(100)).await;
        strategy.update(dec!(100), ts(0));
        strategy.update(dec!(101), ts(10));
        strategy.update(dec!(102), ts(20));
        assert!(strategy.check_entry(dec!(95)).is_none());
    }

    #[tokio::test]
    async fn clean_entry_emits_signal_once_drop_meets_trigger() {
        let mut strategy = strategy_with_fill(dec!(98)).await;
        feed_constant_tr_candles(&mut strategy);
        assert!(strategy.atr.is_ready());

        strategy.recent_high = Some(dec!(100));
        let signal = strategy.check_entry(dec!(98));
        assert!(signal.is_some());
        let signal = signal.unwrap();
        assert_eq!(signal.target, dec!(100));
        assert_eq!(signal.stop, dec!(95));
    }

    #[tokio::test]
    async fn execute_entry_then_target_exit_realizes_expected_pnl() {
        let mut strategy = strategy_with_fill(dec!(98)).await;
        feed_constant_tr_candles(&mut strategy);
        strategy.recent_high = Some(dec!(100));

        let signal = strategy.check_entry(dec!(98)).unwrap();
        let position = strategy.execute_entry(signal, "bot1", "user1").await.unwrap();
        assert_eq!(position.entry_price, dec!(98));

        let exits = strategy.check_exits(dec!(100));
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].1, TradeExitReason::Target);

        let trade = strategy
            .execute_exit(&exits[0].0, dec!(100), TradeExitReason::Target)
            .await
            .unwrap();
        assert_eq!(trade.net_pnl, (dec!(100) - dec!(98)) * position.quantity);
        assert_eq!(strategy.used_budget(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn rejected_entry_order_leaves_recent_high_and_budget_untouched() {
        let mut gw = FakeGateway::new(dec!(98));
        gw.reject = true;
        let gateway: Arc<dyn ExchangeGateway> = Arc::new(gw);
        let mut strategy = LongDipATR::new(
            "BTCUSDT".into(),
            "1m",
            dec!(10),
            AtrParams { period: 3, entry_multiplier: dec!(1.0), target_multiplier: dec!(1.0), stop_multiplier: dec!(1.5) },
            TrailingStopParams { enabled: false, activation_multiplier: dec!(0.5), trail_multiplier: dec!(0.4) },
            FeeParams { taker_fee: Decimal::ZERO },
            budget(),
            gateway,
            ManualClock::new(ts(0)),
        )
        .await;
        feed_constant_tr_candles(&mut strategy);
        strategy.recent_high = Some(dec!(100));
        let signal = strategy.check_entry(dec!(98)).unwrap();
        let position = strategy.execute_entry(signal, "bot1", "user1").await;
        assert!(position.is_none());
        assert_eq!(strategy.used_budget(), Decimal::ZERO);
        assert!(strategy.open_positions().is_empty());
    }

    /// Entry must place a BUY before exit ever places a SELL, and exactly
    /// once each — a call-sequencing contract a hand-written fake can't
    /// assert on as cheaply as a strict mock expectation.
    #[tokio::test]
    async fn entry_order_is_placed_before_exit_order_and_each_exactly_once() {
        let mut gateway = MockExchangeGateway::new();
        gateway
            .expect_get_lot_size_filter()
            .times(1)
            .returning(|_| LotSizeFilter::default());

        let mut seq = Sequence::new();
        gateway
            .expect_place_order()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req| req.side == OrderSide::Buy)
            .returning(|req| {
                Some(Order {
                    order_id: "1".into(),
                    client_order_id: req.client_order_id,
                    symbol: req.symbol,
                    side: req.side,
                    quantity: req.quantity,
                    fill_price: dec!(98),
                    filled_at: Utc::now(),
                })
            });
        gateway
            .expect_place_order()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req| req.side == OrderSide::Sell)
            .returning(|req| {
                Some(Order {
                    order_id: "2".into(),
                    client_order_id: req.client_order_id,
                    symbol: req.symbol,
                    side: req.side,
                    quantity: req.quantity,
                    fill_price: dec!(100),
                    filled_at: Utc::now(),
                })
            });

        let gateway: Arc<dyn ExchangeGateway> = Arc::new(gateway);
        let mut strategy = LongDipATR::new(
            "BTCUSDT".into(),
            "1m",
            dec!(10),
            AtrParams { period: 3, entry_multiplier: dec!(1.0), target_multiplier: dec!(1.0), stop_multiplier: dec!(1.5) },
            TrailingStopParams { enabled: false, activation_multiplier: dec!(0.5), trail_multiplier: dec!(0.4) },
            FeeParams { taker_fee: Decimal::ZERO },
            budget(),
            gateway,
            ManualClock::new(ts(0)),
        )
        .await;
        feed_constant_tr_candles(&mut strategy);
        strategy.recent_high = Some(dec!(100));

        let signal = strategy.check_entry(dec!(98)).unwrap();
        let position = strategy.execute_entry(signal, "bot1", "user1").await.unwrap();

        let exits = strategy.check_exits(dec!(100));
        strategy
            .execute_exit(&exits[0].0, dec!(100), exits[0].1)
            .await
            .unwrap();

        assert_eq!(position.entry_price, dec!(98));
    }
}
