//! In-memory registry of open positions: realizes PnL on close and ratchets
//! trailing stops. Exit evaluation in the strategy iterates a snapshot of this
//! registry and applies removals afterward, never mutating mid-iteration.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::indicators;
use crate::types::{Position, PositionSide, Trade, TradeExitReason};

pub struct PositionManager {
    open: Vec<Position>,
}

impl PositionManager {
    pub fn new() -> Self {
        Self { open: Vec::new() }
    }

    pub fn add(&mut self, position: Position) {
        self.open.push(position);
    }

    /// Rewrites a position's id in place once the store hands back the
    /// identity it persisted under; a no-op if `old_id` is not open.
    pub fn set_id(&mut self, old_id: &str, new_id: String) {
        if let Some(position) = self.open.iter_mut().find(|p| p.id == old_id) {
            position.id = new_id;
        }
    }

    pub fn open_positions(&self) -> &[Position] {
        &self.open
    }

    /// Closes the position matching `position_id`, computing net PnL per
    /// `indicators::profit`. `pnl` reconstructs a gross-like figure by adding
    /// both fees back onto `net_pnl` rather than `(exit - entry) * qty` — this
    /// mirrors the documented source behavior and is intentionally preserved.
    pub fn close(
        &mut self,
        position_id: &str,
        exit_price: Decimal,
        exit_fee_rate: Decimal,
        reason: TradeExitReason,
        now: DateTime<Utc>,
    ) -> Option<Trade> {
        let idx = self.open.iter().position(|p| p.id == position_id)?;
        let mut position = self.open.remove(idx);

        let is_long = position.side.is_long();
        let net_pnl = indicators::profit(
            position.entry_price,
            exit_price,
            position.quantity,
            position.entry_fee,
            exit_fee_rate,
            is_long,
        );
        let exit_fee = exit_price * position.quantity * exit_fee_rate;
        let pnl = net_pnl + position.entry_fee + exit_fee;
        let pnl_pct = if position.entry_price.is_zero() {
            Decimal::ZERO
        } else {
            net_pnl / (position.entry_price * position.quantity) * Decimal::from(100)
        };

        position.closed_at = Some(now);
        let duration_min = (now - position.opened_at).num_minutes().max(0);

        Some(Trade {
            position_id: position.id.clone(),
            symbol: position.symbol.clone(),
            side: position.side,
            entry_price: position.entry_price,
            exit_price,
            quantity: position.quantity,
            entry_fee: position.entry_fee,
            exit_fee,
            pnl,
            net_pnl,
            pnl_pct,
            opened_at: position.opened_at,
            closed_at: now,
            duration_min,
            exit_reason: reason,
        })
    }

    /// Long: activates once `profit >= atr * activation_m`, candidate = `price -
    /// atr * trail_m`, adopted only if strictly higher than the current stop
    /// (ratchet up, never down). Short is the mirror image.
    pub fn update_trailing_stop(
        &mut self,
        position_id: &str,
        price: Decimal,
        atr: Decimal,
        activation_m: Decimal,
        trail_m: Decimal,
    ) {
        let Some(position) = self.open.iter_mut().find(|p| p.id == position_id) else {
            return;
        };

        match position.side {
            PositionSide::Long => {
                let profit = price - position.entry_price;
                if profit >= atr * activation_m {
                    let candidate = price - atr * trail_m;
                    if position.trailing_stop.map(|ts| candidate > ts).unwrap_or(true) {
                        position.trailing_stop = Some(candidate);
                    }
                }
            }
            PositionSide::Short => {
                let profit = position.entry_price - price;
                if profit >= atr * activation_m {
                    let candidate = price + atr * trail_m;
                    if position.trailing_stop.map(|ts| candidate < ts).unwrap_or(true) {
                        position.trailing_stop = Some(candidate);
                    }
                }
            }
        }
    }

    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        self.open
            .iter()
            .map(|p| {
                indicators::profit(
                    p.entry_price,
                    price,
                    p.quantity,
                    Decimal::ZERO,
                    Decimal::ZERO,
                    p.side.is_long(),
                )
            })
            .sum()
    }
}

impl Default for PositionManager {
    fn default() -> Self {
        Self::new()
    }
}
