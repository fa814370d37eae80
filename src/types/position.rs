use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn is_long(&self) -> bool {
        matches!(self, Self::Long)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

/// Reason a position was exited, checked in this priority order by the strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeExitReason {
    Target,
    StopLoss,
    TrailingStop,
    Manual,
    BotStopped,
}

impl TradeExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Target => "TARGET",
            Self::StopLoss => "STOP_LOSS",
            Self::TrailingStop => "TRAILING_STOP",
            Self::Manual => "MANUAL",
            Self::BotStopped => "BOT_STOPPED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub bot_id: String,
    pub user_id: String,
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub target_price: Decimal,
    pub stop_loss: Decimal,
    pub trailing_stop: Option<Decimal>,
    pub status: PositionStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub atr_at_entry: Decimal,
    pub entry_fee: Decimal,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        bot_id: String,
        user_id: String,
        symbol: String,
        side: PositionSide,
        entry_price: Decimal,
        quantity: Decimal,
        target_price: Decimal,
        stop_loss: Decimal,
        atr_at_entry: Decimal,
        entry_fee: Decimal,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            bot_id,
            user_id,
            symbol,
            side,
            entry_price,
            quantity,
            target_price,
            stop_loss,
            trailing_stop: None,
            status: PositionStatus::Open,
            opened_at,
            closed_at: None,
            atr_at_entry,
            entry_fee,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }
}

/// Written once per position close. `pnl` intentionally reconstructs a "gross-like"
/// figure by adding both fees back onto `net_pnl` rather than recomputing
/// `(exit - entry) * qty` directly — preserved from the source system as specified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub position_id: String,
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub quantity: Decimal,
    pub entry_fee: Decimal,
    pub exit_fee: Decimal,
    pub pnl: Decimal,
    pub net_pnl: Decimal,
    pub pnl_pct: Decimal,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub duration_min: i64,
    pub exit_reason: TradeExitReason,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn new_position_starts_open_with_no_trailing_stop() {
        let pos = Position::new(
            "p1".into(),
            "bot1".into(),
            "user1".into(),
            "BTCUSDT".into(),
            PositionSide::Long,
            dec!(100),
            dec!(1),
            dec!(105),
            dec!(95),
            dec!(2),
            dec!(0),
            ts(0),
        );
        assert!(pos.is_open());
        assert!(pos.trailing_stop.is_none());
        assert!(pos.closed_at.is_none());
    }
}
