use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order side on the exchange, distinct from a position's LONG/SHORT direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

/// Whether an order opens new exposure or reduces an existing position.
/// `Close` orders are always reduce-only per the core's market-in/market-out contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    Open,
    Close,
}

/// An outbound order request. The core only ever issues reduce-only market orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub trade_side: TradeSide,
    pub reduce_only: bool,
    pub client_order_id: String,
}

impl OrderRequest {
    pub fn open(symbol: impl Into<String>, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            trade_side: TradeSide::Open,
            reduce_only: false,
            client_order_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn close(symbol: impl Into<String>, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            trade_side: TradeSide::Close,
            reduce_only: true,
            client_order_id: Uuid::new_v4().to_string(),
        }
    }
}

/// A filled order as reported back by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub fill_price: Decimal,
    pub filled_at: DateTime<Utc>,
}

/// Exchange-supplied quantity constraints for an instrument.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LotSizeFilter {
    pub min_qty: Decimal,
    pub max_qty: Decimal,
    pub step_size: Decimal,
}

impl Default for LotSizeFilter {
    fn default() -> Self {
        Self {
            min_qty: Decimal::new(1, 4),
            max_qty: Decimal::from(1_000_000),
            step_size: Decimal::new(1, 4),
        }
    }
}

/// Snapshot of a position as the venue reports it, used for reconciliation only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalPosition {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn close_orders_are_reduce_only() {
        let order = OrderRequest::close("BTCUSDT", OrderSide::Sell, dec!(1));
        assert!(order.reduce_only);
        assert_eq!(order.trade_side, TradeSide::Close);
    }

    #[test]
    fn open_orders_are_not_reduce_only() {
        let order = OrderRequest::open("BTCUSDT", OrderSide::Buy, dec!(1));
        assert!(!order.reduce_only);
        assert_eq!(order.trade_side, TradeSide::Open);
    }
}
