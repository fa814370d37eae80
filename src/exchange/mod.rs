#![allow(dead_code)]
pub mod rest_gateway;

pub use rest_gateway::RestGateway;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::{ExternalPosition, LotSizeFilter, Order, OrderRequest};

/// One implementation per supported venue (e.g. "bitunix", "bybit"). The
/// Strategy is oblivious to which venue it talks to — it only sees this trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// `None` signals a transient failure (timeout, bad response), not a hard error.
    async fn get_ticker(&self, symbol: &str) -> Option<Decimal>;

    /// May return an empty vec on error.
    async fn get_candles(&self, symbol: &str, interval: &str, limit: u32) -> Vec<crate::types::Candle>;

    /// `None` signals the order was rejected or the call failed.
    async fn place_order(&self, request: OrderRequest) -> Option<Order>;

    /// Positions as the venue sees them, for reconciliation only.
    async fn get_open_positions(&self, symbol: &str) -> Vec<ExternalPosition>;

    /// Safe defaults are returned if the venue response is missing.
    async fn get_lot_size_filter(&self, symbol: &str) -> LotSizeFilter;

    async fn get_account_balance(&self) -> Option<Decimal>;

    fn round_quantity(&self, qty: Decimal, filter: &LotSizeFilter) -> Decimal {
        round_quantity(qty, filter)
    }
}

/// `rounded = clamp(round(qty / step) * step, min_qty, max_qty)`, then rounded
/// to the decimal precision implied by `step_size`'s own precision.
pub fn round_quantity(qty: Decimal, filter: &LotSizeFilter) -> Decimal {
    let step = filter.step_size;
    if step.is_zero() {
        return qty.clamp(filter.min_qty, filter.max_qty);
    }
    let steps = (qty / step).round();
    let rounded = (steps * step).clamp(filter.min_qty, filter.max_qty);
    rounded.round_dp(step.scale())
}

/// Selects a concrete gateway by the bot config's `exchange` field.
pub fn build_gateway(
    exchange: &str,
    base_url: String,
    api_key: String,
    api_secret: String,
) -> Box<dyn ExchangeGateway> {
    match exchange {
        // All currently supported venues share the same signed-REST shape;
        // the venue name only changes the base URL and header conventions.
        _ => Box::new(RestGateway::new(base_url, api_key, api_secret)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> LotSizeFilter {
        LotSizeFilter {
            min_qty: Decimal::new(1, 3),
            max_qty: Decimal::from(100),
            step_size: Decimal::new(1, 3),
        }
    }

    #[test]
    fn round_quantity_never_goes_below_min_qty() {
        let f = filter();
        let rounded = round_quantity(Decimal::ZERO, &f);
        assert_eq!(rounded, f.min_qty);
    }

    #[test]
    fn round_quantity_never_exceeds_max_qty() {
        let f = filter();
        let rounded = round_quantity(Decimal::from(1000), &f);
        assert_eq!(rounded, f.max_qty);
    }

    #[test]
    fn round_quantity_snaps_to_the_nearest_step() {
        let f = LotSizeFilter {
            min_qty: Decimal::new(1, 2),
            max_qty: Decimal::from(100),
            step_size: Decimal::new(1, 2), // 0.01
        };
        let rounded = round_quantity(Decimal::new(12347, 4), &f); // 1.2347
        assert_eq!(rounded, Decimal::new(123, 2)); // 1.23
    }
}
