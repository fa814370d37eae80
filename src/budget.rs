//! Tracks allocated capital and computes per-trade sizing from ATR drop
//! magnitude and volatility, grounded on the tiered cap-sizing shape of the
//! risk manager this module replaces, but with the formula specified in full here.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::types::SizingLevel;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AllocationInfo {
    pub actual_cost: Decimal,
    pub remaining: Decimal,
    pub budget_pct: Decimal,
    pub volatility_adj: Decimal,
}

pub struct BudgetManager {
    total_budget: Decimal,
    used_budget: Decimal,
    max_position_pct: Decimal,
    leverage: Decimal,
    sizing_levels: Vec<SizingLevel>,
}

impl BudgetManager {
    pub fn new(
        total_budget: Decimal,
        max_position_pct: Decimal,
        leverage: Decimal,
        sizing_levels: Vec<SizingLevel>,
    ) -> Self {
        Self {
            total_budget,
            used_budget: Decimal::ZERO,
            max_position_pct,
            leverage,
            sizing_levels,
        }
    }

    pub fn used_budget(&self) -> Decimal {
        self.used_budget
    }

    pub fn total_budget(&self) -> Decimal {
        self.total_budget
    }

    /// First level whose `atr_multiplier <= atr_drop_size` wins (levels sorted
    /// descending); falls back to the 0.03 default if none match.
    pub fn budget_pct(&self, atr_drop_size: Decimal) -> Decimal {
        self.sizing_levels
            .iter()
            .find(|level| level.atr_multiplier <= atr_drop_size)
            .map(|level| level.budget_percentage)
            .unwrap_or(dec!(0.03))
    }

    pub fn volatility_adj(&self, atr_pct: Decimal) -> Decimal {
        if atr_pct > dec!(3.0) {
            dec!(0.7)
        } else if atr_pct > dec!(2.0) {
            dec!(0.85)
        } else {
            dec!(1.0)
        }
    }

    pub fn allocate(
        &self,
        price: Decimal,
        atr_drop_size: Decimal,
        atr_pct: Decimal,
    ) -> (Decimal, AllocationInfo) {
        let remaining = self.total_budget - self.used_budget;
        let budget_pct = self.budget_pct(atr_drop_size);
        let volatility_adj = self.volatility_adj(atr_pct);
        let pct = budget_pct * volatility_adj;
        let value = remaining * pct * self.leverage;
        let quantity = if price.is_zero() {
            Decimal::ZERO
        } else {
            value / price
        };
        let actual_cost = value / self.leverage;

        (
            quantity,
            AllocationInfo {
                actual_cost,
                remaining,
                budget_pct,
                volatility_adj,
            },
        )
    }

    pub fn can_open(&self, actual_cost: Decimal) -> Result<(), String> {
        let remaining = self.total_budget - self.used_budget;
        if actual_cost > remaining {
            return Err(format!(
                "actual_cost {actual_cost} exceeds remaining budget {remaining}"
            ));
        }
        if self.used_budget >= self.total_budget * self.max_position_pct {
            return Err(format!(
                "used_budget {} has reached max_position_pct cap {}",
                self.used_budget,
                self.total_budget * self.max_position_pct
            ));
        }
        Ok(())
    }

    pub fn reserve(&mut self, cost: Decimal) {
        self.used_budget += cost;
    }

    pub fn release(&mut self, cost: Decimal) {
        self.used_budget = (self.used_budget - cost).max(Decimal::ZERO);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels() -> Vec<SizingLevel> {
        vec![SizingLevel {
            atr_multiplier: dec!(1.0),
            budget_percentage: dec!(0.10),
        }]
    }

    #[test]
    fn allocate_matches_the_documented_formula() {
        let mgr = BudgetManager::new(dec!(1000), dec!(0.9), dec!(10), levels());
        let (qty, info) = mgr.allocate(dec!(98), dec!(1.0), dec!(1.0));
        // remaining=1000, pct=0.10*1.0=0.10, value=1000*0.10*10=1000, qty=1000/98
        assert_eq!(info.actual_cost, dec!(100));
        assert_eq!(qty, dec!(1000) / dec!(98));
    }

    #[test]
    fn budget_pct_falls_back_to_default_when_no_level_matches() {
        let mgr = BudgetManager::new(dec!(1000), dec!(0.9), dec!(10), levels());
        assert_eq!(mgr.budget_pct(dec!(0.5)), dec!(0.03));
        assert_eq!(mgr.budget_pct(dec!(1.0)), dec!(0.10));
    }

    #[test]
    fn reserve_then_release_is_idempotent() {
        let mut mgr = BudgetManager::new(dec!(1000), dec!(0.9), dec!(10), levels());
        mgr.reserve(dec!(100));
        mgr.release(dec!(100));
        assert_eq!(mgr.used_budget(), Decimal::ZERO);
    }

    #[test]
    fn release_floors_at_zero() {
        let mut mgr = BudgetManager::new(dec!(1000), dec!(0.9), dec!(10), levels());
        mgr.release(dec!(50));
        assert_eq!(mgr.used_budget(), Decimal::ZERO);
    }

    #[test]
    fn can_open_rejects_past_max_position_pct_cap() {
        let mut mgr = BudgetManager::new(dec!(1000), dec!(0.1), dec!(10), levels());
        mgr.reserve(dec!(100));
        assert!(mgr.can_open(dec!(1)).is_err());
    }

    #[test]
    fn sizing_monotonicity_larger_drop_selects_at_least_as_large_a_level() {
        let mgr = BudgetManager::new(
            dec!(1000),
            dec!(0.9),
            dec!(10),
            vec![
                SizingLevel {
                    atr_multiplier: dec!(2.0),
                    budget_percentage: dec!(0.20),
                },
                SizingLevel {
                    atr_multiplier: dec!(1.0),
                    budget_percentage: dec!(0.10),
                },
            ],
        );
        assert!(mgr.budget_pct(dec!(2.5)) >= mgr.budget_pct(dec!(1.5)));
    }
}
