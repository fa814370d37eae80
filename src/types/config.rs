use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a bot, persisted on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BotStatus {
    Created,
    Running,
    Stopped,
    /// Reserved; the worker never assigns this itself but preserves it faithfully
    /// if a store record already holds it, treating it like any non-terminal status.
    Paused,
    Error,
}

impl BotStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionStatus {
    Active,
    Inactive,
    Revoked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConnection {
    pub user_id: String,
    pub exchange: String,
    pub api_key: String,
    pub api_secret: String,
    pub status: ConnectionStatus,
}

/// One `(atr_multiplier, budget_percentage)` sizing rung. The governing list must be
/// sorted descending by `atr_multiplier`; `BotConfig::validate` enforces this.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizingLevel {
    pub atr_multiplier: Decimal,
    pub budget_percentage: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtrParams {
    pub period: usize,
    pub entry_multiplier: Decimal,
    pub target_multiplier: Decimal,
    pub stop_multiplier: Decimal,
}

impl Default for AtrParams {
    fn default() -> Self {
        Self {
            period: 14,
            entry_multiplier: dec!(1.0),
            target_multiplier: dec!(1.0),
            stop_multiplier: dec!(1.5),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailingStopParams {
    pub enabled: bool,
    pub activation_multiplier: Decimal,
    pub trail_multiplier: Decimal,
}

impl Default for TrailingStopParams {
    fn default() -> Self {
        Self {
            enabled: false,
            activation_multiplier: dec!(0.5),
            trail_multiplier: dec!(0.4),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeParams {
    pub taker_fee: Decimal,
}

impl Default for FeeParams {
    fn default() -> Self {
        Self {
            taker_fee: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetParams {
    pub total_budget: Decimal,
    pub max_position_pct: Decimal,
    pub leverage: Decimal,
    pub sizing_levels: Vec<SizingLevel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub bot_id: String,
    pub user_id: String,
    pub exchange: String,
    pub symbol: String,
    pub timeframe: String,
    pub update_interval_secs: u64,
    pub config_check_interval_secs: u64,
    pub atr: AtrParams,
    pub budget: BudgetParams,
    pub trailing_stop: TrailingStopParams,
    pub fees: FeeParams,
    /// Re-read by the worker's periodic config check; a remote `STOPPED`
    /// here requests cooperative shutdown.
    #[serde(default = "default_bot_status")]
    pub status: BotStatus,
}

fn default_bot_status() -> BotStatus {
    BotStatus::Created
}

impl BotConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.budget.leverage < Decimal::ONE {
            errors.push("leverage must be >= 1".to_string());
        }
        if self.fees.taker_fee < Decimal::ZERO || self.fees.taker_fee > dec!(0.01) {
            errors.push("taker_fee must be within [0, 0.01]".to_string());
        }
        if self.budget.sizing_levels.is_empty() {
            errors.push("at least one sizing level is required".to_string());
        }
        let mut sorted = self.budget.sizing_levels.clone();
        sorted.sort_by(|a, b| b.atr_multiplier.cmp(&a.atr_multiplier));
        if sorted != self.budget.sizing_levels {
            errors.push("sizing levels must be sorted descending by atr_multiplier".to_string());
        }
        if self.atr.period == 0 {
            errors.push("atr period must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BotPerformance {
    pub total_realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub trades_today: u64,
    pub win_rate: Decimal,
}
