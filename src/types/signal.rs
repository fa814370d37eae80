use rust_decimal::Decimal;

/// An ephemeral long-entry intent, consumed by entry execution or discarded the same tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub trigger_price: Decimal,
    pub quantity: Decimal,
    pub target: Decimal,
    pub stop: Decimal,
    pub atr_at_signal: Decimal,
    pub atr_drop_size: Decimal,
}
