//! The six error kinds the control loop distinguishes, mapped onto a single
//! `thiserror` enum. `ConfigInvalid`/`CredentialMissing` are fatal at startup;
//! the rest are caught inside the loop body and handled per-kind.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("config invalid: {0}")]
    ConfigInvalid(String),

    #[error("credential missing: {0}")]
    CredentialMissing(String),

    #[error("gateway transient failure: {0}")]
    GatewayTransient(String),

    #[error("order rejected: {0}")]
    OrderRejected(String),

    #[error("state store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl BotError {
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(self, Self::ConfigInvalid(_) | Self::CredentialMissing(_))
    }
}
