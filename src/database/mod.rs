//! SQLite-backed `StateStore`, grounded on the same sqlx raw-SQL, TEXT-encoded
//! Decimal/DateTime schema idiom used throughout this codebase's persistence
//! layer, re-scoped to the bot/position/trade surface this core requires.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use crate::error::BotError;
use crate::types::{
    BotConfig, BotPerformance, BotStatus, ConnectionStatus, ExchangeConnection, Position,
    PositionSide, PositionStatus, Trade, TradeExitReason,
};

#[derive(Debug, Clone, Default)]
pub struct DailyStats {
    pub trades_count: u64,
    pub total_pnl: Decimal,
    pub win_rate: Decimal,
}

/// Partial update applied to an open position; `None` fields are left as-is.
#[derive(Debug, Clone, Default)]
pub struct PositionPatch {
    pub trailing_stop: Option<Decimal>,
}

/// Durable side of the worker's state: bot documents, exchange connections,
/// open positions, and closed trades. Implementations must be safe to share
/// across multiple workers in one process.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_bot(&self, bot_id: &str) -> Result<BotConfig, BotError>;
    async fn update_status(
        &self,
        bot_id: &str,
        status: BotStatus,
        error: Option<&str>,
    ) -> Result<(), BotError>;
    async fn send_heartbeat(&self, bot_id: &str) -> Result<(), BotError>;
    async fn update_performance(&self, bot_id: &str, metrics: &BotPerformance) -> Result<(), BotError>;

    async fn get_exchange_connection(
        &self,
        user_id: &str,
        exchange: &str,
    ) -> Result<ExchangeConnection, BotError>;

    async fn save_position(&self, position: &Position) -> Result<String, BotError>;
    async fn update_position(&self, id: &str, patch: PositionPatch) -> Result<(), BotError>;
    async fn close_position(
        &self,
        id: &str,
        exit_price: Decimal,
        reason: TradeExitReason,
    ) -> Result<(), BotError>;
    async fn get_open_positions(&self, bot_id: &str) -> Result<Vec<Position>, BotError>;

    async fn save_trade(&self, bot_id: &str, trade: &Trade) -> Result<String, BotError>;
    async fn get_bot_trades(&self, bot_id: &str, limit: u32) -> Result<Vec<Trade>, BotError>;
    async fn get_daily_stats(&self, bot_id: &str) -> Result<DailyStats, BotError>;
}

pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    pub async fn new(db_uri: &str) -> Result<Self, BotError> {
        info!("initializing state store at {db_uri}");

        let options = SqliteConnectOptions::from_str(db_uri)
            .map_err(|e| BotError::StoreUnavailable(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| BotError::StoreUnavailable(e.to_string()))?;

        let store = Self { pool };
        store.create_schema().await?;
        Ok(store)
    }

    async fn create_schema(&self) -> Result<(), BotError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bots (
                bot_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                exchange TEXT NOT NULL,
                symbol TEXT NOT NULL,
                status TEXT NOT NULL,
                error_message TEXT,
                config_json TEXT NOT NULL,
                last_heartbeat TEXT,
                total_realized_pnl TEXT NOT NULL DEFAULT '0',
                unrealized_pnl TEXT NOT NULL DEFAULT '0',
                trades_today TEXT NOT NULL DEFAULT '0',
                win_rate TEXT NOT NULL DEFAULT '0'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS exchange_connections (
                user_id TEXT NOT NULL,
                exchange TEXT NOT NULL,
                api_key TEXT NOT NULL,
                api_secret TEXT NOT NULL,
                status TEXT NOT NULL,
                PRIMARY KEY (user_id, exchange)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS positions (
                id TEXT PRIMARY KEY,
                bot_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                quantity TEXT NOT NULL,
                target_price TEXT NOT NULL,
                stop_loss TEXT NOT NULL,
                trailing_stop TEXT,
                status TEXT NOT NULL,
                opened_at TEXT NOT NULL,
                closed_at TEXT,
                atr_at_entry TEXT NOT NULL,
                entry_fee TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_positions_bot ON positions(bot_id, status)")
            .execute(&self.pool)
            .await
            .map_err(sqlx_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                bot_id TEXT NOT NULL,
                position_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                exit_price TEXT NOT NULL,
                quantity TEXT NOT NULL,
                entry_fee TEXT NOT NULL,
                exit_fee TEXT NOT NULL,
                pnl TEXT NOT NULL,
                net_pnl TEXT NOT NULL,
                pnl_pct TEXT NOT NULL,
                opened_at TEXT NOT NULL,
                closed_at TEXT NOT NULL,
                duration_min INTEGER NOT NULL,
                exit_reason TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_bot ON trades(bot_id, closed_at)")
            .execute(&self.pool)
            .await
            .map_err(sqlx_err)?;

        Ok(())
    }
}

fn sqlx_err(e: sqlx::Error) -> BotError {
    BotError::StoreUnavailable(e.to_string())
}

fn status_to_str(status: BotStatus) -> &'static str {
    match status {
        BotStatus::Created => "CREATED",
        BotStatus::Running => "RUNNING",
        BotStatus::Stopped => "STOPPED",
        BotStatus::Paused => "PAUSED",
        BotStatus::Error => "ERROR",
    }
}

fn status_from_str(s: &str) -> BotStatus {
    match s {
        "RUNNING" => BotStatus::Running,
        "STOPPED" => BotStatus::Stopped,
        "PAUSED" => BotStatus::Paused,
        "ERROR" => BotStatus::Error,
        _ => BotStatus::Created,
    }
}

fn side_to_str(side: PositionSide) -> &'static str {
    match side {
        PositionSide::Long => "LONG",
        PositionSide::Short => "SHORT",
    }
}

fn side_from_str(s: &str) -> PositionSide {
    if s == "SHORT" {
        PositionSide::Short
    } else {
        PositionSide::Long
    }
}

fn reason_to_str(reason: TradeExitReason) -> &'static str {
    reason.as_str()
}

fn reason_from_str(s: &str) -> TradeExitReason {
    match s {
        "STOP_LOSS" => TradeExitReason::StopLoss,
        "TRAILING_STOP" => TradeExitReason::TrailingStop,
        "BOT_STOPPED" => TradeExitReason::BotStopped,
        "MANUAL" => TradeExitReason::Manual,
        _ => TradeExitReason::Target,
    }
}

fn parse_decimal(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap_or(Decimal::ZERO)
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get_bot(&self, bot_id: &str) -> Result<BotConfig, BotError> {
        let row = sqlx::query("SELECT config_json, status FROM bots WHERE bot_id = ?")
            .bind(bot_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_err)?
            .ok_or_else(|| BotError::ConfigInvalid(format!("no bot document for {bot_id}")))?;

        let config_json: String = row.try_get("config_json").map_err(sqlx_err)?;
        let status: String = row.try_get("status").map_err(sqlx_err)?;
        let mut config: BotConfig = serde_json::from_str(&config_json)
            .map_err(|e| BotError::ConfigInvalid(format!("unparseable bot config: {e}")))?;
        // The `status` column is the source of truth (updated independently
        // by update_status); config_json reflects the document as seeded.
        config.status = status_from_str(&status);
        Ok(config)
    }

    async fn update_status(
        &self,
        bot_id: &str,
        status: BotStatus,
        error: Option<&str>,
    ) -> Result<(), BotError> {
        sqlx::query("UPDATE bots SET status = ?, error_message = ? WHERE bot_id = ?")
            .bind(status_to_str(status))
            .bind(error)
            .bind(bot_id)
            .execute(&self.pool)
            .await
            .map_err(sqlx_err)?;
        Ok(())
    }

    async fn send_heartbeat(&self, bot_id: &str) -> Result<(), BotError> {
        sqlx::query("UPDATE bots SET last_heartbeat = ? WHERE bot_id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(bot_id)
            .execute(&self.pool)
            .await
            .map_err(sqlx_err)?;
        Ok(())
    }

    async fn update_performance(&self, bot_id: &str, metrics: &BotPerformance) -> Result<(), BotError> {
        sqlx::query(
            "UPDATE bots SET total_realized_pnl = ?, unrealized_pnl = ?, trades_today = ?, win_rate = ? WHERE bot_id = ?",
        )
        .bind(metrics.total_realized_pnl.to_string())
        .bind(metrics.unrealized_pnl.to_string())
        .bind(metrics.trades_today.to_string())
        .bind(metrics.win_rate.to_string())
        .bind(bot_id)
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;
        Ok(())
    }

    async fn get_exchange_connection(
        &self,
        user_id: &str,
        exchange: &str,
    ) -> Result<ExchangeConnection, BotError> {
        let row = sqlx::query(
            "SELECT api_key, api_secret, status FROM exchange_connections WHERE user_id = ? AND exchange = ? AND status = 'ACTIVE'",
        )
        .bind(user_id)
        .bind(exchange)
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_err)?
        .ok_or_else(|| {
            BotError::CredentialMissing(format!(
                "no ACTIVE connection for user {user_id} on {exchange}"
            ))
        })?;

        Ok(ExchangeConnection {
            user_id: user_id.to_string(),
            exchange: exchange.to_string(),
            api_key: row.try_get("api_key").map_err(sqlx_err)?,
            api_secret: row.try_get("api_secret").map_err(sqlx_err)?,
            status: ConnectionStatus::Active,
        })
    }

    async fn save_position(&self, position: &Position) -> Result<String, BotError> {
        let id = if position.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            position.id.clone()
        };

        sqlx::query(
            r#"
            INSERT INTO positions (
                id, bot_id, user_id, symbol, side, entry_price, quantity,
                target_price, stop_loss, trailing_stop, status, opened_at,
                closed_at, atr_at_entry, entry_fee
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&position.bot_id)
        .bind(&position.user_id)
        .bind(&position.symbol)
        .bind(side_to_str(position.side))
        .bind(position.entry_price.to_string())
        .bind(position.quantity.to_string())
        .bind(position.target_price.to_string())
        .bind(position.stop_loss.to_string())
        .bind(position.trailing_stop.map(|d| d.to_string()))
        .bind("OPEN")
        .bind(position.opened_at.to_rfc3339())
        .bind(position.closed_at.map(|d| d.to_rfc3339()))
        .bind(position.atr_at_entry.to_string())
        .bind(position.entry_fee.to_string())
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;

        Ok(id)
    }

    async fn update_position(&self, id: &str, patch: PositionPatch) -> Result<(), BotError> {
        if let Some(trailing_stop) = patch.trailing_stop {
            sqlx::query("UPDATE positions SET trailing_stop = ? WHERE id = ?")
                .bind(trailing_stop.to_string())
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(sqlx_err)?;
        }
        Ok(())
    }

    async fn close_position(
        &self,
        id: &str,
        exit_price: Decimal,
        reason: TradeExitReason,
    ) -> Result<(), BotError> {
        sqlx::query("UPDATE positions SET status = 'CLOSED', closed_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(sqlx_err)?;
        // exit_price/reason are persisted on the Trade row via save_trade; the
        // position row only needs to flip to CLOSED so get_open_positions excludes it.
        let _ = (exit_price, reason);
        Ok(())
    }

    async fn get_open_positions(&self, bot_id: &str) -> Result<Vec<Position>, BotError> {
        let rows = sqlx::query("SELECT * FROM positions WHERE bot_id = ? AND status = 'OPEN'")
            .bind(bot_id)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_err)?;

        rows.into_iter()
            .map(|row| {
                let trailing_stop: Option<String> = row.try_get("trailing_stop").map_err(sqlx_err)?;
                let closed_at: Option<String> = row.try_get("closed_at").map_err(sqlx_err)?;
                Ok(Position {
                    id: row.try_get("id").map_err(sqlx_err)?,
                    bot_id: row.try_get("bot_id").map_err(sqlx_err)?,
                    user_id: row.try_get("user_id").map_err(sqlx_err)?,
                    symbol: row.try_get("symbol").map_err(sqlx_err)?,
                    side: side_from_str(&row.try_get::<String, _>("side").map_err(sqlx_err)?),
                    entry_price: parse_decimal(&row.try_get::<String, _>("entry_price").map_err(sqlx_err)?),
                    quantity: parse_decimal(&row.try_get::<String, _>("quantity").map_err(sqlx_err)?),
                    target_price: parse_decimal(&row.try_get::<String, _>("target_price").map_err(sqlx_err)?),
                    stop_loss: parse_decimal(&row.try_get::<String, _>("stop_loss").map_err(sqlx_err)?),
                    trailing_stop: trailing_stop.map(|s| parse_decimal(&s)),
                    status: PositionStatus::Open,
                    opened_at: parse_datetime(&row.try_get::<String, _>("opened_at").map_err(sqlx_err)?),
                    closed_at: closed_at.map(|s| parse_datetime(&s)),
                    atr_at_entry: parse_decimal(&row.try_get::<String, _>("atr_at_entry").map_err(sqlx_err)?),
                    entry_fee: parse_decimal(&row.try_get::<String, _>("entry_fee").map_err(sqlx_err)?),
                })
            })
            .collect()
    }

    async fn save_trade(&self, bot_id: &str, trade: &Trade) -> Result<String, BotError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO trades (
                id, bot_id, position_id, symbol, side, entry_price, exit_price,
                quantity, entry_fee, exit_fee, pnl, net_pnl, pnl_pct,
                opened_at, closed_at, duration_min, exit_reason
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(bot_id)
        .bind(&trade.position_id)
        .bind(&trade.symbol)
        .bind(side_to_str(trade.side))
        .bind(trade.entry_price.to_string())
        .bind(trade.exit_price.to_string())
        .bind(trade.quantity.to_string())
        .bind(trade.entry_fee.to_string())
        .bind(trade.exit_fee.to_string())
        .bind(trade.pnl.to_string())
        .bind(trade.net_pnl.to_string())
        .bind(trade.pnl_pct.to_string())
        .bind(trade.opened_at.to_rfc3339())
        .bind(trade.closed_at.to_rfc3339())
        .bind(trade.duration_min)
        .bind(reason_to_str(trade.exit_reason))
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;

        Ok(id)
    }

    async fn get_bot_trades(&self, bot_id: &str, limit: u32) -> Result<Vec<Trade>, BotError> {
        let rows = sqlx::query(
            "SELECT * FROM trades WHERE bot_id = ? ORDER BY closed_at DESC LIMIT ?",
        )
        .bind(bot_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_err)?;

        rows.into_iter().map(row_to_trade).collect()
    }

    async fn get_daily_stats(&self, bot_id: &str) -> Result<DailyStats, BotError> {
        let today_start = Utc::now().date_naive().and_hms_opt(0, 0, 0).unwrap();
        let rows = sqlx::query("SELECT * FROM trades WHERE bot_id = ? AND closed_at >= ?")
            .bind(bot_id)
            .bind(format!("{}Z", today_start.format("%Y-%m-%dT%H:%M:%S")))
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_err)?;

        let trades: Vec<Trade> = rows.into_iter().map(row_to_trade).collect::<Result<_, _>>()?;
        let trades_count = trades.len() as u64;
        let total_pnl: Decimal = trades.iter().map(|t| t.net_pnl).sum();
        let wins = trades.iter().filter(|t| t.net_pnl > Decimal::ZERO).count() as u64;
        let win_rate = if trades_count == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(wins) / Decimal::from(trades_count)
        };

        Ok(DailyStats {
            trades_count,
            total_pnl,
            win_rate,
        })
    }
}

fn row_to_trade(row: sqlx::sqlite::SqliteRow) -> Result<Trade, BotError> {
    Ok(Trade {
        position_id: row.try_get("position_id").map_err(sqlx_err)?,
        symbol: row.try_get("symbol").map_err(sqlx_err)?,
        side: side_from_str(&row.try_get::<String, _>("side").map_err(sqlx_err)?),
        entry_price: parse_decimal(&row.try_get::<String, _>("entry_price").map_err(sqlx_err)?),
        exit_price: parse_decimal(&row.try_get::<String, _>("exit_price").map_err(sqlx_err)?),
        quantity: parse_decimal(&row.try_get::<String, _>("quantity").map_err(sqlx_err)?),
        entry_fee: parse_decimal(&row.try_get::<String, _>("entry_fee").map_err(sqlx_err)?),
        exit_fee: parse_decimal(&row.try_get::<String, _>("exit_fee").map_err(sqlx_err)?),
        pnl: parse_decimal(&row.try_get::<String, _>("pnl").map_err(sqlx_err)?),
        net_pnl: parse_decimal(&row.try_get::<String, _>("net_pnl").map_err(sqlx_err)?),
        pnl_pct: parse_decimal(&row.try_get::<String, _>("pnl_pct").map_err(sqlx_err)?),
        opened_at: parse_datetime(&row.try_get::<String, _>("opened_at").map_err(sqlx_err)?),
        closed_at: parse_datetime(&row.try_get::<String, _>("closed_at").map_err(sqlx_err)?),
        duration_min: row.try_get("duration_min").map_err(sqlx_err)?,
        exit_reason: reason_from_str(&row.try_get::<String, _>("exit_reason").map_err(sqlx_err)?),
    })
}
