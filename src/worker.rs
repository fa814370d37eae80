//! The scheduler: owns the tick cadence, calls into the strategy, persists
//! side effects via the state store, emits lifecycle events via the
//! notifier, and honors cooperative shutdown from signals or a remote
//! status change.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::budget::BudgetManager;
use crate::clock::Clock;
use crate::database::StateStore;
use crate::error::BotError;
use crate::exchange::{build_gateway, ExchangeGateway};
use crate::notifications::{position_closed, position_opened, BotEvent, Notifier};
use crate::strategy::LongDipATR;
use crate::types::{BotConfig, BotPerformance, BotStatus};

const HEARTBEAT_EVERY: u64 = 6;
const PERFORMANCE_EVERY: u64 = 60;
const TICKER_RETRY_DELAY: Duration = Duration::from_secs(5);
const UNEXPECTED_ERROR_DELAY: Duration = Duration::from_secs(10);

pub struct BotWorker {
    bot_id: String,
    store: Arc<dyn StateStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    stop_requested: Arc<AtomicBool>,
}

struct RunningBot {
    config: BotConfig,
    gateway: Arc<dyn ExchangeGateway>,
    strategy: LongDipATR,
}

impl std::fmt::Debug for RunningBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningBot")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BotWorker {
    pub fn new(
        bot_id: String,
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        stop_requested: Arc<AtomicBool>,
    ) -> Self {
        Self {
            bot_id,
            store,
            notifier,
            clock,
            stop_requested,
        }
    }

    /// Loads config and credentials, builds the gateway and strategy, and
    /// persists RUNNING. Each failed step transitions to ERROR and halts.
    async fn start_up(&self) -> Result<RunningBot, BotError> {
        let config = self.store.get_bot(&self.bot_id).await?;
        config
            .validate()
            .map_err(|errors| BotError::ConfigInvalid(errors.join(", ")))?;

        let connection = self
            .store
            .get_exchange_connection(&config.user_id, &config.exchange)
            .await?;

        let gateway: Arc<dyn ExchangeGateway> = Arc::from(build_gateway(
            &config.exchange,
            format!("https://api.{}.example", config.exchange),
            connection.api_key.clone(),
            connection.api_secret.clone(),
        ));

        let ticker = gateway.get_ticker(&config.symbol).await;
        if ticker.is_none() {
            return Err(BotError::ConfigInvalid(format!(
                "unable to reach exchange for {}",
                config.symbol
            )));
        }

        let budget = BudgetManager::new(
            config.budget.total_budget,
            config.budget.max_position_pct,
            config.budget.leverage,
            config.budget.sizing_levels.clone(),
        );

        let strategy = LongDipATR::new(
            config.symbol.clone(),
            &config.timeframe,
            config.budget.leverage,
            config.atr.clone(),
            config.trailing_stop.clone(),
            config.fees.clone(),
            budget,
            gateway.clone(),
            self.clock.clone(),
        )
        .await;

        self.store.update_status(&self.bot_id, BotStatus::Running, None).await?;
        self.notifier.notify(&self.bot_id, BotEvent::BotStarted).await;

        Ok(RunningBot {
            config,
            gateway,
            strategy,
        })
    }

    /// Runs the bot to completion. Returns the startup error (after
    /// persisting `status=ERROR`) if `start_up` fails; the caller is
    /// expected to translate that into a non-zero process exit. A normal
    /// shutdown (local stop or remote STOPPED) returns `Ok(())`.
    pub async fn run(&self) -> Result<(), BotError> {
        let mut bot = match self.start_up().await {
            Ok(bot) => bot,
            Err(e) => {
                error!("startup failed for {}: {e}", self.bot_id);
                let _ = self
                    .store
                    .update_status(&self.bot_id, BotStatus::Error, Some(&e.to_string()))
                    .await;
                return Err(e);
            }
        };

        info!(
            "bot {} running on {} ({})",
            self.bot_id, bot.config.symbol, bot.config.exchange
        );

        let mut iteration: u64 = 0;
        let mut total_realized_pnl = Decimal::ZERO;
        let mut last_config_check = self.clock.now();
        let config_check_interval =
            chrono::Duration::seconds(bot.config.config_check_interval_secs as i64);
        let update_interval = Duration::from_secs(bot.config.update_interval_secs.max(1));

        loop {
            if self.stop_requested.load(Ordering::SeqCst) {
                break;
            }

            iteration += 1;
            if let Err(e) = self.run_iteration(&mut bot, iteration, &mut total_realized_pnl).await {
                error!("uncaught error in bot {} loop: {e}", self.bot_id);
                self.notifier
                    .notify(&self.bot_id, BotEvent::BotError { message: e.to_string() })
                    .await;
                tokio::time::sleep(UNEXPECTED_ERROR_DELAY).await;
                continue;
            }

            let now = self.clock.now();
            if now - last_config_check >= config_check_interval {
                last_config_check = now;
                if let Ok(latest_status) = self.fetch_remote_status().await {
                    if latest_status == BotStatus::Stopped {
                        info!("bot {} observed remote STOPPED status", self.bot_id);
                        self.stop_requested.store(true, Ordering::SeqCst);
                    }
                }
            }

            if self.stop_requested.load(Ordering::SeqCst) {
                break;
            }

            tokio::time::sleep(update_interval).await;
        }

        let _ = self.store.update_status(&self.bot_id, BotStatus::Stopped, None).await;
        self.notifier.notify(&self.bot_id, BotEvent::BotStopped).await;
        info!(
            "bot {} stopped; total realized pnl = {total_realized_pnl}",
            self.bot_id
        );
        Ok(())
    }

    async fn fetch_remote_status(&self) -> Result<BotStatus, BotError> {
        let config = self.store.get_bot(&self.bot_id).await?;
        Ok(config.status)
    }

    async fn run_iteration(
        &self,
        bot: &mut RunningBot,
        iteration: u64,
        total_realized_pnl: &mut Decimal,
    ) -> Result<(), BotError> {
        let price = self.fetch_ticker_with_retry(&bot.gateway, &bot.config.symbol).await?;
        let now = self.clock.now();
        let config = &bot.config;
        let strategy = &mut bot.strategy;

        strategy.update(price, now);

        if let Some(signal) = strategy.check_entry(price) {
            if let Some(position) = strategy.execute_entry(signal, &config.bot_id, &config.user_id).await {
                match self.store.save_position(&position).await {
                    Ok(id) => {
                        strategy.assign_position_id(&position.id, id);
                        self.notifier
                            .notify(
                                &self.bot_id,
                                position_opened(&config.symbol, "LONG", position.quantity, position.entry_price),
                            )
                            .await;
                    }
                    Err(e) => warn!("failed to persist opened position for {}: {e}", self.bot_id),
                }
            }
        }

        for (position, reason) in strategy.check_exits(price) {
            if let Some(trade) = strategy.execute_exit(&position, price, reason).await {
                if let Err(e) = self.store.close_position(&position.id, price, reason).await {
                    warn!("failed to persist closed position for {}: {e}", self.bot_id);
                }
                if let Err(e) = self.store.save_trade(&self.bot_id, &trade).await {
                    warn!("failed to persist trade for {}: {e}", self.bot_id);
                }
                *total_realized_pnl += trade.net_pnl;
                self.notifier
                    .notify(
                        &self.bot_id,
                        position_closed(&config.symbol, trade.net_pnl, trade.pnl_pct, reason.as_str()),
                    )
                    .await;
            }
        }

        strategy.update_trailing_stops(price);
        for position in strategy.open_positions() {
            if let Some(trailing_stop) = position.trailing_stop {
                if let Err(e) = self
                    .store
                    .update_position(&position.id, crate::database::PositionPatch { trailing_stop: Some(trailing_stop) })
                    .await
                {
                    warn!("failed to persist trailing stop for {}: {e}", self.bot_id);
                }
            }
        }

        if iteration % HEARTBEAT_EVERY == 0 {
            if let Err(e) = self.store.send_heartbeat(&self.bot_id).await {
                warn!("heartbeat failed for {}: {e}", self.bot_id);
            }
        }

        if iteration % PERFORMANCE_EVERY == 0 {
            let unrealized = strategy.unrealized_pnl(price);
            let stats = self.store.get_daily_stats(&self.bot_id).await.unwrap_or_default();
            let performance = BotPerformance {
                total_realized_pnl: *total_realized_pnl,
                unrealized_pnl: unrealized,
                trades_today: stats.trades_count,
                win_rate: stats.win_rate,
            };
            if let Err(e) = self.store.update_performance(&self.bot_id, &performance).await {
                warn!("performance update failed for {}: {e}", self.bot_id);
            }
            info!(
                "bot {} status: realized={total_realized_pnl} unrealized={unrealized} open_positions={}",
                self.bot_id,
                strategy.open_positions().len()
            );
        }

        Ok(())
    }

    async fn fetch_ticker_with_retry(
        &self,
        gateway: &Arc<dyn ExchangeGateway>,
        symbol: &str,
    ) -> Result<Decimal, BotError> {
        loop {
            if self.stop_requested.load(Ordering::SeqCst) {
                return Err(BotError::GatewayTransient("shutdown requested".into()));
            }
            match gateway.get_ticker(symbol).await {
                Some(price) => return Ok(price),
                None => {
                    warn!("ticker unavailable for {symbol}, retrying");
                    tokio::time::sleep(TICKER_RETRY_DELAY).await;
                }
            }
        }
    }
}
