//! Background delivery of rows inserted into `notifications`.
//!
//! An insert trigger publishes each new row on a Postgres channel. The
//! listener keeps one dedicated connection subscribed to that channel,
//! reconnecting with backoff when it drops, and sweeps undelivered rows on
//! every (re)connect and on a fixed interval so nothing inserted while it was
//! disconnected is lost.
//!
//! Before dispatching, a row is claimed by stamping `claimed_at`. The claim
//! is a lease: once it is older than [`ListenerConfig::claim_lease`] any
//! listener may take the row again. `delivered_at` is only written after the
//! dispatch succeeded, so a process dying mid-dispatch leaves the row for the
//! next sweep. Delivery is at least once.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use futures::{stream, StreamExt};
use shared::NotificationPayload;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;
use tokio_postgres::{AsyncMessage, NoTls};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::DbPool;
use crate::dispatch::NotificationDispatcher;
use crate::models::Notification;
use crate::schema::notifications;

/// Channel the `notifications` insert trigger publishes on.
pub const NOTIFICATION_CHANNEL: &str = "notification_inserted";

const SWEEP_BATCH: i64 = 100;

/// Lower bound for reconnect delays.
pub const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(10);

#[derive(Clone, Debug)]
pub struct ReconnectBackoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    current: Duration,
}

impl ReconnectBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(MIN_RECONNECT_DELAY);
        let max = max.max(initial);
        Self {
            initial,
            max,
            multiplier: 2.0,
            current: initial,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.mul_f64(self.multiplier).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

pub struct ListenerConfig {
    pub database_url: String,
    pub sweep_interval: Duration,
    /// How long a claim blocks other listeners from taking the row.
    pub claim_lease: Duration,
    pub backoff: ReconnectBackoff,
}

pub struct NotificationListener {
    config: ListenerConfig,
    pool: DbPool,
    dispatcher: NotificationDispatcher,
    shutdown: CancellationToken,
}

impl NotificationListener {
    pub fn new(
        config: ListenerConfig,
        pool: DbPool,
        dispatcher: NotificationDispatcher,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            pool,
            dispatcher,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        info!(channel = NOTIFICATION_CHANNEL, "Notification listener started");

        loop {
            match self.listen().await {
                Ok(()) => break,
                Err(e) => {
                    let delay = self.config.backoff.next_delay();
                    error!(error = %e, retry_in = ?delay, "Notification listener disconnected");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = time::sleep(delay) => {}
                    }
                }
            }
        }

        info!("Notification listener stopped");
    }

    /// Runs one connection until shutdown (`Ok`) or until the connection fails.
    async fn listen(&mut self) -> Result<()> {
        let (client, mut connection) =
            tokio_postgres::connect(&self.config.database_url, NoTls).await?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(async move {
            let mut messages = stream::poll_fn(move |cx| connection.poll_message(cx));
            while let Some(message) = messages.next().await {
                match message {
                    Ok(AsyncMessage::Notification(n)) => {
                        if tx.send(n).is_err() {
                            break;
                        }
                    }
                    Ok(AsyncMessage::Notice(notice)) => {
                        debug!(notice = %notice, "Postgres notice on listener connection");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Listener connection error");
                        break;
                    }
                }
            }
        });

        let result: Result<()> = async {
            client
                .batch_execute(&format!("LISTEN {}", NOTIFICATION_CHANNEL))
                .await?;
            info!(channel = NOTIFICATION_CHANNEL, "Listening for notifications");
            self.config.backoff.reset();

            // Rows inserted before LISTEN took effect are only reachable this way.
            self.sweep_undelivered().await;

            let mut sweep = time::interval(self.config.sweep_interval);
            sweep.tick().await;

            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => return Ok(()),
                    _ = sweep.tick() => self.sweep_undelivered().await,
                    received = rx.recv() => match received {
                        Some(n) if n.channel() == NOTIFICATION_CHANNEL => {
                            self.handle_raw(n.payload()).await
                        }
                        Some(n) => debug!(channel = n.channel(), "Ignoring foreign channel"),
                        None => return Err(anyhow!("listener connection closed")),
                    },
                }
            }
        }
        .await;

        driver.abort();
        result
    }

    async fn handle_raw(&self, raw: &str) {
        match serde_json::from_str::<NotificationPayload>(raw) {
            Ok(payload) => self.deliver(payload).await,
            Err(e) => error!(error = %e, payload = raw, "Malformed notification payload"),
        }
    }

    /// Claims, dispatches and marks one notification.
    pub async fn deliver(&self, payload: NotificationPayload) {
        match self.claim(payload.id).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(notification_id = payload.id, "Notification delivered or claimed elsewhere");
                return;
            }
            Err(e) => {
                error!(notification_id = payload.id, error = %e, "Failed to claim notification");
                return;
            }
        }

        match self.dispatcher.dispatch(&payload).await {
            Ok(outcome) => {
                if let Err(e) = self.mark_delivered(payload.id).await {
                    // The lease runs out and the row is sent again.
                    error!(notification_id = payload.id, error = %e, "Failed to mark notification delivered");
                } else {
                    debug!(notification_id = payload.id, outcome = ?outcome, "Notification delivered");
                }
            }
            Err(e) => {
                error!(notification_id = payload.id, error = %e, "Failed to dispatch notification");
                if let Err(e) = self.release(payload.id).await {
                    error!(notification_id = payload.id, error = %e, "Failed to release notification");
                }
            }
        }
    }

    async fn sweep_undelivered(&self) {
        if let Err(e) = self.process_undelivered().await {
            error!(error = %e, "Error sweeping undelivered notifications");
        }
    }

    /// Delivers every undelivered row, oldest first, in batches.
    pub async fn process_undelivered(&self) -> Result<()> {
        let mut after_id = 0;

        loop {
            let batch = {
                let mut conn = self.pool.get().await?;
                notifications::table
                    .filter(notifications::delivered_at.is_null())
                    .filter(notifications::id.gt(after_id))
                    .order(notifications::id.asc())
                    .limit(SWEEP_BATCH)
                    .select(Notification::as_select())
                    .load::<Notification>(&mut conn)
                    .await?
            };

            let batch_len = batch.len() as i64;
            for row in batch {
                after_id = row.id;
                match NotificationPayload::try_from(row) {
                    Ok(payload) => self.deliver(payload).await,
                    Err(e) => error!(notification_id = after_id, error = %e, "Unreadable notification row"),
                }
            }

            if batch_len < SWEEP_BATCH {
                return Ok(());
            }
        }
    }

    async fn claim(&self, id: i32) -> Result<bool> {
        let now = Utc::now();
        let stale_before = now - chrono::Duration::from_std(self.config.claim_lease)?;
        let mut conn = self.pool.get().await?;
        let updated = diesel::update(
            notifications::table
                .filter(notifications::id.eq(id))
                .filter(notifications::delivered_at.is_null())
                .filter(
                    notifications::claimed_at
                        .is_null()
                        .or(notifications::claimed_at.lt(stale_before)),
                ),
        )
        .set(notifications::claimed_at.eq(Some(now)))
        .execute(&mut conn)
        .await?;
        Ok(updated == 1)
    }

    async fn mark_delivered(&self, id: i32) -> Result<()> {
        let mut conn = self.pool.get().await?;
        diesel::update(notifications::table.filter(notifications::id.eq(id)))
            .set(notifications::delivered_at.eq(Some(Utc::now())))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn release(&self, id: i32) -> Result<()> {
        let mut conn = self.pool.get().await?;
        diesel::update(notifications::table.filter(notifications::id.eq(id)))
            .set(notifications::claimed_at.eq(None::<DateTime<Utc>>))
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}
