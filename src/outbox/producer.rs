use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::watch;

use crate::broker::Broker;
use crate::broker::EnqueueOutcome;
use crate::broker::EnqueueTask;
use crate::broker::Priority;
use crate::configuration::ProducerSettings;
use crate::outbox::error::OutboxResult;
use crate::outbox::metrics::OUTBOX_PUBLISHED_TOTAL;
use crate::outbox::model::OutboxRow;

/// Polls the `outbox` table on a fixed tick, claiming and deleting a batch
/// of rows in one transaction and handing each to the broker. A row that
/// the broker accepts (or reports as a duplicate — it was already
/// delivered, just not yet deleted, e.g. after a prior crash) is gone for
/// good once the transaction commits; a transport error aborts the whole
/// batch so the rows are claimed again next tick.
pub struct Producer {
    pool: PgPool,
    broker: Arc<dyn Broker>,
    settings: ProducerSettings,
}

impl Producer {
    pub fn new(
        pool: PgPool,
        broker: Arc<dyn Broker>,
        settings: ProducerSettings,
    ) -> Self {
        Self { pool, broker, settings }
    }

    /// Claim up to `batch_size` rows and publish them. Returns the number
    /// of rows claimed (not necessarily all successfully published — a
    /// broker error aborts the batch and rolls the claim back).
    #[tracing::instrument(name = "Run producer batch", skip(self))]
    pub async fn run_once(&self) -> OutboxResult<usize> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query_as!(
            OutboxRow,
            r#"
            DELETE FROM outbox
            WHERE id IN (
                SELECT id
                FROM outbox
                ORDER BY id
                FOR UPDATE SKIP LOCKED
                LIMIT $1
            )
            RETURNING id, type AS "r#type", payload
            "#,
            self.settings.batch_size as i64,
        )
        .fetch_all(&mut *tx)
        .await?;

        let claimed = rows.len();

        for row in rows {
            let idempotency_key = row.id.to_string();
            let outcome = self
                .broker
                .enqueue(EnqueueTask {
                    r#type: row.r#type,
                    payload: row.payload,
                    idempotency_key: idempotency_key.clone(),
                    retention: Duration::from_secs(self.settings.retention_secs),
                    priority: Priority::Default,
                })
                .await;

            match outcome {
                Ok(EnqueueOutcome::Accepted) => {
                    OUTBOX_PUBLISHED_TOTAL.with_label_values(&["accepted"]).inc();
                    tracing::debug!(outbox_id = %row.id, "published");
                }
                Ok(EnqueueOutcome::Duplicate) => {
                    OUTBOX_PUBLISHED_TOTAL.with_label_values(&["duplicate"]).inc();
                    tracing::warn!(outbox_id = %row.id, "broker already held this idempotency key, deleting anyway");
                }
                Err(err) => {
                    tracing::error!(error = %err, outbox_id = %row.id, "broker rejected enqueue, rolling back batch");
                    tx.rollback().await?;
                    return Err(err.into());
                }
            }
        }

        tx.commit().await?;

        Ok(claimed)
    }

    /// Ticks forever at `tick_interval_ms` until `shutdown` fires.
    pub async fn run_forever(
        &self,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.settings.tick_interval_ms));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.run_once().await {
                        tracing::error!(error = %err, "producer batch failed");
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("producer shutting down");
                    break;
                }
            }
        }
    }
}
