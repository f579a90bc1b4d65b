use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::Deserialize;
use serde::Serialize;

use crate::broker::backoff_delay;
use crate::broker::Broker;
use crate::broker::BrokerError;
use crate::broker::BrokerResult;
use crate::broker::DeliveredTask;
use crate::broker::EnqueueOutcome;
use crate::broker::EnqueueTask;
use crate::broker::Priority;
use crate::broker::MAX_DELIVERY_ATTEMPTS;

/// What actually sits in a Redis list entry. `payload` is stored as UTF-8
/// text rather than raw bytes: every task this crate enqueues is a
/// JSON-encoded [`crate::outbox::envelope::TaskEnvelope`], which is always
/// valid UTF-8, so there is nothing to gain from a base64 round trip.
#[derive(Serialize, Deserialize)]
struct WireTask {
    r#type: String,
    payload: String,
    idempotency_key: String,
    #[serde(default)]
    attempt: u32,
}

/// A Redis-backed [`Broker`] implementing the reliable-queue pattern: each
/// priority lane is a list `queue:<priority>`, and a worker's `BRPOPLPUSH`
/// moves a task onto `processing:<priority>` atomically so a crashed worker
/// never simply loses it. Idempotency is a `SET NX PX` guard keyed by the
/// outbox row id, expiring after the retention window.
pub struct RedisBroker {
    conn: redis::aio::ConnectionManager,
}

impl RedisBroker {
    pub async fn connect(connection_url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    fn queue_key(priority: Priority) -> String { format!("queue:{}", priority.as_str()) }

    fn processing_key(priority: Priority) -> String { format!("processing:{}", priority.as_str()) }

    fn idempotency_key(idempotency_key: &str) -> String { format!("idempotency:{idempotency_key}") }

    fn dead_letter_key(priority: Priority) -> String { format!("dead:{}", priority.as_str()) }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn enqueue(
        &self,
        task: EnqueueTask,
    ) -> BrokerResult<EnqueueOutcome> {
        let mut conn = self.conn.clone();

        let reserved: Option<String> = redis::cmd("SET")
            .arg(Self::idempotency_key(&task.idempotency_key))
            .arg(1)
            .arg("NX")
            .arg("PX")
            .arg(task.retention.as_millis() as i64)
            .query_async(&mut conn)
            .await
            .map_err(|err| BrokerError::Transport(err.to_string()))?;

        if reserved.is_none() {
            return Ok(EnqueueOutcome::Duplicate);
        }

        let payload = String::from_utf8(task.payload)
            .map_err(|err| BrokerError::Transport(err.to_string()))?;
        let wire = WireTask {
            r#type: task.r#type,
            payload,
            idempotency_key: task.idempotency_key,
            attempt: 0,
        };
        let value = serde_json::to_string(&wire)
            .map_err(|err| BrokerError::Transport(err.to_string()))?;

        conn.rpush::<_, _, ()>(Self::queue_key(task.priority), value)
            .await
            .map_err(|err| BrokerError::Transport(err.to_string()))?;

        Ok(EnqueueOutcome::Accepted)
    }

    async fn dequeue(
        &self,
        priorities: &[Priority],
        timeout: Duration,
    ) -> BrokerResult<Option<DeliveredTask>> {
        let mut conn = self.conn.clone();

        // Each entry in `priorities` costs its own blocking BRPOPLPUSH, so a
        // caller that wants a weighted rotation across lanes should pass one
        // priority per call rather than a longer list — passing several
        // means paying up to `timeout` per entry before this returns `None`.
        for &priority in priorities {
            let value: Option<String> = redis::cmd("BRPOPLPUSH")
                .arg(Self::queue_key(priority))
                .arg(Self::processing_key(priority))
                .arg(timeout.as_secs().max(1))
                .query_async(&mut conn)
                .await
                .map_err(|err| BrokerError::Transport(err.to_string()))?;

            let Some(value) = value else { continue };

            let wire: WireTask = serde_json::from_str(&value)
                .map_err(|err| BrokerError::Transport(err.to_string()))?;

            return Ok(Some(DeliveredTask {
                r#type: wire.r#type,
                payload: wire.payload.into_bytes(),
                idempotency_key: wire.idempotency_key,
                priority,
                receipt: value,
                attempt: wire.attempt,
            }));
        }

        Ok(None)
    }

    async fn ack(
        &self,
        task: &DeliveredTask,
    ) -> BrokerResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .lrem(Self::processing_key(task.priority), 1, &task.receipt)
            .await
            .map_err(|err| BrokerError::Transport(err.to_string()))?;
        Ok(())
    }

    async fn nack(
        &self,
        task: DeliveredTask,
    ) -> BrokerResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .lrem(Self::processing_key(task.priority), 1, &task.receipt)
            .await
            .map_err(|err| BrokerError::Transport(err.to_string()))?;

        let attempt = task.attempt + 1;
        let payload = String::from_utf8(task.payload).map_err(|err| BrokerError::Transport(err.to_string()))?;
        let wire = WireTask {
            r#type: task.r#type,
            payload,
            idempotency_key: task.idempotency_key,
            attempt,
        };
        let value = serde_json::to_string(&wire).map_err(|err| BrokerError::Transport(err.to_string()))?;

        if attempt >= MAX_DELIVERY_ATTEMPTS {
            tracing::error!(idempotency_key = %wire.idempotency_key, attempt, "max delivery attempts exceeded, moving to dead letter");
            conn.rpush::<_, _, ()>(Self::dead_letter_key(task.priority), value)
                .await
                .map_err(|err| BrokerError::Transport(err.to_string()))?;
            return Ok(());
        }

        tokio::time::sleep(backoff_delay(attempt)).await;

        conn.rpush::<_, _, ()>(Self::queue_key(task.priority), value)
            .await
            .map_err(|err| BrokerError::Transport(err.to_string()))?;
        Ok(())
    }
}
