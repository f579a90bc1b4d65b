pub mod email;

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::watch;

use crate::broker::Broker;
use crate::broker::DeliveredTask;
use crate::broker::Priority;
use crate::configuration::QueueWeights;
use crate::configuration::WorkerSettings;
use crate::email_client::EmailTransport;
use crate::outbox::model::TASK_EMAIL_DELIVER;

/// How long a single `dequeue` call blocks before a worker re-checks the
/// shutdown signal.
const DEQUEUE_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Runs `concurrency` workers, each cycling through the priority lanes in
/// the `critical : default : low` ratio from `queue_weights` so that
/// `critical` tasks are checked (and so, on average, served) three times
/// as often as `low` ones.
pub struct WorkerPool {
    pool: PgPool,
    broker: Arc<dyn Broker>,
    transport: Arc<dyn EmailTransport>,
    settings: WorkerSettings,
}

impl WorkerPool {
    pub fn new(
        pool: PgPool,
        broker: Arc<dyn Broker>,
        transport: Arc<dyn EmailTransport>,
        settings: WorkerSettings,
    ) -> Self {
        Self { pool, broker, transport, settings }
    }

    /// A smooth weighted round-robin schedule over the three priority
    /// lanes: each call to `dequeue` checks exactly one lane, and across
    /// calls the lanes appear in this schedule's order, so e.g. a 3:2:1
    /// ratio interleaves as `[Critical, Default, Critical, Low, Critical,
    /// Default]` rather than draining one lane's whole weight before
    /// moving to the next.
    fn priority_schedule(weights: &QueueWeights) -> Vec<Priority> {
        let entries = [
            (Priority::Critical, weights.critical),
            (Priority::Default, weights.default),
            (Priority::Low, weights.low),
        ];
        let total: u32 = entries.iter().map(|(_, weight)| *weight).sum();
        if total == 0 {
            return vec![Priority::Default];
        }

        let mut slots: Vec<(u32, Priority)> = Vec::with_capacity(total as usize);
        for (priority, weight) in entries {
            if weight == 0 {
                continue;
            }
            for j in 0..weight {
                slots.push(((j * total) / weight, priority));
            }
        }
        slots.sort_by_key(|(position, _)| *position);
        slots.into_iter().map(|(_, priority)| priority).collect()
    }

    /// Spawns the worker pool and waits for every worker to exit, which
    /// happens only once `shutdown` fires. Each worker finishes whatever
    /// task it is currently executing before exiting.
    pub async fn run(
        &self,
        shutdown: watch::Receiver<bool>,
    ) {
        let schedule = Self::priority_schedule(&self.settings.queue_weights);
        let exec_timeout = Duration::from_secs(self.settings.exec_timeout_secs);

        let mut handles = Vec::with_capacity(self.settings.concurrency);
        for worker_id in 0..self.settings.concurrency {
            let pool = self.pool.clone();
            let broker = Arc::clone(&self.broker);
            let transport = Arc::clone(&self.transport);
            let schedule = schedule.clone();
            let mut shutdown = shutdown.clone();

            handles.push(tokio::spawn(async move {
                let mut cursor = worker_id % schedule.len();
                loop {
                    let priority = schedule[cursor];
                    cursor = (cursor + 1) % schedule.len();

                    tokio::select! {
                        result = broker.dequeue(std::slice::from_ref(&priority), DEQUEUE_POLL_TIMEOUT) => {
                            match result {
                                Ok(Some(task)) => {
                                    Self::execute(&pool, broker.as_ref(), transport.as_ref(), task, exec_timeout, worker_id).await;
                                }
                                Ok(None) => {}
                                Err(err) => {
                                    tracing::error!(error = %err, worker_id, "dequeue failed");
                                }
                            }
                        }
                        _ = shutdown.changed() => {
                            tracing::info!(worker_id, "worker shutting down");
                            break;
                        }
                    }
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn execute(
        pool: &PgPool,
        broker: &dyn Broker,
        transport: &dyn EmailTransport,
        task: DeliveredTask,
        exec_timeout: Duration,
        worker_id: usize,
    ) {
        if task.r#type != TASK_EMAIL_DELIVER {
            tracing::error!(worker_id, task_type = %task.r#type, "unknown task type, nacking for redelivery");
            if let Err(err) = broker.nack(task).await {
                tracing::error!(error = %err, worker_id, "nack failed");
            }
            return;
        }

        let outcome = tokio::time::timeout(exec_timeout, email::handle_email_deliver(pool, transport, &task.payload)).await;

        match outcome {
            Ok(Ok(())) => {
                if let Err(err) = broker.ack(&task).await {
                    tracing::error!(error = %err, worker_id, "ack failed");
                }
            }
            Ok(Err(err)) if err.is_terminal() => {
                tracing::error!(error = %err, worker_id, "task payload could not be decoded, acknowledging as terminal");
                if let Err(err) = broker.ack(&task).await {
                    tracing::error!(error = %err, worker_id, "ack failed");
                }
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, worker_id, "task handler failed, nacking for redelivery");
                if let Err(err) = broker.nack(task).await {
                    tracing::error!(error = %err, worker_id, "nack failed");
                }
            }
            Err(_) => {
                tracing::warn!(worker_id, "task handler timed out, nacking for redelivery");
                if let Err(err) = broker.nack(task).await {
                    tracing::error!(error = %err, worker_id, "nack failed");
                }
            }
        }
    }
}
