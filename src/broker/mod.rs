mod error;
mod fake;
mod redis;

use std::time::Duration;

use async_trait::async_trait;

pub use error::BrokerError;
pub use error::BrokerResult;
pub use fake::FakeBroker;
pub use redis::RedisBroker;

/// The three priority lanes a task can be queued on, checked in the
/// `critical : default : low = 3 : 2 : 1` ratio a worker is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    Critical,
    Default,
    Low,
}

impl Priority {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Default => "default",
            Self::Low => "low",
        }
    }
}

/// What the producer hands the broker for one claimed outbox row.
pub struct EnqueueTask {
    pub r#type: String,
    pub payload: Vec<u8>,
    /// Reused as the broker-side idempotency key (the outbox row's `id`).
    pub idempotency_key: String,
    /// How long the broker must remember `idempotency_key` (R).
    pub retention: Duration,
    pub priority: Priority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted,
    /// The broker already holds (or recently processed) a task under this
    /// idempotency key. Callers should treat this the same as `Accepted` for
    /// the purpose of committing the outbox delete.
    Duplicate,
}

/// A delivered task gets this many total attempts (the original delivery
/// plus redeliveries) before `nack` gives up and moves it to the
/// dead-letter list instead of requeueing it again.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 5;

/// Delay before a task nacked on its `attempt`-th try is made visible to
/// dequeue again. Doubles each attempt, capped at a minute.
pub fn backoff_delay(attempt: u32) -> Duration {
    let secs = 2u64.saturating_pow(attempt.min(6));
    Duration::from_secs(secs.min(60))
}

/// A task handed back to a worker. Carries whatever opaque `receipt` the
/// broker implementation needs to later `ack` or `nack` this specific
/// delivery (e.g. the value removed from a Redis "processing" list).
#[derive(Debug, Clone)]
pub struct DeliveredTask {
    pub r#type: String,
    pub payload: Vec<u8>,
    pub idempotency_key: String,
    pub priority: Priority,
    pub receipt: String,
    /// How many times this task has been delivered so far, including this
    /// delivery. Starts at `0` on first delivery.
    pub attempt: u32,
}

/// The pluggable capability any broker that can enqueue idempotently within
/// a retention window and hand tasks back out to workers must satisfy. A
/// Redis-backed implementation ([`RedisBroker`]) and an in-memory test
/// double ([`FakeBroker`]) are provided.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Enqueue one task. Must reject a repeat `idempotency_key` within
    /// `retention` of a prior acceptance with [`EnqueueOutcome::Duplicate`]
    /// rather than an error.
    async fn enqueue(
        &self,
        task: EnqueueTask,
    ) -> BrokerResult<EnqueueOutcome>;

    /// Wait up to `timeout` for a task on one of `priorities`, checked in
    /// the given order. Returns `None` on timeout, never an error for "no
    /// task available".
    async fn dequeue(
        &self,
        priorities: &[Priority],
        timeout: Duration,
    ) -> BrokerResult<Option<DeliveredTask>>;

    /// Acknowledge successful (terminal) handling of a delivered task.
    async fn ack(
        &self,
        task: &DeliveredTask,
    ) -> BrokerResult<()>;

    /// Return a delivered task for redelivery after a retryable worker
    /// error, with backoff proportional to `task.attempt`. Once `attempt`
    /// reaches [`MAX_DELIVERY_ATTEMPTS`] the task is moved to the broker's
    /// dead-letter list instead of being requeued.
    async fn nack(
        &self,
        task: DeliveredTask,
    ) -> BrokerResult<()>;
}
