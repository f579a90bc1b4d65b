use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;

use crate::broker::Broker;
use crate::broker::BrokerError;
use crate::broker::BrokerResult;
use crate::broker::DeliveredTask;
use crate::broker::EnqueueOutcome;
use crate::broker::EnqueueTask;
use crate::broker::Priority;
use crate::broker::MAX_DELIVERY_ATTEMPTS;

struct State {
    idempotency: HashMap<String, Instant>,
    queues: HashMap<Priority, VecDeque<DeliveredTask>>,
    dead_letters: Vec<DeliveredTask>,
    /// When `Some(0)`, the next `enqueue` fails with a transport error
    /// instead of succeeding; decremented on every call while `Some`. Lets
    /// tests simulate a broker outage partway through a producer batch.
    fail_enqueues_remaining: Option<usize>,
}

/// An in-memory [`Broker`] for tests: no real process boundary, so `ack`
/// and `nack` only need to be consistent with what `dequeue` already
/// removed, not re-derive it from a receipt string.
pub struct FakeBroker {
    state: Mutex<State>,
}

impl Default for FakeBroker {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                idempotency: HashMap::new(),
                queues: HashMap::new(),
                dead_letters: Vec::new(),
                fail_enqueues_remaining: None,
            }),
        }
    }
}

impl FakeBroker {
    pub fn new() -> Self { Self::default() }

    /// The next `n` calls to `enqueue` return a transport error.
    pub fn fail_next_enqueues(
        &self,
        n: usize,
    ) {
        self.state.lock().unwrap().fail_enqueues_remaining = Some(n);
    }

    pub fn clear_injected_failure(&self) {
        self.state.lock().unwrap().fail_enqueues_remaining = None;
    }

    pub fn pending_count(
        &self,
        priority: Priority,
    ) -> usize {
        self.state
            .lock()
            .unwrap()
            .queues
            .get(&priority)
            .map_or(0, VecDeque::len)
    }

    /// Tasks that hit [`MAX_DELIVERY_ATTEMPTS`] and were moved off the live
    /// queues instead of being requeued again.
    pub fn dead_letter_count(&self) -> usize { self.state.lock().unwrap().dead_letters.len() }

    fn purge_expired(state: &mut State) {
        let now = Instant::now();
        state.idempotency.retain(|_, expires_at| *expires_at > now);
    }
}

#[async_trait]
impl Broker for FakeBroker {
    async fn enqueue(
        &self,
        task: EnqueueTask,
    ) -> BrokerResult<EnqueueOutcome> {
        let mut state = self.state.lock().unwrap();

        if let Some(remaining) = state.fail_enqueues_remaining {
            if remaining == 0 {
                return Err(BrokerError::Transport("simulated broker outage".to_string()));
            }
            state.fail_enqueues_remaining = Some(remaining - 1);
        }

        Self::purge_expired(&mut state);

        if state.idempotency.contains_key(&task.idempotency_key) {
            return Ok(EnqueueOutcome::Duplicate);
        }

        state
            .idempotency
            .insert(task.idempotency_key.clone(), Instant::now() + task.retention);
        state.queues.entry(task.priority).or_default().push_back(DeliveredTask {
            r#type: task.r#type,
            payload: task.payload,
            idempotency_key: task.idempotency_key.clone(),
            priority: task.priority,
            receipt: task.idempotency_key,
            attempt: 0,
        });

        Ok(EnqueueOutcome::Accepted)
    }

    async fn dequeue(
        &self,
        priorities: &[Priority],
        _timeout: Duration,
    ) -> BrokerResult<Option<DeliveredTask>> {
        let mut state = self.state.lock().unwrap();
        for &priority in priorities {
            if let Some(task) = state.queues.entry(priority).or_default().pop_front() {
                return Ok(Some(task));
            }
        }
        Ok(None)
    }

    async fn ack(
        &self,
        _task: &DeliveredTask,
    ) -> BrokerResult<()> {
        Ok(())
    }

    async fn nack(
        &self,
        mut task: DeliveredTask,
    ) -> BrokerResult<()> {
        let mut state = self.state.lock().unwrap();
        task.attempt += 1;
        if task.attempt >= MAX_DELIVERY_ATTEMPTS {
            tracing::error!(idempotency_key = %task.idempotency_key, attempt = task.attempt, "max delivery attempts exceeded, moving to dead letter");
            state.dead_letters.push(task);
            return Ok(());
        }
        state.queues.entry(task.priority).or_default().push_front(task);
        Ok(())
    }
}
