use once_cell::sync::Lazy;
use prometheus::register_int_counter;
use prometheus::register_int_counter_vec;
use prometheus::IntCounter;
use prometheus::IntCounterVec;

/// Outbox rows successfully handed to the broker, labeled by the outcome
/// the broker reported (`accepted` or `duplicate`).
pub static OUTBOX_PUBLISHED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "outbox_published_total",
        "Outbox rows handed to the broker, by outcome",
        &["outcome"]
    )
    .expect("outbox_published_total metric can be created")
});

/// Task executions that succeeded at the side effect but whose terminal
/// status write to `deliveries` then failed (the point-of-no-return case).
/// These are not retried — the email was already sent — but they are
/// exactly the rows an operator needs to go reconcile by hand.
pub static POST_EFFECT_WRITE_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "outbox_post_effect_write_failures_total",
        "Side effects that succeeded but whose status update failed to persist"
    )
    .expect("outbox_post_effect_write_failures_total metric can be created")
});

/// Tasks that reached a terminal state, labeled by that state
/// (`success`/`failed`).
pub static TASK_OUTCOMES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "outbox_task_outcomes_total",
        "Terminal task outcomes, by outcome",
        &["outcome"]
    )
    .expect("outbox_task_outcomes_total metric can be created")
});
