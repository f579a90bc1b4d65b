use sqlx::PgPool;

use crate::email_client::EmailTransport;
use crate::outbox::delivery;
use crate::outbox::envelope::TaskEnvelope;
use crate::outbox::metrics::POST_EFFECT_WRITE_FAILURES_TOTAL;
use crate::outbox::metrics::TASK_OUTCOMES_TOTAL;

/// Whether a task-handling failure can succeed on redelivery. A decode
/// failure can't: the payload bytes don't change between attempts, so
/// redelivering a task that fails to decode would only repeat the same
/// failure forever.
#[derive(Debug)]
pub enum DeliverError {
    Decode(String),
    Retryable(String),
}

impl DeliverError {
    pub fn is_terminal(&self) -> bool { matches!(self, Self::Decode(_)) }
}

impl std::fmt::Display for DeliverError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::Decode(msg) => write!(f, "decode error: {msg}"),
            Self::Retryable(msg) => write!(f, "{msg}"),
        }
    }
}

/// Decodes and executes one `email:deliver` task.
///
/// The sequence is decode -> mark `Started` -> send -> mark `Success` |
/// `Failed`. Once `send` has returned `Ok`, the email has actually gone
/// out: nothing past that point may turn into a retry, so a failure to
/// write the terminal `Success` status is logged and counted, not
/// propagated as a reason to redeliver the task.
#[tracing::instrument(name = "Handle email delivery", skip(pool, transport, payload), fields(delivery_id = tracing::field::Empty))]
pub async fn handle_email_deliver(
    pool: &PgPool,
    transport: &dyn EmailTransport,
    payload: &[u8],
) -> Result<(), DeliverError> {
    let envelope = TaskEnvelope::decode(payload).map_err(|err| DeliverError::Decode(err.to_string()))?;
    tracing::Span::current().record("delivery_id", envelope.delivery_id);

    if let Err(err) = delivery::mark_started(pool, envelope.delivery_id).await {
        tracing::error!(error = %err, "failed to mark delivery started");
        return Err(DeliverError::Retryable(err.to_string()));
    }

    match transport.send(&envelope.content).await {
        Ok(()) => {
            // Point of no return: the email is sent. Whatever happens below
            // must not cause this task to be redelivered.
            if let Err(err) = delivery::mark_success(pool, envelope.delivery_id).await {
                tracing::error!(
                    error = %err,
                    delivery_id = envelope.delivery_id,
                    "email sent but failed to persist Success status"
                );
                POST_EFFECT_WRITE_FAILURES_TOTAL.inc();
            }
            TASK_OUTCOMES_TOTAL.with_label_values(&["success"]).inc();
            Ok(())
        }
        Err(send_err) => {
            if let Err(err) = delivery::mark_failed(pool, envelope.delivery_id, &send_err).await {
                tracing::error!(error = %err, delivery_id = envelope.delivery_id, "failed to persist Failed status");
            }
            TASK_OUTCOMES_TOTAL.with_label_values(&["failed"]).inc();
            Err(DeliverError::Retryable(send_err))
        }
    }
}
