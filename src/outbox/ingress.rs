use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::MailContent;
use crate::outbox::envelope::TaskEnvelope;
use crate::outbox::error::OutboxResult;
use crate::outbox::model::DeliveryStatus;
use crate::outbox::model::TASK_EMAIL_DELIVER;

/// Writes a `deliveries` row and its matching `outbox` row in a single
/// transaction, so a crash between the two is impossible: either both
/// exist, or neither does. Returns the new delivery id.
#[tracing::instrument(name = "Enqueue mail delivery", skip(pool, content))]
pub async fn enqueue(
    pool: &PgPool,
    content: &MailContent,
) -> OutboxResult<i64> {
    let content_bytes = serde_json::to_vec(content)?;

    let mut tx = pool.begin().await?;

    let delivery_id = sqlx::query_scalar!(
        r#"
        INSERT INTO deliveries (created_at, content, status, updated_at)
        VALUES (now(), $1, $2, now())
        RETURNING id
        "#,
        content_bytes,
        DeliveryStatus::Pending.as_str(),
    )
    .fetch_one(&mut *tx)
    .await?;

    let envelope = TaskEnvelope {
        delivery_id,
        content: content.clone(),
    };
    let payload = envelope.encode()?;
    let outbox_id = Uuid::now_v7();

    sqlx::query!(
        r#"
        INSERT INTO outbox (id, created_at, type, payload)
        VALUES ($1, now(), $2, $3)
        "#,
        outbox_id,
        TASK_EMAIL_DELIVER,
        payload,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(delivery_id)
}
