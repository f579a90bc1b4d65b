use sqlx::PgPool;

use crate::outbox::error::OutboxResult;
use crate::outbox::model::DeliveryStatus;

/// Marks a delivery `Started` just before the worker attempts the side
/// effect. Sets `start_time` once, on first entry into `Started`.
#[tracing::instrument(name = "Mark delivery started", skip(pool))]
pub async fn mark_started(
    pool: &PgPool,
    delivery_id: i64,
) -> OutboxResult<()> {
    sqlx::query!(
        r#"
        UPDATE deliveries
        SET status = $1, start_time = now(), updated_at = now()
        WHERE id = $2
        "#,
        DeliveryStatus::Started.as_str(),
        delivery_id,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Marks a delivery `Success`. Called only after the side effect itself has
/// already succeeded; a failure here must not be allowed to turn into a
/// retry of an email that has already been sent.
#[tracing::instrument(name = "Mark delivery success", skip(pool))]
pub async fn mark_success(
    pool: &PgPool,
    delivery_id: i64,
) -> OutboxResult<()> {
    sqlx::query!(
        r#"
        UPDATE deliveries
        SET status = $1, end_time = now(), updated_at = now()
        WHERE id = $2
        "#,
        DeliveryStatus::Success.as_str(),
        delivery_id,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Marks a delivery `Failed` and records `errors` for diagnosis.
#[tracing::instrument(name = "Mark delivery failed", skip(pool, error))]
pub async fn mark_failed(
    pool: &PgPool,
    delivery_id: i64,
    error: &str,
) -> OutboxResult<()> {
    sqlx::query!(
        r#"
        UPDATE deliveries
        SET status = $1, end_time = now(), updated_at = now(), errors = $2
        WHERE id = $3
        "#,
        DeliveryStatus::Failed.as_str(),
        error.as_bytes(),
        delivery_id,
    )
    .execute(pool)
    .await?;

    Ok(())
}
