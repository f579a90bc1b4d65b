use actix_web::web;
use actix_web::HttpResponse;
use sqlx::PgPool;

use crate::domain::MailContent;
use crate::domain::MailRequest;
use crate::outbox::ingress;
use crate::utils::error_400;
use crate::utils::error_500;

/// `POST /api/mail/send`. Validates the request, writes the delivery and
/// its outbox row in one transaction, and returns as soon as that
/// transaction commits — well before the email is actually sent. The
/// producer and worker pool take it from there.
#[tracing::instrument(name = "Submit mail request", skip(pool, body))]
pub async fn send_mail(
    body: web::Json<MailRequest>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, actix_web::Error> {
    let content = MailContent::try_from(body.into_inner()).map_err(error_400)?;

    ingress::enqueue(&pool, &content).await.map_err(error_500)?;

    Ok(HttpResponse::Ok().finish())
}
