use actix_web::HttpResponse;
use prometheus::Encoder;
use prometheus::TextEncoder;

/// `GET /metrics`. Exposes whatever is registered in the default prometheus
/// registry, i.e. everything under [`crate::outbox::metrics`].
pub async fn metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %err, "failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok().content_type(encoder.format_type()).body(buffer)
}
