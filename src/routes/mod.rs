mod health_check;
mod mail;
mod metrics;

pub use health_check::health_check;
pub use mail::send_mail;
pub use metrics::metrics;
