use chrono::DateTime;
use chrono::Utc;
use uuid::Uuid;

/// `deliveries.status`. Advances monotonically `Pending -> Started ->
/// (Success | Failed)`; `Failed` may re-enter `Started` if a reconciler
/// re-enqueues the delivery.
///
/// Stored as plain `TEXT` (not a Postgres native enum), so this type only
/// needs `Display`/`AsRef<str>` to bind as a query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Pending,
    Started,
    Success,
    Failed,
}

impl DeliveryStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Started => "Started",
            Self::Success => "Success",
            Self::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A row of the `outbox` table as returned by the producer's claim query.
/// Rows are claimed and deleted in the same transaction; this struct never
/// round-trips back to the database.
#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub id: Uuid,
    pub r#type: String,
    pub payload: Vec<u8>,
}

/// A row of the `deliveries` table, the authoritative, permanent record of a
/// requested side effect. Not all fields are read back by this crate; kept
/// here for completeness of the schema.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct DeliveryRecord {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub content: Vec<u8>,
    pub status: DeliveryStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub errors: Option<Vec<u8>>,
}

/// The task type tag used for the sole handler this crate registers.
pub const TASK_EMAIL_DELIVER: &str = "email:deliver";
