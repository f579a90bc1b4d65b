use serde::Deserialize;
use serde::Serialize;

use crate::domain::MailContent;

/// The payload stored in `outbox.payload` / passed to the broker, and decoded
/// by the worker. `delivery_id` is how the worker finds its way back to the
/// `deliveries` row it owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub delivery_id: i64,
    pub content: MailContent,
}

impl TaskEnvelope {
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> { serde_json::to_vec(self) }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> { serde_json::from_slice(bytes) }
}
