use serde::Deserialize;

use crate::domain::EmailAddress;

/// Raw JSON body of `POST /api/mail/send`.
///
/// Validated (and its addresses parsed) on the way into [`MailContent`].
#[derive(Debug, Deserialize)]
pub struct MailRequest {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub content: String,
}

/// The validated, outbox-ready form of a [`MailRequest`]. This is what gets
/// serialized into both `deliveries.content` and the task envelope's
/// `content` field.
#[derive(Debug, Clone, serde::Serialize, Deserialize)]
pub struct MailContent {
    pub from: EmailAddress,
    pub to: Vec<EmailAddress>,
    pub subject: String,
    pub content: String,
}

impl TryFrom<MailRequest> for MailContent {
    type Error = String;

    fn try_from(req: MailRequest) -> Result<Self, Self::Error> {
        let from = EmailAddress::parse(req.from)?;

        if req.to.is_empty() {
            return Err("at least one recipient is required".to_string());
        }
        let to = req
            .to
            .into_iter()
            .map(EmailAddress::parse)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            from,
            to,
            subject: req.subject,
            content: req.content,
        })
    }
}
