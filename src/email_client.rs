use async_trait::async_trait;
use lettre::address::AddressError;
use lettre::transport::smtp::authentication::Credentials;
use lettre::AsyncSmtpTransport;
use lettre::AsyncTransport;
use lettre::Message;
use lettre::Tokio1Executor;
use secrecy::ExposeSecret;
use secrecy::Secret;

use crate::domain::MailContent;

/// The side effect a worker actually performs for an `email:deliver` task.
/// Kept as a trait so tests can swap in [`RecordingEmailClient`] instead of
/// talking to a real SMTP relay.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(
        &self,
        content: &MailContent,
    ) -> Result<(), String>;
}

/// Sends mail over SMTP via `lettre`, establishing the connection once at
/// startup and reusing it across every delivery rather than reconnecting
/// per message.
pub struct SmtpEmailClient {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpEmailClient {
    pub fn new(
        smtp_host: &str,
        smtp_port: u16,
        smtp_username: String,
        smtp_password: Secret<String>,
    ) -> Result<Self, String> {
        let credentials = Credentials::new(smtp_username, smtp_password.expose_secret().clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)
            .map_err(|err| err.to_string())?
            .port(smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self { transport })
    }
}

#[async_trait]
impl EmailTransport for SmtpEmailClient {
    async fn send(
        &self,
        content: &MailContent,
    ) -> Result<(), String> {
        let from = content
            .from
            .as_ref()
            .parse()
            .map_err(|err: AddressError| err.to_string())?;

        let mut builder = Message::builder().from(from).subject(content.subject.clone());
        for recipient in &content.to {
            let mailbox = recipient.as_ref().parse().map_err(|err: AddressError| err.to_string())?;
            builder = builder.to(mailbox);
        }

        let message = builder
            .body(content.content.clone())
            .map_err(|err| err.to_string())?;

        self.transport
            .send(message)
            .await
            .map_err(|err| err.to_string())?;

        Ok(())
    }
}

/// Records every send instead of performing it, and can be primed to fail
/// the next call. Used in place of `wiremock` for the email side effect,
/// since there is no HTTP boundary left to intercept.
#[derive(Default)]
pub struct RecordingEmailClient {
    sent: std::sync::Mutex<Vec<MailContent>>,
    fail_next: std::sync::Mutex<Option<String>>,
}

impl RecordingEmailClient {
    pub fn new() -> Self { Self::default() }

    pub fn sent(&self) -> Vec<MailContent> { self.sent.lock().unwrap().clone() }

    pub fn fail_next_send(
        &self,
        reason: impl Into<String>,
    ) {
        *self.fail_next.lock().unwrap() = Some(reason.into());
    }
}

#[async_trait]
impl EmailTransport for RecordingEmailClient {
    async fn send(
        &self,
        content: &MailContent,
    ) -> Result<(), String> {
        if let Some(reason) = self.fail_next.lock().unwrap().take() {
            return Err(reason);
        }
        self.sent.lock().unwrap().push(content.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EmailAddress;

    fn content() -> MailContent {
        MailContent {
            from: EmailAddress::parse("a@x.com".to_string()).unwrap(),
            to: vec![EmailAddress::parse("b@y.com".to_string()).unwrap()],
            subject: "hi".to_string(),
            content: "hello".to_string(),
        }
    }

    #[tokio::test]
    async fn recording_client_records_sends() {
        let client = RecordingEmailClient::new();
        client.send(&content()).await.unwrap();
        assert_eq!(client.sent().len(), 1);
    }

    #[tokio::test]
    async fn recording_client_can_be_primed_to_fail() {
        let client = RecordingEmailClient::new();
        client.fail_next_send("smtp timeout");
        let result = client.send(&content()).await;
        assert!(result.is_err());
        assert!(client.sent().is_empty());
    }
}
