mod email_address;
mod mail_request;
// allow external `use` statements to skip `email_address` etc
pub use email_address::EmailAddress;
pub use mail_request::MailContent;
pub use mail_request::MailRequest;
