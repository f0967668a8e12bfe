use std::sync::Mutex;

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailerError {
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: MailMessage) -> Result<(), MailerError>;
}

pub fn reset_code_message(from: &str, to: &str, code: &str, ttl_minutes: i64) -> MailMessage {
    MailMessage {
        from: from.to_string(),
        to: to.to_string(),
        subject: "Your password reset code".to_string(),
        body: format!(
            "Use the code {code} to reset your password. It expires in {ttl_minutes} minutes.\n\
             If you did not ask for a reset you can ignore this email."
        ),
    }
}

/// Records deliveries in the log without sending anything.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailerError> {
        tracing::info!(
            to = %mask_email_for_log(&message.to),
            subject = %message.subject,
            "Email delivery disabled; message logged only"
        );
        Ok(())
    }
}

/// Keeps sent messages in memory.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    outbox: Mutex<Vec<MailMessage>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<MailMessage> {
        self.outbox
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn last_to(&self, to: &str) -> Option<MailMessage> {
        self.sent().into_iter().rev().find(|m| m.to == to)
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailerError> {
        self.outbox
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message);
        Ok(())
    }
}

pub fn mask_email_for_log(email: &str) -> String {
    let trimmed = email.trim();
    let Some((local, domain)) = trimmed.split_once('@') else {
        return "***".to_string();
    };

    let mask = |part: &str| {
        part.chars()
            .next()
            .map(|ch| format!("{ch}***"))
            .unwrap_or_else(|| "***".to_string())
    };

    format!("{}@{}", mask(local), mask(domain))
}
