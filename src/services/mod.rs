pub mod content;
pub mod llm_provider;
pub mod mailer;
pub mod recommendation;
