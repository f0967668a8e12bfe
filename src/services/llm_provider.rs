use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LLMConfig;
use crate::services::content::{
    parse_course_outlines, parse_quiz, parse_section_outline, parse_subsection_content,
    ContentGenerator, CourseOutline, QuizItem, SectionOutline, TopicBrief,
};

/// Longest slice of an error body kept in `LlmError::ApiError`.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct LlmProvider {
    config: LLMConfig,
    client: reqwest::Client,
}

impl LlmProvider {
    pub fn new(config: &LLMConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config: config.clone(),
            client,
        }
    }

    /// Logs the mode the provider will run in and warns about settings that
    /// make every real request fail.
    pub fn log_config(config: &LLMConfig) {
        if !config.enabled {
            tracing::warn!("LLM disabled; new topics will not get generated courses");
        } else if config.mock {
            tracing::info!("LLM running in mock mode");
        } else if config.api_key.trim().is_empty() {
            tracing::warn!(api_url = %config.api_url, "LLM enabled without LLM_API_KEY");
        } else {
            tracing::info!(api_url = %config.api_url, model = %config.model, "LLM enabled");
        }
    }

    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, LlmError> {
        if !self.config.enabled {
            return Err(LlmError::Disabled);
        }
        if self.config.mock {
            return Ok("Mock LLM response".to_string());
        }

        let url = format!("{}/chat/completions", self.config.api_url.trim_end_matches('/'));
        let body = ChatRequest {
            model: &self.config.model,
            messages: &messages,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(LlmError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let mut message = response.text().await.unwrap_or_default();
            if message.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|&i| message.is_char_boundary(i))
                    .unwrap_or(0);
                message.truncate(cut);
            }
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(LlmError::from_reqwest)?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("reply has no message content".to_string()))
    }

    /// Sends a system + user prompt, or answers with `mock` in mock mode.
    async fn ask(&self, system: String, user: String, mock: impl FnOnce() -> String) -> Result<String, LlmError> {
        if !self.config.enabled {
            return Err(LlmError::Disabled);
        }
        if self.config.mock {
            return Ok(mock());
        }
        self.chat(vec![ChatMessage::system(system), ChatMessage::user(user)])
            .await
    }
}

#[async_trait]
impl ContentGenerator for LlmProvider {
    async fn course_outlines(
        &self,
        topic: TopicBrief<'_>,
        count: usize,
    ) -> Result<Vec<CourseOutline>, LlmError> {
        let mut system = format!(
            "You are an AI course planner. Generate {count} structured course ideas for the given \
             topic, ranging from beginner to advanced level. Each course needs a clear, concise \
             title, a description of at most 30 words and a course level (Beginner, Intermediate \
             or Advanced). All courses must be unique in content and coverage. Return a JSON \
             array of objects with keys: title, description, course_level."
        );
        if !topic.description.trim().is_empty() {
            system.push_str(&format!(
                "\n\nTopic description provided by the curator: \"{}\"",
                topic.description.trim()
            ));
        }
        let user = format!("Generate {count} courses for the topic: {}", topic.title);

        let reply = self
            .ask(system, user, || mock::course_outlines(topic.title, count))
            .await?;
        let mut outlines = parse_course_outlines(&reply)?;
        outlines.truncate(count);
        Ok(outlines)
    }

    async fn section_outline(
        &self,
        topic: TopicBrief<'_>,
        course: &CourseOutline,
    ) -> Result<Vec<SectionOutline>, LlmError> {
        let system = "You are an AI curriculum designer. Break the given course into 3 to 6 \
                      sections, each with 2 to 4 subsections. Return a JSON array of objects \
                      with keys: title (string) and subsections (array of subsection titles)."
            .to_string();
        let user = format!(
            "Topic: {}\nCourse: {}\nLevel: {}\nDescription: {}",
            topic.title, course.title, course.level, course.description
        );

        let reply = self
            .ask(system, user, || mock::section_outline(&course.title))
            .await?;
        parse_section_outline(&reply)
    }

    async fn subsection_content(
        &self,
        course: &CourseOutline,
        section_title: &str,
        subsection_title: &str,
    ) -> Result<String, LlmError> {
        let system = format!(
            "You are an expert instructor writing a {} level course. Write the lesson text for \
             one subsection in plain prose with short examples. Do not repeat the title.",
            course.level
        );
        let user = format!(
            "Course: {}\nSection: {section_title}\nSubsection: {subsection_title}",
            course.title
        );

        let reply = self
            .ask(system, user, || mock::subsection_content(section_title, subsection_title))
            .await?;
        parse_subsection_content(&reply)
    }

    async fn section_quiz(
        &self,
        course: &CourseOutline,
        section_title: &str,
        material: &str,
    ) -> Result<Vec<QuizItem>, LlmError> {
        let system = "You write multiple-choice quizzes. Using only the provided material, write \
                      3 to 5 questions. Return a JSON array of objects with keys: question, \
                      options (array of 4 strings), correct_answer (one of the options) and an \
                      optional hint."
            .to_string();
        let user = format!(
            "Course: {}\nSection: {section_title}\nMaterial:\n{material}",
            course.title
        );

        let reply = self
            .ask(system, user, || mock::section_quiz(section_title))
            .await?;
        parse_quiz(&reply)
    }
}

/// Deterministic replies used when `LLM_MOCK` is on.
mod mock {
    use serde_json::json;

    const LEVELS: [&str; 3] = ["Beginner", "Intermediate", "Advanced"];

    pub fn course_outlines(topic: &str, count: usize) -> String {
        let courses: Vec<_> = (0..count)
            .map(|i| {
                json!({
                    "title": format!("{topic} {}", i + 1),
                    "description": format!("Part {} of a guided path through {topic}.", i + 1),
                    "course_level": LEVELS[i * LEVELS.len() / count.max(1)],
                })
            })
            .collect();
        serde_json::Value::Array(courses).to_string()
    }

    pub fn section_outline(course: &str) -> String {
        json!([
            {"title": format!("Foundations of {course}"), "subsections": ["Core ideas", "Worked example"]},
            {"title": format!("Applying {course}"), "subsections": ["Common patterns", "Pitfalls"]},
        ])
        .to_string()
    }

    pub fn subsection_content(section: &str, subsection: &str) -> String {
        format!("{subsection} is a key part of {section}. This lesson walks through it step by step.")
    }

    pub fn section_quiz(section: &str) -> String {
        json!([
            {
                "question": format!("What is the focus of \"{section}\"?"),
                "options": [section, "Something unrelated", "Nothing", "All of the above"],
                "correct_answer": section,
                "hint": "Look at the section title.",
            }
        ])
        .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Deserialize)]
struct ChatReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm is disabled")]
    Disabled,
    #[error("llm request timed out")]
    Timeout,
    #[error("llm network error: {0}")]
    Network(String),
    #[error("llm api error: status={status}, message={message}")]
    ApiError { status: u16, message: String },
    #[error("llm invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else if e.is_decode() {
            LlmError::InvalidResponse(e.to_string())
        } else {
            LlmError::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(enabled: bool, mock: bool) -> LLMConfig {
        LLMConfig {
            enabled,
            mock,
            api_url: "http://127.0.0.1:9".to_string(),
            api_key: String::new(),
            model: "test-model".to_string(),
            temperature: 0.7,
            timeout_secs: 1,
        }
    }

    const TOPIC: TopicBrief<'static> = TopicBrief {
        title: "Rust",
        description: "Systems programming",
    };

    #[tokio::test]
    async fn disabled_mode_returns_error() {
        let provider = LlmProvider::new(&cfg(false, true));
        assert!(matches!(provider.chat(vec![]).await, Err(LlmError::Disabled)));
        assert!(matches!(
            provider.course_outlines(TOPIC, 3).await,
            Err(LlmError::Disabled)
        ));
    }

    #[tokio::test]
    async fn mock_mode_returns_text() {
        let provider = LlmProvider::new(&cfg(true, true));
        let result = provider.chat(vec![]).await.unwrap();
        assert_eq!(result, "Mock LLM response");
    }

    #[tokio::test]
    async fn mock_mode_generates_a_full_course() {
        let provider = LlmProvider::new(&cfg(true, true));

        let outlines = provider.course_outlines(TOPIC, 4).await.unwrap();
        assert_eq!(outlines.len(), 4);
        assert_eq!(outlines[0].title, "Rust 1");

        let sections = provider.section_outline(TOPIC, &outlines[0]).await.unwrap();
        assert!(!sections.is_empty());
        assert!(sections.iter().all(|s| !s.subsections.is_empty()));

        let body = provider
            .subsection_content(&outlines[0], &sections[0].title, &sections[0].subsections[0])
            .await
            .unwrap();
        assert!(!body.is_empty());

        let quiz = provider
            .section_quiz(&outlines[0], &sections[0].title, &body)
            .await
            .unwrap();
        assert!(quiz[0].options.contains(&quiz[0].correct_answer));
    }

    #[tokio::test]
    async fn unreachable_api_is_a_network_or_timeout_error() {
        let provider = LlmProvider::new(&cfg(true, false));
        let err = provider
            .chat(vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Network(_) | LlmError::Timeout));
    }
}
