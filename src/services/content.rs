//! What the course pipeline asks of a generative model, and how replies are
//! read back.
//!
//! Model replies are free text that usually, but not always, is pure JSON.
//! Parsing tries the whole reply first, then the first balanced JSON value
//! embedded in it. Entries missing required fields are dropped rather than
//! failing the whole reply.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::services::llm_provider::LlmError;
use crate::store::operations::courses::CourseLevel;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseOutline {
    pub title: String,
    pub description: String,
    pub level: CourseLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionOutline {
    pub title: String,
    pub subsections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizItem {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub hint: Option<String>,
}

/// Topic fields the prompts are built from.
#[derive(Debug, Clone, Copy)]
pub struct TopicBrief<'a> {
    pub title: &'a str,
    pub description: &'a str,
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn course_outlines(
        &self,
        topic: TopicBrief<'_>,
        count: usize,
    ) -> Result<Vec<CourseOutline>, LlmError>;

    async fn section_outline(
        &self,
        topic: TopicBrief<'_>,
        course: &CourseOutline,
    ) -> Result<Vec<SectionOutline>, LlmError>;

    async fn subsection_content(
        &self,
        course: &CourseOutline,
        section_title: &str,
        subsection_title: &str,
    ) -> Result<String, LlmError>;

    /// `material` is the section's subsection bodies joined together.
    async fn section_quiz(
        &self,
        course: &CourseOutline,
        section_title: &str,
        material: &str,
    ) -> Result<Vec<QuizItem>, LlmError>;
}

/// Parses `text` as JSON, falling back to the first balanced `[...]` or
/// `{...}` inside it.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }

    let bytes = trimmed.as_bytes();
    let mut start = 0;
    while let Some(offset) = trimmed[start..].find(['[', '{']) {
        let open = start + offset;
        if let Some(close) = balanced_end(bytes, open) {
            if let Ok(v) = serde_json::from_str::<Value>(&trimmed[open..=close]) {
                return Some(v);
            }
        }
        start = open + 1;
    }
    None
}

/// Index of the bracket closing the one at `open`, skipping string contents.
fn balanced_end(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' | b'{' => depth += 1,
            b']' | b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// The array itself, or the first array found under one of `keys`.
fn list_under<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(map) => keys.iter().find_map(|k| map.get(*k)?.as_array()),
        _ => None,
    }
}

fn text_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| value.get(*k)?.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn invalid(what: &str) -> LlmError {
    LlmError::InvalidResponse(format!("no usable {what} in model reply"))
}

pub fn parse_course_outlines(text: &str) -> Result<Vec<CourseOutline>, LlmError> {
    let value = extract_json(text).ok_or_else(|| invalid("JSON"))?;
    let items = list_under(&value, &["courses", "data"]).ok_or_else(|| invalid("course list"))?;

    Ok(items
        .iter()
        .filter_map(|item| {
            let title = text_field(item, &["title", "name"])?;
            Some(CourseOutline {
                title,
                description: text_field(item, &["description", "summary"]).unwrap_or_default(),
                level: text_field(item, &["course_level", "courseLevel", "level"])
                    .map(|l| CourseLevel::parse_lenient(&l))
                    .unwrap_or(CourseLevel::Beginner),
            })
        })
        .collect())
}

pub fn parse_section_outline(text: &str) -> Result<Vec<SectionOutline>, LlmError> {
    let value = extract_json(text).ok_or_else(|| invalid("JSON"))?;
    let items = list_under(&value, &["sections", "data"]).ok_or_else(|| invalid("section list"))?;

    Ok(items
        .iter()
        .filter_map(|item| {
            let title = text_field(item, &["title", "name"])?;
            let subsections = item
                .get("subsections")
                .or_else(|| item.get("sub_sections"))
                .and_then(Value::as_array)
                .map(|subs| {
                    subs.iter()
                        .filter_map(|s| match s {
                            Value::String(t) => Some(t.trim().to_string()).filter(|t| !t.is_empty()),
                            other => text_field(other, &["title", "name"]),
                        })
                        .collect()
                })
                .unwrap_or_default();
            Some(SectionOutline { title, subsections })
        })
        .collect())
}

pub fn parse_quiz(text: &str) -> Result<Vec<QuizItem>, LlmError> {
    let value = extract_json(text).ok_or_else(|| invalid("JSON"))?;
    let items = list_under(&value, &["questions", "quiz", "data"])
        .ok_or_else(|| invalid("question list"))?;

    let parsed: Vec<QuizItem> = items
        .iter()
        .filter_map(|item| {
            let question = text_field(item, &["question"])?;
            let options: Vec<String> = item
                .get("options")?
                .as_array()?
                .iter()
                .filter_map(Value::as_str)
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
            if options.is_empty() {
                return None;
            }
            let answer = text_field(item, &["correct_answer", "correctAnswer", "answer"])?;
            let Some(correct_answer) = matching_option(&options, &answer) else {
                tracing::debug!(question = %question, answer = %answer, "Dropping quiz item whose answer is not an option");
                return None;
            };
            Some(QuizItem {
                question,
                options,
                correct_answer,
                hint: text_field(item, &["hint"]),
            })
        })
        .collect();

    if parsed.is_empty() {
        return Err(invalid("quiz question"));
    }
    Ok(parsed)
}

/// The option the answer names: an exact match, else the only
/// case-insensitive one.
fn matching_option(options: &[String], answer: &str) -> Option<String> {
    if let Some(exact) = options.iter().find(|o| o.as_str() == answer) {
        return Some(exact.clone());
    }
    let mut folded = options.iter().filter(|o| o.eq_ignore_ascii_case(answer));
    match (folded.next(), folded.next()) {
        (Some(only), None) => Some(only.clone()),
        _ => None,
    }
}

pub fn parse_subsection_content(text: &str) -> Result<String, LlmError> {
    let body = text.trim();
    if body.is_empty() {
        return Err(invalid("content"));
    }
    Ok(body.to_string())
}
