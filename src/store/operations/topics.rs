use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub title: String,
    pub description: String,
    pub created_by: String,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a topic delete removed. `course_ids` lets callers clean up
/// course bodies held outside the relational store.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TopicDeletion {
    pub course_ids: Vec<String>,
    pub interactions: u64,
    pub quiz_items: u64,
    pub quiz_progress: u64,
    pub preferences: u64,
}

/// Text fields an edit may change. `None` keeps the stored value.
#[derive(Debug, Default, Clone)]
pub struct TopicEdit {
    pub title: Option<String>,
    pub description: Option<String>,
}

impl Store {
    pub fn create_topic(&self, topic: &Topic) -> Result<(), StoreError> {
        let key = keys::topic_key(&topic.id);
        let inserted = self
            .topics
            .compare_and_swap(
                key.as_bytes(),
                None::<&[u8]>,
                Some(Self::serialize(topic)?),
            )?;
        if inserted.is_err() {
            return Err(StoreError::Conflict {
                entity: "topic".to_string(),
                key: topic.id.clone(),
            });
        }
        self.cache().on_topic_written(&topic.id);
        Ok(())
    }

    pub fn get_topic(&self, topic_id: &str) -> Result<Option<Topic>, StoreError> {
        self.cache()
            .topics()
            .get_or_try_load(topic_id.to_string(), || -> Result<Option<Topic>, StoreError> {
                match self.topics.get(keys::topic_key(topic_id).as_bytes())? {
                    Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
                    None => Ok(None),
                }
            })
    }

    /// Newest first.
    pub fn list_topics(&self) -> Result<Vec<Topic>, StoreError> {
        let topics = self.cache().topic_list().get_or_try_load((), || {
            let mut topics: Vec<Topic> = Self::scan_values(&self.topics, "")?;
            topics.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok::<_, StoreError>(Some(topics))
        })?;
        Ok(topics.unwrap_or_default())
    }

    pub fn count_topics(&self) -> Result<u64, StoreError> {
        Ok(self.topics.len() as u64)
    }

    /// Applies a text edit to the stored topic. Fields outside the edit,
    /// such as the publish flag, keep whatever value is current.
    pub fn update_topic(&self, topic_id: &str, edit: &TopicEdit) -> Result<Topic, StoreError> {
        let topic = Self::update_record(
            &self.topics,
            &keys::topic_key(topic_id),
            "topic",
            topic_id,
            |topic: &mut Topic| {
                if let Some(title) = &edit.title {
                    topic.title = title.clone();
                }
                if let Some(description) = &edit.description {
                    topic.description = description.clone();
                }
                topic.updated_at = Utc::now();
            },
        )?;
        self.cache().on_topic_written(topic_id);
        Ok(topic)
    }

    pub fn set_topic_published(&self, topic_id: &str, is_published: bool) -> Result<Topic, StoreError> {
        let topic = Self::update_record(
            &self.topics,
            &keys::topic_key(topic_id),
            "topic",
            topic_id,
            |topic: &mut Topic| {
                topic.is_published = is_published;
                topic.updated_at = Utc::now();
            },
        )?;
        self.cache().on_topic_written(topic_id);
        Ok(topic)
    }

    /// Deletes the topic with its courses and all learner state attached to them.
    ///
    /// Parent rows go before their children: the topic row first, then each
    /// course row ahead of its quizzes and progress. Writers of child rows
    /// re-check the parent after writing, so a write racing this delete is
    /// either swept here or undone by the writer.
    pub fn delete_topic(&self, topic_id: &str) -> Result<TopicDeletion, StoreError> {
        let key = keys::topic_key(topic_id);
        if self.topics.remove(key.as_bytes())?.is_none() {
            return Err(StoreError::not_found("topic", topic_id));
        }
        self.cache().on_topic_written(topic_id);

        let course_ids = self.course_ids_for_topic(topic_id)?;
        let mut deletion = TopicDeletion {
            preferences: self.remove_topic_preferences_for_topic(topic_id)?,
            ..TopicDeletion::default()
        };
        for course_id in &course_ids {
            self.courses.remove(keys::course_key(course_id).as_bytes())?;
            deletion.interactions += self.remove_interactions_for_course(course_id)?;
            deletion.quiz_progress += self.remove_quiz_progress_for_course(course_id)?;
            deletion.quiz_items +=
                Self::remove_prefix(&self.section_quizzes, &keys::quiz_course_prefix(course_id))?;
        }
        Self::remove_prefix(
            &self.courses_by_topic,
            &keys::course_topic_index_prefix(topic_id),
        )?;
        deletion.course_ids = course_ids;

        self.cache().on_topic_removed(topic_id);
        tracing::info!(topic_id, courses = deletion.course_ids.len(), "Topic deleted");
        Ok(deletion)
    }
}
