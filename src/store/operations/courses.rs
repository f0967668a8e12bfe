use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CourseLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl CourseLevel {
    /// Case-insensitive; unknown labels fall back to `Beginner`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "intermediate" => CourseLevel::Intermediate,
            "advanced" => CourseLevel::Advanced,
            _ => CourseLevel::Beginner,
        }
    }
}

impl fmt::Display for CourseLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CourseLevel::Beginner => "Beginner",
            CourseLevel::Intermediate => "Intermediate",
            CourseLevel::Advanced => "Advanced",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub title: String,
    pub description: String,
    pub level: CourseLevel,
    pub topic_id: String,
    pub is_published: bool,
    /// Set once the generated body is stored.
    pub is_detail_created_by_ai: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Course {
    pub fn is_built(&self) -> bool {
        self.is_detail_created_by_ai
    }
}

impl Store {
    pub fn create_course(&self, course: &Course) -> Result<(), StoreError> {
        if self.get_topic(&course.topic_id)?.is_none() {
            return Err(StoreError::not_found("topic", &course.topic_id));
        }
        let course_key = keys::course_key(&course.id);
        let index_key = keys::course_topic_index_key(&course.topic_id, &course.id);
        self.courses
            .insert(course_key.as_bytes(), Self::serialize(course)?)?;
        self.courses_by_topic
            .insert(index_key.as_bytes(), &[] as &[u8])?;

        // Topic delete removes the topic row before scanning its courses.
        if !self.topics.contains_key(keys::topic_key(&course.topic_id).as_bytes())? {
            self.courses_by_topic.remove(index_key.as_bytes())?;
            self.courses.remove(course_key.as_bytes())?;
            self.cache().on_course_written(&course.id);
            return Err(StoreError::not_found("topic", &course.topic_id));
        }
        self.cache().on_course_written(&course.id);
        Ok(())
    }

    /// Reads the row directly, bypassing the cache.
    pub fn course_exists(&self, course_id: &str) -> Result<bool, StoreError> {
        Ok(self.courses.contains_key(keys::course_key(course_id).as_bytes())?)
    }

    pub fn get_course(&self, course_id: &str) -> Result<Option<Course>, StoreError> {
        self.cache()
            .courses()
            .get_or_try_load(course_id.to_string(), || -> Result<Option<Course>, StoreError> {
                match self.courses.get(keys::course_key(course_id).as_bytes())? {
                    Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
                    None => Ok(None),
                }
            })
    }

    /// Flags the course as built and published. A course removed in the
    /// meantime stays removed.
    pub fn mark_course_built(&self, course_id: &str) -> Result<Course, StoreError> {
        let course = Self::update_record(
            &self.courses,
            &keys::course_key(course_id),
            "course",
            course_id,
            |course: &mut Course| {
                course.is_detail_created_by_ai = true;
                course.is_published = true;
                course.updated_at = Utc::now();
            },
        )?;
        self.cache().on_course_written(course_id);
        Ok(course)
    }

    /// Built courses, newest first.
    pub fn list_built_courses(&self) -> Result<Vec<Course>, StoreError> {
        let courses = self.cache().built_courses().get_or_try_load((), || {
            let mut built: Vec<Course> = Self::scan_values::<Course>(&self.courses, "")?
                .into_iter()
                .filter(Course::is_built)
                .collect();
            built.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok::<_, StoreError>(Some(built))
        })?;
        Ok(courses.unwrap_or_default())
    }

    pub(crate) fn course_ids_for_topic(&self, topic_id: &str) -> Result<Vec<String>, StoreError> {
        let prefix = keys::course_topic_index_prefix(topic_id);
        let mut ids = Vec::new();
        for item in self.courses_by_topic.scan_prefix(prefix.as_bytes()) {
            let (k, _) = item?;
            match std::str::from_utf8(&k) {
                Ok(key) => {
                    if let Some(course_id) = key.strip_prefix(prefix.as_str()) {
                        ids.push(course_id.to_string());
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Skipping course index key with invalid UTF-8"),
            }
        }
        Ok(ids)
    }

    pub fn list_topic_courses(
        &self,
        topic_id: &str,
        built_only: bool,
    ) -> Result<Vec<Course>, StoreError> {
        let mut courses = Vec::new();
        for course_id in self.course_ids_for_topic(topic_id)? {
            if let Some(course) = self.get_course(&course_id)? {
                if !built_only || course.is_built() {
                    courses.push(course);
                }
            }
        }
        courses.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(courses)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::operations::topics::tests::sample_topic;
    use crate::store::test_support::temp_store;

    pub(crate) fn sample_course(id: &str, topic_id: &str) -> Course {
        Course {
            id: id.to_string(),
            title: format!("Course {id}"),
            description: "An introduction".to_string(),
            level: CourseLevel::Beginner,
            topic_id: topic_id.to_string(),
            is_published: false,
            is_detail_created_by_ai: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn level_parsing_is_lenient() {
        assert_eq!(CourseLevel::parse_lenient(" ADVANCED "), CourseLevel::Advanced);
        assert_eq!(CourseLevel::parse_lenient("intermediate"), CourseLevel::Intermediate);
        assert_eq!(CourseLevel::parse_lenient("expert"), CourseLevel::Beginner);
        assert_eq!(CourseLevel::Advanced.to_string(), "Advanced");
    }

    #[test]
    fn course_requires_topic() {
        let (_dir, store) = temp_store("courses-db");
        assert!(matches!(
            store.create_course(&sample_course("c1", "missing")),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn built_list_tracks_mark_built() {
        let (_dir, store) = temp_store("courses-db2");
        store.create_topic(&sample_topic("t1")).unwrap();
        store.create_course(&sample_course("c1", "t1")).unwrap();
        store.create_course(&sample_course("c2", "t1")).unwrap();

        assert!(store.list_built_courses().unwrap().is_empty());
        assert!(!store.get_course("c1").unwrap().unwrap().is_built());

        store.mark_course_built("c1").unwrap();
        let built = store.list_built_courses().unwrap();
        assert_eq!(built.len(), 1);
        assert_eq!(built[0].id, "c1");
        assert!(store.get_course("c1").unwrap().unwrap().is_published);

        assert_eq!(store.list_topic_courses("t1", false).unwrap().len(), 2);
        assert_eq!(store.list_topic_courses("t1", true).unwrap().len(), 1);
    }

    #[test]
    fn built_list_loaded_across_a_build_is_not_cached() {
        let (_dir, store) = temp_store("courses-db4");
        store.create_topic(&sample_topic("t1")).unwrap();
        store.create_course(&sample_course("c1", "t1")).unwrap();

        // The list read here predates the build that lands before it is cached.
        let stale = store
            .cache()
            .built_courses()
            .get_or_try_load((), || {
                store.mark_course_built("c1")?;
                Ok::<_, StoreError>(Some(Vec::new()))
            })
            .unwrap();
        assert_eq!(stale.map(|c| c.len()), Some(0));

        let built = store.list_built_courses().unwrap();
        assert_eq!(built.len(), 1);
        assert_eq!(built[0].id, "c1");
    }

    #[test]
    fn mark_built_after_topic_delete_does_not_resurrect() {
        let (_dir, store) = temp_store("courses-db5");
        store.create_topic(&sample_topic("t1")).unwrap();
        store.create_course(&sample_course("c1", "t1")).unwrap();
        store.delete_topic("t1").unwrap();

        assert!(matches!(
            store.mark_course_built("c1"),
            Err(StoreError::NotFound { .. })
        ));
        assert!(store.get_course("c1").unwrap().is_none());
        assert!(store.list_built_courses().unwrap().is_empty());
    }

    #[test]
    fn concurrent_builds_and_reads_converge() {
        let (_dir, store) = temp_store("courses-db6");
        store.create_topic(&sample_topic("t1")).unwrap();
        for i in 0..8 {
            store.create_course(&sample_course(&format!("c{i}"), "t1")).unwrap();
        }

        std::thread::scope(|scope| {
            for i in 0..8 {
                let store = &store;
                scope.spawn(move || store.mark_course_built(&format!("c{i}")).unwrap());
                scope.spawn(move || {
                    for _ in 0..20 {
                        store.list_built_courses().unwrap();
                        store.get_course(&format!("c{i}")).unwrap();
                    }
                });
            }
        });

        assert_eq!(store.list_built_courses().unwrap().len(), 8);
        for i in 0..8 {
            assert!(store.get_course(&format!("c{i}")).unwrap().unwrap().is_built());
        }
    }

    #[test]
    fn topic_delete_removes_courses() {
        let (_dir, store) = temp_store("courses-db3");
        store.create_topic(&sample_topic("t1")).unwrap();
        store.create_course(&sample_course("c1", "t1")).unwrap();
        store.mark_course_built("c1").unwrap();
        assert_eq!(store.list_built_courses().unwrap().len(), 1);

        let deletion = store.delete_topic("t1").unwrap();
        assert_eq!(deletion.course_ids, vec!["c1".to_string()]);
        assert!(store.get_course("c1").unwrap().is_none());
        assert!(store.list_built_courses().unwrap().is_empty());
        assert!(store.course_ids_for_topic("t1").unwrap().is_empty());
    }
}
