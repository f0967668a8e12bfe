use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

/// One stored question of a section quiz.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionQuizItem {
    pub course_id: String,
    pub section_index: u32,
    pub item_index: u32,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizProgress {
    pub user_id: String,
    pub course_id: String,
    pub section_index: u32,
    pub passed: bool,
    pub passed_at: DateTime<Utc>,
}

impl Store {
    /// Fails with `NotFound` when the course is gone, leaving nothing behind.
    pub fn insert_quiz_item(&self, item: &SectionQuizItem) -> Result<(), StoreError> {
        let key = keys::quiz_item_key(&item.course_id, item.section_index, item.item_index);
        self.section_quizzes
            .insert(key.as_bytes(), Self::serialize(item)?)?;

        // Course rows are deleted before their quizzes.
        let course_exists = self.course_exists(&item.course_id)?;
        if !course_exists {
            self.section_quizzes.remove(key.as_bytes())?;
        }
        self.cache()
            .on_quiz_written(&item.course_id, item.section_index);
        if !course_exists {
            return Err(StoreError::not_found("course", &item.course_id));
        }
        Ok(())
    }

    pub fn remove_course_quiz_items(&self, course_id: &str) -> Result<u64, StoreError> {
        let removed = Self::remove_prefix(&self.section_quizzes, &keys::quiz_course_prefix(course_id))?;
        self.cache().quiz_sections().clear();
        Ok(removed)
    }

    /// Questions in item order; empty when the section has no quiz.
    pub fn get_section_quiz(
        &self,
        course_id: &str,
        section_index: u32,
    ) -> Result<Vec<SectionQuizItem>, StoreError> {
        Self::scan_values(
            &self.section_quizzes,
            &keys::quiz_section_prefix(course_id, section_index),
        )
    }

    pub fn section_quiz_exists(&self, course_id: &str, section_index: u32) -> Result<bool, StoreError> {
        let hit = self.cache().quiz_sections().get_or_try_load(
            (course_id.to_string(), section_index),
            || -> Result<Option<()>, StoreError> {
                let prefix = keys::quiz_section_prefix(course_id, section_index);
                match self.section_quizzes.scan_prefix(prefix.as_bytes()).next() {
                    Some(item) => {
                        item?;
                        Ok(Some(()))
                    }
                    None => Ok(None),
                }
            },
        )?;
        Ok(hit.is_some())
    }

    pub fn count_quiz_items(&self) -> Result<u64, StoreError> {
        Ok(self.section_quizzes.len() as u64)
    }

    /// Records a pass for the section. Passing again keeps the first record;
    /// the flag is true only when this call created it.
    pub fn mark_section_passed(
        &self,
        user_id: &str,
        course_id: &str,
        section_index: u32,
    ) -> Result<(QuizProgress, bool), StoreError> {
        if self.get_user_by_id(user_id)?.is_none() {
            return Err(StoreError::not_found("user", user_id));
        }
        if self.get_course(course_id)?.is_none() {
            return Err(StoreError::not_found("course", course_id));
        }
        if !self.section_quiz_exists(course_id, section_index)? {
            return Err(StoreError::not_found(
                "section_quiz",
                &format!("{course_id}:{section_index}"),
            ));
        }

        let record = QuizProgress {
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
            section_index,
            passed: true,
            passed_at: Utc::now(),
        };
        let swapped = self.quiz_progress.compare_and_swap(
            keys::quiz_progress_key(user_id, course_id, section_index).as_bytes(),
            None::<&[u8]>,
            Some(Self::serialize(&record)?),
        )?;
        match swapped {
            Ok(()) => Ok((record, true)),
            Err(cas) => match cas.current {
                Some(raw) => Ok((Self::deserialize(&raw)?, false)),
                None => Ok((record, false)),
            },
        }
    }

    /// Passed section indexes, ascending.
    pub fn list_passed_sections(&self, user_id: &str, course_id: &str) -> Result<Vec<u32>, StoreError> {
        let rows: Vec<QuizProgress> = Self::scan_values(
            &self.quiz_progress,
            &keys::quiz_progress_prefix(user_id, course_id),
        )?;
        Ok(rows
            .into_iter()
            .filter(|p| p.passed)
            .map(|p| p.section_index)
            .collect())
    }

    pub fn count_passed_quizzes(&self) -> Result<u64, StoreError> {
        let rows: Vec<QuizProgress> = Self::scan_values(&self.quiz_progress, "")?;
        Ok(rows.iter().filter(|p| p.passed).count() as u64)
    }

    pub(crate) fn remove_quiz_progress_for_course(&self, course_id: &str) -> Result<u64, StoreError> {
        let mut doomed = Vec::new();
        for item in self.quiz_progress.iter() {
            let (k, v) = item?;
            let row: QuizProgress = Self::deserialize(&v)?;
            if row.course_id == course_id {
                doomed.push(k);
            }
        }
        let count = doomed.len() as u64;
        for key in doomed {
            self.quiz_progress.remove(key)?;
        }
        Ok(count)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::operations::courses::tests::sample_course;
    use crate::store::operations::topics::tests::sample_topic;
    use crate::store::operations::users::tests::sample_user;
    use crate::store::test_support::temp_store;

    pub(crate) fn sample_item(course_id: &str, section_index: u32, item_index: u32) -> SectionQuizItem {
        SectionQuizItem {
            course_id: course_id.to_string(),
            section_index,
            item_index,
            question: format!("Question {item_index}?"),
            options: vec!["a".into(), "b".into(), "c".into()],
            correct_answer: "a".into(),
            hint: None,
            created_at: Utc::now(),
        }
    }

    fn seeded(name: &str) -> (tempfile::TempDir, Store) {
        let (dir, store) = temp_store(name);
        store.create_user(&sample_user("u1", "u1@test.com")).unwrap();
        store.create_topic(&sample_topic("t1")).unwrap();
        store.create_course(&sample_course("c1", "t1")).unwrap();
        (dir, store)
    }

    #[test]
    fn items_come_back_in_order() {
        let (_dir, store) = seeded("quizzes-db");
        for i in [2, 0, 1] {
            store.insert_quiz_item(&sample_item("c1", 0, i)).unwrap();
        }
        store.insert_quiz_item(&sample_item("c1", 1, 0)).unwrap();

        let items = store.get_section_quiz("c1", 0).unwrap();
        let order: Vec<u32> = items.iter().map(|i| i.item_index).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(store.count_quiz_items().unwrap(), 4);
    }

    #[test]
    fn existence_cache_sees_new_items() {
        let (_dir, store) = seeded("quizzes-db2");
        assert!(!store.section_quiz_exists("c1", 0).unwrap());
        store.insert_quiz_item(&sample_item("c1", 0, 0)).unwrap();
        assert!(store.section_quiz_exists("c1", 0).unwrap());
        assert!(!store.section_quiz_exists("c1", 1).unwrap());
    }

    #[test]
    fn passing_twice_keeps_one_record() {
        let (_dir, store) = seeded("quizzes-db3");
        store.insert_quiz_item(&sample_item("c1", 0, 0)).unwrap();

        let (first, created) = store.mark_section_passed("u1", "c1", 0).unwrap();
        assert!(created);
        let (second, created) = store.mark_section_passed("u1", "c1", 0).unwrap();
        assert!(!created);
        assert_eq!(first.passed_at, second.passed_at);

        assert_eq!(store.list_passed_sections("u1", "c1").unwrap(), vec![0]);
        assert_eq!(store.count_passed_quizzes().unwrap(), 1);
    }

    #[test]
    fn pass_requires_user_course_and_quiz() {
        let (_dir, store) = seeded("quizzes-db4");
        let entity = |r: Result<(QuizProgress, bool), StoreError>| match r {
            Err(StoreError::NotFound { entity, .. }) => entity,
            other => panic!("expected not found, got {other:?}"),
        };
        store.insert_quiz_item(&sample_item("c1", 0, 0)).unwrap();

        assert_eq!(entity(store.mark_section_passed("ghost", "c1", 0)), "user");
        assert_eq!(entity(store.mark_section_passed("u1", "ghost", 0)), "course");
        assert_eq!(entity(store.mark_section_passed("u1", "c1", 5)), "section_quiz");
    }

    #[test]
    fn items_for_a_missing_course_are_refused() {
        let (_dir, store) = seeded("quizzes-db6");
        store.delete_topic("t1").unwrap();

        assert!(matches!(
            store.insert_quiz_item(&sample_item("c1", 0, 0)),
            Err(StoreError::NotFound { .. })
        ));
        assert_eq!(store.count_quiz_items().unwrap(), 0);
        assert!(!store.section_quiz_exists("c1", 0).unwrap());
    }

    #[test]
    fn quiz_inserts_racing_a_topic_delete_leave_no_orphans() {
        let (_dir, store) = seeded("quizzes-db7");

        std::thread::scope(|scope| {
            let store = &store;
            scope.spawn(move || {
                for i in 0..200 {
                    if store.insert_quiz_item(&sample_item("c1", i % 4, i)).is_err() {
                        break;
                    }
                }
            });
            scope.spawn(move || store.delete_topic("t1").unwrap());
        });

        assert!(store.get_course("c1").unwrap().is_none());
        assert_eq!(store.count_quiz_items().unwrap(), 0);
    }

    #[test]
    fn course_quiz_removal_is_scoped() {
        let (_dir, store) = seeded("quizzes-db8");
        store.create_course(&sample_course("c2", "t1")).unwrap();
        store.insert_quiz_item(&sample_item("c1", 0, 0)).unwrap();
        store.insert_quiz_item(&sample_item("c1", 1, 0)).unwrap();
        store.insert_quiz_item(&sample_item("c2", 0, 0)).unwrap();
        assert!(store.section_quiz_exists("c1", 0).unwrap());

        assert_eq!(store.remove_course_quiz_items("c1").unwrap(), 2);
        assert!(!store.section_quiz_exists("c1", 0).unwrap());
        assert!(store.section_quiz_exists("c2", 0).unwrap());
    }

    #[test]
    fn topic_delete_drops_quizzes_and_progress() {
        let (_dir, store) = seeded("quizzes-db5");
        store.insert_quiz_item(&sample_item("c1", 0, 0)).unwrap();
        store.mark_section_passed("u1", "c1", 0).unwrap();

        let deletion = store.delete_topic("t1").unwrap();
        assert_eq!(deletion.quiz_items, 1);
        assert_eq!(deletion.quiz_progress, 1);
        assert!(!store.section_quiz_exists("c1", 0).unwrap());
    }
}
