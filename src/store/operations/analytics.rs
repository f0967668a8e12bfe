use std::collections::{HashMap, HashSet};

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::store::{Store, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformOverview {
    pub total_users: u64,
    pub total_topics: u64,
    pub total_quiz_items: u64,
    pub passed_quizzes: u64,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicEngagement {
    pub topic_id: String,
    pub title: String,
    pub user_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: u64,
}

/// `passed / total * 100`, two decimals, 0 when there is nothing to pass.
pub fn completion_rate(passed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let rate = passed as f64 / total as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

impl Store {
    pub fn platform_overview(&self) -> Result<PlatformOverview, StoreError> {
        let total_quiz_items = self.count_quiz_items()?;
        let passed_quizzes = self.count_passed_quizzes()?;
        Ok(PlatformOverview {
            total_users: self.count_users()?,
            total_topics: self.count_topics()?,
            total_quiz_items,
            passed_quizzes,
            completion_rate: completion_rate(passed_quizzes, total_quiz_items),
        })
    }

    /// Topics ranked by distinct learners with an interaction on any of their
    /// courses. Most engaged first unless `least`. Topics nobody touched are
    /// left out.
    pub fn topic_engagement(&self, least: bool, limit: usize) -> Result<Vec<TopicEngagement>, StoreError> {
        let mut learners: HashMap<String, HashSet<String>> = HashMap::new();
        for interaction in self.all_interactions()? {
            let Some(course) = self.get_course(&interaction.course_id)? else {
                continue;
            };
            learners
                .entry(course.topic_id)
                .or_default()
                .insert(interaction.user_id);
        }

        let mut ranked = Vec::with_capacity(learners.len());
        for (topic_id, users) in learners {
            let Some(topic) = self.get_topic(&topic_id)? else {
                continue;
            };
            ranked.push(TopicEngagement {
                topic_id,
                title: topic.title,
                user_count: users.len() as u64,
            });
        }

        ranked.sort_by(|a, b| {
            let by_count = if least {
                a.user_count.cmp(&b.user_count)
            } else {
                b.user_count.cmp(&a.user_count)
            };
            by_count.then_with(|| a.title.cmp(&b.title))
        });
        ranked.truncate(limit);
        Ok(ranked)
    }

    /// New sign-ups per UTC day for the `days` days ending at `today`,
    /// oldest first, with empty days reported as zero.
    pub fn daily_new_users(&self, today: NaiveDate, days: u32) -> Result<Vec<DailyCount>, StoreError> {
        if days == 0 {
            return Ok(Vec::new());
        }
        let start = today - Duration::days(i64::from(days) - 1);

        let mut per_day: HashMap<NaiveDate, u64> = HashMap::new();
        for user in self.all_users()? {
            let day = user.created_at.date_naive();
            if day >= start && day <= today {
                *per_day.entry(day).or_default() += 1;
            }
        }

        Ok((0..days)
            .map(|offset| {
                let date = start + Duration::days(i64::from(offset));
                DailyCount {
                    date,
                    count: per_day.get(&date).copied().unwrap_or(0),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::store::operations::courses::tests::sample_course;
    use crate::store::operations::quizzes::tests::sample_item;
    use crate::store::operations::topics::tests::sample_topic;
    use crate::store::operations::users::tests::sample_user;
    use crate::store::test_support::temp_store;

    #[test]
    fn completion_rate_rounds_to_two_decimals() {
        assert_eq!(completion_rate(0, 0), 0.0);
        assert_eq!(completion_rate(1, 3), 33.33);
        assert_eq!(completion_rate(2, 3), 66.67);
        assert_eq!(completion_rate(3, 3), 100.0);
    }

    #[test]
    fn overview_counts() {
        let (_dir, store) = temp_store("analytics-db");
        store.create_user(&sample_user("u1", "u1@test.com")).unwrap();
        store.create_topic(&sample_topic("t1")).unwrap();
        store.create_course(&sample_course("c1", "t1")).unwrap();
        for i in 0..3 {
            store.insert_quiz_item(&sample_item("c1", i, 0)).unwrap();
        }
        store.mark_section_passed("u1", "c1", 0).unwrap();

        let overview = store.platform_overview().unwrap();
        assert_eq!(overview.total_users, 1);
        assert_eq!(overview.total_topics, 1);
        assert_eq!(overview.total_quiz_items, 3);
        assert_eq!(overview.passed_quizzes, 1);
        assert_eq!(overview.completion_rate, 33.33);
    }

    #[test]
    fn engagement_ranks_by_distinct_users() {
        let (_dir, store) = temp_store("analytics-db2");
        for t in ["t1", "t2", "t3"] {
            store.create_topic(&sample_topic(t)).unwrap();
        }
        store.create_course(&sample_course("c1", "t1")).unwrap();
        store.create_course(&sample_course("c1b", "t1")).unwrap();
        store.create_course(&sample_course("c2", "t2")).unwrap();
        store.create_course(&sample_course("c3", "t3")).unwrap();

        // Same user on two courses of t1 counts once.
        store.enroll("u1", "c1").unwrap();
        store.enroll("u1", "c1b").unwrap();
        store.enroll("u1", "c2").unwrap();
        store.enroll("u2", "c2").unwrap();

        let most = store.topic_engagement(false, 3).unwrap();
        let summary: Vec<_> = most.iter().map(|t| (t.topic_id.as_str(), t.user_count)).collect();
        assert_eq!(summary, vec![("t2", 2), ("t1", 1)]);

        let least = store.topic_engagement(true, 1).unwrap();
        assert_eq!(least.len(), 1);
        assert_eq!(least[0].topic_id, "t1");
    }

    #[test]
    fn new_users_window_is_zero_filled() {
        let (_dir, store) = temp_store("analytics-db3");
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let at = |d: u32| Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap();

        for (id, day) in [("a", 10), ("b", 10), ("c", 6), ("d", 3), ("e", 2)] {
            let mut user = sample_user(id, &format!("{id}@test.com"));
            user.created_at = at(day);
            store.create_user(&user).unwrap();
        }

        let counts = store.daily_new_users(today, 7).unwrap();
        assert_eq!(counts.len(), 7);
        assert_eq!(counts[0].date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        let values: Vec<u64> = counts.iter().map(|c| c.count).collect();
        assert_eq!(values, vec![0, 0, 1, 0, 0, 0, 2]);
    }
}
