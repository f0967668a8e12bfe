//! Course recommendations from two signals: topics the user declared an
//! interest in, and topics of courses the user is enrolled in.
//!
//! The selector is a pure function of its inputs plus an injected RNG.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::store::operations::courses::Course;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Branch {
    /// No signal.
    Random,
    /// Enrollments only.
    EnrolledTopics,
    /// Interests only.
    InterestTopics,
    /// Both signals.
    Blended,
}

impl Branch {
    pub fn for_signals(has_interests: bool, has_enrollments: bool) -> Self {
        match (has_interests, has_enrollments) {
            (false, false) => Branch::Random,
            (false, true) => Branch::EnrolledTopics,
            (true, false) => Branch::InterestTopics,
            (true, true) => Branch::Blended,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct Signals {
    pub interest_topics: HashSet<String>,
    pub enrolled_topics: HashSet<String>,
    /// Courses that must not be recommended, typically every course the user
    /// already interacted with.
    pub excluded_courses: HashSet<String>,
}

impl Signals {
    pub fn branch(&self) -> Branch {
        Branch::for_signals(
            !self.interest_topics.is_empty(),
            !self.enrolled_topics.is_empty(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub branch: Branch,
    pub courses: Vec<Course>,
}

/// Picks up to `limit` distinct courses from `catalog`.
///
/// With both signals, `limit / 2` (rounded down) come from interest topics
/// and the rest of the budget from enrollment topics.
pub fn select<R: Rng + ?Sized>(
    catalog: &[Course],
    signals: &Signals,
    limit: usize,
    rng: &mut R,
) -> Selection {
    let branch = signals.branch();
    let mut picked: Vec<Course> = Vec::with_capacity(limit);
    let mut taken: HashSet<&str> = HashSet::new();

    let mut draw = |in_pool: &dyn Fn(&Course) -> bool, n: usize, picked: &mut Vec<Course>, rng: &mut R| {
        let pool: Vec<&Course> = catalog
            .iter()
            .filter(|c| !signals.excluded_courses.contains(&c.id))
            .filter(|c| !taken.contains(c.id.as_str()))
            .filter(|c| in_pool(c))
            .collect();
        let mut chosen: Vec<&Course> = pool.choose_multiple(rng, n).copied().collect();
        chosen.shuffle(rng);
        for course in chosen {
            if taken.insert(course.id.as_str()) {
                picked.push(course.clone());
            }
        }
    };

    let in_interests = |c: &Course| signals.interest_topics.contains(&c.topic_id);
    let in_enrolled = |c: &Course| signals.enrolled_topics.contains(&c.topic_id);

    match branch {
        Branch::Random => draw(&|_: &Course| true, limit, &mut picked, rng),
        Branch::EnrolledTopics => draw(&in_enrolled, limit, &mut picked, rng),
        Branch::InterestTopics => draw(&in_interests, limit, &mut picked, rng),
        Branch::Blended => {
            draw(&in_interests, limit / 2, &mut picked, rng);
            let remaining = limit.saturating_sub(picked.len());
            draw(&in_enrolled, remaining, &mut picked, rng);
        }
    }

    Selection {
        branch,
        courses: picked,
    }
}
