//! Bounded read cache for catalog lookups.
//!
//! Entries are only ever inserted from a successful store read and are dropped
//! by the store's write paths. A read that overlaps a write is returned to its
//! caller but not cached, so a cached value is never older than the last write
//! that went through `Store`.

use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

use lru::LruCache;

use crate::store::operations::courses::Course;
use crate::store::operations::topics::Topic;

/// LRU plus a write generation. Every invalidation bumps the generation, and
/// a load only lands in the cache if no invalidation happened while it ran.
struct Slots<K: Hash + Eq, V> {
    lru: LruCache<K, V>,
    generation: u64,
}

pub struct BoundedCache<K: Hash + Eq, V> {
    inner: Mutex<Slots<K, V>>,
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Slots {
                lru: LruCache::new(capacity),
                generation: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots<K, V>> {
        // A panic while holding the lock cannot leave the LRU half-updated in a
        // way that matters to readers, so recover the guard.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.lock().lru.get(key).cloned()
    }

    pub fn insert(&self, key: K, value: V) {
        self.lock().lru.put(key, value);
    }

    pub fn invalidate(&self, key: &K) {
        let mut slots = self.lock();
        slots.lru.pop(key);
        slots.generation = slots.generation.wrapping_add(1);
    }

    pub fn clear(&self) {
        let mut slots = self.lock();
        slots.lru.clear();
        slots.generation = slots.generation.wrapping_add(1);
    }

    pub fn len(&self) -> usize {
        self.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().lru.cap().get()
    }

    /// Returns the cached value or runs `load`. `Some` results are cached
    /// unless a write invalidated this cache while `load` was running; the
    /// caller still gets the loaded value.
    pub fn get_or_try_load<E>(
        &self,
        key: K,
        load: impl FnOnce() -> Result<Option<V>, E>,
    ) -> Result<Option<V>, E> {
        let seen = {
            let mut slots = self.lock();
            if let Some(hit) = slots.lru.get(&key) {
                return Ok(Some(hit.clone()));
            }
            slots.generation
        };

        let loaded = load()?;
        if let Some(value) = &loaded {
            let mut slots = self.lock();
            if slots.generation == seen {
                slots.lru.put(key, value.clone());
            }
        }
        Ok(loaded)
    }
}

pub struct ReadCache {
    topic_list: BoundedCache<(), Vec<Topic>>,
    topics: BoundedCache<String, Topic>,
    built_courses: BoundedCache<(), Vec<Course>>,
    courses: BoundedCache<String, Course>,
    quiz_sections: BoundedCache<(String, u32), ()>,
}

impl fmt::Debug for ReadCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadCache")
            .field("topics", &self.topics.len())
            .field("courses", &self.courses.len())
            .field("quiz_sections", &self.quiz_sections.len())
            .finish()
    }
}

impl ReadCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            topic_list: BoundedCache::new(1),
            topics: BoundedCache::new(capacity),
            built_courses: BoundedCache::new(1),
            courses: BoundedCache::new(capacity),
            quiz_sections: BoundedCache::new(capacity),
        }
    }

    pub fn topic_list(&self) -> &BoundedCache<(), Vec<Topic>> {
        &self.topic_list
    }

    pub fn topics(&self) -> &BoundedCache<String, Topic> {
        &self.topics
    }

    pub fn built_courses(&self) -> &BoundedCache<(), Vec<Course>> {
        &self.built_courses
    }

    pub fn courses(&self) -> &BoundedCache<String, Course> {
        &self.courses
    }

    pub fn quiz_sections(&self) -> &BoundedCache<(String, u32), ()> {
        &self.quiz_sections
    }

    pub fn on_topic_written(&self, topic_id: &str) {
        self.topic_list.clear();
        self.topics.invalidate(&topic_id.to_string());
    }

    pub fn on_course_written(&self, course_id: &str) {
        self.built_courses.clear();
        self.courses.invalidate(&course_id.to_string());
    }

    pub fn on_quiz_written(&self, course_id: &str, section_index: u32) {
        self.quiz_sections
            .invalidate(&(course_id.to_string(), section_index));
    }

    /// Topic deletion removes an unknown number of courses and quizzes.
    pub fn on_topic_removed(&self, topic_id: &str) {
        self.on_topic_written(topic_id);
        self.built_courses.clear();
        self.courses.clear();
        self.quiz_sections.clear();
    }
}
