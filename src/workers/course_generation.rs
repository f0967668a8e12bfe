//! Builds the courses of a new topic from generated content.
//!
//! Each job asks the generator for course outlines, then per course for a
//! section outline, the text of every subsection and a quiz per section.
//! Course rows and quiz items are committed as they are produced, so a
//! failure part way leaves the earlier writes in place. A course is only
//! flagged built once its full body is in the document store. If the topic is
//! deleted while a course is being built, the job stops and removes whatever
//! it wrote for that course.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

use crate::documents::{CourseDocument, DocumentSection, DocumentStore, DocumentSubsection};
use crate::services::content::{ContentGenerator, CourseOutline, SectionOutline, TopicBrief};
use crate::store::operations::courses::Course;
use crate::store::operations::quizzes::SectionQuizItem;
use crate::store::{Store, StoreError};
use crate::workers::queue::GenerationJob;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationReport {
    pub outlines_received: usize,
    pub courses_created: usize,
    pub courses_built: usize,
    pub courses_skipped: usize,
    /// Sections whose quiz was stored.
    pub quizzes_persisted: usize,
    pub quizzes_skipped: usize,
}

/// Why a course did not get built.
#[derive(Debug)]
enum Skip {
    Outline(String),
    NoSections,
    Content(String),
    Document(String),
    /// The course or its topic was deleted while the course was being built.
    Removed,
    Store(StoreError),
}

impl From<StoreError> for Skip {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => Skip::Removed,
            other => Skip::Store(other),
        }
    }
}

enum QuizOutcome {
    Stored,
    Skipped,
    CourseRemoved,
}

impl std::fmt::Display for Skip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Skip::Outline(e) => write!(f, "section outline failed: {e}"),
            Skip::NoSections => f.write_str("outline has no sections with subsections"),
            Skip::Content(e) => write!(f, "subsection content failed: {e}"),
            Skip::Document(e) => write!(f, "document write failed: {e}"),
            Skip::Removed => f.write_str("course removed during generation"),
            Skip::Store(e) => write!(f, "store write failed: {e}"),
        }
    }
}

pub struct CourseGenerationPipeline {
    store: Arc<Store>,
    documents: Arc<dyn DocumentStore>,
    generator: Arc<dyn ContentGenerator>,
    courses_per_topic: usize,
}

impl CourseGenerationPipeline {
    pub fn new(
        store: Arc<Store>,
        documents: Arc<dyn DocumentStore>,
        generator: Arc<dyn ContentGenerator>,
        courses_per_topic: usize,
    ) -> Self {
        Self {
            store,
            documents,
            generator,
            courses_per_topic,
        }
    }

    pub async fn run(&self, job: &GenerationJob) -> GenerationReport {
        let mut report = GenerationReport::default();
        let brief = TopicBrief {
            title: &job.title,
            description: &job.description,
        };

        let outlines = match self
            .generator
            .course_outlines(brief, self.courses_per_topic)
            .await
        {
            Ok(outlines) => outlines,
            Err(e) => {
                tracing::error!(topic_id = %job.topic_id, error = %e, "Course outline generation failed");
                return report;
            }
        };
        report.outlines_received = outlines.len();

        let mut topic_removed = false;
        for outline in &outlines {
            let course = new_course(&job.topic_id, outline);
            match self.store.create_course(&course) {
                Ok(()) => report.courses_created += 1,
                Err(StoreError::NotFound { .. }) => {
                    tracing::warn!(topic_id = %job.topic_id, "Topic removed during generation; stopping");
                    topic_removed = true;
                    break;
                }
                Err(e) => {
                    tracing::error!(topic_id = %job.topic_id, error = %e, "Failed to create course");
                    report.courses_skipped += 1;
                    continue;
                }
            }

            match self.build_course(brief, &course, outline, &mut report).await {
                Ok(()) => report.courses_built += 1,
                Err(Skip::Removed) => {
                    report.courses_skipped += 1;
                    self.discard_course_body(&course.id).await;
                    tracing::warn!(topic_id = %job.topic_id, course_id = %course.id, "Topic removed during generation; stopping");
                    topic_removed = true;
                    break;
                }
                Err(skip) => {
                    report.courses_skipped += 1;
                    tracing::warn!(course_id = %course.id, title = %course.title, reason = %skip, "Course left unbuilt");
                }
            }
        }

        if report.courses_built > 0 && !topic_removed {
            if let Err(e) = self.store.set_topic_published(&job.topic_id, true) {
                tracing::error!(topic_id = %job.topic_id, error = %e, "Failed to publish topic");
            }
        }

        tracing::info!(topic_id = %job.topic_id, ?report, "Course generation finished");
        report
    }

    async fn build_course(
        &self,
        brief: TopicBrief<'_>,
        course: &Course,
        outline: &CourseOutline,
        report: &mut GenerationReport,
    ) -> Result<(), Skip> {
        let sections: Vec<SectionOutline> = self
            .generator
            .section_outline(brief, outline)
            .await
            .map_err(|e| Skip::Outline(e.to_string()))?
            .into_iter()
            .filter(|s| !s.subsections.is_empty())
            .collect();
        if sections.is_empty() {
            return Err(Skip::NoSections);
        }

        let mut doc_sections = Vec::with_capacity(sections.len());
        for (section_index, section) in sections.iter().enumerate() {
            let section_index = section_index as u32;

            let mut subsections = Vec::with_capacity(section.subsections.len());
            for (sub_index, sub_title) in section.subsections.iter().enumerate() {
                let content = self
                    .generator
                    .subsection_content(outline, &section.title, sub_title)
                    .await
                    .map_err(|e| Skip::Content(e.to_string()))?;
                subsections.push(DocumentSubsection {
                    index: sub_index as u32,
                    title: sub_title.clone(),
                    content,
                });
            }

            match self
                .persist_quiz(course, outline, section_index, &section.title, &subsections)
                .await
            {
                QuizOutcome::Stored => report.quizzes_persisted += 1,
                QuizOutcome::Skipped => report.quizzes_skipped += 1,
                QuizOutcome::CourseRemoved => return Err(Skip::Removed),
            }

            doc_sections.push(DocumentSection {
                index: section_index,
                title: section.title.clone(),
                subsections,
            });
        }

        if !self.store.course_exists(&course.id)? {
            return Err(Skip::Removed);
        }
        let document = CourseDocument {
            course_id: course.id.clone(),
            topic_id: course.topic_id.clone(),
            title: course.title.clone(),
            description: course.description.clone(),
            level: course.level,
            sections: doc_sections,
            generated_at: Utc::now(),
        };
        self.documents
            .put(&document)
            .await
            .map_err(|e| Skip::Document(e.to_string()))?;

        if let Err(e) = self.store.mark_course_built(&course.id) {
            if let Err(doc_err) = self.documents.delete(&course.id).await {
                tracing::error!(course_id = %course.id, error = %doc_err, "Failed to remove document of unbuilt course");
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Drops the document and quiz items written for a course that no longer exists.
    async fn discard_course_body(&self, course_id: &str) {
        if let Err(e) = self.documents.delete(course_id).await {
            tracing::error!(course_id, error = %e, "Failed to remove document of removed course");
        }
        match self.store.remove_course_quiz_items(course_id) {
            Ok(0) => {}
            Ok(removed) => tracing::info!(course_id, removed, "Removed quiz items of removed course"),
            Err(e) => tracing::error!(course_id, error = %e, "Failed to remove quiz items of removed course"),
        }
    }

    /// Generates and stores one section's quiz. `Stored` only when at least
    /// one item was generated and every item was written.
    async fn persist_quiz(
        &self,
        course: &Course,
        outline: &CourseOutline,
        section_index: u32,
        section_title: &str,
        subsections: &[DocumentSubsection],
    ) -> QuizOutcome {
        let material = subsections
            .iter()
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let items = match self
            .generator
            .section_quiz(outline, section_title, &material)
            .await
        {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(course_id = %course.id, section_index, error = %e, "Quiz generation failed; section left without quiz");
                return QuizOutcome::Skipped;
            }
        };
        if items.is_empty() {
            tracing::warn!(course_id = %course.id, section_index, "Quiz generation returned no usable items; section left without quiz");
            return QuizOutcome::Skipped;
        }

        for (item_index, item) in items.into_iter().enumerate() {
            let row = SectionQuizItem {
                course_id: course.id.clone(),
                section_index,
                item_index: item_index as u32,
                question: item.question,
                options: item.options,
                correct_answer: item.correct_answer,
                hint: item.hint,
                created_at: Utc::now(),
            };
            match self.store.insert_quiz_item(&row) {
                Ok(()) => {}
                Err(StoreError::NotFound { .. }) => return QuizOutcome::CourseRemoved,
                Err(e) => {
                    tracing::error!(course_id = %course.id, section_index, error = %e, "Failed to store quiz item");
                    return QuizOutcome::Skipped;
                }
            }
        }
        QuizOutcome::Stored
    }
}

fn new_course(topic_id: &str, outline: &CourseOutline) -> Course {
    let now = Utc::now();
    Course {
        id: uuid::Uuid::new_v4().to_string(),
        title: outline.title.clone(),
        description: outline.description.clone(),
        level: outline.level,
        topic_id: topic_id.to_string(),
        is_published: false,
        is_detail_created_by_ai: false,
        created_at: now,
        updated_at: now,
    }
}

/// Drains the queue one job at a time until shutdown or until every sender
/// is gone.
pub async fn run_consumer(
    pipeline: Arc<CourseGenerationPipeline>,
    mut jobs: mpsc::Receiver<GenerationJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    tracing::info!("Course generation consumer started");
    loop {
        tokio::select! {
            maybe_job = jobs.recv() => {
                let Some(job) = maybe_job else {
                    break;
                };
                tracing::info!(topic_id = %job.topic_id, title = %job.title, "Generating courses for topic");
                pipeline.run(&job).await;
            }
            _ = shutdown_rx.recv() => {
                tracing::info!("Course generation consumer shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use async_trait::async_trait;

    use super::*;
    use crate::documents::{DocumentStoreError, MemoryDocumentStore};
    use crate::services::content::QuizItem;
    use crate::services::llm_provider::LlmError;
    use crate::store::operations::topics::tests::sample_topic;
    use crate::store::test_support::temp_store;

    /// Generator whose failures are keyed by course or section title.
    #[derive(Default)]
    struct Scripted {
        courses: Vec<&'static str>,
        fail_outlines: bool,
        fail_sections_for: HashSet<&'static str>,
        empty_sections_for: HashSet<&'static str>,
        fail_content_for: HashSet<&'static str>,
        fail_quiz_for_section: HashSet<String>,
        empty_quiz_for_section: HashSet<String>,
        /// Deletes topic `t1` when content for this course is requested.
        delete_topic_during: Option<(&'static str, Arc<Store>)>,
    }

    fn api_error() -> LlmError {
        LlmError::ApiError {
            status: 500,
            message: "boom".into(),
        }
    }

    #[async_trait]
    impl ContentGenerator for Scripted {
        async fn course_outlines(
            &self,
            _topic: TopicBrief<'_>,
            count: usize,
        ) -> Result<Vec<CourseOutline>, LlmError> {
            if self.fail_outlines {
                return Err(api_error());
            }
            Ok(self
                .courses
                .iter()
                .take(count)
                .map(|t| CourseOutline {
                    title: t.to_string(),
                    description: format!("About {t}"),
                    level: crate::store::operations::courses::CourseLevel::Beginner,
                })
                .collect())
        }

        async fn section_outline(
            &self,
            _topic: TopicBrief<'_>,
            course: &CourseOutline,
        ) -> Result<Vec<SectionOutline>, LlmError> {
            let title = course.title.as_str();
            if self.fail_sections_for.contains(title) {
                return Err(api_error());
            }
            if self.empty_sections_for.contains(title) {
                return Ok(vec![SectionOutline {
                    title: format!("{title} hollow"),
                    subsections: vec![],
                }]);
            }
            Ok((0..2)
                .map(|i| SectionOutline {
                    title: format!("{title} s{i}"),
                    subsections: vec!["a".into(), "b".into()],
                })
                .collect())
        }

        async fn subsection_content(
            &self,
            course: &CourseOutline,
            section_title: &str,
            subsection_title: &str,
        ) -> Result<String, LlmError> {
            if self.fail_content_for.contains(course.title.as_str()) {
                return Err(LlmError::Timeout);
            }
            if let Some((title, store)) = &self.delete_topic_during {
                if *title == course.title {
                    let _ = store.delete_topic("t1");
                }
            }
            Ok(format!("{section_title}/{subsection_title}"))
        }

        async fn section_quiz(
            &self,
            _course: &CourseOutline,
            section_title: &str,
            material: &str,
        ) -> Result<Vec<QuizItem>, LlmError> {
            if self.fail_quiz_for_section.contains(section_title) {
                return Err(LlmError::InvalidResponse("not json".into()));
            }
            assert!(material.contains(section_title));
            if self.empty_quiz_for_section.contains(section_title) {
                return Ok(Vec::new());
            }
            Ok(vec![QuizItem {
                question: "q?".into(),
                options: vec!["x".into(), "y".into()],
                correct_answer: "x".into(),
                hint: None,
            }])
        }
    }

    struct BrokenDocuments;

    #[async_trait]
    impl DocumentStore for BrokenDocuments {
        async fn put(&self, _doc: &CourseDocument) -> Result<(), DocumentStoreError> {
            Err(DocumentStoreError::Backend("disk full".into()))
        }
        async fn get(&self, _id: &str) -> Result<Option<CourseDocument>, DocumentStoreError> {
            Ok(None)
        }
        async fn delete(&self, _id: &str) -> Result<bool, DocumentStoreError> {
            Ok(false)
        }
        async fn ping(&self) -> Result<(), DocumentStoreError> {
            Ok(())
        }
    }

    /// Stores documents, then deletes topic `t1` right after the first put.
    struct DeleteTopicOnPut {
        inner: Arc<MemoryDocumentStore>,
        store: Arc<Store>,
    }

    #[async_trait]
    impl DocumentStore for DeleteTopicOnPut {
        async fn put(&self, doc: &CourseDocument) -> Result<(), DocumentStoreError> {
            self.inner.put(doc).await?;
            let _ = self.store.delete_topic("t1");
            Ok(())
        }
        async fn get(&self, id: &str) -> Result<Option<CourseDocument>, DocumentStoreError> {
            self.inner.get(id).await
        }
        async fn delete(&self, id: &str) -> Result<bool, DocumentStoreError> {
            self.inner.delete(id).await
        }
        async fn ping(&self) -> Result<(), DocumentStoreError> {
            Ok(())
        }
    }

    fn job() -> GenerationJob {
        GenerationJob {
            topic_id: "t1".into(),
            title: "Topic t1".into(),
            description: String::new(),
        }
    }

    fn setup(name: &str) -> (tempfile::TempDir, Arc<Store>) {
        let (dir, store) = temp_store(name);
        store.create_topic(&sample_topic("t1")).unwrap();
        (dir, Arc::new(store))
    }

    fn pipeline(
        store: &Arc<Store>,
        documents: Arc<dyn DocumentStore>,
        generator: Scripted,
    ) -> CourseGenerationPipeline {
        CourseGenerationPipeline::new(store.clone(), documents, Arc::new(generator), 10)
    }

    #[tokio::test]
    async fn happy_path_builds_and_publishes() {
        let (_dir, store) = setup("gen-happy");
        let docs = Arc::new(MemoryDocumentStore::new());
        let generator = Scripted {
            courses: vec!["A", "B"],
            ..Scripted::default()
        };

        let report = pipeline(&store, docs.clone(), generator).run(&job()).await;
        assert_eq!(report.outlines_received, 2);
        assert_eq!(report.courses_created, 2);
        assert_eq!(report.courses_built, 2);
        assert_eq!(report.quizzes_persisted, 4);

        let built = store.list_built_courses().unwrap();
        assert_eq!(built.len(), 2);
        for course in &built {
            let doc = docs.get(&course.id).await.unwrap().unwrap();
            assert_eq!(doc.sections.len(), 2);
            assert_eq!(doc.sections[1].subsections[1].content, format!("{} s1/b", course.title));
            assert_eq!(store.get_section_quiz(&course.id, 1).unwrap().len(), 1);
        }
        assert!(store.get_topic("t1").unwrap().unwrap().is_published);
    }

    #[tokio::test]
    async fn outline_failure_creates_nothing() {
        let (_dir, store) = setup("gen-outline");
        let generator = Scripted {
            courses: vec!["A"],
            fail_outlines: true,
            ..Scripted::default()
        };

        let report = pipeline(&store, Arc::new(MemoryDocumentStore::new()), generator)
            .run(&job())
            .await;
        assert_eq!(report, GenerationReport::default());
        assert!(store.list_topic_courses("t1", false).unwrap().is_empty());
        assert!(!store.get_topic("t1").unwrap().unwrap().is_published);
    }

    #[tokio::test]
    async fn section_outline_failure_skips_only_that_course() {
        let (_dir, store) = setup("gen-sections");
        let generator = Scripted {
            courses: vec!["A", "B"],
            fail_sections_for: HashSet::from(["A"]),
            ..Scripted::default()
        };

        let report = pipeline(&store, Arc::new(MemoryDocumentStore::new()), generator)
            .run(&job())
            .await;
        assert_eq!(report.courses_created, 2);
        assert_eq!(report.courses_built, 1);
        assert_eq!(report.courses_skipped, 1);
        let built = store.list_built_courses().unwrap();
        assert_eq!(built.len(), 1);
        assert_eq!(built[0].title, "B");
    }

    #[tokio::test]
    async fn course_without_sections_is_never_built() {
        let (_dir, store) = setup("gen-empty");
        let docs = Arc::new(MemoryDocumentStore::new());
        let generator = Scripted {
            courses: vec!["A"],
            empty_sections_for: HashSet::from(["A"]),
            ..Scripted::default()
        };

        let report = pipeline(&store, docs.clone(), generator).run(&job()).await;
        assert_eq!(report.courses_built, 0);
        assert!(store.list_built_courses().unwrap().is_empty());
        assert!(docs.is_empty().await);
        assert!(!store.get_topic("t1").unwrap().unwrap().is_published);
    }

    #[tokio::test]
    async fn content_failure_aborts_course() {
        let (_dir, store) = setup("gen-content");
        let docs = Arc::new(MemoryDocumentStore::new());
        let generator = Scripted {
            courses: vec!["A", "B"],
            fail_content_for: HashSet::from(["A"]),
            ..Scripted::default()
        };

        let report = pipeline(&store, docs.clone(), generator).run(&job()).await;
        assert_eq!(report.courses_built, 1);
        assert_eq!(report.courses_skipped, 1);
        assert_eq!(docs.len().await, 1);
        let unbuilt = store
            .list_topic_courses("t1", false)
            .unwrap()
            .into_iter()
            .find(|c| c.title == "A")
            .unwrap();
        assert!(!unbuilt.is_built());
    }

    #[tokio::test]
    async fn quiz_failure_skips_only_that_quiz() {
        let (_dir, store) = setup("gen-quiz");
        let generator = Scripted {
            courses: vec!["A"],
            fail_quiz_for_section: HashSet::from(["A s0".to_string()]),
            ..Scripted::default()
        };

        let report = pipeline(&store, Arc::new(MemoryDocumentStore::new()), generator)
            .run(&job())
            .await;
        assert_eq!(report.courses_built, 1);
        assert_eq!(report.quizzes_skipped, 1);
        assert_eq!(report.quizzes_persisted, 1);

        let course = &store.list_built_courses().unwrap()[0];
        assert!(!store.section_quiz_exists(&course.id, 0).unwrap());
        assert!(store.section_quiz_exists(&course.id, 1).unwrap());
    }

    #[tokio::test]
    async fn empty_quiz_counts_as_skipped() {
        let (_dir, store) = setup("gen-quiz-empty");
        let generator = Scripted {
            courses: vec!["A"],
            empty_quiz_for_section: HashSet::from(["A s1".to_string()]),
            ..Scripted::default()
        };

        let report = pipeline(&store, Arc::new(MemoryDocumentStore::new()), generator)
            .run(&job())
            .await;
        assert_eq!(report.courses_built, 1);
        assert_eq!(report.quizzes_persisted, 1);
        assert_eq!(report.quizzes_skipped, 1);

        let course = &store.list_built_courses().unwrap()[0];
        assert!(store.section_quiz_exists(&course.id, 0).unwrap());
        assert!(!store.section_quiz_exists(&course.id, 1).unwrap());
    }

    #[tokio::test]
    async fn topic_deleted_mid_course_stops_and_leaves_nothing() {
        let (_dir, store) = setup("gen-removed");
        let docs = Arc::new(MemoryDocumentStore::new());
        let generator = Scripted {
            courses: vec!["A", "B"],
            delete_topic_during: Some(("A", store.clone())),
            ..Scripted::default()
        };

        let report = pipeline(&store, docs.clone(), generator).run(&job()).await;
        assert_eq!(report.courses_created, 1);
        assert_eq!(report.courses_built, 0);
        assert_eq!(report.courses_skipped, 1);
        assert_eq!(report.quizzes_persisted, 0);

        assert!(store.get_topic("t1").unwrap().is_none());
        assert!(store.list_topic_courses("t1", false).unwrap().is_empty());
        assert_eq!(store.count_quiz_items().unwrap(), 0);
        assert!(docs.is_empty().await);
    }

    #[tokio::test]
    async fn topic_deleted_after_document_write_removes_document() {
        let (_dir, store) = setup("gen-removed-doc");
        let docs = Arc::new(MemoryDocumentStore::new());
        let documents = Arc::new(DeleteTopicOnPut {
            inner: docs.clone(),
            store: store.clone(),
        });
        let generator = Scripted {
            courses: vec!["A", "B"],
            ..Scripted::default()
        };

        let report = pipeline(&store, documents, generator).run(&job()).await;
        assert_eq!(report.courses_created, 1);
        assert_eq!(report.courses_built, 0);

        assert!(store.get_topic("t1").unwrap().is_none());
        assert!(store.list_built_courses().unwrap().is_empty());
        assert_eq!(store.count_quiz_items().unwrap(), 0);
        assert!(docs.is_empty().await);
    }

    #[tokio::test]
    async fn document_failure_leaves_course_unbuilt() {
        let (_dir, store) = setup("gen-docs");
        let generator = Scripted {
            courses: vec!["A"],
            ..Scripted::default()
        };

        let report = pipeline(&store, Arc::new(BrokenDocuments), generator)
            .run(&job())
            .await;
        assert_eq!(report.courses_created, 1);
        assert_eq!(report.courses_built, 0);
        assert!(store.list_built_courses().unwrap().is_empty());
    }

    #[tokio::test]
    async fn consumer_processes_jobs_and_stops_on_shutdown() {
        let (_dir, store) = setup("gen-consumer");
        let generator = Scripted {
            courses: vec!["A"],
            ..Scripted::default()
        };
        let pipeline = Arc::new(pipeline(&store, Arc::new(MemoryDocumentStore::new()), generator));
        let (tx, rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        tx.send(job()).await.unwrap();
        let handle = tokio::spawn(run_consumer(pipeline, rx, shutdown_rx));

        for _ in 0..100 {
            if !store.list_built_courses().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(store.list_built_courses().unwrap().len(), 1);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
