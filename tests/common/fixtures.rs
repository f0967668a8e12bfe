use chrono::Utc;

use learning_platform::documents::{
    CourseDocument, DocumentSection, DocumentStore, DocumentSubsection, MemoryDocumentStore,
};
use learning_platform::store::operations::courses::{Course, CourseLevel};
use learning_platform::store::operations::quizzes::SectionQuizItem;
use learning_platform::store::operations::topics::Topic;
use learning_platform::store::Store;

pub fn seed_topic(store: &Store, id: &str, title: &str) -> Topic {
    let now = Utc::now();
    let topic = Topic {
        id: id.to_string(),
        title: title.to_string(),
        description: format!("All about {title}"),
        created_by: "seed".to_string(),
        is_published: true,
        created_at: now,
        updated_at: now,
    };
    store.create_topic(&topic).expect("seed topic");
    topic
}

pub fn seed_course(store: &Store, id: &str, topic_id: &str) -> Course {
    let created = Utc::now();
    let course = Course {
        id: id.to_string(),
        title: format!("Course {id}"),
        description: format!("Learn {id}"),
        level: CourseLevel::Beginner,
        topic_id: topic_id.to_string(),
        is_published: false,
        is_detail_created_by_ai: false,
        created_at: created,
        updated_at: created,
    };
    store.create_course(&course).expect("seed course");
    course
}

/// A course with a stored document, one quiz item in section 0, marked built.
pub async fn seed_built_course(
    store: &Store,
    documents: &MemoryDocumentStore,
    id: &str,
    topic_id: &str,
) -> Course {
    let course = seed_course(store, id, topic_id);
    documents
        .put(&CourseDocument {
            course_id: course.id.clone(),
            topic_id: topic_id.to_string(),
            title: course.title.clone(),
            description: course.description.clone(),
            level: course.level,
            sections: vec![DocumentSection {
                index: 0,
                title: "Basics".to_string(),
                subsections: vec![DocumentSubsection {
                    index: 0,
                    title: "Intro".to_string(),
                    content: "Welcome".to_string(),
                }],
            }],
            generated_at: Utc::now(),
        })
        .await
        .expect("seed document");
    store
        .insert_quiz_item(&SectionQuizItem {
            course_id: course.id.clone(),
            section_index: 0,
            item_index: 0,
            question: "What comes first?".to_string(),
            options: vec!["Basics".to_string(), "Advanced".to_string()],
            correct_answer: "Basics".to_string(),
            hint: None,
            created_at: Utc::now(),
        })
        .expect("seed quiz");
    store.mark_course_built(&course.id).expect("mark built")
}
