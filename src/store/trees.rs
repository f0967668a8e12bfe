pub const USERS: &str = "users";
pub const SESSIONS: &str = "sessions";
pub const PASSWORD_RESET_CODES: &str = "password_reset_codes";
pub const CONFIG_VERSIONS: &str = "config_versions";

// Catalog
pub const TOPICS: &str = "topics";
pub const TOPIC_PREFERENCES: &str = "user_topic_preferences";
pub const COURSES: &str = "courses";

// Learner activity
pub const COURSE_INTERACTIONS: &str = "course_interactions";
pub const SECTION_QUIZZES: &str = "section_quizzes";
pub const QUIZ_PROGRESS: &str = "course_section_quiz_progress";

// Secondary index trees
pub const COURSES_BY_TOPIC: &str = "courses_by_topic";
