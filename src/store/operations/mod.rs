pub mod analytics;
pub mod courses;
pub mod interactions;
pub mod password_resets;
pub mod preferences;
pub mod quizzes;
pub mod sessions;
pub mod topics;
pub mod users;
