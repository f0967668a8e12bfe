pub fn user_key(user_id: &str) -> String {
    user_id.to_string()
}

pub fn user_email_index_key(email: &str) -> String {
    format!("email:{}", email.trim().to_lowercase())
}

pub fn session_key(token_hash: &str) -> String {
    token_hash.to_string()
}

pub fn session_user_index_key(user_id: &str, token_hash: &str) -> String {
    format!("user:{}:{}", user_id, token_hash)
}

pub fn session_user_index_prefix(user_id: &str) -> String {
    format!("user:{}:", user_id)
}

pub fn topic_key(topic_id: &str) -> String {
    topic_id.to_string()
}

pub fn topic_preference_key(user_id: &str, topic_id: &str) -> String {
    format!("{}:{}", user_id, topic_id)
}

pub fn topic_preference_prefix(user_id: &str) -> String {
    format!("{}:", user_id)
}

pub fn course_key(course_id: &str) -> String {
    course_id.to_string()
}

pub fn course_topic_index_key(topic_id: &str, course_id: &str) -> String {
    format!("{}:{}", topic_id, course_id)
}

pub fn course_topic_index_prefix(topic_id: &str) -> String {
    format!("{}:", topic_id)
}

pub fn interaction_key(user_id: &str, course_id: &str) -> String {
    format!("{}:{}", user_id, course_id)
}

pub fn interaction_prefix(user_id: &str) -> String {
    format!("{}:", user_id)
}

pub fn quiz_item_key(course_id: &str, section_index: u32, item_index: u32) -> String {
    format!("{}:{:06}:{:06}", course_id, section_index, item_index)
}

pub fn quiz_section_prefix(course_id: &str, section_index: u32) -> String {
    format!("{}:{:06}:", course_id, section_index)
}

pub fn quiz_course_prefix(course_id: &str) -> String {
    format!("{}:", course_id)
}

pub fn quiz_progress_key(user_id: &str, course_id: &str, section_index: u32) -> String {
    format!("{}:{}:{:06}", user_id, course_id, section_index)
}

pub fn quiz_progress_prefix(user_id: &str, course_id: &str) -> String {
    format!("{}:{}:", user_id, course_id)
}

pub fn quiz_progress_user_prefix(user_id: &str) -> String {
    format!("{}:", user_id)
}

pub fn reset_code_key(user_id: &str, code_id: &str) -> String {
    format!("{}:{}", user_id, code_id)
}

pub fn reset_code_prefix(user_id: &str) -> String {
    format!("{}:", user_id)
}
