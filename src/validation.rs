//! Input checks shared by the auth, profile, topic and admin routes.

const MAX_TOPIC_TITLE_CHARS: usize = 200;
const MAX_TOPIC_DESCRIPTION_CHARS: usize = 2000;

/// At least 8 and at most 256 bytes, with an uppercase letter, a lowercase
/// letter and a digit.
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters");
    }
    if password.len() > 256 {
        return Err("Password must be at most 256 characters");
    }
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_upper || !has_lower || !has_digit {
        return Err("Password needs an uppercase letter, a lowercase letter and a digit");
    }
    Ok(())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// user@domain.tld
pub fn is_valid_email(email: &str) -> bool {
    if email.len() > 254 {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || local.len() > 64 {
        return false;
    }
    if !local
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'+' || b == b'-')
    {
        return false;
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }
    if domain.is_empty() || !domain.contains('.') {
        return false;
    }
    if !domain
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.')
    {
        return false;
    }
    domain
        .split('.')
        .all(|part| !part.is_empty() && !part.starts_with('-') && !part.ends_with('-'))
}

/// First or last name: 1 to 50 characters of letters, spaces, hyphens and
/// apostrophes.
pub fn validate_person_name(name: &str) -> Result<(), &'static str> {
    let char_count = name.trim().chars().count();
    if char_count == 0 || char_count > 50 {
        return Err("Names must be between 1 and 50 characters");
    }
    if !name
        .chars()
        .all(|c| c.is_alphabetic() || c == ' ' || c == '-' || c == '\'')
    {
        return Err("Names may only contain letters, spaces, hyphens and apostrophes");
    }
    Ok(())
}

pub fn validate_topic_text(title: &str, description: &str) -> Result<(), &'static str> {
    let title_chars = title.trim().chars().count();
    if title_chars == 0 {
        return Err("Topic title is required");
    }
    if title_chars > MAX_TOPIC_TITLE_CHARS {
        return Err("Topic title must be at most 200 characters");
    }
    if description.chars().count() > MAX_TOPIC_DESCRIPTION_CHARS {
        return Err("Topic description must be at most 2000 characters");
    }
    Ok(())
}
