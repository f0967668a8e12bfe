/// Number of recommendations returned when the client does not ask for a count
pub const DEFAULT_RECOMMENDATION_LIMIT: usize = 10;

/// Upper bound on a single recommendation request
pub const MAX_RECOMMENDATION_LIMIT: usize = 50;

/// Course progress is a percentage
pub const MAX_COURSE_PROGRESS: u8 = 100;

/// Digits in a password reset code
pub const RESET_CODE_DIGITS: u32 = 6;

/// Wrong guesses a reset code tolerates before it locks
pub const MAX_RESET_CODE_ATTEMPTS: u32 = 5;

/// Topics shown in each direction of the engagement ranking
pub const DEFAULT_TOPIC_RANKING_LIMIT: usize = 3;

/// Days covered by the new-user chart
pub const NEW_USER_WINDOW_DAYS: u32 = 7;

/// Sessions kept per user before the oldest are evicted
pub const MAX_SESSIONS_PER_USER: usize = 10;

/// Default page size for admin listings
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Largest page size accepted by admin listings
pub const MAX_PAGE_SIZE: u64 = 100;
