use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use std::fmt;

#[derive(Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub document_store_path: String,
    pub cache_capacity: usize,
    pub jwt_secret: String,
    pub jwt_expires_in_hours: u64,
    pub cors_origin: String,
    pub worker: WorkerConfig,
    pub llm: LLMConfig,
    pub generation: GenerationConfig,
    pub mail: MailConfig,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub is_leader: bool,
}

#[derive(Clone)]
pub struct LLMConfig {
    pub enabled: bool,
    pub mock: bool,
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub queue_capacity: usize,
    pub courses_per_topic: usize,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub from_address: String,
    pub reset_code_ttl_minutes: i64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            courses_per_topic: 10,
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from_address: "no-reply@learning-platform.local".to_string(),
            reset_code_ttl_minutes: 10,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("enable_file_logs", &self.enable_file_logs)
            .field("log_dir", &self.log_dir)
            .field("sled_path", &self.sled_path)
            .field("document_store_path", &self.document_store_path)
            .field("cache_capacity", &self.cache_capacity)
            .field("jwt_secret", &"***REDACTED***")
            .field("jwt_expires_in_hours", &self.jwt_expires_in_hours)
            .field("cors_origin", &self.cors_origin)
            .field("worker", &self.worker)
            .field("llm", &self.llm)
            .field("generation", &self.generation)
            .field("mail", &self.mail)
            .finish()
    }
}

impl fmt::Debug for LLMConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LLMConfig")
            .field("enabled", &self.enabled)
            .field("mock", &self.mock)
            .field("api_url", &self.api_url)
            .field("api_key", &"***REDACTED***")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 8000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/platform.sled"),
            document_store_path: env_or("DOCUMENT_STORE_PATH", "./data/documents.sled"),
            cache_capacity: env_or_parse("CACHE_CAPACITY", 256_usize),
            jwt_secret: env_or(
                "JWT_SECRET",
                "change_me_to_random_64_chars_change_me_to_random_64_chars",
            ),
            jwt_expires_in_hours: env_or_parse("JWT_EXPIRES_IN_HOURS", 24_u64),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:5173"),
            worker: WorkerConfig {
                is_leader: env_or_bool("WORKER_LEADER", true),
            },
            llm: LLMConfig {
                enabled: env_or_bool("LLM_ENABLED", false),
                mock: env_or_bool("LLM_MOCK", true),
                api_url: env_or("LLM_API_URL", "https://api.openai.com/v1"),
                api_key: env_or("LLM_API_KEY", ""),
                model: env_or("LLM_MODEL", "gpt-3.5-turbo"),
                temperature: env_or_parse("LLM_TEMPERATURE", 0.7_f64),
                timeout_secs: env_or_parse("LLM_TIMEOUT_SECS", 60_u64),
            },
            generation: GenerationConfig {
                queue_capacity: env_or_parse("GENERATION_QUEUE_CAPACITY", 64_usize),
                courses_per_topic: env_or_parse("GENERATION_COURSES_PER_TOPIC", 10_usize),
            },
            mail: MailConfig {
                from_address: env_or("MAIL_FROM", "no-reply@learning-platform.local"),
                reset_code_ttl_minutes: env_or_parse("RESET_CODE_TTL_MINUTES", 10_i64),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
