//! Configuration management for the costume studio backend.
//!
//! Loads configuration from environment variables (and a `.env` file when present):
//! - Server binding and the public URL used to build absolute links
//! - SQLite database location
//! - Media root for uploads, head images, backgrounds and results
//! - Face-merge API credentials and model service endpoints
//! - JWT signing secret and token lifetimes
//! - Log output format

use std::env;
use std::sync::OnceLock;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration
pub fn config() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Initialize configuration (call once at startup)
pub fn init() -> &'static Config {
    config()
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub media: MediaConfig,
    pub face_api: FaceApiConfig,
    pub models: ModelConfig,
    pub auth: AuthConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Base URL clients reach the server on, without a trailing slash.
    pub public_url: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Directory holding every stored image.
    pub root: String,
    /// URL prefix the media root is served under (e.g. `/media/`).
    pub url_prefix: String,
    pub max_upload_size: usize,
}

#[derive(Debug, Clone)]
pub struct FaceApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    /// Blend strength passed to the merge endpoint (0-100).
    pub merge_rate: u8,
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Portrait segmentation service endpoint.
    pub humanseg_url: String,
    /// Costume classifier service endpoint.
    pub classifier_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
}

/// How log lines are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line, for log collectors.
    Json,
}

impl LogFormat {
    /// Parse a `LOG_FORMAT` value. Unknown values fall back to pretty output.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let port = env_or("PORT", "8000").parse().unwrap_or(8000);

        Self {
            server: ServerConfig {
                host: env_or("HOST", "0.0.0.0"),
                port,
                public_url: trim_url(&env_or("PUBLIC_URL", &format!("http://localhost:{}", port))),
            },
            database: DatabaseConfig {
                path: env_or("DATABASE_PATH", "./data/costume-studio.db"),
            },
            media: MediaConfig {
                root: env_or("MEDIA_ROOT", "./media"),
                url_prefix: normalize_prefix(&env_or("MEDIA_URL", "/media/")),
                max_upload_size: env_or("MAX_UPLOAD_SIZE", "10485760")
                    .parse()
                    .unwrap_or(10 * 1024 * 1024), // 10MB
            },
            face_api: FaceApiConfig {
                base_url: trim_url(&env_or("FACEPP_BASE_URL", "https://api-cn.faceplusplus.com")),
                api_key: env_or("FACEPP_API_KEY", ""),
                api_secret: env_or("FACEPP_API_SECRET", ""),
                merge_rate: env_or("FACEPP_MERGE_RATE", "100")
                    .parse::<u8>()
                    .map(|rate| rate.min(100))
                    .unwrap_or(100),
            },
            models: ModelConfig {
                humanseg_url: env_or(
                    "HUMANSEG_URL",
                    "http://127.0.0.1:8866/predict/deeplabv3p_xception65_humanseg",
                ),
                classifier_url: env_or(
                    "CLASSIFIER_URL",
                    "http://127.0.0.1:8866/predict/costume_classifier",
                ),
                timeout_secs: env_or("MODEL_TIMEOUT_SECS", "60").parse().unwrap_or(60),
            },
            auth: AuthConfig {
                jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| nanoid::nanoid!(32)),
                access_ttl_seconds: env_or("JWT_ACCESS_TTL", "3600")
                    .parse()
                    .unwrap_or(3600),
                refresh_ttl_seconds: env_or("JWT_REFRESH_TTL", "604800")
                    .parse()
                    .unwrap_or(604800), // 7 days
            },
            log: LogConfig {
                format: LogFormat::parse(&env_or("LOG_FORMAT", "pretty")),
            },
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn trim_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Media prefixes always start and end with a slash.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}
