//! Application settings
//!
//! Configuration is read from a YAML file (`config.yml` by default) and can be
//! overridden through `BAZAAR_*` environment variables. Anything missing is
//! filled with defaults, so an empty or absent file yields a runnable setup
//! backed by a local SQLite database, local image storage and a log-only mailer.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub theme: ThemeConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub images: ImageConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public base URL used for absolute links in emails
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Secret used to sign account tokens. Generated at startup when empty.
    #[serde(default)]
    pub secret_key: String,
    /// Session lifetime in days
    #[serde(default = "default_session_days")]
    pub session_days: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: default_base_url(),
            secret_key: String::new(),
            session_days: default_session_days(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_session_days() -> i64 {
    7
}

impl ServerConfig {
    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL or SQLite file path
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/bazaar.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    #[default]
    Sqlite,
    Mysql,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Maximum number of cached entries
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            max_capacity: default_max_capacity(),
        }
    }
}

fn default_ttl() -> u64 {
    3600
}

fn default_max_capacity() -> u64 {
    10_000
}

/// Template configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThemeConfig {
    /// Directory whose templates override the embedded ones
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Outbound email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// SMTP relay host. Mail is only logged when unset.
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: String,
    #[serde(default)]
    pub smtp_password: String,
    #[serde(default = "default_from_address")]
    pub from_address: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_address: default_from_address(),
            from_name: default_from_name(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_address() -> String {
    "noreply@localhost".to_string()
}

fn default_from_name() -> String {
    "Bazaar".to_string()
}

/// Image storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Cloudinary cloud name. Images are stored locally when unset.
    #[serde(default)]
    pub cloud_name: Option<String>,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    /// Remote folder for uploaded listing images
    #[serde(default = "default_folder")]
    pub folder: String,
    /// Local directory used when no CDN is configured
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Maximum file size in bytes (default: 10MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Allowed image MIME types
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            cloud_name: None,
            api_key: String::new(),
            api_secret: String::new(),
            folder: default_folder(),
            upload_dir: default_upload_dir(),
            max_file_size: default_max_file_size(),
            allowed_types: default_allowed_types(),
        }
    }
}

fn default_folder() -> String {
    "listings".to_string()
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("media")
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

fn default_allowed_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "image/gif".to_string(),
        "image/webp".to_string(),
    ]
}

impl ImageConfig {
    /// Whether uploads of this MIME type are accepted
    pub fn is_type_allowed(&self, mime_type: &str) -> bool {
        self.allowed_types.iter().any(|t| t == mime_type)
    }

    /// File extension for an allowed MIME type
    pub fn extension_for(mime_type: &str) -> &'static str {
        match mime_type {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            _ => "bin",
        }
    }

    /// Whether Cloudinary credentials are complete
    pub fn cdn_enabled(&self) -> bool {
        self.cloud_name.as_deref().is_some_and(|name| !name.is_empty())
            && !self.api_key.is_empty()
            && !self.api_secret.is_empty()
    }
}

/// Token and login throttling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Lifetime of verification and reset tokens
    #[serde(default = "default_token_ttl")]
    pub token_ttl_seconds: i64,
    /// Failed logins allowed per email within the window
    #[serde(default = "default_max_login_attempts")]
    pub max_login_attempts: u32,
    /// Lockout window in minutes
    #[serde(default = "default_lockout_minutes")]
    pub lockout_minutes: i64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            token_ttl_seconds: default_token_ttl(),
            max_login_attempts: default_max_login_attempts(),
            lockout_minutes: default_lockout_minutes(),
        }
    }
}

fn default_token_ttl() -> i64 {
    3 * 24 * 60 * 60
}

fn default_max_login_attempts() -> u32 {
    5
}

fn default_lockout_minutes() -> i64 {
    15
}

/// Why `config.yml` could not be used
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Unreadable {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid YAML in {path} {detail}")]
    InvalidYaml { path: String, detail: String },
}

impl Config {
    /// Read `path`, falling back to defaults when it is absent or blank.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let shown = path.display().to_string();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(ConfigError::Unreadable { path: shown, source }.into()),
        };
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&text)
            .map_err(|e| ConfigError::InvalidYaml { path: shown, detail: yaml_error_detail(&e) }.into())
    }

    /// [`Config::load`] followed by the `BAZAAR_*` environment overrides.
    ///
    /// Override values that fail to parse are skipped.
    pub fn load_with_env(path: &Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("BAZAAR_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = parsed_env::<u16>("BAZAAR_SERVER_PORT") {
            self.server.port = port;
        }
        if let Ok(base_url) = std::env::var("BAZAAR_SERVER_BASE_URL") {
            self.server.base_url = base_url;
        }
        if let Ok(secret) = std::env::var("BAZAAR_SECRET_KEY") {
            self.server.secret_key = secret;
        }

        if let Ok(driver) = std::env::var("BAZAAR_DATABASE_DRIVER") {
            if driver.eq_ignore_ascii_case("sqlite") {
                self.database.driver = DatabaseDriver::Sqlite;
            } else if driver.eq_ignore_ascii_case("mysql") {
                self.database.driver = DatabaseDriver::Mysql;
            }
        }
        if let Ok(url) = std::env::var("BAZAAR_DATABASE_URL") {
            self.database.url = url;
        }

        if let Some(ttl) = parsed_env::<u64>("BAZAAR_CACHE_TTL_SECONDS") {
            self.cache.ttl_seconds = ttl;
        }

        if let Ok(host) = std::env::var("BAZAAR_SMTP_HOST") {
            self.email.smtp_host = Some(host).filter(|h| !h.is_empty());
        }
        if let Some(port) = parsed_env::<u16>("BAZAAR_SMTP_PORT") {
            self.email.smtp_port = port;
        }
        if let Ok(user) = std::env::var("BAZAAR_SMTP_USERNAME") {
            self.email.smtp_username = user;
        }
        if let Ok(password) = std::env::var("BAZAAR_SMTP_PASSWORD") {
            self.email.smtp_password = password;
        }
        if let Ok(from) = std::env::var("BAZAAR_EMAIL_FROM") {
            self.email.from_address = from;
        }

        if let Ok(name) = std::env::var("BAZAAR_CLOUDINARY_CLOUD_NAME") {
            self.images.cloud_name = Some(name).filter(|n| !n.is_empty());
        }
        if let Ok(key) = std::env::var("BAZAAR_CLOUDINARY_API_KEY") {
            self.images.api_key = key;
        }
        if let Ok(secret) = std::env::var("BAZAAR_CLOUDINARY_API_SECRET") {
            self.images.api_secret = secret;
        }
        if let Ok(dir) = std::env::var("BAZAAR_UPLOAD_DIR") {
            self.images.upload_dir = PathBuf::from(dir);
        }
    }
}

fn parsed_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// "at line L, column C: message" when serde_yaml knows the position
fn yaml_error_detail(e: &serde_yaml::Error) -> String {
    match e.location() {
        Some(at) => format!("at line {}, column {}: {}", at.line(), at.column(), e),
        None => e.to_string(),
    }
}

#[cfg(test)]
static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env_guard() -> std::sync::MutexGuard<'static, ()> {
        super::ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn yaml_file(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_absent_file_gives_runnable_defaults() {
        let config = Config::load(Path::new("no_such_bazaar_config.yml")).unwrap();

        assert_eq!((config.server.host.as_str(), config.server.port), ("0.0.0.0", 8000));
        assert_eq!(config.server.session_days, 7);
        assert_eq!(config.database.driver, DatabaseDriver::Sqlite);
        assert_eq!(config.database.url, "data/bazaar.db");
        assert_eq!(config.cache.ttl_seconds, 3600);
        assert_eq!(config.security.token_ttl_seconds, 259_200);
        assert!(config.email.smtp_host.is_none());
        assert!(!config.images.cdn_enabled());
    }

    #[test]
    fn test_blank_file_gives_defaults() {
        let file = yaml_file("   \n");
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.images.folder, "listings");
        assert_eq!(config.security.max_login_attempts, 5);
    }

    #[test]
    fn test_sections_merge_with_defaults() {
        let file = yaml_file("server:\n  port: 9100\nimages:\n  cloud_name: demo\n  api_key: k\n  api_secret: s\n");
        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.base_url(), "http://localhost:8000");
        assert!(config.images.cdn_enabled());
        assert_eq!(config.images.max_file_size, 10 * 1024 * 1024);
    }

    #[test]
    fn test_broken_yaml_names_the_position() {
        let file = yaml_file("server:\n  port: [not a port\n");
        let message = Config::load(file.path()).unwrap_err().to_string();
        assert!(message.starts_with("Invalid YAML in"), "{}", message);
        assert!(message.contains("line"));
    }

    #[test]
    fn test_env_overrides_skip_unparseable_values() {
        let _guard = env_guard();
        let vars = [
            ("BAZAAR_SERVER_PORT", "eighty"),
            ("BAZAAR_DATABASE_DRIVER", "MySQL"),
            ("BAZAAR_SMTP_HOST", "smtp.example.com"),
            ("BAZAAR_CACHE_TTL_SECONDS", "60"),
        ];
        for (key, value) in vars {
            std::env::set_var(key, value);
        }
        let config = Config::load_with_env(Path::new("missing.yml")).unwrap();
        for (key, _) in vars {
            std::env::remove_var(key);
        }

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.database.driver, DatabaseDriver::Mysql);
        assert_eq!(config.email.smtp_host.as_deref(), Some("smtp.example.com"));
        assert_eq!(config.cache.ttl_seconds, 60);
    }

    #[test]
    fn test_base_url_trims_trailing_slash() {
        let server = ServerConfig {
            base_url: "https://bazaar.example/".to_string(),
            ..ServerConfig::default()
        };
        assert_eq!(server.base_url(), "https://bazaar.example");
    }

    #[test]
    fn test_image_types() {
        let images = ImageConfig::default();
        assert!(images.is_type_allowed("image/webp"));
        assert!(!images.is_type_allowed("application/pdf"));
        assert_eq!(ImageConfig::extension_for("image/jpeg"), "jpg");
        assert_eq!(ImageConfig::extension_for("text/plain"), "bin");
    }
}
