use std::env;

/// Runtime configuration for the resource hub
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Maximum upload size in bytes (default: 5 MB)
    pub max_file_size: usize,

    /// Rows fetched per browse query (default: 60)
    pub browse_page_size: u64,

    /// Groups shown on the approved moderation list (default: 50)
    pub approved_list_limit: u64,

    /// Rows scanned when computing subjects that have approved resources (default: 2000)
    pub availability_scan_limit: u64,

    /// Lifetime of signed read URLs in seconds (default: 3600)
    pub signed_url_ttl_secs: u64,

    /// Lifetime of an emailed login code in minutes (default: 15)
    pub login_code_ttl_minutes: i64,

    /// Session lifetime in hours (default: 24)
    pub session_ttl_hours: i64,

    /// Wrong codes allowed per email before sign in is locked (default: 5)
    pub login_max_failed_attempts: u32,

    /// How long a locked email must wait, in minutes (default: 15)
    pub login_lockout_minutes: i64,

    /// Optional JSON subject catalog seeded at startup, bundled list otherwise
    pub subjects_file: Option<String>,

    /// Number of browse result sets kept for fallback (default: 64)
    pub browse_cache_capacity: usize,

    /// Optional JSON file backing the browse cache
    pub browse_cache_path: Option<String>,

    /// Emails granted the admin role on first sign in
    pub admin_emails: Vec<String>,

    /// JWT Secret Key (Required in production)
    pub jwt_secret: String,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_file_size: 5 * 1024 * 1024, // 5 MB
            browse_page_size: 60,
            approved_list_limit: 50,
            availability_scan_limit: 2000,
            signed_url_ttl_secs: 60 * 60,
            login_code_ttl_minutes: 15,
            session_ttl_hours: 24,
            login_max_failed_attempts: 5,
            login_lockout_minutes: 15,
            subjects_file: None,
            browse_cache_capacity: 64,
            browse_cache_path: None,
            admin_emails: Vec::new(),
            jwt_secret: "secret".to_string(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

fn list(key: &str) -> Option<Vec<String>> {
    env::var(key).ok().map(|v| {
        v.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_file_size: parsed("MAX_FILE_SIZE", default.max_file_size),
            browse_page_size: parsed("BROWSE_PAGE_SIZE", default.browse_page_size),
            approved_list_limit: parsed("APPROVED_LIST_LIMIT", default.approved_list_limit),
            availability_scan_limit: parsed(
                "AVAILABILITY_SCAN_LIMIT",
                default.availability_scan_limit,
            ),
            signed_url_ttl_secs: parsed("SIGNED_URL_TTL_SECS", default.signed_url_ttl_secs),
            login_code_ttl_minutes: parsed(
                "LOGIN_CODE_TTL_MINUTES",
                default.login_code_ttl_minutes,
            ),
            session_ttl_hours: parsed("SESSION_TTL_HOURS", default.session_ttl_hours),
            login_max_failed_attempts: parsed(
                "LOGIN_MAX_FAILED_ATTEMPTS",
                default.login_max_failed_attempts,
            ),
            login_lockout_minutes: parsed("LOGIN_LOCKOUT_MINUTES", default.login_lockout_minutes),
            subjects_file: env::var("SUBJECTS_FILE").ok(),
            browse_cache_capacity: parsed("BROWSE_CACHE_CAPACITY", default.browse_cache_capacity),
            browse_cache_path: env::var("BROWSE_CACHE_PATH").ok(),
            admin_emails: list("ADMIN_EMAILS")
                .map(|emails| emails.into_iter().map(|e| e.to_lowercase()).collect())
                .unwrap_or(default.admin_emails),
            jwt_secret: env::var("JWT_SECRET").unwrap_or(default.jwt_secret), // dev fallback
            allowed_origins: list("ALLOWED_ORIGINS").unwrap_or(default.allowed_origins),
        }
    }

    /// Config for local runs and tests: in-memory cache, one admin account
    pub fn development() -> Self {
        Self {
            admin_emails: vec!["admin@college.test".to_string()],
            ..Self::default()
        }
    }

    /// Human readable limit used in the oversize message, e.g. "5 MB"
    pub fn max_file_size_label(&self) -> String {
        let mb = self.max_file_size as f64 / (1024.0 * 1024.0);
        if mb.fract() == 0.0 {
            format!("{} MB", mb as u64)
        } else {
            format!("{:.1} MB", mb)
        }
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.to_lowercase();
        self.admin_emails.iter().any(|e| *e == email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.max_file_size, 5 * 1024 * 1024);
        assert_eq!(config.browse_page_size, 60);
        assert_eq!(config.approved_list_limit, 50);
        assert!(config.browse_cache_path.is_none());
    }

    #[test]
    fn test_size_label() {
        let mut config = AppConfig::default();
        assert_eq!(config.max_file_size_label(), "5 MB");
        config.max_file_size = 1536 * 1024;
        assert_eq!(config.max_file_size_label(), "1.5 MB");
    }

    #[test]
    fn test_admin_email_is_case_insensitive() {
        let config = AppConfig::development();
        assert!(config.is_admin_email("Admin@College.test"));
        assert!(!config.is_admin_email("student@college.test"));
    }

    #[test]
    fn test_from_env_cors_fallback() {
        unsafe { env::remove_var("ALLOWED_ORIGINS") };
        let config = AppConfig::from_env();
        let default_config = AppConfig::default();
        assert_eq!(config.allowed_origins, default_config.allowed_origins);
        assert!(!config.allowed_origins.contains(&"*".to_string()));
    }
}
