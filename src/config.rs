/// Configuration for the graftmonkey engine
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub auto_migrate: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "graftmonkey.sqlite".to_string(),
            auto_migrate: true,
        }
    }
}

impl Config {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self {
            db_path: std::env::var("GRAFTMONKEY_DB")
                .unwrap_or_else(|_| "graftmonkey.sqlite".to_string()),
            auto_migrate: std::env::var("GRAFTMONKEY_AUTO_MIGRATE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
        }
    }
}
