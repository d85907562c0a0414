//! Process bootstrap settings, read from the environment (§9: ambient
//! stack). Distinct from [`crate::params`], which is protocol state voted
//! on by governance — this is deployment configuration, read once at
//! startup.

#[derive(Debug, Clone)]
pub struct AppSettings {
    pub log_dir: String,
    pub log_file: String,
    pub rotation: String,
    pub log_level: String,
    pub use_json: bool,
    pub enable_tracing: bool,
    pub database_url: Option<String>,
}

impl AppSettings {
    /// Reads from the environment, falling back to development-friendly
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            log_dir: std::env::var("MARKETPLACE_LOG_DIR").unwrap_or_else(|_| "logs".into()),
            log_file: std::env::var("MARKETPLACE_LOG_FILE").unwrap_or_else(|_| "marketplace-core.log".into()),
            rotation: std::env::var("MARKETPLACE_LOG_ROTATION").unwrap_or_else(|_| "daily".into()),
            log_level: std::env::var("MARKETPLACE_LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            use_json: std::env::var("MARKETPLACE_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            enable_tracing: std::env::var("MARKETPLACE_ENABLE_TRACING")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
            database_url: std::env::var("DATABASE_URL").ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable_without_any_env_vars() {
        let settings = AppSettings {
            log_dir: "logs".into(),
            log_file: "marketplace-core.log".into(),
            rotation: "daily".into(),
            log_level: "info".into(),
            use_json: false,
            enable_tracing: true,
            database_url: None,
        };
        assert_eq!(settings.rotation, "daily");
        assert!(settings.enable_tracing);
    }
}
