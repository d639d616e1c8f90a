use std::env;

/// Longest accepted login token lifetime.
const MAX_TOKEN_TTL_DAYS: i64 = 365;
const MAX_SCRAPE_TIMEOUT_SECS: u64 = 120;

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub scrape_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Builds the config from a variable lookup. Unparsable or out of range
    /// numbers fall back to defaults or are clamped.
    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            port: var("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:./data/renobudget.db?mode=rwc".to_string()),
            jwt_secret: var("JWT_SECRET")
                .unwrap_or_else(|| "development-secret-change-in-production".to_string()),
            token_ttl_days: var("TOKEN_TTL_DAYS")
                .and_then(|d| d.parse::<i64>().ok())
                .filter(|d| *d > 0)
                .map_or(7, |d| d.min(MAX_TOKEN_TTL_DAYS)),
            scrape_timeout_secs: var("SCRAPE_TIMEOUT_SECS")
                .and_then(|s| s.parse::<u64>().ok())
                .map_or(10, |s| s.clamp(1, MAX_SCRAPE_TIMEOUT_SECS)),
        }
    }
}
