use thiserror::Error;

pub const MIN_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    Development,
    Staging,
    Production,
}

impl ServerMode {
    fn parse(s: &str) -> Option<ServerMode> {
        match s {
            "development" => Some(ServerMode::Development),
            "staging" => Some(ServerMode::Staging),
            "production" => Some(ServerMode::Production),
            _ => None,
        }
    }
}

/// Config violations in production are fatal; the process must not accept
/// traffic with a weak secret or auth bypasses left open.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("SERVER_MODE must be development, staging or production (got {0:?})")]
    BadMode(String),
    #[error("AUTH_TOKEN_SECRET must be set in production")]
    MissingSecret,
    #[error("AUTH_TOKEN_SECRET must be at least {MIN_SECRET_BYTES} bytes in production")]
    WeakSecret,
    #[error("REQUIRE_AUTH must not be disabled in production")]
    AuthBypassEnabled,
    #[error("DB_SSL_REJECT_UNAUTHORIZED must not be disabled in production")]
    InsecureTls,
    #[error("{0} must be a number")]
    BadNumber(&'static str),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: ServerMode,
    pub auth_secret: String,
    pub require_auth: bool,
    pub rate_limit_max: u32,
    pub rate_limit_window_ms: u64,
    /// Empty means wildcard (development only).
    pub cors_origins: Vec<String>,
    pub db_url: String,
    pub db_ssl: bool,
    pub db_ssl_reject_unauthorized: bool,
    pub ping_interval_ms: u64,
    pub ping_timeout_ms: u64,
    pub port: u16,
}

fn parse_num<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(v) => v.parse().map_err(|_| ConfigError::BadNumber(name)),
        None => Ok(default),
    }
}

/// Secret used when none is configured outside production. Long enough to
/// satisfy the HS256 key-size check, useless for anything real.
const DEV_SECRET: &str = "xword-development-secret-do-not-use-in-prod";

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        Config::from_lookup(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
    }

    /// Parse config from a variable lookup: the process environment in
    /// `from_env`, a plain map in tests.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
        let get_bool = |name: &str| get(name).map(|v| matches!(v.as_str(), "1" | "true" | "yes"));

        let mode = match get("SERVER_MODE") {
            Some(v) => ServerMode::parse(&v).ok_or(ConfigError::BadMode(v))?,
            None => ServerMode::Development,
        };
        let production = mode == ServerMode::Production;

        // Production never falls back to the built-in secret: an unset
        // variable is its own fatal condition, distinct from a short one.
        let auth_secret = match get("AUTH_TOKEN_SECRET") {
            Some(s) => {
                if production && s.len() < MIN_SECRET_BYTES {
                    return Err(ConfigError::WeakSecret);
                }
                s
            }
            None if production => return Err(ConfigError::MissingSecret),
            None => DEV_SECRET.to_string(),
        };

        let require_auth = get_bool("REQUIRE_AUTH").unwrap_or(production);
        if production && !require_auth {
            // The variable is forced on in production; an explicit opt-out is
            // a deployment mistake worth failing loudly over.
            return Err(ConfigError::AuthBypassEnabled);
        }

        let db_ssl_reject_unauthorized = get_bool("DB_SSL_REJECT_UNAUTHORIZED").unwrap_or(true);
        if production && !db_ssl_reject_unauthorized {
            return Err(ConfigError::InsecureTls);
        }

        let cors_origins = get("CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty() && *s != "*")
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Config {
            mode,
            auth_secret,
            require_auth,
            rate_limit_max: parse_num("RATE_LIMIT_MAX", get("RATE_LIMIT_MAX"), 1000)?,
            rate_limit_window_ms: parse_num(
                "RATE_LIMIT_WINDOW_MS",
                get("RATE_LIMIT_WINDOW_MS"),
                900_000,
            )?,
            cors_origins,
            db_url: get("DB_URL").unwrap_or_else(|| "sqlite:xword.db?mode=rwc".to_string()),
            db_ssl: get_bool("DB_SSL").unwrap_or(production),
            db_ssl_reject_unauthorized,
            ping_interval_ms: parse_num("PING_INTERVAL_MS", get("PING_INTERVAL_MS"), 2000)?,
            ping_timeout_ms: parse_num("PING_TIMEOUT_MS", get("PING_TIMEOUT_MS"), 5000)?,
            port: parse_num("PORT", get("PORT"), 8080)?,
        })
    }

    /// Development defaults against an in-memory database, used by tests.
    pub fn development(db_url: &str) -> Config {
        Config {
            mode: ServerMode::Development,
            auth_secret: DEV_SECRET.to_string(),
            require_auth: false,
            rate_limit_max: 1000,
            rate_limit_window_ms: 900_000,
            cors_origins: Vec::new(),
            db_url: db_url.to_string(),
            db_ssl: false,
            db_ssl_reject_unauthorized: true,
            ping_interval_ms: 2000,
            ping_timeout_ms: 5000,
            port: 0,
        }
    }

    /// Legacy `?user-id=` extraction is only honored outside production when
    /// auth is not required.
    pub fn legacy_auth_allowed(&self) -> bool {
        self.mode != ServerMode::Production && !self.require_auth
    }
}
