use std::env;

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_opt_usize(key: &str) -> Option<usize> {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
}

/// What to do when a requested feature is not available on the connected engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapabilityPolicy {
    /// Fail the import with `ImportError::Unsupported`.
    #[default]
    Error,
    /// Log a warning and drop the clause.
    Warn,
}

impl CapabilityPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "error" | "raise" => Some(CapabilityPolicy::Error),
            "warn" | "warning" => Some(CapabilityPolicy::Warn),
            _ => None,
        }
    }
}

/// Clock used when stamping `created_at` / `updated_at` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampZone {
    #[default]
    Utc,
    Local,
}

/// Runtime configuration for imports.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub unsupported_capability: CapabilityPolicy,
    pub default_timezone: TimestampZone,
    /// Compound-select limit of SQLite builds (`SQLITE_MAX_COMPOUND_SELECT`).
    pub sqlite_max_rows: usize,
    /// Hard row limit of a single SQL Server INSERT ... VALUES.
    pub sqlserver_max_rows: usize,
    /// Bytes MySQL adds to a statement on top of its text.
    pub mysql_query_overhead: usize,
    /// Batch size applied when the request does not set one.
    pub default_batch_size: Option<usize>,
    /// Log the full text of every emitted statement at trace level.
    pub log_statements: bool,
}

impl ImportConfig {
    pub fn from_env() -> Self {
        let unsupported_capability = env::var("BULK_IMPORT_UNSUPPORTED_CAPABILITY")
            .ok()
            .and_then(|value| CapabilityPolicy::parse(&value))
            .unwrap_or_default();

        let default_timezone = match env::var("BULK_IMPORT_DEFAULT_TIMEZONE")
            .map(|value| value.to_ascii_lowercase())
            .as_deref()
        {
            Ok("local") => TimestampZone::Local,
            _ => TimestampZone::Utc,
        };

        Self {
            unsupported_capability,
            default_timezone,
            sqlite_max_rows: env_usize("BULK_IMPORT_SQLITE_MAX_ROWS", 500),
            sqlserver_max_rows: env_usize("BULK_IMPORT_SQLSERVER_MAX_ROWS", 1000),
            mysql_query_overhead: env_usize("BULK_IMPORT_MYSQL_QUERY_OVERHEAD", 8),
            default_batch_size: env_opt_usize("BULK_IMPORT_DEFAULT_BATCH_SIZE"),
            log_statements: env_bool("BULK_IMPORT_LOG_STATEMENTS", false),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
