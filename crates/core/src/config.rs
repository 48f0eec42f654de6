use std::collections::BTreeMap;
use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_u32(key: &str, default: u32) -> u32 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u16(key: &str, default: u16) -> u16 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    match env_opt(key) {
        Some(v) => v
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => default.iter().map(|s| s.to_string()).collect(),
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub ingest: IngestConfig,
    pub normalize: NormalizeConfig,
    pub postgres: PostgresConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            source: SourceConfig::from_env(),
            ingest: IngestConfig::from_env(),
            normalize: NormalizeConfig::from_env(),
            postgres: PostgresConfig::from_env(),
        }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!(
            "  source:    provider={}, live_url={}, archive_url={}",
            self.source.provider,
            self.source.live_base_url,
            self.source.archive_base_url
        );
        tracing::info!(
            "  ingest:    rate={}rps burst={} retries={} backoff={}s jitter<={}s lap_concurrency={}",
            self.ingest.rate_limit_rps,
            self.ingest.rate_limit_burst,
            self.ingest.max_attempts,
            self.ingest.backoff_base_secs,
            self.ingest.jitter_max_secs,
            self.ingest.lap_concurrency
        );
        tracing::info!(
            "  normalize: session_types={:?} name_policy={}",
            self.ingest.session_types,
            self.ingest.driver_name_policy
        );
        tracing::info!(
            "  postgres:  host={}, db={}",
            self.postgres.host,
            self.postgres.database
        );
    }
}

// ── Source selection ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// "live" or "archive"
    pub provider: String,
    pub live_base_url: String,
    pub archive_base_url: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            provider: "live".into(),
            live_base_url: "https://api.openf1.org/v1".into(),
            archive_base_url: "http://localhost:8720/archive".into(),
        }
    }
}

impl SourceConfig {
    fn from_env() -> Self {
        Self {
            provider: env_or("SOURCE", "live"),
            live_base_url: env_or("LIVE_BASE_URL", "https://api.openf1.org/v1"),
            archive_base_url: env_or("ARCHIVE_BASE_URL", "http://localhost:8720/archive"),
        }
    }
}

// ── Ingestion ─────────────────────────────────────────────────

/// How to treat a driver record whose descriptive fields are emptier than
/// what is already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverNamePolicy {
    /// Only fill fields that are currently unknown.
    PreferExisting,
    /// Latest fetch wins whenever it carries a value.
    PreferLatest,
}

impl std::fmt::Display for DriverNamePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverNamePolicy::PreferExisting => write!(f, "prefer-existing"),
            DriverNamePolicy::PreferLatest => write!(f, "prefer-latest"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Global request ceiling, requests per second.
    pub rate_limit_rps: f64,
    /// Token bucket burst size.
    pub rate_limit_burst: u32,
    /// Maximum fetch attempts per resource before the branch fails.
    pub max_attempts: u32,
    /// Fixed wait between attempts, seconds.
    pub backoff_base_secs: f64,
    /// Upper bound of the random jitter added to each wait, seconds.
    pub jitter_max_secs: f64,
    /// Concurrent in-flight lap fetches (the session×driver wave).
    pub lap_concurrency: usize,
    /// Session types worth importing; everything else is dropped.
    pub session_types: Vec<String>,
    pub driver_name_policy: DriverNamePolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            rate_limit_rps: 2.0,
            rate_limit_burst: 2,
            max_attempts: 5,
            backoff_base_secs: 10.0,
            jitter_max_secs: 20.0,
            lap_concurrency: 8,
            session_types: ["Qualifying", "Race", "Sprint"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            driver_name_policy: DriverNamePolicy::PreferExisting,
        }
    }
}

impl IngestConfig {
    fn from_env() -> Self {
        let policy = match env_or("DRIVER_NAME_POLICY", "prefer-existing").as_str() {
            "prefer-latest" => DriverNamePolicy::PreferLatest,
            _ => DriverNamePolicy::PreferExisting,
        };
        Self {
            rate_limit_rps: env_f64("RATE_LIMIT_RPS", 2.0),
            rate_limit_burst: env_u32("RATE_LIMIT_BURST", 2),
            max_attempts: env_u32("FETCH_MAX_ATTEMPTS", 5),
            backoff_base_secs: env_f64("FETCH_BACKOFF_BASE_SECS", 10.0),
            jitter_max_secs: env_f64("FETCH_JITTER_MAX_SECS", 20.0),
            lap_concurrency: env_u32("LAP_CONCURRENCY", 8) as usize,
            session_types: env_list("SESSION_TYPES", &["Qualifying", "Race", "Sprint"]),
            driver_name_policy: policy,
        }
    }
}

// ── Name normalization ────────────────────────────────────────

/// Sponsor names stripped out of official meeting names.
const DEFAULT_SPONSOR_TOKENS: &[&str] = &[
    "FORMULA 1",
    "ARAMCO",
    "GULF AIR",
    "STC",
    "ROLEX",
    "MSC CRUISES",
    "LENOVO",
    "CRYPTO.COM",
    "TAG HEUER",
    "PIRELLI",
    "AWS",
    "QATAR AIRWAYS",
    "MOËT & CHANDON",
    "HEINEKEN SILVER",
    "HEINEKEN",
    "SINGAPORE AIRLINES",
    "ETIHAD AIRWAYS",
    "LOUIS VUITTON",
];

/// Locale variants that collapse to one canonical grand-prix name.
const DEFAULT_NAME_OVERRIDES: &[(&str, &str)] = &[
    ("EMILIA", "EMILIA-ROMAGNA GRAND PRIX"),
    ("SÃO PAULO", "SAO PAULO GRAND PRIX"),
    ("SAO PAULO", "SAO PAULO GRAND PRIX"),
    ("CIUDAD DE MÉXICO", "MEXICAN GRAND PRIX"),
    ("MEXICO", "MEXICAN GRAND PRIX"),
    ("ESPAÑA", "SPANISH GRAND PRIX"),
    ("ÖSTERREICH", "AUSTRIAN GRAND PRIX"),
    ("ITALIA", "ITALIAN GRAND PRIX"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeConfig {
    pub sponsor_tokens: Vec<String>,
    /// Substring → canonical name, checked after sponsor stripping.
    pub name_overrides: BTreeMap<String, String>,
}

impl NormalizeConfig {
    fn from_env() -> Self {
        let sponsor_tokens = env_list("SPONSOR_TOKENS", DEFAULT_SPONSOR_TOKENS);
        let name_overrides = env_opt("NAME_OVERRIDES")
            .and_then(|raw| serde_json::from_str::<BTreeMap<String, String>>(&raw).ok())
            .unwrap_or_else(|| {
                DEFAULT_NAME_OVERRIDES
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            });
        Self {
            sponsor_tokens,
            name_overrides,
        }
    }
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            sponsor_tokens: DEFAULT_SPONSOR_TOKENS.iter().map(|s| s.to_string()).collect(),
            name_overrides: DEFAULT_NAME_OVERRIDES
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5432,
            database: "pitwall".into(),
            username: None,
            password: None,
            ssl_mode: "prefer".into(),
            max_connections: 10,
        }
    }
}

impl PostgresConfig {
    fn from_env() -> Self {
        Self {
            host: env_or("PG_HOST", "localhost"),
            port: env_u16("PG_PORT", 5432),
            database: env_or("PG_DATABASE", "pitwall"),
            username: env_opt("PG_USERNAME"),
            password: env_opt("PG_PASSWORD"),
            ssl_mode: env_or("PG_SSL_MODE", "prefer"),
            max_connections: env_u32("PG_MAX_CONNECTIONS", 10),
        }
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_defaults_cover_the_knobs() {
        let cfg = NormalizeConfig::default();
        assert!(cfg.sponsor_tokens.iter().any(|t| t == "ARAMCO"));
        assert_eq!(
            cfg.name_overrides.get("MEXICO").map(String::as_str),
            Some("MEXICAN GRAND PRIX")
        );
    }

    #[test]
    fn connection_string_shape() {
        let cfg = PostgresConfig {
            host: "db".into(),
            port: 5432,
            database: "pitwall".into(),
            username: Some("ingest".into()),
            password: Some("secret".into()),
            ssl_mode: "prefer".into(),
            max_connections: 10,
        };
        assert_eq!(
            cfg.connection_string(),
            "postgres://ingest:secret@db:5432/pitwall?sslmode=prefer"
        );
        assert!(cfg.is_configured());
    }
}
