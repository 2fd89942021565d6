//! Application configuration.
//!
//! Everything is read once from the environment at startup; there is no
//! runtime reconfiguration. `from_lookup` exists so tests can feed a map
//! instead of mutating process environment.

use std::time::Duration;

use crate::queue::QueueBackend;

/// Complete engine configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub auth: AuthConfig,
    pub cache: CacheConfig,
    pub admission: AdmissionConfig,
    pub logging: LogConfig,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    pub worker_concurrency: usize,
    pub max_attempts: u32,
    pub job_timeout_secs: u64,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

impl QueueConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub admin_email: String,
    pub token_ttl_hours: i64,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL for the sale-status projection. Short: readers tolerate a bounded
    /// staleness window on availableQuantity.
    pub sale_ttl_secs: u64,
    /// TTL for per-user purchase status. Long enough to outlast client polling.
    pub status_ttl_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Admission attempts allowed per user per 60s window.
    pub rate_limit_per_min: u32,
    /// Average per-job service time used for the advisory wait estimate.
    pub est_secs_per_job: f64,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_dir: String,
    pub log_file: String,
    pub log_level: String,
    pub rotation: String,
    pub use_json: bool,
}

impl AppConfig {
    /// Read configuration from process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    /// Read configuration from an arbitrary key lookup.
    pub fn from_lookup(get: &dyn Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = get("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required"))?;
        let jwt_secret = get("JWT_SECRET")
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET is required"))?;

        Ok(Self {
            http: HttpConfig {
                port: parse_or(get("PORT"), 8080)?,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: parse_or(get("DATABASE_MAX_CONNECTIONS"), 20)?,
            },
            queue: QueueConfig {
                backend: match get("QUEUE_BACKEND").as_deref() {
                    None | Some("") => QueueBackend::Postgres,
                    Some(name) => QueueBackend::parse(name)
                        .ok_or_else(|| anyhow::anyhow!("unknown QUEUE_BACKEND: {name}"))?,
                },
                worker_concurrency: parse_or(get("WORKER_CONCURRENCY"), 8)?,
                max_attempts: parse_or(get("JOB_MAX_ATTEMPTS"), 5)?,
                job_timeout_secs: parse_or(get("JOB_TIMEOUT_SECS"), 10)?,
                backoff_base_ms: parse_or(get("JOB_BACKOFF_BASE_MS"), 200)?,
                backoff_cap_ms: parse_or(get("JOB_BACKOFF_CAP_MS"), 10_000)?,
            },
            auth: AuthConfig {
                jwt_secret,
                admin_email: get("ADMIN_EMAIL")
                    .unwrap_or_else(|| "admin@surgemart.io".to_string())
                    .to_lowercase(),
                token_ttl_hours: parse_or(get("TOKEN_TTL_HOURS"), 24)?,
            },
            cache: CacheConfig {
                sale_ttl_secs: parse_or(get("SALE_CACHE_TTL_SECS"), 10)?,
                status_ttl_secs: parse_or(get("STATUS_TTL_SECS"), 3600)?,
            },
            admission: AdmissionConfig {
                rate_limit_per_min: parse_or(get("RATE_LIMIT_PER_MIN"), 5)?,
                est_secs_per_job: parse_or(get("EST_SECS_PER_JOB"), 0.5)?,
            },
            logging: LogConfig {
                log_dir: get("LOG_DIR").unwrap_or_else(|| "logs".to_string()),
                log_file: get("LOG_FILE").unwrap_or_else(|| "surgemart.log".to_string()),
                log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
                rotation: get("LOG_ROTATION").unwrap_or_else(|| "daily".to_string()),
                use_json: get("LOG_JSON").map(|v| v == "1" || v == "true").unwrap_or(false),
            },
        })
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) if raw.is_empty() => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid config value {raw:?}: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_fill_in() {
        let get = lookup(&[
            ("DATABASE_URL", "postgres://localhost/surgemart"),
            ("JWT_SECRET", "secret"),
        ]);
        let cfg = AppConfig::from_lookup(&get).unwrap();
        assert_eq!(cfg.http.port, 8080);
        assert_eq!(cfg.queue.backend, QueueBackend::Postgres);
        assert_eq!(cfg.queue.worker_concurrency, 8);
        assert_eq!(cfg.queue.max_attempts, 5);
        assert_eq!(cfg.cache.sale_ttl_secs, 10);
        assert_eq!(cfg.admission.rate_limit_per_min, 5);
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let get = lookup(&[("JWT_SECRET", "secret")]);
        assert!(AppConfig::from_lookup(&get).is_err());
    }

    #[test]
    fn memory_backend_selectable() {
        let get = lookup(&[
            ("DATABASE_URL", "postgres://localhost/surgemart"),
            ("JWT_SECRET", "secret"),
            ("QUEUE_BACKEND", "memory"),
            ("WORKER_CONCURRENCY", "2"),
        ]);
        let cfg = AppConfig::from_lookup(&get).unwrap();
        assert_eq!(cfg.queue.backend, QueueBackend::Memory);
        assert_eq!(cfg.queue.worker_concurrency, 2);
    }

    #[test]
    fn unknown_backend_rejected() {
        let get = lookup(&[
            ("DATABASE_URL", "postgres://localhost/surgemart"),
            ("JWT_SECRET", "secret"),
            ("QUEUE_BACKEND", "rabbitmq"),
        ]);
        assert!(AppConfig::from_lookup(&get).is_err());
    }

    #[test]
    fn admin_email_lowercased() {
        let get = lookup(&[
            ("DATABASE_URL", "postgres://localhost/surgemart"),
            ("JWT_SECRET", "secret"),
            ("ADMIN_EMAIL", "Admin@Example.COM"),
        ]);
        let cfg = AppConfig::from_lookup(&get).unwrap();
        assert_eq!(cfg.auth.admin_email, "admin@example.com");
    }
}
