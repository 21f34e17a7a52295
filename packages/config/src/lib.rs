#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Centralized environment-derived configuration.
//!
//! The JWT secret, queue selection, and other process-wide knobs live in
//! one root-composed bundle rather than scattered `std::env::var` calls in
//! each binary. [`AppConfig::from_env`] is that bundle.

use std::time::Duration;

/// Deployment mode. `Production` enforces fail-fast startup checks;
/// `Development` falls back to permissive local defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Local development: missing config falls back to sane defaults.
    Development,
    /// Production: missing required config aborts startup.
    Production,
}

impl Environment {
    fn from_env() -> Self {
        match std::env::var("ENVIRONMENT").as_deref() {
            Ok("production") => Self::Production,
            _ => Self::Development,
        }
    }

    /// Whether this environment requires strict validation of required
    /// config (signing secret length, explicit `DATABASE_URL`, no `*`
    /// CORS origin).
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Queue backend selection: distributed when `QUEUE_URL` is
/// configured, in-process otherwise. The contract callers use is
/// identical either way; this only decides which implementation
/// `caseforge_queue::build` constructs.
#[derive(Debug, Clone)]
pub enum QueueBackend {
    /// In-process bounded channel; restart loses in-flight jobs.
    InProcess,
    /// External queue service reachable at the given base URL.
    Distributed {
        /// Base URL of the external queue service.
        url: String,
    },
}

/// Everything the server and worker binaries need, resolved once at
/// startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Deployment mode.
    pub environment: Environment,
    /// HMAC signing secret for access/refresh tokens. At least 32 bytes.
    pub jwt_signing_secret: String,
    /// Access token lifetime. 15 minutes.
    pub access_token_ttl: Duration,
    /// Refresh token lifetime. 30 days.
    pub refresh_token_ttl: Duration,
    /// Primary persistence connection string. A local sqlite file path in
    /// development when unset.
    pub database_url: String,
    /// Job queue backend selection.
    pub queue_backend: QueueBackend,
    /// Rate-limit / output-cache backend. `None` means in-memory.
    pub cache_url: Option<String>,
    /// API key for the configured LLM provider.
    pub llm_api_key: String,
    /// Allowed CORS origins. Never contains `"*"` in production.
    pub cors_allow_origins: Vec<String>,
    /// HMAC secret used to verify inbound billing webhooks.
    pub billing_webhook_secret: String,
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Worker pool size; defaults to `min(8, 2 * num_cpus)`.
    pub worker_pool_count: usize,
    /// Visibility timeout for distributed-mode dequeues. 600s default.
    pub queue_visibility_timeout: Duration,
}

/// Error constructing [`AppConfig`] from the process environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable was missing (only fatal in production).
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    /// A variable was present but failed validation.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// The offending variable name.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl AppConfig {
    /// Builds configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a production-required variable is
    /// missing, the signing secret is under 32 bytes, or `CORS_ALLOW_ORIGINS`
    /// contains `*` in production.
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = Environment::from_env();

        let jwt_signing_secret = require_or_dev_default(
            "JWT_SIGNING_SECRET",
            environment,
            "dev-only-signing-secret-not-for-production-use!!",
        )?;
        if jwt_signing_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                field: "JWT_SIGNING_SECRET",
                reason: "must be at least 32 bytes".to_string(),
            });
        }

        let database_url = require_or_dev_default(
            "DATABASE_URL",
            environment,
            "sqlite://data/caseforge.db",
        )?;

        let llm_api_key = require_or_dev_default("LLM_API_KEY", environment, "dev-placeholder-key")?;

        let billing_webhook_secret = require_or_dev_default(
            "BILLING_WEBHOOK_SECRET",
            environment,
            "dev-only-webhook-secret-not-for-production-use!!",
        )?;

        let queue_backend = std::env::var("QUEUE_URL").ok().map_or(QueueBackend::InProcess, |url| {
            QueueBackend::Distributed { url }
        });

        let cache_url = std::env::var("CACHE_URL").ok();

        let cors_allow_origins: Vec<String> = std::env::var("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if environment.is_production() && cors_allow_origins.iter().any(|o| o == "*") {
            return Err(ConfigError::Invalid {
                field: "CORS_ALLOW_ORIGINS",
                reason: "wildcard origin is not allowed in production".to_string(),
            });
        }

        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let default_workers = std::thread::available_parallelism()
            .map(|n| (n.get() * 2).min(8))
            .unwrap_or(4);
        let worker_pool_count: usize = std::env::var("WORKER_POOL_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default_workers);

        Ok(Self {
            environment,
            jwt_signing_secret,
            access_token_ttl: Duration::from_secs(15 * 60),
            refresh_token_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            database_url,
            queue_backend,
            cache_url,
            llm_api_key,
            cors_allow_origins,
            billing_webhook_secret,
            bind_addr,
            port,
            worker_pool_count,
            queue_visibility_timeout: Duration::from_secs(600),
        })
    }

    /// Calls [`Self::from_env`] and exits the process on failure.
    ///
    /// The process must refuse to start on missing required values in
    /// production mode; this is the entry point both binaries'
    /// `main` use instead of unwrapping directly so the failure message is
    /// consistent.
    #[must_use]
    pub fn from_env_or_exit() -> Self {
        match Self::from_env() {
            Ok(config) => config,
            Err(e) => {
                eprintln!("fatal: invalid configuration: {e}");
                std::process::exit(1);
            }
        }
    }
}

fn require_or_dev_default(
    var: &'static str,
    environment: Environment,
    dev_default: &str,
) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ if environment.is_production() => Err(ConfigError::Missing(var)),
        _ => {
            log::warn!("{var} not set; using development default");
            Ok(dev_default.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_secret_rejected() {
        // SAFETY: single-threaded test process env mutation.
        unsafe {
            std::env::set_var("ENVIRONMENT", "development");
            std::env::set_var("JWT_SIGNING_SECRET", "too-short");
        }
        let err = AppConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "JWT_SIGNING_SECRET", .. }));
        unsafe {
            std::env::remove_var("JWT_SIGNING_SECRET");
            std::env::remove_var("ENVIRONMENT");
        }
    }

    #[test]
    fn production_rejects_wildcard_cors() {
        unsafe {
            std::env::set_var("ENVIRONMENT", "production");
            std::env::set_var("JWT_SIGNING_SECRET", "x".repeat(32));
            std::env::set_var("DATABASE_URL", "postgres://localhost/test");
            std::env::set_var("LLM_API_KEY", "key");
            std::env::set_var("BILLING_WEBHOOK_SECRET", "y".repeat(32));
            std::env::set_var("CORS_ALLOW_ORIGINS", "*");
        }
        let err = AppConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "CORS_ALLOW_ORIGINS", .. }));
        unsafe {
            for var in [
                "ENVIRONMENT",
                "JWT_SIGNING_SECRET",
                "DATABASE_URL",
                "LLM_API_KEY",
                "BILLING_WEBHOOK_SECRET",
                "CORS_ALLOW_ORIGINS",
            ] {
                std::env::remove_var(var);
            }
        }
    }
}
