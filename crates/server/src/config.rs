// Server configuration loaded from environment variables.
// Decision: Every setting has a default so `docket-server` starts with no env at all
// Decision: Malformed values fail startup instead of silently falling back

use std::net::SocketAddr;
use std::time::Duration;

use docket_anthropic::{AnthropicConfig, DEFAULT_MODEL};
use docket_core::RetryPolicy;
use docket_durable::{PollerConfig, WorkerPoolConfig};

const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024; // 2 MB

/// Configuration errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Primary generative capability settings
#[derive(Debug, Clone)]
pub struct PrimaryConfig {
    /// Provider tag; only "anthropic" is wired
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub timeout: Duration,
    pub max_tokens: u32,
}

impl PrimaryConfig {
    /// Anthropic connection settings, or `None` when the primary is unusable
    /// and every task should take the fallback path
    pub fn anthropic(&self) -> Option<AnthropicConfig> {
        if !self.provider.eq_ignore_ascii_case("anthropic") {
            return None;
        }
        let api_key = self.api_key.as_deref()?;

        let mut config = AnthropicConfig::new(api_key)
            .with_model(&self.model)
            .with_max_tokens(self.max_tokens)
            .with_timeout(self.timeout);
        if let Some(url) = &self.api_url {
            config = config.with_base_url(url);
        }
        Some(config)
    }
}

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Prefix for task routes (e.g. "/api")
    pub api_prefix: String,
    pub cors_origins: Vec<String>,
    pub body_limit: usize,
    /// Name reported by /healthz
    pub service_name: String,
    /// PostgreSQL URL; `None` selects the in-memory backend
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub worker: WorkerPoolConfig,
    pub primary: PrimaryConfig,
    pub retry: RetryPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            api_prefix: String::new(),
            cors_origins: Vec::new(),
            body_limit: DEFAULT_BODY_LIMIT,
            service_name: "docket".to_string(),
            database_url: None,
            database_max_connections: 10,
            worker: WorkerPoolConfig::default(),
            primary: PrimaryConfig {
                provider: "anthropic".to_string(),
                model: DEFAULT_MODEL.to_string(),
                api_key: None,
                api_url: None,
                timeout: Duration::from_secs(30),
                max_tokens: 200,
            },
            retry: RetryPolicy::exponential(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let defaults = Self::default();

        let host = env.string("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = env.parse("PORT")?.unwrap_or(3001);
        let bind_addr = format!("{}:{}", host, port)
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                var: "BIND_ADDR",
                value: host.clone(),
                reason: e.to_string(),
            })?;

        let retry = RetryPolicy::exponential()
            .with_max_attempts(env.parse("RETRY_ATTEMPTS")?.unwrap_or(3))
            .with_initial_interval(env.millis("RETRY_BASE_DELAY_MS")?.unwrap_or(Duration::from_millis(250)))
            .with_max_interval(env.millis("RETRY_MAX_DELAY_MS")?.unwrap_or(Duration::from_secs(5)))
            .with_backoff_coefficient(env.parse("RETRY_FACTOR")?.unwrap_or(2.0));

        let poller = PollerConfig::new()
            .with_min_interval(env.millis("WORKER_POLL_MIN_MS")?.unwrap_or(Duration::from_millis(100)))
            .with_max_interval(env.millis("WORKER_POLL_MAX_MS")?.unwrap_or(Duration::from_secs(2)));

        let worker = WorkerPoolConfig::new()
            .with_max_concurrency(env.parse("WORKER_CONCURRENCY")?.unwrap_or(2))
            .with_lease_window(
                env.parse::<u64>("LEASE_WINDOW_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(Duration::from_secs(300)),
            )
            .with_poller(poller)
            .with_store_retry(retry.clone())
            .with_skip_terminal_redelivery(env.parse("SKIP_TERMINAL_REDELIVERY")?.unwrap_or(false));

        let primary = PrimaryConfig {
            provider: env.string("PRIMARY_LLM").unwrap_or(defaults.primary.provider),
            model: env.string("PRIMARY_LLM_MODEL").unwrap_or(defaults.primary.model),
            api_key: env.string("PRIMARY_LLM_API_KEY"),
            api_url: env.string("PRIMARY_LLM_URL"),
            timeout: env
                .parse::<u64>("PRIMARY_LLM_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.primary.timeout),
            max_tokens: env.parse("PRIMARY_LLM_MAX_TOKENS")?.unwrap_or(200),
        };

        // Example: CORS_ALLOWED_ORIGINS="https://app.example.com,https://admin.example.com"
        let cors_origins = env
            .string("CORS_ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            bind_addr,
            api_prefix: env.string("API_PREFIX").unwrap_or_default(),
            cors_origins,
            body_limit: env.parse("BODY_LIMIT_BYTES")?.unwrap_or(DEFAULT_BODY_LIMIT),
            service_name: env.string("SERVICE_NAME").unwrap_or(defaults.service_name),
            database_url: env.string("DATABASE_URL"),
            database_max_connections: env.parse("DATABASE_MAX_CONNECTIONS")?.unwrap_or(10),
            worker,
            primary,
            retry,
        })
    }
}

/// Typed access to a variable source; empty values count as unset
struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn string(&self, var: &str) -> Option<String> {
        (self.lookup)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, var: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.string(var)
            .map(|value| {
                value.parse::<T>().map_err(|e| ConfigError::Invalid {
                    var,
                    reason: e.to_string(),
                    value,
                })
            })
            .transpose()
    }

    fn millis(&self, var: &'static str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.parse::<u64>(var)?.map(Duration::from_millis))
    }
}
