use std::env;
use std::time::Duration;

use crate::orchestrator::OrchestratorSettings;
use crate::payments::{Environment, PesapalConfig};
use crate::poller::PollSettings;

/// Per-IP request limits, in requests per minute. `0` disables a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Routes that call PesaPal.
    pub strict_rpm: u32,
    /// Routes that only do local work.
    pub standard_rpm: u32,
    /// Health checks.
    pub relaxed_rpm: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            strict_rpm: 10,
            standard_rpm: 30,
            relaxed_rpm: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn disabled() -> Self {
        Self {
            strict_rpm: 0,
            standard_rpm: 0,
            relaxed_rpm: 0,
        }
    }

    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            strict_rpm: parse_env("RATE_LIMIT_STRICT_RPM").unwrap_or(defaults.strict_rpm),
            standard_rpm: parse_env("RATE_LIMIT_STANDARD_RPM").unwrap_or(defaults.standard_rpm),
            relaxed_rpm: parse_env("RATE_LIMIT_RELAXED_RPM").unwrap_or(defaults.relaxed_rpm),
        }
    }
}

/// Origins allowed to call the API from a browser. Empty means any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedOrigins(Vec<String>);

impl AllowedOrigins {
    pub fn any() -> Self {
        Self(Vec::new())
    }

    pub fn list<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(origins.into_iter().map(Into::into).collect())
    }

    /// Parses a comma-separated list; a `*` entry allows any origin.
    pub fn parse(s: &str) -> Self {
        let origins: Vec<String> = s
            .split(',')
            .map(|o| o.trim().trim_end_matches('/').to_string())
            .filter(|o| !o.is_empty())
            .collect();

        if origins.iter().any(|o| o == "*") {
            Self::any()
        } else {
            Self(origins)
        }
    }

    pub fn is_any(&self) -> bool {
        self.0.is_empty()
    }

    pub fn origins(&self) -> &[String] {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub base_url: String,
    pub pesapal: PesapalConfig,
    /// IPN URL registered with PesaPal.
    pub ipn_url: String,
    pub order_id_prefix: String,
    pub order_branch: Option<String>,
    pub poll: PollSettings,
    pub allowed_origins: AllowedOrigins,
    pub rate_limit: RateLimitConfig,
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = parse_env("PORT").unwrap_or(3000);

        let base_url = non_empty_env("BASE_URL")
            .unwrap_or_else(|| format!("http://{}:{}", host, port))
            .trim_end_matches('/')
            .to_string();

        let environment = match env::var("PESAPAL_ENV") {
            Ok(value) => Environment::from_str(&value).unwrap_or_else(|| {
                tracing::warn!("Unknown PESAPAL_ENV '{}', using sandbox", value);
                Environment::Sandbox
            }),
            Err(_) => Environment::Sandbox,
        };

        let defaults = PollSettings::default();
        let poll = PollSettings {
            interval: parse_env("POLL_INTERVAL_SECS")
                .filter(|s: &u64| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.interval),
            timeout: parse_env("POLL_TIMEOUT_SECS")
                .filter(|s: &u64| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        };

        Self {
            ipn_url: non_empty_env("IPN_URL").unwrap_or_else(|| format!("{}/api/ipn", base_url)),
            host,
            port,
            base_url,
            pesapal: PesapalConfig {
                environment,
                base_url: non_empty_env("PESAPAL_BASE_URL"),
                consumer_key: non_empty_env("PESAPAL_CONSUMER_KEY"),
                consumer_secret: non_empty_env("PESAPAL_CONSUMER_SECRET"),
            },
            order_id_prefix: non_empty_env("ORDER_ID_PREFIX").unwrap_or_else(|| "order".to_string()),
            order_branch: non_empty_env("ORDER_BRANCH"),
            poll,
            allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .map(|v| AllowedOrigins::parse(&v))
                .unwrap_or_default(),
            rate_limit: RateLimitConfig::from_env(),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            environment: self.pesapal.environment,
            callback_url: self.ipn_url.clone(),
            order_id_prefix: self.order_id_prefix.clone(),
            branch: self.order_branch.clone(),
            poll: self.poll,
        }
    }
}
