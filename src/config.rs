//! Configuration types.

use std::env;
use std::time::Duration;

use crate::error::ConfigError;

/// User service connection settings.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base URL of the external user API, e.g. `https://api.example.com/v1`.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout_ms: u64,
}

/// HTTP server settings for the onboarding API.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// Flow tuning knobs.
#[derive(Debug, Clone, Default)]
pub struct FlowConfig {
    /// Replaces the default exit animation delay when set.
    pub exit_delay: Option<Duration>,
    /// Base for invite deeplinks shown on the completion step.
    pub share_base_url: Option<String>,
    /// Unmount sessions idle for this long.
    pub session_idle_ttl: Option<Duration>,
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub server: ServerConfig,
    pub flow: FlowConfig,
}

impl AppConfig {
    /// Load configuration from the environment (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let base_url = env::var("ONBOARDING_API_BASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("ONBOARDING_API_BASE_URL".to_string()))?;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "ONBOARDING_API_BASE_URL".to_string(),
                message: format!("expected an http(s) URL, got {base_url}"),
            });
        }

        let service = ServiceConfig {
            base_url,
            timeout_ms: parse_var("ONBOARDING_REQUEST_TIMEOUT_MS")?.unwrap_or(10_000),
        };
        let server = ServerConfig {
            port: parse_var("ONBOARDING_HTTP_PORT")?.unwrap_or(ServerConfig::default().port),
        };
        let flow = FlowConfig {
            exit_delay: parse_var::<u64>("ONBOARDING_EXIT_DELAY_MS")?.map(Duration::from_millis),
            share_base_url: env::var("ONBOARDING_SHARE_BASE_URL").ok(),
            session_idle_ttl: parse_var::<u64>("ONBOARDING_SESSION_IDLE_SECS")?
                .map(Duration::from_secs),
        };

        Ok(Self {
            service,
            server,
            flow,
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
