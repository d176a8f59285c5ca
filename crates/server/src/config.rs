//! Runtime configuration read from the process environment.
//!
//! `.env` files are loaded by the binary before [`ServerConfig::from_env`] runs,
//! so every value here can come from either source.

use std::{str::FromStr, sync::Arc};

use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://garden.db";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_JWT_TTL_HOURS: i64 = 168;
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 1024 * 1024;
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Used only when `NODE_ENV` is not `production` and no secret is configured.
const DEV_JWT_SECRET: &str = "development-only-secret-change-me-before-deploying";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable `{0}` must be set in production")]
    MissingVar(&'static str),
    #[error("invalid value for `{name}`: {reason}")]
    InvalidVar { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "development" | "dev" | "test" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(ConfigError::InvalidVar {
                name: "NODE_ENV",
                reason: format!("unknown environment '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub jwt_secret: Arc<SecretString>,
    pub jwt_ttl: Duration,
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub log_level: String,
    pub body_limit_bytes: usize,
    /// Empty means any origin is allowed.
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let environment = get("NODE_ENV")
            .map(|value| value.parse::<Environment>())
            .transpose()?
            .unwrap_or_default();

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => {
                if environment == Environment::Production && secret.len() < MIN_JWT_SECRET_LEN {
                    return Err(ConfigError::InvalidVar {
                        name: "JWT_SECRET",
                        reason: format!("must be at least {MIN_JWT_SECRET_LEN} bytes"),
                    });
                }
                secret
            }
            None if environment == Environment::Production => {
                return Err(ConfigError::MissingVar("JWT_SECRET"));
            }
            None => {
                tracing::warn!("JWT_SECRET not set; using the development fallback secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        let jwt_ttl_hours = parse_or(get("JWT_TTL_HOURS"), "JWT_TTL_HOURS", DEFAULT_JWT_TTL_HOURS)?;
        if jwt_ttl_hours <= 0 {
            return Err(ConfigError::InvalidVar {
                name: "JWT_TTL_HOURS",
                reason: "must be positive".to_string(),
            });
        }

        let body_limit_bytes = parse_or(
            get("BODY_LIMIT_BYTES"),
            "BODY_LIMIT_BYTES",
            DEFAULT_BODY_LIMIT_BYTES,
        )?;

        let cors_origins = get("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            jwt_secret: Arc::new(SecretString::from(jwt_secret)),
            jwt_ttl: Duration::hours(jwt_ttl_hours),
            host: get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or(get("PORT"), "PORT", DEFAULT_PORT)?,
            environment,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            body_limit_bytes,
            cors_origins,
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn jwt_secret(&self) -> &str {
        self.jwt_secret.expose_secret()
    }
}

fn parse_or<T>(raw: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidVar {
                name,
                reason: e.to_string(),
            }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_in_development() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.port, 5000);
        assert_eq!(config.bind_addr(), "0.0.0.0:5000");
        assert_eq!(config.jwt_ttl, Duration::hours(168));
        assert_eq!(config.body_limit_bytes, 1_048_576);
        assert!(config.is_development());
        assert!(config.cors_origins.is_empty());
        assert_eq!(config.log_level, "info");

        let config = config_from(&[("LOG_LEVEL", "debug")]).unwrap();
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn production_requires_a_strong_secret() {
        assert!(matches!(
            config_from(&[("NODE_ENV", "production")]),
            Err(ConfigError::MissingVar("JWT_SECRET"))
        ));
        assert!(matches!(
            config_from(&[("NODE_ENV", "production"), ("JWT_SECRET", "short")]),
            Err(ConfigError::InvalidVar {
                name: "JWT_SECRET",
                ..
            })
        ));

        let secret = "x".repeat(MIN_JWT_SECRET_LEN);
        let config = config_from(&[("NODE_ENV", "production"), ("JWT_SECRET", &secret)]).unwrap();
        assert!(config.is_production());
        assert_eq!(config.jwt_secret(), secret);
    }

    #[test]
    fn parses_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("JWT_TTL_HOURS", "2"),
            ("BODY_LIMIT_BYTES", "2048"),
            ("CORS_ORIGINS", "https://a.test, https://b.test,"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.jwt_ttl, Duration::hours(2));
        assert_eq!(config.body_limit_bytes, 2048);
        assert_eq!(config.cors_origins, vec!["https://a.test", "https://b.test"]);
    }

    #[test]
    fn rejects_garbage_numbers() {
        assert!(matches!(
            config_from(&[("PORT", "eighty")]),
            Err(ConfigError::InvalidVar { name: "PORT", .. })
        ));
    }
}
