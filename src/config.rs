use std::env;
use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;

use crate::auth::{DEFAULT_TOKEN_TTL_DAYS, MAX_TOKEN_TTL_DAYS};

const DEFAULT_JWT_SECRET: &str = "default_jwt_secret_change_me";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// Account created at startup when the database has no users yet
#[derive(Debug, Clone)]
pub struct OwnerAccount {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub owner: Option<OwnerAccount>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key lookup, e.g. a map in tests
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET").unwrap_or_else(|| {
            log::warn!("JWT_SECRET not set, using default (not secure for production!)");
            DEFAULT_JWT_SECRET.to_string()
        });

        let owner = match (lookup("OWNER_USERNAME"), lookup("OWNER_PASSWORD")) {
            (Some(username), Some(password)) => Some(OwnerAccount { username, password }),
            (None, None) => None,
            _ => {
                log::warn!("OWNER_USERNAME and OWNER_PASSWORD must be set together, ignoring");
                None
            }
        };

        let token_ttl_days = parse_or(&lookup, "TOKEN_TTL_DAYS", DEFAULT_TOKEN_TTL_DAYS)?;
        if !(1..=MAX_TOKEN_TTL_DAYS).contains(&token_ttl_days) {
            return Err(ConfigError::Invalid {
                key: "TOKEN_TTL_DAYS".to_string(),
                reason: format!("must be between 1 and {}, got {}", MAX_TOKEN_TTL_DAYS, token_ttl_days),
            });
        }

        Ok(Self {
            port: parse_or(&lookup, "PORT", 8080)?,
            database_path: lookup("DATABASE_PATH").unwrap_or_else(|| "imgrank.db".to_string()),
            jwt_secret,
            token_ttl_days,
            owner,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key: key.to_string(),
            reason: e.to_string(),
        }),
        None => {
            log::info!("{} not set, using default: {}", key, default);
            Ok(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.database_path, "imgrank.db");
        assert_eq!(config.jwt_secret, DEFAULT_JWT_SECRET);
        assert_eq!(config.token_ttl_days, DEFAULT_TOKEN_TTL_DAYS);
        assert!(config.owner.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "9000"),
            ("DATABASE_PATH", "/tmp/test.db"),
            ("JWT_SECRET", "s3cret"),
            ("TOKEN_TTL_DAYS", "1"),
            ("OWNER_USERNAME", "admin"),
            ("OWNER_PASSWORD", "adminpass"),
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.database_path, "/tmp/test.db");
        assert_eq!(config.jwt_secret, "s3cret");
        assert_eq!(config.token_ttl_days, 1);
        let owner = config.owner.unwrap();
        assert_eq!(owner.username, "admin");
        assert_eq!(owner.password, "adminpass");
    }

    #[test]
    fn test_invalid_port() {
        let err = config_from(&[("PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_token_ttl_out_of_range() {
        for raw in ["0", "-1", "100000000"] {
            let err = config_from(&[("TOKEN_TTL_DAYS", raw)]).unwrap_err();
            assert!(err.to_string().contains("TOKEN_TTL_DAYS"), "{}", raw);
        }

        let max = MAX_TOKEN_TTL_DAYS.to_string();
        let config = config_from(&[("TOKEN_TTL_DAYS", max.as_str())]).unwrap();
        assert_eq!(config.token_ttl_days, MAX_TOKEN_TTL_DAYS);
    }

    #[test]
    fn test_half_owner_ignored() {
        let config = config_from(&[("OWNER_USERNAME", "admin")]).unwrap();
        assert!(config.owner.is_none());
    }
}
