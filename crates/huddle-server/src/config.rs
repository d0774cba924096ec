use std::path::PathBuf;

use huddle_db::RemovalPolicy;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Allowed browser origins for CORS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub cors_origins: CorsOrigins,
    pub removal_policy: RemovalPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HUDDLE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = lookup("HUDDLE_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse::<u16>()
            .map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                name: "HUDDLE_PORT",
                reason: e.to_string(),
            })?;
        let db_path: PathBuf = lookup("HUDDLE_DB_PATH")
            .unwrap_or_else(|| "huddle.db".into())
            .into();
        let cors_origins = parse_origins(
            &lookup("HUDDLE_CORS_ORIGINS").unwrap_or_else(|| "http://localhost:5175".into()),
        );
        let removal_policy = lookup("HUDDLE_MEMBER_REMOVAL")
            .unwrap_or_else(|| "open".into())
            .parse::<RemovalPolicy>()
            .map_err(|reason| ConfigError::Invalid {
                name: "HUDDLE_MEMBER_REMOVAL",
                reason,
            })?;

        Ok(Config {
            host,
            port,
            db_path,
            cors_origins,
            removal_policy,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_origins(raw: &str) -> CorsOrigins {
    if raw.trim() == "*" {
        return CorsOrigins::Any;
    }
    CorsOrigins::List(
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.server_address(), "0.0.0.0:3000");
        assert_eq!(config.db_path, PathBuf::from("huddle.db"));
        assert_eq!(
            config.cors_origins,
            CorsOrigins::List(vec!["http://localhost:5175".into()])
        );
        assert_eq!(config.removal_policy, RemovalPolicy::Open);
    }

    #[test]
    fn overrides() {
        let config = load(&[
            ("HUDDLE_PORT", "8080"),
            ("HUDDLE_CORS_ORIGINS", "*"),
            ("HUDDLE_MEMBER_REMOVAL", "admin-or-self"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.cors_origins, CorsOrigins::Any);
        assert_eq!(config.removal_policy, RemovalPolicy::AdminOrSelf);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(load(&[("HUDDLE_PORT", "http")]).is_err());
        assert!(load(&[("HUDDLE_MEMBER_REMOVAL", "nobody")]).is_err());
    }

    #[test]
    fn origin_list_is_trimmed() {
        assert_eq!(
            parse_origins("http://a, http://b ,"),
            CorsOrigins::List(vec!["http://a".into(), "http://b".into()])
        );
    }
}
