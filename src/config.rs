use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a number, got {value:?}")]
    NotANumber { var: &'static str, value: String },

    #[error("{var} must be a socket address, got {value:?}")]
    BadAddress { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub roster_path: PathBuf,
    /// `None` disables periodic refresh.
    pub roster_refresh: Option<Duration>,
    pub results_bind: SocketAddr,
    pub poll_admins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| "sqlite:team_poll.db".to_string());

        let database_max_connections = parse_number(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?;

        let roster_path = PathBuf::from(
            lookup("ROSTER_PATH").unwrap_or_else(|| "roster.json".to_string()),
        );

        let refresh_seconds: u64 = parse_number(&lookup, "ROSTER_REFRESH_SECONDS", 300)?;
        let roster_refresh = (refresh_seconds > 0).then(|| Duration::from_secs(refresh_seconds));

        let bind = lookup("RESULTS_BIND").unwrap_or_else(|| "0.0.0.0:9000".to_string());
        let results_bind = bind.parse().map_err(|_| ConfigError::BadAddress {
            var: "RESULTS_BIND",
            value: bind.clone(),
        })?;

        let poll_admins = lookup("POLL_ADMINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|admin| !admin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url,
            database_max_connections,
            roster_path,
            roster_refresh,
            results_bind,
            poll_admins,
        })
    }

    pub fn is_poll_admin(&self, voter: &str) -> bool {
        self.poll_admins.iter().any(|admin| admin == voter)
    }
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::NotANumber { var, value }),
    }
}
