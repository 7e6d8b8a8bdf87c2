//! Team roster snapshots.
//!
//! The roster is owned by a [`Roster`] and replaced wholesale on [`Roster::refresh`].
//! Callers take an `Arc<RosterSnapshot>` before entering the poll core and pass it by
//! reference, so no store transaction ever waits on roster I/O.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::Team;

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("failed to read roster {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse roster {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("team code {0:?} appears more than once")]
    DuplicateTeam(String),

    #[error("a team has an empty code")]
    EmptyCode,
}

/// Where roster snapshots come from.
#[async_trait]
pub trait RosterSource: Send + Sync {
    async fn load(&self) -> Result<Vec<Team>, RosterError>;

    fn describe(&self) -> String;
}

/// Reads a JSON array of `{ "code", "name", "voting_eligible" }` objects.
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RosterSource for JsonFileSource {
    async fn load(&self) -> Result<Vec<Team>, RosterError> {
        let path = self.path.display().to_string();
        let raw = tokio::fs::read(&self.path)
            .await
            .map_err(|source| RosterError::Io { path: path.clone(), source })?;
        serde_json::from_slice(&raw).map_err(|source| RosterError::Parse { path, source })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[derive(Debug, Clone)]
pub struct RosterSnapshot {
    teams: Vec<Team>,
    loaded_at: DateTime<Utc>,
}

impl RosterSnapshot {
    /// Normalises team codes to upper case and rejects duplicates.
    pub fn new(teams: Vec<Team>) -> Result<Self, RosterError> {
        let mut seen = HashSet::new();
        let mut normalized = Vec::with_capacity(teams.len());

        for mut team in teams {
            team.code = team.code.trim().to_uppercase();
            team.name = team.name.trim().to_string();
            if team.code.is_empty() {
                return Err(RosterError::EmptyCode);
            }
            if !seen.insert(team.code.clone()) {
                return Err(RosterError::DuplicateTeam(team.code));
            }
            normalized.push(team);
        }

        Ok(Self {
            teams: normalized,
            loaded_at: Utc::now(),
        })
    }

    pub fn empty() -> Self {
        Self {
            teams: Vec::new(),
            loaded_at: Utc::now(),
        }
    }

    pub fn lookup_team(&self, code: &str) -> Option<&Team> {
        self.teams
            .iter()
            .find(|team| team.code.eq_ignore_ascii_case(code))
    }

    pub fn list_teams(&self) -> &[Team] {
        &self.teams
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

pub struct Roster {
    source: Box<dyn RosterSource>,
    current: RwLock<Arc<RosterSnapshot>>,
}

impl Roster {
    /// Starts with an empty snapshot; call [`Roster::refresh`] to load.
    pub fn new(source: Box<dyn RosterSource>) -> Self {
        Self {
            source,
            current: RwLock::new(Arc::new(RosterSnapshot::empty())),
        }
    }

    pub async fn snapshot(&self) -> Arc<RosterSnapshot> {
        Arc::clone(&*self.current.read().await)
    }

    /// Reloads from the source. On failure the previous snapshot stays in place.
    pub async fn refresh(&self) -> Result<usize, RosterError> {
        let teams = self.source.load().await?;
        let snapshot = RosterSnapshot::new(teams)?;
        let count = snapshot.list_teams().len();

        *self.current.write().await = Arc::new(snapshot);
        info!("Loaded {} team(s) from {}", count, self.source.describe());
        Ok(count)
    }
}
