use std::sync::Arc;

use crate::db::Database;
use crate::engine::{PollEngine, VoteEngine};
use crate::results::ResultsProjector;
use crate::roster::Roster;

/// Everything a command handler or HTTP request needs, shared behind an `Arc`.
pub struct AppState {
    pub polls: PollEngine,
    pub votes: VoteEngine,
    pub results: ResultsProjector,
    pub roster: Arc<Roster>,
}

impl AppState {
    pub fn new(database: Database, roster: Arc<Roster>) -> Self {
        Self {
            polls: PollEngine::new(database.clone()),
            votes: VoteEngine::new(database.clone()),
            results: ResultsProjector::new(database),
            roster,
        }
    }
}
