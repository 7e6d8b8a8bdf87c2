use std::collections::HashSet;

use chrono::Utc;
use log::info;

use crate::db::{Database, polls, votes};
use crate::engine::poll::no_active_poll;
use crate::error::{PollError, PollResult};
use crate::models::{Ballot, Poll};

/// Records team ballots against the currently active poll.
#[derive(Clone)]
pub struct VoteEngine {
    db: Database,
}

impl VoteEngine {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get_ballot(&self, team_code: &str) -> PollResult<Ballot> {
        let mut tx = self.db.begin_read().await?;

        let poll = polls::fetch_active_poll(&mut tx)
            .await?
            .ok_or_else(no_active_poll)?;

        let choice_ids = if poll.anonymous {
            votes::fetch_anonymous_ballot(&mut tx, poll.id, team_code).await?
        } else {
            votes::fetch_attributed_ballot(&mut tx, poll.id, team_code).await?
        };

        Ok(Ballot { poll, choice_ids })
    }

    /// Replaces the team's whole ballot with `selections` (1-based choice numbers).
    pub async fn cast_vote(
        &self,
        team_code: &str,
        voter: &str,
        selections: &[String],
    ) -> PollResult<Ballot> {
        let mut tx = self.db.begin_write().await?;

        let poll = polls::fetch_active_poll(&mut tx)
            .await?
            .ok_or_else(no_active_poll)?;
        if poll.choices.is_empty() {
            return Err(PollError::InternalConsistency(poll.id));
        }

        let choice_ids = resolve_selections(&poll, selections)?;

        if poll.anonymous {
            votes::delete_anonymous_ballot(&mut tx, poll.id, team_code).await?;
            votes::insert_anonymous_votes(&mut tx, team_code, &choice_ids).await?;
        } else {
            votes::delete_attributed_ballot(&mut tx, poll.id, team_code).await?;
            votes::insert_attributed_votes(&mut tx, poll.id, team_code, voter, Utc::now(), &choice_ids)
                .await?;
        }

        tx.commit().await?;

        let ballot = Ballot { poll, choice_ids };
        if ballot.poll.anonymous {
            info!("Recorded anonymous ballot for poll {}", ballot.poll.id);
        } else {
            info!(
                "Recorded ballot for poll {}: team={}, voter={}, choices={:?}",
                ballot.poll.id,
                team_code,
                voter,
                ballot.ordinals()
            );
        }

        Ok(ballot)
    }

    /// Removes the team's ballot for the active poll and returns what was removed.
    pub async fn delete_vote(&self, team_code: &str) -> PollResult<Ballot> {
        let mut tx = self.db.begin_write().await?;

        let poll = polls::fetch_active_poll(&mut tx)
            .await?
            .ok_or_else(no_active_poll)?;

        let choice_ids = if poll.anonymous {
            let previous = votes::fetch_anonymous_ballot(&mut tx, poll.id, team_code).await?;
            votes::delete_anonymous_ballot(&mut tx, poll.id, team_code).await?;
            previous
        } else {
            let previous = votes::fetch_attributed_ballot(&mut tx, poll.id, team_code).await?;
            votes::delete_attributed_ballot(&mut tx, poll.id, team_code).await?;
            previous
        };

        tx.commit().await?;

        if !choice_ids.is_empty() {
            if poll.anonymous {
                info!("Deleted an anonymous ballot for poll {}", poll.id);
            } else {
                info!("Deleted ballot of team {} for poll {}", team_code, poll.id);
            }
        }

        Ok(Ballot { poll, choice_ids })
    }
}

/// Turns 1-based choice numbers into choice ids, in the order given.
pub(crate) fn resolve_selections(poll: &Poll, selections: &[String]) -> PollResult<Vec<i64>> {
    let available = poll.choices.len();

    if selections.is_empty() {
        return Err(PollError::validation("No choice given"));
    }
    if !poll.multiple_choice && selections.len() != 1 {
        return Err(PollError::validation(format!(
            "Poll {} is single-choice: vote for exactly one choice, got {}",
            poll.id,
            selections.len()
        )));
    }
    // Bounded before any parsing, so oversized ballots are cheap to reject.
    if selections.len() > available {
        return Err(PollError::validation(format!(
            "A ballot can hold at most {} choices, got {}",
            available,
            selections.len()
        )));
    }

    let mut seen = HashSet::new();
    let mut choice_ids = Vec::with_capacity(selections.len());

    for raw in selections {
        let raw = raw.trim();
        let ordinal: usize = raw.parse().map_err(|_| {
            PollError::validation(format!("'{}' is not a choice number", raw))
        })?;

        let choice = poll.choice_at(ordinal).ok_or_else(|| {
            PollError::validation(format!(
                "Choice {} is out of range, pick 1 to {}",
                ordinal, available
            ))
        })?;

        if !seen.insert(ordinal) {
            return Err(PollError::validation(format!(
                "Choice {} is listed more than once",
                ordinal
            )));
        }
        choice_ids.push(choice.id);
    }

    Ok(choice_ids)
}
