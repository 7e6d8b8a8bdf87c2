//! Read-only views of a poll for the public results page.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;

use crate::db::{Database, polls, votes};
use crate::error::{PollError, PollResult};
use crate::models::{AttributedVote, Choice, ChoiceCount, Poll, PollStatus};
use crate::roster::RosterSnapshot;

#[derive(Debug, Clone, Serialize)]
pub struct PollView {
    pub poll_id: i64,
    pub question: String,
    pub choices: Vec<Choice>,
    pub anonymous: bool,
    pub multiple_choice: bool,
    pub status: PollStatus,
    /// Absent while the poll has not been opened yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub votes: Option<VotesView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VotesView {
    Counts(Vec<ChoiceCount>),
    Teams(Vec<TeamVoteRow>),
}

/// One recorded (team, choice) pair, or a placeholder for a team that has not voted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamVoteRow {
    pub team_code: String,
    pub team_name: Option<String>,
    pub choice_id: Option<i64>,
    pub voted_by: Option<String>,
    pub voted_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct ResultsProjector {
    db: Database,
}

impl ResultsProjector {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// The poll currently flagged for display, if any.
    pub async fn displayed(&self, roster: &RosterSnapshot) -> PollResult<Option<PollView>> {
        let mut tx = self.db.begin_read().await?;
        match polls::fetch_displayed_poll(&mut tx).await? {
            None => Ok(None),
            Some(poll) => project(&mut tx, poll, roster).await.map(Some),
        }
    }

    /// Historical lookup. Polls that were never opened are not published.
    pub async fn by_id(&self, poll_id: i64, roster: &RosterSnapshot) -> PollResult<PollView> {
        let mut tx = self.db.begin_read().await?;
        let poll = polls::fetch_poll(&mut tx, poll_id)
            .await?
            .filter(|poll| poll.status != PollStatus::Inactive)
            .ok_or_else(|| PollError::not_found(format!("No published poll with id {}", poll_id)))?;
        project(&mut tx, poll, roster).await
    }
}

async fn project(
    conn: &mut SqliteConnection,
    poll: Poll,
    roster: &RosterSnapshot,
) -> PollResult<PollView> {
    if poll.choices.is_empty() {
        return Err(PollError::InternalConsistency(poll.id));
    }

    let votes = match (poll.status, poll.anonymous) {
        (PollStatus::Inactive, _) => None,
        (PollStatus::Active, true) => {
            Some(VotesView::Counts(votes::count_anonymous_active(conn, poll.id).await?))
        }
        (PollStatus::Closed, true) => {
            Some(VotesView::Counts(votes::fetch_tallies(conn, poll.id).await?))
        }
        (_, false) => {
            let recorded = votes::fetch_attributed_votes(conn, poll.id).await?;
            Some(VotesView::Teams(team_rows(recorded, roster)))
        }
    };

    Ok(PollView {
        poll_id: poll.id,
        question: poll.question,
        choices: poll.choices,
        anonymous: poll.anonymous,
        multiple_choice: poll.multiple_choice,
        status: poll.status,
        votes,
    })
}

/// Lays out attributed votes in roster order, padding eligible teams that have not voted.
/// Votes from teams the roster does not know follow at the end.
pub fn team_rows(recorded: Vec<AttributedVote>, roster: &RosterSnapshot) -> Vec<TeamVoteRow> {
    let mut by_team: BTreeMap<String, Vec<AttributedVote>> = BTreeMap::new();
    for vote in recorded {
        by_team.entry(vote.team_code.clone()).or_default().push(vote);
    }

    let voted_row = |vote: AttributedVote, team_name: Option<String>| TeamVoteRow {
        team_code: vote.team_code,
        team_name,
        choice_id: Some(vote.choice_id),
        voted_by: Some(vote.voted_by),
        voted_at: Some(vote.voted_at),
    };

    let mut rows = Vec::new();
    for team in roster.list_teams() {
        match by_team.remove(&team.code) {
            Some(team_votes) => {
                rows.extend(
                    team_votes
                        .into_iter()
                        .map(|vote| voted_row(vote, Some(team.name.clone()))),
                );
            }
            None if team.voting_eligible => rows.push(TeamVoteRow {
                team_code: team.code.clone(),
                team_name: Some(team.name.clone()),
                choice_id: None,
                voted_by: None,
                voted_at: None,
            }),
            None => {}
        }
    }

    for (_, team_votes) in by_team {
        rows.extend(team_votes.into_iter().map(|vote| voted_row(vote, None)));
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::temp_database;
    use crate::engine::{PollEngine, VoteEngine};
    use crate::models::{ChoiceInput, NewPoll, PollUpdate, Team};
    use crate::roster::testing::{snapshot, team};

    fn roster() -> RosterSnapshot {
        snapshot(vec![
            team("ABC", "Alphabet"),
            team("XYZ", "Zedland"),
            Team { code: "OBS".to_string(), name: "Observers".to_string(), voting_eligible: false },
        ])
    }

    fn colors(anonymous: bool, multiple_choice: bool) -> NewPoll {
        NewPoll {
            question: "Favorite color?".to_string(),
            choices: ["Red", "Green", "Blue"].into_iter().map(ChoiceInput::new).collect(),
            anonymous,
            multiple_choice,
            start: false,
            display: true,
        }
    }

    fn one(raw: &str) -> Vec<String> {
        vec![raw.to_string()]
    }

    #[test]
    fn rows_cover_the_roster() {
        let vote = AttributedVote {
            choice_id: 5,
            team_code: "XYZ".to_string(),
            voted_by: "xavier".to_string(),
            voted_at: Utc::now(),
        };
        let stray = AttributedVote { team_code: "NEW".to_string(), ..vote.clone() };

        let rows = team_rows(vec![stray, vote], &roster());
        let summary: Vec<(&str, Option<i64>, Option<&str>)> = rows
            .iter()
            .map(|r| (r.team_code.as_str(), r.choice_id, r.team_name.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("ABC", None, Some("Alphabet")),
                ("XYZ", Some(5), Some("Zedland")),
                ("NEW", Some(5), None),
            ]
        );
    }

    #[tokio::test]
    async fn nothing_displayed_yields_none() {
        let (_dir, db) = temp_database().await;
        let results = ResultsProjector::new(db);
        assert!(results.displayed(&roster()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn inactive_poll_has_no_votes_section() {
        let (_dir, db) = temp_database().await;
        PollEngine::new(db.clone()).create(colors(true, false)).await.unwrap();
        let results = ResultsProjector::new(db);

        let view = results.displayed(&roster()).await.unwrap().unwrap();
        assert_eq!(view.status, PollStatus::Inactive);
        assert!(view.votes.is_none());
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("votes").is_none());
        assert_eq!(json["choices"][1]["choice"], "Green");
        assert_eq!(json["choices"][1]["marker"], "2");

        assert!(matches!(results.by_id(1, &roster()).await, Err(PollError::NotFound(_))));
    }

    #[tokio::test]
    async fn attributed_scenario_shows_every_team() {
        let (_dir, db) = temp_database().await;
        let polls = PollEngine::new(db.clone());
        let votes = VoteEngine::new(db.clone());
        let results = ResultsProjector::new(db);

        let created = polls.create(colors(false, false)).await.unwrap();
        assert_eq!(created.poll.id, 1);
        polls.activate(Some(1)).await.unwrap();
        votes.cast_vote("XYZ", "xavier", &one("2")).await.unwrap();
        polls.close().await.unwrap();

        let view = results.by_id(1, &roster()).await.unwrap();
        assert_eq!(view.status, PollStatus::Closed);
        let green = view.choices[1].id;

        let Some(VotesView::Teams(rows)) = view.votes else {
            panic!("expected team rows");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].team_code, "ABC");
        assert_eq!(rows[0].choice_id, None);
        assert_eq!(rows[0].voted_by, None);
        assert_eq!(rows[1].team_code, "XYZ");
        assert_eq!(rows[1].choice_id, Some(green));
        assert_eq!(rows[1].voted_by.as_deref(), Some("xavier"));
        assert!(rows[1].voted_at.is_some());
    }

    #[tokio::test]
    async fn anonymous_counts_are_live_then_tallied() {
        let (_dir, db) = temp_database().await;
        let polls = PollEngine::new(db.clone());
        let votes = VoteEngine::new(db.clone());
        let results = ResultsProjector::new(db);

        polls.create(colors(true, true)).await.unwrap();
        // A second, unrelated anonymous poll must not leak into the counts.
        polls
            .create(NewPoll { display: false, ..colors(true, false) })
            .await
            .unwrap();
        polls.activate(Some(1)).await.unwrap();

        let view = results.displayed(&roster()).await.unwrap().unwrap();
        let zero: Vec<i64> = match view.votes {
            Some(VotesView::Counts(counts)) => counts.iter().map(|c| c.count).collect(),
            other => panic!("expected counts, got {:?}", other),
        };
        assert_eq!(zero, vec![0, 0, 0]);

        votes.cast_vote("ABC", "alice", &["1".to_string(), "3".to_string()]).await.unwrap();
        votes.cast_vote("XYZ", "xavier", &one("3")).await.unwrap();

        let live = results.displayed(&roster()).await.unwrap().unwrap();
        let json = serde_json::to_value(&live).unwrap();
        assert_eq!(json["votes"][2]["count"], 2);
        assert_eq!(json["status"], 1);
        assert!(json["votes"][0].get("team_code").is_none());

        polls.close().await.unwrap();
        let closed = results.by_id(1, &roster()).await.unwrap();
        let counts: Vec<i64> = match closed.votes {
            Some(VotesView::Counts(counts)) => counts.iter().map(|c| c.count).collect(),
            other => panic!("expected counts, got {:?}", other),
        };
        assert_eq!(counts, vec![1, 0, 2]);
    }

    #[tokio::test]
    async fn poll_without_choices_is_an_internal_error() {
        let (_dir, db) = temp_database().await;
        PollEngine::new(db.clone()).create(colors(false, false)).await.unwrap();
        sqlx::query("DELETE FROM poll_choices WHERE poll_id = 1")
            .execute(db.pool())
            .await
            .unwrap();

        let results = ResultsProjector::new(db.clone());
        let err = results.displayed(&roster()).await.unwrap_err();
        assert!(matches!(err, PollError::InternalConsistency(1)));

        let err = PollEngine::new(db)
            .update(1, PollUpdate { display: Some(false), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::InternalConsistency(1)));
    }
}
