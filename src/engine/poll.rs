use std::collections::HashSet;

use log::info;
use sqlx::SqliteConnection;

use crate::db::{Database, polls, votes};
use crate::error::{PollError, PollResult};
use crate::models::{
    ChoiceInput, ClosedPoll, CreatedPoll, MAX_CHOICES, NewChoice, NewPoll, Poll, PollStatus,
    PollUpdate,
};

/// Applies administrative commands to the poll store. Every operation is one transaction.
#[derive(Clone)]
pub struct PollEngine {
    db: Database,
}

impl PollEngine {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, new: NewPoll) -> PollResult<CreatedPoll> {
        let question = validate_question(&new.question)?;
        let choices = validate_choices(&new.choices)?;

        let mut tx = self.db.begin_write().await?;

        let poll_id =
            polls::insert_poll(&mut tx, &question, new.anonymous, new.multiple_choice).await?;
        polls::insert_choices(&mut tx, poll_id, &choices).await?;

        let mut start_blocked_by = None;
        if new.start {
            match polls::fetch_active_poll(&mut tx).await? {
                Some(active) => start_blocked_by = Some(active.id),
                None => {
                    polls::transition(&mut tx, poll_id, PollStatus::Inactive, PollStatus::Active)
                        .await?;
                }
            }
        }

        if new.display {
            polls::clear_display(&mut tx).await?;
            polls::set_display(&mut tx, poll_id, true).await?;
        }

        let poll = reload(&mut tx, poll_id).await?;
        tx.commit().await?;

        info!(
            "Created poll {} ({} choices, anonymous={}, multiple_choice={}, status={})",
            poll.id,
            poll.choices.len(),
            poll.anonymous,
            poll.multiple_choice,
            poll.status.label()
        );

        Ok(CreatedPoll {
            poll,
            start_blocked_by,
        })
    }

    pub async fn update(&self, poll_id: i64, update: PollUpdate) -> PollResult<Poll> {
        if update.is_empty() {
            return Err(PollError::validation("Nothing to update"));
        }
        let question = update.question.as_deref().map(validate_question).transpose()?;
        let choices = update.choices.as_deref().map(validate_choices).transpose()?;

        let mut tx = self.db.begin_write().await?;

        let poll = polls::fetch_poll(&mut tx, poll_id)
            .await?
            .ok_or_else(|| unknown_poll(poll_id))?;

        if !update.is_display_only() && poll.status != PollStatus::Inactive {
            return Err(PollError::invalid_state(format!(
                "Poll {} is {}; only inactive polls can be changed",
                poll.id,
                poll.status.label()
            )));
        }

        if question.is_some() || update.anonymous.is_some() || update.multiple_choice.is_some() {
            polls::update_fields(
                &mut tx,
                poll_id,
                question.as_deref().unwrap_or(&poll.question),
                update.anonymous.unwrap_or(poll.anonymous),
                update.multiple_choice.unwrap_or(poll.multiple_choice),
            )
            .await?;
        }

        if let Some(choices) = &choices {
            polls::delete_choices(&mut tx, poll_id).await?;
            polls::insert_choices(&mut tx, poll_id, choices).await?;
        }

        match update.display {
            Some(true) => {
                polls::clear_display(&mut tx).await?;
                polls::set_display(&mut tx, poll_id, true).await?;
            }
            Some(false) => {
                polls::set_display(&mut tx, poll_id, false).await?;
            }
            None => {}
        }

        if update.start {
            start(&mut tx, poll_id).await?;
        }

        let poll = reload(&mut tx, poll_id).await?;
        tx.commit().await?;

        info!("Updated poll {} (status={}, display={})", poll.id, poll.status.label(), poll.display);
        Ok(poll)
    }

    /// Without an id, reports the active poll. With one, moves that poll from inactive to active.
    pub async fn activate(&self, poll_id: Option<i64>) -> PollResult<Poll> {
        let Some(poll_id) = poll_id else {
            let mut tx = self.db.begin_read().await?;
            return polls::fetch_active_poll(&mut tx)
                .await?
                .ok_or_else(no_active_poll);
        };

        let mut tx = self.db.begin_write().await?;
        start(&mut tx, poll_id).await?;
        let poll = reload(&mut tx, poll_id).await?;
        tx.commit().await?;

        info!("Activated poll {}", poll.id);
        Ok(poll)
    }

    /// Closes the active poll. Anonymous ballots are folded into tallies and then destroyed.
    pub async fn close(&self) -> PollResult<ClosedPoll> {
        let mut tx = self.db.begin_write().await?;

        let active = polls::fetch_active_poll(&mut tx)
            .await?
            .ok_or_else(no_active_poll)?;

        let counts = if active.anonymous {
            let counts = votes::count_anonymous_active(&mut tx, active.id).await?;
            votes::insert_tallies(&mut tx, active.id, &counts).await?;
            votes::purge_anonymous_active(&mut tx, active.id).await?;
            counts
        } else {
            votes::count_attributed(&mut tx, active.id).await?
        };

        let moved =
            polls::transition(&mut tx, active.id, PollStatus::Active, PollStatus::Closed).await?;
        if moved != 1 {
            return Err(PollError::conflict(format!(
                "Poll {} changed while closing, please retry",
                active.id
            )));
        }

        let poll = reload(&mut tx, active.id).await?;
        tx.commit().await?;

        info!(
            "Closed poll {} ({} selections counted)",
            poll.id,
            counts.iter().map(|c| c.count).sum::<i64>()
        );
        Ok(ClosedPoll { poll, counts })
    }

    pub async fn clear_display(&self) -> PollResult<u64> {
        let mut tx = self.db.begin_write().await?;
        let cleared = polls::clear_display(&mut tx).await?;
        tx.commit().await?;

        info!("Cleared display flag ({} poll(s) affected)", cleared);
        Ok(cleared)
    }

    pub async fn list(&self) -> PollResult<Vec<Poll>> {
        let mut tx = self.db.begin_read().await?;
        Ok(polls::fetch_all_polls(&mut tx).await?)
    }
}

async fn start(conn: &mut SqliteConnection, poll_id: i64) -> PollResult<()> {
    let poll = polls::fetch_poll(conn, poll_id)
        .await?
        .ok_or_else(|| unknown_poll(poll_id))?;

    match poll.status {
        PollStatus::Inactive => {}
        PollStatus::Active => {
            return Err(PollError::invalid_state(format!("Poll {} is already active", poll_id)));
        }
        PollStatus::Closed => {
            return Err(PollError::invalid_state(format!(
                "Poll {} is closed and cannot be reopened",
                poll_id
            )));
        }
    }

    if poll.choices.is_empty() {
        return Err(PollError::InternalConsistency(poll_id));
    }

    if let Some(active) = polls::fetch_active_poll(conn).await? {
        return Err(PollError::conflict(format!(
            "Poll {} is already active; close it first",
            active.id
        )));
    }

    // The partial unique index turns a lost race into a unique violation, i.e. a Conflict.
    let moved = polls::transition(conn, poll_id, PollStatus::Inactive, PollStatus::Active).await?;
    if moved != 1 {
        return Err(PollError::conflict(format!("Poll {} changed concurrently, please retry", poll_id)));
    }
    Ok(())
}

async fn reload(conn: &mut SqliteConnection, poll_id: i64) -> PollResult<Poll> {
    let poll = polls::fetch_poll(conn, poll_id)
        .await?
        .ok_or_else(|| unknown_poll(poll_id))?;
    if poll.choices.is_empty() {
        return Err(PollError::InternalConsistency(poll_id));
    }
    Ok(poll)
}

fn unknown_poll(poll_id: i64) -> PollError {
    PollError::not_found(format!("Poll {} does not exist", poll_id))
}

pub(crate) fn no_active_poll() -> PollError {
    PollError::not_found("No poll is currently active")
}

fn validate_question(question: &str) -> PollResult<String> {
    let question = question.trim();
    if question.is_empty() {
        return Err(PollError::validation("The question must not be empty"));
    }
    Ok(question.to_string())
}

/// Trims choices, fills in positional markers and rejects duplicates.
pub(crate) fn validate_choices(choices: &[ChoiceInput]) -> PollResult<Vec<NewChoice>> {
    if choices.len() < 2 {
        return Err(PollError::validation(format!(
            "A poll needs at least 2 choices, got {}",
            choices.len()
        )));
    }
    if choices.len() > MAX_CHOICES {
        return Err(PollError::validation(format!(
            "A poll can have at most {} choices, got {}",
            MAX_CHOICES,
            choices.len()
        )));
    }

    let mut texts = HashSet::new();
    let mut markers = HashSet::new();
    let mut validated = Vec::with_capacity(choices.len());

    for (index, choice) in choices.iter().enumerate() {
        let text = choice.text.trim();
        if text.is_empty() {
            return Err(PollError::validation(format!("Choice {} is empty", index + 1)));
        }

        let marker = match choice.marker.as_deref().map(str::trim) {
            Some("") => {
                return Err(PollError::validation(format!(
                    "Choice {} has an empty marker",
                    index + 1
                )));
            }
            Some(marker) => marker.to_string(),
            None => (index + 1).to_string(),
        };

        if !texts.insert(text.to_string()) {
            return Err(PollError::validation(format!("Duplicate choice '{}'", text)));
        }
        if !markers.insert(marker.clone()) {
            return Err(PollError::validation(format!("Duplicate marker '{}'", marker)));
        }

        validated.push(NewChoice {
            text: text.to_string(),
            marker,
        });
    }

    Ok(validated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::temp_database;

    fn colors() -> Vec<ChoiceInput> {
        ["Red", "Green", "Blue"].into_iter().map(ChoiceInput::new).collect()
    }

    fn favorite_color() -> NewPoll {
        NewPoll {
            question: "Favorite color?".to_string(),
            choices: colors(),
            ..Default::default()
        }
    }

    #[test]
    fn markers_default_to_positions() {
        let choices = validate_choices(&colors()).unwrap();
        let markers: Vec<&str> = choices.iter().map(|c| c.marker.as_str()).collect();
        assert_eq!(markers, vec!["1", "2", "3"]);
    }

    #[test]
    fn choice_validation_rejects_bad_input() {
        let one = vec![ChoiceInput::new("Only")];
        assert!(matches!(validate_choices(&one), Err(PollError::Validation(_))));

        let dup_text = vec![ChoiceInput::new("Yes"), ChoiceInput::new(" Yes ")];
        let err = validate_choices(&dup_text).unwrap_err();
        assert!(err.to_string().contains("Duplicate choice"));

        let dup_marker = vec![
            ChoiceInput::with_marker("Yes", "Y"),
            ChoiceInput::with_marker("Yeah", "Y"),
        ];
        let err = validate_choices(&dup_marker).unwrap_err();
        assert!(err.to_string().contains("Duplicate marker"));

        // An explicit marker may collide with a positional default.
        let clash = vec![ChoiceInput::with_marker("Yes", "2"), ChoiceInput::new("No")];
        assert!(validate_choices(&clash).is_err());

        let too_many: Vec<ChoiceInput> =
            (0..=MAX_CHOICES).map(|i| ChoiceInput::new(format!("c{}", i))).collect();
        assert!(validate_choices(&too_many).is_err());
    }

    #[tokio::test]
    async fn create_starts_inactive_with_positional_markers() {
        let (_dir, db) = temp_database().await;
        let engine = PollEngine::new(db);

        let created = engine.create(favorite_color()).await.unwrap();
        assert_eq!(created.poll.id, 1);
        assert_eq!(created.poll.status, PollStatus::Inactive);
        assert!(created.start_blocked_by.is_none());
        let markers: Vec<&str> = created.poll.choices.iter().map(|c| c.marker.as_str()).collect();
        assert_eq!(markers, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn create_rejects_empty_question() {
        let (_dir, db) = temp_database().await;
        let engine = PollEngine::new(db);
        let err = engine
            .create(NewPoll { question: "  ".to_string(), ..favorite_color() })
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Validation(_)));
        assert!(engine.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_with_start_only_starts_when_nothing_is_active() {
        let (_dir, db) = temp_database().await;
        let engine = PollEngine::new(db);

        let first = engine.create(NewPoll { start: true, ..favorite_color() }).await.unwrap();
        assert_eq!(first.poll.status, PollStatus::Active);

        let second = engine.create(NewPoll { start: true, ..favorite_color() }).await.unwrap();
        assert_eq!(second.poll.status, PollStatus::Inactive);
        assert_eq!(second.start_blocked_by, Some(first.poll.id));
    }

    #[tokio::test]
    async fn only_one_poll_is_displayed() {
        let (_dir, db) = temp_database().await;
        let engine = PollEngine::new(db);

        engine.create(NewPoll { display: true, ..favorite_color() }).await.unwrap();
        engine.create(NewPoll { display: true, ..favorite_color() }).await.unwrap();

        let displayed: Vec<i64> = engine
            .list()
            .await
            .unwrap()
            .into_iter()
            .filter(|p| p.display)
            .map(|p| p.id)
            .collect();
        assert_eq!(displayed, vec![2]);

        assert_eq!(engine.clear_display().await.unwrap(), 1);
        assert!(engine.list().await.unwrap().iter().all(|p| !p.display));
    }

    #[tokio::test]
    async fn update_replaces_choices_wholesale() {
        let (_dir, db) = temp_database().await;
        let engine = PollEngine::new(db);
        engine.create(favorite_color()).await.unwrap();

        let poll = engine
            .update(
                1,
                PollUpdate {
                    question: Some("Best fruit?".to_string()),
                    choices: Some(vec![
                        ChoiceInput::with_marker("Apple", "A"),
                        ChoiceInput::with_marker("Pear", "P"),
                    ]),
                    multiple_choice: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(poll.question, "Best fruit?");
        assert!(poll.multiple_choice);
        let texts: Vec<&str> = poll.choices.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["Apple", "Pear"]);
    }

    #[tokio::test]
    async fn update_requires_inactive_except_for_display() {
        let (_dir, db) = temp_database().await;
        let engine = PollEngine::new(db);
        engine.create(NewPoll { start: true, ..favorite_color() }).await.unwrap();

        let err = engine
            .update(1, PollUpdate { question: Some("Changed?".to_string()), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::InvalidState(_)));

        let poll = engine
            .update(1, PollUpdate { display: Some(true), ..Default::default() })
            .await
            .unwrap();
        assert!(poll.display);
        assert_eq!(poll.status, PollStatus::Active);

        let err = engine
            .update(42, PollUpdate { display: Some(true), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_with_bad_choices_leaves_poll_untouched() {
        let (_dir, db) = temp_database().await;
        let engine = PollEngine::new(db);
        engine.create(favorite_color()).await.unwrap();

        let err = engine
            .update(
                1,
                PollUpdate {
                    choices: Some(vec![ChoiceInput::new("Same"), ChoiceInput::new("Same")]),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Validation(_)));

        let polls = engine.list().await.unwrap();
        assert_eq!(polls[0].choices.len(), 3);
    }

    #[tokio::test]
    async fn lifecycle_only_moves_forward() {
        let (_dir, db) = temp_database().await;
        let engine = PollEngine::new(db);
        engine.create(favorite_color()).await.unwrap();

        assert!(matches!(engine.close().await, Err(PollError::NotFound(_))));
        assert!(matches!(engine.activate(None).await, Err(PollError::NotFound(_))));

        let active = engine.activate(Some(1)).await.unwrap();
        assert_eq!(active.status, PollStatus::Active);
        assert_eq!(engine.activate(None).await.unwrap().id, 1);
        assert!(matches!(engine.activate(Some(1)).await, Err(PollError::InvalidState(_))));

        let closed = engine.close().await.unwrap();
        assert_eq!(closed.poll.status, PollStatus::Closed);
        assert!(matches!(engine.activate(Some(1)).await, Err(PollError::InvalidState(_))));
        assert!(matches!(engine.activate(Some(9)).await, Err(PollError::NotFound(_))));

        let err = engine
            .update(1, PollUpdate { start: true, ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::InvalidState(_)));
    }

    #[tokio::test]
    async fn activating_while_another_is_active_conflicts() {
        let (_dir, db) = temp_database().await;
        let engine = PollEngine::new(db);
        engine.create(favorite_color()).await.unwrap();
        engine.create(favorite_color()).await.unwrap();

        engine.activate(Some(1)).await.unwrap();
        assert!(matches!(engine.activate(Some(2)).await, Err(PollError::Conflict(_))));

        let err = engine
            .update(2, PollUpdate { start: true, ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Conflict(_)));
    }

    #[tokio::test]
    async fn failed_start_rolls_back_earlier_writes() {
        let (_dir, db) = temp_database().await;
        let engine = PollEngine::new(db);
        engine.create(NewPoll { display: true, ..favorite_color() }).await.unwrap();
        engine.create(favorite_color()).await.unwrap();
        engine.activate(Some(1)).await.unwrap();

        // Question, display and choices are written before the start is refused.
        let err = engine
            .update(
                2,
                PollUpdate {
                    question: Some("Renamed?".to_string()),
                    choices: Some(vec![ChoiceInput::new("Yes"), ChoiceInput::new("No")]),
                    display: Some(true),
                    start: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Conflict(_)));

        let polls = engine.list().await.unwrap();
        assert_eq!(polls[0].status, PollStatus::Active);
        assert!(polls[0].display);
        assert_eq!(polls[1].question, "Favorite color?");
        assert_eq!(polls[1].status, PollStatus::Inactive);
        assert!(!polls[1].display);
        let texts: Vec<&str> = polls[1].choices.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["Red", "Green", "Blue"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_activations_have_one_winner() {
        let (_dir, db) = temp_database().await;
        let engine = PollEngine::new(db.clone());
        engine.create(favorite_color()).await.unwrap();
        engine.create(favorite_color()).await.unwrap();

        let (a, b) = tokio::join!(
            {
                let engine = engine.clone();
                tokio::spawn(async move { engine.activate(Some(1)).await })
            },
            {
                let engine = engine.clone();
                tokio::spawn(async move { engine.activate(Some(2)).await })
            }
        );
        let results = [a.unwrap(), b.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(PollError::Conflict(_)))));

        let active = engine
            .list()
            .await
            .unwrap()
            .into_iter()
            .filter(|p| p.status == PollStatus::Active)
            .count();
        assert_eq!(active, 1);
    }
}
