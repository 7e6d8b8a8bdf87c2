use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// Upper bound on the number of choices a poll may carry.
pub const MAX_CHOICES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    Inactive,
    Active,
    Closed,
}

impl PollStatus {
    pub fn code(self) -> i64 {
        match self {
            PollStatus::Inactive => 0,
            PollStatus::Active => 1,
            PollStatus::Closed => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(PollStatus::Inactive),
            1 => Some(PollStatus::Active),
            2 => Some(PollStatus::Closed),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PollStatus::Inactive => "inactive",
            PollStatus::Active => "active",
            PollStatus::Closed => "closed",
        }
    }
}

// The public results page indexes its labels by the numeric status.
impl Serialize for PollStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    #[serde(rename = "choice_id")]
    pub id: i64,
    #[serde(skip)]
    pub poll_id: i64,
    #[serde(rename = "choice")]
    pub text: String,
    pub marker: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Poll {
    #[serde(rename = "poll_id")]
    pub id: i64,
    pub question: String,
    pub status: PollStatus,
    pub anonymous: bool,
    pub multiple_choice: bool,
    pub display: bool,
    pub choices: Vec<Choice>,
}

impl Poll {
    /// 1-based position of a choice in the poll's stable choice order.
    pub fn ordinal_of(&self, choice_id: i64) -> Option<usize> {
        self.choices
            .iter()
            .position(|choice| choice.id == choice_id)
            .map(|index| index + 1)
    }

    pub fn choice_at(&self, ordinal: usize) -> Option<&Choice> {
        ordinal.checked_sub(1).and_then(|index| self.choices.get(index))
    }
}

/// A choice as supplied by a poll administrator, before it has a storage id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceInput {
    pub text: String,
    pub marker: Option<String>,
}

impl ChoiceInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            marker: None,
        }
    }

    pub fn with_marker(text: impl Into<String>, marker: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            marker: Some(marker.into()),
        }
    }
}

/// A validated choice ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChoice {
    pub text: String,
    pub marker: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewPoll {
    pub question: String,
    pub choices: Vec<ChoiceInput>,
    pub anonymous: bool,
    pub multiple_choice: bool,
    pub start: bool,
    pub display: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollUpdate {
    pub question: Option<String>,
    pub choices: Option<Vec<ChoiceInput>>,
    pub anonymous: Option<bool>,
    pub multiple_choice: Option<bool>,
    pub display: Option<bool>,
    pub start: bool,
}

impl PollUpdate {
    /// True when the update only touches the display flag, which is allowed in any status.
    pub fn is_display_only(&self) -> bool {
        self.display.is_some()
            && self.question.is_none()
            && self.choices.is_none()
            && self.anonymous.is_none()
            && self.multiple_choice.is_none()
            && !self.start
    }

    pub fn is_empty(&self) -> bool {
        self.display.is_none()
            && self.question.is_none()
            && self.choices.is_none()
            && self.anonymous.is_none()
            && self.multiple_choice.is_none()
            && !self.start
    }
}

/// Result of `create`: the poll, and whether a requested start actually happened.
#[derive(Debug, Clone)]
pub struct CreatedPoll {
    pub poll: Poll,
    pub start_blocked_by: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChoiceCount {
    pub choice_id: i64,
    pub count: i64,
}

#[derive(Debug, Clone)]
pub struct ClosedPoll {
    pub poll: Poll,
    pub counts: Vec<ChoiceCount>,
}

/// A single recorded (team, choice) pair of an attributed poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributedVote {
    pub choice_id: i64,
    pub team_code: String,
    pub voted_by: String,
    pub voted_at: DateTime<Utc>,
}

/// The choices a team currently has recorded for the active poll.
#[derive(Debug, Clone)]
pub struct Ballot {
    pub poll: Poll,
    pub choice_ids: Vec<i64>,
}

impl Ballot {
    pub fn is_empty(&self) -> bool {
        self.choice_ids.is_empty()
    }

    pub fn ordinals(&self) -> Vec<usize> {
        let mut ordinals: Vec<usize> = self
            .choice_ids
            .iter()
            .filter_map(|id| self.poll.ordinal_of(*id))
            .collect();
        ordinals.sort_unstable();
        ordinals
    }

    pub fn selected(&self) -> Vec<&Choice> {
        self.poll
            .choices
            .iter()
            .filter(|choice| self.choice_ids.contains(&choice.id))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub code: String,
    pub name: String,
    #[serde(default = "default_voting_eligible")]
    pub voting_eligible: bool,
}

fn default_voting_eligible() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_poll() -> Poll {
        Poll {
            id: 7,
            question: "Favorite color?".to_string(),
            status: PollStatus::Active,
            anonymous: false,
            multiple_choice: true,
            display: false,
            choices: vec![
                Choice { id: 11, poll_id: 7, text: "Red".to_string(), marker: "1".to_string() },
                Choice { id: 12, poll_id: 7, text: "Green".to_string(), marker: "2".to_string() },
                Choice { id: 13, poll_id: 7, text: "Blue".to_string(), marker: "3".to_string() },
            ],
        }
    }

    #[test]
    fn ordinals_follow_choice_order() {
        let poll = sample_poll();
        assert_eq!(poll.ordinal_of(12), Some(2));
        assert_eq!(poll.ordinal_of(99), None);
        assert_eq!(poll.choice_at(3).map(|c| c.text.as_str()), Some("Blue"));
        assert!(poll.choice_at(0).is_none());
        assert!(poll.choice_at(4).is_none());
    }

    #[test]
    fn ballot_ordinals_are_sorted() {
        let ballot = Ballot { poll: sample_poll(), choice_ids: vec![13, 11] };
        assert_eq!(ballot.ordinals(), vec![1, 3]);
        let texts: Vec<&str> = ballot.selected().iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["Red", "Blue"]);
    }

    #[test]
    fn status_serializes_as_code() {
        let json = serde_json::to_string(&PollStatus::Closed).unwrap();
        assert_eq!(json, "2");
    }

    #[test]
    fn display_only_update_detection() {
        let update = PollUpdate { display: Some(true), ..Default::default() };
        assert!(update.is_display_only());
        let update = PollUpdate { display: Some(true), start: true, ..Default::default() };
        assert!(!update.is_display_only());
        assert!(PollUpdate::default().is_empty());
    }
}
