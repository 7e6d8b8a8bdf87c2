use std::fmt::Write;

use crate::error::PollError;
use crate::models::{Ballot, ClosedPoll, CreatedPoll, Poll};

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

pub fn poll(poll: &Poll) -> String {
    let mut out = format!(
        "**Poll #{}** ({}): {}\n",
        poll.id,
        poll.status.label(),
        poll.question
    );
    let _ = writeln!(
        out,
        "anonymous: {} | multiple choice: {} | displayed: {}",
        yes_no(poll.anonymous),
        yes_no(poll.multiple_choice),
        yes_no(poll.display)
    );
    for (index, choice) in poll.choices.iter().enumerate() {
        let _ = writeln!(out, "{}. {} {}", index + 1, choice.marker, choice.text);
    }
    out
}

pub fn created(created: &CreatedPoll) -> String {
    let mut out = format!("Created poll #{}.\n\n{}", created.poll.id, poll(&created.poll));
    if let Some(active) = created.start_blocked_by {
        let _ = write!(
            out,
            "\nNot started: poll #{} is still active. Close it, then `poll activate {}`.",
            active, created.poll.id
        );
    }
    out
}

pub fn updated(updated: &Poll) -> String {
    format!("Updated poll #{}.\n\n{}", updated.id, poll(updated))
}

pub fn activated(active: &Poll) -> String {
    format!("{}\nVote with `vote <number>`.", poll(active))
}

pub fn list(polls: &[Poll]) -> String {
    if polls.is_empty() {
        return "There are no polls yet.".to_string();
    }
    polls.iter().map(poll).collect::<Vec<_>>().join("\n")
}

pub fn closed(closed: &ClosedPoll) -> String {
    let mut out = format!(
        "Closed poll #{}: {}\n",
        closed.poll.id, closed.poll.question
    );
    for count in &closed.counts {
        if let Some(choice) = closed.poll.choices.iter().find(|c| c.id == count.choice_id) {
            let _ = writeln!(out, "- {} {}: {}", choice.marker, choice.text, count.count);
        }
    }
    out
}

pub fn cleared_display(cleared: u64) -> String {
    if cleared == 0 {
        "No poll was displayed.".to_string()
    } else {
        "The results page no longer shows a poll.".to_string()
    }
}

fn selection(ballot: &Ballot) -> String {
    ballot
        .selected()
        .into_iter()
        .filter_map(|choice| {
            ballot
                .poll
                .ordinal_of(choice.id)
                .map(|ordinal| format!("{}. {} {}", ordinal, choice.marker, choice.text))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn ballot(ballot: &Ballot) -> String {
    let header = poll(&ballot.poll);
    if ballot.is_empty() {
        format!("{}\nYour team has not voted yet.", header)
    } else {
        format!("{}\nYour team's vote: {}", header, selection(ballot))
    }
}

pub fn cast(ballot: &Ballot) -> String {
    let note = if ballot.poll.anonymous {
        " This poll is anonymous."
    } else {
        ""
    };
    format!(
        "Recorded your team's vote for poll #{}: {}.{}",
        ballot.poll.id,
        selection(ballot),
        note
    )
}

pub fn deleted(ballot: &Ballot) -> String {
    if ballot.is_empty() {
        format!("Your team had no vote in poll #{}.", ballot.poll.id)
    } else {
        format!("Deleted your team's vote in poll #{}.", ballot.poll.id)
    }
}

pub fn error(err: &PollError) -> String {
    match err {
        PollError::Validation(msg) => format!("Invalid input: {}", msg),
        PollError::NotFound(msg) | PollError::InvalidState(msg) => msg.clone(),
        PollError::Conflict(msg) => format!("Conflict: {}", msg),
        PollError::InternalConsistency(poll_id) => format!(
            "Poll #{} is damaged (it has no choices). Please tell the organisers.",
            poll_id
        ),
        PollError::Store(_) => {
            "The poll service is unavailable right now, please try again later.".to_string()
        }
    }
}

pub fn help(can_manage_polls: bool) -> String {
    let mut out = String::from(
        "**Voting**\n\
         - `vote`: show the active poll and your team's vote\n\
         - `vote <n> [<n>...]`: vote for choice number n (several numbers for multiple-choice polls)\n\
         - `vote delete`: withdraw your team's vote\n",
    );
    if can_manage_polls {
        out.push_str(
            "\n**Polls**\n\
             - `poll list`\n\
             - `poll new [-a] [-m] [-s] [-d] \"question\" choice choice...` (a choice may be written `marker::text`)\n\
             - `poll update <id> [--anonymous|--no-anonymous] [--multiple|--no-multiple] [--display|--no-display] [--start] [\"question\" [choice...]]`\n\
             - `poll activate [<id>]`\n\
             - `poll close`\n\
             - `poll cleardisplay`\n",
        );
    }
    out
}
