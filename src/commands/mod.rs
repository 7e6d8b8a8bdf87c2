pub mod parser;
pub mod render;

use log::{debug, error, info, warn};

use crate::error::{PollError, PollResult};
use crate::state::AppState;
use parser::{Command, PollCommand, VoteCommand};

/// One command as received from a transport.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub team: String,
    pub voter: String,
    pub text: String,
    pub can_manage_polls: bool,
}

/// Runs a command and returns the markdown reply. Errors are rendered, never returned.
pub async fn handle_command(state: &AppState, invocation: &Invocation) -> String {
    let command = match parser::parse(&invocation.text) {
        Ok(command) => command,
        Err(err) => {
            debug!("Rejected command from {}: {}", invocation.voter, err);
            return format!("{}. Try `help`.", err);
        }
    };

    if let Some(line) = audit_line(&command, invocation) {
        info!("{}", line);
    }

    let result = match command {
        Command::Help => Ok(render::help(invocation.can_manage_polls)),
        Command::Poll(_) if !invocation.can_manage_polls => {
            warn!("{} tried to manage polls without permission", invocation.voter);
            return "Only poll administrators can do that.".to_string();
        }
        Command::Poll(command) => run_poll(state, command).await,
        Command::Vote(command) => {
            let team_code = invocation.team.trim().to_uppercase();
            let roster = state.roster.snapshot().await;
            match roster.lookup_team(&team_code) {
                Some(team) if team.voting_eligible => {}
                Some(team) => return format!("Team {} is not eligible to vote.", team.code),
                None => return format!("Unknown team {}.", team_code),
            }
            run_vote(state, &team_code, &invocation.voter, command).await
        }
    };

    result.unwrap_or_else(|err| {
        match &err {
            PollError::Store(source) => error!("Store failure while handling command: {}", source),
            PollError::InternalConsistency(poll_id) => {
                error!("Poll {} has no choices", poll_id)
            }
            other => debug!("Command failed: {}", other),
        }
        render::error(&err)
    })
}

/// What to log about an accepted command. Vote commands are never logged here, since
/// the team and its selection on one line would trace an anonymous ballot.
pub fn audit_line(command: &Command, invocation: &Invocation) -> Option<String> {
    let action = match command {
        Command::Help | Command::Vote(_) => return None,
        Command::Poll(PollCommand::List) => "poll list".to_string(),
        Command::Poll(PollCommand::New(new)) => format!("poll new {:?}", new.question),
        Command::Poll(PollCommand::Update { poll_id, .. }) => format!("poll update {}", poll_id),
        Command::Poll(PollCommand::Activate(Some(poll_id))) => format!("poll activate {}", poll_id),
        Command::Poll(PollCommand::Activate(None)) => "poll activate".to_string(),
        Command::Poll(PollCommand::Close) => "poll close".to_string(),
        Command::Poll(PollCommand::ClearDisplay) => "poll cleardisplay".to_string(),
    };
    Some(format!("{} ({}) ran {}", invocation.voter, invocation.team, action))
}

async fn run_poll(state: &AppState, command: PollCommand) -> PollResult<String> {
    match command {
        PollCommand::List => state.polls.list().await.map(|polls| render::list(&polls)),
        PollCommand::New(new) => state.polls.create(new).await.map(|c| render::created(&c)),
        PollCommand::Update { poll_id, update } => state
            .polls
            .update(poll_id, update)
            .await
            .map(|poll| render::updated(&poll)),
        PollCommand::Activate(poll_id) => state
            .polls
            .activate(poll_id)
            .await
            .map(|poll| render::activated(&poll)),
        PollCommand::Close => state.polls.close().await.map(|c| render::closed(&c)),
        PollCommand::ClearDisplay => state
            .polls
            .clear_display()
            .await
            .map(render::cleared_display),
    }
}

async fn run_vote(
    state: &AppState,
    team_code: &str,
    voter: &str,
    command: VoteCommand,
) -> PollResult<String> {
    match command {
        VoteCommand::Show => state.votes.get_ballot(team_code).await.map(|b| render::ballot(&b)),
        VoteCommand::Cast(selections) => state
            .votes
            .cast_vote(team_code, voter, &selections)
            .await
            .map(|b| render::cast(&b)),
        VoteCommand::Delete => state.votes.delete_vote(team_code).await.map(|b| render::deleted(&b)),
    }
}
