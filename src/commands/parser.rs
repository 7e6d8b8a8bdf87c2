//! Turns raw command text into typed commands. The poll core never sees raw text.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::models::{ChoiceInput, NewPoll, PollUpdate};

lazy_static! {
    // `marker::text`, e.g. `🔴::Red`.
    static ref MARKED_CHOICE: Regex = Regex::new(r"^(\S{1,16})::(.+)$").unwrap();
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty command")]
    Empty,

    #[error("unterminated quote")]
    UnterminatedQuote,

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("unknown option '{0}'")]
    UnknownFlag(String),

    #[error("'{0}' is not a poll id")]
    BadPollId(String),

    #[error("{0}")]
    Usage(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Poll(PollCommand),
    Vote(VoteCommand),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollCommand {
    List,
    New(NewPoll),
    Update { poll_id: i64, update: PollUpdate },
    Activate(Option<i64>),
    Close,
    ClearDisplay,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteCommand {
    Show,
    Cast(Vec<String>),
    Delete,
}

pub const POLL_NEW_USAGE: &str =
    "usage: poll new [-a|--anonymous] [-m|--multiple] [-s|--start] [-d|--display] <question> <choice> <choice>...";
pub const POLL_UPDATE_USAGE: &str = "usage: poll update <id> [--anonymous|--no-anonymous] [--multiple|--no-multiple] [--display|--no-display] [-s|--start] [<question> [<choice>...]]";
const POLL_USAGE: &str = "usage: poll list | new | update | activate [<id>] | close | cleardisplay";

pub fn parse(text: &str) -> Result<Command, ParseError> {
    let tokens = tokenize(text)?;
    let (head, rest) = tokens.split_first().ok_or(ParseError::Empty)?;

    match head.to_lowercase().as_str() {
        "help" => Ok(Command::Help),
        "poll" => parse_poll(rest).map(Command::Poll),
        "vote" => Ok(Command::Vote(parse_vote(rest))),
        other => Err(ParseError::UnknownCommand(other.to_string())),
    }
}

fn parse_poll(args: &[String]) -> Result<PollCommand, ParseError> {
    let (sub, rest) = args.split_first().ok_or(ParseError::Usage(POLL_USAGE))?;

    match sub.to_lowercase().as_str() {
        "list" => Ok(PollCommand::List),
        "new" => parse_new(rest),
        "update" => parse_update(rest),
        "activate" => match rest {
            [] => Ok(PollCommand::Activate(None)),
            [id] => Ok(PollCommand::Activate(Some(parse_poll_id(id)?))),
            _ => Err(ParseError::Usage("usage: poll activate [<id>]")),
        },
        "close" => Ok(PollCommand::Close),
        "cleardisplay" => Ok(PollCommand::ClearDisplay),
        other => Err(ParseError::UnknownCommand(format!("poll {}", other))),
    }
}

fn parse_new(args: &[String]) -> Result<PollCommand, ParseError> {
    let mut new = NewPoll::default();
    let mut positional = Vec::new();

    for arg in args {
        match arg.as_str() {
            "-a" | "--anonymous" => new.anonymous = true,
            "-m" | "--multiple" => new.multiple_choice = true,
            "-s" | "--start" => new.start = true,
            "-d" | "--display" => new.display = true,
            flag if is_flag(flag) => return Err(ParseError::UnknownFlag(flag.to_string())),
            _ => positional.push(arg.as_str()),
        }
    }

    let (question, choices) = positional
        .split_first()
        .ok_or(ParseError::Usage(POLL_NEW_USAGE))?;
    new.question = question.to_string();
    new.choices = choices.iter().map(|raw| parse_choice(raw)).collect();

    Ok(PollCommand::New(new))
}

fn parse_update(args: &[String]) -> Result<PollCommand, ParseError> {
    let (id, rest) = args.split_first().ok_or(ParseError::Usage(POLL_UPDATE_USAGE))?;
    let poll_id = parse_poll_id(id)?;

    let mut update = PollUpdate::default();
    let mut positional = Vec::new();

    for arg in rest {
        match arg.as_str() {
            "--anonymous" => update.anonymous = Some(true),
            "--no-anonymous" => update.anonymous = Some(false),
            "--multiple" => update.multiple_choice = Some(true),
            "--no-multiple" => update.multiple_choice = Some(false),
            "--display" => update.display = Some(true),
            "--no-display" => update.display = Some(false),
            "-s" | "--start" => update.start = true,
            flag if is_flag(flag) => return Err(ParseError::UnknownFlag(flag.to_string())),
            _ => positional.push(arg.as_str()),
        }
    }

    if let Some((question, choices)) = positional.split_first() {
        update.question = Some(question.to_string());
        if !choices.is_empty() {
            update.choices = Some(choices.iter().map(|raw| parse_choice(raw)).collect());
        }
    }

    if update.is_empty() {
        return Err(ParseError::Usage(POLL_UPDATE_USAGE));
    }

    Ok(PollCommand::Update { poll_id, update })
}

fn parse_vote(args: &[String]) -> VoteCommand {
    match args {
        [] => VoteCommand::Show,
        [word] if word.eq_ignore_ascii_case("delete") => VoteCommand::Delete,
        selections => VoteCommand::Cast(selections.to_vec()),
    }
}

fn parse_poll_id(raw: &str) -> Result<i64, ParseError> {
    raw.trim_start_matches('#')
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ParseError::BadPollId(raw.to_string()))
}

fn parse_choice(raw: &str) -> ChoiceInput {
    match MARKED_CHOICE.captures(raw) {
        Some(caps) => ChoiceInput::with_marker(&caps[2], &caps[1]),
        None => ChoiceInput::new(raw),
    }
}

// Negative numbers are not flags.
fn is_flag(arg: &str) -> bool {
    arg.starts_with('-') && arg.len() > 1 && !arg[1..].starts_with(|c: char| c.is_ascii_digit())
}

/// Splits on whitespace, honouring single quotes, double quotes and backslash escapes.
pub fn tokenize(text: &str) -> Result<Vec<String>, ParseError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"'), '\\') | (None, '\\') => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
                in_token = true;
            }
            (Some(_), c) => current.push(c),
            (None, '"') | (None, '\'') => {
                quote = Some(c);
                in_token = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if quote.is_some() {
        return Err(ParseError::UnterminatedQuote);
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}
