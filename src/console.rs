//! Line console standing in for the chat transport: `<team> <voter> <command text>`.

use log::warn;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::commands::{Invocation, handle_command};
use crate::config::Config;
use crate::state::AppState;

/// Splits a console line into an invocation, or `None` if the line is too short.
pub fn split_line(line: &str, config: &Config) -> Option<Invocation> {
    let mut parts = line.trim().splitn(3, char::is_whitespace);
    let team = parts.next().filter(|s| !s.is_empty())?;
    let voter = parts.next().filter(|s| !s.is_empty())?;
    let text = parts.next().map(str::trim).unwrap_or_default();

    Some(Invocation {
        team: team.to_string(),
        voter: voter.to_string(),
        text: text.to_string(),
        can_manage_polls: config.is_poll_admin(voter),
    })
}

/// Reads commands until `input` is exhausted, writing each reply to `output`.
/// Raw lines are never logged: a vote line names the team next to its selection.
pub async fn run<R, W>(state: &AppState, config: &Config, input: R, mut output: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match split_line(&line, config) {
            Some(invocation) => handle_command(state, &invocation).await,
            None => {
                warn!("Ignoring malformed console line");
                "expected: <team> <voter> <command>".to_string()
            }
        };
        output.write_all(reply.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    Ok(())
}
