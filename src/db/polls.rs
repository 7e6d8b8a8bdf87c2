use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::models::{Choice, NewChoice, Poll, PollStatus};

const POLL_COLUMNS: &str = "poll_id, question, status, anonymous, multiple_choice, display";

fn poll_from_row(row: &SqliteRow) -> Result<Poll, sqlx::Error> {
    let code: i64 = row.try_get("status")?;
    let status = PollStatus::from_code(code)
        .ok_or_else(|| sqlx::Error::Decode(format!("Unknown poll status: {}", code).into()))?;

    Ok(Poll {
        id: row.try_get("poll_id")?,
        question: row.try_get("question")?,
        status,
        anonymous: row.try_get("anonymous")?,
        multiple_choice: row.try_get("multiple_choice")?,
        display: row.try_get("display")?,
        choices: Vec::new(),
    })
}

pub async fn fetch_choices(
    conn: &mut SqliteConnection,
    poll_id: i64,
) -> Result<Vec<Choice>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT poll_choice_id, poll_id, choice, marker
        FROM poll_choices
        WHERE poll_id = ?
        ORDER BY poll_choice_id
        "#,
    )
    .bind(poll_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(Choice {
                id: row.try_get("poll_choice_id")?,
                poll_id: row.try_get("poll_id")?,
                text: row.try_get("choice")?,
                marker: row.try_get("marker")?,
            })
        })
        .collect()
}

async fn with_choices(
    conn: &mut SqliteConnection,
    row: Option<SqliteRow>,
) -> Result<Option<Poll>, sqlx::Error> {
    match row {
        None => Ok(None),
        Some(row) => {
            let mut poll = poll_from_row(&row)?;
            poll.choices = fetch_choices(conn, poll.id).await?;
            Ok(Some(poll))
        }
    }
}

pub async fn fetch_poll(
    conn: &mut SqliteConnection,
    poll_id: i64,
) -> Result<Option<Poll>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {} FROM polls WHERE poll_id = ?", POLL_COLUMNS))
        .bind(poll_id)
        .fetch_optional(&mut *conn)
        .await?;
    with_choices(conn, row).await
}

pub async fn fetch_active_poll(conn: &mut SqliteConnection) -> Result<Option<Poll>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {} FROM polls WHERE status = 1", POLL_COLUMNS))
        .fetch_optional(&mut *conn)
        .await?;
    with_choices(conn, row).await
}

pub async fn fetch_displayed_poll(
    conn: &mut SqliteConnection,
) -> Result<Option<Poll>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {} FROM polls WHERE display = TRUE", POLL_COLUMNS))
        .fetch_optional(&mut *conn)
        .await?;
    with_choices(conn, row).await
}

pub async fn fetch_all_polls(conn: &mut SqliteConnection) -> Result<Vec<Poll>, sqlx::Error> {
    let rows = sqlx::query(&format!("SELECT {} FROM polls ORDER BY poll_id", POLL_COLUMNS))
        .fetch_all(&mut *conn)
        .await?;

    let mut polls = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut poll = poll_from_row(row)?;
        poll.choices = fetch_choices(conn, poll.id).await?;
        polls.push(poll);
    }
    Ok(polls)
}

pub async fn insert_poll(
    conn: &mut SqliteConnection,
    question: &str,
    anonymous: bool,
    multiple_choice: bool,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO polls (question, status, anonymous, multiple_choice, display)
        VALUES (?, 0, ?, ?, FALSE)
        "#,
    )
    .bind(question)
    .bind(anonymous)
    .bind(multiple_choice)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn insert_choices(
    conn: &mut SqliteConnection,
    poll_id: i64,
    choices: &[NewChoice],
) -> Result<(), sqlx::Error> {
    for choice in choices {
        sqlx::query(
            r#"
            INSERT INTO poll_choices (poll_id, choice, marker)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(poll_id)
        .bind(&choice.text)
        .bind(&choice.marker)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn delete_choices(conn: &mut SqliteConnection, poll_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM poll_choices WHERE poll_id = ?")
        .bind(poll_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn update_fields(
    conn: &mut SqliteConnection,
    poll_id: i64,
    question: &str,
    anonymous: bool,
    multiple_choice: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE polls
        SET question = ?, anonymous = ?, multiple_choice = ?
        WHERE poll_id = ? AND status = 0
        "#,
    )
    .bind(question)
    .bind(anonymous)
    .bind(multiple_choice)
    .bind(poll_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Moves a poll from one status to another; returns 0 when the poll was not in `from`.
pub async fn transition(
    conn: &mut SqliteConnection,
    poll_id: i64,
    from: PollStatus,
    to: PollStatus,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE polls SET status = ? WHERE poll_id = ? AND status = ?")
        .bind(to.code())
        .bind(poll_id)
        .bind(from.code())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn clear_display(conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE polls SET display = FALSE WHERE display = TRUE")
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn set_display(
    conn: &mut SqliteConnection,
    poll_id: i64,
    display: bool,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE polls SET display = ? WHERE poll_id = ?")
        .bind(display)
        .bind(poll_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}
