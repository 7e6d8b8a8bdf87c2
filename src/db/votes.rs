use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

use crate::models::{AttributedVote, ChoiceCount};

pub async fn fetch_attributed_ballot(
    conn: &mut SqliteConnection,
    poll_id: i64,
    team_code: &str,
) -> Result<Vec<i64>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT poll_choice_id
        FROM poll_votes
        WHERE poll_id = ? AND team_code = ?
        ORDER BY poll_choice_id
        "#,
    )
    .bind(poll_id)
    .bind(team_code)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(|row| row.try_get("poll_choice_id")).collect()
}

pub async fn fetch_anonymous_ballot(
    conn: &mut SqliteConnection,
    poll_id: i64,
    team_code: &str,
) -> Result<Vec<i64>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT v.poll_choice_id
        FROM poll_anonym_active_votes v
        JOIN poll_choices c ON c.poll_choice_id = v.poll_choice_id
        WHERE c.poll_id = ? AND v.team_code = ?
        ORDER BY v.poll_choice_id
        "#,
    )
    .bind(poll_id)
    .bind(team_code)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(|row| row.try_get("poll_choice_id")).collect()
}

pub async fn delete_attributed_ballot(
    conn: &mut SqliteConnection,
    poll_id: i64,
    team_code: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM poll_votes WHERE poll_id = ? AND team_code = ?")
        .bind(poll_id)
        .bind(team_code)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_anonymous_ballot(
    conn: &mut SqliteConnection,
    poll_id: i64,
    team_code: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM poll_anonym_active_votes
        WHERE team_code = ?
          AND poll_choice_id IN (SELECT poll_choice_id FROM poll_choices WHERE poll_id = ?)
        "#,
    )
    .bind(team_code)
    .bind(poll_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn insert_attributed_votes(
    conn: &mut SqliteConnection,
    poll_id: i64,
    team_code: &str,
    voted_by: &str,
    voted_at: DateTime<Utc>,
    choice_ids: &[i64],
) -> Result<(), sqlx::Error> {
    for choice_id in choice_ids {
        sqlx::query(
            r#"
            INSERT INTO poll_votes (poll_id, poll_choice_id, team_code, voted_by, voted_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(poll_id)
        .bind(choice_id)
        .bind(team_code)
        .bind(voted_by)
        .bind(voted_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn insert_anonymous_votes(
    conn: &mut SqliteConnection,
    team_code: &str,
    choice_ids: &[i64],
) -> Result<(), sqlx::Error> {
    for choice_id in choice_ids {
        sqlx::query("INSERT INTO poll_anonym_active_votes (poll_choice_id, team_code) VALUES (?, ?)")
            .bind(choice_id)
            .bind(team_code)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

fn counts_from_rows(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<ChoiceCount>, sqlx::Error> {
    rows.iter()
        .map(|row| {
            Ok(ChoiceCount {
                choice_id: row.try_get("poll_choice_id")?,
                count: row.try_get("count")?,
            })
        })
        .collect()
}

/// Live per-choice counts of an anonymous poll, zero-filled, in choice order.
pub async fn count_anonymous_active(
    conn: &mut SqliteConnection,
    poll_id: i64,
) -> Result<Vec<ChoiceCount>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT c.poll_choice_id, COUNT(v.team_code) AS count
        FROM poll_choices c
        LEFT JOIN poll_anonym_active_votes v ON v.poll_choice_id = c.poll_choice_id
        WHERE c.poll_id = ?
        GROUP BY c.poll_choice_id
        ORDER BY c.poll_choice_id
        "#,
    )
    .bind(poll_id)
    .fetch_all(&mut *conn)
    .await?;
    counts_from_rows(&rows)
}

/// Per-choice counts of an attributed poll, zero-filled, in choice order.
pub async fn count_attributed(
    conn: &mut SqliteConnection,
    poll_id: i64,
) -> Result<Vec<ChoiceCount>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT c.poll_choice_id, COUNT(v.team_code) AS count
        FROM poll_choices c
        LEFT JOIN poll_votes v ON v.poll_choice_id = c.poll_choice_id AND v.poll_id = c.poll_id
        WHERE c.poll_id = ?
        GROUP BY c.poll_choice_id
        ORDER BY c.poll_choice_id
        "#,
    )
    .bind(poll_id)
    .fetch_all(&mut *conn)
    .await?;
    counts_from_rows(&rows)
}

pub async fn insert_tallies(
    conn: &mut SqliteConnection,
    poll_id: i64,
    counts: &[ChoiceCount],
) -> Result<(), sqlx::Error> {
    for tally in counts {
        sqlx::query("INSERT INTO poll_anonym_votes (poll_id, poll_choice_id, count) VALUES (?, ?, ?)")
            .bind(poll_id)
            .bind(tally.choice_id)
            .bind(tally.count)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub async fn fetch_tallies(
    conn: &mut SqliteConnection,
    poll_id: i64,
) -> Result<Vec<ChoiceCount>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT c.poll_choice_id, COALESCE(t.count, 0) AS count
        FROM poll_choices c
        LEFT JOIN poll_anonym_votes t ON t.poll_choice_id = c.poll_choice_id AND t.poll_id = c.poll_id
        WHERE c.poll_id = ?
        ORDER BY c.poll_choice_id
        "#,
    )
    .bind(poll_id)
    .fetch_all(&mut *conn)
    .await?;
    counts_from_rows(&rows)
}

pub async fn purge_anonymous_active(
    conn: &mut SqliteConnection,
    poll_id: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM poll_anonym_active_votes
        WHERE poll_choice_id IN (SELECT poll_choice_id FROM poll_choices WHERE poll_id = ?)
        "#,
    )
    .bind(poll_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn fetch_attributed_votes(
    conn: &mut SqliteConnection,
    poll_id: i64,
) -> Result<Vec<AttributedVote>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT poll_choice_id, team_code, voted_by, voted_at
        FROM poll_votes
        WHERE poll_id = ?
        ORDER BY team_code, poll_choice_id
        "#,
    )
    .bind(poll_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(AttributedVote {
                choice_id: row.try_get("poll_choice_id")?,
                team_code: row.try_get("team_code")?,
                voted_by: row.try_get("voted_by")?,
                voted_at: row.try_get("voted_at")?,
            })
        })
        .collect()
}
