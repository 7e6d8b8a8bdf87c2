use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use tokio::time::{MissedTickBehavior, interval};

use crate::roster::Roster;

/// Reloads the roster every `period`. A failed reload keeps the previous snapshot.
pub async fn refresh_roster_task(roster: Arc<Roster>, period: Duration) {
    info!("Refreshing the team roster every {}s", period.as_secs());
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately and startup has already loaded once.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        refresh_once(&roster).await;
    }
}

async fn refresh_once(roster: &Roster) {
    match roster.refresh().await {
        Ok(count) => debug!("Roster refresh picked up {} team(s)", count),
        Err(e) => {
            let age = Utc::now() - roster.snapshot().await.loaded_at();
            warn!(
                "Roster refresh failed, keeping snapshot from {}s ago: {}",
                age.num_seconds(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::JsonFileSource;

    #[tokio::test]
    async fn refresh_once_survives_a_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.json");
        tokio::fs::write(&path, r#"[{"code": "abc", "name": "Alphabet"}]"#).await.unwrap();

        let roster = Roster::new(Box::new(JsonFileSource::new(&path)));
        refresh_once(&roster).await;
        assert!(roster.snapshot().await.lookup_team("ABC").is_some());

        tokio::fs::write(&path, "[").await.unwrap();
        refresh_once(&roster).await;
        assert_eq!(roster.snapshot().await.list_teams().len(), 1);
    }

    #[tokio::test]
    async fn task_reloads_on_each_period() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.json");
        tokio::fs::write(&path, "[]").await.unwrap();

        let roster = Arc::new(Roster::new(Box::new(JsonFileSource::new(&path))));
        let task = tokio::spawn(refresh_roster_task(Arc::clone(&roster), Duration::from_millis(50)));

        tokio::fs::write(&path, r#"[{"code": "XYZ", "name": "Zedland"}]"#).await.unwrap();
        for _ in 0..40 {
            if !roster.snapshot().await.list_teams().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(roster.snapshot().await.lookup_team("xyz").is_some());
        task.abort();
    }
}
