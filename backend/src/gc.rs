use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::jobs::Registry;
use crate::storage::{MatchStorage, StorageError};

/// Finished jobs stay in the registry this long, afterwards they are only
/// served from storage.
pub const FINISHED_JOB_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GcReport {
    pub jobs: usize,
    pub matches: usize,
}

fn cutoff(retention: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(retention)
        .ok()
        .and_then(|r| Utc::now().checked_sub_signed(r))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[tracing::instrument(skip(storage, registry))]
pub async fn run_gc(
    storage: &dyn MatchStorage,
    registry: &Registry,
    retention: Duration,
) -> Result<GcReport, StorageError> {
    let jobs = registry.prune(FINISHED_JOB_TTL);
    let matches = storage.evict_before(cutoff(retention)).await?;

    tracing::info!("Removed {} finished jobs and {} expired matches", jobs, matches);

    Ok(GcReport { jobs, matches })
}

/// Runs [`run_gc`] every `interval` until the runtime shuts down.
pub fn spawn(
    storage: Arc<dyn MatchStorage>,
    registry: Arc<Registry>,
    retention: Duration,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = run_gc(storage.as_ref(), &registry, retention).await {
                tracing::error!("Running GC: {:?}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, StoredMatch};
    use common::demo_analysis::{Diagnostics, MatchStatistics, TeamScores};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn evicts_expired_matches() {
        let storage = MemoryStorage::new();
        let mut old = StoredMatch::new(
            MatchStatistics {
                match_id: "old".to_owned(),
                map_name: "de_nuke".to_owned(),
                tick_rate: 64,
                duration_ticks: 0,
                duration_seconds: 0.0,
                team_scores: TeamScores::default(),
                per_player_stats: Default::default(),
                rounds: Vec::new(),
                head_to_head: Vec::new(),
                warnings: Vec::new(),
                diagnostics: Diagnostics::default(),
            },
            Vec::new(),
        );
        let mut fresh = old.clone();
        fresh.statistics.match_id = "fresh".to_owned();
        old.stored_at = Utc::now() - chrono::Duration::days(31);

        storage.store(old).await.unwrap();
        storage.store(fresh).await.unwrap();

        let registry = Registry::new();
        let report = run_gc(&storage, &registry, Duration::from_secs(30 * 86400))
            .await
            .unwrap();

        assert_eq!(GcReport { jobs: 0, matches: 1 }, report);
        assert!(storage.load("old".to_owned()).await.unwrap().is_none());
        assert!(storage.load("fresh".to_owned()).await.unwrap().is_some());
    }

    #[test]
    fn huge_retention_keeps_everything() {
        assert_eq!(DateTime::<Utc>::MIN_UTC, cutoff(Duration::MAX));
    }
}
