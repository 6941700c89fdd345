use std::time::Duration;

use common::demo_analysis::Rank;
use serde::Deserialize;

/// Resolves the competitive rank of a player.
#[async_trait::async_trait]
pub trait RankLookup: Send + Sync {
    async fn rank(&self, steam_id: &str) -> Rank;
}

/// Used when no rank service is configured.
pub struct Disabled;

#[async_trait::async_trait]
impl RankLookup for Disabled {
    async fn rank(&self, _steam_id: &str) -> Rank {
        Rank::NotRequested
    }
}

#[derive(Debug, Deserialize)]
struct RankResponse {
    rank: Option<u32>,
}

pub struct HttpRankLookup {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpRankLookup {
    pub fn new<IS>(base_url: IS, timeout: Duration) -> Self
    where
        IS: Into<String>,
    {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            timeout,
        }
    }

    async fn get(&self, steam_id: &str) -> Result<Rank, reqwest::Error> {
        let response = self
            .http
            .get(format!("{}/rank/{}", self.base_url, steam_id))
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;

        let body: RankResponse = response.json().await?;
        Ok(body.rank.map(Rank::Premier).unwrap_or(Rank::Unavailable))
    }
}

#[async_trait::async_trait]
impl RankLookup for HttpRankLookup {
    async fn rank(&self, steam_id: &str) -> Rank {
        match self.get(steam_id).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(steam_id, "Looking up rank: {:?}", e);
                Rank::Unavailable
            }
        }
    }
}

/// Fills in the rank of every player, querying all of them concurrently.
#[tracing::instrument(skip_all, fields(match_id = %statistics.match_id))]
pub async fn enrich(lookup: &dyn RankLookup, statistics: &mut common::demo_analysis::MatchStatistics) {
    let ranks = futures::future::join_all(
        statistics
            .per_player_stats
            .keys()
            .map(|steam_id| async move { (steam_id.clone(), lookup.rank(steam_id).await) }),
    )
    .await;

    for (steam_id, rank) in ranks {
        if let Some(stats) = statistics.per_player_stats.get_mut(&steam_id) {
            stats.rank = rank;
        }
    }
}
