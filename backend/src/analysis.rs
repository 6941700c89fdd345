//! Runs the analysis pipeline over a spooled upload.

use base64::Engine;
use tokio_util::sync::CancellationToken;

use common::demo_analysis::{MatchStatistics, PlayerHeatmap};

use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct AnalysisInput {
    pub match_id: String,
    pub path: std::path::PathBuf,
}

/// Blocking, meant to be run on a worker thread.
#[tracing::instrument(name = "Pipeline", skip(options, token), fields(match_id = %input.match_id))]
pub fn analyse(
    input: &AnalysisInput,
    options: &analysis::Options,
    token: &CancellationToken,
) -> Result<(MatchStatistics, Vec<PlayerHeatmap>), ApiError> {
    let file = std::fs::File::open(&input.path)
        .map_err(|e| ApiError::Internal(format!("opening spooled demo: {}", e)))?;

    let options = analysis::Options {
        match_id: input.match_id.clone(),
        ..options.clone()
    };
    let output = analysis::parse_with(file, &options, || token.is_cancelled())?;

    tracing::info!(
        rounds = output.statistics.rounds.len(),
        players = output.statistics.per_player_stats.len(),
        heatmaps = output.heatmaps.len(),
        "Analysed demo"
    );

    Ok((output.statistics, encode_heatmaps(output.heatmaps)))
}

/// Renders every grid as a base64 encoded PNG, skipping the ones that fail.
pub fn encode_heatmaps(grids: Vec<analysis::PlayerHeatmapGrid>) -> Vec<PlayerHeatmap> {
    grids
        .into_iter()
        .filter_map(|grid| {
            let png = match grid.heatmap.to_png() {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!("Rendering heatmap for {:?}: {:?}", grid.steam_id, e);
                    return None;
                }
            };

            Some(PlayerHeatmap {
                steam_id: grid.steam_id,
                name: grid.name,
                team: grid.team,
                png_data: base64::engine::general_purpose::STANDARD.encode(png),
            })
        })
        .collect()
}
