//! Decoding and analysis of recorded matches.
//!
//! The pipeline is strictly sequential for a single demo:
//! [`frame`] reads the container, [`event`] turns frames into typed events,
//! [`reconstruct`] replays them into rounds and [`aggregate`] derives the
//! final [`MatchStatistics`].

use std::io::Read;

use common::demo_analysis::{MatchStatistics, Team};

pub mod aggregate;
pub mod economy;
pub mod event;
pub mod frame;
pub mod head_to_head;
pub mod heatmap;
pub mod reconstruct;
pub mod writer;

use event::{DemoEvent, EventPayload, EventStream, GameEvent};
use reconstruct::{Reconstructor, RoundPhase};

#[derive(Debug, Clone)]
pub struct Options {
    pub match_id: String,
    pub limits: frame::Limits,
    pub rules: economy::EconomyRules,
    /// Builds per player heatmaps when set.
    pub heatmap: Option<heatmap::Config>,
    /// Number of events between two cancellation checks.
    pub abort_check_interval: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            match_id: String::new(),
            limits: frame::Limits::default(),
            rules: economy::EconomyRules::default(),
            heatmap: None,
            abort_check_interval: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Format(#[from] frame::FormatError),
    #[error(transparent)]
    Aggregation(#[from] aggregate::AggregationError),
    #[error("analysis was cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerHeatmapGrid {
    pub steam_id: String,
    pub name: String,
    pub team: Team,
    pub heatmap: heatmap::HeatMap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub statistics: MatchStatistics,
    pub heatmaps: Vec<PlayerHeatmapGrid>,
}

/// Runs the whole pipeline over one demo.
pub fn parse<R: Read>(reader: R, options: &Options) -> Result<Output, PipelineError> {
    parse_with(reader, options, || false)
}

/// Like [`parse`], but stops with [`PipelineError::Cancelled`] once
/// `should_abort` returns true. It is polled every
/// [`Options::abort_check_interval`] events.
#[tracing::instrument(skip(reader, options, should_abort), fields(match_id = %options.match_id))]
pub fn parse_with<R, F>(reader: R, options: &Options, should_abort: F) -> Result<Output, PipelineError>
where
    R: Read,
    F: Fn() -> bool,
{
    let frames = frame::DemoReader::with_limits(reader, options.limits)?;
    let mut events = EventStream::new(frames);
    let header = events.header().clone();

    let mut reconstructor = Reconstructor::new(options.rules.clone());
    let mut heatmaps = options.heatmap.clone().map(heatmap::HeatmapBuilder::new);
    let interval = options.abort_check_interval.max(1);

    for (count, event) in events.by_ref().enumerate() {
        if count % interval == 0 && should_abort() {
            tracing::info!(events = count, "Cancelled");
            return Err(PipelineError::Cancelled);
        }

        let event = event?;

        if let (
            Some(builder),
            DemoEvent::Game(GameEvent {
                payload: EventPayload::PlayerPosition { player, position },
                ..
            }),
        ) = (heatmaps.as_mut(), &event)
        {
            let state = reconstructor.state();
            if state.phase == RoundPhase::Live {
                if let Some(p) = state.players.get(player).filter(|p| p.alive) {
                    builder.observe(*player, p.team, position);
                }
            }
        }

        reconstructor.apply(event);
    }

    let reconstruction = reconstructor.finish();

    let mut diagnostics = reconstruction.diagnostics;
    diagnostics.frames = events.frames();
    diagnostics.skipped_frames = events.skipped_frames();
    diagnostics.skipped_events = events.skipped_events();

    tracing::info!(
        rounds = reconstruction.rounds.len(),
        warnings = reconstruction.anomalies.len(),
        frames = diagnostics.frames,
        "Reconstructed match"
    );

    let info = aggregate::MatchInfo {
        match_id: options.match_id.clone(),
        map_name: header.map_name,
        tick_rate: header.tick_rate,
        first_tick: reconstruction.first_tick,
        last_tick: reconstruction.last_tick,
    };
    let statistics = aggregate::aggregate(
        info,
        &reconstruction.rounds,
        reconstruction.anomalies,
        diagnostics,
    )?;

    let players = &reconstruction.state.players;
    let heatmaps = heatmaps
        .map(|builder| builder.finish())
        .unwrap_or_default()
        .into_iter()
        .filter_map(|((player, team), heatmap)| {
            let info = players.get(&player)?;
            Some(PlayerHeatmapGrid {
                steam_id: info.steam_id.to_string(),
                name: info.name.clone(),
                team,
                heatmap,
            })
        })
        .collect();

    Ok(Output {
        statistics,
        heatmaps,
    })
}
