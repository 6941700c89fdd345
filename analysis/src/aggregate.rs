use std::collections::BTreeMap;

use common::demo_analysis::{
    Anomaly, DeathMark, Diagnostics, MatchStatistics, PlayerRoundDelta, PlayerStats,
    RoundSummary, Team,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchInfo {
    pub match_id: String,
    pub map_name: String,
    pub tick_rate: u16,
    pub first_tick: u32,
    pub last_tick: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregationError {
    #[error("the demo contains no completed rounds")]
    NoRounds,
}

/// Builds the final statistics document from the completed rounds.
///
/// Pure function of its inputs, the same rounds always produce the same
/// document.
pub fn aggregate(
    info: MatchInfo,
    rounds: &[RoundSummary],
    warnings: Vec<Anomaly>,
    diagnostics: Diagnostics,
) -> Result<MatchStatistics, AggregationError> {
    if rounds.is_empty() {
        return Err(AggregationError::NoRounds);
    }

    let mut team_scores = common::demo_analysis::TeamScores::default();
    let mut per_player_stats = BTreeMap::<String, PlayerStats>::new();

    for round in rounds {
        team_scores.increment(round.winning_team);

        for delta in round.player_deltas.iter() {
            let stats = per_player_stats.entry(delta.steam_id.clone()).or_default();
            stats.name.clone_from(&delta.name);
            if delta.team.is_playing() {
                stats.team = delta.team;
            }
            add_delta(stats, delta);
        }

        for steam_id in clutch_winners(round) {
            if let Some(stats) = per_player_stats.get_mut(steam_id) {
                stats.clutches_won += 1;
            }
        }
    }

    let total_rounds = rounds.len() as f64;
    for stats in per_player_stats.values_mut() {
        stats.adr = stats.damage as f64 / total_rounds;
        stats.headshot_pct = percentage(stats.headshots, stats.kills);
        stats.accuracy = percentage(stats.shots_hit, stats.shots_fired).min(100.0);
        stats.kd_ratio = stats.kills as f64 / stats.deaths.max(1) as f64;
        stats.economy_efficiency = if stats.money_spent == 0 {
            0.0
        } else {
            stats.damage as f64 * 1000.0 / stats.money_spent as f64
        };
    }

    let duration_ticks = info.last_tick.saturating_sub(info.first_tick);
    let duration_seconds = if info.tick_rate == 0 {
        0.0
    } else {
        duration_ticks as f64 / info.tick_rate as f64
    };

    tracing::debug!(
        match_id = %info.match_id,
        rounds = rounds.len(),
        players = per_player_stats.len(),
        "Aggregated match"
    );

    Ok(MatchStatistics {
        match_id: info.match_id,
        map_name: info.map_name,
        tick_rate: info.tick_rate,
        duration_ticks,
        duration_seconds,
        team_scores,
        per_player_stats,
        rounds: rounds.to_vec(),
        head_to_head: crate::head_to_head::compute(rounds),
        warnings,
        diagnostics,
    })
}

fn add_delta(stats: &mut PlayerStats, delta: &PlayerRoundDelta) {
    if delta.played {
        stats.rounds_played += 1;
    }
    stats.kills = stats.kills.saturating_add(delta.kills);
    stats.deaths = stats.deaths.saturating_add(delta.deaths);
    stats.assists = stats.assists.saturating_add(delta.assists);
    stats.headshots = stats.headshots.saturating_add(delta.headshots);
    stats.damage = stats.damage.saturating_add(delta.damage);
    stats.utility_damage = stats.utility_damage.saturating_add(delta.utility_damage);
    stats.team_kills = stats.team_kills.saturating_add(delta.team_kills);
    stats.team_damage = stats.team_damage.saturating_add(delta.team_damage);
    stats.self_damage = stats.self_damage.saturating_add(delta.self_damage);
    stats.flash_assists = stats.flash_assists.saturating_add(delta.flash_assists);
    stats.shots_fired = stats.shots_fired.saturating_add(delta.shots_fired);
    stats.shots_hit = stats.shots_hit.saturating_add(delta.shots_hit);
    stats.money_spent = stats.money_spent.saturating_add(delta.money_spent);

    match delta.kills {
        0 | 1 => {}
        2 => stats.multi_kills.two += 1,
        3 => stats.multi_kills.three += 1,
        4 => stats.multi_kills.four += 1,
        _ => stats.multi_kills.five += 1,
    }
}

fn percentage(part: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 / total as f64 * 100.0
}

/// Players credited with a clutch in this round.
///
/// The deaths of each team are walked in `(tick, sequence)` order, the
/// player left alone when the living count first drops to one is the
/// candidate and is credited if their team wins, whether they survive or not.
/// A team that started the round with fewer than two players never clutches.
pub fn clutch_winners(round: &RoundSummary) -> Vec<&str> {
    if !round.winning_team.is_playing() {
        return Vec::new();
    }

    clutch_candidate(round, round.winning_team)
        .into_iter()
        .collect()
}

pub fn clutch_candidate(round: &RoundSummary, team: Team) -> Option<&str> {
    let members: Vec<&PlayerRoundDelta> = round
        .player_deltas
        .iter()
        .filter(|d| d.team == team && d.played)
        .collect();
    if members.len() < 2 {
        return None;
    }

    let mut deaths: Vec<DeathMark> = members.iter().filter_map(|d| d.death).collect();
    deaths.sort_unstable();

    let mut living = members.len();
    for mark in deaths {
        living -= 1;
        if living == 1 {
            return members
                .iter()
                .copied()
                .find(|d| d.death.map(|death| death > mark).unwrap_or(true))
                .map(|d| d.steam_id.as_str());
        }
    }

    None
}
