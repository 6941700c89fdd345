use std::collections::BTreeMap;

#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum Team {
    #[default]
    Unassigned,
    Spectator,
    T,
    CT,
}

impl Team {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Spectator,
            2 => Self::T,
            3 => Self::CT,
            _ => Self::Unassigned,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Unassigned => 0,
            Self::Spectator => 1,
            Self::T => 2,
            Self::CT => 3,
        }
    }

    /// Only T and CT take part in rounds.
    pub fn is_playing(self) -> bool {
        matches!(self, Self::T | Self::CT)
    }

    pub fn opponent(self) -> Option<Self> {
        match self {
            Self::T => Some(Self::CT),
            Self::CT => Some(Self::T),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TeamScores {
    #[serde(rename = "CT")]
    pub ct: u32,
    #[serde(rename = "T")]
    pub t: u32,
}

impl TeamScores {
    pub fn total(&self) -> u32 {
        self.ct + self.t
    }

    pub fn get(&self, team: Team) -> u32 {
        match team {
            Team::CT => self.ct,
            Team::T => self.t,
            _ => 0,
        }
    }

    pub fn increment(&mut self, team: Team) {
        match team {
            Team::CT => self.ct += 1,
            Team::T => self.t += 1,
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum WinReason {
    StillInProgress,
    BombExploded,
    VipEscaped,
    VipKilled,
    TSaved,
    CtStoppedEscape,
    RoundEndReasonTerroristsStopped,
    BombDefused,
    TKilled,
    CTKilled,
    Draw,
    HostageRescued,
    TimeRanOut,
    RoundEndReasonHostagesNotRescued,
    TerroristsNotEscaped,
    VipNotEscaped,
    GameStart,
    TSurrender,
    CTSurrender,
    TPlanted,
    CTReachedHostage,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillRecord {
    pub tick: u32,
    pub sequence: u64,
    pub attacker: Option<String>,
    pub victim: String,
    pub assister: Option<String>,
    pub weapon: String,
    pub headshot: bool,
    pub flash_assist: bool,
    pub team_kill: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RoundEvent {
    BombPlanted { tick: u32, player: String, site: u8 },
    BombDefused { tick: u32, player: String, site: u8 },
    Killed(KillRecord),
}

/// Position of a death inside the ordered event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct DeathMark {
    pub tick: u32,
    pub sequence: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRoundDelta {
    pub steam_id: String,
    pub name: String,
    pub team: Team,
    /// The player was alive for at least part of the live round.
    pub played: bool,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub headshots: u32,
    pub team_kills: u32,
    pub damage: u32,
    pub team_damage: u32,
    pub self_damage: u32,
    pub utility_damage: u32,
    pub shots_fired: u32,
    pub shots_hit: u32,
    pub flash_assists: u32,
    pub grenades_thrown: u32,
    pub money_spent: u32,
    pub start_money: u32,
    pub end_money: u32,
    pub equipment_value: u32,
    pub survived: bool,
    pub death: Option<DeathMark>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamEconomy {
    pub players: u32,
    pub average_start_money: u32,
    pub average_equipment_value: u32,
    pub money_spent: u32,
    pub full_buys: u32,
    pub partial_buys: u32,
    pub saves: u32,
    pub loss_bonus: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EconomySnapshot {
    #[serde(rename = "CT")]
    pub ct: TeamEconomy,
    #[serde(rename = "T")]
    pub t: TeamEconomy,
}

impl EconomySnapshot {
    pub fn team_mut(&mut self, team: Team) -> Option<&mut TeamEconomy> {
        match team {
            Team::CT => Some(&mut self.ct),
            Team::T => Some(&mut self.t),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSummary {
    pub round_number: u32,
    pub winning_team: Team,
    pub end_reason: WinReason,
    pub start_tick: u32,
    pub end_tick: u32,
    pub player_deltas: Vec<PlayerRoundDelta>,
    pub events: Vec<RoundEvent>,
    pub economy_snapshot: EconomySnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AnomalyKind {
    NegativeEconomy,
    OutOfOrderTick,
    UnknownPlayer,
    DeadPlayerDied,
    RoundEndOutsideRound,
    UnterminatedRound,
    IncompleteRound,
    InvalidWinner,
}

/// A recoverable inconsistency found while reconstructing the match.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub tick: u32,
    pub round: u32,
    pub message: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub frames: u64,
    pub events: u64,
    pub skipped_frames: u64,
    pub skipped_events: u64,
    pub out_of_order_events: u64,
    pub events_outside_round: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    #[default]
    NotRequested,
    Unavailable,
    Premier(u32),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MultiKills {
    #[serde(rename = "2k")]
    pub two: u32,
    #[serde(rename = "3k")]
    pub three: u32,
    #[serde(rename = "4k")]
    pub four: u32,
    #[serde(rename = "5k")]
    pub five: u32,
}

#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub name: String,
    pub team: Team,
    pub rounds_played: u32,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub headshots: u32,
    pub adr: f64,
    pub headshot_pct: f64,
    pub accuracy: f64,
    pub kd_ratio: f64,
    pub clutches_won: u32,
    pub utility_damage: u32,
    pub damage: u32,
    pub team_kills: u32,
    pub team_damage: u32,
    pub self_damage: u32,
    pub flash_assists: u32,
    pub shots_fired: u32,
    pub shots_hit: u32,
    pub multi_kills: MultiKills,
    pub money_spent: u32,
    pub economy_efficiency: f64,
    pub rank: Rank,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HeadToHead {
    pub attacker: String,
    pub victim: String,
    pub kills: u32,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStatistics {
    pub match_id: String,
    pub map_name: String,
    pub tick_rate: u16,
    pub duration_ticks: u32,
    pub duration_seconds: f64,
    pub team_scores: TeamScores,
    pub per_player_stats: BTreeMap<String, PlayerStats>,
    pub rounds: Vec<RoundSummary>,
    pub head_to_head: Vec<HeadToHead>,
    pub warnings: Vec<Anomaly>,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerHeatmap {
    pub steam_id: String,
    pub name: String,
    pub team: Team,
    pub png_data: String,
}
