//! Replays decoded events into the state of a match, round by round.

use std::collections::BTreeMap;

use common::demo_analysis::{
    Anomaly, AnomalyKind, DeathMark, Diagnostics, EconomySnapshot, KillRecord, PlayerRoundDelta,
    RoundEvent, RoundSummary, Team, TeamScores, WinReason,
};

use crate::economy::{BuyType, EconomyRules, Item};
use crate::event::{DemoEvent, EventPayload, GameEvent, PlayerId, PlayerInfo, Position};

pub const FULL_HEALTH: u8 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub steam_id: u64,
    pub name: String,
    pub team: Team,
    pub health: u8,
    pub armor: u8,
    pub money: u32,
    pub alive: bool,
    pub position: Option<Position>,
    /// Value of the equipment bought since the last death.
    pub equipment_value: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    Warmup,
    Live,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EconomyReason {
    Purchase(Item),
    KillReward(Item),
    RoundWin,
    LossBonus,
    PlantBonus,
    Halftime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EconomyEntry {
    pub tick: u32,
    pub round: u32,
    pub player: PlayerId,
    pub reason: EconomyReason,
    pub amount: i64,
    pub balance: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchState {
    /// Number of the round being played or about to be played.
    pub current_round: u32,
    pub phase: RoundPhase,
    pub team_scores: TeamScores,
    pub players: BTreeMap<PlayerId, PlayerState>,
    pub economy_log: Vec<EconomyEntry>,
}

impl MatchState {
    fn new() -> Self {
        Self {
            current_round: 1,
            phase: RoundPhase::Warmup,
            team_scores: TeamScores::default(),
            players: BTreeMap::new(),
            economy_log: Vec::new(),
        }
    }

    /// Adds `amount` to a player's money, capped by `max_money`.
    fn credit(
        &mut self,
        tick: u32,
        player: PlayerId,
        amount: u32,
        max_money: u32,
        reason: EconomyReason,
    ) {
        let round = self.current_round;
        let Some(state) = self.players.get_mut(&player) else {
            return;
        };

        let before = state.money;
        state.money = state.money.saturating_add(amount).min(max_money.max(before));

        self.economy_log.push(EconomyEntry {
            tick,
            round,
            player,
            reason,
            amount: state.money as i64 - before as i64,
            balance: state.money,
        });
    }

    fn living(&self, team: Team) -> usize {
        self.players
            .values()
            .filter(|p| p.team == team && p.alive)
            .count()
    }
}

/// Everything produced by a full replay.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub state: MatchState,
    pub rounds: Vec<RoundSummary>,
    pub anomalies: Vec<Anomaly>,
    pub diagnostics: Diagnostics,
    pub first_tick: u32,
    pub last_tick: u32,
}

struct RoundInProgress {
    number: u32,
    start_tick: u32,
    deltas: BTreeMap<PlayerId, PlayerRoundDelta>,
    events: Vec<RoundEvent>,
    bomb_planted: bool,
}

impl RoundInProgress {
    fn delta(
        &mut self,
        players: &BTreeMap<PlayerId, PlayerState>,
        id: PlayerId,
    ) -> Option<&mut PlayerRoundDelta> {
        let player = players.get(&id)?;
        Some(
            self.deltas
                .entry(id)
                .or_insert_with(|| new_delta(player, player.alive)),
        )
    }
}

fn new_delta(player: &PlayerState, played: bool) -> PlayerRoundDelta {
    PlayerRoundDelta {
        steam_id: player.steam_id.to_string(),
        name: player.name.clone(),
        team: player.team,
        played,
        start_money: player.money,
        end_money: player.money,
        equipment_value: player.equipment_value,
        ..Default::default()
    }
}

/// Deterministic state machine over the ordered event stream.
pub struct Reconstructor {
    rules: EconomyRules,
    state: MatchState,
    round: Option<RoundInProgress>,
    rounds: Vec<RoundSummary>,
    anomalies: Vec<Anomaly>,
    diagnostics: Diagnostics,
    loss_streaks: BTreeMap<Team, u32>,
    first_tick: Option<u32>,
    last_tick: u32,
}

impl Default for Reconstructor {
    fn default() -> Self {
        Self::new(EconomyRules::default())
    }
}

impl Reconstructor {
    pub fn new(rules: EconomyRules) -> Self {
        Self {
            rules,
            state: MatchState::new(),
            round: None,
            rounds: Vec::new(),
            anomalies: Vec::new(),
            diagnostics: Diagnostics::default(),
            loss_streaks: BTreeMap::new(),
            first_tick: None,
            last_tick: 0,
        }
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn rounds(&self) -> &[RoundSummary] {
        &self.rounds
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    /// Applies one event, returning the summary of the round it completed.
    pub fn apply(&mut self, event: DemoEvent) -> Option<&RoundSummary> {
        match event {
            DemoEvent::PlayerInfo(info) => {
                self.register(info);
                None
            }
            DemoEvent::Game(event) => self.apply_game(event),
        }
    }

    fn register(&mut self, info: PlayerInfo) {
        let start_money = self.rules.start_money;
        let player = self
            .state
            .players
            .entry(info.player)
            .or_insert_with(|| PlayerState {
                steam_id: info.steam_id,
                name: String::new(),
                team: Team::Unassigned,
                health: FULL_HEALTH,
                armor: 0,
                money: start_money,
                alive: true,
                position: None,
                equipment_value: 0,
            });

        tracing::trace!(player = info.player.0, name = %info.name, team = ?info.team, "Registered player");

        player.steam_id = info.steam_id;
        player.name = info.name;
        player.team = info.team;
    }

    fn anomaly(&mut self, kind: AnomalyKind, tick: u32, message: String) {
        tracing::warn!(?kind, tick, round = self.state.current_round, "{}", message);

        self.anomalies.push(Anomaly {
            kind,
            tick,
            round: self.state.current_round,
            message,
        });
    }

    fn known(&mut self, tick: u32, ids: &[Option<PlayerId>]) -> bool {
        let unknown = ids
            .iter()
            .flatten()
            .find(|id| !self.state.players.contains_key(*id))
            .copied();

        match unknown {
            Some(id) => {
                self.anomaly(
                    AnomalyKind::UnknownPlayer,
                    tick,
                    format!("event references unregistered player {}", id.0),
                );
                false
            }
            None => true,
        }
    }

    /// An optional participant that is not registered is reported and treated as absent.
    fn optional(&mut self, tick: u32, id: Option<PlayerId>) -> Option<PlayerId> {
        id.filter(|id| self.known(tick, &[Some(*id)]))
    }

    fn apply_game(&mut self, event: GameEvent) -> Option<&RoundSummary> {
        if event.tick < self.last_tick {
            self.diagnostics.out_of_order_events += 1;
            self.anomaly(
                AnomalyKind::OutOfOrderTick,
                event.tick,
                format!(
                    "event at tick {} arrived after tick {}",
                    event.tick, self.last_tick
                ),
            );
            return None;
        }
        self.last_tick = event.tick;
        self.first_tick.get_or_insert(event.tick);
        self.diagnostics.events += 1;

        let tick = event.tick;
        let sequence = event.sequence;
        let live = self.state.phase == RoundPhase::Live;

        match event.payload {
            EventPayload::RoundStart => {
                self.start_round(tick);
                None
            }
            EventPayload::RoundEnd { winner, reason } => self.end_round(tick, winner, reason),
            EventPayload::PlayerSpawn { player, team } => {
                self.spawn(tick, player, team);
                None
            }
            EventPayload::PlayerPosition { player, position } => {
                if let Some(state) = self.state.players.get_mut(&player) {
                    state.position = Some(position);
                }
                None
            }
            EventPayload::ItemPurchase { player, item, cost } => {
                self.purchase(tick, player, item, cost);
                None
            }
            _ if !live => {
                self.diagnostics.events_outside_round += 1;
                None
            }
            EventPayload::PlayerDeath {
                victim,
                attacker,
                assister,
                weapon,
                headshot,
                flash_assist,
            } => {
                self.death(
                    DeathMark { tick, sequence },
                    victim,
                    attacker,
                    assister,
                    weapon,
                    headshot,
                    flash_assist,
                );
                None
            }
            EventPayload::PlayerHurt {
                victim,
                attacker,
                weapon,
                health,
                armor,
                ..
            } => {
                self.hurt(tick, victim, attacker, weapon, health, armor);
                None
            }
            EventPayload::WeaponFire { player, weapon } => {
                if weapon.class().is_firearm() {
                    self.with_delta(tick, player, |d| {
                        d.shots_fired = d.shots_fired.saturating_add(1)
                    });
                }
                None
            }
            EventPayload::GrenadeThrown { player, .. } => {
                self.with_delta(tick, player, |d| {
                    d.grenades_thrown = d.grenades_thrown.saturating_add(1)
                });
                None
            }
            EventPayload::BombPlanted { player, site } => {
                self.bomb(tick, player, site, true);
                None
            }
            EventPayload::BombDefused { player, site } => {
                self.bomb(tick, player, site, false);
                None
            }
        }
    }

    fn with_delta(&mut self, tick: u32, player: PlayerId, f: impl FnOnce(&mut PlayerRoundDelta)) {
        if !self.known(tick, &[Some(player)]) {
            return;
        }
        if let Some(round) = self.round.as_mut() {
            if let Some(delta) = round.delta(&self.state.players, player) {
                f(delta);
            }
        }
    }

    fn start_round(&mut self, tick: u32) {
        if let Some(partial) = self.round.take() {
            self.anomaly(
                AnomalyKind::UnterminatedRound,
                tick,
                format!(
                    "round {} started at tick {} never ended, discarding it",
                    partial.number, partial.start_tick
                ),
            );
        }

        let deltas = self
            .state
            .players
            .iter()
            .filter(|(_, p)| p.team.is_playing())
            .map(|(id, p)| (*id, new_delta(p, p.alive)))
            .collect();

        tracing::debug!(round = self.state.current_round, tick, "Round started");

        self.state.phase = RoundPhase::Live;
        self.round = Some(RoundInProgress {
            number: self.state.current_round,
            start_tick: tick,
            deltas,
            events: Vec::new(),
            bomb_planted: false,
        });
    }

    fn spawn(&mut self, tick: u32, player: PlayerId, team: Team) {
        if !self.known(tick, &[Some(player)]) {
            return;
        }

        if let Some(state) = self.state.players.get_mut(&player) {
            state.alive = true;
            state.health = FULL_HEALTH;
            state.team = team;
        }

        if let Some(round) = self.round.as_mut() {
            if let Some(delta) = round.delta(&self.state.players, player) {
                delta.played = team.is_playing();
                delta.team = team;
            }
        }
    }

    fn purchase(&mut self, tick: u32, player: PlayerId, item: Item, cost: u16) {
        if !self.known(tick, &[Some(player)]) {
            return;
        }

        let round = self.state.current_round;
        let cost = cost as u32;
        let Some(state) = self.state.players.get_mut(&player) else {
            return;
        };

        let before = state.money;
        let overspent = cost > before;
        state.money = before.saturating_sub(cost);
        state.equipment_value = state.equipment_value.saturating_add(cost);
        let equipment_value = state.equipment_value;
        let balance = state.money;
        let name = state.name.clone();

        self.state.economy_log.push(EconomyEntry {
            tick,
            round,
            player,
            reason: EconomyReason::Purchase(item),
            amount: -(cost as i64),
            balance,
        });

        if self.state.phase == RoundPhase::Live {
            if let Some(round) = self.round.as_mut() {
                if let Some(delta) = round.delta(&self.state.players, player) {
                    delta.money_spent = delta.money_spent.saturating_add(cost);
                    delta.equipment_value = delta.equipment_value.max(equipment_value);
                }
            }
        }

        if overspent {
            self.anomaly(
                AnomalyKind::NegativeEconomy,
                tick,
                format!(
                    "{} bought {} for {} with only {} money",
                    name,
                    item.name(),
                    cost,
                    before
                ),
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn death(
        &mut self,
        mark: DeathMark,
        victim: PlayerId,
        attacker: Option<PlayerId>,
        assister: Option<PlayerId>,
        weapon: Item,
        headshot: bool,
        flash_assist: bool,
    ) {
        let tick = mark.tick;
        if !self.known(tick, &[Some(victim)]) {
            return;
        }
        let attacker = self.optional(tick, attacker);
        let assister = self.optional(tick, assister);

        let players = &self.state.players;
        let Some(victim_player) = players.get(&victim) else {
            return;
        };
        let victim_team = victim_player.team;
        let was_alive = victim_player.alive;
        let victim_steam = victim_player.steam_id.to_string();

        let attacker = attacker.and_then(|id| players.get(&id).map(|p| (id, p.team, p.steam_id)));
        let assister = assister
            .and_then(|id| players.get(&id).map(|p| (id, p.team, p.steam_id)))
            .filter(|(id, team, _)| *id != victim && *team != victim_team);

        if !was_alive {
            self.anomaly(
                AnomalyKind::DeadPlayerDied,
                tick,
                format!("player {} died while already dead", victim_steam),
            );
        }

        if let Some(state) = self.state.players.get_mut(&victim) {
            state.alive = false;
            state.health = 0;
            state.equipment_value = 0;
        }

        let suicide = attacker.map(|(id, _, _)| id == victim).unwrap_or(false);
        let team_kill = !suicide && attacker.map(|(_, team, _)| team == victim_team).unwrap_or(false);
        let enemy_kill = attacker.is_some() && !suicide && !team_kill;

        let Some(round) = self.round.as_mut() else {
            return;
        };
        let players = &self.state.players;

        if let Some(delta) = round.delta(players, victim) {
            delta.deaths = delta.deaths.saturating_add(1);
            delta.survived = false;
            delta.death = Some(mark);
        }

        if let Some((attacker_id, _, _)) = attacker {
            if let Some(delta) = round.delta(players, attacker_id) {
                if team_kill {
                    delta.team_kills = delta.team_kills.saturating_add(1);
                } else if enemy_kill {
                    delta.kills = delta.kills.saturating_add(1);
                    if headshot {
                        delta.headshots = delta.headshots.saturating_add(1);
                    }
                }
            }
        }

        if let Some((assister_id, _, _)) = assister {
            if let Some(delta) = round.delta(players, assister_id) {
                delta.assists = delta.assists.saturating_add(1);
                if flash_assist {
                    delta.flash_assists = delta.flash_assists.saturating_add(1);
                }
            }
        }

        round.events.push(RoundEvent::Killed(KillRecord {
            tick,
            sequence: mark.sequence,
            attacker: attacker.map(|(_, _, steam)| steam.to_string()),
            victim: victim_steam,
            assister: assister.map(|(_, _, steam)| steam.to_string()),
            weapon: weapon.name().to_owned(),
            headshot,
            flash_assist,
            team_kill,
        }));

        if enemy_kill {
            if let Some((attacker_id, _, _)) = attacker {
                let reward = weapon.info().kill_reward;
                self.state.credit(
                    tick,
                    attacker_id,
                    reward,
                    self.rules.max_money,
                    EconomyReason::KillReward(weapon),
                );
            }
        }
    }

    fn hurt(
        &mut self,
        tick: u32,
        victim: PlayerId,
        attacker: Option<PlayerId>,
        weapon: Item,
        health: u8,
        armor: u8,
    ) {
        if !self.known(tick, &[Some(victim)]) {
            return;
        }
        let attacker = self.optional(tick, attacker);

        let Some(victim_state) = self.state.players.get_mut(&victim) else {
            return;
        };
        let damage = victim_state.health.saturating_sub(health) as u32;
        victim_state.health = health;
        victim_state.armor = armor;
        let victim_team = victim_state.team;

        let Some(attacker) = attacker else {
            return;
        };
        let Some(attacker_team) = self.state.players.get(&attacker).map(|p| p.team) else {
            return;
        };
        let Some(round) = self.round.as_mut() else {
            return;
        };
        let Some(delta) = round.delta(&self.state.players, attacker) else {
            return;
        };

        if attacker == victim {
            delta.self_damage = delta.self_damage.saturating_add(damage);
        } else if attacker_team == victim_team {
            delta.team_damage = delta.team_damage.saturating_add(damage);
        } else {
            delta.damage = delta.damage.saturating_add(damage);
            if weapon.is_damaging_utility() {
                delta.utility_damage = delta.utility_damage.saturating_add(damage);
            }
            if weapon.class().is_firearm() {
                delta.shots_hit = delta.shots_hit.saturating_add(1);
            }
        }
    }

    fn bomb(&mut self, tick: u32, player: PlayerId, site: u8, planted: bool) {
        if !self.known(tick, &[Some(player)]) {
            return;
        }

        let steam_id = match self.state.players.get(&player) {
            Some(p) => p.steam_id.to_string(),
            None => return,
        };
        let Some(round) = self.round.as_mut() else {
            return;
        };

        if planted {
            round.bomb_planted = true;
            round.events.push(RoundEvent::BombPlanted {
                tick,
                player: steam_id,
                site,
            });
        } else {
            round.events.push(RoundEvent::BombDefused {
                tick,
                player: steam_id,
                site,
            });
        }
    }

    fn end_round(&mut self, tick: u32, winner: Team, reason: WinReason) -> Option<&RoundSummary> {
        let Some(mut round) = self.round.take() else {
            self.anomaly(
                AnomalyKind::RoundEndOutsideRound,
                tick,
                "round ended while no round was running".to_owned(),
            );
            return None;
        };
        self.state.phase = RoundPhase::Ended;

        let Some(loser) = winner.opponent() else {
            self.anomaly(
                AnomalyKind::InvalidWinner,
                tick,
                format!(
                    "round {} ended with winner {:?}, discarding it",
                    round.number, winner
                ),
            );
            return None;
        };

        let mut economy = EconomySnapshot::default();

        let win_reward = self.rules.win_reward(winner, reason);
        let max_streak = self.rules.max_loss_streak();
        let streak = self.loss_streaks.entry(loser).or_insert(0);
        *streak = (*streak + 1).min(max_streak);
        let loss_bonus = self.rules.loss_bonus(*streak);
        self.loss_streaks.insert(winner, 0);

        let plant_bonus = if loser == Team::T && round.bomb_planted {
            self.rules.plant_bonus
        } else {
            0
        };

        let ids: Vec<_> = self
            .state
            .players
            .iter()
            .filter(|(_, p)| p.team.is_playing())
            .map(|(id, p)| (*id, p.team))
            .collect();
        for (id, team) in ids {
            if team == winner {
                self.state
                    .credit(tick, id, win_reward, self.rules.max_money, EconomyReason::RoundWin);
            } else {
                self.state
                    .credit(tick, id, loss_bonus, self.rules.max_money, EconomyReason::LossBonus);
                if plant_bonus > 0 {
                    self.state.credit(
                        tick,
                        id,
                        plant_bonus,
                        self.rules.max_money,
                        EconomyReason::PlantBonus,
                    );
                }
            }
        }

        if let Some(team) = economy.team_mut(loser) {
            team.loss_bonus = loss_bonus;
        }

        for (id, delta) in round.deltas.iter_mut() {
            if let Some(state) = self.state.players.get(id) {
                delta.end_money = state.money;
                delta.survived = delta.played && state.alive;
            }
        }

        for team in [Team::CT, Team::T] {
            let members: Vec<_> = round
                .deltas
                .values()
                .filter(|d| d.team == team && d.played)
                .collect();
            let Some(entry) = economy.team_mut(team) else {
                continue;
            };

            entry.players = members.len() as u32;
            entry.money_spent = members.iter().map(|d| d.money_spent).sum();
            if !members.is_empty() {
                let count = members.len() as u32;
                entry.average_start_money = members.iter().map(|d| d.start_money).sum::<u32>() / count;
                entry.average_equipment_value =
                    members.iter().map(|d| d.equipment_value).sum::<u32>() / count;
            }
            for member in members.iter() {
                match BuyType::classify(member.equipment_value) {
                    BuyType::FullBuy => entry.full_buys += 1,
                    BuyType::PartialBuy => entry.partial_buys += 1,
                    BuyType::Save => entry.saves += 1,
                }
            }
        }

        self.state.team_scores.increment(winner);
        let completed = self.state.team_scores.total();
        self.state.current_round = completed + 1;

        tracing::debug!(
            round = round.number,
            ?winner,
            ?reason,
            ct = self.state.team_scores.ct,
            t = self.state.team_scores.t,
            ct_alive = self.state.living(Team::CT),
            t_alive = self.state.living(Team::T),
            "Round ended"
        );

        if self.rules.is_halftime(completed) {
            self.halftime(tick);
        }

        self.rounds.push(RoundSummary {
            round_number: round.number,
            winning_team: winner,
            end_reason: reason,
            start_tick: round.start_tick,
            end_tick: tick,
            player_deltas: round.deltas.into_values().collect(),
            events: round.events,
            economy_snapshot: economy,
        });

        self.rounds.last()
    }

    fn halftime(&mut self, tick: u32) {
        tracing::debug!(tick, "Halftime, resetting economy");

        self.loss_streaks.clear();

        let round = self.state.current_round;
        let start_money = self.rules.start_money;
        for (id, state) in self.state.players.iter_mut() {
            let before = state.money;
            state.money = start_money;
            state.equipment_value = 0;

            self.state.economy_log.push(EconomyEntry {
                tick,
                round,
                player: *id,
                reason: EconomyReason::Halftime,
                amount: start_money as i64 - before as i64,
                balance: start_money,
            });
        }
    }

    /// Closes the replay, discarding a round that never ended.
    pub fn finish(mut self) -> Reconstruction {
        if let Some(partial) = self.round.take() {
            self.anomaly(
                AnomalyKind::IncompleteRound,
                self.last_tick,
                format!(
                    "demo ended during round {} started at tick {}",
                    partial.number, partial.start_tick
                ),
            );
        }
        self.state.phase = RoundPhase::Ended;

        Reconstruction {
            state: self.state,
            rounds: self.rounds,
            anomalies: self.anomalies,
            diagnostics: self.diagnostics,
            first_tick: self.first_tick.unwrap_or(0),
            last_tick: self.last_tick,
        }
    }
}
