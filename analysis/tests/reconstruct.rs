use analysis::economy::Item;
use analysis::event::{DemoEvent, EventPayload, EventStream, PlayerId};
use analysis::frame;
use analysis::reconstruct::{Reconstruction, Reconstructor, RoundPhase};
use common::demo_analysis::{AnomalyKind, RoundEvent, Team};
use pretty_assertions::assert_eq;
use tracing_test::traced_test;

mod fixtures;
use fixtures::{ALICE, BOB, CAROL, DAVE};

fn replay(bytes: &[u8]) -> Reconstruction {
    let frames = frame::decode(bytes).unwrap();
    let mut reconstructor = Reconstructor::default();
    for event in EventStream::new(frames) {
        reconstructor.apply(event.unwrap());
    }
    reconstructor.finish()
}

#[test]
fn two_round_scenario() {
    let result = replay(&fixtures::two_rounds());

    assert_eq!(2, result.rounds.len());
    assert_eq!(1, result.state.team_scores.ct);
    assert_eq!(1, result.state.team_scores.t);
    assert_eq!(3, result.state.current_round);
    assert_eq!(RoundPhase::Ended, result.state.phase);
    assert!(result.anomalies.is_empty());

    let first = &result.rounds[0];
    assert_eq!(Team::CT, first.winning_team);
    assert_eq!((0, 150), (first.start_tick, first.end_tick));

    let alice = first
        .player_deltas
        .iter()
        .find(|d| d.steam_id == fixtures::steam(ALICE))
        .unwrap();
    let bob = first
        .player_deltas
        .iter()
        .find(|d| d.steam_id == fixtures::steam(BOB))
        .unwrap();
    assert_eq!(1, alice.kills);
    assert_eq!(1, bob.deaths);
    assert!(!bob.survived);
    assert_eq!(Some(100), bob.death.map(|d| d.tick));

    assert!(matches!(
        first.events.as_slice(),
        [RoundEvent::Killed(kill)] if kill.attacker == Some(fixtures::steam(ALICE)) && !kill.team_kill
    ));
    assert!(result.rounds[1].events.is_empty());
}

#[test]
#[traced_test]
fn overspend_is_clamped() {
    let mut builder = fixtures::lobby("de_inferno");
    builder
        .at(0)
        .event(EventPayload::RoundStart)
        .event(EventPayload::ItemPurchase {
            player: PlayerId(ALICE),
            item: Item::AWP,
            cost: 4750,
        })
        .at(50)
        .event(fixtures::round_end(Team::CT));
    let result = replay(&builder.build());

    assert_eq!(1, result.anomalies.len());
    assert_eq!(AnomalyKind::NegativeEconomy, result.anomalies[0].kind);

    let alice = &result.rounds[0].player_deltas[0];
    assert_eq!(4750, alice.money_spent);
    assert_eq!(800, alice.start_money);
    // Clamped to zero, then the loss bonus was paid
    assert_eq!(1400, alice.end_money);
    assert_eq!(1, result.rounds[0].economy_snapshot.t.full_buys);

    assert!(logs_contain("bought awp"));
}

#[test]
fn money_is_zero_after_overspend() {
    let mut builder = fixtures::lobby("de_inferno");
    builder.at(0).event(EventPayload::ItemPurchase {
        player: PlayerId(BOB),
        item: Item::VEST_HELMET,
        cost: 1000,
    });
    let result = replay(&builder.build());

    assert_eq!(0, result.state.players[&PlayerId(BOB)].money);
    assert_eq!(AnomalyKind::NegativeEconomy, result.anomalies[0].kind);
}

#[test]
fn out_of_order_ticks_are_discarded() {
    let mut builder = fixtures::lobby("de_overpass");
    builder
        .at(0)
        .event(EventPayload::RoundStart)
        .at(100)
        .event(fixtures::kill(ALICE, BOB, Item::AK47, true))
        .at(50)
        .event(fixtures::kill(DAVE, CAROL, Item::M4A1, false))
        .at(200)
        .event(fixtures::round_end(Team::T));
    let result = replay(&builder.build());

    assert_eq!(1, result.diagnostics.out_of_order_events);
    assert_eq!(AnomalyKind::OutOfOrderTick, result.anomalies[0].kind);

    let carol = result.rounds[0]
        .player_deltas
        .iter()
        .find(|d| d.steam_id == fixtures::steam(CAROL))
        .unwrap();
    assert_eq!(0, carol.deaths);
    assert!(carol.survived);
}

#[test]
fn damage_is_split_by_relation() {
    let mut builder = fixtures::lobby("de_anubis");
    builder
        .at(0)
        .event(EventPayload::RoundStart)
        .at(10)
        .event(EventPayload::PlayerHurt {
            victim: PlayerId(BOB),
            attacker: Some(PlayerId(ALICE)),
            weapon: Item::HE_GRENADE,
            health_damage: 40,
            armor_damage: 0,
            health: 60,
            armor: 0,
        })
        .event(EventPayload::PlayerHurt {
            victim: PlayerId(CAROL),
            attacker: Some(PlayerId(ALICE)),
            weapon: Item::GLOCK,
            health_damage: 20,
            armor_damage: 0,
            health: 80,
            armor: 0,
        })
        .event(EventPayload::PlayerHurt {
            victim: PlayerId(ALICE),
            attacker: Some(PlayerId(ALICE)),
            weapon: Item::MOLOTOV,
            health_damage: 15,
            armor_damage: 0,
            health: 85,
            armor: 0,
        })
        // Reported damage may exceed the remaining health
        .event(EventPayload::PlayerHurt {
            victim: PlayerId(BOB),
            attacker: Some(PlayerId(ALICE)),
            weapon: Item::AK47,
            health_damage: 110,
            armor_damage: 0,
            health: 0,
            armor: 0,
        })
        .at(20)
        .event(fixtures::round_end(Team::T));
    let result = replay(&builder.build());

    let alice = &result.rounds[0].player_deltas[0];
    assert_eq!(fixtures::steam(ALICE), alice.steam_id);
    assert_eq!(100, alice.damage);
    assert_eq!(40, alice.utility_damage);
    assert_eq!(20, alice.team_damage);
    assert_eq!(15, alice.self_damage);
    assert_eq!(1, alice.shots_hit);
}

#[test]
fn team_kill_and_suicide() {
    let mut builder = fixtures::lobby("de_nuke");
    builder
        .at(0)
        .event(EventPayload::RoundStart)
        .at(10)
        .event(fixtures::kill(ALICE, CAROL, Item::AK47, true))
        .event(fixtures::kill(BOB, BOB, Item::HE_GRENADE, false))
        .at(20)
        .event(fixtures::round_end(Team::CT));
    let result = replay(&builder.build());

    let deltas = &result.rounds[0].player_deltas;
    let alice = &deltas[0];
    assert_eq!(0, alice.kills);
    assert_eq!(0, alice.headshots);
    assert_eq!(1, alice.team_kills);

    let bob = &deltas[1];
    assert_eq!(0, bob.kills);
    assert_eq!(1, bob.deaths);

    // No kill reward for either
    assert_eq!(800 + 1400, result.state.players[&PlayerId(ALICE)].money);
    assert_eq!(800 + 3250, result.state.players[&PlayerId(BOB)].money);
}

#[test]
fn unterminated_and_incomplete_rounds() {
    let mut builder = fixtures::lobby("de_cache");
    builder
        .at(0)
        .event(EventPayload::RoundStart)
        .at(10)
        .event(fixtures::kill(ALICE, BOB, Item::AK47, false))
        .at(20)
        .event(EventPayload::RoundStart)
        .at(30)
        .event(fixtures::round_end(Team::T))
        .at(40)
        .event(EventPayload::RoundStart);
    let result = replay(&builder.build());

    let kinds: Vec<_> = result.anomalies.iter().map(|a| a.kind).collect();
    assert_eq!(
        vec![AnomalyKind::UnterminatedRound, AnomalyKind::IncompleteRound],
        kinds
    );
    assert_eq!(1, result.rounds.len());
    assert_eq!(1, result.rounds[0].round_number);
    assert_eq!(20, result.rounds[0].start_tick);
    assert_eq!(1, result.state.team_scores.total());
}

#[test]
fn round_end_without_start() {
    let mut builder = fixtures::lobby("de_cache");
    builder.at(5).event(fixtures::round_end(Team::CT));
    let result = replay(&builder.build());

    assert!(result.rounds.is_empty());
    assert_eq!(AnomalyKind::RoundEndOutsideRound, result.anomalies[0].kind);
    assert_eq!(0, result.state.team_scores.total());
}

#[test]
fn unknown_players_are_reported() {
    let mut builder = fixtures::lobby("de_cache");
    builder
        .at(0)
        .event(EventPayload::RoundStart)
        .event(fixtures::kill(ALICE, 99, Item::AK47, false))
        .at(5)
        .event(fixtures::round_end(Team::T));
    let result = replay(&builder.build());

    assert_eq!(AnomalyKind::UnknownPlayer, result.anomalies[0].kind);
    assert_eq!(0, result.rounds[0].player_deltas[0].kills);
}

#[test]
fn unknown_assister_keeps_the_kill() {
    let mut builder = fixtures::lobby("de_cache");
    builder
        .at(0)
        .event(EventPayload::RoundStart)
        .event(EventPayload::PlayerDeath {
            victim: PlayerId(BOB),
            attacker: Some(PlayerId(ALICE)),
            assister: Some(PlayerId(99)),
            weapon: Item::AK47,
            headshot: false,
            flash_assist: true,
        })
        .at(5)
        .event(fixtures::round_end(Team::T));
    let result = replay(&builder.build());

    let unknown: Vec<_> = result
        .anomalies
        .iter()
        .filter(|a| a.kind == AnomalyKind::UnknownPlayer)
        .collect();
    assert_eq!(1, unknown.len());
    assert!(!result.state.players[&PlayerId(BOB)].alive);

    let deltas = &result.rounds[0].player_deltas;
    let alice = deltas
        .iter()
        .find(|d| d.steam_id == fixtures::steam(ALICE))
        .unwrap();
    assert_eq!(1, alice.kills);
    let bob = deltas
        .iter()
        .find(|d| d.steam_id == fixtures::steam(BOB))
        .unwrap();
    assert_eq!(1, bob.deaths);
    assert_eq!(0, deltas.iter().map(|d| d.assists).sum::<u32>());

    let RoundEvent::Killed(kill) = &result.rounds[0].events[0] else {
        panic!("expected a kill, got {:?}", result.rounds[0].events[0]);
    };
    assert_eq!(None, kill.assister);
}

#[test]
fn unknown_attacker_still_kills_the_victim() {
    let mut builder = fixtures::lobby("de_cache");
    builder
        .at(0)
        .event(EventPayload::RoundStart)
        .event(fixtures::kill(99, BOB, Item::AK47, false))
        .at(5)
        .event(fixtures::round_end(Team::T));
    let result = replay(&builder.build());

    assert_eq!(AnomalyKind::UnknownPlayer, result.anomalies[0].kind);
    let bob = result.rounds[0]
        .player_deltas
        .iter()
        .find(|d| d.steam_id == fixtures::steam(BOB))
        .unwrap();
    assert_eq!(1, bob.deaths);
    assert_eq!(
        0,
        result.rounds[0]
            .player_deltas
            .iter()
            .map(|d| d.kills)
            .sum::<u32>()
    );
}

#[test]
fn spawn_revives() {
    let mut reconstructor = Reconstructor::default();
    let binding = fixtures::two_rounds();
    let frames = frame::decode(binding.as_slice()).unwrap();
    for event in EventStream::new(frames) {
        reconstructor.apply(event.unwrap());
    }
    assert!(!reconstructor.state().players[&PlayerId(BOB)].alive);

    reconstructor.apply(DemoEvent::Game(analysis::event::GameEvent {
        tick: 500,
        round: 3,
        sequence: 100,
        payload: EventPayload::PlayerSpawn {
            player: PlayerId(BOB),
            team: Team::CT,
        },
    }));
    let bob = &reconstructor.state().players[&PlayerId(BOB)];
    assert!(bob.alive);
    assert_eq!(100, bob.health);
}
