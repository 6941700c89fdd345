#![allow(dead_code)]

use analysis::economy::Item;
use analysis::event::{EventPayload, PlayerId};
use analysis::writer::DemoBuilder;
use common::demo_analysis::{Team, WinReason};

pub const ALICE: u16 = 1;
pub const BOB: u16 = 2;
pub const CAROL: u16 = 3;
pub const DAVE: u16 = 4;

pub fn steam_id(player: u16) -> u64 {
    76561198000000000 + player as u64
}

pub fn steam(player: u16) -> String {
    steam_id(player).to_string()
}

/// Alice and Carol play T, Bob and Dave play CT.
pub fn lobby(map: &str) -> DemoBuilder {
    let mut builder = DemoBuilder::new(map);
    builder
        .player(ALICE, steam_id(ALICE), "alice", Team::T)
        .player(BOB, steam_id(BOB), "bob", Team::CT)
        .player(CAROL, steam_id(CAROL), "carol", Team::T)
        .player(DAVE, steam_id(DAVE), "dave", Team::CT);
    builder
}

pub fn kill(attacker: u16, victim: u16, weapon: Item, headshot: bool) -> EventPayload {
    EventPayload::PlayerDeath {
        victim: PlayerId(victim),
        attacker: Some(PlayerId(attacker)),
        assister: None,
        weapon,
        headshot,
        flash_assist: false,
    }
}

pub fn round_end(winner: Team) -> EventPayload {
    let reason = match winner {
        Team::CT => WinReason::TKilled,
        _ => WinReason::CTKilled,
    };
    EventPayload::RoundEnd { winner, reason }
}

pub fn spawn_all(builder: &mut DemoBuilder) {
    for (player, team) in [(ALICE, Team::T), (BOB, Team::CT), (CAROL, Team::T), (DAVE, Team::CT)] {
        builder.event(EventPayload::PlayerSpawn {
            player: PlayerId(player),
            team,
        });
    }
}

/// Round 1: Alice kills Bob, CT wins. Round 2: no deaths, T wins.
pub fn two_rounds() -> Vec<u8> {
    let mut builder = lobby("de_dust2");
    builder
        .at(0)
        .event(EventPayload::RoundStart)
        .at(100)
        .event(kill(ALICE, BOB, Item::AK47, false))
        .at(150)
        .event(round_end(Team::CT))
        .at(200)
        .event(EventPayload::RoundStart)
        .at(400)
        .event(round_end(Team::T));
    builder.build()
}

/// `rounds` rounds, each with a kill, alternating winners.
pub fn many_rounds(rounds: u32) -> Vec<u8> {
    let mut builder = lobby("de_mirage");

    for round in 0..rounds {
        let base = round * 1000;
        builder.at(base);
        spawn_all(&mut builder);
        builder.event(EventPayload::RoundStart);

        let (killer, victim, winner) = if round % 2 == 0 {
            (ALICE, BOB, Team::T)
        } else {
            (DAVE, CAROL, Team::CT)
        };

        builder
            .at(base + 10)
            .event(EventPayload::WeaponFire {
                player: PlayerId(killer),
                weapon: Item::AK47,
            })
            .event(EventPayload::PlayerHurt {
                victim: PlayerId(victim),
                attacker: Some(PlayerId(killer)),
                weapon: Item::AK47,
                health_damage: 100,
                armor_damage: 0,
                health: 0,
                armor: 0,
            })
            .event(kill(killer, victim, Item::AK47, round % 3 == 0))
            .at(base + 500)
            .event(round_end(winner));
    }

    builder.build()
}
