use analysis::economy::Item;
use analysis::event::{EventPayload, PlayerId, Position};
use analysis::writer::DemoBuilder;
use common::demo_analysis::{Team, WinReason};

fn main() {
    divan::main();
}

/// A synthetic match with ten players, positions every tick and a few kills
/// per round.
fn demo(rounds: u32) -> Vec<u8> {
    let mut builder = DemoBuilder::new("de_nuke");
    for id in 0..10u16 {
        let team = if id < 5 { Team::T } else { Team::CT };
        builder.player(id, 76561198000000000 + id as u64, &format!("player{}", id), team);
    }

    for round in 0..rounds {
        let base = round * 2000;
        builder.at(base);
        for id in 0..10u16 {
            let team = if id < 5 { Team::T } else { Team::CT };
            builder.event(EventPayload::PlayerSpawn {
                player: PlayerId(id),
                team,
            });
        }
        builder.event(EventPayload::RoundStart);

        for tick in 1..1000 {
            builder.at(base + tick);
            for id in 0..10u16 {
                builder.event(EventPayload::PlayerPosition {
                    player: PlayerId(id),
                    position: Position {
                        x: (tick as f32).sin() * 1000.0,
                        y: (id as f32) * 100.0,
                        z: 0.0,
                    },
                });
            }
        }

        for kill in 0..4u16 {
            builder.at(base + 1000 + kill as u32).event(EventPayload::PlayerDeath {
                victim: PlayerId(5 + kill),
                attacker: Some(PlayerId(kill)),
                assister: None,
                weapon: Item::AK47,
                headshot: kill % 2 == 0,
                flash_assist: false,
            });
        }

        builder.at(base + 1500).event(EventPayload::RoundEnd {
            winner: Team::T,
            reason: WinReason::CTKilled,
        });
    }

    builder.build()
}

#[divan::bench(args = [1, 8, 24])]
fn decode(bencher: divan::Bencher, rounds: u32) {
    let data = demo(rounds);

    bencher.bench(|| {
        let frames = analysis::frame::decode(divan::black_box(data.as_slice())).unwrap();
        analysis::event::EventStream::new(frames).count()
    });
}

#[divan::bench(args = [1, 8, 24])]
fn pipeline(bencher: divan::Bencher, rounds: u32) {
    let data = demo(rounds);
    let options = analysis::Options::default();

    bencher.bench(|| analysis::parse(divan::black_box(data.as_slice()), divan::black_box(&options)));
}

#[divan::bench(args = [1, 8, 24])]
fn heatmap(bencher: divan::Bencher, rounds: u32) {
    let data = demo(rounds);
    let options = analysis::Options {
        heatmap: Some(analysis::heatmap::Config { cell_size: 2.0 }),
        ..Default::default()
    };

    bencher.bench(|| analysis::parse(divan::black_box(data.as_slice()), divan::black_box(&options)));
}
