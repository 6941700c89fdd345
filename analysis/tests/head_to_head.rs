use analysis::economy::Item;
use analysis::event::EventPayload;
use analysis::head_to_head;
use common::demo_analysis::{HeadToHead, Team};
use pretty_assertions::assert_eq;

mod fixtures;
use fixtures::{steam, ALICE, BOB, CAROL, DAVE};

#[test]
fn head_to_head_counts() {
    let mut builder = fixtures::lobby("de_nuke");
    builder
        .at(0)
        .event(EventPayload::RoundStart)
        .at(10)
        .event(fixtures::kill(ALICE, BOB, Item::AK47, false))
        .event(fixtures::kill(CAROL, ALICE, Item::AK47, false))
        .event(fixtures::kill(DAVE, DAVE, Item::HE_GRENADE, false))
        .at(20)
        .event(fixtures::round_end(Team::T))
        .at(30);
    fixtures::spawn_all(&mut builder);
    builder
        .event(EventPayload::RoundStart)
        .at(40)
        .event(fixtures::kill(ALICE, BOB, Item::AK47, true))
        .event(fixtures::kill(BOB, CAROL, Item::M4A1, false))
        .at(50)
        .event(fixtures::round_end(Team::CT));

    let output = analysis::parse(builder.build().as_slice(), &analysis::Options::default()).unwrap();

    let expected = vec![
        HeadToHead {
            attacker: steam(ALICE),
            victim: steam(BOB),
            kills: 2,
        },
        HeadToHead {
            attacker: steam(BOB),
            victim: steam(CAROL),
            kills: 1,
        },
    ];

    assert_eq!(expected, output.statistics.head_to_head);
    assert_eq!(expected, head_to_head::compute(&output.statistics.rounds));
}
