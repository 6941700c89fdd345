use std::collections::BTreeMap;

use common::demo_analysis::{HeadToHead, RoundEvent, RoundSummary};

/// Kills between every pair of opposing players, ordered by attacker then
/// victim steam id.
pub fn compute(rounds: &[RoundSummary]) -> Vec<HeadToHead> {
    let mut head_to_head = BTreeMap::<&str, BTreeMap<&str, u32>>::new();

    for round in rounds {
        for event in round.events.iter() {
            let kill = match event {
                RoundEvent::Killed(kill) => kill,
                _ => continue,
            };
            if kill.team_kill {
                continue;
            }

            let attacker = match kill.attacker.as_deref() {
                Some(a) if a != kill.victim => a,
                _ => continue,
            };

            let attacker_entry = head_to_head.entry(attacker).or_default();
            let victim_killed = attacker_entry.entry(kill.victim.as_str()).or_default();
            *victim_killed += 1;
        }
    }

    head_to_head
        .into_iter()
        .flat_map(|(attacker, victims)| {
            victims.into_iter().map(move |(victim, kills)| HeadToHead {
                attacker: attacker.to_owned(),
                victim: victim.to_owned(),
                kills,
            })
        })
        .collect()
}
