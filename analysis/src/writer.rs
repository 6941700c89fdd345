//! Encoder for the demo format.

use std::io::Write;

use crate::event::{
    win_reason_code, EventPayload, PlayerId, PlayerInfo, DEATH_FLAG_FLASH_ASSIST, DEATH_FLAG_HEADSHOT,
    EVENT_BOMB_DEFUSED, EVENT_BOMB_PLANTED, EVENT_GRENADE_THROWN, EVENT_ITEM_PURCHASE,
    EVENT_PLAYER_DEATH, EVENT_PLAYER_HURT, EVENT_PLAYER_POSITION, EVENT_PLAYER_SPAWN,
    EVENT_ROUND_END, EVENT_ROUND_START, EVENT_WEAPON_FIRE, NO_PLAYER,
};
use crate::frame::{FrameKind, CMD_STOP, FORMAT_VERSION, MAGIC};

pub fn encode_header(tick_rate: u16, map_name: &str) -> Vec<u8> {
    let name = &map_name.as_bytes()[..map_name.len().min(u8::MAX as usize)];

    let mut buf = MAGIC.to_vec();
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&tick_rate.to_le_bytes());
    buf.push(name.len() as u8);
    buf.extend_from_slice(name);
    buf
}

pub fn encode_frame(kind: FrameKind, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() + 5);
    buf.push(kind.tag());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

fn player(buf: &mut Vec<u8>, id: PlayerId) {
    buf.extend_from_slice(&id.0.to_le_bytes());
}

fn optional_player(buf: &mut Vec<u8>, id: Option<PlayerId>) {
    buf.extend_from_slice(&id.map(|p| p.0).unwrap_or(NO_PLAYER).to_le_bytes());
}

/// Message payload for a single event.
pub fn encode_event(payload: &EventPayload) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);

    match payload {
        EventPayload::RoundStart => buf.push(EVENT_ROUND_START),
        EventPayload::RoundEnd { winner, reason } => {
            buf.push(EVENT_ROUND_END);
            buf.push(winner.code());
            buf.push(win_reason_code(*reason));
        }
        EventPayload::PlayerSpawn { player: p, team } => {
            buf.push(EVENT_PLAYER_SPAWN);
            player(&mut buf, *p);
            buf.push(team.code());
        }
        EventPayload::PlayerDeath {
            victim,
            attacker,
            assister,
            weapon,
            headshot,
            flash_assist,
        } => {
            buf.push(EVENT_PLAYER_DEATH);
            player(&mut buf, *victim);
            optional_player(&mut buf, *attacker);
            optional_player(&mut buf, *assister);
            buf.push(weapon.0);

            let mut flags = 0;
            if *headshot {
                flags |= DEATH_FLAG_HEADSHOT;
            }
            if *flash_assist {
                flags |= DEATH_FLAG_FLASH_ASSIST;
            }
            buf.push(flags);
        }
        EventPayload::PlayerHurt {
            victim,
            attacker,
            weapon,
            health_damage,
            armor_damage,
            health,
            armor,
        } => {
            buf.push(EVENT_PLAYER_HURT);
            player(&mut buf, *victim);
            optional_player(&mut buf, *attacker);
            buf.push(weapon.0);
            buf.extend_from_slice(&health_damage.to_le_bytes());
            buf.extend_from_slice(&armor_damage.to_le_bytes());
            buf.push(*health);
            buf.push(*armor);
        }
        EventPayload::WeaponFire { player: p, weapon } => {
            buf.push(EVENT_WEAPON_FIRE);
            player(&mut buf, *p);
            buf.push(weapon.0);
        }
        EventPayload::GrenadeThrown { player: p, grenade } => {
            buf.push(EVENT_GRENADE_THROWN);
            player(&mut buf, *p);
            buf.push(grenade.0);
        }
        EventPayload::BombPlanted { player: p, site } => {
            buf.push(EVENT_BOMB_PLANTED);
            player(&mut buf, *p);
            buf.push(*site);
        }
        EventPayload::BombDefused { player: p, site } => {
            buf.push(EVENT_BOMB_DEFUSED);
            player(&mut buf, *p);
            buf.push(*site);
        }
        EventPayload::ItemPurchase {
            player: p,
            item,
            cost,
        } => {
            buf.push(EVENT_ITEM_PURCHASE);
            player(&mut buf, *p);
            buf.push(item.0);
            buf.extend_from_slice(&cost.to_le_bytes());
        }
        EventPayload::PlayerPosition { player: p, position } => {
            buf.push(EVENT_PLAYER_POSITION);
            player(&mut buf, *p);
            buf.extend_from_slice(&position.x.to_le_bytes());
            buf.extend_from_slice(&position.y.to_le_bytes());
            buf.extend_from_slice(&position.z.to_le_bytes());
        }
    }

    buf
}

/// String table payload registering players.
pub fn encode_player_infos(infos: &[PlayerInfo]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(infos.len() as u16).to_le_bytes());

    for info in infos {
        let name = &info.name.as_bytes()[..info.name.len().min(u8::MAX as usize)];

        player(&mut buf, info.player);
        buf.extend_from_slice(&info.steam_id.to_le_bytes());
        buf.push(info.team.code());
        buf.push(name.len() as u8);
        buf.extend_from_slice(name);
    }

    buf
}

/// Streams a demo into any [`Write`].
pub struct DemoWriter<W> {
    inner: W,
}

impl<W: Write> DemoWriter<W> {
    pub fn new(mut inner: W, tick_rate: u16, map_name: &str) -> std::io::Result<Self> {
        inner.write_all(&encode_header(tick_rate, map_name))?;
        Ok(Self { inner })
    }

    pub fn frame(&mut self, kind: FrameKind, payload: &[u8]) -> std::io::Result<()> {
        self.inner.write_all(&encode_frame(kind, payload))
    }

    pub fn tick(&mut self, tick: u32) -> std::io::Result<()> {
        self.frame(FrameKind::Tick, &tick.to_le_bytes())
    }

    pub fn players(&mut self, infos: &[PlayerInfo]) -> std::io::Result<()> {
        self.frame(FrameKind::StringTable, &encode_player_infos(infos))
    }

    pub fn event(&mut self, payload: &EventPayload) -> std::io::Result<()> {
        self.frame(FrameKind::Message, &encode_event(payload))
    }

    /// Writes the stop command and hands back the inner writer.
    pub fn finish(mut self) -> std::io::Result<W> {
        self.frame(FrameKind::Command, &[CMD_STOP])?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// In memory demo builder for tests, benches and tooling.
#[derive(Debug, Clone)]
pub struct DemoBuilder {
    map_name: String,
    tick_rate: u16,
    body: Vec<u8>,
}

impl DemoBuilder {
    pub fn new(map_name: impl Into<String>) -> Self {
        Self {
            map_name: map_name.into(),
            tick_rate: 64,
            body: Vec::new(),
        }
    }

    pub fn with_tick_rate(mut self, tick_rate: u16) -> Self {
        self.tick_rate = tick_rate;
        self
    }

    pub fn player(
        &mut self,
        id: u16,
        steam_id: u64,
        name: &str,
        team: common::demo_analysis::Team,
    ) -> &mut Self {
        let info = PlayerInfo {
            player: PlayerId(id),
            steam_id,
            name: name.to_owned(),
            team,
        };
        self.raw_frame(FrameKind::StringTable, &encode_player_infos(&[info]))
    }

    pub fn at(&mut self, tick: u32) -> &mut Self {
        self.raw_frame(FrameKind::Tick, &tick.to_le_bytes())
    }

    pub fn event(&mut self, payload: EventPayload) -> &mut Self {
        self.raw_frame(FrameKind::Message, &encode_event(&payload))
    }

    pub fn raw_frame(&mut self, kind: FrameKind, payload: &[u8]) -> &mut Self {
        self.body.extend_from_slice(&encode_frame(kind, payload));
        self
    }

    /// Encoded size of the demo without the stop command.
    pub fn len(&self) -> usize {
        encode_header(self.tick_rate, &self.map_name).len() + self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Encodes the demo without the stop command, for truncation tests.
    pub fn build_unterminated(&self) -> Vec<u8> {
        let mut buf = encode_header(self.tick_rate, &self.map_name);
        buf.extend_from_slice(&self.body);
        buf
    }

    pub fn build(&self) -> Vec<u8> {
        let mut buf = self.build_unterminated();
        buf.extend_from_slice(&encode_frame(FrameKind::Command, &[CMD_STOP]));
        buf
    }
}
