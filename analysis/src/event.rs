//! Typed events decoded from the frames of a demo.

use std::collections::VecDeque;
use std::io::Read;

use common::demo_analysis::{Team, WinReason};

use crate::economy::Item;
use crate::frame::{DemoReader, FormatError, FrameKind, Header, RawFrame};

/// Player id used inside the demo, mapped to a steam id by the string table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub u16);

/// Encoded in place of a player id when there is none (world damage etc.).
pub const NO_PLAYER: u16 = 0xFFFF;

pub const EVENT_ROUND_START: u8 = 1;
pub const EVENT_ROUND_END: u8 = 2;
pub const EVENT_PLAYER_SPAWN: u8 = 3;
pub const EVENT_PLAYER_DEATH: u8 = 4;
pub const EVENT_PLAYER_HURT: u8 = 5;
pub const EVENT_WEAPON_FIRE: u8 = 6;
pub const EVENT_GRENADE_THROWN: u8 = 7;
pub const EVENT_BOMB_PLANTED: u8 = 8;
pub const EVENT_BOMB_DEFUSED: u8 = 9;
pub const EVENT_ITEM_PURCHASE: u8 = 10;
pub const EVENT_PLAYER_POSITION: u8 = 11;

pub const DEATH_FLAG_HEADSHOT: u8 = 0b01;
pub const DEATH_FLAG_FLASH_ASSIST: u8 = 0b10;

pub static ROUND_WIN_REASON: phf::Map<u8, WinReason> = phf::phf_map! {
    0_u8 => WinReason::StillInProgress,
    1_u8 => WinReason::BombExploded,
    2_u8 => WinReason::VipEscaped,
    3_u8 => WinReason::VipKilled,
    4_u8 => WinReason::TSaved,
    5_u8 => WinReason::CtStoppedEscape,
    6_u8 => WinReason::RoundEndReasonTerroristsStopped,
    7_u8 => WinReason::BombDefused,
    8_u8 => WinReason::TKilled,
    9_u8 => WinReason::CTKilled,
    10_u8 => WinReason::Draw,
    11_u8 => WinReason::HostageRescued,
    12_u8 => WinReason::TimeRanOut,
    13_u8 => WinReason::RoundEndReasonHostagesNotRescued,
    14_u8 => WinReason::TerroristsNotEscaped,
    15_u8 => WinReason::VipNotEscaped,
    16_u8 => WinReason::GameStart,
    17_u8 => WinReason::TSurrender,
    18_u8 => WinReason::CTSurrender,
    19_u8 => WinReason::TPlanted,
    20_u8 => WinReason::CTReachedHostage,
};

pub fn win_reason_code(reason: WinReason) -> u8 {
    ROUND_WIN_REASON
        .entries()
        .find(|(_, r)| **r == reason)
        .map(|(code, _)| *code)
        .unwrap_or(u8::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RoundStart,
    RoundEnd,
    PlayerSpawn,
    PlayerDeath,
    PlayerHurt,
    WeaponFire,
    GrenadeThrown,
    BombPlanted,
    BombDefused,
    ItemPurchase,
    PlayerPosition,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    RoundStart,
    RoundEnd {
        winner: Team,
        reason: WinReason,
    },
    PlayerSpawn {
        player: PlayerId,
        team: Team,
    },
    PlayerDeath {
        victim: PlayerId,
        attacker: Option<PlayerId>,
        assister: Option<PlayerId>,
        weapon: Item,
        headshot: bool,
        flash_assist: bool,
    },
    PlayerHurt {
        victim: PlayerId,
        attacker: Option<PlayerId>,
        weapon: Item,
        health_damage: u16,
        armor_damage: u16,
        /// Remaining health after the hit.
        health: u8,
        armor: u8,
    },
    WeaponFire {
        player: PlayerId,
        weapon: Item,
    },
    GrenadeThrown {
        player: PlayerId,
        grenade: Item,
    },
    BombPlanted {
        player: PlayerId,
        site: u8,
    },
    BombDefused {
        player: PlayerId,
        site: u8,
    },
    ItemPurchase {
        player: PlayerId,
        item: Item,
        cost: u16,
    },
    PlayerPosition {
        player: PlayerId,
        position: Position,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::RoundStart => EventKind::RoundStart,
            Self::RoundEnd { .. } => EventKind::RoundEnd,
            Self::PlayerSpawn { .. } => EventKind::PlayerSpawn,
            Self::PlayerDeath { .. } => EventKind::PlayerDeath,
            Self::PlayerHurt { .. } => EventKind::PlayerHurt,
            Self::WeaponFire { .. } => EventKind::WeaponFire,
            Self::GrenadeThrown { .. } => EventKind::GrenadeThrown,
            Self::BombPlanted { .. } => EventKind::BombPlanted,
            Self::BombDefused { .. } => EventKind::BombDefused,
            Self::ItemPurchase { .. } => EventKind::ItemPurchase,
            Self::PlayerPosition { .. } => EventKind::PlayerPosition,
        }
    }

    pub fn actor(&self) -> Option<PlayerId> {
        match self {
            Self::RoundStart | Self::RoundEnd { .. } => None,
            Self::PlayerDeath { attacker, .. } | Self::PlayerHurt { attacker, .. } => *attacker,
            Self::PlayerSpawn { player, .. }
            | Self::WeaponFire { player, .. }
            | Self::GrenadeThrown { player, .. }
            | Self::BombPlanted { player, .. }
            | Self::BombDefused { player, .. }
            | Self::ItemPurchase { player, .. }
            | Self::PlayerPosition { player, .. } => Some(*player),
        }
    }

    pub fn target(&self) -> Option<PlayerId> {
        match self {
            Self::PlayerDeath { victim, .. } | Self::PlayerHurt { victim, .. } => Some(*victim),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameEvent {
    pub tick: u32,
    /// Number of round starts seen so far, 0 before the first one.
    pub round: u32,
    /// Position in decode order, breaks ties between equal ticks.
    pub sequence: u64,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub player: PlayerId,
    pub steam_id: u64,
    pub name: String,
    pub team: Team,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DemoEvent {
    Game(GameEvent),
    PlayerInfo(PlayerInfo),
}

/// Turns frames into [`DemoEvent`]s, tracking the current tick and round.
pub struct EventStream<R> {
    frames: DemoReader<R>,
    tick: u32,
    round: u32,
    sequence: u64,
    pending: VecDeque<PlayerInfo>,
    skipped_events: u64,
}

impl<R: Read> EventStream<R> {
    pub fn new(frames: DemoReader<R>) -> Self {
        Self {
            frames,
            tick: 0,
            round: 0,
            sequence: 0,
            pending: VecDeque::new(),
            skipped_events: 0,
        }
    }

    pub fn header(&self) -> &Header {
        self.frames.header()
    }

    pub fn frames(&self) -> u64 {
        self.frames.frames()
    }

    pub fn skipped_frames(&self) -> u64 {
        self.frames.skipped()
    }

    /// Messages with an event type this decoder does not know.
    pub fn skipped_events(&self) -> u64 {
        self.skipped_events
    }

    fn handle_frame(&mut self, frame: RawFrame) -> Result<Option<GameEvent>, FormatError> {
        match frame.kind {
            FrameKind::Tick => {
                let mut cursor = Cursor::new(&frame.payload);
                self.tick = cursor.u32().ok_or(FormatError::MalformedFrame {
                    kind: frame.kind,
                    offset: frame.offset,
                })?;
                Ok(None)
            }
            FrameKind::StringTable => {
                let infos = decode_player_infos(&frame.payload).ok_or(
                    FormatError::MalformedFrame {
                        kind: frame.kind,
                        offset: frame.offset,
                    },
                )?;
                self.pending.extend(infos);
                Ok(None)
            }
            FrameKind::Message => {
                let event_type = match frame.payload.first() {
                    Some(t) => *t,
                    None => {
                        return Err(FormatError::MalformedFrame {
                            kind: frame.kind,
                            offset: frame.offset,
                        })
                    }
                };

                let payload = match decode_payload(event_type, &frame.payload[1..]) {
                    Decoded::Event(p) => p,
                    Decoded::Unknown => {
                        tracing::trace!(event_type, offset = frame.offset, "Skipping unknown event");
                        self.skipped_events += 1;
                        return Ok(None);
                    }
                    Decoded::Malformed => {
                        return Err(FormatError::MalformedEvent {
                            event_type,
                            offset: frame.offset,
                        })
                    }
                };

                if matches!(payload, EventPayload::RoundStart) {
                    self.round += 1;
                }

                let event = GameEvent {
                    tick: self.tick,
                    round: self.round,
                    sequence: self.sequence,
                    payload,
                };
                self.sequence += 1;

                Ok(Some(event))
            }
            FrameKind::Command | FrameKind::Unknown(_) => Ok(None),
        }
    }
}

impl<R: Read> Iterator for EventStream<R> {
    type Item = Result<DemoEvent, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(info) = self.pending.pop_front() {
                return Some(Ok(DemoEvent::PlayerInfo(info)));
            }

            let frame = match self.frames.next()? {
                Ok(f) => f,
                Err(e) => return Some(Err(e)),
            };

            match self.handle_frame(frame) {
                Ok(Some(event)) => return Some(Ok(DemoEvent::Game(event))),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

enum Decoded {
    Event(EventPayload),
    Unknown,
    Malformed,
}

fn decode_payload(event_type: u8, body: &[u8]) -> Decoded {
    let mut c = Cursor::new(body);

    let payload = match event_type {
        EVENT_ROUND_START => Some(EventPayload::RoundStart),
        EVENT_ROUND_END => (|| {
            Some(EventPayload::RoundEnd {
                winner: Team::from_code(c.u8()?),
                reason: ROUND_WIN_REASON
                    .get(&c.u8()?)
                    .copied()
                    .unwrap_or(WinReason::Unknown),
            })
        })(),
        EVENT_PLAYER_SPAWN => (|| {
            Some(EventPayload::PlayerSpawn {
                player: c.player()?,
                team: Team::from_code(c.u8()?),
            })
        })(),
        EVENT_PLAYER_DEATH => (|| {
            let victim = c.player()?;
            let attacker = c.optional_player()?;
            let assister = c.optional_player()?;
            let weapon = Item(c.u8()?);
            let flags = c.u8()?;
            Some(EventPayload::PlayerDeath {
                victim,
                attacker,
                assister,
                weapon,
                headshot: flags & DEATH_FLAG_HEADSHOT != 0,
                flash_assist: flags & DEATH_FLAG_FLASH_ASSIST != 0,
            })
        })(),
        EVENT_PLAYER_HURT => (|| {
            Some(EventPayload::PlayerHurt {
                victim: c.player()?,
                attacker: c.optional_player()?,
                weapon: Item(c.u8()?),
                health_damage: c.u16()?,
                armor_damage: c.u16()?,
                health: c.u8()?,
                armor: c.u8()?,
            })
        })(),
        EVENT_WEAPON_FIRE => (|| {
            Some(EventPayload::WeaponFire {
                player: c.player()?,
                weapon: Item(c.u8()?),
            })
        })(),
        EVENT_GRENADE_THROWN => (|| {
            Some(EventPayload::GrenadeThrown {
                player: c.player()?,
                grenade: Item(c.u8()?),
            })
        })(),
        EVENT_BOMB_PLANTED => (|| {
            Some(EventPayload::BombPlanted {
                player: c.player()?,
                site: c.u8()?,
            })
        })(),
        EVENT_BOMB_DEFUSED => (|| {
            Some(EventPayload::BombDefused {
                player: c.player()?,
                site: c.u8()?,
            })
        })(),
        EVENT_ITEM_PURCHASE => (|| {
            Some(EventPayload::ItemPurchase {
                player: c.player()?,
                item: Item(c.u8()?),
                cost: c.u16()?,
            })
        })(),
        EVENT_PLAYER_POSITION => (|| {
            Some(EventPayload::PlayerPosition {
                player: c.player()?,
                position: Position {
                    x: c.f32()?,
                    y: c.f32()?,
                    z: c.f32()?,
                },
            })
        })(),
        _ => return Decoded::Unknown,
    };

    match payload {
        Some(p) => Decoded::Event(p),
        None => Decoded::Malformed,
    }
}

fn decode_player_infos(body: &[u8]) -> Option<Vec<PlayerInfo>> {
    let mut c = Cursor::new(body);

    let count = c.u16()?;
    let mut infos = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let player = c.player()?;
        let steam_id = c.u64()?;
        let team = Team::from_code(c.u8()?);
        let name_len = c.u8()? as usize;
        let name = String::from_utf8_lossy(c.bytes(name_len)?).into_owned();

        infos.push(PlayerInfo {
            player,
            steam_id,
            name,
            team,
        });
    }

    Some(infos)
}

struct Cursor<'b> {
    buf: &'b [u8],
    pos: usize,
}

impl<'b> Cursor<'b> {
    fn new(buf: &'b [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn bytes(&mut self, n: usize) -> Option<&'b [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn array<const N: usize>(&mut self) -> Option<[u8; N]> {
        self.bytes(N)?.try_into().ok()
    }

    fn u8(&mut self) -> Option<u8> {
        self.array::<1>().map(|b| b[0])
    }

    fn u16(&mut self) -> Option<u16> {
        self.array().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Option<u32> {
        self.array().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Option<u64> {
        self.array().map(u64::from_le_bytes)
    }

    fn f32(&mut self) -> Option<f32> {
        self.array().map(f32::from_le_bytes)
    }

    fn player(&mut self) -> Option<PlayerId> {
        self.u16().map(PlayerId)
    }

    fn optional_player(&mut self) -> Option<Option<PlayerId>> {
        self.u16()
            .map(|id| if id == NO_PLAYER { None } else { Some(PlayerId(id)) })
    }
}
