use std::io::{Read, Write};

use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::{Vec2, Vec3};

use super::error::WireError;
use super::protocol::{MAX_CHAT_LEN, MAX_NAME_LEN};
use super::wire::{WireRead, WireWrite};
use crate::id::Identifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transmission {
    Reliable,
    Unreliable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Connect = 0,
    Disconnect = 1,
    Join = 2,
    Leave = 3,
    Chat = 4,
    Add = 5,
    Remove = 6,
    Loadout = 7,
    Name = 8,
    Stats = 9,
    Input = 10,
    Collision = 11,
    Update = 12,
    Synced = 13,
    Full = 14,
    Kill = 15,
}

impl MessageKind {
    pub const ALL: [MessageKind; 16] = [
        Self::Connect,
        Self::Disconnect,
        Self::Join,
        Self::Leave,
        Self::Chat,
        Self::Add,
        Self::Remove,
        Self::Loadout,
        Self::Name,
        Self::Stats,
        Self::Input,
        Self::Collision,
        Self::Update,
        Self::Synced,
        Self::Full,
        Self::Kill,
    ];

    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn transmission(self) -> Transmission {
        match self {
            Self::Connect | Self::Disconnect | Self::Input | Self::Collision | Self::Update => {
                Transmission::Unreliable
            }
            Self::Join
            | Self::Leave
            | Self::Chat
            | Self::Add
            | Self::Remove
            | Self::Loadout
            | Self::Name
            | Self::Stats
            | Self::Synced
            | Self::Full
            | Self::Kill => Transmission::Reliable,
        }
    }

    #[inline]
    pub fn is_reliable(self) -> bool {
        self.transmission() == Transmission::Reliable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntityKind {
    Avatar = 0,
    Projectile = 1,
    Pickup = 2,
}

impl EntityKind {
    fn from_code(value: u8) -> Result<Self, WireError> {
        match value {
            0 => Ok(Self::Avatar),
            1 => Ok(Self::Projectile),
            2 => Ok(Self::Pickup),
            _ => Err(WireError::InvalidValue {
                field: "entity kind",
                value,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Loadout {
    #[default]
    Rifle = 0,
    Shotgun = 1,
    Launcher = 2,
}

impl Loadout {
    fn from_code(value: u8) -> Result<Self, WireError> {
        match value {
            0 => Ok(Self::Rifle),
            1 => Ok(Self::Shotgun),
            2 => Ok(Self::Launcher),
            _ => Err(WireError::InvalidValue {
                field: "loadout",
                value,
            }),
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InputButtons: u8 {
        const FORWARD = 1 << 0;
        const BACK = 1 << 1;
        const LEFT = 1 << 2;
        const RIGHT = 1 << 3;
        const FIRE = 1 << 4;
        const JUMP = 1 << 5;
    }
}

impl InputButtons {
    /// Unit-less movement intent on the ground plane (x = right, y = forward).
    pub fn move_axis(self) -> Vec2 {
        let mut axis = Vec2::ZERO;
        if self.contains(Self::FORWARD) {
            axis.y += 1.0;
        }
        if self.contains(Self::BACK) {
            axis.y -= 1.0;
        }
        if self.contains(Self::RIGHT) {
            axis.x += 1.0;
        }
        if self.contains(Self::LEFT) {
            axis.x -= 1.0;
        }
        axis.normalize_or_zero()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Connect {
        version: u16,
        name: String,
    },
    Disconnect,
    Join {
        player: Identifier,
        name: String,
    },
    Leave {
        player: Identifier,
    },
    Chat {
        player: Identifier,
        text: String,
    },
    Add {
        entity: Identifier,
        kind: EntityKind,
        position: Vec3,
    },
    Remove {
        entity: Identifier,
    },
    Loadout {
        player: Identifier,
        loadout: Loadout,
    },
    Name {
        player: Identifier,
        name: String,
    },
    Stats {
        player: Identifier,
        kills: u16,
        deaths: u16,
    },
    Input {
        buttons: InputButtons,
        aim: Vec2,
    },
    Collision {
        first: Identifier,
        second: Identifier,
        point: Vec3,
    },
    Update {
        entity: Identifier,
        position: Vec3,
        velocity: Vec3,
        heading: f32,
    },
    Synced,
    Full,
    Kill {
        killer: Identifier,
        victim: Identifier,
    },
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Connect { .. } => MessageKind::Connect,
            Self::Disconnect => MessageKind::Disconnect,
            Self::Join { .. } => MessageKind::Join,
            Self::Leave { .. } => MessageKind::Leave,
            Self::Chat { .. } => MessageKind::Chat,
            Self::Add { .. } => MessageKind::Add,
            Self::Remove { .. } => MessageKind::Remove,
            Self::Loadout { .. } => MessageKind::Loadout,
            Self::Name { .. } => MessageKind::Name,
            Self::Stats { .. } => MessageKind::Stats,
            Self::Input { .. } => MessageKind::Input,
            Self::Collision { .. } => MessageKind::Collision,
            Self::Update { .. } => MessageKind::Update,
            Self::Synced => MessageKind::Synced,
            Self::Full => MessageKind::Full,
            Self::Kill { .. } => MessageKind::Kill,
        }
    }

    fn encode_payload<W: Write>(&self, w: &mut W) -> Result<(), WireError> {
        match self {
            Self::Connect { version, name } => {
                w.write_u16::<LittleEndian>(*version)?;
                w.write_string(name, MAX_NAME_LEN)?;
            }
            Self::Disconnect | Self::Synced | Self::Full => {}
            Self::Join { player, name } | Self::Name { player, name } => {
                w.write_identifier(*player)?;
                w.write_string(name, MAX_NAME_LEN)?;
            }
            Self::Leave { player } => w.write_identifier(*player)?,
            Self::Chat { player, text } => {
                w.write_identifier(*player)?;
                w.write_string(text, MAX_CHAT_LEN)?;
            }
            Self::Add {
                entity,
                kind,
                position,
            } => {
                w.write_identifier(*entity)?;
                w.write_u8(*kind as u8)?;
                w.write_vec3(*position)?;
            }
            Self::Remove { entity } => w.write_identifier(*entity)?,
            Self::Loadout { player, loadout } => {
                w.write_identifier(*player)?;
                w.write_u8(*loadout as u8)?;
            }
            Self::Stats {
                player,
                kills,
                deaths,
            } => {
                w.write_identifier(*player)?;
                w.write_u16::<LittleEndian>(*kills)?;
                w.write_u16::<LittleEndian>(*deaths)?;
            }
            Self::Input { buttons, aim } => {
                w.write_u8(buttons.bits())?;
                w.write_vec2(*aim)?;
            }
            Self::Collision {
                first,
                second,
                point,
            } => {
                w.write_identifier(*first)?;
                w.write_identifier(*second)?;
                w.write_vec3(*point)?;
            }
            Self::Update {
                entity,
                position,
                velocity,
                heading,
            } => {
                w.write_identifier(*entity)?;
                w.write_vec3(*position)?;
                w.write_vec3(*velocity)?;
                w.write_f32::<LittleEndian>(*heading)?;
            }
            Self::Kill { killer, victim } => {
                w.write_identifier(*killer)?;
                w.write_identifier(*victim)?;
            }
        }
        Ok(())
    }

    fn decode_payload<R: Read>(kind: MessageKind, r: &mut R) -> Result<Self, WireError> {
        let body = match kind {
            MessageKind::Connect => Self::Connect {
                version: r.read_u16::<LittleEndian>()?,
                name: r.read_string(MAX_NAME_LEN)?,
            },
            MessageKind::Disconnect => Self::Disconnect,
            MessageKind::Join => Self::Join {
                player: r.read_identifier()?,
                name: r.read_string(MAX_NAME_LEN)?,
            },
            MessageKind::Leave => Self::Leave {
                player: r.read_identifier()?,
            },
            MessageKind::Chat => Self::Chat {
                player: r.read_identifier()?,
                text: r.read_string(MAX_CHAT_LEN)?,
            },
            MessageKind::Add => Self::Add {
                entity: r.read_identifier()?,
                kind: EntityKind::from_code(r.read_u8()?)?,
                position: r.read_vec3()?,
            },
            MessageKind::Remove => Self::Remove {
                entity: r.read_identifier()?,
            },
            MessageKind::Loadout => Self::Loadout {
                player: r.read_identifier()?,
                loadout: Loadout::from_code(r.read_u8()?)?,
            },
            MessageKind::Name => Self::Name {
                player: r.read_identifier()?,
                name: r.read_string(MAX_NAME_LEN)?,
            },
            MessageKind::Stats => Self::Stats {
                player: r.read_identifier()?,
                kills: r.read_u16::<LittleEndian>()?,
                deaths: r.read_u16::<LittleEndian>()?,
            },
            MessageKind::Input => Self::Input {
                buttons: InputButtons::from_bits_truncate(r.read_u8()?),
                aim: r.read_vec2()?,
            },
            MessageKind::Collision => Self::Collision {
                first: r.read_identifier()?,
                second: r.read_identifier()?,
                point: r.read_vec3()?,
            },
            MessageKind::Update => Self::Update {
                entity: r.read_identifier()?,
                position: r.read_vec3()?,
                velocity: r.read_vec3()?,
                heading: r.read_f32::<LittleEndian>()?,
            },
            MessageKind::Synced => Self::Synced,
            MessageKind::Full => Self::Full,
            MessageKind::Kill => Self::Kill {
                killer: r.read_identifier()?,
                victim: r.read_identifier()?,
            },
        };
        Ok(body)
    }
}

/// Per-message delivery metadata. Which variant a message carries is fixed
/// by its kind's transmission class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamp {
    Sequence(u32),
    Timestamp(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    stamp: Stamp,
    body: MessageBody,
}

impl Message {
    pub fn new(body: MessageBody) -> Self {
        let stamp = match body.kind().transmission() {
            Transmission::Reliable => Stamp::Sequence(0),
            Transmission::Unreliable => Stamp::Timestamp(0),
        };
        Self { stamp, body }
    }

    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    pub fn transmission(&self) -> Transmission {
        self.kind().transmission()
    }

    pub fn is_reliable(&self) -> bool {
        matches!(self.stamp, Stamp::Sequence(_))
    }

    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    pub fn into_body(self) -> MessageBody {
        self.body
    }

    pub fn stamp(&self) -> Stamp {
        self.stamp
    }

    pub fn sequence_number(&self) -> Option<u32> {
        match self.stamp {
            Stamp::Sequence(sequence) => Some(sequence),
            Stamp::Timestamp(_) => None,
        }
    }

    pub fn timestamp(&self) -> Option<u32> {
        match self.stamp {
            Stamp::Timestamp(timestamp) => Some(timestamp),
            Stamp::Sequence(_) => None,
        }
    }

    /// Ignored for unreliable messages.
    pub fn set_sequence_number(&mut self, sequence: u32) {
        if let Stamp::Sequence(current) = &mut self.stamp {
            *current = sequence;
        }
    }

    pub fn set_timestamp(&mut self, timestamp: u32) {
        if let Stamp::Timestamp(current) = &mut self.stamp {
            *current = timestamp;
        }
    }

    pub fn encode<W: Write>(&self, w: &mut W) -> Result<(), WireError> {
        w.write_u8(self.kind().code())?;
        if let Stamp::Sequence(sequence) = self.stamp {
            w.write_u32::<LittleEndian>(sequence)?;
        }
        self.body.encode_payload(w)
    }

    pub fn encode_to_vec(&self) -> Result<Vec<u8>, WireError> {
        let mut buf = Vec::with_capacity(32);
        self.encode(&mut buf)?;
        Ok(buf)
    }

    pub fn decode<R: Read>(r: &mut R) -> Result<Self, WireError> {
        let code = r.read_u8()?;
        let kind = MessageKind::from_code(code).ok_or(WireError::UnknownMessageType(code))?;
        let stamp = match kind.transmission() {
            Transmission::Reliable => Stamp::Sequence(r.read_u32::<LittleEndian>()?),
            Transmission::Unreliable => Stamp::Timestamp(0),
        };
        let body = MessageBody::decode_payload(kind, r)?;
        Ok(Self { stamp, body })
    }
}

impl From<MessageBody> for Message {
    fn from(body: MessageBody) -> Self {
        Self::new(body)
    }
}
