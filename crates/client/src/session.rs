use std::collections::{HashMap, VecDeque};

use glam::Vec3;
use log::{debug, info, trace, warn};

use salvo::Identifier;
use salvo::net::{EntityKind, GameSession, Loadout, Message, MessageBody};

const FEED_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerInfo {
    pub name: String,
    pub loadout: Loadout,
    pub kills: u16,
    pub deaths: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityInfo {
    pub kind: EntityKind,
    pub position: Vec3,
    pub velocity: Vec3,
    pub heading: f32,
}

/// Client-side copy of what the server has told us about the world.
#[derive(Debug, Default)]
pub struct WorldMirror {
    players: HashMap<Identifier, PlayerInfo>,
    entities: HashMap<Identifier, EntityInfo>,
    chat: VecDeque<(Identifier, String)>,
    kill_feed: VecDeque<(Identifier, Identifier)>,
    collisions: u64,
    server_closed: bool,
}

impl WorldMirror {
    pub fn player(&self, id: Identifier) -> Option<&PlayerInfo> {
        self.players.get(&id)
    }

    pub fn players(&self) -> impl Iterator<Item = (&Identifier, &PlayerInfo)> {
        self.players.iter()
    }

    pub fn entities(&self) -> impl Iterator<Item = (&Identifier, &EntityInfo)> {
        self.entities.iter()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn chat(&self) -> impl Iterator<Item = &(Identifier, String)> {
        self.chat.iter()
    }

    pub fn kill_feed(&self) -> impl Iterator<Item = &(Identifier, Identifier)> {
        self.kill_feed.iter()
    }

    pub fn collisions(&self) -> u64 {
        self.collisions
    }

    /// The server sent a Disconnect of its own.
    pub fn server_closed(&self) -> bool {
        self.server_closed
    }

    fn name_of(&self, id: Identifier) -> String {
        self.players
            .get(&id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    fn push_bounded<T>(feed: &mut VecDeque<T>, item: T) {
        if feed.len() == FEED_LEN {
            feed.pop_front();
        }
        feed.push_back(item);
    }
}

impl GameSession for WorldMirror {
    fn dispatch(&mut self, message: Message) {
        match message.into_body() {
            MessageBody::Join { player, name } => {
                info!("{} joined", name);
                self.players.insert(
                    player,
                    PlayerInfo {
                        name,
                        loadout: Loadout::default(),
                        kills: 0,
                        deaths: 0,
                    },
                );
            }
            MessageBody::Leave { player } => match self.players.remove(&player) {
                Some(info) => info!("{} left", info.name),
                None => warn!("Leave for unknown player {}", player),
            },
            MessageBody::Chat { player, text } => {
                info!("<{}> {}", self.name_of(player), text);
                Self::push_bounded(&mut self.chat, (player, text));
            }
            MessageBody::Add {
                entity,
                kind,
                position,
            } => {
                debug!("Entity {} ({:?}) added at {}", entity, kind, position);
                self.entities.insert(
                    entity,
                    EntityInfo {
                        kind,
                        position,
                        velocity: Vec3::ZERO,
                        heading: 0.0,
                    },
                );
            }
            MessageBody::Remove { entity } => {
                if self.entities.remove(&entity).is_none() {
                    warn!("Remove for unknown entity {}", entity);
                }
            }
            MessageBody::Loadout { player, loadout } => {
                if let Some(info) = self.players.get_mut(&player) {
                    info.loadout = loadout;
                }
            }
            MessageBody::Name { player, name } => {
                if let Some(info) = self.players.get_mut(&player) {
                    info!("{} is now {}", info.name, name);
                    info.name = name;
                }
            }
            MessageBody::Stats {
                player,
                kills,
                deaths,
            } => {
                if let Some(info) = self.players.get_mut(&player) {
                    info.kills = kills;
                    info.deaths = deaths;
                }
            }
            MessageBody::Update {
                entity,
                position,
                velocity,
                heading,
            } => match self.entities.get_mut(&entity) {
                Some(info) => {
                    info.position = position;
                    info.velocity = velocity;
                    info.heading = heading;
                }
                None => trace!("Update for unknown entity {}", entity),
            },
            MessageBody::Collision { first, second, .. } => {
                trace!("Collision between {} and {}", first, second);
                self.collisions += 1;
            }
            MessageBody::Kill { killer, victim } => {
                info!("{} fragged {}", self.name_of(killer), self.name_of(victim));
                Self::push_bounded(&mut self.kill_feed, (killer, victim));
            }
            MessageBody::Disconnect => {
                info!("Server is closing the session");
                self.server_closed = true;
            }
            body => warn!("Unexpected {:?} in session", body.kind()),
        }
    }
}
