//! Room registry and per-room lifecycle rules
//!
//! This module owns the server-side mapping from room code to room
//! state, including:
//! - Room creation, join-order membership and teardown of empty rooms
//! - Host assignment and migration when the host departs
//! - The lobby -> started transition, gated on host authority
//! - Per-name phrase collection with last-write-wins semantics
//!
//! The registry is the single source of truth for room state. It is
//! exclusively owned by the coordinator task and never shared, so every
//! operation here runs to completion without interleaving.

use log::info;
use shared::{ConnectionId, ErrorKind, PlayerInfo};
use std::collections::HashMap;
use thiserror::Error;

/// Recoverable failures of registry operations. Each maps onto the wire
/// [`ErrorKind`] reported back to the offending connection; none of
/// them mutates shared state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("room {0} not found")]
    RoomNotFound(String),
    #[error("room {0} already exists")]
    RoomAlreadyExists(String),
    #[error("only the host can start the game")]
    NotHost,
    #[error("the game has already started")]
    AlreadyStarted,
    #[error("{0}")]
    InvalidInput(String),
}

impl RoomError {
    /// Wire-level classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RoomError::RoomNotFound(_) => ErrorKind::RoomNotFound,
            RoomError::RoomAlreadyExists(_) => ErrorKind::RoomAlreadyExists,
            RoomError::NotHost => ErrorKind::NotHost,
            RoomError::AlreadyStarted => ErrorKind::AlreadyStarted,
            RoomError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }
}

/// Outcome of removing a player from a room.
#[derive(Debug, PartialEq, Eq)]
pub enum Removal {
    /// The connection was not a member; nothing changed.
    NotMember,
    /// The last member left and the room was erased from the registry.
    Deleted,
    /// The room survives. `host_changed` is set when the departing
    /// player was host and the seat migrated to the next member.
    Updated { host_changed: bool },
}

/// One active game room.
///
/// Invariants upheld by the registry operations:
/// - `players` never contains two entries with the same connection id
/// - `host` is either `None` or the id of a current member
/// - `started` only ever flips from false to true
#[derive(Debug)]
pub struct Room {
    pub code: String,
    pub host: Option<ConnectionId>,
    pub players: Vec<PlayerInfo>,
    pub started: bool,
    /// Player name -> latest submitted phrase. Kept for the life of
    /// the room, including across member departures.
    pub phrases: HashMap<String, String>,
}

impl Room {
    fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            host: None,
            players: Vec::new(),
            started: false,
            phrases: HashMap::new(),
        }
    }

    /// Returns true if the connection is currently a member.
    pub fn contains(&self, conn_id: ConnectionId) -> bool {
        self.players.iter().any(|p| p.id == conn_id)
    }

    /// Connection ids of all current members, in join order.
    pub fn member_ids(&self) -> Vec<ConnectionId> {
        self.players.iter().map(|p| p.id).collect()
    }

    /// Lobby -> started transition, host-gated.
    ///
    /// A non-host caller is rejected with `NotHost` regardless of the
    /// current state; a repeated start from the host is rejected with
    /// `AlreadyStarted`. The transition never reverts.
    pub fn request_start(&mut self, conn_id: ConnectionId) -> Result<(), RoomError> {
        if self.host != Some(conn_id) {
            return Err(RoomError::NotHost);
        }
        if self.started {
            return Err(RoomError::AlreadyStarted);
        }
        self.started = true;
        Ok(())
    }
}

/// Owns every active room, keyed by normalized room code.
///
/// Constructed once at startup and handed to the coordinator; there is
/// no global instance. Callers are expected to pass codes and names
/// already normalized at the protocol boundary.
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
        }
    }

    /// Registers a new room with the creator as its sole member and
    /// host. Fails with `RoomAlreadyExists` if the code is taken;
    /// existing rooms are never silently overwritten.
    pub fn create_room(
        &mut self,
        code: &str,
        conn_id: ConnectionId,
        name: &str,
    ) -> Result<&Room, RoomError> {
        if self.rooms.contains_key(code) {
            return Err(RoomError::RoomAlreadyExists(code.to_string()));
        }

        let mut room = Room::new(code);
        room.players.push(PlayerInfo {
            id: conn_id,
            name: name.to_string(),
        });
        room.host = Some(conn_id);

        info!("room {} created by connection {} ({})", code, conn_id, name);
        Ok(self.rooms.entry(code.to_string()).or_insert(room))
    }

    /// Idempotent creation used by join-based flows: returns the
    /// existing room or registers an empty one with no host yet.
    pub fn get_or_create(&mut self, code: &str) -> &mut Room {
        self.rooms.entry(code.to_string()).or_insert_with(|| {
            info!("room {} created empty (join-based flow)", code);
            Room::new(code)
        })
    }

    /// Adds a player to an existing room.
    ///
    /// Joining twice with the same connection id is a no-op, so a
    /// client retrying a join cannot produce a duplicate entry. When
    /// the room has no host and `claim_host` is set, the joiner takes
    /// the host seat.
    pub fn add_player(
        &mut self,
        code: &str,
        conn_id: ConnectionId,
        name: &str,
        claim_host: bool,
    ) -> Result<&Room, RoomError> {
        let room = self
            .rooms
            .get_mut(code)
            .ok_or_else(|| RoomError::RoomNotFound(code.to_string()))?;

        if !room.contains(conn_id) {
            room.players.push(PlayerInfo {
                id: conn_id,
                name: name.to_string(),
            });
            if room.host.is_none() && claim_host {
                room.host = Some(conn_id);
            }
            info!("connection {} ({}) joined room {}", conn_id, name, code);
        }

        Ok(room)
    }

    /// Removes a player from a room, applying the downstream
    /// consequences in one step: the room is erased when it becomes
    /// empty, and the host seat migrates to the next member in join
    /// order when the host departs.
    pub fn remove_player(
        &mut self,
        code: &str,
        conn_id: ConnectionId,
    ) -> Result<Removal, RoomError> {
        {
            let room = self
                .rooms
                .get_mut(code)
                .ok_or_else(|| RoomError::RoomNotFound(code.to_string()))?;

            let before = room.players.len();
            room.players.retain(|p| p.id != conn_id);
            if room.players.len() == before {
                return Ok(Removal::NotMember);
            }

            if !room.players.is_empty() {
                let mut host_changed = false;
                if room.host == Some(conn_id) {
                    room.host = room.players.first().map(|p| p.id);
                    host_changed = true;
                    info!("room {}: host migrated to connection {:?}", code, room.host);
                }
                info!("connection {} left room {}", conn_id, code);
                return Ok(Removal::Updated { host_changed });
            }
        }

        self.rooms.remove(code);
        info!("room {} deleted (last member left)", code);
        Ok(Removal::Deleted)
    }

    /// Codes of every room currently tracking this connection.
    /// Canonically at most one, but the reconciler sweeps them all.
    pub fn rooms_containing(&self, conn_id: ConnectionId) -> Vec<String> {
        self.rooms
            .values()
            .filter(|room| room.contains(conn_id))
            .map(|room| room.code.clone())
            .collect()
    }

    /// Runs the lobby -> started transition for the given caller and
    /// returns the updated room for broadcasting.
    pub fn request_start(
        &mut self,
        code: &str,
        conn_id: ConnectionId,
    ) -> Result<&Room, RoomError> {
        let room = self
            .rooms
            .get_mut(code)
            .ok_or_else(|| RoomError::RoomNotFound(code.to_string()))?;
        room.request_start(conn_id)?;
        info!("room {} started by connection {}", code, conn_id);
        Ok(room)
    }

    /// Records a phrase for the given player name, overwriting any
    /// earlier submission under the same name. Not host-gated.
    pub fn record_phrase(
        &mut self,
        code: &str,
        name: &str,
        phrase: &str,
    ) -> Result<&Room, RoomError> {
        let room = self
            .rooms
            .get_mut(code)
            .ok_or_else(|| RoomError::RoomNotFound(code.to_string()))?;
        room.phrases.insert(name.to_string(), phrase.to_string());
        Ok(room)
    }

    pub fn get(&self, code: &str) -> Option<&Room> {
        self.rooms.get(code)
    }

    /// Number of active rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
