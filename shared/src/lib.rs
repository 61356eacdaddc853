//! Wire protocol shared between the room server, the test client and
//! the integration tests.
//!
//! Packets are bincode-encoded and carried over a persistent TCP
//! connection as length-prefixed frames (4-byte big-endian length
//! followed by the payload). [`read_packet`] and [`write_packet`] are
//! the only framing entry points so every binary speaks the same codec.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame. Room snapshots and phrase maps are
/// tiny; anything near this limit is a broken or hostile peer.
pub const MAX_FRAME_SIZE: u32 = 64 * 1024;

/// Identifies one client connection for its lifetime. A reconnecting
/// client always gets a fresh id and must re-join its room.
pub type ConnectionId = u32;

/// One member of a room, as seen in every broadcast snapshot.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub id: ConnectionId,
    pub name: String,
}

/// Machine-readable classification carried alongside every error
/// message, so clients can branch without parsing text.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    RoomNotFound,
    RoomAlreadyExists,
    NotHost,
    AlreadyStarted,
    InvalidInput,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    // client -> server
    CreateRoom {
        room_code: String,
        player_name: String,
    },
    JoinRoom {
        room_code: String,
        player_name: String,
        /// Claim the host seat if the room does not have one yet.
        /// Also switches the join to get-or-create semantics.
        as_host: bool,
    },
    StartGame {
        room_code: String,
    },
    SendPhrase {
        room_code: String,
        player_name: String,
        phrase: String,
    },

    // server -> client
    RoomCreated {
        room_code: String,
        is_host: bool,
        players: Vec<PlayerInfo>,
    },
    RoomJoined {
        room_code: String,
        is_host: bool,
        players: Vec<PlayerInfo>,
    },
    RoomUpdate {
        room_code: String,
        host_id: Option<ConnectionId>,
        players: Vec<PlayerInfo>,
        started: bool,
    },
    GameStarted {
        room_code: String,
    },
    PhraseUpdate {
        room_code: String,
        phrases: HashMap<String, String>,
    },
    RoomError {
        kind: ErrorKind,
        message: String,
    },
}

/// Canonical form of a room code: trimmed and uppercased. Lookup and
/// storage always use this form.
pub fn normalize_room_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Canonical form of a player name: trimmed, case preserved.
pub fn normalize_player_name(raw: &str) -> String {
    raw.trim().to_string()
}

/// Reads one length-prefixed packet from the stream.
///
/// Returns `UnexpectedEof` when the peer closed the connection between
/// frames, which callers treat as a normal disconnect.
pub async fn read_packet<R>(reader: &mut R) -> io::Result<Packet>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);

    if len == 0 || len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid frame length: {}", len),
        ));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;

    bincode::deserialize(&payload).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Writes one packet as a length-prefixed frame and flushes.
pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let payload =
        bincode::serialize(packet).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let len = payload.len() as u32;
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("packet too large: {} bytes", len),
        ));
    }

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await
}
