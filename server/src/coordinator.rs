//! Room session coordinator
//!
//! Single authority over the room registry. All connection events are
//! funneled through one [`ClientEvent`] channel and processed here one
//! at a time, so every room mutation is atomic and broadcasts always
//! reflect a consistent snapshot.
//!
//! The coordinator validates and normalizes inbound payloads once at
//! this boundary, applies the mutation through the registry, and then
//! pushes the resulting snapshot to every member's outbound channel.
//! Failures are reported only to the offending connection and never
//! fan out.

use crate::registry::{Removal, RoomError, RoomRegistry};
use log::{debug, info, warn};
use shared::{normalize_player_name, normalize_room_code, ConnectionId, Packet};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Events delivered to the coordinator by the network layer.
#[derive(Debug)]
pub enum ClientEvent {
    /// A new connection was accepted; `sender` is its outbound channel.
    Connected {
        id: ConnectionId,
        sender: mpsc::UnboundedSender<Packet>,
    },
    /// The connection sent a packet.
    Request { id: ConnectionId, packet: Packet },
    /// The transport dropped; triggers the disconnect reconciler.
    Disconnected { id: ConnectionId },
}

/// Owns the registry plus the outbound sender of every live connection.
pub struct Coordinator {
    registry: RoomRegistry,
    connections: HashMap<ConnectionId, mpsc::UnboundedSender<Packet>>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self {
            registry: RoomRegistry::new(),
            connections: HashMap::new(),
        }
    }

    /// Processes one event to completion. Never panics on bad input;
    /// every failure turns into a `RoomError` packet to the caller.
    pub fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Connected { id, sender } => {
                self.connections.insert(id, sender);
                debug!("connection {} registered with coordinator", id);
            }
            ClientEvent::Request { id, packet } => self.handle_request(id, packet),
            ClientEvent::Disconnected { id } => self.handle_disconnect(id),
        }
    }

    fn handle_request(&mut self, id: ConnectionId, packet: Packet) {
        match packet {
            Packet::CreateRoom {
                room_code,
                player_name,
            } => self.handle_create(id, &room_code, &player_name),
            Packet::JoinRoom {
                room_code,
                player_name,
                as_host,
            } => self.handle_join(id, &room_code, &player_name, as_host),
            Packet::StartGame { room_code } => self.handle_start(id, &room_code),
            Packet::SendPhrase {
                room_code,
                player_name,
                phrase,
            } => self.handle_phrase(id, &room_code, &player_name, &phrase),
            other => {
                warn!("connection {} sent unexpected packet: {:?}", id, other);
                self.send_error(
                    id,
                    &RoomError::InvalidInput("unexpected packet kind".to_string()),
                );
            }
        }
    }

    fn handle_create(&mut self, id: ConnectionId, room_code: &str, player_name: &str) {
        let (code, name) = match validate_inputs(room_code, player_name) {
            Ok(parts) => parts,
            Err(e) => return self.send_error(id, &e),
        };

        let result = self.registry.create_room(&code, id, &name).map(|room| {
            (
                Packet::RoomCreated {
                    room_code: room.code.clone(),
                    is_host: room.host == Some(id),
                    players: room.players.clone(),
                },
                room_update(room),
                room.member_ids(),
            )
        });

        match result {
            Ok((reply, update, members)) => {
                self.send_to(id, reply);
                self.broadcast(&members, &update);
            }
            Err(e) => self.send_error(id, &e),
        }
    }

    fn handle_join(&mut self, id: ConnectionId, room_code: &str, player_name: &str, as_host: bool) {
        let (code, name) = match validate_inputs(room_code, player_name) {
            Ok(parts) => parts,
            Err(e) => return self.send_error(id, &e),
        };

        // A host-claiming join may create the room; a plain join
        // requires the code to exist.
        if as_host {
            self.registry.get_or_create(&code);
        }

        let result = self.registry.add_player(&code, id, &name, as_host).map(|room| {
            (
                Packet::RoomJoined {
                    room_code: room.code.clone(),
                    is_host: room.host == Some(id),
                    players: room.players.clone(),
                },
                room_update(room),
                room.member_ids(),
            )
        });

        match result {
            Ok((reply, update, members)) => {
                self.send_to(id, reply);
                self.broadcast(&members, &update);
            }
            Err(e) => self.send_error(id, &e),
        }
    }

    fn handle_start(&mut self, id: ConnectionId, room_code: &str) {
        let code = normalize_room_code(room_code);
        if code.is_empty() {
            return self.send_error(id, &RoomError::InvalidInput("empty room code".to_string()));
        }

        let result = self.registry.request_start(&code, id).map(|room| {
            (
                room_update(room),
                Packet::GameStarted {
                    room_code: room.code.clone(),
                },
                room.member_ids(),
            )
        });

        match result {
            Ok((update, started, members)) => {
                self.broadcast(&members, &update);
                self.broadcast(&members, &started);
            }
            Err(e) => self.send_error(id, &e),
        }
    }

    fn handle_phrase(&mut self, id: ConnectionId, room_code: &str, player_name: &str, phrase: &str) {
        let (code, name) = match validate_inputs(room_code, player_name) {
            Ok(parts) => parts,
            Err(e) => return self.send_error(id, &e),
        };

        let result = self.registry.record_phrase(&code, &name, phrase).map(|room| {
            (
                Packet::PhraseUpdate {
                    room_code: room.code.clone(),
                    phrases: room.phrases.clone(),
                },
                room.member_ids(),
            )
        });

        match result {
            Ok((update, members)) => {
                debug!("room {}: phrase recorded for {}", code, name);
                self.broadcast(&members, &update);
            }
            Err(e) => self.send_error(id, &e),
        }
    }

    /// Disconnect reconciler: sweeps every room tracking the departed
    /// connection, applies removal with migration or teardown, and
    /// re-broadcasts surviving rooms so all members agree on the host.
    fn handle_disconnect(&mut self, id: ConnectionId) {
        self.connections.remove(&id);

        for code in self.registry.rooms_containing(id) {
            match self.registry.remove_player(&code, id) {
                Ok(Removal::Updated { host_changed }) => {
                    if host_changed {
                        info!("room {}: host departed, seat migrated", code);
                    }
                    let snapshot = self
                        .registry
                        .get(&code)
                        .map(|room| (room_update(room), room.member_ids()));
                    if let Some((update, members)) = snapshot {
                        self.broadcast(&members, &update);
                    }
                }
                Ok(Removal::Deleted) | Ok(Removal::NotMember) => {}
                // Lookup raced a deletion; nothing left to clean up.
                Err(RoomError::RoomNotFound(_)) => {}
                Err(e) => warn!("disconnect cleanup for room {} failed: {}", code, e),
            }
        }

        info!("connection {} reconciled after disconnect", id);
    }

    fn send_to(&self, id: ConnectionId, packet: Packet) {
        if let Some(sender) = self.connections.get(&id) {
            // A closed channel means the writer task is gone; the
            // disconnect event will clean up shortly.
            let _ = sender.send(packet);
        }
    }

    fn broadcast(&self, members: &[ConnectionId], packet: &Packet) {
        for member in members {
            self.send_to(*member, packet.clone());
        }
    }

    fn send_error(&self, id: ConnectionId, err: &RoomError) {
        debug!("connection {}: {}", id, err);
        self.send_to(
            id,
            Packet::RoomError {
                kind: err.kind(),
                message: err.to_string(),
            },
        );
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes the broadcast view of a room.
fn room_update(room: &crate::registry::Room) -> Packet {
    Packet::RoomUpdate {
        room_code: room.code.clone(),
        host_id: room.host,
        players: room.players.clone(),
        started: room.started,
    }
}

/// Boundary validation: normalize once, reject empty code or name.
fn validate_inputs(room_code: &str, player_name: &str) -> Result<(String, String), RoomError> {
    let code = normalize_room_code(room_code);
    if code.is_empty() {
        return Err(RoomError::InvalidInput("empty room code".to_string()));
    }
    let name = normalize_player_name(player_name);
    if name.is_empty() {
        return Err(RoomError::InvalidInput("empty player name".to_string()));
    }
    Ok((code, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ErrorKind;

    fn connect(coordinator: &mut Coordinator, id: ConnectionId) -> mpsc::UnboundedReceiver<Packet> {
        let (tx, rx) = mpsc::unbounded_channel();
        coordinator.handle_event(ClientEvent::Connected { id, sender: tx });
        rx
    }

    fn request(coordinator: &mut Coordinator, id: ConnectionId, packet: Packet) {
        coordinator.handle_event(ClientEvent::Request { id, packet });
    }

    fn create(coordinator: &mut Coordinator, id: ConnectionId, code: &str, name: &str) {
        request(
            coordinator,
            id,
            Packet::CreateRoom {
                room_code: code.to_string(),
                player_name: name.to_string(),
            },
        );
    }

    fn join(coordinator: &mut Coordinator, id: ConnectionId, code: &str, name: &str) {
        request(
            coordinator,
            id,
            Packet::JoinRoom {
                room_code: code.to_string(),
                player_name: name.to_string(),
                as_host: false,
            },
        );
    }

    fn recv(rx: &mut mpsc::UnboundedReceiver<Packet>) -> Packet {
        rx.try_recv().expect("expected a queued packet")
    }

    fn assert_silent(rx: &mut mpsc::UnboundedReceiver<Packet>) {
        assert!(rx.try_recv().is_err(), "expected no queued packet");
    }

    #[test]
    fn test_create_room_replies_and_broadcasts() {
        let mut coordinator = Coordinator::new();
        let mut rx = connect(&mut coordinator, 1);

        create(&mut coordinator, 1, "ab12", "  Lena ");

        match recv(&mut rx) {
            Packet::RoomCreated {
                room_code,
                is_host,
                players,
            } => {
                assert_eq!(room_code, "AB12");
                assert!(is_host);
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].name, "Lena");
            }
            other => panic!("expected RoomCreated, got {:?}", other),
        }

        match recv(&mut rx) {
            Packet::RoomUpdate {
                host_id, started, ..
            } => {
                assert_eq!(host_id, Some(1));
                assert!(!started);
            }
            other => panic!("expected RoomUpdate, got {:?}", other),
        }
        assert_silent(&mut rx);
    }

    #[test]
    fn test_create_duplicate_code_errors_only_caller() {
        let mut coordinator = Coordinator::new();
        let mut rx_a = connect(&mut coordinator, 1);
        let mut rx_b = connect(&mut coordinator, 2);

        create(&mut coordinator, 1, "AB12", "Lena");
        recv(&mut rx_a); // RoomCreated
        recv(&mut rx_a); // RoomUpdate

        create(&mut coordinator, 2, "AB12", "Nina");
        match recv(&mut rx_b) {
            Packet::RoomError { kind, .. } => assert_eq!(kind, ErrorKind::RoomAlreadyExists),
            other => panic!("expected RoomError, got {:?}", other),
        }
        // The member of the existing room hears nothing
        assert_silent(&mut rx_a);
    }

    #[test]
    fn test_join_broadcasts_to_all_members() {
        let mut coordinator = Coordinator::new();
        let mut rx_a = connect(&mut coordinator, 1);
        let mut rx_b = connect(&mut coordinator, 2);

        create(&mut coordinator, 1, "AB12", "Lena");
        recv(&mut rx_a);
        recv(&mut rx_a);

        join(&mut coordinator, 2, " ab12", "Nina");

        match recv(&mut rx_b) {
            Packet::RoomJoined {
                is_host, players, ..
            } => {
                assert!(!is_host);
                assert_eq!(players.len(), 2);
            }
            other => panic!("expected RoomJoined, got {:?}", other),
        }
        match recv(&mut rx_b) {
            Packet::RoomUpdate { players, .. } => assert_eq!(players.len(), 2),
            other => panic!("expected RoomUpdate, got {:?}", other),
        }
        match recv(&mut rx_a) {
            Packet::RoomUpdate {
                host_id, players, ..
            } => {
                assert_eq!(host_id, Some(1));
                assert_eq!(players.len(), 2);
            }
            other => panic!("expected RoomUpdate, got {:?}", other),
        }
    }

    #[test]
    fn test_join_unknown_room_rejected() {
        let mut coordinator = Coordinator::new();
        let mut rx = connect(&mut coordinator, 1);

        join(&mut coordinator, 1, "ZZ99", "Lena");
        match recv(&mut rx) {
            Packet::RoomError { kind, .. } => assert_eq!(kind, ErrorKind::RoomNotFound),
            other => panic!("expected RoomError, got {:?}", other),
        }
    }

    #[test]
    fn test_join_as_host_creates_room() {
        let mut coordinator = Coordinator::new();
        let mut rx = connect(&mut coordinator, 1);

        request(
            &mut coordinator,
            1,
            Packet::JoinRoom {
                room_code: "NEW1".to_string(),
                player_name: "Lena".to_string(),
                as_host: true,
            },
        );

        match recv(&mut rx) {
            Packet::RoomJoined { is_host, .. } => assert!(is_host),
            other => panic!("expected RoomJoined, got {:?}", other),
        }
    }

    #[test]
    fn test_idempotent_join_single_entry() {
        let mut coordinator = Coordinator::new();
        let mut rx = connect(&mut coordinator, 1);

        create(&mut coordinator, 1, "AB12", "Lena");
        recv(&mut rx);
        recv(&mut rx);

        join(&mut coordinator, 1, "AB12", "Lena");
        match recv(&mut rx) {
            Packet::RoomJoined { players, .. } => {
                assert_eq!(players.iter().filter(|p| p.id == 1).count(), 1);
                assert_eq!(players.len(), 1);
            }
            other => panic!("expected RoomJoined, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let mut coordinator = Coordinator::new();
        let mut rx = connect(&mut coordinator, 1);

        create(&mut coordinator, 1, "   ", "Lena");
        match recv(&mut rx) {
            Packet::RoomError { kind, .. } => assert_eq!(kind, ErrorKind::InvalidInput),
            other => panic!("expected RoomError, got {:?}", other),
        }

        create(&mut coordinator, 1, "AB12", " \t");
        match recv(&mut rx) {
            Packet::RoomError { kind, .. } => assert_eq!(kind, ErrorKind::InvalidInput),
            other => panic!("expected RoomError, got {:?}", other),
        }
        assert_silent(&mut rx);
    }

    #[test]
    fn test_start_by_guest_rejected_without_broadcast() {
        let mut coordinator = Coordinator::new();
        let mut rx_a = connect(&mut coordinator, 1);
        let mut rx_b = connect(&mut coordinator, 2);

        create(&mut coordinator, 1, "AB12", "Lena");
        recv(&mut rx_a);
        recv(&mut rx_a);
        join(&mut coordinator, 2, "AB12", "Nina");
        recv(&mut rx_b);
        recv(&mut rx_b);
        recv(&mut rx_a);

        request(
            &mut coordinator,
            2,
            Packet::StartGame {
                room_code: "AB12".to_string(),
            },
        );

        match recv(&mut rx_b) {
            Packet::RoomError { kind, .. } => assert_eq!(kind, ErrorKind::NotHost),
            other => panic!("expected RoomError, got {:?}", other),
        }
        // No state change leaked to the host
        assert_silent(&mut rx_a);
    }

    #[test]
    fn test_start_by_host_broadcasts_update_then_started() {
        let mut coordinator = Coordinator::new();
        let mut rx_a = connect(&mut coordinator, 1);
        let mut rx_b = connect(&mut coordinator, 2);

        create(&mut coordinator, 1, "AB12", "Lena");
        recv(&mut rx_a);
        recv(&mut rx_a);
        join(&mut coordinator, 2, "AB12", "Nina");
        recv(&mut rx_b);
        recv(&mut rx_b);
        recv(&mut rx_a);

        request(
            &mut coordinator,
            1,
            Packet::StartGame {
                room_code: "AB12".to_string(),
            },
        );

        for rx in [&mut rx_a, &mut rx_b] {
            match recv(rx) {
                Packet::RoomUpdate { started, .. } => assert!(started),
                other => panic!("expected RoomUpdate, got {:?}", other),
            }
            match recv(rx) {
                Packet::GameStarted { room_code } => assert_eq!(room_code, "AB12"),
                other => panic!("expected GameStarted, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_start_twice_rejected() {
        let mut coordinator = Coordinator::new();
        let mut rx = connect(&mut coordinator, 1);

        create(&mut coordinator, 1, "AB12", "Lena");
        recv(&mut rx);
        recv(&mut rx);

        let start = Packet::StartGame {
            room_code: "AB12".to_string(),
        };
        request(&mut coordinator, 1, start.clone());
        recv(&mut rx); // RoomUpdate
        recv(&mut rx); // GameStarted

        request(&mut coordinator, 1, start);
        match recv(&mut rx) {
            Packet::RoomError { kind, .. } => assert_eq!(kind, ErrorKind::AlreadyStarted),
            other => panic!("expected RoomError, got {:?}", other),
        }
        assert_silent(&mut rx);
    }

    #[test]
    fn test_phrase_broadcast_and_overwrite() {
        let mut coordinator = Coordinator::new();
        let mut rx_a = connect(&mut coordinator, 1);
        let mut rx_b = connect(&mut coordinator, 2);

        create(&mut coordinator, 1, "AB12", "Lena");
        recv(&mut rx_a);
        recv(&mut rx_a);
        join(&mut coordinator, 2, "AB12", "Nina");
        recv(&mut rx_b);
        recv(&mut rx_b);
        recv(&mut rx_a);

        let phrase = |text: &str| Packet::SendPhrase {
            room_code: "AB12".to_string(),
            player_name: "Nina".to_string(),
            phrase: text.to_string(),
        };

        request(&mut coordinator, 2, phrase("first"));
        recv(&mut rx_a);
        recv(&mut rx_b);

        request(&mut coordinator, 2, phrase("second"));
        for rx in [&mut rx_a, &mut rx_b] {
            match recv(rx) {
                Packet::PhraseUpdate { phrases, .. } => {
                    assert_eq!(phrases.len(), 1);
                    assert_eq!(phrases.get("Nina").map(String::as_str), Some("second"));
                }
                other => panic!("expected PhraseUpdate, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_disconnect_migrates_host_and_broadcasts_once() {
        let mut coordinator = Coordinator::new();
        let mut rx_a = connect(&mut coordinator, 1);
        let mut rx_b = connect(&mut coordinator, 2);

        create(&mut coordinator, 1, "AB12", "Lena");
        recv(&mut rx_a);
        recv(&mut rx_a);
        join(&mut coordinator, 2, "AB12", "Nina");
        recv(&mut rx_b);
        recv(&mut rx_b);
        recv(&mut rx_a);

        coordinator.handle_event(ClientEvent::Disconnected { id: 1 });

        match recv(&mut rx_b) {
            Packet::RoomUpdate {
                host_id, players, ..
            } => {
                assert_eq!(host_id, Some(2));
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].name, "Nina");
            }
            other => panic!("expected RoomUpdate, got {:?}", other),
        }
        // Exactly one broadcast for the reconciliation
        assert_silent(&mut rx_b);
    }

    #[test]
    fn test_disconnect_of_last_member_deletes_room() {
        let mut coordinator = Coordinator::new();
        let mut rx_a = connect(&mut coordinator, 1);

        create(&mut coordinator, 1, "AB12", "Lena");
        recv(&mut rx_a);
        recv(&mut rx_a);

        coordinator.handle_event(ClientEvent::Disconnected { id: 1 });

        // A later join sees the code as never used
        let mut rx_b = connect(&mut coordinator, 2);
        join(&mut coordinator, 2, "AB12", "Nina");
        match recv(&mut rx_b) {
            Packet::RoomError { kind, .. } => assert_eq!(kind, ErrorKind::RoomNotFound),
            other => panic!("expected RoomError, got {:?}", other),
        }
    }

    #[test]
    fn test_disconnect_without_membership_is_noop() {
        let mut coordinator = Coordinator::new();
        let mut rx_a = connect(&mut coordinator, 1);
        let _rx_b = connect(&mut coordinator, 2);

        create(&mut coordinator, 1, "AB12", "Lena");
        recv(&mut rx_a);
        recv(&mut rx_a);

        coordinator.handle_event(ClientEvent::Disconnected { id: 2 });
        assert_silent(&mut rx_a);
    }

    #[test]
    fn test_unexpected_packet_kind_rejected() {
        let mut coordinator = Coordinator::new();
        let mut rx = connect(&mut coordinator, 1);

        request(
            &mut coordinator,
            1,
            Packet::GameStarted {
                room_code: "AB12".to_string(),
            },
        );
        match recv(&mut rx) {
            Packet::RoomError { kind, .. } => assert_eq!(kind, ErrorKind::InvalidInput),
            other => panic!("expected RoomError, got {:?}", other),
        }
    }
}
