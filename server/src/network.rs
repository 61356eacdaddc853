//! TCP transport layer feeding the coordinator
//!
//! One reader and one writer task per connection. Readers decode
//! length-prefixed frames and forward them as [`ClientEvent`]s; writers
//! drain the per-connection outbound channel. All room state lives in a
//! single coordinator task consuming the shared event channel, so the
//! transport never touches the registry directly.

use crate::coordinator::{ClientEvent, Coordinator};
use log::{info, warn};
use shared::{read_packet, write_packet, ConnectionId, Packet};
use std::io::ErrorKind;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Accepts connections and wires each one to the coordinator.
pub struct Server {
    listener: TcpListener,
}

impl Server {
    pub async fn bind(addr: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("server listening on {}", listener.local_addr()?);
        Ok(Server { listener })
    }

    /// The actual bound address; useful when binding to port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop and the coordinator task until the process
    /// is stopped. Connection ids are allocated here and never reused.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ClientEvent>();

        // Single authority over room state: every event is processed
        // to completion before the next one is taken.
        tokio::spawn(async move {
            let mut coordinator = Coordinator::new();
            while let Some(event) = event_rx.recv().await {
                coordinator.handle_event(event);
            }
        });

        let mut next_id: ConnectionId = 1;
        loop {
            let (stream, addr) = self.listener.accept().await?;
            let id = next_id;
            next_id += 1;
            spawn_connection(id, addr, stream, event_tx.clone());
        }
    }
}

/// Splits the stream and spawns the per-connection reader and writer.
fn spawn_connection(
    id: ConnectionId,
    addr: SocketAddr,
    stream: TcpStream,
    event_tx: mpsc::UnboundedSender<ClientEvent>,
) {
    info!("connection {} accepted from {}", id, addr);

    let (mut reader, mut writer) = stream.into_split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Packet>();

    if event_tx
        .send(ClientEvent::Connected { id, sender: out_tx })
        .is_err()
    {
        return;
    }

    tokio::spawn(async move {
        while let Some(packet) = out_rx.recv().await {
            if let Err(e) = write_packet(&mut writer, &packet).await {
                warn!("connection {}: write failed: {}", id, e);
                break;
            }
        }
    });

    tokio::spawn(async move {
        loop {
            match read_packet(&mut reader).await {
                Ok(packet) => {
                    if event_tx.send(ClientEvent::Request { id, packet }).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    if e.kind() != ErrorKind::UnexpectedEof {
                        warn!("connection {}: read failed: {}", id, e);
                    }
                    break;
                }
            }
        }
        info!("connection {} closed", id);
        let _ = event_tx.send(ClientEvent::Disconnected { id });
    });
}
