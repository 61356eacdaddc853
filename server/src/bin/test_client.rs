//! Scripted smoke client: connects, creates a room, submits a phrase
//! and prints every packet the server pushes back.
//!
//! Usage: `test_client [ADDR]` (default 127.0.0.1:8080)

use shared::{read_packet, write_packet, Packet};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".to_string());

    let mut stream = TcpStream::connect(&addr).await?;
    println!("connected to {}", addr);

    write_packet(
        &mut stream,
        &Packet::CreateRoom {
            room_code: "AB12".to_string(),
            player_name: "Lena".to_string(),
        },
    )
    .await?;

    write_packet(
        &mut stream,
        &Packet::SendPhrase {
            room_code: "AB12".to_string(),
            player_name: "Lena".to_string(),
            phrase: "jamais deux sans trois".to_string(),
        },
    )
    .await?;

    // RoomCreated, RoomUpdate, PhraseUpdate, plus anything else the
    // server decides to push before we give up.
    loop {
        match timeout(Duration::from_secs(2), read_packet(&mut stream)).await {
            Ok(Ok(packet)) => println!("<- {:?}", packet),
            Ok(Err(e)) => {
                println!("connection closed: {}", e);
                break;
            }
            Err(_) => break,
        }
    }

    Ok(())
}
