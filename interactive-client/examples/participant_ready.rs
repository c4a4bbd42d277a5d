//! Minimal participant client: connects, signals readiness, prints
//! whatever the server pushes.
//!
//! ```sh
//! cargo run -p interactive-client --example participant_ready -- ws://127.0.0.1:3000/socket
//! ```

use std::env;

use interactive_client::{Client, Role, SocketEvent};
use interactive_core::options::SocketOptions;
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    interactive_client::dev_tracing::init_tracing();

    let url = env::args().nth(1).unwrap_or_else(|| "ws://127.0.0.1:3000/socket".to_string());

    let client = Client::connect(Role::Participant, url, SocketOptions::new());
    let mut events = client.subscribe();

    let result = client.execute("ready", json!({"isReady": true})).await?;
    println!("ready acked: {result}");

    while let Ok(event) = events.recv().await {
        match event {
            SocketEvent::Push(push) => println!("push: {} {}", push.method, push.params),
            SocketEvent::Error(err) => eprintln!("socket error: {err:?}"),
            SocketEvent::Close { code, reason } => println!("closed: {code} {reason}"),
            SocketEvent::Open => println!("reconnected"),
        }
    }

    Ok(())
}
