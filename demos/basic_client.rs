// ABOUTME: Basic example demonstrating WebSocket connection and handshake
// ABOUTME: Connects to server, sends client/hello, receives server/hello, then exits

use std::sync::Arc;

use clap::Parser;

use sendspin::config::Config;
use sendspin::protocol::client::ProtocolEngine;
use sendspin::protocol::transport::WsTransport;
use sendspin::state::NoopObserver;

#[derive(Parser, Debug)]
#[command(name = "basic_client")]
#[command(about = "Test connection to Sendspin server", long_about = None)]
struct Args {
    /// Base URL of the Sendspin server (http(s)://host)
    #[arg(short, long, default_value = "http://localhost:8927")]
    server: String,

    /// Client name
    #[arg(short, long, default_value = "Sendspin-RS Basic Client")]
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = Config {
        base_url: args.server.clone(),
        client_name: args.name,
        ..Config::default()
    };

    println!("Connecting to {}...", config.websocket_url()?);
    let transport = WsTransport::connect(&config.websocket_url()?).await?;
    let mut engine = ProtocolEngine::new(Box::new(transport), config, Arc::new(NoopObserver), None);

    let hello = engine.handshake().await?;
    println!("Connected! Server said hello: {} (v{})", hello.name, hello.version);

    Ok(())
}
