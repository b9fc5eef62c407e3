// ABOUTME: End-to-end player example
// ABOUTME: Connects to a server, negotiates a stream, and plays decoded audio through cpal

use clap::Parser;

use sendspin::audio::output::CpalOutput;
use sendspin::audio::AudioFormat;
use sendspin::config::Config;
use sendspin::protocol::messages::GoodbyeReason;
use sendspin::session::Session;

/// Connect to a Sendspin server and play the audio it streams.
#[derive(Parser, Debug)]
#[command(name = "player")]
#[command(about = "Connect to Sendspin server and play audio", long_about = None)]
struct Args {
    /// Base URL of the Sendspin server (http(s)://host)
    #[arg(short, long, default_value = "http://localhost:8927")]
    server: String,

    /// Client name advertised in client/hello
    #[arg(short, long, default_value = "Sendspin-RS Player")]
    name: String,

    /// Output sample rate requested from the audio device
    #[arg(long, default_value_t = 48_000)]
    sample_rate: u32,

    /// Output channel count requested from the audio device
    #[arg(long, default_value_t = 2)]
    channels: u8,
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

    let output_format = AudioFormat {
        sample_rate: args.sample_rate,
        channels: args.channels,
    };
    let output = CpalOutput::new(output_format)?;

    println!("Connecting to {}...", config.websocket_url()?);
    let mut session = Session::connect(config, output, None, None).await?;
    println!("Connected! Streaming until the server disconnects or Ctrl-C is pressed.");

    tokio::select! {
        result = session.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            println!("Ctrl-C received, disconnecting...");
            session.disconnect(GoodbyeReason::UserRequest).await?;
        }
    }

    Ok(())
}
