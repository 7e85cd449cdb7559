//! msglog client binary
//!
//! Sends a single message with `--message`, otherwise reads lines from stdin
//! until CLOSE or end of input.

use clap::Parser;
use msglog::client::{self, Client};
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the message log client
#[derive(Parser, Debug)]
#[command(name = "msglog-client")]
#[command(version)]
#[command(about = "Simple TCP client for the msglog server", long_about = None)]
struct ClientArgs {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Send a single message and exit instead of starting interactive mode
    #[arg(short, long)]
    message: Option<String>,

    /// Connection timeout in seconds
    #[arg(long, default_value_t = 5)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = ClientArgs::parse();

    // Diagnostics go to stderr so they never mix with responses
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Some(message) = &args.message {
        if let Err(e) = client::validate_request(message) {
            eprintln!("Invalid message: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let addr = format!("{}:{}", args.host, args.port);
    let timeout = Duration::from_secs(args.timeout);

    let mut client = match Client::connect(&addr, timeout).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Could not connect to server: {}", e);
            return ExitCode::from(2);
        }
    };

    let result = match args.message {
        Some(message) => client.request(&message).await.map(|response| {
            println!("{}", response);
        }),
        None => {
            let stdin = BufReader::new(tokio::io::stdin());
            client::interactive(&mut client, stdin, tokio::io::stdout()).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
