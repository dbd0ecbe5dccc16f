use std::io::Write;
use std::time::Duration;

use anyhow::{Result, bail};
use chat_client::{RelayClient, echo_increment};
use clap::Parser;
use core_types::Conversation;
use resilience::{Backoff, ReconnectPolicy};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lumen-chat")]
#[command(author, version, about = "Terminal client for the Lumen chat relay", long_about = None)]
struct Cli {
    /// Base URL of the relay server
    #[arg(short, long, env = "LUMEN_RELAY_URL", default_value = "http://127.0.0.1:3001")]
    relay_url: String,

    /// Reconnect attempts when the stream drops before completion
    #[arg(long, default_value_t = 3)]
    max_reconnects: u32,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Send a single prompt and exit
    prompt: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    let client = RelayClient::new(&cli.relay_url).with_policy(ReconnectPolicy {
        max_reconnects: cli.max_reconnects,
        backoff: Backoff::linear(Duration::from_secs(1)),
    });
    let mut conversation = Conversation::new();

    if let Some(prompt) = cli.prompt {
        if !turn(&client, &mut conversation, &prompt).await {
            bail!("no reply from {}", cli.relay_url);
        }
        return Ok(());
    }

    if !client.backend_online().await {
        eprintln!("warning: relay at {} reports the backend offline", cli.relay_url);
    }
    eprintln!("Type a message, /status to check the backend, /quit to exit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/status" => match client.status().await {
                Ok(status) => println!(
                    "online: {} (backend: {}, ollama: {}){}",
                    status.online,
                    status.backend_status.as_deref().unwrap_or("-"),
                    status.ollama_status.as_deref().unwrap_or("-"),
                    status.error.map(|e| format!(" {e}")).unwrap_or_default()
                ),
                Err(err) => println!("status unavailable: {err}"),
            },
            prompt => {
                turn(&client, &mut conversation, prompt).await;
            }
        }
    }
    Ok(())
}

/// Sends one user turn and prints the reply as it streams. Returns whether a
/// reply was committed to the conversation.
async fn turn(client: &RelayClient, conversation: &mut Conversation, prompt: &str) -> bool {
    conversation.push_user(prompt);
    let mut stdout = std::io::stdout();
    let reply = client
        .send(conversation, |text| echo_increment(&mut stdout, text))
        .await;
    println!();

    match reply {
        Ok(reply) => conversation.commit(reply).is_some(),
        Err(err) => {
            eprintln!("error: {err}");
            false
        }
    }
}
