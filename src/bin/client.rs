use anyhow::Context;
use clap::{Parser, Subcommand};

use ringstore::{KvClient, KvMessage, StatusType};

#[derive(Parser)]
#[command(name = "ringstore-client")]
#[command(about = "Send requests to a ringstore node")]
#[command(version)]
struct Args {
    /// Node client address
    #[arg(long, default_value = "127.0.0.1:50000")]
    addr: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read a key
    Get { key: String },
    /// Write a key; the value may contain spaces
    Put {
        key: String,
        #[arg(required = true, num_args = 1..)]
        value: Vec<String>,
    },
    /// Delete a key
    Delete { key: String },
    /// Print the cluster partition table
    Keyrange,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut client = KvClient::connect(&args.addr)
        .await
        .with_context(|| format!("Failed to connect to {}", args.addr))?;

    let reply = match args.command {
        Command::Get { key } => client.get(&key).await?,
        Command::Put { key, value } => client.put(&key, &value.join(" ")).await?,
        Command::Delete { key } => client.delete(&key).await?,
        Command::Keyrange => client.keyrange().await?,
    };

    print_reply(&reply);
    Ok(())
}

fn print_reply(reply: &KvMessage) {
    if reply.status == StatusType::KeyrangeSuccess {
        println!("{}", reply.status);
        for entry in reply.key().split(';').filter(|e| !e.is_empty()) {
            println!("  {}", entry);
        }
    } else {
        println!("{}", reply);
    }
}
