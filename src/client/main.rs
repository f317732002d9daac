// src/client/main.rs

use clap::{Parser, Subcommand};
use serde::Serialize;

use checkkey::client::key_client::KeyClient;
use checkkey::client::responses::MessageReply;
use checkkey::errors::KeyResult;

/// Command-line client for a checkkey server.
#[derive(Debug, Parser)]
#[command(name = "checkkey_client", version, about, long_about = None)]
struct Cli {
    /// Base URL of the server
    #[arg(long, env = "CHECKKEY_SERVER_URL", default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Print raw JSON replies
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Mint new keys
    Create {
        /// Lease: 1DAY, 7DAY, 30DAY, 90DAY, 365DAY (or the day count)
        duration: String,
        /// Number of keys
        #[arg(default_value_t = 1)]
        count: u32,
        #[arg(long)]
        note: Option<String>,
    },
    /// Check a key for a device, binding it on first use
    Check { key: String, hwid: String },
    /// Lock a key
    Lock {
        key: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Unlock a key
    Unlock { key: String },
    /// Unbind the device of a key
    ResetHwid { key: String },
    /// Replace the lease of a key
    Renew { key: String, duration: String },
    /// Delete a key permanently
    Delete { key: String },
    /// List all keys
    List,
    /// Show the audit trail of a key
    History { key: String },
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to render reply: {e}"),
    }
}

fn report(reply: MessageReply, json: bool) -> bool {
    if json {
        print_json(&reply);
    } else {
        match &reply.expire_at {
            Some(expire_at) => println!("{} (expires {expire_at})", reply.message),
            None => println!("{}", reply.message),
        }
    }
    reply.success
}

async fn execute(cli: Cli) -> KeyResult<bool> {
    let client = KeyClient::new(cli.server);

    match cli.command {
        Command::Create {
            duration,
            count,
            note,
        } => {
            let reply = client.create(&duration, count, note.as_deref()).await?;
            if cli.json {
                print_json(&reply);
            } else {
                println!("{}", reply.message);
                for key in &reply.keys {
                    println!("{key}");
                }
            }
            Ok(reply.success)
        }
        Command::Check { key, hwid } => {
            let reply = client.check(&key, &hwid).await?;
            if cli.json {
                print_json(&reply);
            } else {
                match &reply.expire_at {
                    Some(expire_at) => println!("{} (expires {expire_at})", reply.msg),
                    None => println!("{}", reply.msg),
                }
            }
            Ok(reply.is_valid())
        }
        Command::List => {
            let reply = client.list().await?;
            if cli.json {
                print_json(&reply);
            } else if reply.data.is_empty() {
                println!("No keys.");
            } else {
                for (key, record) in &reply.data {
                    let state = match (record.locked, record.hwid.as_deref()) {
                        (true, _) => "locked".to_string(),
                        (false, Some(hwid)) => format!("bound to {hwid}"),
                        (false, None) => "unused".to_string(),
                    };
                    let lease = record
                        .duration
                        .map(|d| d.tag())
                        .unwrap_or_else(|| "perpetual".to_string());
                    println!("{key}  {lease}  {state}  {}", record.note);
                }
            }
            Ok(reply.success)
        }
        Command::History { key } => {
            let reply = client.history(&key).await?;
            if cli.json {
                print_json(&reply);
            } else {
                for event in &reply.data {
                    println!(
                        "{}  {:<10}  {:?}  {}",
                        event.time.to_rfc3339(),
                        event.action,
                        event.status,
                        event.note.as_deref().unwrap_or("")
                    );
                }
                println!("remaining: {}", reply.remaining);
            }
            Ok(reply.success)
        }
        Command::Lock { key, reason } => {
            Ok(report(client.lock(&key, reason.as_deref()).await?, cli.json))
        }
        Command::Unlock { key } => Ok(report(client.unlock(&key).await?, cli.json)),
        Command::ResetHwid { key } => Ok(report(client.reset_hwid(&key).await?, cli.json)),
        Command::Renew { key, duration } => {
            Ok(report(client.renew(&key, &duration).await?, cli.json))
        }
        Command::Delete { key } => Ok(report(client.delete(&key).await?, cli.json)),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match execute(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
