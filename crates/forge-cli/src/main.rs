use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use forge_core::{canonical_bytes, pow, Block};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "forge-cli")]
#[command(about = "Client and miner for a forge ledger node")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a transaction
    Submit {
        /// Node base URL (e.g. http://127.0.0.1:8080)
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        node: String,
        /// Sender
        #[arg(long)]
        sender: String,
        /// Recipient
        #[arg(long)]
        recipient: String,
        /// Amount
        #[arg(long)]
        amount: u64,
    },
    /// Print the full chain
    Chain {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        node: String,
    },
    /// Fetch the last block, search for a proof, and submit it
    Mine {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        node: String,
        /// How many blocks to forge before exiting
        #[arg(long, default_value_t = 1)]
        blocks: u32,
    },
}

#[derive(Serialize)]
struct TxBody {
    sender: String,
    recipient: String,
    amount: u64,
}

#[derive(Serialize)]
struct MineBody {
    id: String,
    proof: u64,
}

#[derive(Deserialize)]
struct LastBlockResponse {
    last_block: Block,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Submit { node, sender, recipient, amount } => {
            let body = TxBody { sender, recipient, amount };
            let client = reqwest::Client::new();
            let res = client
                .post(format!("{node}/transactions/new"))
                .json(&body)
                .send()
                .await?;
            let status = res.status();
            let body = res.text().await?;
            println!("status: {}", status);
            println!("{body}");
        }
        Command::Chain { node } => {
            let client = reqwest::Client::new();
            let chain: Value = client
                .get(format!("{node}/chain"))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            println!("{}", serde_json::to_string_pretty(&chain)?);
        }
        Command::Mine { node, blocks } => mine(node, blocks).await?,
    }
    Ok(())
}

/// Client-side mining loop: snapshot the node's last block, search for a
/// proof locally, submit it. A rejection just means another miner won the
/// round; re-fetch and try again.
async fn mine(node: String, blocks: u32) -> Result<()> {
    let client = reqwest::Client::new();
    let miner_id = hex::encode(rand::random::<[u8; 16]>());
    info!(%miner_id, "starting miner");

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    let mut forged = 0u32;
    while forged < blocks {
        let last: LastBlockResponse = client
            .get(format!("{node}/last_block"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("fetching last block")?;
        debug!(tip = last.last_block.index, "searching for a proof");

        let bytes = canonical_bytes(&last.last_block)?;
        let search_cancel = cancel.clone();
        let proof = tokio::task::spawn_blocking(move || pow::search(&bytes, &search_cancel))
            .await
            .context("proof search task failed")?;

        let Some(proof) = proof else {
            println!("mining cancelled");
            break;
        };

        let res = client
            .post(format!("{node}/mine"))
            .json(&MineBody { id: miner_id.clone(), proof })
            .send()
            .await?;
        let status = res.status();
        let body: Value = res.json().await?;
        if status.is_success() {
            forged += 1;
            println!(
                "forged block {} with proof {proof} ({forged}/{blocks})",
                body["block"]["index"]
            );
        } else {
            println!("node rejected proof {proof} ({status}): {}", body["message"]);
        }
    }
    Ok(())
}
