#![forbid(unsafe_code)]
//! VeriCite command line: run the ledger service or inspect a stored chain.

use clap::{Parser, Subcommand};
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Color as TableColor;
use comfy_table::{Attribute, Cell, ContentArrangement, Table};
use std::path::PathBuf;
use vericite::config::{load_config_from, Config, DEFAULT_CONFIG_PATH};
use vericite::persistence::open_backend;
use vericite::{Block, Chain, Ledger, MineOutcome, SourceEntry};

#[derive(Parser)]
#[command(name = "vericite", about = "VeriCite source verification ledger")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API and explorer
    Serve,
    /// Print the stored chain as a table
    Show,
    /// Re-verify hashes, linkage and proof-of-work of the stored chain
    Verify,
    /// Record one source immediately: submit it and mine its block
    Record {
        #[arg(long)]
        url: String,
        #[arg(long)]
        hash_summary: String,
        #[arg(long)]
        author: String,
        #[arg(long)]
        validator: String,
        /// Repeat for several tags
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn format_timestamp(millis: u64) -> String {
    i64::try_from(millis)
        .ok()
        .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

/// First 10 and last 6 characters of long hashes. Counts chars, not bytes,
/// since unverified storage may hold anything.
fn short_hash(hash: &str) -> String {
    let chars: Vec<char> = hash.chars().collect();
    if chars.len() > 20 {
        let head: String = chars[..10].iter().collect();
        let tail: String = chars[chars.len() - 6..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        hash.to_string()
    }
}

fn print_chain(blocks: &[Block]) {
    let header = ["Block", "Date", "URL", "Summary", "Author", "Validator", "Tags", "Nonce", "Hash"];

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.iter().map(|h| {
            Cell::new(h)
                .fg(TableColor::Cyan)
                .add_attribute(Attribute::Bold)
        }));

    for block in blocks {
        table.add_row(vec![
            Cell::new(format!("#{}", block.index)).fg(TableColor::White),
            Cell::new(format_timestamp(block.timestamp)).fg(TableColor::Grey),
            Cell::new(&block.url),
            Cell::new(&block.hash_summary),
            Cell::new(&block.author).fg(TableColor::Green),
            Cell::new(&block.validator).fg(TableColor::Green),
            Cell::new(block.tags.join(", ")),
            Cell::new(block.nonce),
            Cell::new(short_hash(&block.hash)).fg(TableColor::Yellow),
        ]);
    }

    println!("{}", table);
}

#[cfg(feature = "api")]
async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    use std::sync::Arc;
    use std::time::Duration;
    use vericite::Node;

    let node = Arc::new(Node::open(&config)?);
    let auto_miner = config
        .miner
        .auto_mine
        .then(|| node.spawn_auto_miner(Duration::from_millis(config.miner.interval_ms)));

    vericite::api::run_api_server(node, &config.api.host, config.api.port).await?;

    if let Some(task) = auto_miner {
        task.await?;
    }
    Ok(())
}

#[cfg(not(feature = "api"))]
async fn serve(_config: Config) -> Result<(), Box<dyn std::error::Error>> {
    Err("API feature not enabled in this build".into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config_from(&cli.config)?;
    init_logging(&config);

    match cli.command {
        Command::Serve => serve(config).await?,
        Command::Show => {
            let chain = Chain::restore(
                config.ledger.difficulty,
                open_backend(&config.storage)?,
                false,
            )?;
            print_chain(chain.blocks());
            println!("{} block(s), difficulty {}", chain.len(), chain.difficulty());
        }
        Command::Verify => {
            let chain = Chain::restore(
                config.ledger.difficulty,
                open_backend(&config.storage)?,
                false,
            )?;
            match chain.verify() {
                Ok(()) => println!(
                    "{}",
                    format!("✅ Chain valid: {} block(s)", chain.len()).green().bold()
                ),
                Err(e) => {
                    eprintln!("{}", format!("❌ {}", e).red().bold());
                    return Err(e.into());
                }
            }
        }
        Command::Record {
            url,
            hash_summary,
            author,
            validator,
            tags,
        } => {
            let mut ledger = Ledger::open(&config.ledger, open_backend(&config.storage)?)?;
            let id = ledger.submit(SourceEntry::new(url, hash_summary, author, validator, tags));
            println!("Source queued: {}", id.to_string().bright_blue());

            match ledger.mine()? {
                MineOutcome::Mined { index, hash } => {
                    println!("{}", format!("⛏️  Block #{} mined", index).green().bold());
                    println!("   Hash: {}", hash.yellow());
                }
                other => {
                    eprintln!("{}", format!("Block not recorded: {:?}", other).red());
                    return Err("mining did not produce a block".into());
                }
            }
        }
    }

    Ok(())
}
