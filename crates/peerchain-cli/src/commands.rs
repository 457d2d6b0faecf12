use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use colored::Colorize;
use peerchain_ledger::{pipe, Ledger, LineageReport};
use peerchain_store::{FileKvStore, InMemoryKvStore};
use peerchain_types::{Block, BlockHash};
use serde::Serialize;
use tokio::time::timeout;
use tracing::debug;

use crate::cli::*;
use crate::config::NodeConfig;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = NodeConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let format = cli.format;

    match cli.command {
        Command::Init(_) => cmd_init(&config).await,
        Command::Append(args) => cmd_append(&config, args, format).await,
        Command::Show(args) => cmd_show(&config, args, format).await,
        Command::Log(args) => cmd_log(&config, args, format).await,
        Command::Verify(_) => cmd_verify(&config, format).await,
        Command::Simulate(args) => cmd_simulate(&config, args).await,
        Command::Config(_) => cmd_config(&config),
    }
}

/// Block as printed in JSON output.
#[derive(Serialize)]
struct BlockView {
    index: u64,
    hash: String,
    prev_hash: String,
    data: String,
}

impl From<&Block> for BlockView {
    fn from(block: &Block) -> Self {
        Self {
            index: block.index(),
            hash: block.hash().to_hex(),
            prev_hash: block.prev_hash().to_hex(),
            data: block.data_lossy(),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn open_ledger(config: &NodeConfig) -> anyhow::Result<Arc<Ledger>> {
    debug!(data_dir = %config.data_dir.display(), node_id = config.ledger.node_id, "opening ledger");
    let store = FileKvStore::open(&config.data_dir)
        .await
        .with_context(|| format!("opening {}", config.data_dir.display()))?;
    Ok(Ledger::open(Arc::new(store), config.ledger.clone()).await?)
}

async fn cmd_init(config: &NodeConfig) -> anyhow::Result<()> {
    let ledger = open_ledger(config).await?;
    println!(
        "{} Ledger ready in {}",
        "✓".green().bold(),
        config.data_dir.display().to_string().bold()
    );
    println!("  Head: {}", ledger.head().to_string().cyan());
    Ok(())
}

async fn cmd_append(config: &NodeConfig, args: AppendArgs, format: OutputFormat) -> anyhow::Result<()> {
    let ledger = open_ledger(config).await?;
    let mut appended = Vec::with_capacity(args.data.len());
    for data in args.data {
        appended.push(ledger.append(data).await?);
    }
    match format {
        OutputFormat::Json => print_json(&appended.iter().map(BlockView::from).collect::<Vec<_>>()),
        OutputFormat::Text => {
            for block in &appended {
                println!(
                    "{} #{} {}",
                    "✓".green().bold(),
                    block.index(),
                    block.hash().short_hex().yellow()
                );
            }
            Ok(())
        }
    }
}

async fn cmd_show(config: &NodeConfig, args: ShowArgs, format: OutputFormat) -> anyhow::Result<()> {
    let ledger = open_ledger(config).await?;
    let hash = match args.hash {
        Some(hex) => BlockHash::from_str(&hex).with_context(|| format!("invalid hash {hex}"))?,
        None => ledger.hash(),
    };
    let Some(block) = ledger.get(&hash).await? else {
        bail!("block {} not found", hash.short_hex());
    };

    match format {
        OutputFormat::Json => print_json(&BlockView::from(&block)),
        OutputFormat::Text => {
            println!("Block {}", format!("#{}", block.index()).yellow().bold());
            println!("  Hash: {}", block.hash().to_hex());
            println!("  Prev: {}", block.prev_hash().to_hex().dimmed());
            println!("  Data: {}", block.data_lossy());
            Ok(())
        }
    }
}

async fn cmd_log(config: &NodeConfig, args: LogArgs, format: OutputFormat) -> anyhow::Result<()> {
    let ledger = open_ledger(config).await?;
    let history = ledger.history().await?;
    let shown = history.iter().take(args.limit);

    match format {
        OutputFormat::Json => print_json(&shown.map(BlockView::from).collect::<Vec<_>>()),
        OutputFormat::Text => {
            for block in shown {
                let index = format!("#{}", block.index());
                if args.oneline {
                    println!("{} {} {}", index.yellow(), block.hash().short_hex().dimmed(), block.data_lossy());
                } else {
                    println!("{}  {}", index.yellow().bold(), block.hash().to_hex().dimmed());
                    println!("  {}", block.data_lossy());
                }
            }
            Ok(())
        }
    }
}

async fn cmd_verify(config: &NodeConfig, format: OutputFormat) -> anyhow::Result<()> {
    let ledger = open_ledger(config).await?;
    let report = ledger.verify().await?;
    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => print_report(&report),
    }
    if !report.is_valid() {
        bail!("lineage verification failed with {} violation(s)", report.violations.len());
    }
    Ok(())
}

fn print_report(report: &LineageReport) {
    if report.is_valid() {
        println!("{} Lineage verified", "✓".green().bold());
    } else {
        println!("{} Lineage broken", "✗".red().bold());
    }
    println!("  Head: {}", report.head.to_string().cyan());
    println!("  Blocks checked: {}", report.blocks_checked.to_string().bold());
    let reached = if report.complete { "yes".green() } else { "no".red() };
    println!("  Reached genesis: {reached}");
    for violation in &report.violations {
        println!("  {} {}", "-".red(), violation);
    }
}

/// Peers 1..=n each build their own history, then a fresh node joins them
/// all and syncs. The fresh node ends on the longest history.
async fn cmd_simulate(config: &NodeConfig, args: SimulateArgs) -> anyhow::Result<()> {
    if args.peers == 0 {
        bail!("need at least one peer");
    }

    let spawn = |node_id: u16| {
        let ledger = config.ledger.clone().with_node_id(node_id);
        async move { Ledger::open(Arc::new(InMemoryKvStore::new()), ledger).await }
    };

    let joiner = spawn(0).await?;
    let mut peers = Vec::with_capacity(args.peers);
    for n in 1..=args.peers {
        let peer = spawn(u16::try_from(n).context("too many peers")?).await?;
        for j in 0..args.blocks + n - 1 {
            peer.append(format!("node{n}-{j}")).await?;
        }
        println!("  peer {} at {}", n, peer.head().to_string().cyan());
        peers.push(peer);
    }

    let links: Vec<_> = peers
        .iter()
        .map(|peer| pipe(joiner.create_stream(), peer.create_stream()))
        .collect();

    let target = peers
        .iter()
        .map(|peer| peer.head())
        .max_by_key(|head| head.index)
        .context("no peers")?;

    joiner.sync();
    let mut head = joiner.subscribe_head();
    let converged = timeout(
        Duration::from_secs(args.timeout_secs),
        head.wait_for(|p| *p == target),
    )
    .await
    .is_ok();

    for link in links {
        link.close();
    }

    if !converged {
        bail!("joiner stuck at {} (expected {})", joiner.head(), target);
    }
    println!(
        "{} joiner converged to {} across {} peer(s)",
        "✓".green().bold(),
        target.to_string().cyan(),
        args.peers
    );
    Ok(())
}

fn cmd_config(config: &NodeConfig) -> anyhow::Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}
