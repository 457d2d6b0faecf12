use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "peerchain",
    about = "Peerchain - a gossiping append-only hash-chain ledger",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML node configuration
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the ledger and its genesis block
    Init(InitArgs),
    /// Append blocks to the local ledger
    Append(AppendArgs),
    /// Show a block
    Show(ShowArgs),
    /// Show the canonical chain, newest first
    Log(LogArgs),
    /// Verify the stored lineage
    Verify(VerifyArgs),
    /// Run in-memory peers and watch them converge
    Simulate(SimulateArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct InitArgs {}

#[derive(Args)]
pub struct AppendArgs {
    /// One block per payload
    #[arg(required = true)]
    pub data: Vec<String>,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Block hash in hex; defaults to the head
    pub hash: Option<String>,
}

#[derive(Args)]
pub struct LogArgs {
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
    #[arg(long)]
    pub oneline: bool,
}

#[derive(Args)]
pub struct VerifyArgs {}

#[derive(Args)]
pub struct SimulateArgs {
    /// Number of peers with their own history
    #[arg(long, default_value = "2")]
    pub peers: usize,
    /// Blocks appended by the first peer; each later peer appends one more
    #[arg(long, default_value = "2")]
    pub blocks: usize,
    #[arg(long, default_value = "10")]
    pub timeout_secs: u64,
}

#[derive(Args)]
pub struct ConfigArgs {}
