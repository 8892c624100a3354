//! Command line configuration.

use std::path::PathBuf;

use clap::{Args, Parser, ValueEnum};
use corelib::HashAlgorithm;
use distribution::FactoryKind;

use crate::commands::{self, Command};

#[derive(Debug, Parser)]
#[command(name = "segmentctl", version, about = "Segment placement simulator and inspector")]
pub struct CliConfig {
    /// Log filter used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Simulate(args) => commands::simulate::run(args).await,
            Command::Inspect(args) => commands::inspect::run(args),
        }
    }
}

/// Factory selection on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FactoryArg {
    Default,
    Topology,
    Sync,
    TopologySync,
}

impl From<FactoryArg> for FactoryKind {
    fn from(arg: FactoryArg) -> Self {
        match arg {
            FactoryArg::Default => FactoryKind::Default,
            FactoryArg::Topology => FactoryKind::TopologyAware,
            FactoryArg::Sync => FactoryKind::Sync,
            FactoryArg::TopologySync => FactoryKind::TopologyAwareSync,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum HashArg {
    Murmur3,
    Xxh3,
    Sip13,
}

impl From<HashArg> for HashAlgorithm {
    fn from(arg: HashArg) -> Self {
        match arg {
            HashArg::Murmur3 => HashAlgorithm::Murmur3,
            HashArg::Xxh3 => HashAlgorithm::Xxh3,
            HashArg::Sip13 => HashAlgorithm::Sip13,
        }
    }
}

#[derive(Clone, Debug, Args)]
pub struct SimulateArgs {
    #[arg(long, value_enum, default_value = "default")]
    pub factory: FactoryArg,
    /// Members in the first view.
    #[arg(long, default_value_t = 1)]
    pub initial: usize,
    /// Members joining afterwards, one view each.
    #[arg(long, default_value_t = 10)]
    pub join: usize,
    #[arg(long, default_value_t = 2)]
    pub owners: usize,
    #[arg(long, default_value_t = 256)]
    pub segments: usize,
    /// Spread members over this many racks.
    #[arg(long)]
    pub racks: Option<usize>,
    #[arg(long, value_enum, default_value = "murmur3")]
    pub hash: HashArg,
}

#[derive(Clone, Debug, Args)]
pub struct InspectArgs {
    /// JSON array of members.
    #[arg(long)]
    pub members: PathBuf,
    /// Cache configuration supplying owners, segments and hash function.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Overrides the factory named in the configuration.
    #[arg(long, value_enum)]
    pub factory: Option<FactoryArg>,
    /// Print the full segment → owners table.
    #[arg(long)]
    pub table: bool,
}
