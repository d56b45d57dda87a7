use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ceph-rollover - deploy and validate a Ceph cluster with ceph-ansible
#[derive(Parser)]
#[command(name = "rollover")]
#[command(about = "Deploy a Ceph test cluster with ceph-ansible and check its health")]
#[command(version)]
pub struct Cli {
    /// Dry-run mode: drive in-memory nodes instead of ssh sessions.
    ///
    /// Every remote command succeeds with empty output and is recorded; the
    /// full command log is printed at the end. Health checks are skipped.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a full deployment
    Deploy {
        /// Test configuration (YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Node file listing the provisioned machines (YAML)
        #[arg(short, long)]
        nodes: PathBuf,

        /// Write the collected test data here as JSON
        #[arg(long)]
        test_data: Option<PathBuf>,
    },
    /// Print the inventory a deployment would generate, without remote access
    Inventory {
        /// Test configuration (YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Node file; nodes without `eth_interface` get eth0
        #[arg(short, long)]
        nodes: PathBuf,
    },
    /// Validate a test configuration
    Validate {
        /// Test configuration to validate
        #[arg(short, long)]
        config: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
