//! rollover - main entry point
//!
//! Loads the test configuration and node file, then drives a deployment over
//! ssh (or over in-memory nodes with `--dry-run`).

use anyhow::Context;
use log::{debug, error, info};
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use rollover::cli::{Cli, Commands};
use rollover::config::{self, NodeSpec, Pacing, TestConfig};
use rollover::fake::FakeNode;
use rollover::process_guard::{self, SessionGuard};
use rollover::runner::{Deployment, TestData};
use rollover::ssh::SshNode;
use rollover::types::Role;
use rollover::{CephNode, RolloverError, inventory, topology};

/// Interface assumed for nodes whose file entry does not name one
const DEFAULT_INTERFACE: &str = "eth0";

/// Initialize tracing; `log` records from the library are bridged in.
fn init_logging() {
    let filter = std::env::var("ROLLOVER_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    init_logging();
    info!("rollover starting up");

    // Terminates live ssh sessions if we are interrupted
    if let Err(e) = process_guard::init_signal_handlers() {
        log::warn!("Failed to initialize signal handlers: {}", e);
    }
    let guard = SessionGuard::new();

    let cli = Cli::parse_args();
    debug!("CLI arguments parsed");

    let code = match run_command(&cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("✗ {:#}", e);
            if e
                .downcast_ref::<RolloverError>()
                .is_some_and(RolloverError::is_topology_error)
            {
                eprintln!("  check the `add` entries against the node file");
            }
            1
        }
    };

    drop(guard);
    std::process::exit(code);
}

fn run_command(cli: &Cli) -> anyhow::Result<i32> {
    match &cli.command {
        Commands::Validate { config } => {
            info!("Validating configuration file: {:?}", config);
            let config = TestConfig::load_from_file(config)?;
            config.validate()?;
            println!("✓ Configuration file is valid");
            Ok(0)
        }
        Commands::Inventory { config, nodes } => {
            let config = load_config(config)?;
            let specs = config::load_nodes(nodes)?;
            print_inventory(&config, &specs)?;
            Ok(0)
        }
        Commands::Deploy {
            config,
            nodes,
            test_data,
        } => {
            let config = load_config(config)?;
            let specs = config::load_nodes(nodes)?;
            if cli.dry_run {
                dry_run_deploy(config, &specs, test_data.as_deref())
            } else {
                let mut nodes: Vec<SshNode> = specs.iter().map(SshNode::from_spec).collect();
                deploy(Deployment::new(config), &mut nodes, test_data.as_deref())
            }
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<TestConfig> {
    let config = TestConfig::load_from_file(path)?;
    config.validate()?;
    info!("Configuration loaded from {:?}", path);
    Ok(config)
}

fn deploy<N: CephNode>(
    deployment: Deployment,
    nodes: &mut [N],
    test_data_path: Option<&Path>,
) -> anyhow::Result<i32> {
    let mut test_data = TestData::default();
    let outcome = deployment.run(nodes, &mut test_data)?;
    info!("{}", outcome);

    if outcome.exit_code() == 0 {
        let json = serde_json::to_string_pretty(&test_data)?;
        println!("{}", json);
        if let Some(path) = test_data_path {
            fs::write(path, &json)
                .with_context(|| format!("Failed to write test data to {:?}", path))?;
        }
    } else {
        error!("{}", outcome);
    }
    Ok(outcome.exit_code())
}

/// In-memory node that reports its file interface when asked for interfaces.
fn dry_run_node(spec: &NodeSpec) -> FakeNode {
    let iface = spec.eth_interface.as_deref().unwrap_or(DEFAULT_INTERFACE);
    FakeNode::from_spec(spec).respond("ls /sys/class/net", iface)
}

fn dry_run_deploy(
    mut config: TestConfig,
    specs: &[NodeSpec],
    test_data_path: Option<&Path>,
) -> anyhow::Result<i32> {
    println!("🔍 Dry run: no remote commands will be executed");
    config.pacing = Pacing::immediate();
    let mut nodes: Vec<FakeNode> = specs.iter().map(dry_run_node).collect();
    let code = deploy(
        Deployment::new(config).without_health_check(),
        &mut nodes,
        test_data_path,
    )?;

    for node in &nodes {
        println!("\n# {}", node.shortname());
        for command in node.commands() {
            println!("  $ {}", command);
        }
        for (path, contents) in node.files() {
            println!("  > {} ({} bytes)", path, contents.len());
        }
    }
    Ok(code)
}

fn print_inventory(config: &TestConfig, specs: &[NodeSpec]) -> anyhow::Result<()> {
    let mut nodes: Vec<FakeNode> = specs
        .iter()
        .map(|spec| {
            let mut node = FakeNode::from_spec(spec);
            node.set_eth_interface(spec.eth_interface.as_deref().unwrap_or(DEFAULT_INTERFACE));
            node
        })
        .collect();
    topology::apply_additions(&mut nodes, config.additions())?;

    let legacy = config.is_legacy_build();
    let view: Vec<&FakeNode> = nodes
        .iter()
        .filter(|node| !(legacy && node.has_role(Role::Mgr)))
        .collect();
    let inventory = inventory::build(&view, &config.ansi_config)?;
    print!("{}", inventory);
    info!(
        "{} monitors, {} managers, {} osd devices",
        inventory.num_mons, inventory.num_mgrs, inventory.num_osds
    );
    Ok(())
}
