//! Deployment run orchestration
//!
//! Drives one ceph-ansible deployment from start to finish:
//! - Topology additions from the configuration
//! - Firewall ports and package repositories on every node
//! - ceph-ansible installation, interface discovery, inventory and group vars
//! - The playbook run itself
//! - Default pool creation and health polling on the first monitor
//!
//! # Design
//!
//! - Generic over `CephNode`, so the same run drives ssh nodes or in-memory
//!   fakes
//! - Strictly sequential; fixed settle delays come from `Pacing`
//! - Each stage runs inside its own tracing span

use serde::{Deserialize, Serialize};
use std::fmt;
use std::thread;
use std::time::Duration;

use crate::config::TestConfig;
use crate::deploy;
use crate::error::{Result, RolloverError};
use crate::helpers::{docker, firewall, health, network, repos};
use crate::inventory::{self, Inventory};
use crate::node::CephNode;
use crate::topology;
use crate::types::{PkgType, Role};

// ============================================================================
// Run Results
// ============================================================================

/// How a deployment run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Deployed and healthy (or health checks disabled).
    Passed,
    /// `skip_setup` was set; nothing was deployed.
    Skipped,
    /// No interface on `node` reaches every other node.
    NoInterface { node: String },
    /// `ansible-playbook` exited with this code.
    DeployFailed(i32),
    /// The cluster did not become healthy in time.
    Unhealthy,
}

impl RunOutcome {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Passed | Self::Skipped => 0,
            Self::NoInterface { .. } | Self::Unhealthy => 1,
            Self::DeployFailed(code) => *code,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "Deployment passed"),
            Self::Skipped => write!(f, "Setup skipped"),
            Self::NoInterface { node } => write!(f, "No suitable interface found on {}", node),
            Self::DeployFailed(code) => write!(f, "Deployment failed with exit code {}", code),
            Self::Unhealthy => write!(f, "Cluster did not become healthy"),
        }
    }
}

/// Cluster facts recorded for later tests (upgrades, workunits).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_version: Option<String>,
    #[serde(rename = "ceph-ansible", default, skip_serializing_if = "Option::is_none")]
    pub ceph_ansible: Option<CephAnsibleData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CephAnsibleData {
    #[serde(rename = "num-osds")]
    pub num_osds: usize,
    #[serde(rename = "num-mons")]
    pub num_mons: usize,
    pub rhbuild: String,
}

// ============================================================================
// Deployment
// ============================================================================

/// One deployment run over a fixed set of nodes
#[derive(Debug, Clone)]
pub struct Deployment {
    config: TestConfig,
    verify_health: bool,
}

fn settle(secs: u64, reason: &str) {
    if secs > 0 {
        log::info!("{} ({}s)", reason, secs);
        thread::sleep(Duration::from_secs(secs));
    }
}

impl Deployment {
    pub fn new(config: TestConfig) -> Self {
        Self {
            config,
            verify_health: true,
        }
    }

    /// Stop after the playbook; no pool creation and no health polling.
    pub fn without_health_check(mut self) -> Self {
        self.verify_health = false;
        self
    }

    /// Run the whole deployment.
    ///
    /// Precondition failures (topology additions, missing installer or
    /// monitor) and failed checked commands are errors; everything with a
    /// defined exit code is a `RunOutcome`.
    pub fn run<N: CephNode>(
        &self,
        nodes: &mut [N],
        test_data: &mut TestData,
    ) -> Result<RunOutcome> {
        let config = &self.config;

        {
            let _span = tracing::info_span!("topology").entered();
            topology::apply_additions(nodes, config.additions())?;
        }

        if config.skip_setup {
            log::info!("Skipping setup of ceph cluster");
            return Ok(RunOutcome::Skipped);
        }

        let build = config.build.clone();
        test_data.install_version = Some(build.clone());

        let legacy = config.is_legacy_build();
        let mut working: Vec<&mut N> = nodes
            .iter_mut()
            .filter(|node| !(legacy && node.has_role(Role::Mgr)))
            .collect();
        if legacy {
            log::info!(
                "Build {} has no mgr daemon; working with {} nodes",
                build,
                working.len()
            );
        }

        {
            let _span = tracing::info_span!("firewall").entered();
            for node in &working {
                firewall::open_role_ports(&**node)?;
            }
        }

        let installer_idx = working
            .iter()
            .position(|node| node.has_role(Role::Installer))
            .ok_or(RolloverError::MissingRole(Role::Installer))?;
        log::info!("Installer node is {}", working[installer_idx].shortname());

        {
            let _span = tracing::info_span!("repositories").entered();
            for node in &working {
                self.prepare_node(&**node)?;
                settle(config.pacing.metadata_settle_secs, "Updating metadata");
            }
            repos::install_ceph_ansible(&*working[installer_idx])?;
            settle(config.pacing.install_settle_secs, "Waiting for ceph-ansible install");
        }

        {
            let _span = tracing::info_span!("interfaces").entered();
            let peers: Vec<String> = working.iter().map(|n| n.shortname().to_string()).collect();
            for node in working.iter_mut() {
                match network::search_ethernet_interface(&**node, &peers)? {
                    Some(iface) => node.set_eth_interface(&iface),
                    None => {
                        log::error!("No suitable interface is found on {}", node.ip_address());
                        return Ok(RunOutcome::NoInterface {
                            node: node.shortname().to_string(),
                        });
                    }
                }
            }
        }

        let view: Vec<&N> = working.iter().map(|n| &**n).collect();
        let installer = view[installer_idx];
        let vars = &config.ansi_config;
        let containerized = vars.containerized_deployment();

        let inventory = {
            let _span = tracing::info_span!("deploy").entered();
            let inventory = inventory::build(&view, vars)?;
            deploy::write_inventory(installer, &config.ansible_dir, &inventory.text)?;

            self.configure_insecure_registry(&view)?;

            deploy::install_site_playbook(installer, &config.ansible_dir, containerized)?;
            deploy::write_group_vars(installer, &config.ansible_dir, vars)?;
            deploy::log_ceph_versions(installer)?;

            let code = deploy::run_playbook(installer, &config.ansible_dir)?;
            if code != 0 {
                return Ok(RunOutcome::DeployFailed(code));
            }
            inventory
        };

        let _span = tracing::info_span!("validate").entered();
        let mon = view
            .iter()
            .copied()
            .find(|n| n.has_role(Role::Mon))
            .ok_or(RolloverError::MissingRole(Role::Mon))?;

        test_data.ceph_ansible = Some(CephAnsibleData {
            num_osds: inventory.num_osds,
            num_mons: inventory.num_mons,
            rhbuild: build,
        });

        if !self.verify_health {
            log::info!("Health checks disabled");
            return Ok(RunOutcome::Passed);
        }
        self.validate_cluster(mon, &inventory, containerized)
    }

    /// Install package repositories on one node.
    fn prepare_node(&self, node: &dyn CephNode) -> Result<()> {
        let config = &self.config;
        let is_installer = node.has_role(Role::Installer);

        if config.use_cdn {
            match node.pkg_type() {
                PkgType::Deb if is_installer => {
                    log::info!("[{}] enabling tools repository", node.shortname());
                    repos::setup_deb_cdn_repo(
                        node,
                        &config.build,
                        config.cdn_credentials.as_ref(),
                    )?;
                }
                PkgType::Deb => {}
                PkgType::Rpm => {
                    log::info!("[{}] using the cdn repo", node.shortname());
                    repos::setup_cdn_repos(node, &config.build)?;
                }
            }
            return Ok(());
        }

        let iso = config.ansi_config.uses_iso_repository();
        if !iso || is_installer {
            match node.pkg_type() {
                PkgType::Deb => {
                    let ubuntu_repo = config.ubuntu_repo.as_deref().ok_or_else(|| {
                        RolloverError::config(format!(
                            "ubuntu_repo is required for deb node {}",
                            node.shortname()
                        ))
                    })?;
                    repos::setup_deb_repos(node, ubuntu_repo)?;
                    settle(config.pacing.repo_settle_secs, "Waiting for apt repositories");
                    repos::install_deb_prerequisites(node)?;
                }
                PkgType::Rpm => {
                    repos::setup_repos(node, self.base_url()?, config.installer_url.as_deref())?;
                }
            }
        }

        if iso && is_installer {
            let iso_url = repos::get_iso_file_url(node, self.base_url()?)?;
            log::info!("[{}] fetching {}", node.shortname(), iso_url);
            repos::fetch_iso(node, &config.ansible_dir, &iso_url)?;
        }
        Ok(())
    }

    fn base_url(&self) -> Result<&str> {
        self.config
            .base_url
            .as_deref()
            .ok_or_else(|| RolloverError::config("base_url is required for rpm repositories"))
    }

    /// Trust the configured registry on every node when the deployment pulls
    /// images from an insecure one.
    fn configure_insecure_registry<N: CephNode>(&self, nodes: &[&N]) -> Result<()> {
        let vars = &self.config.ansi_config;
        if !(vars.containerized_deployment() && self.config.docker_insecure_registry) {
            return Ok(());
        }
        let Some(registry) = vars.ceph_docker_registry() else {
            return Ok(());
        };
        let daemon_json = docker::insecure_registry_json(registry)?;
        log::warn!("Adding insecure registry:\n{}", daemon_json);
        for node in nodes {
            docker::write_docker_daemon_json(*node, &daemon_json)?;
        }
        Ok(())
    }

    fn validate_cluster(
        &self,
        mon: &dyn CephNode,
        inventory: &Inventory,
        containerized: bool,
    ) -> Result<RunOutcome> {
        if !self.config.is_legacy_build() {
            health::create_default_pool(mon, containerized)?;
        }
        let expected = health::ExpectedCluster {
            num_osds: inventory.num_osds,
            num_mons: inventory.num_mons,
        };
        let healthy = health::check_ceph_healthy(
            mon,
            expected,
            containerized,
            self.config.health_timeout(),
            Duration::from_secs(self.config.pacing.health_poll_secs),
        )?;
        Ok(if healthy {
            RunOutcome::Passed
        } else {
            RunOutcome::Unhealthy
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(RunOutcome::Passed.exit_code(), 0);
        assert_eq!(RunOutcome::Skipped.exit_code(), 0);
        assert_eq!(RunOutcome::Unhealthy.exit_code(), 1);
        assert_eq!(
            RunOutcome::NoInterface {
                node: "node1".to_string()
            }
            .exit_code(),
            1
        );
        assert_eq!(RunOutcome::DeployFailed(4).exit_code(), 4);
    }

    #[test]
    fn test_test_data_json_keys() {
        let data = TestData {
            install_version: Some("3.0".to_string()),
            ceph_ansible: Some(CephAnsibleData {
                num_osds: 6,
                num_mons: 3,
                rhbuild: "3.0".to_string(),
            }),
        };
        let json = serde_json::to_value(&data).expect("serializes");
        assert_eq!(json["install_version"], "3.0");
        assert_eq!(json["ceph-ansible"]["num-osds"], 6);
        assert_eq!(json["ceph-ansible"]["rhbuild"], "3.0");

        let empty = serde_json::to_string(&TestData::default()).expect("serializes");
        assert_eq!(empty, "{}");
    }
}
