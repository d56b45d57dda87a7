//! Test configuration and node inventory files.
//!
//! The test configuration mirrors the suite YAML a test run is started with:
//! ceph-ansible variables under `ansi_config`, an optional list of topology
//! additions under `add`, and the repository/build switches. The node file
//! describes the machines the harness provisioned for the run.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::Path;

use crate::types::{NodeVolume, PkgType, Role, RoleSet};

/// Default location of the ceph-ansible checkout on the installer node
pub const DEFAULT_ANSIBLE_DIR: &str = "/usr/share/ceph-ansible";

/// Fetch directory used when the variables leave it unset. The playbook's
/// own default is not writeable by the deploying user.
pub const DEFAULT_FETCH_DIRECTORY: &str = "~/fetch/";

/// Health polling timeout when the configuration does not set one
pub const DEFAULT_HEALTH_TIMEOUT_SECS: u64 = 300;

/// ceph-ansible group variables (`group_vars/all.yml`).
///
/// Kept as an ordered YAML mapping so variables this driver does not know
/// about reach the playbook untouched. Accessors cover the keys the driver
/// itself reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnsibleVars(Mapping);

impl AnsibleVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(Value::String(key.to_string()), value.into());
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    fn get_flag(&self, key: &str) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn ceph_repository_type(&self) -> Option<&str> {
        self.get_str("ceph_repository_type")
    }

    pub fn uses_iso_repository(&self) -> bool {
        self.ceph_repository_type() == Some("iso")
    }

    pub fn osd_scenario(&self) -> Option<&str> {
        self.get_str("osd_scenario")
    }

    pub fn is_non_collocated(&self) -> bool {
        self.osd_scenario() == Some("non-collocated")
    }

    /// Journal devices reserved by a non-collocated scenario, deduplicated.
    pub fn dedicated_devices(&self) -> Vec<String> {
        let mut devices: Vec<String> = Vec::new();
        if let Some(Value::Sequence(seq)) = self.get("dedicated_devices") {
            for dev in seq.iter().filter_map(Value::as_str) {
                if !devices.iter().any(|d| d == dev) {
                    devices.push(dev.to_string());
                }
            }
        }
        devices
    }

    pub fn osd_auto_discovery(&self) -> bool {
        self.get_flag("osd_auto_discovery")
    }

    pub fn containerized_deployment(&self) -> bool {
        self.get_flag("containerized_deployment")
    }

    pub fn ceph_docker_registry(&self) -> Option<&str> {
        self.get_str("ceph_docker_registry")
    }

    pub fn fetch_directory(&self) -> Option<&str> {
        self.get_str("fetch_directory")
    }

    /// Give `fetch_directory` a writeable default when it is unset.
    pub fn normalize_fetch_directory(&mut self) {
        if matches!(self.get("fetch_directory"), None | Some(Value::Null)) {
            self.set("fetch_directory", DEFAULT_FETCH_DIRECTORY);
        }
    }

    /// Render the variables as block-style YAML.
    pub fn to_yaml(&self) -> crate::error::Result<String> {
        Ok(serde_yaml::to_string(&self.0)?)
    }
}

/// One topology addition: give the single node matching `node_name` the
/// listed daemons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddRequest {
    /// Regular expression matched against node short names.
    #[serde(rename = "node-name")]
    pub node_name: String,
    #[serde(rename = "demon", default)]
    pub daemons: Vec<Role>,
}

impl AddRequest {
    /// Number of OSD daemons requested; each consumes one free volume.
    pub fn osds_required(&self) -> usize {
        self.daemons.iter().filter(|d| **d == Role::Osd).count()
    }
}

/// Wrapper matching the `- node: {...}` list entry shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddEntry {
    pub node: AddRequest,
}

/// Fixed settle delays between remote steps, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pacing {
    /// After writing deb repositories, before installing from them.
    pub repo_settle_secs: u64,
    /// After each node's repository setup.
    pub metadata_settle_secs: u64,
    /// After installing ceph-ansible.
    pub install_settle_secs: u64,
    /// Between two health polls.
    pub health_poll_secs: u64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            repo_settle_secs: 15,
            metadata_settle_secs: 15,
            install_settle_secs: 6,
            health_poll_secs: 10,
        }
    }
}

impl Pacing {
    /// No delays at all; for dry runs and tests.
    pub fn immediate() -> Self {
        Self {
            repo_settle_secs: 0,
            metadata_settle_secs: 0,
            install_settle_secs: 0,
            health_poll_secs: 0,
        }
    }
}

/// Login for the authenticated Ubuntu CDN repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdnCredentials {
    pub username: String,
    pub password: String,
}

/// Test configuration for one deployment run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    #[serde(default)]
    pub ansi_config: AnsibleVars,
    #[serde(default)]
    pub add: Vec<AddEntry>,
    #[serde(default)]
    pub ubuntu_repo: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub installer_url: Option<String>,
    #[serde(default)]
    pub skip_setup: bool,
    #[serde(default = "default_build", deserialize_with = "build_from_yaml")]
    pub build: String,
    #[serde(default)]
    pub use_cdn: bool,
    #[serde(default)]
    pub cdn_credentials: Option<CdnCredentials>,
    #[serde(rename = "docker-insecure-registry", default)]
    pub docker_insecure_registry: bool,
    /// Health polling timeout in seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default = "default_ansible_dir")]
    pub ansible_dir: String,
    #[serde(default)]
    pub pacing: Pacing,
}

fn default_build() -> String {
    "3".to_string()
}

fn default_ansible_dir() -> String {
    DEFAULT_ANSIBLE_DIR.to_string()
}

/// Integers are accepted as-is. Unquoted decimals are rejected: YAML reads
/// `3.10` as the float 3.1, and the build string must survive untouched.
fn build_from_yaml<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) if n.is_f64() => Err(serde::de::Error::custom(format!(
            "build {} must be quoted, e.g. build: '{}'",
            n, n
        ))),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(default_build()),
        other => Err(serde::de::Error::custom(format!(
            "build must be a string or number, got {:?}",
            other
        ))),
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            ansi_config: AnsibleVars::new(),
            add: Vec::new(),
            ubuntu_repo: None,
            base_url: None,
            installer_url: None,
            skip_setup: false,
            build: default_build(),
            use_cdn: false,
            cdn_credentials: None,
            docker_insecure_registry: false,
            timeout: None,
            ansible_dir: default_ansible_dir(),
            pacing: Pacing::default(),
        }
    }
}

impl TestConfig {
    /// Parse a configuration from YAML text
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("Failed to parse test configuration YAML")
    }

    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;
        Self::from_yaml(&content)
    }

    /// Topology additions in declaration order
    pub fn additions(&self) -> impl Iterator<Item = &AddRequest> {
        self.add.iter().map(|entry| &entry.node)
    }

    /// 2.x builds have no mgr daemon.
    pub fn is_legacy_build(&self) -> bool {
        self.build.starts_with('2')
    }

    pub fn health_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout.unwrap_or(DEFAULT_HEALTH_TIMEOUT_SECS))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.build.trim().is_empty() {
            anyhow::bail!("Build version must not be empty");
        }

        for request in self.additions() {
            if request.node_name.trim().is_empty() {
                anyhow::bail!("Topology addition is missing node-name");
            }
            if request.daemons.is_empty() {
                anyhow::bail!(
                    "Topology addition for {} does not list any daemon",
                    request.node_name
                );
            }
            regex::Regex::new(&request.node_name)
                .with_context(|| format!("Invalid node-name pattern {}", request.node_name))?;
        }

        if self.ansi_config.is_non_collocated() && self.ansi_config.get("dedicated_devices").is_none()
        {
            anyhow::bail!("osd_scenario non-collocated requires dedicated_devices");
        }

        if self.use_cdn && self.ansi_config.uses_iso_repository() {
            log::warn!("use_cdn is set; ceph_repository_type iso will be ignored");
        }

        Ok(())
    }
}

/// One machine provisioned by the harness
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub hostname: String,
    pub shortname: String,
    pub ip_address: String,
    #[serde(default)]
    pub roles: RoleSet,
    #[serde(default)]
    pub pkg_type: PkgType,
    /// Number of attached data volumes (all free at start).
    #[serde(default)]
    pub volumes: usize,
    /// Login user for remote sessions.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub ssh_port: Option<u16>,
    /// Known ethernet interface; used only when rendering without remote access.
    #[serde(default)]
    pub eth_interface: Option<String>,
}

impl NodeSpec {
    /// Volumes at provisioning time: an osd node's volumes are already
    /// consumed by its OSDs, any other node's are free.
    pub fn initial_volumes(&self) -> Vec<NodeVolume> {
        let volume = if self.roles.contains(Role::Osd) {
            NodeVolume::allocated()
        } else {
            NodeVolume::free()
        };
        vec![volume; self.volumes]
    }
}

/// Load the node file (a YAML list of `NodeSpec`)
pub fn load_nodes<P: AsRef<Path>>(path: P) -> Result<Vec<NodeSpec>> {
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read node file {:?}", path.as_ref()))?;
    let nodes: Vec<NodeSpec> =
        serde_yaml::from_str(&content).context("Failed to parse node file YAML")?;
    if nodes.is_empty() {
        anyhow::bail!("Node file {:?} does not list any node", path.as_ref());
    }
    Ok(nodes)
}
