//! Per-node helpers the deployment run is composed of.
//!
//! Each helper drives one node through the `CephNode` trait and knows
//! nothing about the rest of the run.

pub mod docker;
pub mod firewall;
pub mod health;
pub mod network;
pub mod repos;

pub use docker::{insecure_registry_json, write_docker_daemon_json};
pub use firewall::{open_firewall_port, open_role_ports};
pub use health::{ExpectedCluster, check_ceph_healthy, create_default_pool};
pub use network::search_ethernet_interface;
