//! ceph-rollover library
//!
//! Deploys a Ceph test cluster with ceph-ansible over remote command
//! execution and checks that it becomes healthy.

pub mod cli;
pub mod config;
pub mod deploy;
pub mod error;
pub mod fake;
pub mod helpers;
pub mod inventory;
pub mod node;
pub mod process_guard;
pub mod runner;
pub mod ssh;
pub mod topology;
pub mod types;

// Re-export main types for convenience
pub use config::{AddRequest, AnsibleVars, NodeSpec, Pacing, TestConfig};
pub use error::{Result, RolloverError};
pub use fake::FakeNode;
pub use inventory::Inventory;
pub use node::{CephNode, CommandOutput, RemoteCommand};
pub use process_guard::{LiveSession, SessionCommand, SessionGuard, SessionRegistry};
pub use runner::{Deployment, RunOutcome, TestData};
pub use ssh::SshNode;
pub use types::{NodeVolume, PkgType, Role, RoleSet, VolumeStatus};
