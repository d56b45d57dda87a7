//! Docker daemon configuration for containerized deployments.

use serde_json::json;

use crate::error::Result;
use crate::node::{CephNode, RemoteCommand};

pub const DOCKER_DAEMON_JSON: &str = "/etc/docker/daemon.json";

/// `daemon.json` body trusting `registry` over plain HTTP.
pub fn insecure_registry_json(registry: &str) -> Result<String> {
    Ok(serde_json::to_string(&json!({ "insecure-registries": [registry] }))?)
}

/// Write `daemon_json` to the node's docker configuration directory.
pub fn write_docker_daemon_json(node: &dyn CephNode, daemon_json: &str) -> Result<()> {
    node.exec_command(&RemoteCommand::new(
        "sudo mkdir -p /etc/docker/ && sudo chown $USER /etc/docker && chmod 755 /etc/docker",
    ))?;
    node.write_file(DOCKER_DAEMON_JSON, daemon_json, false)?;
    Ok(())
}
