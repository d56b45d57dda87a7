//! Firewall port opening per daemon role.

use strum::Display;

use crate::error::Result;
use crate::node::{CephNode, RemoteCommand};
use crate::types::{PkgType, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

/// A port or port range (`6800-7300`) to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRule {
    pub port: &'static str,
    pub protocol: Protocol,
}

const fn tcp(port: &'static str) -> PortRule {
    PortRule {
        port,
        protocol: Protocol::Tcp,
    }
}

/// Well-known ports per role. Monitors also get the mgr range: upgrades
/// from 2.x turn monitors into managers.
pub fn ports_for_role(role: Role) -> &'static [PortRule] {
    const MON: &[PortRule] = &[tcp("6789"), tcp("6800-6820")];
    const OSD: &[PortRule] = &[tcp("6800-7300")];
    const MGR: &[PortRule] = &[tcp("6800-6820")];
    const MDS: &[PortRule] = &[tcp("6800")];
    match role {
        Role::Mon => MON,
        Role::Osd => OSD,
        Role::Mgr => MGR,
        Role::Mds => MDS,
        Role::Rgw | Role::Client | Role::Installer => &[],
    }
}

/// Deduplicated rules for every role the node carries, in role order.
pub fn rules_for_node(node: &dyn CephNode) -> Vec<PortRule> {
    let mut rules: Vec<PortRule> = Vec::new();
    for role in node.roles().iter() {
        for rule in ports_for_role(role) {
            if !rules.contains(rule) {
                rules.push(*rule);
            }
        }
    }
    rules
}

/// Make sure firewalld is installed and running on rpm nodes.
fn prepare_firewalld(node: &dyn CephNode) -> Result<()> {
    let installed = node.exec_command(&RemoteCommand::new("rpm -qa | grep firewalld").unchecked())?;
    if !installed.success() {
        node.exec_command(&RemoteCommand::sudo("yum install -y firewalld").long_running())?;
    }
    node.exec_command(&RemoteCommand::sudo("systemctl enable firewalld"))?;
    node.exec_command(&RemoteCommand::sudo("systemctl start firewalld"))?;
    Ok(())
}

/// Open one port (or range) on the node, at runtime and permanently.
pub fn open_firewall_port(node: &dyn CephNode, port: &str, protocol: Protocol) -> Result<()> {
    match node.pkg_type() {
        PkgType::Rpm => {
            let add = format!("firewall-cmd --zone=public --add-port={}/{}", port, protocol);
            node.exec_command(&RemoteCommand::sudo(add.as_str()))?;
            node.exec_command(&RemoteCommand::sudo(format!("{} --permanent", add)))?;
        }
        PkgType::Deb => {
            // ufw writes ranges with a colon
            let port = port.replace('-', ":");
            node.exec_command(&RemoteCommand::sudo(format!("ufw allow {}/{}", port, protocol)))?;
        }
    }
    Ok(())
}

/// Open every port the node's roles need.
pub fn open_role_ports(node: &dyn CephNode) -> Result<()> {
    let rules = rules_for_node(node);
    if rules.is_empty() {
        return Ok(());
    }
    if node.pkg_type() == PkgType::Rpm {
        prepare_firewalld(node)?;
    }
    for rule in &rules {
        log::info!("[{}] opening {}/{}", node.shortname(), rule.port, rule.protocol);
        open_firewall_port(node, rule.port, rule.protocol)?;
    }
    Ok(())
}
