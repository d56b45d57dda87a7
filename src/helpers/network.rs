//! Ethernet interface discovery.

use crate::error::Result;
use crate::node::{CephNode, RemoteCommand};

/// Pings sent per peer when probing an interface
const PING_COUNT: u32 = 3;

/// Interfaces listed under `/sys/class/net`, loopback excluded.
pub fn list_interfaces(node: &dyn CephNode) -> Result<Vec<String>> {
    let out = node.exec_command(&RemoteCommand::sudo("ls /sys/class/net"))?;
    Ok(out
        .stdout
        .split_whitespace()
        .filter(|iface| *iface != "lo")
        .map(str::to_string)
        .collect())
}

/// Find the interface through which `node` reaches every peer.
///
/// Interfaces are tried in listing order; the first one where every ping
/// succeeds wins. `None` means no interface reaches all peers.
pub fn search_ethernet_interface(node: &dyn CephNode, peers: &[String]) -> Result<Option<String>> {
    for iface in list_interfaces(node)? {
        let mut reaches_all = true;
        for peer in peers {
            let ping = RemoteCommand::new(format!("ping -I {} -c {} {}", iface, PING_COUNT, peer))
                .unchecked();
            if !node.exec_command(&ping)?.success() {
                log::debug!("[{}] {} cannot reach {}", node.shortname(), iface, peer);
                reaches_all = false;
                break;
            }
        }
        if reaches_all {
            log::info!("[{}] using interface {}", node.shortname(), iface);
            return Ok(Some(iface));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeNode;
    use crate::types::Role;

    fn peers() -> Vec<String> {
        vec!["node1".to_string(), "node2".to_string()]
    }

    #[test]
    fn test_skips_loopback_and_unreachable() {
        let node = FakeNode::new("node1", &[Role::Mon])
            .respond("ls /sys/class/net", "eth0\nlo\neth1\n")
            .fail("ping -I eth0 -c 3 node2", 1);
        let iface = search_ethernet_interface(&node, &peers()).expect("search runs");
        assert_eq!(iface.as_deref(), Some("eth1"));
        assert!(!node.ran("ping -I lo"));
    }

    #[test]
    fn test_none_when_nothing_reaches_peers() {
        let node = FakeNode::new("node1", &[Role::Mon])
            .respond("ls /sys/class/net", "lo eth0")
            .fail("ping -I", 2);
        assert_eq!(search_ethernet_interface(&node, &peers()).expect("search runs"), None);
    }

    #[test]
    fn test_empty_listing() {
        let node = FakeNode::new("node1", &[Role::Osd]);
        assert_eq!(search_ethernet_interface(&node, &peers()).expect("search runs"), None);
    }
}
