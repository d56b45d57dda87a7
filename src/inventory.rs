//! Ansible inventory generation.
//!
//! Turns the working node set into the `hosts` file ceph-ansible reads.
//! Pure logic: nodes must already carry their ethernet interface, and nothing
//! here touches the network.
//!
//! # Line formats
//!
//! | Role          | Line |
//! |---------------|------|
//! | mon, mgr, mds | `<short> monitor_interface=<iface>` |
//! | osd           | `<short> monitor_interface=<iface>  devices='["/dev/vdb", ...]'` |
//! | rgw           | `<short> radosgw_interface=<iface>` |
//! | client        | `<short> client_interface=<iface>` |
//!
//! With `osd_auto_discovery` the osd line stops after the interface and a
//! single trailing space.

use std::fmt;

use crate::config::AnsibleVars;
use crate::error::{Result, RolloverError};
use crate::node::CephNode;
use crate::types::Role;

/// Section order in the generated file
pub const SECTION_ORDER: [Role; 6] = [
    Role::Mon,
    Role::Mgr,
    Role::Osd,
    Role::Mds,
    Role::Rgw,
    Role::Client,
];

// ============================================================================
// Device naming
// ============================================================================

/// Virtio disk name for a zero-based disk index: 0 is `vda`, 25 is `vdz`,
/// 26 is `vdaa`.
pub fn virtio_disk_name(index: usize) -> String {
    fn letters(n: usize, out: &mut String) {
        if n >= 26 {
            letters(n / 26 - 1, out);
        }
        out.push(char::from(b'a' + (n % 26) as u8));
    }
    let mut name = String::from("/dev/vd");
    letters(index, &mut name);
    name
}

/// Data devices for `count` allocated volumes. `vda` is the system disk, so
/// numbering starts at `vdb`.
pub fn osd_devices(count: usize) -> Vec<String> {
    (1..=count).map(virtio_disk_name).collect()
}

/// Data devices for an OSD node after removing journal devices reserved by a
/// non-collocated scenario.
pub fn usable_osd_devices(allocated: usize, vars: &AnsibleVars) -> Vec<String> {
    let mut devices = osd_devices(allocated);
    if vars.is_non_collocated() {
        let reserved = vars.dedicated_devices();
        devices.retain(|dev| !reserved.contains(dev));
    }
    devices
}

/// JSON list with `", "` separators, the layout ceph-ansible examples use.
fn device_list(devices: &[String]) -> Result<String> {
    let quoted = devices
        .iter()
        .map(serde_json::to_string)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(format!("[{}]", quoted.join(", ")))
}

// ============================================================================
// Inventory
// ============================================================================

/// A rendered inventory plus the daemon counts it deploys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    pub text: String,
    pub num_mons: usize,
    pub num_mgrs: usize,
    pub num_osds: usize,
}

impl fmt::Display for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn host_line<N: CephNode + ?Sized>(
    node: &N,
    role: Role,
    iface: &str,
    vars: &AnsibleVars,
) -> Result<String> {
    let short = node.shortname();
    let line = match role {
        Role::Mon | Role::Mgr | Role::Mds => format!("{} monitor_interface={}", short, iface),
        Role::Osd => {
            let mut line = format!("{} monitor_interface={} ", short, iface);
            if !vars.osd_auto_discovery() {
                let devices = usable_osd_devices(node.allocated_volume_count(), vars);
                line.push_str(&format!(" devices='{}'", device_list(&devices)?));
            }
            line
        }
        Role::Rgw => format!("{} radosgw_interface={}", short, iface),
        Role::Client => format!("{} client_interface={}", short, iface),
        Role::Installer => String::new(),
    };
    Ok(line)
}

/// Render the inventory for `nodes`.
///
/// A node with several roles appears in each of their sections. Sections
/// without members are left out.
pub fn build<N: CephNode + ?Sized>(nodes: &[&N], vars: &AnsibleVars) -> Result<Inventory> {
    let mut inventory = Inventory::default();

    for role in SECTION_ORDER {
        let mut lines = Vec::new();
        for node in nodes.iter().filter(|n| n.has_role(role)) {
            let iface = node.eth_interface().ok_or_else(|| {
                RolloverError::config(format!(
                    "No ethernet interface set on {}",
                    node.shortname()
                ))
            })?;
            match role {
                Role::Mon => inventory.num_mons += 1,
                Role::Mgr => inventory.num_mgrs += 1,
                Role::Osd => {
                    inventory.num_osds +=
                        usable_osd_devices(node.allocated_volume_count(), vars).len()
                }
                _ => {}
            }
            lines.push(host_line(*node, role, iface, vars)?);
        }

        if let (false, Some(section)) = (lines.is_empty(), role.inventory_section()) {
            inventory
                .text
                .push_str(&format!("[{}]\n{}\n", section, lines.join("\n")));
        }
    }

    Ok(inventory)
}
