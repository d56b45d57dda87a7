//! Type-safe cluster vocabulary for the deployment driver
//!
//! Node roles, package-manager families, and volume states are proper enums
//! instead of strings, so role checks are exhaustive and typos fail to parse.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumIter, EnumString};

/// Ceph daemon role a node plays in the test cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Mon,
    Mgr,
    Osd,
    Mds,
    Rgw,
    Client,
    Installer,
}

impl Role {
    /// Inventory section header for roles that appear in the ansible inventory
    pub const fn inventory_section(self) -> Option<&'static str> {
        match self {
            Self::Mon => Some("mons"),
            Self::Mgr => Some("mgrs"),
            Self::Osd => Some("osds"),
            Self::Mds => Some("mdss"),
            Self::Rgw => Some("rgws"),
            Self::Client => Some("clients"),
            Self::Installer => None,
        }
    }
}

/// Package-manager family of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PkgType {
    #[default]
    Rpm,
    Deb,
}

/// Allocation state of a node's storage volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VolumeStatus {
    #[default]
    Free,
    Allocated,
}

/// A storage volume attached to a test node
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeVolume {
    #[serde(default)]
    pub status: VolumeStatus,
}

impl NodeVolume {
    pub fn free() -> Self {
        Self {
            status: VolumeStatus::Free,
        }
    }

    pub fn allocated() -> Self {
        Self {
            status: VolumeStatus::Allocated,
        }
    }

    pub fn is_free(&self) -> bool {
        self.status == VolumeStatus::Free
    }
}

/// Ordered, duplicate-free set of roles carried by one node
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet(Vec<Role>);

impl RoleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    /// Merge `roles` into the set, keeping first-seen order
    pub fn update(&mut self, roles: &[Role]) {
        for role in roles {
            if !self.0.contains(role) {
                self.0.push(*role);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Role>> for RoleSet {
    fn from(roles: Vec<Role>) -> Self {
        let mut set = RoleSet::new();
        set.update(&roles);
        set
    }
}

impl<const N: usize> From<[Role; N]> for RoleSet {
    fn from(roles: [Role; N]) -> Self {
        let mut set = RoleSet::new();
        set.update(&roles);
        set
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.0.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", names.join(","))
    }
}
