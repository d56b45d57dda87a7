//! Property-Based Tests for ceph-rollover
//!
//! Uses proptest for invariants of the pure parts of a run:
//! - Role string round-trips and role-set merging
//! - OSD device enumeration
//! - Volume allocation bookkeeping

use proptest::prelude::*;

use rollover::config::AnsibleVars;
use rollover::inventory::{osd_devices, usable_osd_devices, virtio_disk_name};
use rollover::types::{Role, RoleSet};
use rollover::{CephNode, FakeNode, RolloverError};

// =============================================================================
// Role Property Tests
// =============================================================================

/// Strategy for generating valid Role variants
fn role_strategy() -> impl Strategy<Value = Role> {
    prop_oneof![
        Just(Role::Mon),
        Just(Role::Mgr),
        Just(Role::Osd),
        Just(Role::Mds),
        Just(Role::Rgw),
        Just(Role::Client),
        Just(Role::Installer),
    ]
}

proptest! {
    /// Role: to_string → parse round-trip is identity
    #[test]
    fn role_roundtrip(role in role_strategy()) {
        let s = role.to_string();
        let parsed: Role = s.parse().expect("Should parse");
        prop_assert_eq!(role, parsed);
    }

    /// RoleSet: merging keeps every role exactly once
    #[test]
    fn role_set_update_deduplicates(
        initial in prop::collection::vec(role_strategy(), 0..5),
        added in prop::collection::vec(role_strategy(), 0..5),
    ) {
        let mut set = RoleSet::new();
        set.update(&initial);
        set.update(&added);

        for role in initial.iter().chain(added.iter()) {
            prop_assert!(set.contains(*role));
        }
        let roles: Vec<Role> = set.iter().collect();
        for (i, role) in roles.iter().enumerate() {
            prop_assert!(!roles[i + 1..].contains(role));
        }
        let mut distinct = initial.clone();
        distinct.extend(&added);
        distinct.sort_by_key(|r| r.to_string());
        distinct.dedup();
        prop_assert_eq!(set.len(), distinct.len());
    }
}

// =============================================================================
// Device Enumeration Property Tests
// =============================================================================

proptest! {
    /// One device per allocated volume, unique, starting at vdb
    #[test]
    fn devices_unique_and_sequential(count in 0usize..80) {
        let devices = osd_devices(count);
        prop_assert_eq!(devices.len(), count);
        if count > 0 {
            prop_assert_eq!(devices[0].as_str(), "/dev/vdb");
        }
        let mut sorted = devices.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(sorted.len(), count);
    }

    /// Disk names use lowercase letters only after the prefix
    #[test]
    fn disk_names_are_lowercase(index in 0usize..1000) {
        let name = virtio_disk_name(index);
        let suffix = name.strip_prefix("/dev/vd").expect("prefix");
        prop_assert!(!suffix.is_empty());
        prop_assert!(suffix.chars().all(|c| c.is_ascii_lowercase()));
    }

    /// Reserving one listed device removes exactly one device
    #[test]
    fn reserved_device_removes_one(count in 1usize..26, pick in 0usize..26) {
        let reserved = osd_devices(count)[pick % count].clone();
        let mut vars = AnsibleVars::new();
        vars.set("osd_scenario", "non-collocated");
        vars.set(
            "dedicated_devices",
            serde_yaml::Value::Sequence(vec![reserved.clone().into()]),
        );

        let devices = usable_osd_devices(count, &vars);
        prop_assert_eq!(devices.len(), count - 1);
        prop_assert!(!devices.contains(&reserved));
    }
}

// =============================================================================
// Volume Allocation Property Tests
// =============================================================================

proptest! {
    /// Allocation succeeds iff enough volumes are free, and then moves
    /// exactly that many volumes to allocated
    #[test]
    fn allocation_moves_exact_count(free in 0usize..10, required in 0usize..12) {
        let mut node = FakeNode::new("ceph-node1", &[Role::Mds]).with_volumes(free);
        match node.allocate_volumes(required) {
            Ok(()) => {
                prop_assert!(required <= free);
                prop_assert_eq!(node.allocated_volume_count(), required);
                prop_assert_eq!(node.free_volume_count(), free - required);
            }
            Err(RolloverError::InsufficientVolumes { found, .. }) => {
                prop_assert!(required > free);
                prop_assert_eq!(found, free);
                prop_assert_eq!(node.free_volume_count(), free);
            }
            Err(other) => prop_assert!(false, "unexpected error {}", other),
        }
    }
}
