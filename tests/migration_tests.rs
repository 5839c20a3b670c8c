use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use pve_vman::cluster::{Cluster, ClusterSnapshot, Node, Vm, VmType};
use pve_vman::migration::migrations;

const NODES: [&str; 4] = ["pve1", "pve2", "pve3", "pve4"];

fn random_snapshot(rng: &mut StdRng) -> ClusterSnapshot {
    let mut cluster = Cluster::new();
    let mut next_id = 100;

    for name in NODES {
        let mut node = Node::new(name, 256 << 30, 64 << 30, 86400);
        for _ in 0..rng.gen_range(0..12) {
            let vm_type = if rng.gen_bool(0.3) { VmType::Lxc } else { VmType::Qemu };
            let mem = rng.gen_range(1..16u64) << 30;
            node.vms_mut()
                .add(
                    Vm::new(next_id, vm_type, name)
                        .with_memory(mem / 2, mem)
                        .with_migrateable(true),
                )
                .unwrap();
            next_id += 1;
        }
        cluster.add_node(node).unwrap();
    }

    ClusterSnapshot::new(cluster)
}

fn displaced(cluster: &Cluster) -> usize {
    cluster
        .vms()
        .filter(|(node, vm)| node.name() != vm.origin_node())
        .count()
}

#[test]
fn test_migration_count_matches_displaced_vms() {
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _ in 0..50 {
        let snapshot = random_snapshot(&mut rng);
        let mut planned = snapshot.working_copy();

        for _ in 0..rng.gen_range(0..40) {
            let placed: Vec<(u32, String)> = planned
                .vms()
                .map(|(node, vm)| (vm.id(), node.name().to_string()))
                .collect();
            let Some((vm_id, from)) = placed.choose(&mut rng) else {
                break;
            };
            let to = NODES.choose(&mut rng).unwrap();
            if *to == from.as_str() {
                continue;
            }
            planned.relocate(*vm_id, from, to).unwrap();
        }

        let list = migrations(&planned);
        assert_eq!(list.len(), displaced(&planned));
        assert_eq!(planned.vm_count(|_| true), snapshot.cluster().vm_count(|_| true));

        for migration in &list {
            let (node, vm) = planned.find_vm(migration.vm_id).unwrap();
            assert_eq!(migration.target, node.name());
            assert_eq!(migration.source, vm.origin_node());
            assert_eq!(migration.vm_type, vm.vm_type());
            assert_ne!(migration.source, migration.target);

            let (home, _) = snapshot.cluster().find_vm(migration.vm_id).unwrap();
            assert_eq!(home.name(), migration.source);
        }

        assert!(migrations(snapshot.cluster()).is_empty());
    }
}

#[test]
fn test_vm_moved_back_home_needs_no_migration() {
    let mut rng = StdRng::seed_from_u64(7);
    let snapshot = random_snapshot(&mut rng);
    let mut planned = snapshot.working_copy();

    let Some((id, home)) = planned
        .vms()
        .next()
        .map(|(node, vm)| (vm.id(), node.name().to_string()))
    else {
        return;
    };
    let away = NODES.iter().find(|n| **n != home).unwrap();

    planned.relocate(id, &home, away).unwrap();
    assert_eq!(migrations(&planned).len(), 1);

    planned.relocate(id, away, &home).unwrap();
    assert!(migrations(&planned).is_empty());
}

#[test]
fn test_migration_command_line() {
    let mut cluster = Cluster::new();
    let mut node = Node::new("pve1", 1024, 0, 1);
    node.vms_mut()
        .add(Vm::new(101, VmType::Lxc, "pve1").with_migrateable(true))
        .unwrap();
    cluster.add_node(node).unwrap();
    cluster.add_node(Node::new("pve2", 1024, 0, 1)).unwrap();

    let mut planned = ClusterSnapshot::new(cluster).working_copy();
    planned.relocate(101, "pve1", "pve2").unwrap();

    let list = migrations(&planned);
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].to_string(), "Migration: VM 101 from pve1 to pve2");
    assert_eq!(
        list[0].command().to_string(),
        "pvesh create /nodes/pve1/lxc/101/migrate -target pve2 -online 1"
    );
}
