use tracing::{debug, info, info_span, warn};

use super::{ensure_nodes_exist, load, BalanceOptions, PlanSummary};
use crate::cluster::{percent, Cluster, Extremum, Node, Vm};
use crate::errors::{PlanningError, VmanResult};

/// Move VMs from the most to the least loaded node until the spread of VM
/// memory utilization between online, non-excluded nodes drops below the
/// threshold or `iterations` moves have been made.
///
/// Running out of iterations is not an error; the summary reports whether
/// the cluster converged.
pub fn balance(cluster: &mut Cluster, options: &BalanceOptions) -> VmanResult<PlanSummary> {
    ensure_nodes_exist(cluster, &options.exclude)?;

    let span = info_span!(
        "balance",
        iterations = options.iterations,
        threshold = options.threshold_percent,
        excluded = options.exclude.len()
    );
    let _guard = span.enter();

    let eligible = |node: &Node| node.is_online() && !options.exclude.contains(node.name());
    let mut summary = PlanSummary::default();

    loop {
        let (high, low) = {
            let nodes = cluster.nodes();
            let high = nodes
                .extremum(Extremum::Highest, load, eligible)
                .ok_or(PlanningError::NoSourceNode)?;
            let low = nodes
                .extremum(Extremum::Lowest, load, eligible)
                .ok_or(PlanningError::NoTargetNode)?;

            let spread = load(high).abs_diff(load(low));
            if spread < options.threshold_percent || high.name() == low.name() {
                debug!(spread, high = high.name(), low = low.name(), "cluster balanced");
                summary.converged = true;
                break;
            }

            if summary.relocations >= options.iterations {
                info!(spread, "iteration limit reached before balancing");
                break;
            }

            (high.name().to_string(), low.name().to_string())
        };

        let Some(vm_id) = candidate(cluster, &high, &low) else {
            warn!(node = %high, target = %low, "no migrateable VM narrows the spread");
            break;
        };

        cluster.relocate(vm_id, &high, &low)?;
        summary.relocations += 1;
        debug!(vm = vm_id, from = %high, to = %low, "planned relocation");
    }

    info!(
        relocations = summary.relocations,
        converged = summary.converged,
        "balance planned"
    );
    Ok(summary)
}

/// VM to move from `high` to `low`.
///
/// Only a VM whose move makes the load gap between the two nodes strictly
/// smaller qualifies. A VM that was already moved onto `high` during this
/// run is tried first, as moving it again does not displace another VM from
/// its home. Otherwise any migrateable VM is tried. Within each group the
/// last VM in the node's child order wins: ascending id for untouched nodes,
/// most recently placed for nodes that received VMs.
fn candidate(cluster: &Cluster, high: &str, low: &str) -> Option<u32> {
    let high = cluster.node(high)?;
    let low = cluster.node(low)?;
    let spread = load(high).abs_diff(load(low));

    let narrows = |vm: &&Vm| {
        let after_high = percent(high.vm_mem_used().saturating_sub(vm.mem_used()), high.mem_total());
        let after_low = percent(low.vm_mem_used() + vm.mem_used(), low.mem_total());
        after_high.abs_diff(after_low) < spread
    };

    let vms = high.vms();
    let moved = vms
        .iter()
        .rev()
        .filter(|vm| vm.needs_move(high.name()))
        .find(narrows);

    moved
        .or_else(|| vms.iter().rev().filter(|vm| vm.is_migrateable()).find(narrows))
        .map(|vm| vm.id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{Vm, VmType};

    fn node(name: &str, vms: &[(u32, u64)]) -> Node {
        let mut node = Node::new(name, 1000, 0, 1);
        for &(id, mem) in vms {
            node.vms_mut()
                .add(Vm::new(id, VmType::Qemu, name).with_memory(mem, mem).with_migrateable(true))
                .unwrap();
        }
        node
    }

    #[test]
    fn test_candidate_prefers_already_moved_vm() {
        let mut cluster = Cluster::new();
        cluster.add_node(node("a", &[(1, 10), (2, 10)])).unwrap();
        cluster.add_node(node("b", &[(3, 10)])).unwrap();
        cluster.add_node(node("c", &[])).unwrap();
        cluster.relocate(3, "b", "a").unwrap();
        cluster.relocate(1, "a", "b").unwrap();

        assert_eq!(candidate(&cluster, "a", "c"), Some(3));
        assert_eq!(candidate(&cluster, "b", "c"), Some(1));
    }

    #[test]
    fn test_candidate_skips_pinned_vms() {
        let mut cluster = Cluster::new();
        let mut pinned = Node::new("a", 1000, 0, 1);
        pinned
            .vms_mut()
            .add(Vm::new(1, VmType::Qemu, "a").with_memory(10, 10))
            .unwrap();
        cluster.add_node(pinned).unwrap();
        cluster.add_node(node("b", &[])).unwrap();

        assert_eq!(candidate(&cluster, "a", "b"), None);
    }

    #[test]
    fn test_candidate_must_narrow_the_gap() {
        let mut cluster = Cluster::new();
        cluster.add_node(node("a", &[(1, 600), (2, 300)])).unwrap();
        cluster.add_node(node("b", &[(3, 100)])).unwrap();

        // moving 2 leaves 60 vs 40, moving 1 would leave 30 vs 70
        assert_eq!(candidate(&cluster, "a", "b"), Some(2));

        cluster.relocate(2, "a", "b").unwrap();
        assert_eq!(candidate(&cluster, "a", "b"), None);
    }

    #[test]
    fn test_candidate_falls_back_when_moved_vm_is_too_big() {
        let mut cluster = Cluster::new();
        cluster.add_node(node("a", &[(1, 100), (2, 100)])).unwrap();
        cluster.add_node(node("b", &[(3, 300)])).unwrap();
        cluster.add_node(Node::new("c", 200, 0, 1)).unwrap();
        cluster.relocate(3, "b", "a").unwrap();

        // a is at 50, c at 0: 3 would leave 20 vs 150, 2 leaves 40 vs 50
        assert_eq!(candidate(&cluster, "a", "c"), Some(2));
    }
}
