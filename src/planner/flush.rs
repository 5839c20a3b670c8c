use tracing::{debug, info, info_span};

use super::{ensure_nodes_exist, load, FlushOptions, PlanSummary};
use crate::cluster::{Cluster, Extremum, Node};
use crate::errors::{PlanningError, VmanResult};

/// Empty the `targets` nodes of migrateable VMs, in the given order.
///
/// Each VM goes to the least loaded online node that is neither a target nor
/// excluded. `max_migrations` caps the relocations across all targets;
/// once it is reached nothing further is touched. With `only_ha`, VMs not
/// managed by HA stay where they are and do not count toward the cap.
pub fn flush(
    cluster: &mut Cluster,
    targets: &[String],
    options: &FlushOptions,
) -> VmanResult<PlanSummary> {
    ensure_nodes_exist(cluster, targets)?;
    ensure_nodes_exist(cluster, &options.exclude)?;

    let span = info_span!(
        "flush",
        targets = ?targets,
        only_ha = options.only_ha,
        max_migrations = options.max_migrations
    );
    let _guard = span.enter();

    let receiver = |node: &Node| {
        node.is_online()
            && !targets.iter().any(|t| t == node.name())
            && !options.exclude.contains(node.name())
    };
    let mut summary = PlanSummary::default();

    'targets: for target in targets {
        let vms: Vec<(u32, bool)> = cluster
            .node(target)
            .map(|node| {
                node.migrateable_vms()
                    .iter()
                    .map(|vm| (vm.id(), vm.is_ha_managed()))
                    .collect()
            })
            .unwrap_or_default();

        for (vm_id, ha_managed) in vms {
            if summary.relocations >= options.max_migrations {
                info!(limit = options.max_migrations, "migration limit reached");
                break 'targets;
            }
            if options.only_ha && !ha_managed {
                debug!(vm = vm_id, "skipping VM not managed by HA");
                continue;
            }

            let low = cluster
                .nodes()
                .extremum(Extremum::Lowest, load, receiver)
                .ok_or(PlanningError::NoFlushTarget)?
                .name()
                .to_string();

            cluster.relocate(vm_id, target, &low)?;
            summary.relocations += 1;
            debug!(vm = vm_id, from = %target, to = %low, "planned relocation");
        }
    }

    summary.converged = targets.iter().all(|target| {
        cluster
            .node(target)
            .map_or(true, |node| node.migrateable_vms().is_empty())
    });

    info!(
        relocations = summary.relocations,
        converged = summary.converged,
        "flush planned"
    );
    Ok(summary)
}
