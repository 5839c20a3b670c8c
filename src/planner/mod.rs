//! Placement planning on a working copy of the cluster.
//!
//! Both planners mutate the [`Cluster`] they are handed and never touch the
//! snapshot it was copied from. The resulting placement is turned into
//! migrations by [`crate::migration::migrations`].

pub mod balance;
pub mod flush;

pub use balance::balance;
pub use flush::flush;

use std::collections::BTreeSet;

use crate::cluster::{Cluster, Node};
use crate::errors::InputError;

/// Upper bound on relocations per invocation for both planners.
pub const MAX_MIGRATIONS: usize = 150;

/// Maximum spread of VM memory utilization (in percent) that counts as balanced.
pub const DEFAULT_THRESHOLD_PERCENT: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceOptions {
    pub iterations: usize,
    pub threshold_percent: u64,
    pub exclude: BTreeSet<String>,
}

impl Default for BalanceOptions {
    fn default() -> Self {
        Self {
            iterations: MAX_MIGRATIONS,
            threshold_percent: DEFAULT_THRESHOLD_PERCENT,
            exclude: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushOptions {
    pub only_ha: bool,
    pub max_migrations: usize,
    pub exclude: BTreeSet<String>,
}

impl Default for FlushOptions {
    fn default() -> Self {
        Self {
            only_ha: false,
            max_migrations: MAX_MIGRATIONS,
            exclude: BTreeSet::new(),
        }
    }
}

/// Outcome of a planning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlanSummary {
    /// VM moves applied to the working copy, including repeated moves of the same VM.
    pub relocations: usize,
    /// Balance: spread is below the threshold. Flush: no migrateable VM is
    /// left on any target node.
    pub converged: bool,
}

/// Every name must be a node of `cluster`.
pub(crate) fn ensure_nodes_exist<'a, I>(cluster: &Cluster, names: I) -> Result<(), InputError>
where
    I: IntoIterator<Item = &'a String>,
{
    for name in names {
        if !cluster.contains_node(name) {
            return Err(InputError::UnknownNode { node: name.clone() });
        }
    }
    Ok(())
}

/// Metric both planners balance on.
pub(crate) fn load(node: &Node) -> u64 {
    node.vm_used_percent()
}
