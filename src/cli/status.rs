use colored::Colorize;

use crate::cluster::{Cluster, Node, Vm};
use crate::migration::Migration;
use crate::monitoring::{IoRates, IoSample};
use crate::utils::format_units;

struct Row {
    label: String,
    mem_total: String,
    mem_used: u64,
    vm_used: u64,
    vm_provisioned: u64,
    vms: usize,
    migrateable: usize,
    ha: usize,
}

impl Row {
    fn node(node: &Node) -> Self {
        let mut label = format!("Node {}", node.name());
        if !node.is_online() {
            label.push_str(" (offline)");
        }

        Self {
            label,
            mem_total: format_units(node.mem_total() as f64, 1024.0),
            mem_used: node.mem_used_percent(),
            vm_used: node.vm_used_percent(),
            vm_provisioned: node.vm_provisioned_percent(),
            vms: node.vms().len(),
            migrateable: node.vms().filter(|vm| vm.is_migrateable()).len(),
            ha: node.vms().filter(|vm| vm.is_ha_managed()).len(),
        }
    }

    fn cluster(cluster: &Cluster) -> Self {
        Self {
            label: "Cluster".to_string(),
            mem_total: format_units(cluster.mem_total() as f64, 1024.0),
            mem_used: cluster.mem_used_percent(),
            vm_used: cluster.vm_used_percent(),
            vm_provisioned: cluster.vm_provisioned_percent(),
            vms: cluster.vm_count(|_| true),
            migrateable: cluster.vm_count(Vm::is_migrateable),
            ha: cluster.vm_count(Vm::is_ha_managed),
        }
    }
}

/// Header lines followed by one line per node and a cluster total.
pub fn render_state(cluster: &Cluster) -> (Vec<String>, Vec<String>) {
    let mut rows: Vec<Row> = cluster.nodes().iter().map(Row::node).collect();
    rows.push(Row::cluster(cluster));

    let width = rows.iter().map(|r| r.label.len()).max().unwrap_or(0);

    let header = vec![
        format!(
            "{:width$} | {:^12} | {:^11} | {:^18}",
            "", "Node Mem", "VM Mem Sums", "VM Counts"
        ),
        format!(
            "{:width$} | {:^5} | {:^4} | {:^4} | {:^4} | {:^4} | {:^4} | {:^4}",
            "", "Total", "Used", "Used", "Prov", "Tot.", "Migr", "HA"
        ),
    ];

    let lines = rows
        .iter()
        .map(|r| {
            format!(
                "{:width$} | {:>5} | {:3}% | {:3}% | {:3}% | {:4} | {:4} | {:4}",
                r.label, r.mem_total, r.mem_used, r.vm_used, r.vm_provisioned, r.vms, r.migrateable, r.ha
            )
        })
        .collect();

    (header, lines)
}

pub fn print_state(cluster: &Cluster) {
    let (header, lines) = render_state(cluster);
    for line in header {
        println!("{}", line.bold());
    }
    for line in lines {
        println!("{}", line);
    }
}

pub fn print_migrations(migrations: &[Migration]) {
    if migrations.is_empty() {
        println!("{}", "No migrations needed".green());
        return;
    }
    for (i, migration) in migrations.iter().enumerate() {
        println!("{:>3}. {}", i + 1, migration);
    }
}

/// One line per VM (unless `sum_only`) plus a total line. `limit` restricts
/// the per-VM lines to that VM id, 0 shows all.
pub fn render_iostat(sample: &IoSample, limit: u32, sum_only: bool) -> Vec<String> {
    let line = |label: &str, rates: &IoRates| {
        let v = rates.values().map(|x| format_units(x, 1000.0));
        format!("{:10} {:>15} {:>15} {:>15} {:>15}", label, v[0], v[1], v[2], v[3])
    };

    let k = IoRates::KEYS;
    let mut lines = vec![format!(
        "{:10} {:>15} {:>15} {:>15} {:>15}",
        "VM-ID", k[0], k[1], k[2], k[3]
    )];

    if !sum_only {
        for (vmid, rates) in &sample.per_vm {
            if limit == 0 || limit == *vmid {
                lines.push(line(&vmid.to_string(), rates));
            }
        }
    }
    lines.push(line("total", &sample.total));
    lines
}
