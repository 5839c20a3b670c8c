/*
* vman command line interface
* ---------------------------
*
* vman
* ├── balance [-n] [-c N] [-t PCT] [-x NODE]...     even out VM memory across nodes
* ├── flush [-n] [-c N] [-o] [-x NODE]... <node>... move migrateable VMs off nodes
* ├── status                                         per-node memory and VM counts
* ├── vmiostat [-i SECS] [-c N] [-l VMID] [-t] [-s]  block I/O rates per VM
* └── init [--force] [--dir DIR]                     write default.toml
*
* -v raises log verbosity (repeatable), --config adds a config file on top of
* the config dir.
*
* balance and flush plan on a copy of the cluster snapshot, print the current
* and the planned state, then run the migrations unless -n is given.
*/

pub mod status;

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn, Level};

use crate::cluster::{Cluster, ClusterSnapshot};
use crate::config::{generate_default_config, Settings, DEFAULT_CONFIG_DIR};
use crate::core::{PveFiles, PveshRunner, SnapshotSource};
use crate::migration::{migrations, Executor};
use crate::monitoring::VmIoSampler;
use crate::planner::{self, PlanSummary};

#[derive(Parser)]
#[command(name = "vman")]
#[command(version, about = "VM placement for Proxmox VE clusters", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Additional configuration file
    #[arg(long, value_name = "CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// More output, repeat for more
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Migrate VMs to reach an even distribution across nodes
    Balance(BalanceArgs),
    /// Migrate VMs away from the given nodes
    Flush(FlushArgs),
    /// Show the current cluster status
    Status,
    /// Print I/O stats of running VMs
    Vmiostat(IostatArgs),
    /// Generate default configuration
    Init {
        #[arg(short, long)]
        force: bool,

        /// Target directory, defaults to the config dir
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct BalanceArgs {
    /// Plan and print, but do not migrate
    #[arg(short = 'n', long)]
    pub noexec: bool,

    /// Maximum number of migrations
    #[arg(short, long)]
    pub count: Option<usize>,

    /// Accepted spread of VM memory usage in percent
    #[arg(short, long)]
    pub threshold: Option<u64>,

    /// Node to leave alone, may be repeated
    #[arg(short = 'x', long = "exclude", value_name = "NODE")]
    pub exclude: Vec<String>,
}

#[derive(Args)]
pub struct FlushArgs {
    /// Plan and print, but do not migrate
    #[arg(short = 'n', long)]
    pub noexec: bool,

    /// Maximum number of migrations
    #[arg(short, long)]
    pub count: Option<usize>,

    /// Only move HA managed VMs
    #[arg(short = 'o', long)]
    pub onlyha: bool,

    /// Node never used as a migration target, may be repeated
    #[arg(short = 'x', long = "exclude", value_name = "NODE")]
    pub exclude: Vec<String>,

    /// Nodes to flush
    #[arg(required = true, value_name = "NODE")]
    pub nodes: Vec<String>,
}

#[derive(Args)]
pub struct IostatArgs {
    /// Seconds between samples
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,

    /// Number of reports, 0 runs until interrupted
    #[arg(short, long, default_value_t = 0)]
    pub count: u64,

    /// Only show the VM with this id (0 = all)
    #[arg(short, long, default_value_t = 0)]
    pub limit: u32,

    /// Also report the initial totals
    #[arg(short, long)]
    pub totals: bool,

    /// Only print the total line
    #[arg(short, long)]
    pub sum: bool,
}

pub fn log_level(verbose: u8) -> Level {
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(log_level(cli.verbose))
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config;
    let settings = || Settings::load(config.as_deref()).context("failed to load configuration");

    match cli.command {
        Commands::Init { force, dir } => handle_init_command(force, dir)?,
        Commands::Balance(args) => handle_balance_command(args, &settings()?).await?,
        Commands::Flush(args) => handle_flush_command(args, &settings()?).await?,
        Commands::Status => {
            let snapshot = load_snapshot(&settings()?).await?;
            status::print_state(snapshot.cluster());
        }
        Commands::Vmiostat(args) => handle_vmiostat_command(args, &settings()?).await?,
    }

    Ok(())
}

async fn load_snapshot(settings: &Settings) -> anyhow::Result<ClusterSnapshot> {
    let source = SnapshotSource::new(
        PveshRunner::new(settings.pve.pvesh_bin.clone()),
        PveFiles::new(settings.pve.base_path.clone()),
        settings.storage.migrateable_types.clone(),
    );
    source
        .load()
        .await
        .context("failed to load cluster snapshot")
}

async fn handle_balance_command(args: BalanceArgs, settings: &Settings) -> anyhow::Result<()> {
    let mut options = settings.balance_options();
    if let Some(count) = args.count {
        options.iterations = count;
    }
    if let Some(threshold) = args.threshold {
        options.threshold_percent = threshold;
    }
    options.exclude.extend(args.exclude);

    let snapshot = load_snapshot(settings).await?;
    let mut planned = snapshot.working_copy();
    let summary = planner::balance(&mut planned, &options)?;
    if !summary.converged {
        warn!(
            relocations = summary.relocations,
            "cluster not balanced within {}%", options.threshold_percent
        );
    }

    apply(&snapshot, &planned, summary, settings, args.noexec).await
}

async fn handle_flush_command(args: FlushArgs, settings: &Settings) -> anyhow::Result<()> {
    let mut options = settings.flush_options();
    if let Some(count) = args.count {
        options.max_migrations = count;
    }
    options.only_ha = args.onlyha;
    options.exclude.extend(args.exclude);

    let snapshot = load_snapshot(settings).await?;
    let mut planned = snapshot.working_copy();
    let summary = planner::flush(&mut planned, &args.nodes, &options)?;
    if !summary.converged {
        warn!(
            relocations = summary.relocations,
            "migrateable VMs left on {}", args.nodes.join(", ")
        );
    }

    apply(&snapshot, &planned, summary, settings, args.noexec).await
}

async fn apply(
    snapshot: &ClusterSnapshot,
    planned: &Cluster,
    summary: PlanSummary,
    settings: &Settings,
    noexec: bool,
) -> anyhow::Result<()> {
    let migrations = migrations(planned);

    println!("{}", "===== Current state =====".bold());
    status::print_state(snapshot.cluster());
    println!("{}", "======= New state =======".bold());
    status::print_state(planned);
    println!();
    status::print_migrations(&migrations);

    info!(
        relocations = summary.relocations,
        migrations = migrations.len(),
        "plan ready"
    );

    let executor = Executor::new(PveshRunner::new(settings.pve.pvesh_bin.clone())).dry_run(noexec);
    let report = executor
        .execute(&migrations)
        .await
        .context("migration run aborted, completed migrations stay in place")?;

    if report.dry_run {
        println!("{} {} migrations planned, none run", "✓".green(), report.commands.len());
    } else {
        println!("{} {} migrations completed", "✓".green(), report.completed);
    }
    Ok(())
}

async fn handle_vmiostat_command(args: IostatArgs, settings: &Settings) -> anyhow::Result<()> {
    let mut sampler = VmIoSampler::new(
        settings.pve.qmp_socket_dir.clone(),
        Duration::from_secs(args.interval),
    );

    // the first sample only primes the counters
    let mut count = args.count;
    if !args.totals && count > 0 {
        count += 1;
    }

    let mut ticker = tokio::time::interval(sampler.interval());
    let mut round = 0u64;

    while count == 0 || round < count {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
            _ = ticker.tick() => {}
        }
        round += 1;

        let sample = sampler.sample().await?;
        if round > 1 || args.totals {
            for line in status::render_iostat(&sample, args.limit, args.sum) {
                println!("{}", line);
            }
            println!();
        }
    }

    Ok(())
}

fn handle_init_command(force: bool, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let config_dir = dir.unwrap_or_else(|| {
        PathBuf::from(
            std::env::var("VMAN_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_DIR.to_string()),
        )
    });
    let target = config_dir.join("default.toml");

    if target.exists() && !force {
        error!("{} already exists. Use --force to overwrite.", target.display());
        return Ok(());
    }

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("failed to create {}", config_dir.display()))?;
    let config_str = toml::to_string_pretty(&generate_default_config())?;
    std::fs::write(&target, config_str)
        .with_context(|| format!("failed to write {}", target.display()))?;

    println!("{} Default configuration written to {}", "✓".green(), target.display());
    Ok(())
}
