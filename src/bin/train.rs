//! Launch a distributed GCN training run.
//!
//! Usage: `distgcn-train [config.toml|config.json]`
//!
//! Without a path, `distgcn.toml` in the working directory is used when it
//! exists; otherwise options come from `DISTGCN_*` environment variables
//! alone. Environment variables always override file values.
//!
//! With the local transport every rank runs as a thread of this process.
//! With TCP this process is the single rank named by `transport.rank`.

use std::path::Path;

use anyhow::{bail, Context};

use distgcn::config::DEFAULT_CONFIG_FILE;
use distgcn::{
    dataset, run_worker, CommunicationGroup, Config, LocalGroup, TcpGroup, TrainingReport,
    TransportKind,
};

fn load_config() -> anyhow::Result<Config> {
    let mut args = std::env::args().skip(1);
    let path = args.next();
    if args.next().is_some() {
        bail!("usage: distgcn-train [config.toml|config.json]");
    }

    let path = match path {
        Some(path) => Some(path),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => Some(DEFAULT_CONFIG_FILE.to_string()),
        None => None,
    };

    let config = match path {
        Some(path) => {
            let mut config = Config::load_from_file(&path)
                .with_context(|| format!("loading configuration from {}", path))?;
            config.apply_environment_overrides()?;
            config
        }
        None => Config::load_from_environment()?,
    };
    Ok(config)
}

fn print_report(report: &TrainingReport, timing: bool) {
    if timing {
        for line in report.timings.report_lines(report.rank) {
            println!("{}", line);
        }
    }
    if report.rank == 0 {
        println!("rank: {} {:?}", report.rank, report.output);
    }
}

fn main() -> anyhow::Result<()> {
    distgcn::init_logging();

    let config = load_config()?;
    let timing = config.enable_timing()?;
    let graph_name = config.graph_name()?;
    log::info!(
        "Arguments: epochs: {} graph: {} timing: {} mid: {} world size: {}",
        config.epochs()?,
        graph_name,
        timing,
        config.hidden_layer_width()?,
        config.world_size
    );

    let data = dataset::load(&graph_name, &config.dataset, config.seed)
        .with_context(|| format!("loading graph '{}'", graph_name))?;

    match config.transport.kind {
        TransportKind::Local => {
            let reports = LocalGroup::run(config.world_size, |group| {
                log::info!("rank {} using device {}", group.rank(), config.device_id(group.rank()));
                run_worker(group, &data, &config)
            })?;
            for report in &reports {
                print_report(report, timing);
            }
        }
        TransportKind::Tcp => {
            let peers = config.transport.peer_addresses()?;
            let rank = config.transport.rank;
            log::info!("rank {} using device {}", rank, config.device_id(rank));
            let group = TcpGroup::connect(rank, &peers, config.transport.connect_timeout())
                .with_context(|| format!("joining the TCP group as rank {}", rank))?;
            let report = run_worker(&group, &data, &config)?;
            print_report(&report, timing);
        }
    }

    Ok(())
}
