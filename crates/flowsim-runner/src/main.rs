use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;

mod replicas;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (JSON or Dhall)
    config: PathBuf,

    /// Seed of the first replica. Defaults to the seed in the configuration
    #[arg(short, long)]
    seed: Option<u64>,

    /// Number of replicas, seeded consecutively
    #[arg(short, long, default_value_t = 1)]
    replicas: u64,

    /// Print the recorded snapshots of this value
    #[arg(long)]
    sample: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    anyhow::ensure!(args.replicas > 0, "at least one replica is required");

    let config = flowsim_utils::read_simulation(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    let first = args.seed.unwrap_or(config.opts.seed);
    let seeds = (0..args.replicas)
        .map(|i| first.wrapping_add(i))
        .collect::<Vec<_>>();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .with_context(|| "failed to set interrupt handler")?;

    let reports = replicas::run_replicas(&config, seeds, &running)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }
    for report in &reports {
        println!("Replica {} ({:?})", report.seed, report.reason);
        print!("{}", report.results);
        if let Some(name) = &args.sample {
            let line = report
                .results
                .snapshots(name)
                .map(|(t, v)| format!("{} {v}", t.into_f64()))
                .collect::<Vec<_>>()
                .join(" ");
            println!("{name}: {line}");
        }
    }
    Ok(())
}
