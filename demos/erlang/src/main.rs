use clap::Parser;
use flowsim::core::{
    constants, Holder, Link, Node, NodeId, SimOpts, Simulation, StopReason, Time, Topology,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Slots on the link
    #[arg(short, long, default_value_t = 4)]
    capacity: usize,

    /// Offered load in Erlangs
    #[arg(short, long, default_value_t = 3.0)]
    load: f64,

    /// Convergence threshold on the blocking rate
    #[arg(short, long, default_value_t = 0.001)]
    epsilon: f64,

    /// Random seed
    #[arg(short, long, default_value_t = 0)]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    anyhow::ensure!(args.capacity > 0, "capacity must be positive");
    anyhow::ensure!(args.load > 0.0, "load must be positive");

    let (nodes, links) = single_link_config(args.capacity, args.load)?;
    let topology = Topology::new(&nodes, &links)?;
    let opts = SimOpts::builder()
        .seed(args.seed)
        .epsilon(args.epsilon)
        .end_time(Time::new(1e7))
        .build();
    let mut sim = Simulation::new(topology, &opts, &[])?;
    let reason = sim.run()?;
    if reason != StopReason::Converged {
        eprintln!("warning: stopped without converging ({reason:?})");
    }

    let mut results = sim.into_results();
    let measured = results.get(Holder::General, constants::BLOCKING_RATE);
    let expected = erlang_b(args.load, args.capacity);
    println!("Measured blocking rate: {measured:.4}");
    println!("Erlang-B blocking rate: {expected:.4}");
    println!("Relative error: {:.2}%", 100.0 * (measured - expected).abs() / expected);
    Ok(())
}

/// A source and a sink joined by one link with `capacity` slots. Flows have a mean holding time
/// of one unit, so the arrival rate equals the offered load.
fn single_link_config(capacity: usize, load: f64) -> anyhow::Result<(Vec<Node>, Vec<Link>)> {
    let source = Node::new(NodeId::new(0), load, 1.0)?.with_name("source");
    let sink = Node::new(NodeId::new(1), 0.0, 1.0)?.with_name("sink");
    let link = Link::unidirectional(source.id, sink.id, capacity, 1.0);
    Ok((vec![source, sink], vec![link]))
}

/// Blocking probability of an M/M/c/c system with offered load `load`, by the usual recurrence.
fn erlang_b(load: f64, capacity: usize) -> f64 {
    (1..=capacity).fold(1.0, |b, c| load * b / (c as f64 + load * b))
}
