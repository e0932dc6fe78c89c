//! Console poller for the topic-compute server.
//!
//! Drives a server the way a spreadsheet poller would: start a session,
//! subscribe one topic, then repeatedly probe liveness and refresh (waking
//! early when the server signals fresh data), and finally unsubscribe and
//! terminate.

use clap::Parser;
use ctc::{config::ServerConfig, kernel::KernelRegistry, notifier::Notifier, server::Server};
use std::{process, time::Duration};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ctc-console")]
#[command(about = "Emulate a polling client against the topic-compute server", long_about = None)]
struct Args {
    /// Function to compute followed by its arguments, e.g. `Fibonacci 8`
    #[arg(required = true, num_args = 1..)]
    topics: Vec<String>,

    /// Topic id to subscribe under
    #[arg(long, default_value = "12345")]
    topic_id: i32,

    /// Number of refresh rounds before unsubscribing
    #[arg(long, default_value = "5")]
    polls: u32,

    /// Refresh period in milliseconds when no signal arrives
    #[arg(long, default_value = "2000")]
    interval_ms: u64,

    /// Artificial delay before each computation, in milliseconds
    #[arg(long, default_value = "3000")]
    latency_ms: u64,

    /// Compute pool size (0 = one per CPU)
    #[arg(long, default_value = "0")]
    workers: usize,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    if let Err(err) = run(&args) {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), ctc::server::ServerError> {
    let config = ServerConfig::default()
        .with_worker_threads(args.workers)
        .with_simulated_latency(Duration::from_millis(args.latency_ms));
    let (notifier, signals) = Notifier::channel();
    let server = Server::start(notifier, KernelRegistry::default(), &config)?;

    if let Some(value) = server.subscribe_topics(args.topic_id, args.topics.as_slice(), true) {
        println!("subscribe({}) = {value}", args.topic_id);
    }

    let interval = Duration::from_millis(args.interval_ms);
    for round in 1..=args.polls {
        let signalled = signals.recv_timeout(interval).is_ok();
        println!("heartbeat = {}", server.heartbeat());
        let refresh = server.refresh_all();
        for (topic_id, value) in &refresh.topics {
            println!("round {round}: topic {topic_id} = {value} (signalled: {signalled})");
        }
    }

    server.unsubscribe(args.topic_id);
    server.terminate()
}
