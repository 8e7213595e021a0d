use clap::Parser;
use eve_tail::{TailConfig, watch_events};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Follow a Suricata eve.json log and print each event as one JSON line.
#[derive(Debug, Parser)]
#[command(name = "eve-tail", version)]
struct Args {
    /// Path to the event log (falls back to $SURICATA_EVE_PATH, then the default location)
    path: Option<PathBuf>,

    /// Log location as a file:// URL
    #[arg(long)]
    url: Option<String>,

    /// Seconds between polls when no new data is available
    #[arg(long, default_value_t = 0.2)]
    poll_interval: f64,

    /// Number of recent events replayed at start
    #[arg(long, default_value_t = 200)]
    backlog: usize,

    /// Diagnostic output format on stderr: "pretty" or "json"
    #[arg(long, default_value = "pretty")]
    log_format: String,
}

fn init_tracing(log_format: &str) -> Result<(), String> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| format!("failed to initialize JSON tracing subscriber: {}", e)),
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| format!("failed to initialize pretty tracing subscriber: {}", e)),
        other => Err(format!(
            "unknown log format '{}', expected 'json' or 'pretty'",
            other
        )),
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = init_tracing(&args.log_format) {
        eprintln!("{}", e);
        process::exit(1);
    }

    let mut config = TailConfig::default().with_backlog_max_records(args.backlog);
    config.poll_interval_seconds = args.poll_interval;
    if let Some(path) = args.path {
        config = config.with_path(path);
    }
    if let Some(url) = args.url {
        config = config.with_url(url);
    }

    let mut stream = match watch_events(config).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("Error setting up event log follower: {}", e);
            process::exit(1);
        }
    };
    tracing::info!(path = %stream.path().display(), "following event log");

    loop {
        tokio::select! {
            record = stream.recv() => match record {
                Some(record) => println!("{}", record),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                stream.close();
                break;
            }
        }
    }

    // Give the follower a moment to release the file before exiting.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while !stream.is_finished() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
