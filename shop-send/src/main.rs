//! shop-send - Publish due posts
//!
//! Runs the dispatcher once or keeps polling the queue until stopped.

use clap::Parser;
use libshopcast::dispatcher::DispatchStatus;
use libshopcast::{BatchResult, Config, Result, ShopcastError, ShopcastService};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "shop-send")]
#[command(version)]
#[command(about = "Publish scheduled shop posts that are due")]
#[command(long_about = "\
shop-send - Publish scheduled shop posts that are due

DESCRIPTION:
    shop-send claims every queued post whose time has come and publishes it
    to Instagram, Facebook or Pinterest. Each post ends up posted or failed;
    failed posts keep their error until reset with `shop-queue reset`.

    Posts left in processing by a crashed run are requeued once their lease
    expires (see [dispatcher] lease).

USAGE:
    # Publish everything due right now and exit
    shop-send --once

    # Keep polling every 30 seconds
    shop-send --poll-interval 30

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current batch)

CONFIGURATION:
    Configuration file: ~/.config/shopcast/config.toml (or SHOPCAST_CONFIG)

    [dispatcher]
    lease = \"10m\"       # how long a claimed post stays reserved
    batch_size = 50     # posts per run
    poll_interval = 60  # seconds between polls

EXIT CODES:
    0 - Success / clean shutdown
    1 - Runtime error
    2 - Configuration or credential error
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    poll_interval: Option<u64>,

    /// Process due posts once and exit
    #[arg(long)]
    once: bool,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    libshopcast::logging::init_for_cli(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let poll_interval = cli.poll_interval.unwrap_or(config.dispatcher.poll_interval);
    let service = ShopcastService::from_config(config).await?;

    if cli.once {
        let batch = service.run_dispatcher(chrono::Utc::now().timestamp()).await?;
        print_batch(&batch);
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;
    info!(poll_interval, "shop-send polling");

    while !shutdown.load(Ordering::Relaxed) {
        match service.run_dispatcher(chrono::Utc::now().timestamp()).await {
            Ok(batch) => print_batch(&batch),
            // Credentials can be fixed while we keep running
            Err(e) => error!("Dispatch run failed: {}", e),
        }

        for _ in 0..poll_interval {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            sleep(Duration::from_secs(1)).await;
        }
    }

    info!("shop-send stopped");
    Ok(())
}

fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| ShopcastError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            info!("Received shutdown signal, stopping after the current batch");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    Ok(())
}

fn print_batch(batch: &BatchResult) {
    for outcome in &batch.outcomes {
        match &outcome.status {
            DispatchStatus::Posted(published) => {
                println!(
                    "{}\t{}\tposted\t{}",
                    outcome.post_id, outcome.platform, published.permalink
                )
            }
            DispatchStatus::Failed(message) => {
                println!("{}\t{}\tfailed\t{}", outcome.post_id, outcome.platform, message)
            }
            DispatchStatus::Skipped => {
                println!("{}\t{}\tskipped", outcome.post_id, outcome.platform)
            }
        }
    }
    eprintln!(
        "posted {}, failed {}, skipped {}, requeued {}",
        batch.posted, batch.failed, batch.skipped, batch.reclaimed
    );
}
