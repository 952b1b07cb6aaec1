//! shop-sync - Refresh engagement metrics for published posts

use clap::Parser;
use libshopcast::{Config, Result, ShopcastService, SyncScope};

#[derive(Parser, Debug)]
#[command(name = "shop-sync")]
#[command(version)]
#[command(about = "Refresh engagement metrics for published posts")]
#[command(long_about = "\
shop-sync - Refresh engagement metrics for published posts

DESCRIPTION:
    Fetches likes, comments, saves, reach and impressions for posted rows
    and stores the engagement rate. By default only rows not refreshed
    within [sync] freshness and published within [sync] max_age are
    checked. Media removed on the platform is marked deleted.

USAGE:
    shop-sync            # stale rows only
    shop-sync --all      # every posted row
    shop-sync --post ID  # one row

EXIT CODES:
    0 - Success (per-post fetch errors are recorded on the post)
    1 - Runtime error
    2 - Configuration or credential error
    3 - Invalid input
")]
struct Cli {
    /// Refresh every posted row regardless of age
    #[arg(long, conflicts_with = "post")]
    all: bool,

    /// Refresh a single post
    #[arg(long, value_name = "POST_ID")]
    post: Option<String>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn scope(&self) -> SyncScope {
        match (&self.post, self.all) {
            (Some(id), _) => SyncScope::Single(id.clone()),
            (None, true) => SyncScope::All,
            (None, false) => SyncScope::Stale,
        }
    }
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
    let service = ShopcastService::from_config(config).await?;

    let report = service
        .run_engagement_sync(&cli.scope(), chrono::Utc::now().timestamp())
        .await?;

    println!(
        "checked {}, updated {}, failed {}, deleted {}",
        report.checked, report.updated, report.failed, report.deleted
    );
    Ok(())
}
