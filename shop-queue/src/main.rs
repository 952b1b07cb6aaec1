//! shop-queue - Manage the post queue
//!
//! Operator surface for listing, approving and retrying posts, filling the
//! queue and storing platform tokens.

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use libshopcast::planner::{AutopilotOutcome, GenerateRequest, RepostRequest};
use libshopcast::scheduling::{parse_posting_times, parse_start};
use libshopcast::{
    Config, Platform, PlatformToken, PostStatus, Result, ScheduledPost, ShopcastError,
    ShopcastService,
};

#[derive(Parser, Debug)]
#[command(name = "shop-queue")]
#[command(version)]
#[command(about = "Manage scheduled shop posts")]
#[command(long_about = "\
shop-queue - Manage scheduled shop posts

COMMANDS:
    list        List posts, newest schedule first
    reset       Put a failed post back in the queue
    approve     Queue a draft post
    generate    Create posts for catalog products
    autopilot   Keep the lookahead window filled
    repost      Resurface posts that performed well
    token       Store platform access tokens

USAGE EXAMPLES:
    shop-queue list --status failed
    shop-queue reset <POST_ID>
    shop-queue generate --count 3 --platform instagram --tone casual --start \"tomorrow 9am\"
    shop-queue autopilot configure --enable --days-ahead 7 --posts-per-day 2 --platform instagram
    shop-queue repost --count 5 --platform pinterest --preview
    shop-queue token set pinterest <TOKEN> --expires-in 60days

CONFIGURATION:
    Configuration file: ~/.config/shopcast/config.toml (or SHOPCAST_CONFIG)

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Configuration or credential error
    3 - Invalid input (bad post ID, platform, time format, etc.)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List posts
    List {
        /// Filter by status (draft, queued, processing, posted, failed, deleted)
        #[arg(short, long)]
        status: Option<String>,

        /// Filter by platform
        #[arg(short, long)]
        platform: Option<String>,

        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Put a failed post back in the queue, clearing its error
    Reset { post_id: String },

    /// Queue a draft post
    Approve { post_id: String },

    /// Create posts for catalog products at free posting slots
    Generate(GenerateArgs),

    /// Inspect or run the autopilot
    Autopilot {
        #[command(subcommand)]
        command: AutopilotCommand,
    },

    /// Schedule reposts of past top performers
    Repost(RepostArgs),

    /// Platform credentials
    Token {
        #[command(subcommand)]
        command: TokenCommand,
    },
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Posts per platform
    #[arg(short, long, default_value = "1")]
    count: usize,

    /// Target platform (repeatable)
    #[arg(short, long = "platform", required = true)]
    platforms: Vec<String>,

    /// Caption tone, used round-robin (repeatable)
    #[arg(short, long = "tone")]
    tones: Vec<String>,

    /// Posting times as HH:MM UTC, comma separated
    #[arg(long, value_delimiter = ',', default_value = "09:00,13:00,18:00")]
    times: Vec<String>,

    /// Earliest slot: "now", "2h", "tomorrow 9am", RFC 3339
    #[arg(long, default_value = "now")]
    start: String,

    /// Create drafts that need `shop-queue approve`
    #[arg(long)]
    draft: bool,
}

#[derive(Subcommand, Debug)]
enum AutopilotCommand {
    /// Top the queue up now
    Run,
    /// Print settings and recent runs
    Show,
    /// Update autopilot settings
    Configure {
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        #[arg(long)]
        disable: bool,
        #[arg(long)]
        days_ahead: Option<u32>,
        #[arg(long)]
        posts_per_day: Option<u32>,
        /// Replaces the platform list (repeatable)
        #[arg(long = "platform")]
        platforms: Vec<String>,
        /// Replaces the tone list (repeatable)
        #[arg(long = "tone")]
        tones: Vec<String>,
        /// Replaces the posting times, comma separated
        #[arg(long, value_delimiter = ',')]
        times: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct RepostArgs {
    #[arg(short, long, default_value = "5")]
    count: usize,

    /// Target platform (repeatable)
    #[arg(short, long = "platform", required = true)]
    platforms: Vec<String>,

    /// Template tone (defaults to [repost] default_tone)
    #[arg(short, long)]
    tone: Option<String>,

    /// Only repost posts at least this many days old
    #[arg(long)]
    min_days_old: Option<u32>,

    /// Print the posts without saving them
    #[arg(long)]
    preview: bool,

    /// Reposts are scheduled from the day after this
    #[arg(long, default_value = "now")]
    start: String,
}

#[derive(Subcommand, Debug)]
enum TokenCommand {
    /// Store an access token for a platform
    Set {
        platform: String,
        token: String,
        /// Token lifetime, e.g. "60days"
        #[arg(long)]
        expires_in: Option<String>,
        /// Instagram account or Facebook page id
        #[arg(long)]
        account_id: Option<String>,
    },
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
    let now = Utc::now();

    match cli.command {
        Commands::List {
            status,
            platform,
            limit,
            format,
        } => cmd_list(&service, status.as_deref(), platform.as_deref(), limit, &format).await,
        Commands::Reset { post_id } => {
            service.reset_post(&post_id).await?;
            println!("{} queued", post_id);
            Ok(())
        }
        Commands::Approve { post_id } => {
            service.approve_post(&post_id).await?;
            println!("{} queued", post_id);
            Ok(())
        }
        Commands::Generate(args) => cmd_generate(&service, args, now).await,
        Commands::Autopilot { command } => cmd_autopilot(&service, command, now).await,
        Commands::Repost(args) => cmd_repost(&service, args, now).await,
        Commands::Token { command } => cmd_token(&service, command, now).await,
    }
}

fn parse_platforms(names: &[String]) -> Result<Vec<Platform>> {
    names
        .iter()
        .map(|name| {
            name.parse::<Platform>()
                .map_err(|e| ShopcastError::InvalidInput(e.to_string()))
        })
        .collect()
}

async fn cmd_list(
    service: &ShopcastService,
    status: Option<&str>,
    platform: Option<&str>,
    limit: usize,
    format: &str,
) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(ShopcastError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        )));
    }
    let status = status
        .map(|s| s.parse::<PostStatus>().map_err(ShopcastError::InvalidInput))
        .transpose()?;
    let platform = platform
        .map(|p| p.parse::<Platform>().map_err(|e| ShopcastError::InvalidInput(e.to_string())))
        .transpose()?;

    let posts = service
        .database()
        .list_posts(status, platform.map(|p| p.as_str()), limit)
        .await?;

    if format == "json" {
        let json = serde_json::to_string_pretty(&posts)
            .map_err(|e| ShopcastError::InvalidInput(format!("cannot encode posts: {}", e)))?;
        println!("{}", json);
    } else {
        for post in &posts {
            println!("{}", format_post_line(post));
        }
    }
    Ok(())
}

fn format_post_line(post: &ScheduledPost) -> String {
    let when = DateTime::<Utc>::from_timestamp(post.scheduled_for, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| post.scheduled_for.to_string());
    let detail = match post.status {
        PostStatus::Failed => post.error_message.clone().unwrap_or_default(),
        PostStatus::Posted => post.permalink.clone().unwrap_or_default(),
        _ => truncate(&post.caption, 50),
    };
    format!("{} | {} | {} | {} | {}", post.id, post.platform, post.status, when, detail)
}

fn truncate(content: &str, max_chars: usize) -> String {
    let line = content.lines().next().unwrap_or_default();
    if line.chars().count() <= max_chars {
        line.to_string()
    } else {
        format!("{}...", line.chars().take(max_chars).collect::<String>())
    }
}

async fn cmd_generate(
    service: &ShopcastService,
    args: GenerateArgs,
    now: DateTime<Utc>,
) -> Result<()> {
    parse_posting_times(&args.times)?;
    let request = GenerateRequest {
        count: args.count,
        platforms: parse_platforms(&args.platforms)?,
        tones: args.tones,
        posting_times: args.times,
        posts_per_day: None,
        start: parse_start(&args.start, now)?.timestamp(),
        window_end: None,
        requires_approval: args.draft || service.config().generator.requires_approval,
    };

    let report = service.generate(&request).await?;
    for post in &report.created {
        println!("{}", format_post_line(post));
    }
    for error in &report.errors {
        eprintln!("warning: {}", error);
    }
    eprintln!("created {}, failed {}", report.created.len(), report.failed);
    Ok(())
}

async fn cmd_autopilot(
    service: &ShopcastService,
    command: AutopilotCommand,
    now: DateTime<Utc>,
) -> Result<()> {
    let db = service.database();
    match command {
        AutopilotCommand::Run => match service.run_autopilot(now.timestamp()).await? {
            AutopilotOutcome::Disabled => println!("autopilot is disabled"),
            AutopilotOutcome::Satisfied { target, current } => {
                println!("queue full: {} of {} posts scheduled", current, target)
            }
            AutopilotOutcome::ToppedUp {
                target,
                current,
                requested,
                generated,
                queue_size,
            } => println!(
                "target {}, had {}, requested {}, generated {}, queue now {}",
                target, current, requested, generated, queue_size
            ),
        },
        AutopilotCommand::Show => {
            let settings = db.load_autopilot_settings().await?;
            println!("enabled: {}", settings.enabled);
            println!("days_ahead: {}", settings.days_ahead);
            println!("posts_per_day: {}", settings.posts_per_day);
            println!("platforms: {}", settings.platforms.join(", "));
            println!("tones: {}", settings.tones.join(", "));
            println!("posting_times: {}", settings.posting_times.join(", "));
            for run in db.autopilot_runs(5).await? {
                println!(
                    "run {}: target {}, had {}, generated {}, queue {}",
                    run.ran_at, run.target, run.current_count, run.generated, run.queue_size
                );
            }
        }
        AutopilotCommand::Configure {
            enable,
            disable,
            days_ahead,
            posts_per_day,
            platforms,
            tones,
            times,
        } => {
            let mut settings = db.load_autopilot_settings().await?;
            if enable {
                settings.enabled = true;
            }
            if disable {
                settings.enabled = false;
            }
            if let Some(days) = days_ahead {
                settings.days_ahead = days;
            }
            if let Some(per_day) = posts_per_day {
                settings.posts_per_day = per_day;
            }
            if !platforms.is_empty() {
                parse_platforms(&platforms)?;
                settings.platforms = platforms.iter().map(|p| p.to_lowercase()).collect();
            }
            if !tones.is_empty() {
                settings.tones = tones;
            }
            if !times.is_empty() {
                parse_posting_times(&times)?;
                settings.posting_times = times;
            }
            db.save_autopilot_settings(&settings).await?;
            println!("autopilot {}", if settings.enabled { "enabled" } else { "disabled" });
        }
    }
    Ok(())
}

async fn cmd_repost(service: &ShopcastService, args: RepostArgs, now: DateTime<Utc>) -> Result<()> {
    let defaults = &service.config().repost;
    let request = RepostRequest {
        count: args.count,
        platforms: parse_platforms(&args.platforms)?,
        tone: args.tone.unwrap_or_else(|| defaults.default_tone.clone()),
        min_days_old: args.min_days_old.unwrap_or(defaults.min_days_old),
        preview: args.preview,
        start: parse_start(&args.start, now)?.timestamp(),
    };

    let report = service.reposts(&request).await?;
    for post in &report.posts {
        println!("{}", format_post_line(post));
    }
    eprintln!(
        "{} reposts from {} posts{}",
        report.posts.len(),
        report.selected,
        if report.persisted { "" } else { " (preview, nothing saved)" }
    );
    Ok(())
}

async fn cmd_token(
    service: &ShopcastService,
    command: TokenCommand,
    now: DateTime<Utc>,
) -> Result<()> {
    match command {
        TokenCommand::Set {
            platform,
            token,
            expires_in,
            account_id,
        } => {
            let platform = platform
                .parse::<Platform>()
                .map_err(|e| ShopcastError::InvalidInput(e.to_string()))?;
            let mut stored = PlatformToken::new(token);
            if let Some(lifetime) = expires_in {
                let lifetime = humantime::parse_duration(&lifetime).map_err(|e| {
                    ShopcastError::InvalidInput(format!(
                        "invalid --expires-in '{}': {}",
                        lifetime, e
                    ))
                })?;
                stored = stored.with_expiry(now.timestamp() + lifetime.as_secs() as i64);
            }
            if let Some(account_id) = account_id {
                stored = stored.with_account(account_id);
            }
            service.database().save_token(platform, &stored).await?;
            println!("token stored for {}", platform);
        }
    }
    Ok(())
}
