use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use herald::config::Config;
use herald::dispatch::CampaignService;
use herald::models::MessagePayload;
use herald::sender::{AcceptAllValidator, WebhookSender};
use herald::storage::SqliteStore;

#[derive(Parser)]
#[command(
    name = "herald",
    version,
    about = "Scheduled broadcast campaign dispatcher with throttled sweeps and restart recovery",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (environment variables are used when absent)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dispatcher daemon: recover persisted schedules and serve timers
    Serve,

    /// Create a campaign and arm its first occurrence
    Create {
        /// Campaign name
        #[arg(short, long)]
        name: String,

        /// Text payload body (exclusive with --image / --file)
        #[arg(long)]
        text: Option<String>,

        /// Image reference payload
        #[arg(long)]
        image: Option<String>,

        /// File reference payload
        #[arg(long)]
        file: Option<String>,

        /// Comma-separated targets
        #[arg(short, long)]
        targets: Option<String>,

        /// File with one target per line (exclusive with --targets)
        #[arg(long)]
        targets_file: Option<PathBuf>,

        /// Cron schedule expression (5 fields)
        #[arg(short, long)]
        schedule: String,
    },

    /// List campaigns
    List {
        /// Page number (1-based)
        #[arg(short, long, default_value = "1")]
        page: usize,

        /// Page size
        #[arg(short, long, default_value = "20")]
        size: usize,
    },

    /// Show one campaign with its outcome log
    Show {
        /// Campaign id
        id: Uuid,
    },

    /// Arm a pending, paused, or failed campaign
    Start {
        /// Campaign id
        id: Uuid,
    },

    /// Stop scheduling a campaign (an in-flight sweep stops cooperatively)
    Pause {
        /// Campaign id
        id: Uuid,
    },

    /// Delete a campaign and its outcome log
    Delete {
        /// Campaign id
        id: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;

    let service = build_service(&config)?;

    match cli.command {
        Commands::Serve => {
            serve(&service).await?;
        }

        Commands::Create {
            name,
            text,
            image,
            file,
            targets,
            targets_file,
            schedule,
        } => {
            let payload = build_payload(text, image, file)?;
            let targets = parse_targets(targets, targets_file)?;
            let id = service.create_campaign(&name, payload, targets, &schedule)?;
            println!("Created campaign {id}");
        }

        Commands::List { page, size } => {
            let result = service.list_campaigns(page, size)?;
            println!(
                "Campaigns (page {}/{}, {} total)",
                result.page,
                result.total.div_ceil(size.max(1)).max(1),
                result.total
            );
            for campaign in &result.items {
                println!(
                    "  {}  {:<9}  ok={:<6} fail={:<6}  next={}  {}",
                    campaign.id,
                    campaign.status,
                    campaign.success_count,
                    campaign.failure_count,
                    campaign
                        .next_execute_time
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "-".to_string()),
                    campaign.name,
                );
            }
        }

        Commands::Show { id } => {
            let detail = service.get_campaign_detail(id)?;
            let campaign = &detail.campaign;
            println!("Campaign {}", campaign.id);
            println!("  Name:     {}", campaign.name);
            println!("  Status:   {}", campaign.status);
            println!("  Schedule: {}", campaign.schedule);
            println!("  Payload:  {} ({})", campaign.payload.content(), campaign.payload.kind());
            println!("  Targets:  {}", campaign.target_count());
            println!(
                "  Counters: {} delivered, {} failed",
                campaign.success_count, campaign.failure_count
            );
            if let Some(next) = campaign.next_execute_time {
                println!("  Next run: {}", next.to_rfc3339());
            }
            if let Some(last) = campaign.last_execute_time {
                println!("  Last run: {}", last.to_rfc3339());
            }
            if let Some(error) = &campaign.error_message {
                println!("  Error:    {error}");
            }
            println!("  Outcome log ({} entries):", detail.logs.len());
            for entry in &detail.logs {
                println!(
                    "    {}  {:<8}  {}  {}",
                    entry.timestamp.to_rfc3339(),
                    entry.result.as_str(),
                    entry.target,
                    entry.error_detail.as_deref().unwrap_or(""),
                );
            }
        }

        Commands::Start { id } => {
            service.start_campaign(id)?;
            println!("Started campaign {id}");
        }

        Commands::Pause { id } => {
            service.pause_campaign(id)?;
            println!("Paused campaign {id}");
        }

        Commands::Delete { id } => {
            service.delete_campaign(id).await?;
            println!("Deleted campaign {id}");
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("herald=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("herald=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

fn build_service(config: &Config) -> Result<CampaignService> {
    let store = Arc::new(SqliteStore::open(&config.database.sqlite_path)?);
    let sender = Arc::new(
        WebhookSender::new(
            config.gateway.url.clone(),
            Duration::from_secs(config.dispatch.sender_timeout_secs),
        )
        .context("Failed to initialize delivery gateway client")?,
    );

    Ok(CampaignService::new(
        store.clone(),
        store,
        sender,
        Arc::new(AcceptAllValidator),
        config.dispatch.clone(),
    ))
}

async fn serve(service: &CampaignService) -> Result<()> {
    let report = service.recover().await?;
    tracing::info!(
        repaired = report.repaired,
        rearmed = report.rearmed,
        failed = report.failed,
        "Dispatcher serving"
    );
    println!(
        "herald serving: {} campaign(s) armed ({} repaired, {} failed to arm). Ctrl-C to stop.",
        report.rearmed, report.repaired, report.failed
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("Shutdown requested, winding down sweeps");
    service.shutdown().await;
    println!("herald stopped");
    Ok(())
}

fn build_payload(
    text: Option<String>,
    image: Option<String>,
    file: Option<String>,
) -> Result<MessagePayload> {
    match (text, image, file) {
        (Some(body), None, None) => Ok(MessagePayload::Text { body }),
        (None, Some(reference), None) => Ok(MessagePayload::Image { reference }),
        (None, None, Some(reference)) => Ok(MessagePayload::File { reference }),
        (None, None, None) => anyhow::bail!("one of --text, --image, or --file is required"),
        _ => anyhow::bail!("--text, --image, and --file are mutually exclusive"),
    }
}

fn parse_targets(inline: Option<String>, file: Option<PathBuf>) -> Result<Vec<String>> {
    let raw = match (inline, file) {
        (Some(list), None) => list
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(String::from)
            .collect(),
        (None, Some(path)) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read targets file: {}", path.display()))?;
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect()
        }
        (None, None) => anyhow::bail!("either --targets or --targets-file is required"),
        _ => anyhow::bail!("--targets and --targets-file are mutually exclusive"),
    };

    Ok(raw)
}
