//! # PullFeed: weekly comic release feeds for Discord servers
//!
//! Usage:
//!   pullfeed run                                   # Start the delivery daemon
//!   pullfeed setup --tenant 1 --channel 2 marvel   # Add a feed
//!   pullfeed edit --tenant 1 weekday=2 pin=true    # Edit every feed of a tenant
//!   pullfeed keywords add --tenant 1 title batman  # Keyword filter terms

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::NaiveTime;
use clap::{Parser, Subcommand, ValueEnum};
use pullfeed_catalog::{
    CatalogFetcher, HttpCatalogSource, RefreshSchedule, ReleaseCatalog, STATUS_INTERVAL_SECS,
    run_refresh_loop, run_status_rotation,
};
use pullfeed_channels::DiscordSender;
use pullfeed_core::{
    ChannelId, Clock, DisplayFormat, FeedConfig, FeedUpdate, KeywordKind, PublisherId,
    PublisherRegistry, PullFeedConfig, SystemClock, TenantId,
};
use pullfeed_db::FeedDb;
use pullfeed_scheduler::{ChannelLocks, DeliveryEngine, FeedScheduler, FeedService, Spacing};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pullfeed",
    version,
    about = "📚 PullFeed: weekly comic release feeds, one timer per feed"
)]
struct Cli {
    /// Config file (default ~/.pullfeed/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON log output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the delivery daemon until Ctrl-C
    Run,
    /// List configured feeds
    Feeds {
        #[arg(long)]
        tenant: Option<u64>,
    },
    /// Add a feed for a publisher
    Setup {
        #[arg(long)]
        tenant: u64,
        #[arg(long)]
        channel: u64,
        publisher: String,
        /// full, compact or summary
        #[arg(long)]
        format: Option<String>,
    },
    /// Edit feeds with field=value pairs (channel, format, weekday, role, pin, keywords)
    Edit {
        #[arg(long)]
        tenant: u64,
        /// Only this publisher's feed; all of the tenant's feeds when omitted
        #[arg(long)]
        publisher: Option<String>,
        #[arg(required = true)]
        changes: Vec<String>,
    },
    /// Remove a feed
    Delete {
        #[arg(long)]
        tenant: u64,
        publisher: String,
    },
    /// Keyword filter terms
    Keywords {
        #[command(subcommand)]
        action: KeywordAction,
    },
    /// Deliver a feed now
    Trigger {
        #[arg(long)]
        tenant: u64,
        publisher: String,
    },
    /// Fetch the current week and print it
    Catalog {
        publisher: Option<String>,
    },
    /// Forget a tenant that removed the bot
    Cleanup {
        #[arg(long)]
        tenant: u64,
    },
    /// Send a message to every configured channel
    Broadcast { message: String },
}

#[derive(Subcommand)]
enum KeywordAction {
    List {
        #[arg(long)]
        tenant: u64,
    },
    Add {
        #[arg(long)]
        tenant: u64,
        kind: KindArg,
        term: String,
    },
    Remove {
        #[arg(long)]
        tenant: u64,
        kind: KindArg,
        term: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Title,
    Creator,
}

impl From<KindArg> for KeywordKind {
    fn from(k: KindArg) -> Self {
        match k {
            KindArg::Title => KeywordKind::Title,
            KindArg::Creator => KeywordKind::Creator,
        }
    }
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose { "pullfeed=debug" } else { "pullfeed=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

/// Everything wired together.
struct App {
    config: PullFeedConfig,
    registry: Arc<PublisherRegistry>,
    catalog: Arc<ReleaseCatalog>,
    service: Arc<FeedService>,
    clock: Arc<dyn Clock>,
}

impl App {
    fn build(config: PullFeedConfig) -> Result<Self> {
        let registry = Arc::new(config.registry()?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let source = HttpCatalogSource::new(
            &config.catalog.api_url,
            Duration::from_secs(config.catalog.timeout_secs),
        )?;
        let catalog = Arc::new(ReleaseCatalog::new(
            registry.clone(),
            CatalogFetcher::new(Arc::new(source), config.catalog.details_chunk),
        ));

        let store = Arc::new(FeedDb::open(&expand_path(&config.database.path))?);
        let sender = Arc::new(DiscordSender::new(&config.discord)?);
        let delivery = Arc::new(DeliveryEngine::new(
            registry.clone(),
            catalog.clone(),
            sender.clone(),
            store.clone(),
            Arc::new(ChannelLocks::new()),
        ));

        let sched = &config.scheduler;
        let Some(trigger_at) = NaiveTime::from_hms_opt(sched.trigger_hour, sched.trigger_minute, 0) else {
            bail!(
                "invalid trigger time {:02}:{:02}",
                sched.trigger_hour,
                sched.trigger_minute
            );
        };
        let scheduler = Arc::new(FeedScheduler::new(
            delivery.clone(),
            clock.clone(),
            trigger_at,
            Spacing::from_millis(sched.compact_spacing_ms, sched.full_spacing_ms),
        ));
        let service = Arc::new(FeedService::new(
            registry.clone(),
            store,
            sender,
            delivery,
            scheduler,
        ));

        Ok(Self {
            config,
            registry,
            catalog,
            service,
            clock,
        })
    }

    fn require_token(&self) -> Result<()> {
        if self.config.discord.token.is_empty() {
            bail!("discord.token is empty (set it in the config or PULLFEED_DISCORD_TOKEN)");
        }
        Ok(())
    }

    async fn run_daemon(&self) -> Result<()> {
        self.require_token()?;
        tracing::info!(
            "📚 PullFeed v{} starting ({} publishers)",
            env!("CARGO_PKG_VERSION"),
            self.registry.len()
        );

        let refresh = tokio::spawn(run_refresh_loop(
            self.catalog.clone(),
            self.clock.clone(),
            RefreshSchedule::new(
                self.config.catalog.refresh_cutoff_hour,
                self.config.catalog.refresh_lead_minutes,
            ),
        ));

        // Presence updates go to the gateway when one is attached; the daemon logs them.
        let (status_tx, mut status_rx) = watch::channel(None::<String>);
        let status = tokio::spawn(run_status_rotation(
            self.catalog.clone(),
            status_tx,
            STATUS_INTERVAL_SECS,
        ));
        let presence = tokio::spawn(async move {
            while status_rx.changed().await.is_ok() {
                if let Some(line) = status_rx.borrow_and_update().clone() {
                    tracing::debug!("🎭 Status: {line}");
                }
            }
        });

        let count = self.service.load_schedules().await?;
        tracing::info!("⏰ {count} feeds armed");

        let resync = match self.config.scheduler.resync_interval_secs {
            0 => None,
            secs => Some(tokio::spawn(
                self.service.clone().run_resync_loop(Duration::from_secs(secs)),
            )),
        };

        tokio::signal::ctrl_c().await?;
        tracing::info!("🛑 Shutting down");
        self.service.scheduler().shutdown();
        for handle in [refresh, status, presence] {
            handle.abort();
        }
        if let Some(handle) = resync {
            handle.abort();
        }
        Ok(())
    }
}

fn print_feed(feed: &FeedConfig) {
    let role = feed
        .mention_role
        .map(|r| format!("@{r}"))
        .unwrap_or_else(|| "-".into());
    println!(
        "  {:<20} {:<10} #{:<20} {:<8} {:<4} role={:<20} pin={:<5} keywords={}",
        feed.tenant,
        feed.publisher,
        feed.channel,
        feed.format,
        feed.weekday,
        role,
        feed.pin,
        feed.check_keywords
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json);

    let config = match &cli.config {
        Some(path) => PullFeedConfig::load_from(&expand_path(path))?,
        None => PullFeedConfig::load()?,
    };
    let app = App::build(config)?;

    match cli.command {
        Command::Run => app.run_daemon().await?,

        Command::Feeds { tenant } => {
            let feeds = match tenant {
                Some(t) => app.service.feeds(TenantId(t)).await?,
                None => app.service.all_feeds().await?,
            };
            println!("📋 {} feeds", feeds.len());
            feeds.iter().for_each(print_feed);
        }

        Command::Setup {
            tenant,
            channel,
            publisher,
            format,
        } => {
            let format = format.map(|f| f.parse::<DisplayFormat>()).transpose()?;
            let feed = app
                .service
                .setup_feed(TenantId(tenant), ChannelId(channel), publisher.parse()?, format)
                .await?;
            println!("✅ Feed created");
            print_feed(&feed);
        }

        Command::Edit {
            tenant,
            publisher,
            changes,
        } => {
            let updates = changes
                .iter()
                .map(|c| FeedUpdate::parse(c))
                .collect::<pullfeed_core::Result<Vec<_>>>()?;
            let publisher = publisher.map(|p| p.parse::<PublisherId>()).transpose()?;
            let edited = app.service.edit_feeds(TenantId(tenant), publisher, &updates).await?;
            println!("✏️ {} feeds updated", edited.len());
            edited.iter().for_each(print_feed);
        }

        Command::Delete { tenant, publisher } => {
            app.service.delete_feed(TenantId(tenant), publisher.parse()?).await?;
            println!("🗑️ Feed removed");
        }

        Command::Keywords { action } => match action {
            KeywordAction::List { tenant } => {
                let rules = app.service.keywords(TenantId(tenant)).await?;
                println!("🔎 Titles:   {}", rules.title_terms.iter().cloned().collect::<Vec<_>>().join(", "));
                println!("🔎 Creators: {}", rules.creator_terms.iter().cloned().collect::<Vec<_>>().join(", "));
            }
            KeywordAction::Add { tenant, kind, term } => {
                if app.service.add_keyword(TenantId(tenant), kind.into(), &term).await? {
                    println!("✅ Added");
                } else {
                    println!("⚠️ Already present");
                }
            }
            KeywordAction::Remove { tenant, kind, term } => {
                if app.service.remove_keyword(TenantId(tenant), kind.into(), &term).await? {
                    println!("✅ Removed");
                } else {
                    println!("⚠️ Not found");
                }
            }
        },

        Command::Trigger { tenant, publisher } => {
            app.require_token()?;
            let publisher = app.registry.require(publisher.parse()?)?;
            app.catalog.refresh(publisher).await?;
            let report = app.service.trigger_feed(TenantId(tenant), publisher.id).await?;
            println!(
                "📬 {} releases, {} messages sent, {} failed",
                report.releases, report.sent, report.failed_sends
            );
        }

        Command::Catalog { publisher } => {
            let publishers: Vec<_> = match publisher {
                Some(p) => vec![app.registry.require(p.parse()?)?],
                None => app.registry.iter().collect(),
            };
            for publisher in publishers {
                match app.catalog.refresh(publisher).await {
                    Ok(count) => {
                        println!("📚 {}: {count} releases", publisher.name);
                        if let Some(snapshot) = app.catalog.snapshot(publisher.id).await {
                            for release in snapshot.ordered() {
                                println!("  {:<50} {:?}", release.title, release.format);
                            }
                        }
                    }
                    Err(e) => println!("⚠️ {}: {e}", publisher.name),
                }
            }
        }

        Command::Cleanup { tenant } => {
            let removed = app.service.tenant_departed(TenantId(tenant)).await?;
            println!("🧹 Removed {removed} feeds and all keywords of tenant {tenant}");
        }

        Command::Broadcast { message } => {
            app.require_token()?;
            let sent = app.service.broadcast(&message).await?;
            println!("📢 Sent to {sent} channels");
        }
    }

    Ok(())
}
