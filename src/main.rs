use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use postwatch::application::usecases::{
    AdminUseCase, HandleItemUseCase, PollScheduler, RetryingFetcher, RunTickUseCase,
};
use postwatch::application::{AppError, DedupTracker, Notifier, SessionPool};
use postwatch::domain::{RoleId, UserId};
use postwatch::infrastructure::{
    challenge::ReloadChallengeSolver, chromium_session::ChromiumSessionFactory,
    console_notifier::ConsoleNotifier, discord_notifier::DiscordWebhookNotifier,
    multi_notifier::MultiNotifier, profile_fetcher::ProfileFetcher, sqlite_store::SqliteStore,
};
use postwatch::interfaces::config::Config;
use postwatch::interfaces::http_api::{ApiState, build_router};

#[derive(Parser, Debug)]
#[command(name = "postwatch")]
struct Args {
    /// Path to config.yaml
    #[arg(long, default_value = "config.yaml")]
    config: String,

    /// Run a single tick and exit
    #[arg(long)]
    once: bool,

    /// Do not send external notifications (console only)
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a profile for a member
    Add {
        #[arg(long)]
        owner: u64,
        #[arg(long)]
        handle: String,
        #[arg(long)]
        role: u64,
    },
    /// Remove the profile registered by a member
    Remove {
        #[arg(long)]
        owner: u64,
    },
    /// List registered profiles
    List,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("postwatch=info")),
        )
        .init();
    if dotenvy::dotenv().is_err() {
        let _ = dotenvy::from_path(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env"));
    }
    let args = Args::parse();

    if let Err(e) = run(args).await {
        tracing::error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    // 1) load + validate config before touching anything external
    let cfg = Config::load_from_file(&args.config)
        .map_err(|e| anyhow::anyhow!("failed to load config {}: {e}", args.config))?;
    let layout = cfg.layout()?;
    let seeds = cfg.seed_targets()?;

    // 2) storage
    let db_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:postwatch.db?mode=rwc".to_string());
    let store = Arc::new(SqliteStore::new(&db_url).await?);
    let dedup = Arc::new(DedupTracker::new(store.clone()));

    let admin = AdminUseCase {
        targets: store.as_ref(),
        dedup: &dedup,
    };
    if let Some(command) = args.command {
        return run_command(&admin, command).await;
    }

    for seed in seeds {
        match admin
            .register_target(seed.owner_id, seed.external_handle.as_str(), seed.notify_role_id)
            .await
        {
            Ok(_) | Err(AppError::DuplicateTarget { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }

    // 3) browser sessions + fetch pipeline
    let factory = Arc::new(ChromiumSessionFactory::new(cfg.browser_settings()));
    let pool = SessionPool::new(factory, cfg.pool_settings());
    let fetcher = ProfileFetcher::new(
        layout,
        Arc::new(
            ReloadChallengeSolver::default().watching(cfg.site.challenge_selector.clone()),
        ),
        cfg.render_timeout(),
    );

    // notifiers fanout
    let mut notifiers: Vec<Box<dyn Notifier>> = vec![Box::new(ConsoleNotifier::new())];
    if !args.dry_run {
        if let Ok(hook) = std::env::var("DISCORD_WEBHOOK_URL") {
            notifiers.push(Box::new(DiscordWebhookNotifier::new(hook)));
        } else {
            tracing::warn!("DISCORD_WEBHOOK_URL not set, Discord notifier disabled");
        }
    } else {
        tracing::warn!("--dry-run enabled: only console output");
    }
    let notifier = MultiNotifier::new(notifiers);

    // 4) usecases
    let run_tick = RunTickUseCase {
        targets: store.as_ref(),
        fetcher: RetryingFetcher {
            pool: &pool,
            fetcher: &fetcher,
            policy: cfg.retry_policy(),
        },
        handle_item: HandleItemUseCase {
            dedup: &dedup,
            notifier: &notifier,
        },
        concurrency: pool.size(),
    };

    let cancel = CancellationToken::new();

    if args.once {
        let report = run_tick.execute(&cancel).await;
        pool.shutdown().await;
        report?;
        tracing::info!("run once completed");
        return Ok(());
    }

    // 5) optional admin API
    let server = match cfg.api.listen.clone() {
        Some(addr) => {
            let state = ApiState {
                targets: store.clone(),
                dedup: dedup.clone(),
                api_token: cfg.api.token.clone(),
            };
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!(%addr, "admin api listening");
            let shutdown = cancel.clone();
            Some(tokio::spawn(async move {
                axum::serve(listener, build_router(state))
                    .with_graceful_shutdown(async move { shutdown.cancelled().await })
                    .await
            }))
        }
        None => None,
    };

    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
        }
        signal.cancel();
    });

    let scheduler = PollScheduler::new(run_tick, cfg.poll_interval(), cfg.shutdown_grace());
    scheduler.run(cancel.clone()).await;

    cancel.cancel();
    if let Some(server) = server {
        server.await??;
    }
    Ok(())
}

async fn run_command(admin: &AdminUseCase<'_>, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Add {
            owner,
            handle,
            role,
        } => {
            let target = admin
                .register_target(UserId(owner), &handle, RoleId(role))
                .await?;
            println!("added target {} ({})", target.id, target.external_handle);
        }
        Command::Remove { owner } => match admin.unregister_target(UserId(owner)).await? {
            Some(target) => println!("removed target {} ({})", target.id, target.external_handle),
            None => println!("no target registered for {owner}"),
        },
        Command::List => {
            for t in admin.list_targets().await? {
                println!(
                    "{}\t{}\towner={}\trole={}",
                    t.id, t.external_handle, t.owner_id, t.notify_role_id
                );
            }
        }
    }
    Ok(())
}
