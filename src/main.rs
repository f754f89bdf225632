use std::{path::Path, process, sync::Arc};

use ppreporter_cache::{
    application::{
        daily::DailyActionsRepository,
        error::AppError,
        prewarm::{MetadataPrewarmer, PrewarmOutcome, PrewarmSchedule},
        repos::Entity,
        repository::CachingRepository,
    },
    cache::{CacheConfig, CacheStore, StatisticsSnapshot},
    config::{self, Command, PrewarmArgs, RewriteArgs},
    domain::{Country, Currency, DailyAction, Game, WhiteLabel},
    infra::{
        db::{self, PgStore},
        error::InfraError,
        telemetry,
    },
    sql::{QueryRewriter, RelaxedReads},
};
use serde::Serialize;
use sqlx::PgPool;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    match cli_args.command {
        Command::Rewrite(args) => run_rewrite(args).await,
        Command::Prewarm(args) => run_prewarm(settings, args).await,
        Command::Stats(_) => run_stats(settings).await,
    }
}

async fn run_rewrite(args: RewriteArgs) -> Result<(), AppError> {
    let statement = match args.file.as_deref() {
        Some(path) => read_statement_file(path).await?,
        None => {
            let mut buffer = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buffer)
                .await
                .map_err(InfraError::from)?;
            buffer
        }
    };

    if statement.trim().is_empty() {
        return Err(AppError::validation("no statement supplied"));
    }

    println!("{}", QueryRewriter::new().rewrite(&statement));
    Ok(())
}

async fn read_statement_file(path: &Path) -> Result<String, AppError> {
    tokio::fs::read_to_string(path).await.map_err(|err| {
        AppError::from(InfraError::configuration(format!(
            "failed to read `{}`: {err}",
            path.display()
        )))
    })
}

/// Cache, repositories and prewarmer wired against one Postgres pool.
struct Runtime {
    cache: Arc<CacheStore>,
    prewarmer: Arc<MetadataPrewarmer>,
}

async fn build_runtime(settings: &config::Settings) -> Result<Runtime, AppError> {
    let url = settings.database.url.as_deref().ok_or_else(|| {
        AppError::validation("database.url is required (set it in config or pass --database-url)")
    })?;
    let strategy = settings.isolation.strategy;
    db::ensure_supported(strategy)?;
    let pool = db::connect(url, settings.database.max_connections.get())
        .await
        .map_err(InfraError::from)?;
    info!(
        target = "ppreporter::main",
        strategy = %strategy,
        max_connections = settings.database.max_connections.get(),
        "connected to database"
    );

    let cache = Arc::new(CacheStore::in_memory(CacheConfig::from(&settings.cache)));

    let white_labels = lookup::<WhiteLabel>(&pool, strategy, &cache)?;
    let countries = lookup::<Country>(&pool, strategy, &cache)?;
    let currencies = lookup::<Currency>(&pool, strategy, &cache)?;
    let games = lookup::<Game>(&pool, strategy, &cache)?;
    let daily = DailyActionsRepository::new(
        CachingRepository::new(
            Arc::new(PgStore::<DailyAction>::new(pool.clone(), strategy)?),
            Arc::clone(&cache),
        ),
        settings.prewarm.today_ttl,
    );

    let prewarmer = MetadataPrewarmer::new(PrewarmSchedule::from(&settings.prewarm))
        .with_lookup(Arc::new(white_labels))
        .with_lookup(Arc::new(countries))
        .with_lookup(Arc::new(currencies))
        .with_lookup(Arc::new(games))
        .with_daily_slice(Arc::new(daily));

    Ok(Runtime {
        cache,
        prewarmer: Arc::new(prewarmer),
    })
}

fn lookup<T>(
    pool: &PgPool,
    strategy: RelaxedReads,
    cache: &Arc<CacheStore>,
) -> Result<CachingRepository<T, PgStore<T>>, InfraError>
where
    T: db::TableEntity,
{
    Ok(CachingRepository::new(
        Arc::new(PgStore::new(pool.clone(), strategy)?),
        Arc::clone(cache),
    ))
}

async fn prewarm_once(runtime: &Runtime) {
    match runtime.prewarmer.prewarm_cache().await {
        PrewarmOutcome::Completed { warmed, failed } if failed > 0 => {
            warn!(
                target = "ppreporter::main",
                warmed, failed, "prewarm completed with failures"
            );
        }
        PrewarmOutcome::Completed { warmed, .. } => {
            info!(target = "ppreporter::main", warmed, "prewarm completed");
        }
        PrewarmOutcome::AlreadyWarm => {}
    }
}

async fn run_prewarm(settings: config::Settings, args: PrewarmArgs) -> Result<(), AppError> {
    let runtime = build_runtime(&settings).await?;

    if !settings.prewarm.enabled {
        warn!(
            target = "ppreporter::main",
            "prewarm disabled by configuration; nothing to do"
        );
    } else if args.watch {
        let cancel = CancellationToken::new();
        let sweeper = runtime.cache.spawn_sweeper(cancel.clone());
        let warmer = Arc::clone(&runtime.prewarmer).spawn(cancel.clone());

        tokio::signal::ctrl_c().await.map_err(InfraError::from)?;
        info!(target = "ppreporter::main", "shutdown signal received");
        cancel.cancel();

        if let Err(err) = warmer.await {
            warn!(target = "ppreporter::main", error = %err, "prewarm task ended abnormally");
        }
        if let Err(err) = sweeper.await {
            warn!(target = "ppreporter::main", error = %err, "sweeper task ended abnormally");
        }
    } else {
        prewarm_once(&runtime).await;
    }

    print_json(&runtime.cache.statistics())
}

async fn run_stats(settings: config::Settings) -> Result<(), AppError> {
    let runtime = build_runtime(&settings).await?;
    prewarm_once(&runtime).await;

    let regions: Vec<_> = [
        WhiteLabel::TYPE_NAME,
        Country::TYPE_NAME,
        Currency::TYPE_NAME,
        Game::TYPE_NAME,
        DailyAction::TYPE_NAME,
    ]
    .into_iter()
    .map(|region| runtime.cache.region_statistics(region))
    .collect();

    print_json(&StatsReport {
        keys: runtime.cache.keys(),
        statistics: runtime.cache.statistics(),
        regions,
    })
}

#[derive(Serialize)]
struct StatsReport {
    keys: Vec<String>,
    statistics: StatisticsSnapshot,
    regions: Vec<StatisticsSnapshot>,
}

fn print_json<V: Serialize>(value: &V) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value).map_err(InfraError::from)?;
    println!("{rendered}");
    Ok(())
}
