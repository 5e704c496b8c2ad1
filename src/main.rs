use clap::Parser;
use docflow::cli::{Cli, Command};
use docflow::config::Config;
use docflow::{build_context, db, orchestrator};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    init_tracing(&config);

    tracing::info!("docflow starting up");
    tracing::info!("configuration loaded successfully");

    let pool = db::create_pool(&config.database.url).await?;
    tracing::info!("database pool created successfully");

    let ctx = build_context(pool, config);
    let orchestrator = orchestrator::Orchestrator::new(ctx);

    let cancel = CancellationToken::new();
    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            shutdown_cancel.cancel();
        }
    });

    let mode = cli.command.unwrap_or(Command::Run).into_mode();
    orchestrator.run(mode, cancel).await?;

    Ok(())
}

fn init_tracing(config: &Config) {
    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path.file_name().and_then(|n| n.to_str()).unwrap_or("docflow.log");
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
        // Leaking the guard is deliberate: it must live for the process
        // lifetime to keep flushing the non-blocking writer, and main()
        // never returns early on the `run` mode this guards.
        std::mem::forget(_guard);
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
