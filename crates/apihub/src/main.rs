use anyhow::{Context, Result};
use apihub::cli::{Cli, Command, ServeArgs};
use apihub::config::GatewaySettings;
use apihub::env_vars;
use apihub::gateway::{shared_config, ActiveConfig, GatewayServer};
use apihub::reload::{watch_config, ReloadController};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level, cli.json_logs) {
        eprintln!("Error: {e:#}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Validate { file } => validate(&file),
        Command::Version => {
            println!("apihub {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).with_context(|| format!("invalid log level '{level}'"))?,
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(fmt::layer().json()).try_init()?;
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()?;
    }
    Ok(())
}

async fn serve(args: ServeArgs) -> Result<()> {
    let source = args.file.clone();
    let active = ActiveConfig::load(&source)
        .with_context(|| format!("failed to load config from {}", source.display()))?;
    let config = shared_config(active);
    let settings = args.settings().await?;

    print_startup_summary(&settings, &source, args.watch, &config.load());

    let server = GatewayServer::bind(settings, Arc::clone(&config)).await?;
    let addr = server.local_addr()?;
    info!(addr = %addr, "apihub listening");

    // Held for the life of the server; dropping it stops the watch.
    let _watcher = if args.watch {
        let (watcher, events) = watch_config(&source)
            .with_context(|| format!("failed to watch {}", source.display()))?;
        let controller = ReloadController::new(Arc::clone(&config), source.clone());
        tokio::spawn(controller.run(events));
        Some(watcher)
    } else {
        None
    };

    server.serve_until(shutdown_signal()).await?;
    info!("apihub stopped");
    Ok(())
}

fn validate(source: &Path) -> Result<()> {
    let active = ActiveConfig::load(source)
        .with_context(|| format!("invalid config {}", source.display()))?;

    println!("{}: {} rule(s)", source.display(), active.rules.len());
    for rule in &active.rules {
        println!("  {}", rule.describe());
    }
    Ok(())
}

fn print_startup_summary(
    settings: &GatewaySettings,
    source: &Path,
    watch: bool,
    config: &ActiveConfig,
) {
    info!("apihub v{}", env!("CARGO_PKG_VERSION"));
    info!("  Listen:          {}", settings.listen);
    info!("  Config:          {}", source.display());
    info!("  Watch:           {}", if watch { "enabled" } else { "disabled" });
    info!("  Request timeout: {:?}", settings.request_timeout);
    match settings.max_request_size {
        0 => info!("  Max body size:   unlimited"),
        max => info!("  Max body size:   {max} bytes"),
    }
    match &settings.rate_limit {
        Some(limits) => info!(
            "  Rate limit:      {} requests per {:?} per client",
            limits.max_requests, limits.window
        ),
        None => info!("  Rate limit:      disabled"),
    }
    debug!(variables = ?env_vars::all_env_vars(), "environment overrides consulted");

    if config.rules.is_empty() {
        warn!("no rules configured, every request will receive 404");
        return;
    }
    info!("  Routes:");
    for rule in &config.rules {
        info!("    {}", rule.describe());
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C"),
        _ = terminate => info!("received SIGTERM"),
    }
}
