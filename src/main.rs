use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gatehouse::config::Settings;
use gatehouse::{Gateway, GatewayResponse, HandlerContext, Middleware, MiddlewareError, Router};

/// Parse the `--config` CLI flag. Defaults to `gatehouse.toml`.
fn parse_config_path() -> String {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = String::from("gatehouse.toml");

    let mut i = 1;
    while i < args.len() {
        if args[i] == "--config" {
            if let Some(path) = args.get(i + 1) {
                config_path = path.clone();
            }
            i += 2;
        } else {
            i += 1;
        }
    }

    config_path
}

/// Initialise the `tracing` subscriber: stdout always, plus a non-blocking
/// file layer when `logging.file` is set. The returned guard must live until
/// exit so buffered lines are flushed.
fn init_tracing(level: &str, log_file: &str) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(true);

    let (file_layer, guard) = if log_file.is_empty() {
        (None, None)
    } else {
        let path = std::path::Path::new(log_file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| std::path::Path::new("."));
        let name = path
            .file_name()
            .with_context(|| format!("logging.file has no file name: {}", log_file))?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

        let appender = tracing_appender::rolling::never(dir, name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true);
        (Some(layer), Some(guard))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

// ---------------------------------------------------------------------------
// Demo routes
// ---------------------------------------------------------------------------

async fn hello(_ctx: HandlerContext) -> GatewayResponse {
    GatewayResponse::ok("Hello World")
}

async fn guarded(_ctx: HandlerContext) -> GatewayResponse {
    GatewayResponse::ok("middleware passed")
}

async fn cached(ctx: HandlerContext) -> GatewayResponse {
    if let Some(body) = ctx.cached() {
        return GatewayResponse::ok(body);
    }
    ctx.cache_for(1, "cached response, served from cache");
    GatewayResponse::ok("cached response")
}

fn demo_router() -> Router {
    let announce = Middleware::new("announce", |req| {
        info!(method = %req.method, target = %req.target, "Global middleware");
        Ok(())
    });
    let first = Middleware::new("first", |_| Ok(()));
    let second = Middleware::new("second", |_| Err(MiddlewareError::new("middleware 2 authentication failed")));

    Router::builder()
        .use_global(announce)
        .get("/", hello, vec![])
        .get("/middleware", guarded, vec![first, second])
        .get("/cache", cached, vec![])
        .build()
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---------------------------------------------------------------
    // 1. Configuration
    // ---------------------------------------------------------------
    let config_path = parse_config_path();
    let config_exists = std::path::Path::new(&config_path).exists();
    let settings = Settings::load_or_default(&config_path)?;

    // ---------------------------------------------------------------
    // 2. Logging
    // ---------------------------------------------------------------
    let _log_guard = init_tracing(&settings.logging.level, &settings.logging.file)?;

    info!("Starting gatehouse");
    if config_exists {
        info!("Config loaded from {}", config_path);
    } else {
        warn!("Config file {} not found, using defaults", config_path);
    }

    // ---------------------------------------------------------------
    // 3. Gateway
    // ---------------------------------------------------------------
    let mut gateway = Gateway::new(settings, demo_router()).context("Failed to build gateway")?;
    let server = gateway.http_server();

    // ---------------------------------------------------------------
    // 4. Serve until Ctrl+C
    // ---------------------------------------------------------------
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };
    server
        .run(shutdown)
        .await
        .context("HTTP server failed")?;

    info!("Shutting down gatehouse...");
    gateway.shutdown();
    info!("gatehouse shut down gracefully");
    Ok(())
}
