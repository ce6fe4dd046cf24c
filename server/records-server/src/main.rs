use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::env;
use tracing::{info, Level};
use tracing_subscriber::{fmt, fmt::time::ChronoUtc, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use records_server::{create_app, services::seed, AppConfig, RecordsServer};

/// Academic records HTTP server
#[derive(Parser, Debug)]
#[command(name = "records-server")]
#[command(about = "Role-based academic records API server")]
struct Args {
    /// Server bind address (overrides the configuration file)
    #[arg(long, env = "RECORDS_HOST")]
    host: Option<String>,

    /// Server port (overrides the configuration file)
    #[arg(short, long, env = "RECORDS_PORT")]
    port: Option<u16>,

    /// Configuration file path (YAML or TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (the default)
    Serve,
    /// Load demo admin, teacher and student accounts with courses and grades, then exit
    SeedDemo,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    init_tracing(args.verbose);

    let mut config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    let addr = config.bind_address();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting academic records server");
    let server = RecordsServer::new(config).await?;

    if matches!(args.command, Some(Command::SeedDemo)) {
        let report = seed::seed_demo(&server).await.context("Failed to seed demo data")?;
        for item in &report.created {
            info!("Created {item}");
        }
        for item in &report.existing {
            info!("Already present: {item}");
        }
        info!("Demo accounts: admin/admin123, teacher/teacher123, student/student123 ({})", seed::DEMO_ENROLLMENT_NUMBER);
        return Ok(());
    }

    server
        .ensure_bootstrap_admin()
        .await
        .context("Failed to ensure bootstrap admin")?;
    info!(backend = server.store.backend(), "Entity store ready");

    let app = create_app(server);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Server running on http://{addr}");
    info!("Health check available at: http://{addr}/health");
    info!("API v1 available at: http://{addr}/api/v1");
    info!("OpenAPI document at: http://{addr}/api-docs/openapi.json");

    axum::serve(listener, app).await.context("HTTP server error")?;
    Ok(())
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("records_server={level},tower_http=info,sqlx=warn").into());

    let is_production = env::var("RECORDS_ENV").is_ok_and(|value| value == "production");

    if is_production {
        // Structured JSON logging for production
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .json(),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_timer(ChronoUtc::rfc_3339()),
            )
            .init();
    }
}
