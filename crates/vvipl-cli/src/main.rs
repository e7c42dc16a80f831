//! vvipl - Vehicle & Vessel IPL parts catalog CLI.

/// Application configuration (TOML).
mod config;

use std::num::NonZeroUsize;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::instrument;
use tracing_subscriber::filter::EnvFilter;
#[cfg(not(feature = "otel"))]
use tracing_subscriber::fmt;
#[cfg(feature = "otel")]
use tracing_subscriber::layer::SubscriberExt;
#[cfg(feature = "otel")]
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{AppConfig, resolve_config_path};
use vvipl_api::catalog::{
    AggregateOptions, DiagramId, ModelRef, Part, PartsCatalog, build_catalog, fetch_diagram_parts,
    fetch_diagrams,
};
use vvipl_api::upstream::UpstreamClient;
use vvipl_proxy::ProxyState;

/// CLI argument parser.
#[derive(Parser)]
#[command(about, version)]
struct Cli {
    /// Override config directory.
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// List the diagrams of a model (`get-diagrams`).
    Diagrams(ModelArgs),
    /// List the parts of one diagram (`get-diagram-parts`).
    Parts(PartsArgs),
    /// Build the merged parts catalog of a model.
    Catalog(CatalogArgs),
    /// Run the local pass-through proxy.
    Proxy(ProxyArgs),
    /// Show the resolved configuration.
    Config,
}

/// Model selection shared by the catalog subcommands.
#[derive(clap::Args)]
struct ModelArgs {
    /// Manufacturer model number.
    #[arg(long, required = true)]
    model_number: String,
    /// Upstream model identifier.
    #[arg(long, required = true)]
    model_id: String,
}

impl ModelArgs {
    fn to_model_ref(&self) -> ModelRef {
        ModelRef::new(&self.model_number, &self.model_id)
    }
}

/// Arguments for the `parts` subcommand.
#[derive(clap::Args)]
struct PartsArgs {
    #[command(flatten)]
    model: ModelArgs,
    /// Diagram identifier.
    #[arg(long, required = true)]
    diagram_id: String,
}

/// Arguments for the `catalog` subcommand.
#[derive(clap::Args)]
struct CatalogArgs {
    #[command(flatten)]
    model: ModelArgs,
    /// Maximum per-diagram fetches in flight. Falls back to config (default: 1).
    #[arg(long)]
    concurrency: Option<NonZeroUsize>,
}

/// Arguments for the `proxy` subcommand.
#[derive(clap::Args)]
struct ProxyArgs {
    /// Listen address. Falls back to config (default: 127.0.0.1:8787).
    #[arg(long)]
    bind: Option<String>,
}

/// Loads `config.toml` and applies `VVIPL_*` environment overrides.
///
/// # Errors
///
/// Returns an error if the config path cannot be resolved or the file is invalid.
fn load_config(dir: Option<&PathBuf>) -> Result<AppConfig> {
    let config_path = resolve_config_path(dir).context("failed to resolve config path")?;
    let mut config = AppConfig::load(&config_path).context("failed to load config")?;
    config.apply_env(|key| std::env::var(key).ok());
    Ok(config)
}

/// Builds an `UpstreamClient` from the resolved configuration.
///
/// # Errors
///
/// Returns an error if the base URL or credentials are missing, or the
/// client fails to build.
#[instrument(skip_all)]
fn build_upstream_client(config: &AppConfig) -> Result<UpstreamClient> {
    UpstreamClient::builder()
        .base_url(config.upstream.base_url()?)
        .credentials(config.upstream.credentials()?)
        .timeout(config.upstream.timeout())
        .user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ))
        .build()
        .context("failed to build IPL API client")
}

/// Formats an optional number, `-` when absent.
fn fmt_number(value: Option<f64>) -> String {
    value.map_or_else(|| String::from("-"), |v| v.to_string())
}

/// Logs one parts table row.
fn log_part(number: &str, part: &Part) {
    tracing::info!(
        "{}\t{}\t{}\t{}\t{}",
        number,
        fmt_number(part.price()),
        fmt_number(part.list_price()),
        fmt_number(part.quantity()),
        part.description().unwrap_or("-"),
    );
}

/// Logs a parts table.
fn log_parts(parts: &PartsCatalog) {
    tracing::info!("PartNumber\tPrice\tListPrice\tQty\tDescription");
    for (number, part) in parts {
        log_part(number, part);
    }
}

/// Runs the `diagrams` subcommand.
///
/// # Errors
///
/// Returns an error if the client fails to build or the API request fails.
#[instrument(skip_all)]
async fn run_diagrams(args: &ModelArgs, config: &AppConfig) -> Result<()> {
    let client = build_upstream_client(config)?;
    let model = args.to_model_ref();

    let diagrams = fetch_diagrams(&client, &model)
        .await
        .context("failed to fetch diagrams")?;

    tracing::info!("DiagramID\tSection");
    for diagram in &diagrams {
        tracing::info!(
            "{}\t\t{}",
            diagram.id,
            diagram.section_name.as_deref().unwrap_or("-"),
        );
    }
    tracing::info!("Total: {} diagrams", diagrams.len());

    Ok(())
}

/// Runs the `parts` subcommand.
///
/// # Errors
///
/// Returns an error if the client fails to build or the API request fails.
#[instrument(skip_all)]
async fn run_parts(args: &PartsArgs, config: &AppConfig) -> Result<()> {
    let client = build_upstream_client(config)?;
    let model = args.model.to_model_ref();
    let diagram_id = DiagramId::new(&args.diagram_id);

    let parts = fetch_diagram_parts(&client, &model, &diagram_id)
        .await
        .with_context(|| format!("failed to fetch parts for diagram {diagram_id}"))?;

    log_parts(&parts);
    tracing::info!("Total: {} parts", parts.len());

    Ok(())
}

/// Runs the `catalog` subcommand.
///
/// Falls back to `[catalog].concurrency` when `--concurrency` is not given.
///
/// # Errors
///
/// Returns an error if the client fails to build or any API request fails.
#[instrument(skip_all)]
async fn run_catalog(args: &CatalogArgs, config: &AppConfig) -> Result<()> {
    let client = build_upstream_client(config)?;
    let model = args.model.to_model_ref();
    let concurrency = match args.concurrency {
        Some(n) => n,
        None => config.catalog.concurrency()?,
    };

    tracing::info!(
        model_number = %model.model_number,
        model_id = %model.model_id,
        concurrency = concurrency.get(),
        "Building parts catalog..."
    );

    let catalog = build_catalog(
        &client,
        &model,
        AggregateOptions::with_concurrency(concurrency),
    )
    .await
    .context("failed to build parts catalog")?;

    log_parts(&catalog);
    tracing::info!("Total: {} parts", catalog.len());

    Ok(())
}

/// Runs the `proxy` subcommand.
///
/// # Errors
///
/// Returns an error if the client fails to build, the address cannot be
/// bound, or the server fails.
#[instrument(skip_all)]
async fn run_proxy(args: &ProxyArgs, config: &AppConfig) -> Result<()> {
    let client = build_upstream_client(config)?;
    let bind = args.bind.as_deref().unwrap_or_else(|| config.proxy.bind());

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;

    vvipl_proxy::serve(listener, ProxyState::new(client)).await
}

/// Runs the `config` subcommand.
fn run_config(config: &AppConfig, dir: Option<&PathBuf>) -> Result<()> {
    let config_path = resolve_config_path(dir).context("failed to resolve config path")?;

    tracing::info!("Config file: {}", config_path.display());
    tracing::info!(
        "Base URL: {}",
        config.upstream.base_url.as_deref().unwrap_or("(not set)")
    );
    tracing::info!(
        "Username: {}",
        config.upstream.username.as_deref().unwrap_or("(not set)")
    );
    tracing::info!(
        "Password: {}",
        if config.upstream.password.is_some() {
            "(set)"
        } else {
            "(not set)"
        }
    );
    tracing::info!("Timeout: {}s", config.upstream.timeout().as_secs());
    tracing::info!("Concurrency: {}", config.catalog.concurrency()?);
    tracing::info!("Proxy bind: {}", config.proxy.bind());

    Ok(())
}

/// Entry point.
///
/// # Errors
///
/// Returns an error if subcommand execution fails.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    #[cfg(not(feature = "otel"))]
    {
        fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_target(false)
            .init();
    }

    #[cfg(feature = "otel")]
    {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);

        let otel_layer = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .ok()
            .and_then(|_| {
                let exporter = opentelemetry_otlp::SpanExporter::builder()
                    .with_http()
                    .build()
                    .ok()?;

                let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
                    .with_simple_exporter(exporter)
                    .build();

                let tracer = opentelemetry::trace::TracerProvider::tracer(
                    &tracer_provider,
                    env!("CARGO_PKG_NAME"),
                );
                opentelemetry::global::set_tracer_provider(tracer_provider);

                Some(tracing_opentelemetry::layer().with_tracer(tracer))
            });

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(otel_layer)
            .init();
    }

    let cli = Cli::parse();
    let dir = cli.dir.as_ref();
    let config = load_config(dir)?;

    match cli.command {
        Commands::Diagrams(args) => run_diagrams(&args, &config).await,
        Commands::Parts(args) => run_parts(&args, &config).await,
        Commands::Catalog(args) => run_catalog(&args, &config).await,
        Commands::Proxy(args) => run_proxy(&args, &config).await,
        Commands::Config => run_config(&config, dir),
    }
}
