//! LOB depth chart service entry point.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lob_depth::api::{create_router, AppState};
use lob_depth::bot::{ConversationId, Dispatcher, SessionStore};
use lob_depth::chart::{ArtifactStore, ChartRenderer, Variant};
use lob_depth::client::HttpClient;
use lob_depth::config::{Config, LogSettings};
use lob_depth::delivery::{Backoff, DirectorySink};
use lob_depth::depth::{Band, DepthDataset};
use lob_depth::metrics;
use lob_depth::utils::shutdown_signal;

/// Limit-order-book depth charts.
#[derive(Parser, Debug)]
#[command(name = "lob-depth")]
#[command(about = "Fetch order book depth snapshots and render depth charts")]
#[command(version)]
struct Args {
    /// Enable verbose logging; also set by VERBOSE=true.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check configuration validity and credentials.
    CheckConfig,

    /// Print available symbols.
    Symbols,

    /// Print the normalized depth dataset for a symbol as JSON.
    Depth {
        /// Trading symbol, e.g. BTCUSDT.
        symbol: String,

        /// Maximum number of records.
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Render depth charts into a directory.
    Chart {
        /// Trading symbol, e.g. BTCUSDT.
        symbol: String,

        /// Depth bands in percent (1, 3, 5, 8). All four by default.
        #[arg(long, value_delimiter = ',')]
        pct: Vec<u8>,

        /// Chart variant: 0 raw, 1 ratio, 2 difference.
        #[arg(long, default_value = "0")]
        variant: u8,

        /// Output directory for the PNG files.
        #[arg(long, default_value = "charts")]
        out_dir: PathBuf,

        /// Maximum number of records.
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Read commands from stdin as one conversation.
    Repl {
        /// Conversation identifier.
        #[arg(long, default_value = "local")]
        conversation: String,

        /// Directory that receives delivered charts.
        #[arg(long, default_value = "charts")]
        out_dir: PathBuf,
    },

    /// Run the HTTP API.
    Serve {
        /// HTTP server port; defaults to PORT.
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let log = LogSettings::load();
    let filter = EnvFilter::try_new(log.directive(args.verbose)).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(args.log_json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!args.log_json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .with(filter)
        .init();

    match args.command {
        Command::CheckConfig => cmd_check_config().await,
        Command::Symbols => with_client(|config, client| cmd_symbols(config, client)).await,
        Command::Depth { symbol, limit } => {
            with_client(|config, client| cmd_depth(config, client, symbol, limit)).await
        }
        Command::Chart {
            symbol,
            pct,
            variant,
            out_dir,
            limit,
        } => {
            with_client(|config, client| cmd_chart(config, client, symbol, pct, variant, out_dir, limit))
                .await
        }
        Command::Repl {
            conversation,
            out_dir,
        } => with_client(|config, client| cmd_repl(config, client, conversation, out_dir)).await,
        Command::Serve { port } => with_client(|config, client| cmd_serve(config, client, port)).await,
    }
}

/// Load and validate configuration.
fn load_config() -> anyhow::Result<Config> {
    let config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;
    Ok(config)
}

/// Run `command` with a client built from configuration, closing the
/// client whatever the outcome.
async fn with_client<F, Fut>(command: F) -> anyhow::Result<()>
where
    F: FnOnce(Config, Arc<HttpClient>) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<()>>,
{
    let config = load_config()?;
    let client = Arc::new(HttpClient::from_config(&config)?);
    let result = command(config, client.clone()).await;
    client.close();
    result
}

/// Check configuration validity.
async fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("LOB DEPTH - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    print!("Authenticating... ");
    let client = HttpClient::from_config(&config)?;
    let auth = client.session().authenticate().await;
    client.close();
    match auth {
        Ok(_) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Authentication failed"));
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  API: {}", config.lob_api_base_url);
    println!("  User: {}", config.lob_api_username);
    match config.token_ttl() {
        Some(ttl) => println!("  Token TTL: {}s", ttl.as_secs()),
        None => println!("  Token TTL: until rejected"),
    }
    println!("  Depth Limit: {}", config.depth_limit);
    println!("  Artifacts: {}", config.artifact_dir.display());
    println!("  Chart Size: {}x{}", config.chart_width, config.chart_height);
    println!(
        "  Send Policy: {} attempts, {}ms apart",
        config.send_max_attempts, config.send_retry_delay_ms
    );
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Print available symbols, one per line.
async fn cmd_symbols(_config: Config, client: Arc<HttpClient>) -> anyhow::Result<()> {
    let symbols = DepthDataset::new(client)
        .try_fetch_symbols()
        .await
        .context("fetching symbols")?;
    for symbol in symbols {
        println!("{}", symbol);
    }
    Ok(())
}

/// Print a normalized dataset as pretty JSON.
async fn cmd_depth(
    config: Config,
    client: Arc<HttpClient>,
    symbol: String,
    limit: Option<u32>,
) -> anyhow::Result<()> {
    let limit = limit.unwrap_or(config.depth_limit);
    let dataset = DepthDataset::new(client)
        .fetch_depth(&symbol, limit)
        .await
        .ok_or_else(|| anyhow::anyhow!("No depth data for {}", symbol))?;
    println!("{}", serde_json::to_string_pretty(&dataset.to_json())?);
    Ok(())
}

/// Render the requested bands and keep the PNGs in `out_dir`.
async fn cmd_chart(
    config: Config,
    client: Arc<HttpClient>,
    symbol: String,
    pct: Vec<u8>,
    variant: u8,
    out_dir: PathBuf,
    limit: Option<u32>,
) -> anyhow::Result<()> {
    let variant = Variant::try_from(variant)?;
    let bands: Vec<Band> = if pct.is_empty() {
        Band::all().collect()
    } else {
        pct.into_iter()
            .map(Band::try_from)
            .collect::<Result<_, _>>()?
    };

    let dataset = DepthDataset::new(client)
        .fetch_depth(&symbol, limit.unwrap_or(config.depth_limit))
        .await
        .ok_or_else(|| anyhow::anyhow!("No depth data for {}", symbol))?;
    println!("Len:{}", dataset.len());

    let renderer = ChartRenderer::new(ArtifactStore::new(out_dir), config.chart_width, config.chart_height);
    let dataset = Arc::new(dataset);
    let renders = futures::future::join_all(
        bands
            .iter()
            .map(|band| renderer.render_blocking(dataset.clone(), *band, variant)),
    )
    .await;

    let mut failures = 0;
    for (band, rendered) in bands.iter().zip(renders) {
        match rendered {
            Ok(artifact) => {
                let description = artifact.description().to_string();
                let path = artifact.persist();
                println!("{}: {}", description, path.display());
            }
            Err(e) => {
                failures += 1;
                println!("{}: FAILED ({})", variant.description(*band), e);
            }
        }
    }

    if failures == bands.len() {
        anyhow::bail!("No chart could be rendered");
    }
    Ok(())
}

/// Feed stdin lines to a dispatcher as one conversation.
async fn cmd_repl(
    config: Config,
    client: Arc<HttpClient>,
    conversation: String,
    out_dir: PathBuf,
) -> anyhow::Result<()> {
    metrics::init_metrics();
    let renderer = ChartRenderer::new(
        ArtifactStore::new(&config.artifact_dir),
        config.chart_width,
        config.chart_height,
    );
    let dispatcher = Dispatcher::new(
        DepthDataset::new(client),
        renderer,
        Arc::new(DirectorySink::new(out_dir)),
        Arc::new(SessionStore::new()),
    )
    .with_policy(config.send_policy())
    .with_limit(config.depth_limit);

    let conversation = ConversationId::new(conversation);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    info!(conversation = %conversation, "Reading commands from stdin, /help for usage");
    loop {
        tokio::select! {
            () = &mut shutdown => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                if let Err(e) = dispatcher.handle(&conversation, &line).await {
                    warn!(error = %e, "Reply failed");
                }
            }
        }
    }
    Ok(())
}

/// Run the HTTP API until shutdown.
async fn cmd_serve(config: Config, client: Arc<HttpClient>, port: Option<u16>) -> anyhow::Result<()> {
    let prometheus = if config.metrics_enabled {
        Some(metrics::install_prometheus()?)
    } else {
        metrics::init_metrics();
        None
    };

    let renderer = ChartRenderer::new(
        ArtifactStore::new(&config.artifact_dir),
        config.chart_width,
        config.chart_height,
    );
    let mut state = AppState::new(DepthDataset::new(client), renderer, config.depth_limit);
    if let Some(handle) = prometheus {
        state = state.with_prometheus(handle);
    }

    // Authenticate in the background; /ready turns green on success
    let warmup_state = state.clone();
    let warmup = tokio::spawn(async move {
        let backoff = Backoff::Exponential {
            base: Duration::from_secs(1),
            factor: 2.0,
            max: Duration::from_secs(30),
        };
        let mut attempt = 0;
        while !warmup_state.authenticate().await {
            tokio::time::sleep(backoff.delay(attempt)).await;
            attempt += 1;
        }
    });

    let port = port.unwrap_or(config.port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    let result = axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;
    warmup.abort();
    result?;

    info!("HTTP server stopped");
    Ok(())
}
