use anyhow::{Result, bail};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use vodplay::backends::HttpBackend;
use vodplay::controller::{LatestAddress, to_query_string};
use vodplay::events::EventBus;
use vodplay::models::RouteParams;
use vodplay::player::{EngineEvent, HeadlessEngineFactory, HeadlessSurface, NoWakeLock};
use vodplay::{Config, ControllerParts, SessionController, SessionPhase};

/// How long to wait for the first manifest before giving up.
const READY_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Parser)]
#[command(
    name = "vodplay",
    version,
    about = "Resolve a title through the playback backend and print the session"
)]
struct Cli {
    /// Source key of the catalog entry
    source: Option<String>,
    /// Content id within the source
    id: Option<String>,
    /// Resolve by title search instead of by identity
    #[arg(long)]
    query: Option<String>,
    /// Pick the best-measured source even when an identity is given
    #[arg(long)]
    prefer: bool,
    /// Alternate config file
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn route_params(&self) -> Result<RouteParams> {
        let mut params = match (&self.source, &self.id, &self.query) {
            (Some(source), Some(id), query) => {
                let mut params = RouteParams::for_identity(source.as_str(), id.as_str());
                params.title = query.clone().unwrap_or_default();
                params
            }
            (None, None, Some(query)) => RouteParams::for_query(query.as_str()),
            _ => bail!("expected <source> <id> or --query <title>"),
        };
        params.prefer = self.prefer;
        Ok(params)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vodplay=info")),
        )
        .init();

    let cli = Cli::parse();
    let params = cli.route_params()?;
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    info!("Using backend at {}", config.backend.base_url);

    let backend = Arc::new(HttpBackend::new(&config.backend)?);
    let (engines, mut engine_events) = HeadlessEngineFactory::new();
    let address = Arc::new(LatestAddress::new());
    let controller = SessionController::new(
        config,
        ControllerParts {
            backend,
            surface: Arc::new(HeadlessSurface::new()),
            engines: Arc::new(engines),
            wake_lock: Arc::new(NoWakeLock),
            address: address.clone(),
            events: Arc::new(EventBus::default()),
        },
    );

    if let Err(e) = controller.mount(params).await {
        error!("Mount failed: {}", e);
        controller.teardown().await;
        return Err(e.into());
    }

    let waited = tokio::time::timeout(READY_TIMEOUT, async {
        while let Some(event) = engine_events.recv().await {
            let done = matches!(event, EngineEvent::Ready);
            controller.handle_engine_event(event).await;
            if done || controller.phase().is_error() || controller.active_uri().await.is_none() {
                break;
            }
        }
    })
    .await;
    if waited.is_err() {
        warn!("No manifest within {:?}", READY_TIMEOUT);
    }

    print_session(&controller, address.current().map(|a| to_query_string(&a)));
    let failed = matches!(controller.phase(), SessionPhase::Error(_));
    controller.teardown().await;

    if failed {
        bail!("session ended in error");
    }
    Ok(())
}

fn print_session(controller: &SessionController, query: Option<String>) {
    let session = controller.store().current();
    println!("phase:    {}", controller.phase().as_str());
    if let SessionPhase::Error(message) = controller.phase() {
        println!("error:    {}", message);
    }
    println!("title:    {} ({})", session.title, session.year);
    println!("source:   {}+{} {}", session.source, session.content_id, session.source_name());
    if let Some(query) = query {
        println!("address:  play?{}", query);
    }

    if let Some(detail) = session.detail.as_deref() {
        println!("episodes: {}", detail.episode_count());
        for (index, uri) in detail.episodes.iter().enumerate() {
            let marker = if index == session.episode_index { '>' } else { ' ' };
            let title = detail.episode_title(index).unwrap_or("");
            println!(" {} {:>3} {:<12} {}", marker, index + 1, title, uri);
        }
    }

    if !session.available_sources.is_empty() {
        println!("sources:");
        for candidate in &session.available_sources {
            let key = format!("{}-{}", candidate.source, candidate.id);
            match session.source_metrics.get(&key) {
                Some(metrics) => println!(
                    "   {:<24} {:>3} eps  {} {} {}ms",
                    key,
                    candidate.episode_count(),
                    metrics.quality,
                    metrics.load_speed,
                    metrics.ping_ms
                ),
                None => println!("   {:<24} {:>3} eps", key, candidate.episode_count()),
            }
        }
    }
}
