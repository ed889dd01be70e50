//! Shared helpers for the end-to-end tests: a controller wired to the HTTP
//! backend and the headless engine, pointed at a mock server.

#![allow(dead_code)]

use mockito::Server;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

use vodplay::backends::HttpBackend;
use vodplay::config::BackendConfig;
use vodplay::controller::LatestAddress;
use vodplay::events::EventBus;
use vodplay::player::{EngineEvent, HeadlessEngineFactory, HeadlessSurface, NoWakeLock};
use vodplay::{Config, ControllerParts, SessionController};

pub const PLAYLIST: &str = "#EXTM3U
#EXT-X-TARGETDURATION:10
#EXTINF:10,
seg1.ts
#EXT-X-DISCONTINUITY
#EXTINF:5,
ad.ts
#EXT-X-DISCONTINUITY
#EXTINF:10,
seg2.ts
#EXT-X-ENDLIST
";

pub struct Headless {
    pub controller: Arc<SessionController>,
    pub surface: Arc<HeadlessSurface>,
    pub address: Arc<LatestAddress>,
    pub engine_events: UnboundedReceiver<EngineEvent>,
}

pub fn test_config(server: &Server) -> Config {
    Config {
        backend: BackendConfig {
            base_url: server.url(),
            timeout_secs: 5,
            user_agent: "vodplay-test".to_string(),
        },
        ..Config::default()
    }
}

pub fn headless(server: &Server) -> Headless {
    let config = test_config(server);
    let backend = Arc::new(HttpBackend::new(&config.backend).unwrap());
    let (engines, engine_events) = HeadlessEngineFactory::new();
    let surface = Arc::new(HeadlessSurface::new());
    let address = Arc::new(LatestAddress::new());

    let controller = SessionController::new(
        config,
        ControllerParts {
            backend,
            surface: surface.clone(),
            engines: Arc::new(engines),
            wake_lock: Arc::new(NoWakeLock),
            address: address.clone(),
            events: Arc::new(EventBus::default()),
        },
    );

    Headless {
        controller,
        surface,
        address,
        engine_events,
    }
}

/// Catalog entry whose episodes are served by the mock server.
pub fn detail_json(server: &Server, source: &str, id: &str, episodes: usize) -> Value {
    let uris: Vec<String> = (1..=episodes)
        .map(|i| format!("{}/media/{}/{}/{}.m3u8", server.url(), source, id, i))
        .collect();
    json!({
        "id": id,
        "source": source,
        "source_name": format!("{} source", source),
        "title": "Test Show",
        "poster": "https://img.test/poster.jpg",
        "year": "2024",
        "episodes": uris,
    })
}

/// Forward engine signals to the controller until `done` holds for one of
/// them, the controller halts, or `timeout` elapses.
pub async fn pump_until(
    h: &mut Headless,
    timeout: Duration,
    mut done: impl FnMut(&EngineEvent) -> bool,
) -> Option<EngineEvent> {
    let controller = h.controller.clone();
    tokio::time::timeout(timeout, async {
        while let Some(event) = h.engine_events.recv().await {
            let finished = done(&event);
            controller.handle_engine_event(event.clone()).await;
            if finished || controller.phase().is_error() {
                return Some(event);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}
