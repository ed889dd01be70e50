use super::*;
use crate::models::ContentDetail;
use crate::scheduling::SkipDecision;
use mockito::{Matcher, Server};
use serde_json::json;

fn create_test_backend(server: &Server) -> HttpBackend {
    let config = BackendConfig {
        base_url: server.url(),
        timeout_secs: 5,
        user_agent: "vodplay-test".to_string(),
    };
    HttpBackend::new(&config).unwrap()
}

fn create_detail_response() -> serde_json::Value {
    json!({
        "id": "42",
        "source": "alpha",
        "source_name": "Alpha",
        "title": "Test Show",
        "poster": "https://img.test/42.jpg",
        "year": "2024",
        "episodes": [
            "https://cdn.test/42/1.m3u8",
            "https://cdn.test/42/2.m3u8",
            "https://cdn.test/42/3.m3u8"
        ],
        "episodes_titles": ["Ep 1", "Ep 2", "Ep 3"]
    })
}

const AD_PLAYLIST: &str = "#EXTM3U
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

#[test]
fn test_rejects_invalid_base_url() {
    let config = BackendConfig {
        base_url: "not a url".to_string(),
        ..BackendConfig::default()
    };
    assert!(HttpBackend::new(&config).is_err());
}

#[tokio::test]
async fn test_resolve_by_identity() {
    let mut server = Server::new_async().await;
    let backend = create_test_backend(&server);

    let _m = server
        .mock("POST", "/api/play/resolve")
        .match_header("user-agent", "vodplay-test")
        .match_body(Matcher::PartialJson(json!({
            "source": "alpha",
            "id": "42",
            "title_hint": "Test Show"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "detail": create_detail_response(),
                "available_sources": [create_detail_response()],
                "resume_seconds": 132.0,
                "initial_episode_index": 2,
                "favorited": true,
                "skip_config": {"enabled": true, "intro_seconds": 30.0, "outro_seconds": -20.0}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let resolution = backend
        .resolve_by_identity(&"alpha".into(), &"42".into(), "Test Show")
        .await
        .unwrap();

    assert_eq!(resolution.detail.episode_count(), 3);
    assert_eq!(resolution.resume_seconds, Some(132.0));
    assert_eq!(resolution.initial_episode_index, Some(2));
    assert!(resolution.favorited);
    assert!(resolution.ad_filter_enabled);
    assert_eq!(resolution.skip_config.unwrap().intro_seconds, 30.0);
}

#[tokio::test]
async fn test_resolve_by_query() {
    let mut server = Server::new_async().await;
    let backend = create_test_backend(&server);

    let _m = server
        .mock("POST", "/api/play/query")
        .match_body(Matcher::PartialJson(json!({"query": "Test Show", "prefer_best": true})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "results": [create_detail_response()],
                "test_results": {
                    "alpha-42": {"quality": "1080p", "load_speed": "2.1 MB/s", "ping_ms": 120}
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let request = QueryRequest {
        query: "Test Show".to_string(),
        filter_title: "Test Show".to_string(),
        prefer_best: true,
        ..QueryRequest::default()
    };
    let resolution = backend.resolve_by_query(&request).await.unwrap();

    assert_eq!(resolution.results.len(), 1);
    let metrics = &resolution.test_results["alpha-42"];
    assert_eq!(metrics.quality, "1080p");
    assert_eq!(metrics.ping_ms, 120);
    assert!(!metrics.had_error);
}

#[tokio::test]
async fn test_change_source() {
    let mut server = Server::new_async().await;
    let backend = create_test_backend(&server);

    let _m = server
        .mock("POST", "/api/play/change-source")
        .match_body(Matcher::PartialJson(json!({
            "new_source": "beta",
            "current_episode_index": 3,
            "current_play_seconds": 132.0
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "detail": create_detail_response(),
                "target_episode_index": 2,
                "resume_seconds": 128.5
            })
            .to_string(),
        )
        .create_async()
        .await;

    let request = ChangeSourceRequest {
        prev_source: Some("alpha".into()),
        prev_id: Some("42".into()),
        new_source: "beta".into(),
        new_id: "7".into(),
        available_sources: vec![ContentDetail::default()],
        current_episode_index: 3,
        current_play_seconds: 132.0,
        resume_seconds: None,
        skip_config: SkipConfig::default(),
    };
    let resolution = backend.change_source(&request).await.unwrap();
    assert_eq!(resolution.target_episode_index, 2);
    assert_eq!(resolution.resume_seconds, Some(128.5));
}

#[tokio::test]
async fn test_server_error_is_reported() {
    let mut server = Server::new_async().await;
    let backend = create_test_backend(&server);

    let _m = server
        .mock("POST", "/api/play/resolve")
        .with_status(500)
        .create_async()
        .await;

    let result = backend
        .resolve_by_identity(&"alpha".into(), &"42".into(), "")
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_manifest_filtering_follows_flag() {
    let mut server = Server::new_async().await;
    let backend = create_test_backend(&server);

    let m = server
        .mock("GET", "/video/index.m3u8")
        .with_status(200)
        .with_body(AD_PLAYLIST)
        .expect(2)
        .create_async()
        .await;

    let uri = format!("{}/video/index.m3u8", server.url());

    let filtered = backend.fetch_filtered_manifest(&uri, true).await.unwrap();
    assert!(!filtered.contains("ad.ts"));
    assert!(filtered.contains("seg2.ts"));

    let raw = backend.fetch_filtered_manifest(&uri, false).await.unwrap();
    assert_eq!(raw, AD_PLAYLIST);

    m.assert_async().await;
}

#[tokio::test]
async fn test_fetch_binary_sends_range() {
    let mut server = Server::new_async().await;
    let backend = create_test_backend(&server);

    let _m = server
        .mock("GET", "/video/seg1.ts")
        .match_header("range", "bytes=0-")
        .with_status(200)
        .with_body(vec![0x47u8; 188])
        .create_async()
        .await;

    let bytes = backend
        .fetch_binary(&format!("{}/video/seg1.ts", server.url()))
        .await
        .unwrap();
    assert_eq!(bytes.len(), 188);
    assert_eq!(bytes[0], 0x47);
}

#[tokio::test]
async fn test_fetch_binary_not_found() {
    let mut server = Server::new_async().await;
    let backend = create_test_backend(&server);

    let _m = server
        .mock("GET", "/video/missing.ts")
        .with_status(404)
        .create_async()
        .await;

    let result = backend
        .fetch_binary(&format!("{}/video/missing.ts", server.url()))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_save_progress_and_skip_config() {
    let mut server = Server::new_async().await;
    let backend = create_test_backend(&server);

    let _progress = server
        .mock("POST", "/api/play/progress")
        .match_body(Matcher::PartialJson(json!({"episode_index": 1, "play_seconds": 61.0})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"saved": false}"#)
        .create_async()
        .await;

    let _skip = server
        .mock("POST", "/api/skip-config")
        .match_body(Matcher::PartialJson(json!({
            "source": "alpha",
            "id": "42",
            "enabled": false,
            "intro_seconds": 0.0
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"deleted": true}"#)
        .create_async()
        .await;

    let record = ProgressRecord {
        source: "alpha".into(),
        id: "42".into(),
        episode_index: 1,
        total_episodes: 3,
        play_seconds: 61.0,
        total_seconds: 1200.0,
        ..ProgressRecord::default()
    };
    assert!(!backend.save_progress(&record).await.unwrap());

    let result = backend
        .apply_skip_config(&"alpha".into(), &"42".into(), &SkipConfig::cleared())
        .await
        .unwrap();
    assert!(result.deleted);
}

#[tokio::test]
async fn test_favorites_and_player_config() {
    let mut server = Server::new_async().await;
    let backend = create_test_backend(&server);

    let _list = server
        .mock("GET", "/api/favorites")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"key": "alpha+42", "title": "Test Show"}, {"key": "beta+7"}]"#)
        .create_async()
        .await;

    let _toggle = server
        .mock("POST", "/api/favorites/toggle")
        .match_body(Matcher::PartialJson(json!({"key": "alpha+42", "episode": 1})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"favorited": false}"#)
        .create_async()
        .await;

    let _config = server
        .mock("PUT", "/api/player-config")
        .match_body(Matcher::Json(json!({"ad_filter_enabled": false})))
        .with_status(204)
        .create_async()
        .await;

    let favorites = backend.list_favorites().await.unwrap();
    assert_eq!(favorites.len(), 2);
    assert_eq!(favorites[1].title, "");

    let state = backend
        .toggle_favorite(&FavoriteRecord {
            key: "alpha+42".to_string(),
            episode: 1,
            ..FavoriteRecord::default()
        })
        .await
        .unwrap();
    assert!(!state.favorited);

    backend
        .update_player_config(&PlayerConfigUpdate {
            ad_filter_enabled: false,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_preload_and_local_skip_decision() {
    let mut server = Server::new_async().await;
    let backend = create_test_backend(&server);

    let _m = server
        .mock("POST", "/api/play/preload")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"did_preload": true}"#)
        .create_async()
        .await;

    let decision = backend
        .decide_preload(&PreloadQuery {
            source: "alpha".into(),
            id: "42".into(),
            current_episode: 0,
            total_episodes: 3,
            current_seconds: 1100.0,
            total_seconds: 1200.0,
        })
        .await
        .unwrap();
    assert!(decision.did_preload);

    let skip = backend
        .compute_skip_action(30.0, -20.0, 1.0, 1200.0)
        .await
        .unwrap();
    assert_eq!(skip, SkipDecision::SkipIntroTo { seconds: 30.0 });
}
