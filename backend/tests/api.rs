use std::sync::Arc;
use std::time::Duration;

use analysis::economy::Item;
use analysis::event::{EventPayload, PlayerId, Position};
use analysis::writer::DemoBuilder;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::demo_analysis::{Team, WinReason};
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use tower::ServiceExt;
use tracing_test::traced_test;

use backend::jobs::{Registry, Workers};
use backend::service::{Service, Settings};
use backend::storage::MemoryStorage;

const BOUNDARY: &str = "demo-form-boundary";

fn service(settings: Settings) -> Arc<Service> {
    Arc::new(Service {
        storage: Arc::new(MemoryStorage::new()),
        cache: None,
        ranks: Arc::new(backend::rank::Disabled),
        registry: Registry::new(),
        workers: Workers::new(2, Duration::from_secs(30)),
        settings,
    })
}

fn steam_id(player: u16) -> u64 {
    76561198000000000 + player as u64
}

/// Round 1: player 1 kills player 2, CT wins. Round 2: no deaths, T wins.
fn two_rounds(map: &str) -> Vec<u8> {
    let mut builder = DemoBuilder::new(map);
    builder
        .player(1, steam_id(1), "alice", Team::T)
        .player(2, steam_id(2), "bob", Team::CT)
        .at(0)
        .event(EventPayload::RoundStart)
        .event(EventPayload::PlayerPosition {
            player: PlayerId(1),
            position: Position {
                x: 10.0,
                y: 20.0,
                z: 0.0,
            },
        })
        .at(100)
        .event(EventPayload::PlayerDeath {
            victim: PlayerId(2),
            attacker: Some(PlayerId(1)),
            assister: None,
            weapon: Item::AK47,
            headshot: true,
            flash_assist: false,
        })
        .at(150)
        .event(EventPayload::RoundEnd {
            winner: Team::CT,
            reason: WinReason::TimeRanOut,
        })
        .at(200)
        .event(EventPayload::RoundStart)
        .at(400)
        .event(EventPayload::RoundEnd {
            winner: Team::T,
            reason: WinReason::CTKilled,
        });
    builder.build()
}

fn upload(filename: &str, content: &[u8], match_id: Option<&str>) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let mut request = Request::builder()
        .method("POST")
        .uri("/process-demo")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(id) = match_id {
        request = request.header("x-match-id", id);
    }
    request.body(Body::from(body)).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(router: &axum::Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
#[traced_test]
async fn two_round_scenario() {
    let router = backend::api::router(service(Settings::default()));

    let (status, stats) = send(&router, upload("match.dem", &two_rounds("de_dust2"), None)).await;
    assert_eq!(StatusCode::OK, status, "{}", stats);

    assert_eq!("de_dust2", stats["mapName"]);
    assert_eq!(serde_json::json!({ "CT": 1, "T": 1 }), stats["teamScores"]);
    assert_eq!(2, stats["rounds"].as_array().unwrap().len());

    let alice = &stats["perPlayerStats"][steam_id(1).to_string()];
    assert_eq!(1, alice["kills"]);
    assert_eq!(100.0, alice["headshotPct"]);
    let bob = &stats["perPlayerStats"][steam_id(2).to_string()];
    assert_eq!(1, bob["deaths"]);
    assert_eq!(0.0, bob["headshotPct"]);

    let match_id = stats["matchId"].as_str().unwrap().to_owned();
    assert!(uuid::Uuid::parse_str(&match_id).is_ok());

    let (status, details) = send(&router, get(&format!("/match-details/{}", match_id))).await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(stats, details);

    let (_, job) = send(&router, get(&format!("/match-details/{}/status", match_id))).await;
    assert_eq!("done", job["status"]);

    let (status, heatmaps) =
        send(&router, get(&format!("/match-details/{}/heatmaps", match_id))).await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(1, heatmaps.as_array().unwrap().len());
    assert_eq!(steam_id(1).to_string(), heatmaps[0]["steamId"]);

    assert!(logs_contain("Job completed"));
}

#[tokio::test]
async fn bad_magic_leaves_nothing_behind() {
    let service = service(Settings::default());
    let router = backend::api::router(service.clone());

    let mut content = two_rounds("de_nuke");
    content[0] = b'X';

    let (status, body) = send(&router, upload("match.dem", &content, Some("bad-1"))).await;
    assert_eq!(StatusCode::BAD_REQUEST, status);
    assert_eq!("FormatError", body["code"]);
    assert_eq!("bad magic", body["message"]);

    assert!(service.registry.is_empty());
    let (status, body) = send(&router, get("/match-details/bad-1")).await;
    assert_eq!(StatusCode::NOT_FOUND, status);
    assert_eq!("NotFoundError", body["code"]);
}

#[tokio::test]
async fn validation_errors() {
    let router = backend::api::router(service(Settings {
        max_upload_bytes: 64,
        ..Default::default()
    }));

    let (status, body) = send(&router, upload("match.zip", b"DEMSTRM\0", None)).await;
    assert_eq!(StatusCode::BAD_REQUEST, status);
    assert_eq!("ValidationError", body["code"]);

    let (status, body) = send(&router, upload("match.dem", &two_rounds("de_nuke"), None)).await;
    assert_eq!(StatusCode::BAD_REQUEST, status);
    assert_eq!("ValidationError", body["code"]);

}

#[tokio::test]
async fn malformed_match_id() {
    let service = service(Settings::default());
    let router = backend::api::router(service.clone());

    let long = "a".repeat(65);
    for id in ["../x", "", long.as_str()] {
        let (status, body) =
            send(&router, upload("match.dem", &two_rounds("de_nuke"), Some(id))).await;
        assert_eq!(StatusCode::BAD_REQUEST, status, "{}", id);
        assert_eq!("ValidationError", body["code"]);
        assert!(
            body["message"].as_str().unwrap().starts_with("match id"),
            "{}",
            body
        );
    }

    assert!(service.registry.is_empty());
}

#[tokio::test]
async fn truncated_demo() {
    let router = backend::api::router(service(Settings::default()));

    let content = two_rounds("de_nuke");
    let (status, body) = send(
        &router,
        upload("match.dem", &content[..content.len() - 2], None),
    )
    .await;

    assert_eq!(StatusCode::BAD_REQUEST, status);
    assert_eq!("FormatError", body["code"]);
}

#[tokio::test]
async fn no_rounds_is_unprocessable() {
    let router = backend::api::router(service(Settings::default()));

    let content = DemoBuilder::new("de_vertigo").build();
    let (status, body) = send(&router, upload("warmup.DEM", &content, Some("warmup"))).await;
    assert_eq!(StatusCode::UNPROCESSABLE_ENTITY, status);
    assert_eq!("AggregationError", body["code"]);

    let (_, job) = send(&router, get("/match-details/warmup/status")).await;
    assert_eq!("failed", job["status"]);

    let (status, _) = send(&router, get("/match-details/warmup")).await;
    assert_eq!(StatusCode::NOT_FOUND, status);
}

#[tokio::test]
async fn requested_ids_are_unique() {
    let router = backend::api::router(service(Settings::default()));
    let content = two_rounds("de_inferno");

    let (status, stats) = send(&router, upload("a.dem", &content, Some("scrim-1"))).await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!("scrim-1", stats["matchId"]);

    let (status, body) = send(&router, upload("a.dem", &content, Some("scrim-1"))).await;
    assert_eq!(StatusCode::BAD_REQUEST, status);
    assert_eq!("ValidationError", body["code"]);
}

#[tokio::test]
async fn health() {
    let router = backend::api::router(service(Settings::default()));

    let (status, body) = send(&router, get("/health")).await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(
        serde_json::json!({ "status": "ok", "service": "demo-ingest" }),
        body
    );
}

#[tokio::test]
async fn unknown_match() {
    let router = backend::api::router(service(Settings::default()));

    let (status, body) = send(&router, get("/match-details/nope")).await;
    assert_eq!(StatusCode::NOT_FOUND, status);
    assert_eq!("NotFoundError", body["code"]);

    let (status, _) = send(&router, get("/match-details/nope/status")).await;
    assert_eq!(StatusCode::NOT_FOUND, status);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_are_independent() {
    let service = service(Settings::default());
    let router = backend::api::router(service.clone());
    let maps = ["de_ancient", "de_anubis", "de_mirage", "de_overpass", "de_train", "de_cache"];

    let requests = maps.iter().map(|map| {
        let router = router.clone();
        let request = upload("match.dem", &two_rounds(map), Some(*map));
        async move { send(&router, request).await }
    });
    let responses = futures::future::join_all(requests).await;

    for (map, (status, stats)) in maps.iter().zip(responses) {
        assert_eq!(StatusCode::OK, status);
        assert_eq!(*map, stats["matchId"]);
        assert_eq!(*map, stats["mapName"]);
        assert_eq!(serde_json::json!({ "CT": 1, "T": 1 }), stats["teamScores"]);
        assert_eq!(2, stats["perPlayerStats"].as_object().unwrap().len());
    }

    assert_eq!(maps.len(), service.registry.len());
    assert_eq!(2, service.workers.available());
}
