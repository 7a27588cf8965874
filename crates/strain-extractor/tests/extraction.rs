//! End-to-end extraction tests against the scripted renderer.
//!
//! All tests run on paused tokio time, so the settle windows and response
//! delays below are exact and cost nothing.

use std::time::Duration;

use assert_json_diff::assert_json_eq;
use serde_json::json;

use strain_extractor::renderer::scripted::{Script, ScriptStats, ScriptedLauncher, ScriptedResponse};
use strain_extractor::{ExtractError, ExtractorConfig, SettleStrategy, StrainExtractor};

// ─────────────────────── helpers ───────────────────────

const BASE: &str = "https://www.leafly.com";
const API: &str = "https://consumer-api.leafly.com/api/strain/v2/public/blue-dream";

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn extractor(script: Script) -> StrainExtractor<ScriptedLauncher> {
    StrainExtractor::new(ScriptedLauncher::new(script), ExtractorConfig::default())
}

/// One launch, one page, both released once.
fn released_once() -> ScriptStats {
    ScriptStats {
        launches: 1,
        shutdowns: 1,
        contexts_opened: 1,
        contexts_closed: 1,
        navigations: 1,
    }
}

fn blue_dream_payload() -> serde_json::Value {
    json!({
        "name": "Blue Dream",
        "category": "Hybrid",
        "thc": { "formatted": "18%" },
        "description": "Blue Dream is a sativa-dominant hybrid.",
        "effects": {
            "primary": [{ "label": "Relaxed" }, { "label": "Happy" }],
            "secondary": [{ "label": "Euphoric" }]
        }
    })
}

// ─────────────────────── success paths ───────────────────────

#[tokio::test(start_paused = true)]
async fn test_extracts_full_record() {
    let ex = extractor(
        Script::new()
            .navigation_time(ms(800))
            .respond(ScriptedResponse::ok(ms(50), "https://www.leafly.com/_next/app.js", "js"))
            .respond(ScriptedResponse::json(ms(300), API, &blue_dream_payload())),
    );

    let record = ex.extract("blue-dream").await.unwrap();

    assert_json_eq!(
        serde_json::to_value(&record).unwrap(),
        json!({
            "name": "Blue Dream",
            "type": "Hybrid",
            "thc": "18%",
            "description": "Blue Dream is a sativa-dominant hybrid.",
            "effects": ["Relaxed", "Happy"],
            "url": "https://www.leafly.com/strains/blue-dream"
        })
    );
    assert_eq!(ex.launcher().stats(), released_once());
}

#[tokio::test(start_paused = true)]
async fn test_response_after_load_within_window_is_captured() {
    // The API call fires after navigation reports completion but inside the settle window.
    let ex = extractor(
        Script::new()
            .navigation_time(ms(500))
            .respond(ScriptedResponse::json(ms(2500), API, &blue_dream_payload())),
    );
    let record = ex.extract("blue-dream").await.unwrap();
    assert_eq!(record.name, "Blue Dream");
}

#[tokio::test(start_paused = true)]
async fn test_response_at_navigation_start_is_captured() {
    let ex = extractor(
        Script::new()
            .navigation_time(ms(100))
            .respond(ScriptedResponse::json(Duration::ZERO, API, &blue_dream_payload())),
    );
    let record = ex.extract("blue-dream").await.unwrap();
    assert_eq!(record.kind, "Hybrid");
}

#[tokio::test(start_paused = true)]
async fn test_last_matching_response_wins() {
    let ex = extractor(
        Script::new()
            .navigation_time(ms(200))
            .respond(ScriptedResponse::json(ms(100), API, &json!({ "name": "First" })))
            .respond(ScriptedResponse::json(ms(900), API, &json!({ "name": "Second" }))),
    );
    let record = ex.extract("blue-dream").await.unwrap();
    assert_eq!(record.name, "Second");
}

#[tokio::test(start_paused = true)]
async fn test_malformed_body_does_not_abort() {
    let ex = extractor(
        Script::new()
            .navigation_time(ms(200))
            .respond(ScriptedResponse::json(ms(100), API, &json!({ "name": "Good" })))
            .respond(ScriptedResponse::ok(ms(150), API, "<!doctype html><p>rate limited"))
            .respond(ScriptedResponse::failed(ms(160), API, "net::ERR_ABORTED")),
    );
    let record = ex.extract("blue-dream").await.unwrap();
    assert_eq!(record.name, "Good");
}

#[tokio::test(start_paused = true)]
async fn test_malformed_then_valid_body() {
    let ex = extractor(
        Script::new()
            .navigation_time(ms(200))
            .respond(ScriptedResponse::ok(ms(100), API, "{\"name\":"))
            .respond(ScriptedResponse::json(ms(400), API, &json!({ "category": "Sativa" }))),
    );
    let record = ex.extract("blue-dream").await.unwrap();
    assert_eq!(record.name, "blue-dream");
    assert_eq!(record.kind, "Sativa");
}

#[tokio::test(start_paused = true)]
async fn test_sparse_payload_uses_defaults() {
    let ex = extractor(
        Script::new()
            .navigation_time(ms(100))
            .respond(ScriptedResponse::json(ms(50), API, &json!({ "effects": {} }))),
    );
    let record = ex.extract("blue-dream").await.unwrap();
    assert_eq!(record.name, "blue-dream");
    assert_eq!(record.kind, "");
    assert_eq!(record.thc, "");
    assert_eq!(record.description, "");
    assert!(record.effects.is_empty());
    assert_eq!(record.url, format!("{BASE}/strains/blue-dream"));
}

#[tokio::test(start_paused = true)]
async fn test_event_driven_settle_matches_fixed_delay() {
    let script = Script::new()
        .navigation_time(ms(300))
        .respond(ScriptedResponse::json(ms(700), API, &blue_dream_payload()));

    let fixed = extractor(script.clone()).extract("blue-dream").await.unwrap();

    let config = ExtractorConfig::default().with_settle(SettleStrategy::UntilCaptured {
        timeout: Duration::from_secs(3),
    });
    let signalled = StrainExtractor::new(ScriptedLauncher::new(script), config);
    let start = tokio::time::Instant::now();
    let record = signalled.extract("blue-dream").await.unwrap();

    assert_eq!(record, fixed);
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(signalled.launcher().stats(), released_once());
}

// ─────────────────────── failure paths ───────────────────────

#[tokio::test(start_paused = true)]
async fn test_no_payload_is_missing_data() {
    let ex = extractor(
        Script::new()
            .navigation_time(ms(300))
            .respond(ScriptedResponse::ok(ms(10), "https://www.leafly.com/api/other", "{}")),
    );
    let err = ex.extract("blue-dream").await.unwrap_err();
    assert!(matches!(err, ExtractError::MissingData { ref url } if url == "https://www.leafly.com/strains/blue-dream"));
    assert_eq!(ex.launcher().stats(), released_once());
}

#[tokio::test(start_paused = true)]
async fn test_only_malformed_bodies_is_missing_data() {
    let ex = extractor(
        Script::new()
            .navigation_time(ms(100))
            .respond(ScriptedResponse::ok(ms(50), API, "not json")),
    );
    let err = ex.extract("blue-dream").await.unwrap_err();
    assert!(matches!(err, ExtractError::MissingData { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_response_after_window_is_missed() {
    // Navigation 500ms + 3000ms window: a response at 4s arrives too late.
    let ex = extractor(
        Script::new()
            .navigation_time(ms(500))
            .respond(ScriptedResponse::json(ms(4000), API, &blue_dream_payload())),
    );
    let err = ex.extract("blue-dream").await.unwrap_err();
    assert!(matches!(err, ExtractError::MissingData { .. }));
    assert_eq!(ex.launcher().stats(), released_once());
}

#[tokio::test(start_paused = true)]
async fn test_navigation_failure_releases_browser() {
    let ex = extractor(
        Script::new()
            .navigation_time(ms(20))
            .respond(ScriptedResponse::json(ms(10), API, &blue_dream_payload()))
            .fail_navigation("net::ERR_NAME_NOT_RESOLVED"),
    );
    let err = ex.extract("blue-dream").await.unwrap_err();
    match err {
        ExtractError::Navigation { url, reason } => {
            assert_eq!(url, "https://www.leafly.com/strains/blue-dream");
            assert!(reason.contains("ERR_NAME_NOT_RESOLVED"));
        }
        other => panic!("expected navigation error, got {other:?}"),
    }
    assert_eq!(ex.launcher().stats(), released_once());
}

#[tokio::test(start_paused = true)]
async fn test_launch_failure() {
    let ex = extractor(Script::new().fail_launch("chrome not found"));
    let err = ex.extract("blue-dream").await.unwrap_err();
    assert!(matches!(err, ExtractError::Browser(_)));
    assert_eq!(ex.launcher().stats(), ScriptStats::default());
}

#[tokio::test(start_paused = true)]
async fn test_empty_slug_never_launches() {
    let ex = extractor(Script::new());
    let err = ex.extract("").await.unwrap_err();
    assert!(matches!(err, ExtractError::InvalidRequest(_)));
    assert_eq!(ex.launcher().stats().launches, 0);
}

#[tokio::test(start_paused = true)]
async fn test_custom_base_url_and_pattern() {
    let config = ExtractorConfig::default()
        .with_base_url("http://localhost:3000/")
        .unwrap()
        .with_api_pattern("/internal/strains/");
    let ex = StrainExtractor::new(
        ScriptedLauncher::new(
            Script::new()
                .navigation_time(ms(100))
                .respond(ScriptedResponse::json(ms(10), API, &json!({ "name": "Wrong" })))
                .respond(ScriptedResponse::json(
                    ms(20),
                    "http://localhost:3000/internal/strains/og-kush",
                    &json!({ "name": "OG Kush" }),
                )),
        ),
        config,
    );
    let record = ex.extract("og-kush").await.unwrap();
    assert_eq!(record.name, "OG Kush");
    assert_eq!(record.url, "http://localhost:3000/strains/og-kush");
}
