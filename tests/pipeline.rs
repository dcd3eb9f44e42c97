// Wiring tests through the public API. No network and no external tooling:
// these cover construction, fast-path validation, the background sweeper and
// failure rendering.

use std::sync::Once;
use std::time::Duration;

use yt_audio_extract::{
    build_chain, AggregateFailure, AttemptRecord, AudioExtractor, FailureCategory, Settings,
};

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

fn settings_in(dir: &tempfile::TempDir) -> Settings {
    Settings {
        store_root: dir.path().to_path_buf(),
        ..Settings::default()
    }
}

#[tokio::test]
async fn construction_and_fast_path_validation() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let extractor = AudioExtractor::new(&settings_in(&dir)).unwrap();

    let failure = extractor.extract("not-a-media-link").await.unwrap_err();
    assert_eq!(failure.category, FailureCategory::InvalidSource);
    assert!(failure.attempts.is_empty());
    assert_eq!(
        failure.suggestions(),
        vec!["Provide a youtube.com or youtu.be video URL"]
    );
}

#[tokio::test]
async fn spawned_sweeper_evicts_expired_artifacts() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut settings = settings_in(&dir);
    settings.retention = Duration::ZERO;
    settings.sweep_interval = Duration::from_millis(10);
    let extractor = AudioExtractor::new(&settings).unwrap();

    let stale = dir.path().join("stale.mp3");
    std::fs::write(&stale, b"old").unwrap();

    tokio::spawn(extractor.store().clone().run_sweeper());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!stale.exists());
}

#[test]
fn aggregate_failure_renders_every_attempt() {
    let attempts = vec![
        AttemptRecord::new(
            "android-music",
            FailureCategory::BlockedBySource,
            "Sign in to confirm you're not a bot",
        ),
        AttemptRecord::new(
            "raw",
            FailureCategory::StrategyTransferFailed,
            "fragment not found",
        ),
    ];
    let fallback = AttemptRecord::new(
        "external-service",
        FailureCategory::ExternalServiceFailed,
        "conversion endpoint returned 502",
    );
    let failure = AggregateFailure::exhausted(attempts, fallback);

    let rendered = failure.to_string();
    assert!(rendered.contains("android-music"));
    assert!(rendered.contains("raw"));
    assert!(rendered.contains("external-service"));
    assert!(failure.blocked());
    assert!(failure
        .suggestions()
        .contains(&"Use older, more popular videos"));
}

#[test]
fn public_chain_builder_orders_strategies() {
    let dir = tempfile::tempdir().unwrap();
    let chain = build_chain(dir.path(), "req-1", Some("socks5h://10.0.0.1:1080"));
    let labels: Vec<&str> = chain.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(
        labels,
        vec![
            "android-music",
            "android-vr",
            "mobile-web",
            "degraded",
            "android-music-proxy",
            "mobile-web-proxy",
            "raw",
        ]
    );
}
