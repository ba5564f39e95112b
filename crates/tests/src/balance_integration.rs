//! Integration tests for a full balance run
//!
//! These tests drive the path the CLI takes: profile text is parsed and
//! compiled, then the engine balances every sink of an in-memory session.

use approx::assert_abs_diff_eq;
use balancer_core::domain::{
    Adjustment, BalanceWarning, CompiledProfile, ConfigError, ProfileStore, SinkFilter,
    VolumeRange,
};
use balancer_infra::audio::{parse_sink_list, BalanceEngine, EngineOptions, SinkOutcome};
use balancer_tests::{sink, surround_51, MemorySession};
use std::sync::Arc;
use std::time::Duration;

const PROFILES: &str = r#"
balance_profiles:
  - movie:
      - "100% ^front-(left|right)$"
      - "50% lfe"
      - "70% rear"
  - night:
      - "100% front"
      - "0% lfe"
  - broken:
      - "100% front("
"#;

fn compiled(name: Option<&str>) -> CompiledProfile {
    let store = ProfileStore::parse(PROFILES).unwrap();
    CompiledProfile::compile(&store.select(name).unwrap()).unwrap()
}

fn engine(session: &Arc<MemorySession>, profile: CompiledProfile) -> BalanceEngine {
    BalanceEngine::new(session.clone(), profile)
}

// ============================================================================
// PROFILE APPLICATION
// ============================================================================

#[tokio::test]
async fn test_movie_profile_on_surround_sink() {
    let session = Arc::new(MemorySession::new(vec![surround_51(1, 0.6)]));

    let summary = engine(&session, compiled(Some("movie"))).run().await.unwrap();
    assert_eq!(summary.sinks_balanced(), 1);
    assert_eq!(summary.warnings(), 0);

    // front-left, front-right, rear-left, rear-right, front-center, lfe
    let volumes = session.volumes(1);
    assert_abs_diff_eq!(volumes[0], 0.785714, epsilon = 1e-5);
    assert_abs_diff_eq!(volumes[1], 0.785714, epsilon = 1e-5);
    assert_abs_diff_eq!(volumes[2], 0.55, epsilon = 1e-5);
    assert_abs_diff_eq!(volumes[3], 0.55, epsilon = 1e-5);
    // No rule matches the center channel, so it keeps full weight
    assert_abs_diff_eq!(volumes[4], 0.785714, epsilon = 1e-5);
    assert_abs_diff_eq!(volumes[5], 0.392857, epsilon = 1e-5);
}

#[tokio::test]
async fn test_second_run_is_stable() {
    let session = Arc::new(MemorySession::new(vec![surround_51(1, 0.6)]));

    engine(&session, compiled(Some("movie"))).run().await.unwrap();
    let first = session.volumes(1);

    engine(&session, compiled(Some("movie"))).run().await.unwrap();
    let second = session.volumes(1);

    for (a, b) in first.iter().zip(&second) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
    }
}

#[tokio::test]
async fn test_default_profile_evens_out_channels() {
    let session = Arc::new(MemorySession::new(vec![sink(
        4,
        "bluez_output.headphones",
        "Headphones",
        &[("front-left", 0.3), ("front-right", 0.7)],
    )]));

    engine(&session, compiled(None)).run().await.unwrap();

    let volumes = session.volumes(4);
    assert_abs_diff_eq!(volumes[0], 0.5, epsilon = 1e-9);
    assert_abs_diff_eq!(volumes[1], 0.5, epsilon = 1e-9);
}

#[tokio::test]
async fn test_night_profile_silences_lfe() {
    let session = Arc::new(MemorySession::new(vec![surround_51(2, 0.5)]));

    let summary = engine(&session, compiled(Some("night"))).run().await.unwrap();

    let volumes = session.volumes(2);
    assert_eq!(volumes[5], 0.0);
    // Enabled channels all have weight 1 and keep the level
    for volume in &volumes[..5] {
        assert_abs_diff_eq!(*volume, 0.5, epsilon = 1e-9);
    }
    assert_eq!(summary.warnings(), 0);
}

// ============================================================================
// ADJUSTMENT AND LIMITS
// ============================================================================

#[tokio::test]
async fn test_adjustment_from_cli_text() {
    let session = Arc::new(MemorySession::new(vec![surround_51(1, 0.5)]));

    let options = EngineOptions {
        adjustment: "5-".parse::<Adjustment>().unwrap(),
        ..Default::default()
    };
    engine(&session, compiled(None))
        .with_options(options)
        .run()
        .await
        .unwrap();

    for volume in session.volumes(1) {
        assert_abs_diff_eq!(volume, 0.45, epsilon = 1e-9);
    }
}

#[tokio::test]
async fn test_large_negative_adjustment_mutes_sink() {
    let session = Arc::new(MemorySession::new(vec![surround_51(1, 0.3)]));

    let options = EngineOptions {
        adjustment: "100-".parse().unwrap(),
        ..Default::default()
    };
    let summary = engine(&session, compiled(None))
        .with_options(options)
        .run()
        .await
        .unwrap();

    assert!(session.volumes(1).iter().all(|v| *v == 0.0));
    assert!(matches!(
        summary.reports[0].resolution.warnings.as_slice(),
        [BalanceWarning::MutedByAdjustment { .. }]
    ));
    // Warnings never stop the volume from being applied
    assert_eq!(summary.reports[0].outcome, SinkOutcome::Applied);
}

#[tokio::test]
async fn test_max_volume_clips() {
    let session = Arc::new(MemorySession::new(vec![surround_51(1, 0.9)]));

    let options = EngineOptions {
        adjustment: Adjustment::new(0.3),
        range: VolumeRange::from_percent(100.0),
        ..Default::default()
    };
    let summary = engine(&session, compiled(None))
        .with_options(options)
        .run()
        .await
        .unwrap();

    assert!(session.volumes(1).iter().all(|v| *v == 1.0));
    assert_eq!(summary.warnings(), 6);
    assert!(summary.reports[0]
        .resolution
        .channels
        .iter()
        .all(|c| c.out_of_range));
}

// ============================================================================
// SESSION HANDLING
// ============================================================================

#[tokio::test]
async fn test_run_waits_for_every_acknowledgement() {
    let session = Arc::new(
        MemorySession::new(vec![
            surround_51(1, 0.6),
            surround_51(2, 0.6),
            surround_51(3, 0.6),
        ])
        .with_delay(Duration::from_millis(20)),
    );

    let summary = engine(&session, compiled(Some("movie"))).run().await.unwrap();

    assert_eq!(summary.sinks_balanced(), 3);
    assert_eq!(session.requests().len(), 3);
    for index in 1..=3 {
        assert_abs_diff_eq!(session.volumes(index)[5], 0.392857, epsilon = 1e-5);
    }
}

#[tokio::test]
async fn test_failing_sink_is_reported() {
    let session = Arc::new(
        MemorySession::new(vec![surround_51(1, 0.6), surround_51(2, 0.6)]).with_failing(1),
    );

    let summary = engine(&session, compiled(None)).run().await.unwrap();

    assert_eq!(summary.sinks_failed(), 1);
    assert_eq!(summary.sinks_balanced(), 1);
    assert!(!summary.is_success());
    match &summary.reports[0].outcome {
        SinkOutcome::Failed(reason) => assert!(reason.contains("refused")),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_sink_filter_matches_description() {
    let session = Arc::new(MemorySession::new(vec![
        surround_51(1, 0.6),
        sink(2, "hdmi-stereo", "HDMI Output", &[("front-left", 0.2), ("front-right", 0.8)]),
    ]));

    let options = EngineOptions {
        filter: SinkFilter::new("hdmi output").unwrap(),
        ..Default::default()
    };
    let summary = engine(&session, compiled(None))
        .with_options(options)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.sinks_seen, 2);
    assert_eq!(summary.sinks_selected(), 1);
    assert_eq!(session.requests(), vec![summary.reports[0].sink.index]);
    assert_eq!(session.volumes(1), vec![0.6; 6]);
}

#[tokio::test]
async fn test_pactl_listing_through_engine() {
    let json = r#"[{
        "index": 9,
        "name": "alsa_output.usb-speakers",
        "description": "USB Speakers",
        "channel_map": "front-left,front-right,lfe",
        "volume": {
            "front-left": {"value": 52429},
            "front-right": {"value": 52429},
            "lfe": {"value": 52429}
        }
    }]"#;
    let sinks = parse_sink_list(json).unwrap();
    let session = Arc::new(MemorySession::new(sinks));

    engine(&session, compiled(Some("movie"))).run().await.unwrap();

    // Weights {1, 1, 0.5}; a raw 80 % is an amplitude of 0.512
    let volumes = session.volumes(9);
    assert_abs_diff_eq!(volumes[0], 0.6827, epsilon = 1e-3);
    assert_abs_diff_eq!(volumes[1], 0.6827, epsilon = 1e-3);
    assert_abs_diff_eq!(volumes[2], 0.3413, epsilon = 1e-3);
}

// ============================================================================
// CONFIGURATION ERRORS
// ============================================================================

#[test]
fn test_configuration_errors_surface_before_any_run() {
    let store = ProfileStore::parse(PROFILES).unwrap();

    let broken = store.select(Some("broken")).unwrap();
    assert!(matches!(
        CompiledProfile::compile(&broken),
        Err(ConfigError::InvalidPattern { .. })
    ));

    assert!(matches!(
        store.select(Some("missing")),
        Err(ConfigError::ProfileNotFound(_))
    ));

    assert!(matches!(
        ProfileStore::parse("balance_profiles:\n  - bad:\n      - \"loud\"\n"),
        Err(ConfigError::InvalidRule { .. })
    ));
}
