//! End-to-end session scenarios
//!
//! These tests drive a [`Studio`] over a scripted service on a paused tokio
//! clock, and check what a surface would see: the event stream, the canvas
//! and the session slot.
//!
//! Tests cover:
//! - A slow result arriving while progress is stalled, then sprint and reveal
//! - Generate retries exhausted on repeated 401, leaving the frozen frame
//! - Cancel during deceleration, then a fresh run with a fresh threshold

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::{Rgba, RgbaImage};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio::time::Instant;

use darkroom_core::backend::mock::ScriptedService;
use darkroom_core::{
    ConfigOverrides, DarkroomConfig, ErrorKind, FixedRandom, Phase, RandomSource, SessionId,
    SessionStatus, SourceFrame, Studio, StudioEvent,
};

// =============================================================================
// Helpers
// =============================================================================

fn photo() -> SourceFrame {
    let mut img = RgbaImage::new(70, 100);
    for (x, y, px) in img.enumerate_pixels_mut() {
        *px = Rgba([(x * 3) as u8, (y * 2) as u8, 120, 255]);
    }
    SourceFrame::still(img)
}

/// Event with the offset from the start of the scenario
struct Timed {
    at: Duration,
    event: StudioEvent,
}

/// Receive until a terminal event for `session` or until `limit` passes
async fn collect_until_terminal(
    rx: &mut mpsc::UnboundedReceiver<StudioEvent>,
    start: Instant,
    session: SessionId,
    limit: Duration,
) -> Vec<Timed> {
    let mut out = Vec::new();
    let _ = tokio::time::timeout(limit, async {
        while let Some(event) = rx.recv().await {
            let terminal = matches!(
                &event,
                StudioEvent::Revealed { session: s, .. } | StudioEvent::Failed { session: s, .. }
                    if *s == session
            );
            out.push(Timed {
                at: start.elapsed(),
                event,
            });
            if terminal {
                break;
            }
        }
    })
    .await;
    out
}

fn drain(rx: &mut mpsc::UnboundedReceiver<StudioEvent>) -> Vec<StudioEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

fn progress_of(events: &[Timed]) -> Vec<(Duration, f32, Phase)> {
    events
        .iter()
        .filter_map(|t| match t.event {
            StudioEvent::Progress { visible, phase, .. } => Some((t.at, visible, phase)),
            _ => None,
        })
        .collect()
}

fn distinct_phases(progress: &[(Duration, f32, Phase)]) -> Vec<Phase> {
    let mut phases: Vec<Phase> = Vec::new();
    for (_, _, phase) in progress {
        if phases.last() != Some(phase) {
            phases.push(*phase);
        }
    }
    phases
}

/// Returns a scripted sequence of draws and counts them
struct ScriptedDraws {
    values: Vec<u8>,
    calls: AtomicUsize,
}

impl ScriptedDraws {
    fn new(values: &[u8]) -> Self {
        Self {
            values: values.to_vec(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RandomSource for ScriptedDraws {
    fn uniform(&self, range: RangeInclusive<u8>) -> u8 {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let value = self.values[n % self.values.len()];
        assert!(range.contains(&value), "draw {value} outside {range:?}");
        value
    }
}

// =============================================================================
// Scenario 1: Slow Result, Sprint, Reveal
// =============================================================================

/// Result ready at 20 s with a nominal duration of 15 s.
///
/// Progress must climb, decelerate and stall at the ceiling without
/// reaching 100, then sprint to 100 within the sprint window once the result
/// exists, reveal it, and clear the canvas.
#[tokio::test(start_paused = true)]
async fn test_slow_result_stalls_then_sprints_to_reveal() {
    let service = Arc::new(
        ScriptedService::succeeding("a lighthouse at dusk")
            .with_generate_latency(Duration::from_secs(20)),
    );
    let (studio, mut rx) = Studio::builder(service.clone())
        .random(Arc::new(FixedRandom(80)))
        .canvas_size(70, 100)
        .build();

    let start = Instant::now();
    let session = studio.process(photo());
    let events = collect_until_terminal(&mut rx, start, session, Duration::from_secs(60)).await;

    let progress = progress_of(&events);
    assert!(!progress.is_empty());

    // monotonic, and capped while the result is pending
    let mut last = 0.0_f32;
    for (at, visible, _) in &progress {
        assert!(*visible >= last, "progress went backwards at {at:?}");
        last = *visible;
        if *at < Duration::from_secs(20) {
            assert!(*visible <= 95.0, "{visible} above ceiling at {at:?}");
        }
    }
    assert!((last - 100.0).abs() < f32::EPSILON);

    assert_eq!(
        distinct_phases(&progress),
        vec![
            Phase::Ramping,
            Phase::Decelerating,
            Phase::Stalled,
            Phase::Sprinting,
            Phase::Done
        ]
    );

    let revealed_at = events
        .iter()
        .find(|t| matches!(t.event, StudioEvent::Revealed { .. }))
        .map(|t| t.at)
        .unwrap();
    assert!(revealed_at >= Duration::from_secs(20));
    assert!(revealed_at <= Duration::from_millis(20_500), "reveal took until {revealed_at:?}");

    assert!(events.iter().any(
        |t| matches!(&t.event, StudioEvent::Described { text, .. } if text == "a lighthouse at dusk")
    ));
    assert_eq!(studio.session_status(), Some(SessionStatus::Succeeded));
    assert!(studio.canvas().with_canvas(|c| c.is_blank()));
    assert_eq!(service.generate_count(), 1);
}

// =============================================================================
// Scenario 2: Retries Exhausted
// =============================================================================

/// Three generate attempts all return 401.
///
/// Backoff is 1 s then 2 s, the run fails after the third attempt, the
/// progress bar stops where it was, and the last pixelated frame stays.
#[tokio::test(start_paused = true)]
async fn test_repeated_unauthorized_exhausts_retries_and_freezes() {
    let service = Arc::new(
        ScriptedService::new()
            .describe_ok("a bicycle")
            .generate_status(401)
            .generate_status(401)
            .generate_status(401),
    );
    let (studio, mut rx) = Studio::builder(service.clone())
        .random(Arc::new(FixedRandom(85)))
        .canvas_size(70, 100)
        .build();

    let start = Instant::now();
    let session = studio.process(photo());
    let events = collect_until_terminal(&mut rx, start, session, Duration::from_secs(30)).await;

    let failed = events.last().unwrap();
    let StudioEvent::Failed { message, kind, .. } = &failed.event else {
        panic!("expected a failure, got {:?}", failed.event);
    };
    assert_eq!(message, "Error taking photo.");
    assert_eq!(*kind, ErrorKind::NetworkOrServer);
    assert!(failed.at >= Duration::from_secs(3));
    assert!(failed.at < Duration::from_secs(4));
    assert_eq!(service.generate_count(), 3);

    let progress = progress_of(&events);
    let (_, frozen_at, _) = *progress.last().unwrap();
    assert!(frozen_at > 15.0 && frozen_at < 25.0, "frozen at {frozen_at}");

    // nothing more arrives, the frame stays
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(drain(&mut rx).is_empty());
    assert!(!studio.canvas().with_canvas(|c| c.is_blank()));
    assert_eq!(studio.session_status(), Some(SessionStatus::Failed));
    assert!(studio.can_retry());
}

/// With detailed errors the user sees the full text.
#[tokio::test(start_paused = true)]
async fn test_detailed_errors_show_full_text() {
    let service = Arc::new(
        ScriptedService::new()
            .describe_ok("a bicycle")
            .generate_status(403),
    );
    let mut config = DarkroomConfig::default();
    ConfigOverrides::new()
        .with_detailed_errors(true)
        .apply(&mut config);
    let (studio, mut rx) = Studio::builder(service)
        .config(config)
        .random(Arc::new(FixedRandom(80)))
        .canvas_size(70, 100)
        .build();

    let start = Instant::now();
    let session = studio.process(photo());
    let events = collect_until_terminal(&mut rx, start, session, Duration::from_secs(10)).await;

    let Some(StudioEvent::Failed { message, kind, .. }) = events.last().map(|t| &t.event) else {
        panic!("expected a failure");
    };
    assert_eq!(*kind, ErrorKind::Forbidden);
    assert!(message.starts_with("Process failed: Image generation API error (403 Forbidden)"));
}

// =============================================================================
// Scenario 3: Cancel Mid-Deceleration
// =============================================================================

/// Cancel while decelerating; the cancelled session never reports a result
/// or an error, and the next run draws its own threshold.
#[tokio::test(start_paused = true)]
async fn test_cancel_mid_deceleration_is_silent() {
    let service = Arc::new(
        ScriptedService::new()
            .describe_ok("first")
            .generate_ok(darkroom_core::GeneratedArtifact::new(vec![1], "image/png"))
            .describe_ok("second")
            .generate_ok(darkroom_core::GeneratedArtifact::new(vec![2], "image/png"))
            .with_generate_latency(Duration::from_secs(30)),
    );
    let draws = Arc::new(ScriptedDraws::new(&[78, 88]));
    let (studio, mut rx) = Studio::builder(service)
        .random(draws.clone())
        .canvas_size(70, 100)
        .build();

    let first = studio.process(photo());
    tokio::time::sleep(Duration::from_millis(12_500)).await;
    let before_cancel = drain(&mut rx);
    let last_phase = before_cancel.iter().rev().find_map(|e| match e {
        StudioEvent::Progress { phase, .. } => Some(*phase),
        _ => None,
    });
    assert_eq!(last_phase, Some(Phase::Decelerating));

    studio.cancel();
    assert_eq!(studio.current_session(), None);
    assert!(studio.canvas().with_canvas(|c| c.is_blank()));

    // the first run's generate call would have finished at 30 s
    tokio::time::sleep(Duration::from_secs(40)).await;
    let after_cancel = drain(&mut rx);
    assert!(matches!(after_cancel.as_slice(), [StudioEvent::Reset]));

    let start = Instant::now();
    let second = studio.process(photo());
    assert_ne!(first, second);
    assert_eq!(draws.calls(), 2);

    let events = collect_until_terminal(&mut rx, start, second, Duration::from_secs(60)).await;
    assert!(events.iter().all(|t| t.event.session() != Some(first)));

    let progress = progress_of(&events);
    assert!(progress.first().is_some_and(|(_, visible, _)| *visible < 1.0));
    assert!(matches!(
        events.last().map(|t| &t.event),
        Some(StudioEvent::Revealed { session, .. }) if *session == second
    ));
}
