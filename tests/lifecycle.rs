use std::{sync::Arc, time::Duration};

use tokio::{sync::broadcast, time::sleep};
use tokio_util::sync::CancellationToken;
use vmvisor::{
    ArtifactPaths, Bounds, Config, Event, EventKind, MachineState, Mode, PlatformBounds, Session,
    SessionBuilder, VmError,
    platform::sim::{SimCounters, SimScript, SimulatedPlatform},
};

struct Harness {
    session: Session<SimulatedPlatform>,
    counters: Arc<SimCounters>,
    events: broadcast::Receiver<Event>,
    _dir: tempfile::TempDir,
}

fn harness(script: SimScript) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let cfg = Config {
        disk_size: 1 << 20,
        handle_signals: false,
        artifacts: ArtifactPaths::in_bundle(dir.path().join("VM.bundle")),
        ..Config::default()
    };
    let platform = SimulatedPlatform::new(script);
    let counters = platform.counters();
    let session = SessionBuilder::new(cfg, platform).build();
    let events = session.bus().subscribe();
    Harness {
        session,
        counters,
        events,
        _dir: dir,
    }
}

fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

fn transitions(events: &[Event]) -> Vec<MachineState> {
    events
        .iter()
        .filter(|e| e.kind == EventKind::StateChanged)
        .filter_map(|e| e.state)
        .collect()
}

fn count(events: &[Event], kind: EventKind) -> usize {
    events.iter().filter(|e| e.kind == kind).count()
}

#[tokio::test(start_paused = true)]
async fn test_converges_without_escalation() {
    let mut h = harness(SimScript {
        can_request_stop: vec![false, true],
        accept_stop_after: Some(2),
        shutdown_delay: Duration::from_millis(500),
        ..SimScript::default()
    });
    let stop = h.session.stop_handle();

    let (res, ()) = tokio::join!(h.session.run(Mode::Run, CancellationToken::new()), async {
        sleep(Duration::from_secs(5)).await;
        stop.request_graceful_stop();
    });

    assert!(res.is_ok(), "{res:?}");
    assert_eq!(h.counters.stop_requests(), 2);
    assert_eq!(h.counters.forced_stops(), 0);

    let events = drain(&mut h.events);
    assert_eq!(
        transitions(&events),
        vec![
            MachineState::Starting,
            MachineState::Running,
            MachineState::Stopping,
            MachineState::Stopped
        ]
    );
    assert_eq!(count(&events, EventKind::StopSkipped), 2);
    assert_eq!(count(&events, EventKind::ForcedStopIssued), 0);
    assert_eq!(count(&events, EventKind::ReconciliationAnomaly), 0);
}

#[tokio::test(start_paused = true)]
async fn test_escalates_exactly_once() {
    let mut h = harness(SimScript {
        accept_stop_after: None,
        ..SimScript::default()
    });
    let stop = h.session.stop_handle();

    let (res, ()) = tokio::join!(h.session.run(Mode::Run, CancellationToken::new()), async {
        sleep(Duration::from_secs(5)).await;
        stop.request_graceful_stop();
    });

    assert!(res.is_ok(), "{res:?}");
    assert_eq!(h.counters.stop_requests(), 4);
    assert_eq!(h.counters.forced_stops(), 1);

    let events = drain(&mut h.events);
    assert_eq!(count(&events, EventKind::ForcedStopIssued), 1);
    let forced_at = events
        .iter()
        .find(|e| e.kind == EventKind::ForcedStopIssued)
        .and_then(|e| e.attempt);
    assert_eq!(forced_at, Some(4));
    assert_eq!(transitions(&events).last(), Some(&MachineState::Stopped));
}

#[tokio::test(start_paused = true)]
async fn test_failed_forced_stop_does_not_block_convergence() {
    let mut h = harness(SimScript {
        accept_stop_after: Some(5),
        forced_stop_error: Some("device busy".into()),
        ..SimScript::default()
    });
    let stop = h.session.stop_handle();

    let (res, ()) = tokio::join!(h.session.run(Mode::Run, CancellationToken::new()), async {
        sleep(Duration::from_secs(2)).await;
        stop.request_graceful_stop();
    });

    assert!(res.is_ok(), "{res:?}");
    assert_eq!(h.counters.forced_stops(), 1);
    assert_eq!(h.counters.stop_requests(), 5);

    let events = drain(&mut h.events);
    assert_eq!(count(&events, EventKind::ForcedStopIssued), 1);
    assert!(
        events
            .iter()
            .any(|e| e.kind == EventKind::StopAttemptFailed
                && e.reason.as_deref().is_some_and(|r| r.contains("device busy")))
    );
}

#[tokio::test(start_paused = true)]
async fn test_stopped_before_running_is_not_an_error() {
    let mut h = harness(SimScript {
        report_running: false,
        exit_on_boot: true,
        ..SimScript::default()
    });

    let res = h.session.run(Mode::Run, CancellationToken::new()).await;

    assert!(res.is_ok(), "{res:?}");
    let events = drain(&mut h.events);
    assert_eq!(
        transitions(&events),
        vec![
            MachineState::Starting,
            MachineState::Stopping,
            MachineState::Stopped
        ]
    );
    assert_eq!(h.counters.stop_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_start_error_is_returned() {
    let mut h = harness(SimScript {
        start_error: Some("no boot volume".into()),
        ..SimScript::default()
    });

    let err = h
        .session
        .run(Mode::Run, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, VmError::Start(ref e) if e.message() == "no boot volume"));
    let events = drain(&mut h.events);
    assert_eq!(
        transitions(&events),
        vec![MachineState::Starting, MachineState::Error]
    );
    let finished = events
        .iter()
        .find(|e| e.kind == EventKind::SessionFinished)
        .and_then(|e| e.reason.clone());
    assert_eq!(finished.as_deref(), Some("start_failed"));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_running() {
    let h = harness(SimScript::default());
    let ctx = CancellationToken::new();

    let (res, ()) = tokio::join!(h.session.run(Mode::Run, ctx.clone()), async {
        sleep(Duration::from_secs(3)).await;
        ctx.cancel();
    });

    assert!(res.unwrap_err().is_canceled());
    assert_eq!(h.counters.stop_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_after_stopping_is_ignored() {
    let h = harness(SimScript {
        accept_stop_after: Some(2),
        ..SimScript::default()
    });
    let stop = h.session.stop_handle();
    let ctx = CancellationToken::new();

    let (res, ()) = tokio::join!(h.session.run(Mode::Run, ctx.clone()), async {
        sleep(Duration::from_secs(2)).await;
        stop.request_graceful_stop();
        sleep(Duration::from_secs(1)).await;
        ctx.cancel();
    });

    assert!(res.is_ok(), "{res:?}");
    assert_eq!(h.counters.stop_requests(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_inverted_bounds_abort_before_launch() {
    let h = harness(SimScript {
        bounds: PlatformBounds {
            cpu: Bounds::new(8, 2),
            memory: Bounds::new(0, u64::MAX),
        },
        ..SimScript::default()
    });

    let err = h
        .session
        .run(Mode::Run, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, VmError::Bounds(_)));
    assert_eq!(err.as_label(), "resource_bounds");
}
