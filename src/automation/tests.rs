//! Worker and registry scenarios against scripted collaborators

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use super::*;
use crate::desktop::ClickKind;
use crate::properties::PropertiesFile;
use crate::status::{StatusBoard, StatusKind};
use crate::testing::{found_at, DesktopEvent, RecordingDesktop, ScriptedMatcher};

const SIG: &str = "channel 1: NOTE ON 60 value: 100";

fn fast_timing() -> WorkerTiming {
    WorkerTiming {
        scan_interval: Duration::from_millis(5),
        search_timeout: Duration::from_millis(200),
        focus_settle: Duration::from_millis(5),
    }
}

fn context(matcher: &Arc<ScriptedMatcher>, desktop: &Arc<RecordingDesktop>) -> AutomationContext {
    AutomationContext {
        matcher: matcher.clone(),
        desktop: desktop.clone(),
        timing: fast_timing(),
    }
}

fn click_on_image(trigger: Trigger) -> AutomationDefinition {
    AutomationDefinition {
        image: Some(PathBuf::from("cue.png")),
        action: ActionKind::LeftClick,
        trigger,
        ..Default::default()
    }
}

fn keys_without_image(trigger: Trigger, keys: &[u32]) -> AutomationDefinition {
    AutomationDefinition {
        image: None,
        action: ActionKind::SendKeys,
        key_codes: keys.to_vec(),
        trigger,
        ..Default::default()
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    cond()
}

/// Let a few scan intervals pass
async fn settle() {
    tokio::time::sleep(Duration::from_millis(60)).await;
}

fn start(
    def: AutomationDefinition,
    matcher: &Arc<ScriptedMatcher>,
    desktop: &Arc<RecordingDesktop>,
) -> WorkerHandle {
    Arc::new(AutomationWorker::new("test", def, context(matcher, desktop))).spawn()
}

#[tokio::test]
async fn test_once_fires_a_single_time() {
    let matcher = Arc::new(ScriptedMatcher::always(Some(found_at(100, 200))));
    let desktop = Arc::new(RecordingDesktop::default());
    let handle = start(click_on_image(Trigger::new(TriggerKind::Once)), &matcher, &desktop);
    let worker = handle.worker().clone();

    assert!(wait_until(|| worker.fired_count() == 1).await);
    settle().await;

    assert_eq!(worker.fired_count(), 1);
    assert!(!worker.is_active());
    assert_eq!(
        desktop.events(),
        vec![DesktopEvent::Click(ClickKind::Left, (110, 205))]
    );
    // Inactive workers skip the search
    let calls = matcher.calls();
    settle().await;
    assert_eq!(matcher.calls(), calls);

    // A playlist change does not re-arm plain once
    assert!(!worker.arm_change());
    handle.shutdown().await;
}

#[tokio::test]
async fn test_timeout_without_match_never_fires() {
    let matcher = Arc::new(ScriptedMatcher::always(None));
    let desktop = Arc::new(RecordingDesktop::default());
    let def = AutomationDefinition {
        timeout_ms: 40,
        ..click_on_image(Trigger::new(TriggerKind::Always))
    };
    let started = Instant::now();
    let handle = start(def, &matcher, &desktop);
    let worker = handle.worker().clone();

    assert!(wait_until(|| worker.phase() == WorkerPhase::TimedOut).await);
    assert!(started.elapsed() >= Duration::from_millis(40));
    assert_eq!(worker.fired_count(), 0);
    assert!(desktop.events().is_empty());

    // The scan loop has exited on its own
    tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
        .await
        .unwrap();
    assert_eq!(worker.phase(), WorkerPhase::TimedOut);
}

#[tokio::test]
async fn test_no_image_send_keys_holds_chord() {
    let matcher = Arc::new(ScriptedMatcher::always(None));
    let desktop = Arc::new(RecordingDesktop::default());
    let handle = start(
        keys_without_image(Trigger::new(TriggerKind::Once), &[18, 80]),
        &matcher,
        &desktop,
    );
    let worker = handle.worker().clone();

    assert!(wait_until(|| worker.fired_count() == 1).await);
    settle().await;

    assert_eq!(
        desktop.events(),
        vec![
            DesktopEvent::Press(18),
            DesktopEvent::Press(80),
            DesktopEvent::Release(18),
            DesktopEvent::Release(80),
        ]
    );
    assert_eq!(matcher.calls(), 0);
    assert!(!worker.is_active());
    handle.shutdown().await;
}

#[tokio::test]
async fn test_stop_during_min_delay_aborts_action() {
    let matcher = Arc::new(ScriptedMatcher::always(None));
    let desktop = Arc::new(RecordingDesktop::default());
    let def = AutomationDefinition {
        min_delay_ms: 60_000,
        ..keys_without_image(Trigger::new(TriggerKind::Always), &[1])
    };
    let handle = start(def, &matcher, &desktop);
    let worker = handle.worker().clone();

    assert!(wait_until(|| worker.phase() == WorkerPhase::Acting).await);
    tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
        .await
        .unwrap();

    assert_eq!(worker.phase(), WorkerPhase::Stopped);
    assert_eq!(worker.fired_count(), 0);
    assert!(desktop.events().is_empty());
}

#[tokio::test]
async fn test_stop_interrupts_slow_search() {
    let matcher =
        Arc::new(ScriptedMatcher::always(Some(found_at(0, 0))).with_delay(Duration::from_secs(30)));
    let desktop = Arc::new(RecordingDesktop::default());
    let handle = start(click_on_image(Trigger::new(TriggerKind::Always)), &matcher, &desktop);

    assert!(wait_until(|| matcher.calls() == 1).await);
    tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
        .await
        .unwrap();
    assert!(desktop.events().is_empty());
}

#[tokio::test]
async fn test_static_target_narrows_search_once() {
    let matcher = Arc::new(ScriptedMatcher::always(Some(found_at(100, 200))));
    let desktop = Arc::new(RecordingDesktop::default());
    let handle = start(click_on_image(Trigger::new(TriggerKind::Always)), &matcher, &desktop);
    let worker = handle.worker().clone();

    assert!(wait_until(|| worker.fired_count() >= 3).await);
    handle.shutdown().await;

    let requests = matcher.requests();
    assert_eq!(requests[0].area, SearchArea::Screen);
    let narrowed = SearchArea::Area(Region::new(100, 200, 20, 10));
    assert!(requests[1..].iter().all(|r| r.area == narrowed));

    let state = worker.runtime_state();
    assert!(state.fixed_search_region);
    assert_eq!(state.search_area, narrowed);
}

#[tokio::test]
async fn test_movable_target_keeps_full_screen() {
    let matcher = Arc::new(ScriptedMatcher::always(Some(found_at(100, 200))));
    let desktop = Arc::new(RecordingDesktop::default());
    let def = AutomationDefinition {
        movable: true,
        ..click_on_image(Trigger::new(TriggerKind::Always))
    };
    let handle = start(def, &matcher, &desktop);
    let worker = handle.worker().clone();

    assert!(wait_until(|| worker.fired_count() >= 3).await);
    handle.shutdown().await;

    assert!(matcher
        .requests()
        .iter()
        .all(|r| r.area == SearchArea::Screen));
    assert!(!worker.runtime_state().fixed_search_region);
}

#[tokio::test]
async fn test_on_midi_waits_for_signature() {
    let matcher = Arc::new(ScriptedMatcher::always(None));
    let desktop = Arc::new(RecordingDesktop::default());
    let def = AutomationDefinition {
        midi_signature: Some(SIG.into()),
        ..keys_without_image(Trigger::on_midi("Bus 1"), &[32])
    };
    let handle = start(def, &matcher, &desktop);
    let worker = handle.worker().clone();

    settle().await;
    assert!(!worker.is_active());
    assert_eq!(worker.fired_count(), 0);

    assert!(!worker.arm_midi("channel 2: NOTE ON 60 value: 100"));
    assert!(worker.arm_midi(SIG));
    assert!(wait_until(|| worker.fired_count() == 1).await);
    settle().await;
    assert_eq!(worker.fired_count(), 1);
    assert!(!worker.is_active());

    assert!(worker.arm_midi(SIG));
    assert!(wait_until(|| worker.fired_count() == 2).await);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_once_per_change_rearms_on_change() {
    let matcher = Arc::new(ScriptedMatcher::always(Some(found_at(5, 5))));
    let desktop = Arc::new(RecordingDesktop::default());
    let handle = start(
        click_on_image(Trigger::new(TriggerKind::OncePerChange)),
        &matcher,
        &desktop,
    );
    let worker = handle.worker().clone();

    assert!(wait_until(|| worker.fired_count() == 1).await);
    settle().await;
    assert_eq!(worker.fired_count(), 1);

    assert!(worker.arm_change());
    assert!(wait_until(|| worker.fired_count() == 2).await);
    settle().await;
    assert_eq!(desktop.clicks(), 2);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_always_keeps_firing_and_pauses() {
    let matcher = Arc::new(ScriptedMatcher::always(Some(found_at(5, 5))));
    let desktop = Arc::new(RecordingDesktop::default());
    let handle = start(click_on_image(Trigger::new(TriggerKind::Always)), &matcher, &desktop);
    let worker = handle.worker().clone();

    assert!(wait_until(|| worker.fired_count() >= 3).await);
    assert!(worker.is_active());

    worker.set_paused(true);
    settle().await;
    let paused_at = worker.fired_count();
    settle().await;
    assert_eq!(worker.fired_count(), paused_at);
    assert_eq!(worker.phase(), WorkerPhase::Scanning);

    worker.set_paused(false);
    assert!(wait_until(|| worker.fired_count() > paused_at).await);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_focus_before_click() {
    let matcher = Arc::new(ScriptedMatcher::scripted(vec![None, Some(found_at(0, 0))], None));
    let desktop = Arc::new(RecordingDesktop::default());
    let def = AutomationDefinition {
        action: ActionKind::DoubleClick,
        focused_program: Some("Ableton Live".into()),
        ..click_on_image(Trigger::new(TriggerKind::Once))
    };
    let handle = start(def, &matcher, &desktop);
    let worker = handle.worker().clone();

    assert!(wait_until(|| worker.fired_count() == 1).await);
    handle.shutdown().await;
    assert_eq!(
        desktop.events(),
        vec![
            DesktopEvent::Focus("Ableton Live".into()),
            DesktopEvent::Click(ClickKind::Double, (10, 5)),
        ]
    );
}

#[tokio::test]
async fn test_missing_keyboard_skips_action() {
    let matcher = Arc::new(ScriptedMatcher::always(None));
    let desktop = Arc::new(RecordingDesktop::default());
    desktop.set_keyboard_unavailable(true);
    let handle = start(
        keys_without_image(Trigger::new(TriggerKind::Once), &[18]),
        &matcher,
        &desktop,
    );
    let worker = handle.worker().clone();

    assert!(wait_until(|| !worker.is_active()).await);
    settle().await;
    handle.shutdown().await;
    assert!(desktop.events().is_empty());
}

#[tokio::test]
async fn test_resume_does_not_arm_on_midi() {
    let matcher = Arc::new(ScriptedMatcher::always(None));
    let desktop = Arc::new(RecordingDesktop::default());
    let def = AutomationDefinition {
        midi_signature: Some(SIG.into()),
        ..keys_without_image(Trigger::on_midi("Bus 1"), &[32])
    };
    let handle = start(def, &matcher, &desktop);
    let worker = handle.worker().clone();

    worker.set_paused(true);
    worker.set_paused(false);
    settle().await;

    assert_eq!(worker.fired_count(), 0);
    assert!(!worker.is_active());
    assert!(desktop.events().is_empty());
    handle.shutdown().await;
}

#[tokio::test]
async fn test_resume_does_not_refire_once() {
    let matcher = Arc::new(ScriptedMatcher::always(None));
    let desktop = Arc::new(RecordingDesktop::default());
    let handle = start(
        keys_without_image(Trigger::new(TriggerKind::Once), &[18]),
        &matcher,
        &desktop,
    );
    let worker = handle.worker().clone();

    assert!(wait_until(|| worker.fired_count() == 1).await);
    worker.set_paused(true);
    settle().await;
    worker.set_paused(false);
    settle().await;

    assert_eq!(worker.fired_count(), 1);
    assert!(!worker.is_active());
    handle.shutdown().await;
}

#[tokio::test]
async fn test_arm_while_paused_waits_for_resume() {
    let matcher = Arc::new(ScriptedMatcher::always(Some(found_at(5, 5))));
    let desktop = Arc::new(RecordingDesktop::default());
    let handle = start(
        click_on_image(Trigger::new(TriggerKind::OncePerChange)),
        &matcher,
        &desktop,
    );
    let worker = handle.worker().clone();

    assert!(wait_until(|| worker.fired_count() == 1).await);
    worker.set_paused(true);
    assert!(worker.arm_change());
    settle().await;
    settle().await;
    assert_eq!(worker.fired_count(), 1);
    assert!(worker.is_active());
    assert!(worker.is_paused());

    // The pending arm survives the pause and fires exactly once
    worker.set_paused(false);
    assert!(wait_until(|| worker.fired_count() == 2).await);
    settle().await;
    assert_eq!(worker.fired_count(), 2);
    handle.shutdown().await;
}

fn registry_in(dir: &TempDir) -> (AutomationRegistry, Arc<ScriptedMatcher>, Arc<StatusBoard>) {
    let matcher = Arc::new(ScriptedMatcher::always(None));
    let desktop = Arc::new(RecordingDesktop::default());
    let status = Arc::new(StatusBoard::new());
    let properties = Arc::new(PropertiesFile::new(
        dir.path().join("automations.yaml"),
        "automations",
    ));
    let registry = AutomationRegistry::new(context(&matcher, &desktop), properties, status.clone());
    (registry, matcher, status)
}

#[tokio::test]
async fn test_reload_leaves_no_previous_worker() {
    let dir = TempDir::new().unwrap();
    let (registry, _, _) = registry_in(&dir);

    registry
        .load(vec![
            click_on_image(Trigger::new(TriggerKind::Always)),
            click_on_image(Trigger::new(TriggerKind::Once)),
        ])
        .await;
    let first = registry.workers();
    assert_eq!(first.len(), 2);

    registry
        .load(vec![click_on_image(Trigger::new(TriggerKind::Once))])
        .await;
    assert!(first.iter().all(|w| w.phase() == WorkerPhase::Stopped));
    assert!(first.iter().all(|w| !w.is_active()));

    let second = registry.workers();
    assert_eq!(second.len(), 1);
    assert!(!Arc::ptr_eq(&second[0], &first[1]));
    assert_eq!(registry.definitions().len(), 1);
    registry.stop_all().await;
}

#[tokio::test]
async fn test_stop_all_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let (registry, _, _) = registry_in(&dir);

    registry.stop_all().await;
    registry
        .load(vec![click_on_image(Trigger::new(TriggerKind::Always))])
        .await;
    let workers = registry.workers();

    registry.stop_all().await;
    registry.stop_all().await;
    assert!(registry.workers().is_empty());
    assert_eq!(workers[0].phase(), WorkerPhase::Stopped);
    assert_eq!(registry.broadcast_playlist_changed(), 0);
}

#[tokio::test]
async fn test_broadcasts_reach_matching_workers() {
    let dir = TempDir::new().unwrap();
    let (registry, _, _) = registry_in(&dir);

    registry
        .load(vec![
            AutomationDefinition {
                midi_signature: Some(SIG.into()),
                ..click_on_image(Trigger::on_midi("Bus 1"))
            },
            AutomationDefinition {
                midi_signature: Some(SIG.into()),
                ..click_on_image(Trigger::new(TriggerKind::Once).with_midi(Some("Bus 2".into())))
            },
            click_on_image(Trigger::new(TriggerKind::OncePerChange)),
            click_on_image(Trigger::new(TriggerKind::Always)),
        ])
        .await;

    assert_eq!(registry.broadcast_midi_signature(SIG), 2);
    assert_eq!(registry.broadcast_midi_signature("channel 3: NOTE ON 1 value: 1"), 0);
    assert_eq!(registry.broadcast_playlist_changed(), 1);
    assert_eq!(
        registry.trigger_devices().into_iter().collect::<Vec<_>>(),
        vec!["Bus 1".to_string(), "Bus 2".to_string()]
    );

    registry.set_all_active(false);
    assert!(registry.summaries().iter().all(|s| s.paused));
    registry.stop_all().await;
}

#[tokio::test]
async fn test_save_then_load_from_properties() {
    let dir = TempDir::new().unwrap();
    let (registry, _, status) = registry_in(&dir);

    let err = registry.load_from_properties().await.unwrap_err();
    assert!(matches!(err, crate::error::AutomatorError::PersistenceNotFound { .. }));
    assert!(status.get(StatusKind::PersistenceNotFound).is_some());

    let defs = vec![
        AutomationDefinition {
            min_delay_ms: 150,
            focused_program: Some("Live".into()),
            ..click_on_image(Trigger::new(TriggerKind::OncePerChange))
        },
        keys_without_image(Trigger::new(TriggerKind::Once), &[18, 80]),
    ];
    registry.save(defs.clone()).await.unwrap();
    assert!(status.get(StatusKind::PersistenceNotFound).is_none());
    // Saving does not restart anything
    assert!(registry.workers().is_empty());

    let (reloaded, _, _) = registry_in(&dir);
    assert_eq!(reloaded.load_from_properties().await.unwrap(), 2);
    assert_eq!(*reloaded.definitions(), defs);
    assert_eq!(reloaded.workers().len(), 2);
    reloaded.stop_all().await;
}

#[tokio::test]
async fn test_paused_state_carries_into_next_generation() {
    let dir = TempDir::new().unwrap();
    let (registry, _, _) = registry_in(&dir);

    registry.set_all_active(false);
    registry
        .load(vec![keys_without_image(Trigger::new(TriggerKind::Once), &[1])])
        .await;
    let worker = registry.workers()[0].clone();
    settle().await;
    assert!(worker.is_paused());
    assert_eq!(worker.fired_count(), 0);

    registry.set_all_active(true);
    assert!(wait_until(|| worker.fired_count() == 1).await);
    registry.stop_all().await;
}

#[tokio::test]
async fn test_corrupt_automations_file_stops_running_generation() {
    let dir = TempDir::new().unwrap();
    let (registry, _, status) = registry_in(&dir);

    registry
        .save(vec![click_on_image(Trigger::new(TriggerKind::Always))])
        .await
        .unwrap();
    assert_eq!(registry.load_from_properties().await.unwrap(), 1);
    let running = registry.workers();

    std::fs::write(dir.path().join("automations.yaml"), "automation_image_0: [unclosed\n").unwrap();
    let err = registry.load_from_properties().await.unwrap_err();

    assert!(matches!(err, crate::error::AutomatorError::PersistenceIo { .. }));
    assert!(status.get(StatusKind::PersistenceIo).is_some());
    assert_eq!(running[0].phase(), WorkerPhase::Stopped);
    assert!(registry.workers().is_empty());
    assert!(registry.definitions().is_empty());
}
