//! Task lifecycle integration tests.
//!
//! Drives [`TaskManager`] against scripted stand-in encoders and checks the
//! state transitions observers see.

#![cfg(unix)]

mod common;

use assert_matches::assert_matches;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use common::{observed_manager, snapshots_until_done, FakeTools, HALFWAY_PROGRESS};
use ffqueue::tasks::{ProgressCallback, TaskEvent, TaskKind, TaskManager, TaskStatus};
use ffqueue_av::{EncodeParams, InputSpec, ProgressUpdate};

fn statuses(tasks: &[ffqueue::tasks::Task]) -> Vec<TaskStatus> {
    tasks.iter().map(|t| t.status).collect()
}

fn recording_callback() -> (ProgressCallback, Arc<Mutex<Vec<ProgressUpdate>>>) {
    let updates = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&updates);
    let callback: ProgressCallback = Arc::new(move |u: &ProgressUpdate| {
        sink.lock().unwrap().push(u.clone());
    });
    (callback, updates)
}

/// Poll until `check` holds or the deadline passes.
fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}

// ---------------------------------------------------------------------------
// Queued -> Running -> Completed
// ---------------------------------------------------------------------------

#[test]
fn convert_completes_with_progress() {
    let tools = FakeTools::new();
    tools.encoder(&format!("{HALFWAY_PROGRESS}\nexit 0"));
    let (manager, rx) = observed_manager(tools.service(), 2);
    let (callback, updates) = recording_callback();

    let task = manager
        .submit_convert("in.mov", tools.path("out.mp4"), EncodeParams::default(), Some(10.0), Some(callback))
        .unwrap();
    assert_eq!(task.status, TaskStatus::Queued);
    assert_eq!(task.kind, TaskKind::Convert);

    let seen = snapshots_until_done(&rx, task.id);
    assert_eq!(
        statuses(&seen),
        vec![TaskStatus::Queued, TaskStatus::Running, TaskStatus::Completed]
    );

    let updates = updates.lock().unwrap();
    assert_eq!(updates.len(), 3);
    assert_eq!(updates[1].progress, Some(0.5));
    assert_eq!(updates[1].eta_seconds, Some(2.5));
    assert!(updates[2].done);
    assert_eq!(updates[2].progress, Some(1.0));

    let done = manager.get(task.id).unwrap();
    assert_eq!(done.progress, Some(1.0));
    assert!(done.started_at.is_some());
    assert!(done.finished_at.is_some());
    assert!(done.error_message.is_none());
    assert!(done.metadata["command"].as_str().unwrap().contains("in.mov"));

    manager.shutdown();
    manager.join();
}

// ---------------------------------------------------------------------------
// Queued -> Running -> Failed
// ---------------------------------------------------------------------------

#[test]
fn failing_encoder_notifies_three_times() {
    let tools = FakeTools::new();
    tools.encoder("echo 'in.mov: No such file or directory' >&2\nexit 1");
    let (manager, rx) = observed_manager(tools.service(), 2);

    let task = manager
        .submit_convert("in.mov", tools.path("out.mp4"), EncodeParams::default(), None, None)
        .unwrap();

    let seen = snapshots_until_done(&rx, task.id);
    assert_eq!(
        statuses(&seen),
        vec![TaskStatus::Queued, TaskStatus::Running, TaskStatus::Failed]
    );

    let failed = seen.last().unwrap();
    let message = failed.error_message.as_deref().unwrap();
    assert!(message.contains("exited with code 1"), "{message}");
    assert!(message.contains("No such file or directory"), "{message}");
    assert!(failed.stderr.as_deref().unwrap().contains("No such file"));

    manager.shutdown();
    manager.join();
    assert!(rx.try_recv().is_err(), "observer called more than three times");
}

#[test]
fn missing_encoder_fails_the_task() {
    let tools = FakeTools::new();
    let (manager, rx) = observed_manager(tools.service(), 1);

    let task = manager
        .submit_convert("in.mov", tools.path("out.mp4"), EncodeParams::default(), None, None)
        .unwrap();

    let failed = snapshots_until_done(&rx, task.id).pop().unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.error_message.unwrap().contains("tool not found"));

    manager.shutdown();
    manager.join();
}

#[test]
fn panicking_observer_does_not_stall_worker() {
    let tools = FakeTools::new();
    tools.encoder("exit 0");
    let panicked = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&panicked);
    let manager = TaskManager::builder(tools.service())
        .max_workers(1)
        .observer(move |task| {
            if task.status == TaskStatus::Running && count.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("observer bug");
            }
        })
        .build()
        .unwrap();
    let mut events = manager.subscribe();

    let first = manager
        .submit_convert("a.mov", tools.path("a.mp4"), EncodeParams::default(), None, None)
        .unwrap();
    let second = manager
        .submit_convert("b.mov", tools.path("b.mp4"), EncodeParams::default(), None, None)
        .unwrap();

    assert!(eventually(|| manager.get(second.id).unwrap().status == TaskStatus::Completed));
    assert_eq!(manager.get(first.id).unwrap().status, TaskStatus::Completed);
    assert_eq!(panicked.load(Ordering::SeqCst), 2);

    // The event still goes out when the observer panics.
    let running_events = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|e| matches!(e, TaskEvent::StatusChanged(t) if t.id == first.id && t.status == TaskStatus::Running))
        .count();
    assert_eq!(running_events, 1);

    manager.shutdown();
    manager.join();
}

#[test]
fn panicking_callback_fails_task_but_not_worker() {
    let tools = FakeTools::new();
    tools.encoder(&format!("{HALFWAY_PROGRESS}\nexit 0"));
    let (manager, rx) = observed_manager(tools.service(), 1);

    let callback: ProgressCallback = Arc::new(|_: &ProgressUpdate| panic!("observer bug"));
    let first = manager
        .submit_convert("a.mov", tools.path("a.mp4"), EncodeParams::default(), Some(10.0), Some(callback))
        .unwrap();
    let failed = snapshots_until_done(&rx, first.id).pop().unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.error_message.unwrap().contains("panicked"));

    let second = manager
        .submit_convert("b.mov", tools.path("b.mp4"), EncodeParams::default(), None, None)
        .unwrap();
    let done = snapshots_until_done(&rx, second.id).pop().unwrap();
    assert_eq!(done.status, TaskStatus::Completed);

    manager.shutdown();
    manager.join();
}

// ---------------------------------------------------------------------------
// Rejected submissions
// ---------------------------------------------------------------------------

#[test]
fn invalid_merge_is_rejected_before_registration() {
    let tools = FakeTools::new();
    let (manager, rx) = observed_manager(tools.service(), 1);

    let err = manager
        .submit_merge(vec![InputSpec::new("only.mp4")], tools.path("out.mp4"), EncodeParams::default(), None, None)
        .unwrap_err();
    assert_matches!(
        err.downcast_ref::<ffqueue_av::Error>(),
        Some(ffqueue_av::Error::InvalidArgument(_))
    );

    let mut params = EncodeParams::default();
    params.video.crf = Some(99);
    assert!(manager
        .submit_convert("in.mov", tools.path("out.mp4"), params, None, None)
        .is_err());

    assert!(manager.list().is_empty());
    assert!(rx.try_recv().is_err());

    manager.shutdown();
    manager.join();
}

#[test]
fn submissions_after_shutdown_fail() {
    let tools = FakeTools::new();
    let (manager, rx) = observed_manager(tools.service(), 1);
    manager.shutdown();

    assert!(manager
        .submit_convert("in.mov", tools.path("out.mp4"), EncodeParams::default(), None, None)
        .is_err());
    assert!(manager.list().is_empty());
    assert!(rx.try_recv().is_err());
    manager.join();
}

// ---------------------------------------------------------------------------
// Cancellation and shutdown
// ---------------------------------------------------------------------------

#[test]
fn cancel_queued_and_running_tasks() {
    let tools = FakeTools::new();
    // Runs until told to quit, like ffmpeg reading "q" from stdin.
    tools.encoder("echo 'frame=1 time=00:00:01.00' >&2\nread key\nexit 0");
    let (manager, rx) = observed_manager(tools.service(), 1);
    let (callback, _) = recording_callback();

    let running = manager
        .submit_convert("a.mov", tools.path("a.mp4"), EncodeParams::default(), Some(10.0), Some(callback))
        .unwrap();
    let queued = manager
        .submit_convert("b.mov", tools.path("b.mp4"), EncodeParams::default(), None, None)
        .unwrap();

    assert!(eventually(|| manager.get(running.id).unwrap().status == TaskStatus::Running));

    assert!(manager.cancel(queued.id));
    assert_eq!(manager.get(queued.id).unwrap().status, TaskStatus::Cancelled);
    assert!(!manager.cancel(queued.id));

    assert!(manager.cancel(running.id));
    let snapshots = snapshots_until_done(&rx, running.id);
    let last = snapshots.last().unwrap();
    assert_eq!(last.status, TaskStatus::Failed);
    assert!(last.error_message.as_deref().unwrap().contains("cancelled"));

    let queued_history: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
        .filter(|t| t.id == queued.id)
        .map(|t| t.status)
        .collect();
    assert!(!queued_history.contains(&TaskStatus::Running));

    manager.shutdown();
    manager.join();
}

#[test]
fn shutdown_cancels_queued_but_lets_running_finish() {
    let tools = FakeTools::new();
    let release = tools.path("release");
    tools.encoder(&format!(
        "while [ ! -e '{}' ]; do sleep 0.05; done\nexit 0",
        release.display()
    ));
    let (manager, rx) = observed_manager(tools.service(), 1);

    let running = manager
        .submit_convert("a.mov", tools.path("a.mp4"), EncodeParams::default(), None, None)
        .unwrap();
    let queued = manager
        .submit_convert("b.mov", tools.path("b.mp4"), EncodeParams::default(), None, None)
        .unwrap();
    assert!(eventually(|| manager.get(running.id).unwrap().status == TaskStatus::Running));

    manager.shutdown();
    assert_eq!(manager.get(queued.id).unwrap().status, TaskStatus::Cancelled);
    assert_eq!(manager.get(running.id).unwrap().status, TaskStatus::Running);

    common::touch(&release);
    manager.join();
    assert_eq!(manager.get(running.id).unwrap().status, TaskStatus::Completed);

    let all: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    assert!(all
        .iter()
        .any(|t| t.id == queued.id && t.status == TaskStatus::Cancelled));
}

#[test]
fn hung_task_blocks_only_its_worker() {
    let tools = FakeTools::new();
    // Never exits on its own and ignores "q"; only a kill stops it.
    tools.encoder("case \"$*\" in *hang.mp4*) exec sleep 60;; esac\nexit 0");
    let (manager, rx) = observed_manager(tools.service(), 2);
    let (callback, _) = recording_callback();

    let hung = manager
        .submit_convert("a.mov", tools.path("hang.mp4"), EncodeParams::default(), None, Some(callback))
        .unwrap();
    assert!(eventually(|| manager.get(hung.id).unwrap().status == TaskStatus::Running));

    let quick = manager
        .submit_convert("b.mov", tools.path("quick.mp4"), EncodeParams::default(), None, None)
        .unwrap();
    let done = snapshots_until_done(&rx, quick.id).pop().unwrap();
    assert_eq!(done.status, TaskStatus::Completed);

    // No timeout: the stuck encode is still running.
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(manager.get(hung.id).unwrap().status, TaskStatus::Running);

    assert!(manager.cancel(hung.id));
    let ended = snapshots_until_done(&rx, hung.id).pop().unwrap();
    assert_eq!(ended.status, TaskStatus::Failed);

    manager.shutdown();
    manager.join();
}

// ---------------------------------------------------------------------------
// Merge and events
// ---------------------------------------------------------------------------

#[test]
fn merge_of_probed_inputs() {
    let tools = FakeTools::new();
    let args_log = tools.path("args.txt");
    tools.encoder(&format!(
        "printf '%s\\n' \"$@\" > '{}'\n{HALFWAY_PROGRESS}\nexit 0",
        args_log.display()
    ));
    tools.prober(
        r#"{"format": {"duration": "12.5"},
 "streams": [{"index": 0, "codec_type": "video", "width": 1280, "height": 720}]}"#,
    );
    let (manager, rx) = observed_manager(tools.service(), 1);
    let mut events = manager.subscribe();

    let probed = manager
        .service()
        .probe_inputs(&[tools.path("a.mp4"), tools.path("b.mp4")]);
    assert_eq!(probed.total_duration, Some(25.0));
    assert_eq!(probed.specs[0].dimensions(), Some((1280, 720)));
    assert!(!probed.specs[0].has_audio());

    let (callback, updates) = recording_callback();
    let task = manager
        .submit_merge(probed.specs, tools.path("joined.mp4"), EncodeParams::default(), probed.total_duration, Some(callback))
        .unwrap();
    assert_eq!(task.kind, TaskKind::Merge);
    assert_eq!(task.inputs.len(), 2);

    let done = snapshots_until_done(&rx, task.id).pop().unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(updates.lock().unwrap()[1].progress, Some(0.2));

    let args = std::fs::read_to_string(&args_log).unwrap();
    assert!(args.contains("-filter_complex"));
    assert!(args.contains("scale=1280:720"));
    assert!(args.contains("concat=n=2:v=1:a=0[vout]"));
    assert!(!args.contains("[aout]"));

    let mut status_events = 0;
    let mut progress_events = 0;
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.task_id(), task.id);
        match event {
            TaskEvent::StatusChanged(_) => status_events += 1,
            TaskEvent::Progress { .. } => progress_events += 1,
        }
    }
    assert_eq!(status_events, 3);
    assert_eq!(progress_events, 3);

    manager.shutdown();
    manager.join();
}

#[test]
fn workers_run_tasks_concurrently() {
    let tools = FakeTools::new();
    let marker = tools.path("running");
    // Each encode waits until both have started.
    tools.encoder(&format!(
        "echo x >> '{m}'\nwhile [ $(wc -l < '{m}') -lt 2 ]; do sleep 0.05; done\nexit 0",
        m = marker.display()
    ));
    let (manager, rx) = observed_manager(tools.service(), 2);
    let completed = Arc::new(AtomicUsize::new(0));

    let ids: Vec<_> = ["a", "b"]
        .iter()
        .map(|name| {
            manager
                .submit_convert(
                    format!("{name}.mov").as_str(),
                    tools.path(&format!("{name}.mp4")),
                    EncodeParams::default(),
                    None,
                    None,
                )
                .unwrap()
                .id
        })
        .collect();

    for id in &ids {
        if snapshots_until_done(&rx, *id).pop().unwrap().status == TaskStatus::Completed {
            completed.fetch_add(1, Ordering::SeqCst);
        }
    }
    assert_eq!(completed.load(Ordering::SeqCst), 2);
    assert_eq!(manager.list().len(), 2);

    manager.shutdown();
    manager.join();
}
