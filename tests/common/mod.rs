//! Shared helpers for integration tests.
//!
//! Provides [`FakeTools`], a temp directory holding scripted stand-ins for
//! ffmpeg and ffprobe, so tests exercise real subprocesses without needing
//! either installed.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use ffqueue::tasks::{EncoderService, Task, TaskManager};
use tempfile::TempDir;

/// ffmpeg status lines for a 10 second input, ending at the halfway mark.
pub const HALFWAY_PROGRESS: &str = r"printf 'frame=   50 fps=25 time=00:00:02.50 bitrate=1.0kbits/s speed=1.0x\r' >&2
printf 'frame=  125 fps=25 time=00:00:05.00 bitrate=1.0kbits/s speed=2.0x\r' >&2";

pub struct FakeTools {
    pub dir: TempDir,
}

impl FakeTools {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    /// Install `body` as the fake encoder script and return its path.
    pub fn encoder(&self, body: &str) -> PathBuf {
        self.script("ffmpeg", body)
    }

    /// Install a fake prober that prints `json` for every file.
    pub fn prober(&self, json: &str) -> PathBuf {
        self.script("ffprobe", &format!("cat <<'EOF'\n{json}\nEOF"))
    }

    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("failed to write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .expect("failed to chmod script");
        path
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn service(&self) -> EncoderService {
        EncoderService::new(self.path("ffmpeg"), self.path("ffprobe"))
            .with_cancel_grace(Duration::from_millis(500))
    }

    /// A config file pointing at the fake tools.
    pub fn config_file(&self) -> PathBuf {
        let path = self.path("ffqueue.toml");
        let config = format!(
            "[tools]\nffmpeg_path = {:?}\nffprobe_path = {:?}\n\n[tasks]\ncancel_grace_secs = 1\n",
            self.path("ffmpeg"),
            self.path("ffprobe"),
        );
        fs::write(&path, config).expect("failed to write config");
        path
    }
}

/// A manager whose observer forwards every snapshot to the returned channel.
pub fn observed_manager(
    service: EncoderService,
    max_workers: usize,
) -> (TaskManager, mpsc::Receiver<Task>) {
    let (tx, rx) = mpsc::channel();
    let tx = parking_lot::Mutex::new(tx);
    let manager = TaskManager::builder(service)
        .max_workers(max_workers)
        .observer(move |task| {
            let _ = tx.lock().send(task.clone());
        })
        .build()
        .expect("failed to build manager");
    (manager, rx)
}

/// Collect observer snapshots for `id` until it reaches a terminal state.
pub fn snapshots_until_done(rx: &mpsc::Receiver<Task>, id: ffqueue::tasks::TaskId) -> Vec<Task> {
    let mut seen = Vec::new();
    loop {
        let task = rx
            .recv_timeout(Duration::from_secs(10))
            .expect("timed out waiting for task update");
        if task.id != id {
            continue;
        }
        let done = task.status.is_terminal();
        seen.push(task);
        if done {
            return seen;
        }
    }
}

pub fn touch(path: &Path) {
    fs::write(path, b"").expect("failed to create file");
}
