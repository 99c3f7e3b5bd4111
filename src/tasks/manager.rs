//! Task registry and scheduling.

use anyhow::{Context, Result};
use ffqueue_av::{format_command, CancellationToken, EncodeParams, InputSpec, ProgressUpdate};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use super::pool::WorkerPool;
use super::{EncoderService, Task, TaskEvent, TaskId, TaskKind, TaskStatus};

/// Receives every progress update of one task, on its worker thread.
pub type ProgressCallback = Arc<dyn Fn(&ProgressUpdate) + Send + Sync>;

/// Receives a task snapshot after every state change, on whichever thread
/// made the change.
pub type TaskObserver = Arc<dyn Fn(&Task) + Send + Sync>;

const DEFAULT_MAX_WORKERS: usize = 2;
const EVENT_CAPACITY: usize = 256;

struct TaskEntry {
    task: Task,
    cancel: CancellationToken,
    /// Whether the run listens to `cancel`.
    monitored: bool,
}

struct Inner {
    tasks: RwLock<HashMap<TaskId, TaskEntry>>,
    service: EncoderService,
    observer: Option<TaskObserver>,
    event_tx: broadcast::Sender<TaskEvent>,
    pool: WorkerPool,
    accepting: AtomicBool,
}

/// Runs encodes on a bounded pool of worker threads and tracks their state.
///
/// Submission validates and builds the command synchronously, then returns
/// the queued task without waiting for it. Each task moves
/// `Queued → Running → Completed | Failed`, or `Queued → Cancelled` if it is
/// withdrawn before a worker picks it up. The observer and progress
/// callbacks run on worker threads and should return quickly; they must not
/// block on the manager.
///
/// There is no timeout: an encoder that never exits holds its worker forever.
///
/// # Example
///
/// ```no_run
/// use ffqueue::tasks::{EncoderService, TaskManager};
/// use ffqueue_av::EncodeParams;
///
/// let manager = TaskManager::builder(EncoderService::default())
///     .max_workers(2)
///     .observer(|task| println!("{} is {}", task.id, task.status))
///     .build()?;
///
/// manager.submit_convert("in.mov", "out.mp4", EncodeParams::default(), Some(60.0), None)?;
/// manager.shutdown();
/// manager.join();
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

/// Configures a [`TaskManager`].
pub struct TaskManagerBuilder {
    service: EncoderService,
    max_workers: usize,
    observer: Option<TaskObserver>,
}

impl TaskManagerBuilder {
    /// Number of encodes run at once (default 2).
    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Called after every state change of every task.
    pub fn observer(mut self, observer: impl Fn(&Task) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn build(self) -> Result<TaskManager> {
        if self.max_workers == 0 {
            anyhow::bail!("max_workers must be at least 1");
        }
        let pool = WorkerPool::new(self.max_workers).context("Failed to start worker threads")?;
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(TaskManager {
            inner: Arc::new(Inner {
                tasks: RwLock::new(HashMap::new()),
                service: self.service,
                observer: self.observer,
                event_tx,
                pool,
                accepting: AtomicBool::new(true),
            }),
        })
    }
}

impl TaskManager {
    pub fn builder(service: EncoderService) -> TaskManagerBuilder {
        TaskManagerBuilder {
            service,
            max_workers: DEFAULT_MAX_WORKERS,
            observer: None,
        }
    }

    /// A manager with the default worker count and no observer.
    pub fn new(service: EncoderService) -> Result<Self> {
        Self::builder(service).build()
    }

    pub fn service(&self) -> &EncoderService {
        &self.inner.service
    }

    /// Queue a single-input transcode.
    ///
    /// `duration` is the input length in seconds, used for progress
    /// percentages. With a `progress` callback the encode is monitored (and
    /// cancellable while running); without one it runs as a plain process.
    ///
    /// # Errors
    ///
    /// Fails without registering a task if the parameters are invalid or the
    /// manager has been shut down.
    pub fn submit_convert(
        &self,
        input: impl Into<InputSpec>,
        output: impl Into<PathBuf>,
        params: EncodeParams,
        duration: Option<f64>,
        progress: Option<ProgressCallback>,
    ) -> Result<Task> {
        let input = input.into();
        let output = output.into();
        self.ensure_accepting()?;
        let argv = self
            .inner
            .service
            .builder()
            .build_convert(&input, &output, &params)?;
        let task = Task::new(TaskKind::Convert, vec![input], output, params);
        self.enqueue(task, argv, duration, progress)
    }

    /// Queue a concatenation of two or more inputs.
    ///
    /// # Errors
    ///
    /// Fails without registering a task for fewer than two inputs, invalid
    /// parameters, or a manager that has been shut down.
    pub fn submit_merge(
        &self,
        inputs: Vec<InputSpec>,
        output: impl Into<PathBuf>,
        params: EncodeParams,
        total_duration: Option<f64>,
        progress: Option<ProgressCallback>,
    ) -> Result<Task> {
        let output = output.into();
        self.ensure_accepting()?;
        let argv = self
            .inner
            .service
            .builder()
            .build_merge(&inputs, &output, &params)?;
        let task = Task::new(TaskKind::Merge, inputs, output, params);
        self.enqueue(task, argv, total_duration, progress)
    }

    /// Snapshot of one task.
    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.inner.tasks.read().get(&id).map(|e| e.task.clone())
    }

    /// Snapshots of every task, oldest first.
    pub fn list(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .inner
            .tasks
            .read()
            .values()
            .map(|e| e.task.clone())
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    /// Receive status and progress events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Cancel a task.
    ///
    /// A queued task is withdrawn and becomes `Cancelled`. A running,
    /// monitored task is asked to stop and ends `Failed` once its encoder
    /// exits. Returns `false` if the task is unknown, already finished, or
    /// running without monitoring.
    pub fn cancel(&self, id: TaskId) -> bool {
        let snapshot = {
            let mut tasks = self.inner.tasks.write();
            let Some(entry) = tasks.get_mut(&id) else {
                return false;
            };
            match entry.task.status {
                TaskStatus::Queued => {
                    self.inner.pool.remove(id);
                    entry.task.cancel();
                    entry.task.clone()
                }
                TaskStatus::Running if entry.monitored => {
                    tracing::info!("Cancelling running task {}", id);
                    entry.cancel.cancel();
                    return true;
                }
                _ => return false,
            }
        };

        tracing::info!("Cancelled queued task {}", id);
        self.inner.notify(&snapshot);
        true
    }

    /// Stop accepting submissions and cancel every queued task.
    ///
    /// Running tasks are left to finish; use [`join`](Self::join) to wait for
    /// them.
    pub fn shutdown(&self) {
        if !self.inner.accepting.swap(false, Ordering::SeqCst) {
            return;
        }
        let discarded = self.inner.pool.close();
        tracing::info!("Task manager shutting down, {} queued task(s) cancelled", discarded.len());

        for id in discarded {
            let snapshot = {
                let mut tasks = self.inner.tasks.write();
                tasks.get_mut(&id).map(|entry| {
                    entry.task.cancel();
                    entry.task.clone()
                })
            };
            if let Some(task) = snapshot {
                self.inner.notify(&task);
            }
        }
    }

    /// Wait for all workers to exit. Blocks forever unless
    /// [`shutdown`](Self::shutdown) has been called.
    pub fn join(&self) {
        self.inner.pool.join();
    }

    fn ensure_accepting(&self) -> Result<()> {
        if !self.inner.accepting.load(Ordering::SeqCst) {
            anyhow::bail!("Task manager has been shut down");
        }
        Ok(())
    }

    fn enqueue(
        &self,
        mut task: Task,
        argv: Vec<String>,
        duration: Option<f64>,
        progress: Option<ProgressCallback>,
    ) -> Result<Task> {
        task.metadata
            .insert("command".into(), format_command(&argv).into());
        if let Some(duration) = duration {
            task.metadata.insert("duration".into(), duration.into());
        }

        let id = task.id;
        self.inner.tasks.write().insert(
            id,
            TaskEntry {
                task: task.clone(),
                cancel: CancellationToken::new(),
                monitored: progress.is_some(),
            },
        );
        tracing::info!("Queued {:?} task {} -> {:?}", task.kind, id, task.output_path);
        self.inner.notify(&task);

        let inner = Arc::clone(&self.inner);
        let job = Box::new(move || inner.run_task(id, &argv, duration, progress));
        if !self.inner.pool.submit(id, job) {
            // Raced with shutdown.
            let snapshot = self.inner.update(id, Task::cancel);
            if let Some(task) = snapshot {
                self.inner.notify(&task);
            }
            anyhow::bail!("Task manager has been shut down");
        }

        Ok(task)
    }
}

impl Inner {
    /// Apply `change` to a task, returning the new snapshot.
    fn update(&self, id: TaskId, change: impl FnOnce(&mut Task)) -> Option<Task> {
        let mut tasks = self.tasks.write();
        tasks.get_mut(&id).map(|entry| {
            change(&mut entry.task);
            entry.task.clone()
        })
    }

    fn notify(&self, task: &Task) {
        if let Some(observer) = &self.observer {
            if panic::catch_unwind(AssertUnwindSafe(|| observer(task))).is_err() {
                tracing::error!("Observer panicked on task {} ({})", task.id, task.status);
            }
        }
        if self.event_tx.send(TaskEvent::StatusChanged(task.clone())).is_err() {
            tracing::trace!("No subscribers for task event");
        }
    }

    fn run_task(
        &self,
        id: TaskId,
        argv: &[String],
        duration: Option<f64>,
        progress: Option<ProgressCallback>,
    ) {
        let (cancel, started) = {
            let mut tasks = self.tasks.write();
            let Some(entry) = tasks.get_mut(&id) else {
                return;
            };
            // Cancelled while it sat in the queue.
            if entry.task.status != TaskStatus::Queued {
                return;
            }
            entry.task.start();
            (entry.cancel.clone(), entry.task.clone())
        };
        tracing::info!("Started task {}", id);
        self.notify(&started);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match &progress {
            Some(callback) => {
                let on_update: &mut dyn FnMut(&ProgressUpdate) =
                    &mut |update: &ProgressUpdate| self.on_progress(id, callback, update);
                self.service.run(argv, duration, Some(on_update), &cancel)
            }
            None => self.service.run(argv, duration, None, &cancel),
        }));

        let snapshot = match outcome {
            Ok(Ok(_)) => {
                tracing::info!("Task {} completed", id);
                self.update(id, Task::complete)
            }
            Ok(Err(e)) => {
                let message = match &e {
                    ffqueue_av::Error::Cancelled => "cancelled by request".to_string(),
                    other => other.to_string(),
                };
                tracing::warn!("Task {} failed: {}", id, message);
                let stderr = e.stderr().map(str::to_string);
                self.update(id, |task| task.fail(&message, stderr))
            }
            Err(_) => {
                tracing::error!("Task {} panicked", id);
                self.update(id, |task| task.fail("task panicked while running", None))
            }
        };

        if let Some(task) = snapshot {
            self.notify(&task);
        }
    }

    fn on_progress(&self, id: TaskId, callback: &ProgressCallback, update: &ProgressUpdate) {
        if let Some(progress) = update.progress {
            if let Some(entry) = self.tasks.write().get_mut(&id) {
                entry.task.update_progress(progress);
            }
        }
        callback(update);
        let event = TaskEvent::Progress {
            id,
            update: update.clone(),
        };
        if self.event_tx.send(event).is_err() {
            tracing::trace!("No subscribers for progress event");
        }
    }
}
