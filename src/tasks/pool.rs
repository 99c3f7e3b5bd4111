//! Fixed-size FIFO worker pool.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::TaskId;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Queue {
    jobs: VecDeque<(TaskId, Job)>,
    closed: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    available: Condvar,
}

/// Runs queued jobs on `size` OS threads, oldest first.
///
/// A job holds its worker until it returns. Closing the pool discards jobs
/// that have not started; workers exit once their current job finishes.
pub(crate) struct WorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub(crate) fn new(size: usize) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                jobs: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        });

        let pool = Self {
            shared,
            workers: Mutex::new(Vec::with_capacity(size)),
        };

        for index in 0..size.max(1) {
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("ffqueue-worker-{index}"))
                .spawn(move || worker_loop(&shared));
            match handle {
                Ok(handle) => pool.workers.lock().push(handle),
                Err(e) => {
                    pool.close();
                    return Err(e);
                }
            }
        }

        Ok(pool)
    }

    /// Queue a job. Returns `false`, dropping the job, if the pool is closed.
    pub(crate) fn submit(&self, id: TaskId, job: Job) -> bool {
        let mut queue = self.shared.queue.lock();
        if queue.closed {
            return false;
        }
        queue.jobs.push_back((id, job));
        drop(queue);
        self.shared.available.notify_one();
        true
    }

    /// Withdraw a job that has not started yet.
    pub(crate) fn remove(&self, id: TaskId) -> bool {
        let mut queue = self.shared.queue.lock();
        match queue.jobs.iter().position(|(queued, _)| *queued == id) {
            Some(index) => {
                queue.jobs.remove(index);
                true
            }
            None => false,
        }
    }

    /// Stop accepting jobs and discard the ones still waiting, returning their
    /// ids in queue order.
    pub(crate) fn close(&self) -> Vec<TaskId> {
        let mut queue = self.shared.queue.lock();
        queue.closed = true;
        let discarded = queue.jobs.drain(..).map(|(id, _)| id).collect();
        drop(queue);
        self.shared.available.notify_all();
        discarded
    }

    /// Wait for every worker to exit. Only returns after [`close`](Self::close).
    pub(crate) fn join(&self) {
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if worker.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.close();
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some((_, job)) = queue.jobs.pop_front() {
                    break Some(job);
                }
                if queue.closed {
                    break None;
                }
                shared.available.wait(&mut queue);
            }
        };

        match job {
            Some(job) => job(),
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn runs_jobs_in_submission_order_on_one_worker() {
        let pool = WorkerPool::new(1).unwrap();
        let (tx, rx) = mpsc::channel();
        for n in 0..5 {
            let tx = tx.clone();
            assert!(pool.submit(TaskId::new(), Box::new(move || tx.send(n).unwrap())));
        }
        let order: Vec<i32> = (0..5)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn removed_and_closed_jobs_never_run() {
        let pool = WorkerPool::new(1).unwrap();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel();
        let (ran_tx, ran_rx) = mpsc::channel();

        // Occupy the only worker.
        pool.submit(
            TaskId::new(),
            Box::new(move || {
                started_tx.send(()).unwrap();
                gate_rx.recv().unwrap();
            }),
        );
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let removed = TaskId::new();
        let discarded = TaskId::new();
        for id in [removed, discarded] {
            let ran_tx = ran_tx.clone();
            pool.submit(id, Box::new(move || ran_tx.send(id).unwrap()));
        }

        assert!(pool.remove(removed));
        assert!(!pool.remove(removed));
        assert_eq!(pool.close(), vec![discarded]);
        assert!(!pool.submit(TaskId::new(), Box::new(|| {})));

        gate_tx.send(()).unwrap();
        pool.join();
        assert!(ran_rx.try_recv().is_err());
    }
}
