//! Worker pool executing prioritized closures.
//!
//! Workers run on dedicated threads, pulling tasks in strict lane order
//! (interactive before enrichment before prefetch, FIFO within a lane) and
//! sleeping briefly when idle. Shutdown is cooperative: workers finish their
//! current task and exit.

use crate::CancellationToken;
use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Lane order is execution order; lower lanes always drain first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskPriority {
    /// User is waiting: resolving a document they tapped.
    Interactive = 0,
    /// Visible-item enrichment (size, cover, page count).
    Enrich = 1,
    /// Speculative warm-up for soon-visible items.
    Prefetch = 2,
}

const LANE_COUNT: usize = 3;

type Task = Box<dyn FnOnce(&CancellationToken) + Send>;

struct QueueState {
    lanes: [VecDeque<(Task, CancellationToken)>; LANE_COUNT],
}

impl QueueState {
    fn next_task(&mut self) -> Option<(Task, CancellationToken)> {
        self.lanes.iter_mut().find_map(VecDeque::pop_front)
    }

    fn len(&self) -> usize {
        self.lanes.iter().map(VecDeque::len).sum()
    }
}

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads. Default: logical CPU count.
    pub num_workers: usize,
    /// How long an idle worker sleeps before re-checking the queue.
    pub poll_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self { num_workers: num_cpus(), poll_interval: Duration::from_millis(20) }
    }
}

impl WorkerPoolConfig {
    pub fn new(num_workers: usize) -> Self {
        Self { num_workers, ..Default::default() }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Pool of worker threads draining the priority lanes.
pub struct WorkerPool {
    queue: Arc<Mutex<QueueState>>,
    shutdown: Arc<AtomicBool>,
    workers: Vec<Worker>,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> Self {
        let queue = Arc::new(Mutex::new(QueueState {
            lanes: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
        }));
        let shutdown = Arc::new(AtomicBool::new(false));

        let workers = (0..config.num_workers.max(1))
            .map(|id| {
                Worker::spawn(id, queue.clone(), shutdown.clone(), config.poll_interval)
            })
            .collect();

        Self { queue, shutdown, workers }
    }

    /// Queue a task and hand back its cancellation token.
    ///
    /// The task runs at most once; a token cancelled before the task is
    /// picked up suppresses execution entirely.
    pub fn submit<F>(&self, priority: TaskPriority, task: F) -> CancellationToken
    where
        F: FnOnce(&CancellationToken) + Send + 'static,
    {
        let token = CancellationToken::new();
        let mut queue = self.queue.lock().unwrap();
        queue.lanes[priority as usize].push_back((Box::new(task), token.clone()));
        token
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn pending_tasks(&self) -> usize {
        let queue = self.queue.lock().unwrap();
        queue.len()
    }

    /// Signal workers to stop and wait for them to finish their current task.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::Release);
        for worker in self.workers {
            worker.join();
        }
    }
}

struct Worker {
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(
        id: usize,
        queue: Arc<Mutex<QueueState>>,
        shutdown: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> Self {
        let thread = thread::Builder::new()
            .name(format!("noteshelf-worker-{id}"))
            .spawn(move || Self::run(queue, shutdown, poll_interval))
            .expect("failed to spawn worker thread");

        Self { thread: Some(thread) }
    }

    fn run(queue: Arc<Mutex<QueueState>>, shutdown: Arc<AtomicBool>, poll_interval: Duration) {
        loop {
            if shutdown.load(Ordering::Acquire) {
                break;
            }

            let next = {
                let mut queue = queue.lock().unwrap();
                queue.next_task()
            };

            match next {
                Some((task, token)) => {
                    if !token.is_cancelled() {
                        task(&token);
                    }
                }
                None => thread::sleep(poll_interval),
            }
        }
    }

    fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("worker thread panicked");
            }
        }
    }
}

fn num_cpus() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}
