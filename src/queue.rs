//! Bounded concurrency task queue with cooperative cancellation.
//!
//! At most `max_concurrent` tasks run at once; the rest wait in FIFO order.
//! Every task gets its own [`CancellationToken`]. A task settles exactly once,
//! through its success, error or abort callback, and the next waiting task is
//! started as soon as a slot frees up.

use futures::future::BoxFuture;
use std::{
    collections::{HashMap, VecDeque},
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{ImportError, Result};

/// Deferred success callback, bound to the value the task produced.
type Completion = Box<dyn FnOnce() + Send>;
type Execute = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Result<Completion>> + Send>;
type ErrorCallback = Box<dyn FnOnce(ImportError) + Send>;
type AbortCallback = Box<dyn FnOnce() + Send>;

/// One unit of work, identified by the item key it operates on.
pub struct Task {
    key: String,
    execute: Execute,
    on_error: Option<ErrorCallback>,
    on_abort: Option<AbortCallback>,
}

impl Task {
    /// Build a task from its body and success callback.
    ///
    /// The body must observe the token and reject with
    /// [`ImportError::Aborted`] once it fires.
    pub fn new<T, F, Fut, S>(key: impl Into<String>, execute: F, on_success: S) -> Self
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        S: FnOnce(T) + Send + 'static,
    {
        let execute: Execute = Box::new(move |token| -> BoxFuture<'static, Result<Completion>> {
            Box::pin(async move {
                let value = execute(token).await?;
                Ok(Box::new(move || on_success(value)) as Completion)
            })
        });
        Self {
            key: key.into(),
            execute,
            on_error: None,
            on_abort: None,
        }
    }

    pub fn on_error(mut self, f: impl FnOnce(ImportError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_abort(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_abort = Some(Box::new(f));
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn abort_now(self) {
        if let Some(f) = self.on_abort {
            f();
        }
    }
}

/// Bookkeeping for a task whose body is in flight.
struct Running {
    token: CancellationToken,
    on_error: Option<ErrorCallback>,
    on_abort: Option<AbortCallback>,
}

#[derive(Default)]
struct QueueState {
    waiting: VecDeque<Task>,
    running: HashMap<String, Running>,
    /// Tasks removed from `running` whose callback has not returned yet.
    settling: usize,
}

impl QueueState {
    fn outstanding(&self) -> usize {
        self.waiting.len() + self.running.len() + self.settling
    }

    fn contains(&self, key: &str) -> bool {
        self.running.contains_key(key) || self.waiting.iter().any(|t| t.key == key)
    }
}

struct Inner {
    max_concurrent: usize,
    state: Mutex<QueueState>,
    outstanding: watch::Sender<usize>,
}

/// Handle to a queue. Clones share the same queue.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

impl TaskQueue {
    pub fn new(max_concurrent: usize) -> Self {
        let (outstanding, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                max_concurrent: max_concurrent.max(1),
                state: Mutex::new(QueueState::default()),
                outstanding,
            }),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }

    /// Add tasks to the waiting list and fill free slots.
    ///
    /// A task whose key is already running or waiting is dropped.
    pub fn enqueue(&self, tasks: impl IntoIterator<Item = Task>) {
        {
            let mut state = self.lock();
            for task in tasks {
                if state.contains(&task.key) {
                    tracing::warn!("task {} already queued, ignoring duplicate", task.key);
                    continue;
                }
                state.waiting.push_back(task);
            }
            self.publish(&state);
        }
        self.advance();
    }

    /// Cancel one task. Returns `false` when the key is unknown.
    ///
    /// A waiting task is removed and its abort callback runs before this
    /// returns. A running task only has its token cancelled; its abort
    /// callback runs once the body actually rejects.
    pub fn cancel(&self, key: &str) -> bool {
        let removed = {
            let mut state = self.lock();
            if let Some(running) = state.running.get(key) {
                tracing::info!("cancelling running task {key}");
                running.token.cancel();
                return true;
            }
            let Some(pos) = state.waiting.iter().position(|t| t.key == key) else {
                return false;
            };
            let task = state.waiting.remove(pos);
            self.publish(&state);
            task
        };
        if let Some(task) = removed {
            tracing::info!("cancelled waiting task {key}");
            task.abort_now();
        }
        true
    }

    pub fn cancel_many<'a>(&self, keys: impl IntoIterator<Item = &'a str>) {
        for key in keys {
            self.cancel(key);
        }
    }

    /// Cancel every running task and clear the waiting list.
    pub fn cancel_all(&self) {
        let drained: Vec<Task> = {
            let mut state = self.lock();
            for running in state.running.values() {
                running.token.cancel();
            }
            let drained = state.waiting.drain(..).collect();
            self.publish(&state);
            drained
        };
        tracing::info!("cancel all: {} waiting tasks dropped", drained.len());
        for task in drained {
            task.abort_now();
        }
    }

    pub fn running_count(&self) -> usize {
        self.lock().running.len()
    }

    pub fn waiting_count(&self) -> usize {
        self.lock().waiting.len()
    }

    pub fn total(&self) -> usize {
        let state = self.lock();
        state.running.len() + state.waiting.len()
    }

    pub fn is_running(&self, key: &str) -> bool {
        self.lock().running.contains_key(key)
    }

    pub fn is_waiting(&self, key: &str) -> bool {
        self.lock().waiting.iter().any(|t| t.key == key)
    }

    /// Resolve once nothing is waiting, running or settling.
    pub async fn idle(&self) {
        let mut rx = self.inner.outstanding.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Start waiting tasks until every slot is taken.
    fn advance(&self) {
        loop {
            let (key, execute, token) = {
                let mut state = self.lock();
                if state.running.len() >= self.inner.max_concurrent {
                    return;
                }
                let Some(task) = state.waiting.pop_front() else {
                    return;
                };
                let token = CancellationToken::new();
                state.running.insert(
                    task.key.clone(),
                    Running {
                        token: token.clone(),
                        on_error: task.on_error,
                        on_abort: task.on_abort,
                    },
                );
                self.publish(&state);
                (task.key, task.execute, token)
            };

            tracing::debug!("starting task {key}");
            let body = execute(token);
            let queue = self.clone();
            tokio::spawn(async move {
                let outcome = body.await;
                queue.settle(key, outcome);
            });
        }
    }

    fn settle(&self, key: String, outcome: Result<Completion>) {
        let running = {
            let mut state = self.lock();
            let running = state.running.remove(&key);
            state.settling += 1;
            self.publish(&state);
            running
        };

        if let Some(running) = running {
            match outcome {
                Ok(done) => done(),
                Err(e) if running.token.is_cancelled() || e.is_abort() => {
                    tracing::info!("task {key} aborted");
                    if let Some(f) = running.on_abort {
                        f();
                    }
                }
                Err(e) => {
                    tracing::warn!("task {key} failed: {e}");
                    if let Some(f) = running.on_error {
                        f(e);
                    }
                }
            }
        }

        {
            let mut state = self.lock();
            state.settling -= 1;
            self.publish(&state);
        }
        self.advance();
    }

    fn publish(&self, state: &QueueState) {
        self.inner.outstanding.send_replace(state.outstanding());
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Every critical section leaves the state consistent, so a panic in
        // another holder does not invalidate it.
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    /// Task that succeeds after `ms` and bumps `done`.
    fn sleeper(key: &str, ms: u64, done: Arc<AtomicUsize>) -> Task {
        Task::new(
            key,
            move |_token| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(())
            },
            move |_| {
                done.fetch_add(1, Ordering::SeqCst);
            },
        )
    }

    /// Task that blocks until its token fires, then rejects as aborted.
    fn blocker(key: &str, aborted: Arc<AtomicUsize>) -> Task {
        Task::new(
            key,
            |token: CancellationToken| async move {
                token.cancelled().await;
                Err::<(), _>(ImportError::Aborted)
            },
            |_| {},
        )
        .on_abort(move || {
            aborted.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_max_concurrent() {
        let queue = TaskQueue::new(3);
        let current = counter();
        let peak = counter();
        let done = counter();

        let tasks = (0..10).map(|i| {
            let (current, peak, done) = (current.clone(), peak.clone(), done.clone());
            Task::new(
                format!("t{i}"),
                move |_token| async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10 + i * 3)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                },
                move |_| {
                    done.fetch_add(1, Ordering::SeqCst);
                },
            )
        });
        queue.enqueue(tasks);
        assert_eq!(queue.running_count(), 3);
        assert_eq!(queue.waiting_count(), 7);

        queue.idle().await;
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(done.load(Ordering::SeqCst), 10);
        assert_eq!(queue.total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn starts_tasks_in_fifo_order() {
        let queue = TaskQueue::new(1);
        let started = Arc::new(Mutex::new(Vec::new()));

        let tasks = [("a", 30), ("b", 5), ("c", 1)].map(|(key, ms)| {
            let started = started.clone();
            Task::new(
                key,
                move |_token| async move {
                    started.lock().unwrap().push(key);
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(())
                },
                |_| {},
            )
        });
        queue.enqueue(tasks);
        queue.idle().await;

        assert_eq!(*started.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_key_runs_once() {
        let queue = TaskQueue::new(2);
        let runs = counter();
        let done = counter();
        let (tx, rx) = oneshot::channel::<()>();

        let first = {
            let (runs, done) = (runs.clone(), done.clone());
            Task::new(
                "dup",
                move |_token| async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    let _ = rx.await;
                    Ok(())
                },
                move |_| {
                    done.fetch_add(1, Ordering::SeqCst);
                },
            )
        };
        let second = {
            let (runs, done) = (runs.clone(), done.clone());
            Task::new(
                "dup",
                move |_token| async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                move |_| {
                    done.fetch_add(1, Ordering::SeqCst);
                },
            )
        };

        queue.enqueue([first]);
        queue.enqueue([second]);
        assert_eq!(queue.total(), 1);

        tx.send(()).unwrap();
        queue.idle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_waiting_task_aborts_synchronously() {
        let queue = TaskQueue::new(1);
        let aborted = counter();
        let b_started = Arc::new(AtomicBool::new(false));

        let b = {
            let (started, aborted) = (b_started.clone(), aborted.clone());
            Task::new(
                "b",
                move |_token| async move {
                    started.store(true, Ordering::SeqCst);
                    Ok(())
                },
                |_| {},
            )
            .on_abort(move || {
                aborted.fetch_add(1, Ordering::SeqCst);
            })
        };
        queue.enqueue([blocker("a", counter()), b]);
        assert!(queue.is_waiting("b"));

        assert!(queue.cancel("b"));
        assert_eq!(aborted.load(Ordering::SeqCst), 1);
        assert!(!queue.is_waiting("b"));

        queue.cancel("a");
        queue.idle().await;
        assert!(!b_started.load(Ordering::SeqCst));
        assert_eq!(aborted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_running_task_waits_for_settlement() {
        let queue = TaskQueue::new(1);
        let aborted = counter();
        let (gate_tx, gate_rx) = oneshot::channel::<()>();

        let task = {
            let aborted = aborted.clone();
            Task::new(
                "slow",
                move |token: CancellationToken| async move {
                    token.cancelled().await;
                    let _ = gate_rx.await;
                    Err::<(), _>(ImportError::Aborted)
                },
                |_| {},
            )
            .on_abort(move || {
                aborted.fetch_add(1, Ordering::SeqCst);
            })
        };
        queue.enqueue([task]);
        tokio::task::yield_now().await;

        assert!(queue.cancel("slow"));
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(aborted.load(Ordering::SeqCst), 0);
        assert!(queue.is_running("slow"));

        gate_tx.send(()).unwrap();
        queue.idle().await;
        assert_eq!(aborted.load(Ordering::SeqCst), 1);
        assert_eq!(queue.running_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_does_not_block_next_task() {
        let queue = TaskQueue::new(1);
        let errors = counter();
        let aborts = counter();
        let done = counter();

        let failing = {
            let (errors, aborts) = (errors.clone(), aborts.clone());
            Task::new(
                "x",
                |_token| async { Err::<(), _>(ImportError::JobFailed("boom".into())) },
                |_| {},
            )
            .on_error(move |e| {
                assert!(matches!(e, ImportError::JobFailed(_)));
                errors.fetch_add(1, Ordering::SeqCst);
            })
            .on_abort(move || {
                aborts.fetch_add(1, Ordering::SeqCst);
            })
        };
        queue.enqueue([failing, sleeper("y", 5, done.clone())]);
        queue.idle().await;

        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(aborts.load(Ordering::SeqCst), 0);
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_class_rejection_fires_abort_without_cancel() {
        let queue = TaskQueue::new(1);
        let aborts = counter();
        let errors = counter();
        let task = {
            let (aborts, errors) = (aborts.clone(), errors.clone());
            Task::new(
                "k",
                |_token| async { Err::<(), _>(ImportError::Aborted) },
                |_| {},
            )
            .on_error(move |_| {
                errors.fetch_add(1, Ordering::SeqCst);
            })
            .on_abort(move || {
                aborts.fetch_add(1, Ordering::SeqCst);
            })
        };
        queue.enqueue([task]);
        queue.idle().await;
        assert_eq!(aborts.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_clears_running_and_waiting() {
        let queue = TaskQueue::new(2);
        let aborted = counter();
        queue.enqueue((0..5).map(|i| blocker(&format!("b{i}"), aborted.clone())));
        assert_eq!(queue.running_count(), 2);
        assert_eq!(queue.waiting_count(), 3);

        queue.cancel_all();
        assert_eq!(queue.waiting_count(), 0);
        assert_eq!(aborted.load(Ordering::SeqCst), 3);

        queue.idle().await;
        assert_eq!(aborted.load(Ordering::SeqCst), 5);
        assert_eq!(queue.total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn key_is_reusable_after_abort() {
        let queue = TaskQueue::new(1);
        let aborted = counter();
        queue.enqueue([blocker("same", aborted.clone())]);
        queue.cancel("same");
        queue.idle().await;
        assert_eq!(aborted.load(Ordering::SeqCst), 1);

        let done = counter();
        queue.enqueue([sleeper("same", 1, done.clone())]);
        queue.idle().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancel_unknown_key_is_false() {
        let queue = TaskQueue::new(1);
        assert!(!queue.cancel("missing"));
    }
}
