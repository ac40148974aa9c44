//! Single-threaded cooperative event loop.
//!
//! Each channel is bound to exactly one `EventLoop`. Handler callbacks for
//! that channel all run on whichever thread drives the loop's
//! `run_tasks`/`run_scheduled_tasks`; other threads may only `submit` or
//! `schedule` work onto it. Concretely: a FIFO `VecDeque` for ready tasks
//! and a deadline-ordered `BinaryHeap` for scheduled ones, both behind a
//! `Mutex` so the two sides (owning thread draining, other threads
//! enqueueing) never race.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{PipelineError, Result};

/// A unit of work submitted to an event loop.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a scheduled task, usable to cancel it before it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduledTaskId(u64);

struct Scheduled {
    id: ScheduledTaskId,
    deadline: Instant,
    task: Option<Task>,
}

impl Scheduled {
    fn is_cancelled(&self) -> bool {
        self.task.is_none()
    }
}

// `BinaryHeap` is a max-heap; invert ordering so the earliest deadline sorts
// highest (i.e. pops first).
impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}
impl Eq for Scheduled {}
impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.deadline.cmp(&self.deadline).then_with(|| other.id.0.cmp(&self.id.0))
    }
}

struct Inner {
    ready: VecDeque<Task>,
    scheduled: BinaryHeap<Scheduled>,
    next_id: u64,
    shutting_down: bool,
    closed: bool,
}

/// A single-threaded cooperative scheduler bound to one channel.
///
/// `submit`/`schedule` are safe to call from any thread; `run_tasks`,
/// `run_scheduled_tasks`, and `shutdown_gracefully` must only ever be
/// called by the thread that drives this loop.
pub struct EventLoop {
    inner: Mutex<Inner>,
    in_loop: AtomicBool,
    tick: AtomicU64,
}

impl EventLoop {
    pub fn new() -> Arc<EventLoop> {
        Arc::new(EventLoop {
            inner: Mutex::new(Inner {
                ready: VecDeque::new(),
                scheduled: BinaryHeap::new(),
                next_id: 0,
                shutting_down: false,
                closed: false,
            }),
            in_loop: AtomicBool::new(false),
            tick: AtomicU64::new(0),
        })
    }

    /// Enqueues `task` for FIFO execution. Tasks submitted while already
    /// running on this loop execute in submission order after the current
    /// task returns; tasks submitted from other threads enqueue the same
    /// way.
    pub fn submit(&self, task: Task) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.shutting_down || inner.closed {
            return Err(PipelineError::RejectedTask);
        }
        inner.ready.push_back(task);
        Ok(())
    }

    /// Schedules `task` to run no earlier than `delay` from now. Returns an
    /// id usable with `cancel_scheduled_tasks`.
    pub fn schedule(&self, task: Task, delay: Duration) -> Result<ScheduledTaskId> {
        let mut inner = self.inner.lock();
        if inner.shutting_down || inner.closed {
            return Err(PipelineError::RejectedTask);
        }
        let id = ScheduledTaskId(inner.next_id);
        inner.next_id += 1;
        inner.scheduled.push(Scheduled {
            id,
            deadline: Instant::now() + delay,
            task: Some(task),
        });
        Ok(id)
    }

    /// A task is cancellable only before it fires; cancelling after fire
    /// (or an unknown id) is a no-op.
    pub fn cancel_scheduled_tasks(&self, id: ScheduledTaskId) {
        let mut inner = self.inner.lock();
        for entry in inner.scheduled.iter_mut() {
            if entry.id == id {
                entry.task = None;
            }
        }
    }

    /// Whether the current thread is the one executing this loop's tasks.
    /// Handlers use this to decide between direct execution and
    /// trampolining via `submit`.
    pub fn in_event_loop(&self) -> bool {
        self.in_loop.load(Ordering::Acquire)
    }

    /// Drains the ready FIFO, running each task in submission order. Tasks
    /// submitted by a task while it runs are appended and observed by this
    /// same drain (so `run_tasks` keeps going until the queue is
    /// momentarily empty), so tasks run in submission order after the
    /// current task returns.
    pub fn run_tasks(&self) {
        self.in_loop.store(true, Ordering::Release);
        loop {
            let task = {
                let mut inner = self.inner.lock();
                inner.ready.pop_front()
            };
            match task {
                Some(task) => task(),
                None => break,
            }
        }
        self.in_loop.store(false, Ordering::Release);
    }

    /// Runs every scheduled task whose deadline is `<= now`, in deadline
    /// order, returning the next pending deadline (if any) so a real
    /// transport can size its poll timeout.
    pub fn run_scheduled_tasks(&self, now: Instant) -> Option<Instant> {
        self.in_loop.store(true, Ordering::Release);
        loop {
            let due = {
                let mut inner = self.inner.lock();
                match inner.scheduled.peek() {
                    Some(entry) if entry.deadline <= now => inner.scheduled.pop(),
                    _ => None,
                }
            };
            match due {
                Some(mut entry) if entry.is_cancelled() => continue,
                Some(mut entry) => {
                    if let Some(task) = entry.task.take() {
                        task();
                    }
                }
                None => break,
            }
        }
        self.in_loop.store(false, Ordering::Release);
        self.next_deadline()
    }

    /// Deadline of the earliest non-cancelled scheduled task, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        let inner = self.inner.lock();
        inner
            .scheduled
            .iter()
            .filter(|entry| !entry.is_cancelled())
            .map(|entry| entry.deadline)
            .min()
    }

    /// Begins graceful shutdown: after `quiet_period` has elapsed with no
    /// newly submitted task, the loop refuses further `submit`/`schedule`
    /// calls; `timeout` is a hard cap a caller enforces by calling
    /// `force_close` if the quiet period never arrives. The draining and
    /// timer-driven polling itself is left to the caller — this loop never
    /// spawns its own OS threads; this method only flips the rejection
    /// flag and is safe to call from the owning thread once it has decided
    /// no more work should be accepted.
    pub fn begin_graceful_shutdown(&self, quiet_period: Duration, timeout: Duration) {
        tracing::debug!(?quiet_period, ?timeout, "event loop entering graceful shutdown");
        let mut inner = self.inner.lock();
        inner.shutting_down = true;
    }

    /// Immediately stops accepting new tasks and drops all pending work.
    pub fn force_close(&self) {
        let mut inner = self.inner.lock();
        inner.shutting_down = true;
        inner.closed = true;
        inner.ready.clear();
        inner.scheduled.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.lock().shutting_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn tasks_run_in_fifo_order() {
        let loop_ = EventLoop::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let order = Arc::clone(&order);
            loop_.submit(Box::new(move || order.lock().push(i))).unwrap();
        }
        loop_.run_tasks();
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn task_submitted_from_within_a_task_still_drains() {
        let loop_ = EventLoop::new();
        let count = Arc::new(AtomicUsize::new(0));
        let inner_loop = Arc::clone(&loop_);
        let inner_count = Arc::clone(&count);
        loop_
            .submit(Box::new(move || {
                inner_count.fetch_add(1, Ordering::SeqCst);
                inner_loop
                    .submit(Box::new(move || {
                        inner_count.fetch_add(1, Ordering::SeqCst);
                    }))
                    .unwrap();
            }))
            .unwrap();
        loop_.run_tasks();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn scheduled_tasks_fire_in_deadline_order() {
        let loop_ = EventLoop::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let base = Instant::now();
        for (i, delay_ms) in [(0u32, 30u64), (1, 10), (2, 20)] {
            let order = Arc::clone(&order);
            loop_
                .schedule(Box::new(move || order.lock().push(i)), Duration::from_millis(delay_ms))
                .unwrap();
        }
        let far_future = base + Duration::from_secs(1);
        loop_.run_scheduled_tasks(far_future);
        assert_eq!(*order.lock(), vec![1, 2, 0]);
    }

    #[test]
    fn cancelling_before_fire_skips_it() {
        let loop_ = EventLoop::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&fired);
        let id = loop_
            .schedule(Box::new(move || { inner.fetch_add(1, Ordering::SeqCst); }), Duration::from_millis(5))
            .unwrap();
        loop_.cancel_scheduled_tasks(id);
        loop_.run_scheduled_tasks(Instant::now() + Duration::from_secs(1));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancel_after_fire_is_a_no_op() {
        let loop_ = EventLoop::new();
        let id = loop_.schedule(Box::new(|| {}), Duration::from_millis(1)).unwrap();
        loop_.run_scheduled_tasks(Instant::now() + Duration::from_secs(1));
        loop_.cancel_scheduled_tasks(id);
    }

    #[test]
    fn submit_after_graceful_shutdown_is_rejected() {
        let loop_ = EventLoop::new();
        loop_.begin_graceful_shutdown(Duration::from_millis(0), Duration::from_millis(0));
        let err = loop_.submit(Box::new(|| {})).unwrap_err();
        assert!(matches!(err, PipelineError::RejectedTask));
    }
}
