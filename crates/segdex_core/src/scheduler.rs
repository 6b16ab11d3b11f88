//! Shared timer for periodic background tasks.

use crate::error::IndexResult;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error};

type Task = Arc<dyn Fn() + Send + Sync>;

struct Entry {
    id: u64,
    interval: Duration,
    next_due: Instant,
    task: Task,
}

#[derive(Default)]
struct SchedulerState {
    tasks: Vec<Entry>,
    next_id: u64,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<SchedulerState>,
    cv: Condvar,
}

/// Runs periodic tasks on one dedicated thread.
///
/// Tasks run one at a time; a slow task delays the others. A panicking task
/// is logged and stays scheduled. The thread is stopped and joined when the
/// scheduler is dropped.
pub struct Scheduler {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.shared.state.lock().tasks.len())
            .finish()
    }
}

impl Scheduler {
    /// Starts the timer thread.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the thread cannot be spawned.
    pub fn new() -> IndexResult<Self> {
        let shared = Arc::new(Shared::default());
        let worker = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("segdex-timer".into())
            .spawn(move || run(&worker))?;
        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Runs `task` every `interval`, first after one interval has passed.
    pub fn schedule(&self, interval: Duration, task: impl Fn() + Send + Sync + 'static) -> TaskHandle {
        let mut state = self.shared.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.tasks.push(Entry {
            id,
            interval,
            next_due: Instant::now() + interval,
            task: Arc::new(task),
        });
        self.shared.cv.notify_all();
        TaskHandle {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Number of scheduled tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.shared.state.lock().tasks.len()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shared.state.lock().shutdown = true;
        self.shared.cv.notify_all();
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

fn run(shared: &Shared) {
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            break;
        }
        let now = Instant::now();
        let next = state
            .tasks
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| e.next_due)
            .map(|(pos, e)| (pos, e.next_due));
        let Some((pos, due)) = next else {
            shared.cv.wait(&mut state);
            continue;
        };
        if due > now {
            shared.cv.wait_until(&mut state, due);
            continue;
        }

        let entry = &mut state.tasks[pos];
        entry.next_due = now + entry.interval;
        let (id, task) = (entry.id, Arc::clone(&entry.task));
        drop(state);
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task())) {
            error!(task = id, reason = panic_message(&*payload), "scheduled task panicked");
        }
        state = shared.state.lock();
    }
    debug!("timer thread stopped");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown"
    }
}

/// Handle to a scheduled task.
#[derive(Debug)]
pub struct TaskHandle {
    id: u64,
    shared: Weak<Shared>,
}

impl TaskHandle {
    /// Stops future runs, returning whether the task was still scheduled.
    ///
    /// A run already in progress finishes.
    pub fn cancel(&self) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let mut state = shared.state.lock();
        let before = state.tasks.len();
        state.tasks.retain(|e| e.id != self.id);
        before != state.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn wait_for(deadline: Duration, cond: impl Fn() -> bool) -> bool {
        let end = Instant::now() + deadline;
        while Instant::now() < end {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn task_runs_repeatedly() {
        let scheduler = Scheduler::new().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let _handle = scheduler.schedule(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(wait_for(Duration::from_secs(5), || runs.load(Ordering::SeqCst) >= 3));
    }

    #[test]
    fn cancelled_task_stops_running() {
        let scheduler = Scheduler::new().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let handle = scheduler.schedule(Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(wait_for(Duration::from_secs(5), || runs.load(Ordering::SeqCst) >= 1));

        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert_eq!(scheduler.task_count(), 0);

        let after_cancel = runs.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        // At most the run that was in flight when cancelling.
        assert!(runs.load(Ordering::SeqCst) <= after_cancel + 1);
    }

    #[test]
    fn panicking_task_does_not_stop_the_timer() {
        let scheduler = Scheduler::new().unwrap();
        let panics = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));
        let failing = Arc::clone(&panics);
        let counter = Arc::clone(&runs);
        let _failing = scheduler.schedule(Duration::from_millis(5), move || {
            failing.fetch_add(1, Ordering::SeqCst);
            panic!("task failure");
        });
        let _counting = scheduler.schedule(Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(wait_for(Duration::from_secs(5), || panics.load(Ordering::SeqCst) >= 2));
        let seen = runs.load(Ordering::SeqCst);
        assert!(wait_for(Duration::from_secs(5), || runs.load(Ordering::SeqCst) > seen + 2));
        assert_eq!(scheduler.task_count(), 2);
    }

    #[test]
    fn handle_outlives_scheduler() {
        let scheduler = Scheduler::new().unwrap();
        let handle = scheduler.schedule(Duration::from_secs(60), || {});
        drop(scheduler);
        assert!(!handle.cancel());
    }
}
