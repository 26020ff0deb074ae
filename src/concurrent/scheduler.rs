#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Opaque handle returned by `schedule`, usable with `unschedule`. Carries
/// no information beyond identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunnableHandle(u64);

/// Sentinel returned when a task could not be scheduled.
pub const INVALID_RUNNABLE_HANDLE: RunnableHandle = RunnableHandle(0);

type Task = Box<dyn FnOnce() + Send>;

struct Entry {
  deadline: Instant,
  handle: RunnableHandle,
  task: Mutex<Option<Task>>,
}

struct Shared {
  queue: Mutex<BinaryHeap<Reverse<(Instant, u64)>>>,
  entries: Mutex<std::collections::HashMap<u64, Arc<Entry>>>,
  condvar: Condvar,
  shutdown: Mutex<bool>,
  next_id: AtomicU64,
}

/// Delayed task scheduler: a thread pool draining a deadline-ordered
/// binary heap, in a threaded, non-async style.
pub struct DelayedScheduler {
  shared: Arc<Shared>,
  workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl DelayedScheduler {
  /// Spawns `pool_size` worker threads, each draining the shared deadline
  /// queue. Callers typically pass `std::thread::available_parallelism()`.
  pub fn new(pool_size: usize) -> Self {
    let pool_size = pool_size.max(1);
    let shared = Arc::new(Shared {
      queue: Mutex::new(BinaryHeap::new()),
      entries: Mutex::new(std::collections::HashMap::new()),
      condvar: Condvar::new(),
      shutdown: Mutex::new(false),
      next_id: AtomicU64::new(1),
    });

    let workers = (0..pool_size)
      .map(|worker_id| {
        let shared = shared.clone();
        thread::spawn(move || Self::worker_loop(worker_id, shared))
      })
      .collect();

    DelayedScheduler {
      shared,
      workers: Mutex::new(workers),
    }
  }

  fn worker_loop(worker_id: usize, shared: Arc<Shared>) {
    loop {
      let mut queue = shared.queue.lock().expect("scheduler mutex poisoned");
      loop {
        if *shared.shutdown.lock().expect("scheduler mutex poisoned") {
          trace!("scheduler worker {worker_id} exiting on shutdown");
          return;
        }
        match queue.peek() {
          None => {
            queue = shared.condvar.wait(queue).expect("scheduler mutex poisoned");
          }
          Some(Reverse((deadline, _))) => {
            let now = Instant::now();
            if *deadline <= now {
              break;
            }
            let (guard, _) = shared
              .condvar
              .wait_timeout(queue, *deadline - now)
              .expect("scheduler mutex poisoned");
            queue = guard;
          }
        }
      }
      let Reverse((_, id)) = queue.pop().expect("peek confirmed an entry is ready");
      drop(queue);

      let entry = shared.entries.lock().expect("scheduler mutex poisoned").remove(&id);
      if let Some(entry) = entry {
        if let Some(task) = entry.task.lock().expect("scheduler mutex poisoned").take() {
          trace!("scheduler worker {worker_id} running task {}", entry.handle.0);
          task();
        }
      }
    }
  }

  /// Schedules `task` to run after `delay`. Returns
  /// `INVALID_RUNNABLE_HANDLE` if the scheduler has already shut down.
  pub fn schedule(&self, delay: Duration, task: impl FnOnce() + Send + 'static) -> RunnableHandle {
    if *self.shared.shutdown.lock().expect("scheduler mutex poisoned") {
      warn!("schedule called after shutdown, ignoring");
      return INVALID_RUNNABLE_HANDLE;
    }
    let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
    let handle = RunnableHandle(id);
    let deadline = Instant::now() + delay;
    let entry = Arc::new(Entry {
      deadline,
      handle,
      task: Mutex::new(Some(Box::new(task))),
    });
    self.shared.entries.lock().expect("scheduler mutex poisoned").insert(id, entry);
    self
      .shared
      .queue
      .lock()
      .expect("scheduler mutex poisoned")
      .push(Reverse((deadline, id)));
    self.shared.condvar.notify_all();
    debug!("scheduled runnable {id} for {delay:?} from now");
    handle
  }

  /// Cancels a previously scheduled task. Idempotent: cancelling an
  /// already-run or already-cancelled handle is a no-op.
  pub fn unschedule(&self, handle: RunnableHandle) {
    let removed = self
      .shared
      .entries
      .lock()
      .expect("scheduler mutex poisoned")
      .remove(&handle.0);
    if removed.is_some() {
      debug!("unscheduled runnable {}", handle.0);
    }
  }

  /// Signals shutdown and joins every worker thread.
  pub fn shutdown(&self) {
    *self.shared.shutdown.lock().expect("scheduler mutex poisoned") = true;
    self.shared.condvar.notify_all();
    let mut workers = self.workers.lock().expect("scheduler mutex poisoned");
    for worker in workers.drain(..) {
      let _ = worker.join();
    }
  }
}

impl Drop for DelayedScheduler {
  fn drop(&mut self) {
    self.shutdown();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::mpsc;

  #[test]
  fn runs_task_after_delay() {
    let scheduler = DelayedScheduler::new(2);
    let (tx, rx) = mpsc::channel();
    scheduler.schedule(Duration::from_millis(20), move || {
      tx.send(()).unwrap();
    });
    rx.recv_timeout(Duration::from_secs(1)).expect("task should have run");
  }

  #[test]
  fn unschedule_prevents_execution() {
    let scheduler = DelayedScheduler::new(1);
    let (tx, rx) = mpsc::channel();
    let handle = scheduler.schedule(Duration::from_millis(50), move || {
      tx.send(()).unwrap();
    });
    scheduler.unschedule(handle);
    assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());
  }

  #[test]
  fn schedule_after_shutdown_returns_invalid_handle() {
    let scheduler = DelayedScheduler::new(1);
    scheduler.shutdown();
    let handle = scheduler.schedule(Duration::from_millis(10), || {});
    assert_eq!(handle, INVALID_RUNNABLE_HANDLE);
  }
}
