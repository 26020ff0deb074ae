use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Counting semaphore built from a mutex-guarded counter and a condvar.
/// `notify` increments the counter and wakes one waiter; `wait` blocks
/// until the counter is positive, then decrements it.
pub struct Semaphore {
  count: Mutex<i64>,
  condvar: Condvar,
}

impl Semaphore {
  pub fn new(initial_count: i64) -> Self {
    Semaphore {
      count: Mutex::new(initial_count),
      condvar: Condvar::new(),
    }
  }

  /// Blocks until the count is positive, then consumes one permit.
  pub fn wait(&self) {
    let mut count = self.count.lock().expect("semaphore mutex poisoned");
    while *count <= 0 {
      count = self.condvar.wait(count).expect("semaphore mutex poisoned");
    }
    *count -= 1;
  }

  /// Blocks until the count is positive or `timeout` elapses. Returns
  /// `true` if a permit was acquired.
  pub fn wait_for(&self, timeout: Duration) -> bool {
    let mut count = self.count.lock().expect("semaphore mutex poisoned");
    let deadline = std::time::Instant::now() + timeout;
    while *count <= 0 {
      let now = std::time::Instant::now();
      if now >= deadline {
        return false;
      }
      let (guard, result) = self
        .condvar
        .wait_timeout(count, deadline - now)
        .expect("semaphore mutex poisoned");
      count = guard;
      if result.timed_out() && *count <= 0 {
        return false;
      }
    }
    *count -= 1;
    true
  }

  /// Releases one permit and wakes a single waiter, if any.
  pub fn notify(&self) {
    let mut count = self.count.lock().expect("semaphore mutex poisoned");
    *count += 1;
    self.condvar.notify_one();
  }

  /// Current permit count, mainly useful for tests and diagnostics.
  pub fn current_count(&self) -> i64 {
    *self.count.lock().expect("semaphore mutex poisoned")
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;
  use std::thread;

  #[test]
  fn wait_blocks_until_notified() {
    let sem = Arc::new(Semaphore::new(0));
    let sem2 = sem.clone();
    let handle = thread::spawn(move || {
      sem2.wait();
    });
    thread::sleep(Duration::from_millis(20));
    assert_eq!(sem.current_count(), 0);
    sem.notify();
    handle.join().unwrap();
  }

  #[test]
  fn wait_for_times_out_without_notify() {
    let sem = Semaphore::new(0);
    assert!(!sem.wait_for(Duration::from_millis(30)));
  }

  #[test]
  fn wait_for_succeeds_when_already_available() {
    let sem = Semaphore::new(1);
    assert!(sem.wait_for(Duration::from_millis(10)));
    assert_eq!(sem.current_count(), 0);
  }
}
