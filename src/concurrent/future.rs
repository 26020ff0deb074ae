use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::semaphore::Semaphore;
use crate::error::MiddlewareError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
  InProgress,
  Success,
  Error,
}

struct Shared<T> {
  status: Mutex<Status>,
  value: Mutex<Option<T>>,
  error: Mutex<Option<MiddlewareError>>,
  semaphore: Semaphore,
  on_success: Mutex<Option<Box<dyn FnOnce(&T) + Send>>>,
  on_error: Mutex<Option<Box<dyn FnOnce(&MiddlewareError) + Send>>>,
}

/// One-shot typed future, generic over the result tuple rather than
/// needing a distinct type per arity. Transitions
/// `IN_PROGRESS -> {SUCCESS(T) | ERROR(MiddlewareError)}` exactly once;
/// later transitions are ignored ("first write wins").
pub struct Future<T> {
  shared: Arc<Shared<T>>,
}

impl<T> Clone for Future<T> {
  fn clone(&self) -> Self {
    Future {
      shared: self.shared.clone(),
    }
  }
}

/// The producer-side handle used to resolve a `Future<T>`. Kept separate
/// from `Future<T>` itself so consumers only ever see the read side.
pub struct FutureResolver<T> {
  shared: Arc<Shared<T>>,
}

pub fn new<T>() -> (Future<T>, FutureResolver<T>) {
  let shared = Arc::new(Shared {
    status: Mutex::new(Status::InProgress),
    value: Mutex::new(None),
    error: Mutex::new(None),
    semaphore: Semaphore::new(0),
    on_success: Mutex::new(None),
    on_error: Mutex::new(None),
  });
  (
    Future {
      shared: shared.clone(),
    },
    FutureResolver { shared },
  )
}

impl<T> FutureResolver<T> {
  /// Resolves the future successfully. A no-op if already resolved.
  pub fn on_success(&self, value: T) {
    let mut status = self.shared.status.lock().expect("future mutex poisoned");
    if *status != Status::InProgress {
      return;
    }
    *status = Status::Success;
    if let Some(cb) = self.shared.on_success.lock().expect("future mutex poisoned").take() {
      cb(&value);
    }
    *self.shared.value.lock().expect("future mutex poisoned") = Some(value);
    self.shared.semaphore.notify();
  }

  /// Resolves the future with an error. A no-op if already resolved.
  pub fn on_error(&self, error: MiddlewareError) {
    let mut status = self.shared.status.lock().expect("future mutex poisoned");
    if *status != Status::InProgress {
      return;
    }
    *status = Status::Error;
    if let Some(cb) = self.shared.on_error.lock().expect("future mutex poisoned").take() {
      cb(&error);
    }
    *self.shared.error.lock().expect("future mutex poisoned") = Some(error);
    self.shared.semaphore.notify();
  }
}

impl<T: Clone> Future<T> {
  /// Blocks until resolved.
  pub fn get(&self) -> Result<T, MiddlewareError> {
    self.shared.semaphore.wait();
    self.shared.semaphore.notify();
    self.take_result()
  }

  /// Blocks until resolved or `timeout` elapses.
  pub fn get_with_timeout(&self, timeout: Duration) -> Result<T, MiddlewareError> {
    if !self.shared.semaphore.wait_for(timeout) {
      return Err(MiddlewareError::arbitration_timeout());
    }
    self.shared.semaphore.notify();
    self.take_result()
  }

  /// Force-resolves the future with an error if it is still in progress.
  /// A no-op otherwise. Lets a holder of just the read side (no
  /// `FutureResolver`) unblock a pending waiter early.
  pub fn cancel(&self, error: MiddlewareError) {
    let mut status = self.shared.status.lock().expect("future mutex poisoned");
    if *status != Status::InProgress {
      return;
    }
    *status = Status::Error;
    if let Some(cb) = self.shared.on_error.lock().expect("future mutex poisoned").take() {
      cb(&error);
    }
    *self.shared.error.lock().expect("future mutex poisoned") = Some(error);
    self.shared.semaphore.notify();
  }

  fn take_result(&self) -> Result<T, MiddlewareError> {
    let status = *self.shared.status.lock().expect("future mutex poisoned");
    match status {
      Status::Success => Ok(
        self
          .shared
          .value
          .lock()
          .expect("future mutex poisoned")
          .clone()
          .expect("SUCCESS status implies a value was stored"),
      ),
      Status::Error => Err(
        self
          .shared
          .error
          .lock()
          .expect("future mutex poisoned")
          .clone()
          .expect("ERROR status implies an error was stored"),
      ),
      Status::InProgress => unreachable!("semaphore wait only returns once resolved"),
    }
  }

  /// `true` once `get`/`get_with_timeout` would return immediately.
  pub fn is_done(&self) -> bool {
    *self.shared.status.lock().expect("future mutex poisoned") != Status::InProgress
  }

  /// Registers a completion callback. Called immediately, inline, if the
  /// future is already resolved.
  pub fn on_success(&self, callback: impl FnOnce(&T) + Send + 'static) {
    let status = *self.shared.status.lock().expect("future mutex poisoned");
    match status {
      Status::Success => {
        let value = self.shared.value.lock().expect("future mutex poisoned");
        callback(value.as_ref().expect("SUCCESS implies a stored value"));
      }
      Status::InProgress => {
        *self.shared.on_success.lock().expect("future mutex poisoned") = Some(Box::new(callback));
      }
      Status::Error => {}
    }
  }

  /// Registers an error callback. Called immediately, inline, if the
  /// future is already resolved with an error.
  pub fn on_error(&self, callback: impl FnOnce(&MiddlewareError) + Send + 'static) {
    let status = *self.shared.status.lock().expect("future mutex poisoned");
    match status {
      Status::Error => {
        let error = self.shared.error.lock().expect("future mutex poisoned");
        callback(error.as_ref().expect("ERROR implies a stored error"));
      }
      Status::InProgress => {
        *self.shared.on_error.lock().expect("future mutex poisoned") = Some(Box::new(callback));
      }
      Status::Success => {}
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::thread;

  #[test]
  fn resolves_with_success() {
    let (future, resolver) = new::<u32>();
    resolver.on_success(42);
    assert_eq!(future.get().unwrap(), 42);
  }

  #[test]
  fn resolves_with_error() {
    let (future, resolver) = new::<u32>();
    resolver.on_error(MiddlewareError::InternalError("boom".to_owned()));
    assert!(future.get().is_err());
  }

  #[test]
  fn second_resolution_is_ignored() {
    let (future, resolver) = new::<u32>();
    resolver.on_success(1);
    resolver.on_success(2);
    assert_eq!(future.get().unwrap(), 1);
  }

  #[test]
  fn get_with_timeout_fires_on_slow_resolution() {
    let (future, resolver) = new::<u32>();
    let handle = thread::spawn(move || {
      thread::sleep(Duration::from_millis(10));
      resolver.on_success(7);
    });
    assert_eq!(future.get_with_timeout(Duration::from_secs(1)).unwrap(), 7);
    handle.join().unwrap();
  }

  #[test]
  fn get_with_timeout_expires_before_resolution() {
    let (future, _resolver) = new::<u32>();
    assert!(matches!(
      future.get_with_timeout(Duration::from_millis(20)),
      Err(MiddlewareError::Timeout(_))
    ));
  }

  #[test]
  fn callbacks_fire_for_already_resolved_future() {
    let (future, resolver) = new::<u32>();
    resolver.on_success(5);
    let observed = Arc::new(Mutex::new(None));
    let observed2 = observed.clone();
    future.on_success(move |v| *observed2.lock().unwrap() = Some(*v));
    assert_eq!(*observed.lock().unwrap(), Some(5));
  }
}
