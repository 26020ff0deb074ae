//! Blocking-concurrency primitives the rest of the core builds on.

pub mod future;
pub mod scheduler;
pub mod semaphore;

pub use future::Future;
pub use scheduler::{DelayedScheduler, RunnableHandle, INVALID_RUNNABLE_HANDLE};
pub use semaphore::Semaphore;
