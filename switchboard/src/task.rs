//! Task spawning provider abstraction.
//!
//! Everything here is single-threaded: connection drivers, handler
//! invocations, and timeout timers are `!Send` futures spawned onto the
//! current thread's local task set.

use std::future::Future;

use tokio::task::JoinHandle;

/// Provider trait for spawning local tasks.
///
/// The `name` is a diagnostic label carried into log events; implementations
/// are free to ignore it.
pub trait TaskProvider: Clone {
    /// Spawn a future onto the local task set.
    fn spawn_task<F>(&self, name: &str, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static;
}

/// Production task provider spawning onto Tokio's local set.
///
/// Requires a `tokio::task::LocalSet` context (or a local runtime);
/// [`spawn_task`](TaskProvider::spawn_task) panics outside of one, exactly as
/// `tokio::task::spawn_local` does.
#[derive(Clone, Copy, Default)]
pub struct TokioTaskProvider;

impl TaskProvider for TokioTaskProvider {
    fn spawn_task<F>(&self, name: &str, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        tracing::debug!(task = name, "spawning local task");
        tokio::task::spawn_local(future)
    }
}
