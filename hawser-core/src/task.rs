//! Pluggable task spawning.
//!
//! Everything runs on one thread: background work is spawned onto the
//! current thread's `LocalSet` via [`TaskProvider`], and futures need not be
//! `Send`. The `name` given at spawn time becomes a tracing span so log
//! lines from concurrent connection tasks stay attributable.

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::Instrument;

/// Spawner for background tasks.
pub trait TaskProvider: Clone {
    /// Spawn `future` as a named background task on the current thread.
    ///
    /// Callers must be running inside a `tokio::task::LocalSet`.
    fn spawn_task<F>(&self, name: &str, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + 'static;
}

/// Task spawning via `tokio::task::spawn_local`.
#[derive(Debug, Clone, Default)]
pub struct TokioTasks;

impl TokioTasks {
    /// Create a tokio-backed task provider.
    pub fn new() -> Self {
        Self
    }
}

impl TaskProvider for TokioTasks {
    fn spawn_task<F>(&self, name: &str, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + 'static,
    {
        let span = tracing::debug_span!("task", name);
        tokio::task::spawn_local(future.instrument(span))
    }
}
