//! Cancellable background work for remote operations.

use crate::error::{FetchError, UpdateError};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::task::{AbortHandle, JoinError, JoinHandle};

/// Error types that have a variant for "the task was cancelled".
pub trait Cancellable {
    fn cancelled() -> Self;
}

impl Cancellable for FetchError {
    fn cancelled() -> Self {
        FetchError::Cancelled
    }
}

impl Cancellable for UpdateError {
    fn cancelled() -> Self {
        UpdateError::Cancelled
    }
}

/// A spawned remote operation that resolves to `Result<T, E>`.
///
/// Awaiting the task (or calling [`Task::join`]) yields the operation's result;
/// a task stopped with [`Task::cancel`] resolves to `E::cancelled()`. Dropping a
/// `Task` detaches it without cancelling.
#[derive(Debug)]
pub struct Task<T, E> {
    handle: JoinHandle<Result<T, E>>,
}

impl<T, E> Task<T, E>
where
    T: Send + 'static,
    E: Cancellable + Send + 'static,
{
    /// Runs `future` on the current tokio runtime.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        Task {
            handle: tokio::spawn(future),
        }
    }
}

impl<T, E: Cancellable> Task<T, E> {
    /// Requests cancellation. The task stops at its next suspension point;
    /// work it already completed stays completed.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// A handle that can cancel the task after it has been moved elsewhere.
    pub fn abort_handle(&self) -> AbortHandle {
        self.handle.abort_handle()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn join(self) -> Result<T, E> {
        self.await
    }
}

fn settle<T, E: Cancellable>(joined: Result<Result<T, E>, JoinError>) -> Result<T, E> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Err(E::cancelled()),
        Err(e) => std::panic::resume_unwind(e.into_panic()),
    }
}

impl<T, E: Cancellable> Future for Task<T, E> {
    type Output = Result<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(settle)
    }
}
