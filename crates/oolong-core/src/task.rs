use crate::command::{Cmd, CmdInner};
use crate::BoxError;
use futures::future::BoxFuture;
use std::future::{Future, IntoFuture};
use std::time::Duration;

/// An effectful computation that produces a `T` or fails with a boxed error.
///
/// `Task` is the composition layer in front of [`Cmd`]: build and combine
/// tasks first, then bridge the result into a single-message command with
/// [`perform`](Task::perform), [`attempt`](Task::attempt), or
/// [`attempt_with`](Task::attempt_with).  The expected pattern is to convert
/// failures to messages at this boundary and handle them in `update`; only
/// failures the application declines to convert reach the program's error
/// channel.
///
/// A `Task` can also be awaited directly, which is occasionally handy in
/// tests and command implementations.
///
/// # Examples
///
/// ```rust,ignore
/// let cmd = Task::new(async { store.load("session").await })
///     .map(Session::from_raw)
///     .timeout(Duration::from_secs(5))
///     .attempt_with(Msg::SessionLoaded, Msg::SessionFailed);
/// ```
pub struct Task<T: Send + 'static> {
    fut: BoxFuture<'static, Result<T, BoxError>>,
}

impl<T: Send + 'static> Task<T> {
    /// Wrap a fallible future.
    pub fn new<F, E>(future: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Task {
            fut: Box::pin(async move { future.await.map_err(Into::into) }),
        }
    }

    /// Wrap an infallible future.
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Task {
            fut: Box::pin(async move { Ok(future.await) }),
        }
    }

    /// A task that immediately succeeds with `value`.
    pub fn ok(value: T) -> Self {
        Task {
            fut: Box::pin(async move { Ok(value) }),
        }
    }

    /// A task that immediately fails with `err`.
    pub fn fail(err: impl Into<BoxError>) -> Self {
        let err = err.into();
        Task {
            fut: Box::pin(async move { Err(err) }),
        }
    }

    /// Transform the success value.
    pub fn map<U: Send + 'static>(self, f: impl FnOnce(T) -> U + Send + 'static) -> Task<U> {
        Task {
            fut: Box::pin(async move { self.fut.await.map(f) }),
        }
    }

    /// Transform the error.
    pub fn map_err<E>(self, f: impl FnOnce(BoxError) -> E + Send + 'static) -> Task<T>
    where
        E: Into<BoxError>,
    {
        Task {
            fut: Box::pin(async move { self.fut.await.map_err(|err| f(err).into()) }),
        }
    }

    /// Chain a second task onto the success value.
    pub fn and_then<U: Send + 'static>(
        self,
        f: impl FnOnce(T) -> Task<U> + Send + 'static,
    ) -> Task<U> {
        Task {
            fut: Box::pin(async move {
                let value = self.fut.await?;
                f(value).fut.await
            }),
        }
    }

    /// Run two tasks concurrently, succeeding with both values.  Fails with
    /// the first error if either fails.
    pub fn zip<U: Send + 'static>(self, other: Task<U>) -> Task<(T, U)> {
        Task {
            fut: Box::pin(async move {
                let (a, b) = futures::future::join(self.fut, other.fut).await;
                Ok((a?, b?))
            }),
        }
    }

    /// Run all tasks concurrently, collecting every success in input order.
    pub fn all(tasks: impl IntoIterator<Item = Task<T>>) -> Task<Vec<T>> {
        let futs: Vec<_> = tasks.into_iter().map(|task| task.fut).collect();
        Task {
            fut: Box::pin(async move {
                futures::future::join_all(futs)
                    .await
                    .into_iter()
                    .collect::<Result<Vec<_>, _>>()
            }),
        }
    }

    /// Fail the task if it has not completed within `duration`.
    pub fn timeout(self, duration: Duration) -> Task<T> {
        Task {
            fut: Box::pin(async move {
                match tokio::time::timeout(duration, self.fut).await {
                    Ok(result) => result,
                    Err(elapsed) => Err(Box::new(elapsed) as BoxError),
                }
            }),
        }
    }

    /// Bridge a task into a command, emitting `to_msg(value)` on success.
    ///
    /// Intended for tasks that cannot fail, but there is no infallible task
    /// type and nothing enforces it: if the task does fail, the failure
    /// bypasses the message stream and fails the program through its error
    /// channel.  For a task whose failure the application wants to handle
    /// in `update`, use [`attempt`](Task::attempt) or
    /// [`attempt_with`](Task::attempt_with) instead.
    pub fn perform<Msg: Send + 'static>(
        self,
        to_msg: impl FnOnce(T) -> Msg + Send + 'static,
    ) -> Cmd<Msg> {
        Cmd {
            inner: CmdInner::Future(Box::pin(async move { self.fut.await.map(to_msg) })),
        }
    }

    /// Bridge a fallible task into a command that always emits exactly one
    /// message, success or failure.
    pub fn attempt<Msg: Send + 'static>(
        self,
        to_msg: impl FnOnce(Result<T, BoxError>) -> Msg + Send + 'static,
    ) -> Cmd<Msg> {
        Cmd {
            inner: CmdInner::Future(Box::pin(async move { Ok(to_msg(self.fut.await)) })),
        }
    }

    /// Dual-handler form of [`attempt`](Task::attempt): emits
    /// `on_success(value)` or `on_failure(error)`.  Never fails.
    pub fn attempt_with<Msg: Send + 'static>(
        self,
        on_success: impl FnOnce(T) -> Msg + Send + 'static,
        on_failure: impl FnOnce(BoxError) -> Msg + Send + 'static,
    ) -> Cmd<Msg> {
        Cmd {
            inner: CmdInner::Future(Box::pin(async move {
                Ok(match self.fut.await {
                    Ok(value) => on_success(value),
                    Err(err) => on_failure(err),
                })
            })),
        }
    }
}

impl<T: Send + 'static> IntoFuture for Task<T> {
    type Output = Result<T, BoxError>;
    type IntoFuture = BoxFuture<'static, Result<T, BoxError>>;

    fn into_future(self) -> Self::IntoFuture {
        self.fut
    }
}
