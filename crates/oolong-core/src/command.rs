use crate::BoxError;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A side effect returned from [`Model::update`](crate::Model::update) or
/// [`Model::init`](crate::Model::init).
///
/// A `Cmd` is a pure description: constructing one performs no work.  When the
/// runtime executes it, the command produces a lazy sequence of messages --
/// zero, one, or many -- that are fed back into the update loop.  A command
/// may also fail; unhandled failures surface on the program's error channel
/// (see [`ProgramError::Command`](crate::ProgramError::Command)).  To recover
/// from a failure inside `update` instead, convert it to a message first with
/// [`Task::attempt`](crate::Task::attempt) or
/// [`Task::attempt_with`](crate::Task::attempt_with).
///
/// # Examples
///
/// ```rust,ignore
/// // Do nothing:
/// let cmd = Cmd::none();
///
/// // Emit a message immediately:
/// let cmd = Cmd::of(Msg::Refresh);
///
/// // Run an async effect and map the result to a message:
/// let cmd = Cmd::perform(async { fetch_data().await }, Msg::DataLoaded);
///
/// // Run several effects concurrently:
/// let cmd = Cmd::batch([save(), reload()]);
/// ```
pub struct Cmd<Msg: Send + 'static> {
    pub(crate) inner: CmdInner<Msg>,
}

pub(crate) enum CmdInner<Msg: Send + 'static> {
    None,
    Msg(Msg),
    Future(BoxFuture<'static, Result<Msg, BoxError>>),
    Stream(BoxStream<'static, Result<Msg, BoxError>>),
    Batch(Vec<Cmd<Msg>>),
    Sequence(Vec<Cmd<Msg>>),
}

impl<Msg: Send + 'static> Cmd<Msg> {
    /// No-op command.  Identity for [`batch`](Cmd::batch): emits nothing.
    pub fn none() -> Self {
        Cmd {
            inner: CmdInner::None,
        }
    }

    /// Emit `msg` exactly once, synchronously when the command is executed.
    ///
    /// A message produced this way inside `update` is enqueued behind the
    /// message currently being processed; the emitting `update` invocation
    /// never observes it.
    pub fn of(msg: Msg) -> Self {
        Cmd {
            inner: CmdInner::Msg(msg),
        }
    }

    /// Run a fallible async effect.  On success its result is emitted once;
    /// on failure the error propagates to the program's error channel.
    pub fn from_effect<F, E>(effect: F) -> Self
    where
        F: Future<Output = Result<Msg, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Cmd {
            inner: CmdInner::Future(Box::pin(async move { effect.await.map_err(Into::into) })),
        }
    }

    /// Run an infallible async future, mapping its output to a message.
    pub fn perform<F, T>(future: F, map: impl FnOnce(T) -> Msg + Send + 'static) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Cmd {
            inner: CmdInner::Future(Box::pin(async move { Ok(map(future.await)) })),
        }
    }

    /// Emit every item of a stream as a message, in stream order.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: futures::Stream<Item = Msg> + Send + 'static,
    {
        use futures::StreamExt;
        Cmd {
            inner: CmdInner::Stream(Box::pin(stream.map(Ok))),
        }
    }

    /// One-shot timer: fires once after `duration`, mapping the instant to a
    /// message.
    pub fn tick(duration: Duration, map: impl FnOnce(Instant) -> Msg + Send + 'static) -> Self {
        Cmd {
            inner: CmdInner::Future(Box::pin(async move {
                tokio::time::sleep(duration).await;
                Ok(map(Instant::now()))
            })),
        }
    }

    /// Run multiple commands concurrently.
    ///
    /// Messages are emitted as they become available from any child; there is
    /// no ordering between messages originating from different children, but
    /// every message each child would individually deliver is delivered.
    /// `batch([])` is [`none`](Cmd::none) and `batch([c])` is `c`.
    pub fn batch(cmds: impl IntoIterator<Item = Cmd<Msg>>) -> Self {
        let cmds: Vec<_> = cmds.into_iter().collect();
        if cmds.is_empty() {
            return Cmd::none();
        }
        if cmds.len() == 1 {
            let mut cmds = cmds;
            return cmds.pop().unwrap();
        }
        Cmd {
            inner: CmdInner::Batch(cmds),
        }
    }

    /// Run commands sequentially — each command's messages are delivered
    /// before the next command starts.
    pub fn sequence(cmds: impl IntoIterator<Item = Cmd<Msg>>) -> Self {
        let cmds: Vec<_> = cmds.into_iter().collect();
        if cmds.is_empty() {
            return Cmd::none();
        }
        if cmds.len() == 1 {
            let mut cmds = cmds;
            return cmds.pop().unwrap();
        }
        Cmd {
            inner: CmdInner::Sequence(cmds),
        }
    }

    /// Transform every emitted message, preserving cardinality and order
    /// (for component composition).
    pub fn map<NewMsg: Send + 'static>(
        self,
        f: impl Fn(Msg) -> NewMsg + Send + Sync + 'static,
    ) -> Cmd<NewMsg> {
        self.map_with(Arc::new(f))
    }

    fn map_with<NewMsg: Send + 'static>(
        self,
        f: Arc<dyn Fn(Msg) -> NewMsg + Send + Sync>,
    ) -> Cmd<NewMsg> {
        use futures::StreamExt;
        match self.inner {
            CmdInner::None => Cmd::none(),
            CmdInner::Msg(msg) => Cmd::of(f(msg)),
            CmdInner::Future(fut) => Cmd {
                inner: CmdInner::Future(Box::pin(async move { fut.await.map(|msg| f(msg)) })),
            },
            CmdInner::Stream(stream) => Cmd {
                inner: CmdInner::Stream(Box::pin(
                    stream.map(move |result| result.map(|msg| f(msg))),
                )),
            },
            CmdInner::Batch(cmds) => Cmd {
                inner: CmdInner::Batch(
                    cmds.into_iter().map(|cmd| cmd.map_with(f.clone())).collect(),
                ),
            },
            CmdInner::Sequence(cmds) => Cmd {
                inner: CmdInner::Sequence(
                    cmds.into_iter().map(|cmd| cmd.map_with(f.clone())).collect(),
                ),
            },
        }
    }

    // --- Inspection methods (useful for testing) ---

    /// Returns `true` if this is a no-op command.
    pub fn is_none(&self) -> bool {
        matches!(self.inner, CmdInner::None)
    }

    /// If this command is a synchronous message, return it.
    pub fn into_msg(self) -> Option<Msg> {
        match self.inner {
            CmdInner::Msg(msg) => Some(msg),
            _ => None,
        }
    }

    /// If this command is a batch, return the inner commands.
    pub fn into_batch(self) -> Option<Vec<Cmd<Msg>>> {
        match self.inner {
            CmdInner::Batch(cmds) => Some(cmds),
            _ => None,
        }
    }
}
