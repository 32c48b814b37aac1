use crate::BoxError;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;

/// An ongoing source of messages derived from the current model.
///
/// Structurally a `Sub` is the same thing as a [`Cmd`](crate::Cmd) -- a lazy
/// stream of messages that may fail -- but its intent differs: a subscription
/// keeps producing messages for as long as it is active, and the runtime
/// cancels it whenever the model changes (see the switching rule on
/// [`Model::subscriptions`](crate::Model::subscriptions)).  Cancelling an
/// activation releases every listener it registered.
///
/// # Examples
///
/// ```rust,ignore
/// fn subscriptions(&self) -> Sub<Msg> {
///     if self.running {
///         Sub::interval(Duration::from_secs(1), Msg::Tick)
///     } else {
///         Sub::none()
///     }
/// }
/// ```
pub struct Sub<Msg: Send + 'static> {
    pub(crate) inner: SubInner<Msg>,
}

pub(crate) enum SubInner<Msg: Send + 'static> {
    None,
    Stream(BoxStream<'static, Result<Msg, BoxError>>),
    Batch(Vec<Sub<Msg>>),
}

impl<Msg: Send + 'static> Sub<Msg> {
    /// The empty subscription.  Identity for [`batch`](Sub::batch).
    pub fn none() -> Self {
        Sub {
            inner: SubInner::None,
        }
    }

    /// Emit `msg` once when the subscription activates, then stay silent.
    pub fn of(msg: Msg) -> Self {
        Sub {
            inner: SubInner::Stream(Box::pin(futures::stream::once(async move { Ok(msg) }))),
        }
    }

    /// Emit every item of an iterable, in order, then stay silent.
    pub fn from_iter<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Msg>,
        I::IntoIter: Send + 'static,
    {
        Sub {
            inner: SubInner::Stream(Box::pin(futures::stream::iter(items.into_iter()).map(Ok))),
        }
    }

    /// Subscribe to a raw stream of messages.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: futures::Stream<Item = Msg> + Send + 'static,
    {
        Sub {
            inner: SubInner::Stream(Box::pin(stream.map(Ok))),
        }
    }

    /// Subscribe to a stream that may fail.  An `Err` item terminates the
    /// subscription loop with that error unless the source converts failures
    /// to messages itself.
    pub fn from_try_stream<S, E>(stream: S) -> Self
    where
        S: futures::Stream<Item = Result<Msg, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Sub {
            inner: SubInner::Stream(Box::pin(stream.map(|result| result.map_err(Into::into)))),
        }
    }

    /// A repeating timer: emits a clone of `msg` every `period`, starting one
    /// full period after activation.
    pub fn interval(period: Duration, msg: Msg) -> Self
    where
        Msg: Clone,
    {
        let stream = futures::stream::once(async move {
            let start = tokio::time::Instant::now() + period;
            tokio_stream::wrappers::IntervalStream::new(tokio::time::interval_at(start, period))
                .map(move |_| Ok(msg.clone()))
        })
        .flatten();
        Sub {
            inner: SubInner::Stream(Box::pin(stream)),
        }
    }

    /// Bridge a callback-style event source into a subscription.
    ///
    /// `register` runs when the activation is first polled -- never at
    /// construction.  It receives an [`Emit`] handle for delivering messages
    /// and must return a disposer.  The disposer runs exactly once, when the
    /// activation is cancelled or dropped.
    ///
    /// ```rust,ignore
    /// Sub::from_callback(|emit| {
    ///     let registration = event_source.on_change(move |ev| emit.emit(Msg::Changed(ev)));
    ///     move || registration.unregister()
    /// })
    /// ```
    pub fn from_callback<F, D>(register: F) -> Self
    where
        F: FnOnce(Emit<Msg>) -> D + Send + 'static,
        D: FnOnce() + Send + 'static,
    {
        Sub {
            inner: SubInner::Stream(Box::pin(CallbackStream::new(register))),
        }
    }

    /// Keep only the messages matching `pred`.  Errors pass through.
    pub fn filter(self, pred: impl Fn(&Msg) -> bool + Send + Sync + 'static) -> Sub<Msg> {
        self.filter_with(Arc::new(pred))
    }

    fn filter_with(self, pred: Arc<dyn Fn(&Msg) -> bool + Send + Sync>) -> Sub<Msg> {
        match self.inner {
            SubInner::None => Sub::none(),
            SubInner::Stream(stream) => Sub {
                inner: SubInner::Stream(Box::pin(stream.filter(move |result| {
                    let keep = match result {
                        Ok(msg) => pred(msg),
                        Err(_) => true,
                    };
                    futures::future::ready(keep)
                }))),
            },
            SubInner::Batch(subs) => Sub {
                inner: SubInner::Batch(
                    subs.into_iter()
                        .map(|sub| sub.filter_with(pred.clone()))
                        .collect(),
                ),
            },
        }
    }

    /// Transform every emitted message (for component composition).
    pub fn map<NewMsg: Send + 'static>(
        self,
        f: impl Fn(Msg) -> NewMsg + Send + Sync + 'static,
    ) -> Sub<NewMsg> {
        self.map_with(Arc::new(f))
    }

    fn map_with<NewMsg: Send + 'static>(
        self,
        f: Arc<dyn Fn(Msg) -> NewMsg + Send + Sync>,
    ) -> Sub<NewMsg> {
        match self.inner {
            SubInner::None => Sub::none(),
            SubInner::Stream(stream) => Sub {
                inner: SubInner::Stream(Box::pin(
                    stream.map(move |result| result.map(|msg| f(msg))),
                )),
            },
            SubInner::Batch(subs) => Sub {
                inner: SubInner::Batch(
                    subs.into_iter().map(|sub| sub.map_with(f.clone())).collect(),
                ),
            },
        }
    }

    /// Listen to several sources at once.  Children are merged fairly:
    /// messages arrive as each child produces them, with no cross-child
    /// ordering.  `batch([])` is [`none`](Sub::none) and `batch([s])` is `s`.
    pub fn batch(subs: impl IntoIterator<Item = Sub<Msg>>) -> Self {
        let subs: Vec<_> = subs.into_iter().collect();
        if subs.is_empty() {
            return Sub::none();
        }
        if subs.len() == 1 {
            let mut subs = subs;
            return subs.pop().unwrap();
        }
        Sub {
            inner: SubInner::Batch(subs),
        }
    }

    /// Returns `true` if this is the empty subscription.
    pub fn is_none(&self) -> bool {
        matches!(self.inner, SubInner::None)
    }

    /// Flatten one activation into a single stream.  Dropping the stream
    /// cancels the activation and runs any callback disposers.
    pub(crate) fn into_stream(self) -> BoxStream<'static, Result<Msg, BoxError>> {
        match self.inner {
            SubInner::None => Box::pin(futures::stream::empty()),
            SubInner::Stream(stream) => stream,
            SubInner::Batch(subs) => Box::pin(futures::stream::select_all(
                subs.into_iter().map(Sub::into_stream),
            )),
        }
    }
}

/// Handle given to a [`Sub::from_callback`] registration for delivering
/// messages into the subscription.
///
/// `Emit` is cheap to clone and safe to move into callbacks or other threads.
/// Messages emitted after the subscription is cancelled are discarded.
pub struct Emit<Msg: Send + 'static> {
    tx: mpsc::UnboundedSender<Msg>,
}

impl<Msg: Send + 'static> Clone for Emit<Msg> {
    fn clone(&self) -> Self {
        Emit {
            tx: self.tx.clone(),
        }
    }
}

impl<Msg: Send + 'static> Emit<Msg> {
    /// Deliver a message to the subscription.
    pub fn emit(&self, msg: Msg) {
        let _ = self.tx.send(msg);
    }
}

type Register<Msg> = Box<dyn FnOnce(Emit<Msg>) -> Disposer + Send>;
type Disposer = Box<dyn FnOnce() + Send>;

/// Stream backing [`Sub::from_callback`].  Registration is deferred to the
/// first poll; the disposer runs exactly once, on drop.
struct CallbackStream<Msg: Send + 'static> {
    register: Option<Register<Msg>>,
    rx: Option<mpsc::UnboundedReceiver<Msg>>,
    disposer: Option<Disposer>,
}

impl<Msg: Send + 'static> CallbackStream<Msg> {
    fn new<F, D>(register: F) -> Self
    where
        F: FnOnce(Emit<Msg>) -> D + Send + 'static,
        D: FnOnce() + Send + 'static,
    {
        CallbackStream {
            register: Some(Box::new(move |emit| Box::new(register(emit)) as Disposer)),
            rx: None,
            disposer: None,
        }
    }
}

impl<Msg: Send + 'static> futures::Stream for CallbackStream<Msg> {
    type Item = Result<Msg, BoxError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(register) = this.register.take() {
            let (tx, rx) = mpsc::unbounded_channel();
            this.rx = Some(rx);
            this.disposer = Some(register(Emit { tx }));
        }
        match this.rx.as_mut() {
            Some(rx) => rx.poll_recv(cx).map(|opt| opt.map(Ok)),
            None => Poll::Ready(None),
        }
    }
}

impl<Msg: Send + 'static> Drop for CallbackStream<Msg> {
    fn drop(&mut self) {
        if let Some(disposer) = self.disposer.take() {
            disposer();
        }
    }
}
