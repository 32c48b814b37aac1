use crate::cell::{ModelCell, ModelStream};
use crate::command::{Cmd, CmdInner};
use crate::model::Model;
use crate::subscription::Sub;
use crate::BoxError;
use futures::future::BoxFuture;
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use std::task::Poll;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Errors that can terminate a running [`Program`].
///
/// The expected pattern is to convert effect failures to messages at the
/// boundary ([`Task::attempt`](crate::Task::attempt),
/// [`Task::attempt_with`](crate::Task::attempt_with)) and handle them in
/// `update`; these variants exist for the failures an application declined
/// to handle there.  The first failure wins, cancels the program scope, and
/// is reported by [`Program::join`] or [`Program::run_with`].
#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    /// A command failed and the failure was not converted to a message.
    #[error("command failed: {0}")]
    Command(#[source] BoxError),
    /// The active subscription failed; the subscription loop terminates.
    #[error("subscription failed: {0}")]
    Subscription(#[source] BoxError),
    /// Application code panicked inside one of the runtime loops.
    #[error("application code panicked in the {0} loop")]
    Panicked(&'static str),
}

/// Configuration options for a [`Program`].
///
/// Use struct update syntax to override only the options you need:
///
/// ```rust,ignore
/// let opts = ProgramOptions { model_capacity: 64, ..ProgramOptions::default() };
/// ```
pub struct ProgramOptions {
    /// Capacity of the model fan-out channel (default: 1024).  A
    /// [`models`](Program::models) subscriber that falls further behind than
    /// this many writes skips ahead to the oldest retained value.
    pub model_capacity: usize,
}

impl Default for ProgramOptions {
    fn default() -> Self {
        Self {
            model_capacity: 1024,
        }
    }
}

/// The program's supervision scope: one cancellation token shared by every
/// fiber the program owns, plus the first-failure slot.
struct Scope {
    token: CancellationToken,
    failure: Arc<Mutex<Option<ProgramError>>>,
}

impl Clone for Scope {
    fn clone(&self) -> Self {
        Scope {
            token: self.token.clone(),
            failure: self.failure.clone(),
        }
    }
}

impl Scope {
    fn new() -> Self {
        Scope {
            token: CancellationToken::new(),
            failure: Arc::new(Mutex::new(None)),
        }
    }

    fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn cancel(&self) {
        self.token.cancel();
    }

    /// Record the first failure and cancel the scope.  Later failures are
    /// dropped; the scope is already going down.
    fn fail(&self, err: ProgramError) {
        let mut slot = self.failure.lock().unwrap();
        if slot.is_none() {
            log::debug!("program failing: {err}");
            *slot = Some(err);
        }
        drop(slot);
        self.token.cancel();
    }

    fn take_failure(&self) -> Option<ProgramError> {
        self.failure.lock().unwrap().take()
    }
}

/// A cloneable handle to a running [`Program`] for external control.
///
/// `Dispatch` can be sent across threads, moved into async tasks, or handed
/// to a view layer.  [`send`](Dispatch::send) enqueues a message for the
/// update loop; [`shutdown`](Dispatch::shutdown) tears the program down.
/// Obtain one with [`Program::dispatcher`].
pub struct Dispatch<Msg: Send + 'static> {
    msg_tx: mpsc::UnboundedSender<Msg>,
    scope: Scope,
}

impl<Msg: Send + 'static> Clone for Dispatch<Msg> {
    fn clone(&self) -> Self {
        Dispatch {
            msg_tx: self.msg_tx.clone(),
            scope: self.scope.clone(),
        }
    }
}

impl<Msg: Send + 'static> Dispatch<Msg> {
    /// Enqueue a message for the update loop.
    ///
    /// Non-blocking: returns once the message is in the queue, without
    /// waiting for it to be processed.  Safe to call from any context.
    /// After shutdown this is a silent no-op.
    pub fn send(&self, msg: Msg) {
        if self.scope.is_cancelled() {
            return;
        }
        let _ = self.msg_tx.send(msg);
    }

    /// Shut the program down.  Idempotent.
    pub fn shutdown(&self) {
        self.scope.cancel();
    }
}

/// A running Model-Update-Subscription program.
///
/// `Program` owns the reactive model cell, the message queue, and the two
/// long-running fibers that drive the application: the **update loop**
/// (single consumer of the queue, sole writer of the model) and the
/// **subscription loop** (switches the active [`Sub`] whenever the model
/// changes).  Commands returned by `update` each run on their own short-lived
/// fiber.  Everything is owned by one cancellation scope: calling
/// [`shutdown`](Program::shutdown) -- or dropping the `Program` -- interrupts
/// every fiber and runs all subscription disposers.
///
/// A program moves through `Starting -> Running -> ShuttingDown ->
/// Terminated`; `Terminated` is absorbing: [`dispatch`](Program::dispatch)
/// becomes a no-op and [`models`](Program::models) streams end.
///
/// # Example
///
/// ```rust,ignore
/// let program = Program::<Counter>::new();
/// let dispatch = program.dispatcher();
/// dispatch.send(Msg::Increment);
/// let final_model = program.run_with(|m| println!("count: {}", m.count)).await?;
/// ```
pub struct Program<M: Model> {
    msg_tx: mpsc::UnboundedSender<M::Message>,
    cell: Arc<ModelCell<M>>,
    scope: Scope,
    update_task: JoinHandle<()>,
    sub_task: JoinHandle<()>,
    guard: DropGuard,
}

impl<M: Model> Program<M> {
    /// Start a program that needs no external bootstrap parameters.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self
    where
        M: Model<Flags = ()>,
    {
        Self::with_options((), ProgramOptions::default())
    }

    /// Start a program from external bootstrap parameters (flags).
    pub fn with_flags(flags: M::Flags) -> Self {
        Self::with_options(flags, ProgramOptions::default())
    }

    /// Start a program with custom options.
    ///
    /// Construction does not block on the initial command: the command is
    /// handed to the executor and its messages are processed like any
    /// others, after the program is running.
    pub fn with_options(flags: M::Flags, options: ProgramOptions) -> Self {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (model, init_cmd) = M::init(flags);
        let cell = Arc::new(ModelCell::new(model.clone(), options.model_capacity));
        let scope = Scope::new();

        log::debug!("program starting");
        spawn_command(init_cmd, &msg_tx, &scope);

        let update_task = tokio::spawn(update_loop(
            model,
            msg_rx,
            msg_tx.clone(),
            cell.clone(),
            scope.clone(),
        ));
        let sub_task = tokio::spawn(subscription_loop::<M>(
            cell.changes(),
            msg_tx.clone(),
            scope.clone(),
        ));
        let guard = scope.token.clone().drop_guard();

        Program {
            msg_tx,
            cell,
            scope,
            update_task,
            sub_task,
            guard,
        }
    }

    /// Enqueue a message for the update loop.
    ///
    /// Non-blocking and safe to call from any context; after shutdown this
    /// is a silent no-op.
    pub fn dispatch(&self, msg: M::Message) {
        if self.scope.is_cancelled() {
            return;
        }
        let _ = self.msg_tx.send(msg);
    }

    /// Get a cloneable [`Dispatch`] handle for external message injection
    /// and shutdown.
    pub fn dispatcher(&self) -> Dispatch<M::Message> {
        Dispatch {
            msg_tx: self.msg_tx.clone(),
            scope: self.scope.clone(),
        }
    }

    /// Read the current model.
    pub fn model(&self) -> M {
        self.cell.current()
    }

    /// Subscribe to the model: the current value immediately, then every
    /// subsequent distinct write, in write order.  Any number of
    /// subscribers may be attached; each gets the full sequence from the
    /// point it subscribed.
    pub fn models(&self) -> ModelStream<M> {
        self.cell.subscribe()
    }

    /// Shut the program down: interrupt both loops and every in-flight
    /// command fiber, and run all subscription disposers.  Idempotent;
    /// reports nothing.
    pub fn shutdown(&self) {
        log::debug!("shutting down");
        self.scope.cancel();
    }

    /// Wait for the program to terminate, then return the final model.
    ///
    /// Blocks until [`shutdown`](Program::shutdown) is called (from this
    /// handle or a [`Dispatch`]) or the program fails.  The first runtime
    /// failure -- an unhandled command error, a subscription error, or a
    /// panic in application code -- is returned as the error.
    pub async fn join(self) -> Result<M, ProgramError> {
        let Program {
            cell,
            scope,
            update_task,
            sub_task,
            guard,
            ..
        } = self;
        if update_task.await.is_err() {
            scope.fail(ProgramError::Panicked("update"));
        }
        if sub_task.await.is_err() {
            scope.fail(ProgramError::Panicked("subscription"));
        }
        drop(guard);
        log::debug!("program terminated");
        match scope.take_failure() {
            Some(err) => Err(err),
            None => Ok(cell.current()),
        }
    }

    /// Drain every model the program publishes into a callback, then return
    /// the final model once the program terminates.
    ///
    /// Models already published when shutdown arrives are still delivered.
    pub async fn run_with(self, mut on_model: impl FnMut(M)) -> Result<M, ProgramError> {
        let mut models = self.models();
        loop {
            tokio::select! {
                biased;
                _ = self.scope.cancelled() => break,
                maybe = models.next() => match maybe {
                    Some(model) => on_model(model),
                    None => break,
                },
            }
        }
        while let Poll::Ready(Some(model)) = futures::poll!(models.next()) {
            on_model(model);
        }
        self.join().await
    }
}

/// The single-consumer update loop.  Owns the authoritative model: every
/// `update` call observes the state written by the immediately preceding
/// one.  Messages are processed in strict queue order.
async fn update_loop<M: Model>(
    mut model: M,
    mut msg_rx: mpsc::UnboundedReceiver<M::Message>,
    msg_tx: mpsc::UnboundedSender<M::Message>,
    cell: Arc<ModelCell<M>>,
    scope: Scope,
) {
    loop {
        let msg = tokio::select! {
            biased;
            _ = scope.cancelled() => break,
            maybe = msg_rx.recv() => match maybe {
                Some(msg) => msg,
                None => break,
            },
        };
        let cmd = model.update(msg);
        cell.publish(&model);
        spawn_command(cmd, &msg_tx, &scope);
    }
}

/// The subscription loop: reacts to model changes, not to messages.
///
/// For each distinct model the previous activation is cancelled and awaited
/// (so its disposers have run) before the next one starts -- switch-latest,
/// never concatenation.  Exactly one subscription is active at any time.
/// The initial model counts as a change, so the subscription derived from it
/// activates on startup.
async fn subscription_loop<M: Model>(
    mut changes: watch::Receiver<M>,
    msg_tx: mpsc::UnboundedSender<M::Message>,
    scope: Scope,
) {
    let mut active: Option<Activation> = None;
    loop {
        tokio::select! {
            biased;
            _ = scope.cancelled() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let model = changes.borrow_and_update().clone();
                if let Some(activation) = active.take() {
                    activation.cancel_and_wait().await;
                }
                if scope.is_cancelled() {
                    break;
                }
                log::trace!("switching subscription");
                active = Some(activate::<M>(model.subscriptions(), &msg_tx, &scope));
            }
        }
    }
    if let Some(activation) = active.take() {
        activation.cancel_and_wait().await;
    }
}

/// One running subscription activation.
struct Activation {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Activation {
    /// Cancel the activation and wait for its fiber to finish, which
    /// guarantees its disposers have run.
    async fn cancel_and_wait(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}

fn activate<M: Model>(
    sub: Sub<M::Message>,
    msg_tx: &mpsc::UnboundedSender<M::Message>,
    scope: &Scope,
) -> Activation {
    let token = scope.child_token();
    let worker_token = token.clone();
    let tx = msg_tx.clone();
    let scope = scope.clone();
    let handle = tokio::spawn(async move {
        let mut stream = sub.into_stream();
        loop {
            tokio::select! {
                biased;
                _ = worker_token.cancelled() => break,
                item = stream.next() => match item {
                    Some(Ok(msg)) => {
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Some(Err(err)) => {
                        scope.fail(ProgramError::Subscription(err));
                        break;
                    }
                    None => break,
                },
            }
        }
        // The stream drops here, which runs any callback disposers.
    });
    Activation { token, handle }
}

/// Execute a command.  Synchronous messages are enqueued directly; batches
/// fan out recursively; everything else gets its own fiber, owned by the
/// program scope and interrupted at teardown.  An error emitted by a
/// command fails the program.
fn spawn_command<Msg: Send + 'static>(
    cmd: Cmd<Msg>,
    msg_tx: &mpsc::UnboundedSender<Msg>,
    scope: &Scope,
) {
    match cmd.inner {
        CmdInner::None => {}
        CmdInner::Msg(msg) => {
            let _ = msg_tx.send(msg);
        }
        CmdInner::Batch(cmds) => {
            for cmd in cmds {
                spawn_command(cmd, msg_tx, scope);
            }
        }
        inner @ (CmdInner::Future(_) | CmdInner::Stream(_) | CmdInner::Sequence(_)) => {
            let tx = msg_tx.clone();
            let scope = scope.clone();
            tokio::spawn(async move {
                run_command(Cmd { inner }, &tx, &scope).await;
            });
        }
    }
}

/// Drive one command to completion on the current fiber, respecting
/// cancellation.  Used both for spawned commands and for the children of a
/// [`Cmd::sequence`], where each child must finish before the next starts.
fn run_command<'a, Msg: Send + 'static>(
    cmd: Cmd<Msg>,
    tx: &'a mpsc::UnboundedSender<Msg>,
    scope: &'a Scope,
) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        match cmd.inner {
            CmdInner::None => {}
            CmdInner::Msg(msg) => {
                let _ = tx.send(msg);
            }
            CmdInner::Future(fut) => {
                tokio::select! {
                    biased;
                    _ = scope.cancelled() => {}
                    result = fut => match result {
                        Ok(msg) => {
                            let _ = tx.send(msg);
                        }
                        Err(err) => scope.fail(ProgramError::Command(err)),
                    },
                }
            }
            CmdInner::Stream(stream) => {
                futures::pin_mut!(stream);
                loop {
                    tokio::select! {
                        biased;
                        _ = scope.cancelled() => break,
                        item = stream.next() => match item {
                            Some(Ok(msg)) => {
                                if tx.send(msg).is_err() {
                                    break;
                                }
                            }
                            Some(Err(err)) => {
                                scope.fail(ProgramError::Command(err));
                                break;
                            }
                            None => break,
                        },
                    }
                }
            }
            CmdInner::Batch(cmds) => {
                // A batch nested in a sequence runs concurrently within
                // itself; the sequence waits for all of it.
                let handles: Vec<_> = cmds
                    .into_iter()
                    .map(|cmd| {
                        let tx = tx.clone();
                        let scope = scope.clone();
                        tokio::spawn(async move {
                            run_command(cmd, &tx, &scope).await;
                        })
                    })
                    .collect();
                for handle in handles {
                    let _ = handle.await;
                }
            }
            CmdInner::Sequence(cmds) => {
                for cmd in cmds {
                    if scope.is_cancelled() {
                        break;
                    }
                    run_command(cmd, tx, scope).await;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Task;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Clone, PartialEq, Debug)]
    struct Counter {
        count: i64,
    }

    #[derive(Debug)]
    enum CounterMsg {
        Increment,
        Decrement,
        Reset,
        Set(i64),
    }

    impl Model for Counter {
        type Message = CounterMsg;
        type Flags = i64;

        fn init(initial: i64) -> (Self, Cmd<CounterMsg>) {
            (Counter { count: initial }, Cmd::none())
        }

        fn update(&mut self, msg: CounterMsg) -> Cmd<CounterMsg> {
            match msg {
                CounterMsg::Increment => self.count += 1,
                CounterMsg::Decrement => self.count -= 1,
                CounterMsg::Reset => self.count = 0,
                CounterMsg::Set(n) => self.count = n,
            }
            Cmd::none()
        }
    }

    #[tokio::test]
    async fn counter_models_arrive_in_update_order() {
        let program = Program::<Counter>::with_flags(0);
        let models = program.models();
        program.dispatch(CounterMsg::Increment);
        program.dispatch(CounterMsg::Increment);
        program.dispatch(CounterMsg::Increment);
        program.dispatch(CounterMsg::Decrement);
        program.dispatch(CounterMsg::Reset);

        let seen: Vec<i64> = models.take(6).map(|m| m.count).collect().await;
        assert_eq!(seen, vec![0, 1, 2, 3, 2, 0]);

        program.shutdown();
        program.join().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_dispatch_folds_every_message() {
        let program = Program::<Counter>::with_flags(0);
        let mut senders = Vec::new();
        for _ in 0..4 {
            let dispatch = program.dispatcher();
            senders.push(tokio::spawn(async move {
                for _ in 0..25 {
                    dispatch.send(CounterMsg::Increment);
                }
            }));
        }
        for sender in senders {
            sender.await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(program.model().count, 100);

        program.shutdown();
        program.join().await.unwrap();
    }

    #[tokio::test]
    async fn late_subscriber_sees_current_model() {
        let program = Program::<Counter>::with_flags(0);
        program.dispatch(CounterMsg::Set(9));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut models = program.models();
        assert_eq!(models.next().await.unwrap().count, 9);

        program.shutdown();
        program.join().await.unwrap();
    }

    #[tokio::test]
    async fn dispatch_after_shutdown_is_discarded() {
        let program = Program::<Counter>::with_flags(0);
        program.shutdown();
        program.dispatch(CounterMsg::Increment);
        let final_model = program.join().await.unwrap();
        assert_eq!(final_model.count, 0);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let program = Program::<Counter>::with_flags(3);
        program.shutdown();
        program.shutdown();
        program.dispatcher().shutdown();
        let final_model = program.join().await.unwrap();
        assert_eq!(final_model.count, 3);
    }

    #[tokio::test]
    async fn run_with_drains_models_until_shutdown() {
        let program = Program::<Counter>::with_flags(0);
        let dispatch = program.dispatcher();
        dispatch.send(CounterMsg::Increment);
        dispatch.send(CounterMsg::Increment);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            dispatch.shutdown();
        });

        let mut seen = Vec::new();
        let final_model = program.run_with(|m| seen.push(m.count)).await.unwrap();
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(final_model.count, 2);
    }

    // Initial command: the model transitions through init state first.
    #[derive(Clone, PartialEq, Debug)]
    struct InitCmd {
        count: i64,
    }

    impl Model for InitCmd {
        type Message = CounterMsg;
        type Flags = ();

        fn init(_: ()) -> (Self, Cmd<CounterMsg>) {
            (InitCmd { count: 0 }, Cmd::of(CounterMsg::Set(42)))
        }

        fn update(&mut self, msg: CounterMsg) -> Cmd<CounterMsg> {
            if let CounterMsg::Set(n) = msg {
                self.count = n;
            }
            Cmd::none()
        }
    }

    #[tokio::test]
    async fn initial_command_runs_without_blocking_construction() {
        let program = Program::<InitCmd>::new();
        let models = program.models();
        let seen: Vec<i64> = models.take(2).map(|m| m.count).collect().await;
        assert_eq!(seen, vec![0, 42]);

        program.shutdown();
        program.join().await.unwrap();
    }

    // Batch fairness: every child's message reaches update.
    #[derive(Clone, PartialEq, Debug, Default)]
    struct Collector {
        got: Vec<String>,
    }

    #[derive(Debug)]
    enum CollectorMsg {
        Start,
        Seq,
        Got(String),
    }

    impl Model for Collector {
        type Message = CollectorMsg;
        type Flags = ();

        fn init(_: ()) -> (Self, Cmd<CollectorMsg>) {
            (Collector::default(), Cmd::none())
        }

        fn update(&mut self, msg: CollectorMsg) -> Cmd<CollectorMsg> {
            match msg {
                CollectorMsg::Start => Cmd::batch(vec![
                    Cmd::of(CollectorMsg::Got("a".into())),
                    Cmd::of(CollectorMsg::Got("b".into())),
                ]),
                CollectorMsg::Seq => Cmd::sequence(vec![
                    Cmd::of(CollectorMsg::Got("1".into())),
                    Cmd::perform(tokio::time::sleep(Duration::from_millis(10)), |_| {
                        CollectorMsg::Got("2".into())
                    }),
                    Cmd::of(CollectorMsg::Got("3".into())),
                ]),
                CollectorMsg::Got(s) => {
                    self.got.push(s);
                    Cmd::none()
                }
            }
        }
    }

    #[tokio::test]
    async fn batch_delivers_every_message() {
        let program = Program::<Collector>::new();
        program.dispatch(CollectorMsg::Start);
        tokio::time::sleep(Duration::from_millis(30)).await;

        let mut got = program.model().got;
        got.sort_unstable();
        assert_eq!(got, vec!["a".to_string(), "b".to_string()]);

        program.shutdown();
        program.join().await.unwrap();
    }

    #[tokio::test]
    async fn sequence_delivers_in_order() {
        let program = Program::<Collector>::new();
        program.dispatch(CollectorMsg::Seq);
        tokio::time::sleep(Duration::from_millis(80)).await;

        let got = program.model().got;
        assert_eq!(
            got,
            vec!["1".to_string(), "2".to_string(), "3".to_string()]
        );

        program.shutdown();
        program.join().await.unwrap();
    }

    // Subscription switching: an interval that disables itself after the
    // first tick fires exactly once.
    #[derive(Clone, PartialEq, Debug)]
    struct Ticker {
        ticks: u32,
        running: bool,
    }

    #[derive(Debug, Clone)]
    enum TickerMsg {
        Tick,
    }

    impl Model for Ticker {
        type Message = TickerMsg;
        type Flags = ();

        fn init(_: ()) -> (Self, Cmd<TickerMsg>) {
            (
                Ticker {
                    ticks: 0,
                    running: true,
                },
                Cmd::none(),
            )
        }

        fn update(&mut self, msg: TickerMsg) -> Cmd<TickerMsg> {
            match msg {
                TickerMsg::Tick => {
                    self.ticks += 1;
                    self.running = false;
                }
            }
            Cmd::none()
        }

        fn subscriptions(&self) -> Sub<TickerMsg> {
            if self.running {
                Sub::interval(Duration::from_millis(10), TickerMsg::Tick)
            } else {
                Sub::none()
            }
        }
    }

    #[tokio::test]
    async fn subscription_switches_off_after_first_tick() {
        let program = Program::<Ticker>::new();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(program.model().ticks, 1);

        program.shutdown();
        program.join().await.unwrap();
    }

    // Disposer ordering across a switch, and release on shutdown.
    static SWITCH_EVENTS: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

    #[derive(Clone, PartialEq, Debug)]
    struct Switcher {
        stage: u8,
    }

    #[derive(Debug)]
    enum SwitcherMsg {
        Advance,
    }

    impl Model for Switcher {
        type Message = SwitcherMsg;
        type Flags = ();

        fn init(_: ()) -> (Self, Cmd<SwitcherMsg>) {
            (Switcher { stage: 0 }, Cmd::none())
        }

        fn update(&mut self, msg: SwitcherMsg) -> Cmd<SwitcherMsg> {
            match msg {
                SwitcherMsg::Advance => self.stage += 1,
            }
            Cmd::none()
        }

        fn subscriptions(&self) -> Sub<SwitcherMsg> {
            let (start, stop) = match self.stage {
                0 => ("start-0", "stop-0"),
                _ => ("start-1", "stop-1"),
            };
            Sub::from_callback(move |_emit| {
                SWITCH_EVENTS.lock().unwrap().push(start);
                move || SWITCH_EVENTS.lock().unwrap().push(stop)
            })
        }
    }

    #[tokio::test]
    async fn switch_cancels_previous_before_activating_next() {
        let program = Program::<Switcher>::new();
        tokio::time::sleep(Duration::from_millis(20)).await;
        program.dispatch(SwitcherMsg::Advance);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(
            *SWITCH_EVENTS.lock().unwrap(),
            vec!["start-0", "stop-0", "start-1"]
        );

        program.shutdown();
        program.join().await.unwrap();
        assert_eq!(
            *SWITCH_EVENTS.lock().unwrap(),
            vec!["start-0", "stop-0", "start-1", "stop-1"]
        );
    }

    // Shutdown releases callback registrations.
    static CB_ACTIVE: AtomicUsize = AtomicUsize::new(0);

    #[derive(Clone, PartialEq, Debug)]
    struct CallbackHolder;

    impl Model for CallbackHolder {
        type Message = ();
        type Flags = ();

        fn init(_: ()) -> (Self, Cmd<()>) {
            (CallbackHolder, Cmd::none())
        }

        fn update(&mut self, _: ()) -> Cmd<()> {
            Cmd::none()
        }

        fn subscriptions(&self) -> Sub<()> {
            Sub::from_callback(|_emit| {
                CB_ACTIVE.fetch_add(1, Ordering::SeqCst);
                || {
                    CB_ACTIVE.fetch_sub(1, Ordering::SeqCst);
                }
            })
        }
    }

    #[tokio::test]
    async fn shutdown_runs_callback_disposers() {
        let program = Program::<CallbackHolder>::new();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(CB_ACTIVE.load(Ordering::SeqCst), 1);

        program.shutdown();
        program.join().await.unwrap();
        assert_eq!(CB_ACTIVE.load(Ordering::SeqCst), 0);
    }

    // Error channel: unconverted failures fail the program; converted ones
    // become ordinary messages.
    #[derive(Clone, PartialEq, Debug, Default)]
    struct Fallible {
        errors: Vec<String>,
    }

    #[derive(Debug)]
    enum FallibleMsg {
        CrashingLoad,
        RecoveringLoad,
        Loaded,
        Failed(String),
    }

    impl Model for Fallible {
        type Message = FallibleMsg;
        type Flags = ();

        fn init(_: ()) -> (Self, Cmd<FallibleMsg>) {
            (Fallible::default(), Cmd::none())
        }

        fn update(&mut self, msg: FallibleMsg) -> Cmd<FallibleMsg> {
            match msg {
                FallibleMsg::CrashingLoad => {
                    Task::<i32>::fail("oops").perform(|_| FallibleMsg::Loaded)
                }
                FallibleMsg::RecoveringLoad => Task::<i32>::fail("oops").attempt_with(
                    |_| FallibleMsg::Loaded,
                    |e| FallibleMsg::Failed(e.to_string()),
                ),
                FallibleMsg::Loaded => Cmd::none(),
                FallibleMsg::Failed(e) => {
                    self.errors.push(e);
                    Cmd::none()
                }
            }
        }
    }

    #[tokio::test]
    async fn unhandled_command_error_fails_the_program() {
        let program = Program::<Fallible>::new();
        program.dispatch(FallibleMsg::CrashingLoad);
        let err = program.join().await.unwrap_err();
        assert!(matches!(err, ProgramError::Command(_)));
    }

    #[tokio::test]
    async fn attempt_with_converts_failure_to_message() {
        let program = Program::<Fallible>::new();
        let models = program.models();
        program.dispatch(FallibleMsg::RecoveringLoad);

        let with_error = models
            .filter(|m| futures::future::ready(!m.errors.is_empty()))
            .next()
            .await
            .unwrap();
        assert_eq!(with_error.errors, vec!["oops".to_string()]);

        program.shutdown();
        program.join().await.unwrap();
    }

    #[derive(Clone, PartialEq, Debug)]
    struct BrokenSub;

    impl Model for BrokenSub {
        type Message = ();
        type Flags = ();

        fn init(_: ()) -> (Self, Cmd<()>) {
            (BrokenSub, Cmd::none())
        }

        fn update(&mut self, _: ()) -> Cmd<()> {
            Cmd::none()
        }

        fn subscriptions(&self) -> Sub<()> {
            Sub::from_try_stream(futures::stream::once(async { Err::<(), _>("bad source") }))
        }
    }

    #[tokio::test]
    async fn subscription_error_fails_the_program() {
        let program = Program::<BrokenSub>::new();
        let err = program.join().await.unwrap_err();
        assert!(matches!(err, ProgramError::Subscription(_)));
    }

    #[derive(Clone, PartialEq, Debug)]
    struct PanicsOnUpdate;

    impl Model for PanicsOnUpdate {
        type Message = ();
        type Flags = ();

        fn init(_: ()) -> (Self, Cmd<()>) {
            (PanicsOnUpdate, Cmd::none())
        }

        fn update(&mut self, _: ()) -> Cmd<()> {
            panic!("bug in application code");
        }
    }

    #[tokio::test]
    async fn update_panic_fails_the_program() {
        let program = Program::<PanicsOnUpdate>::new();
        program.dispatch(());
        let err = program.join().await.unwrap_err();
        assert!(matches!(err, ProgramError::Panicked("update")));
    }

    #[tokio::test]
    async fn unchanged_model_publishes_nothing() {
        let program = Program::<Counter>::with_flags(0);
        let models = program.models();
        program.dispatch(CounterMsg::Reset); // count is already 0
        program.dispatch(CounterMsg::Increment);

        let seen: Vec<i64> = models.take(2).map(|m| m.count).collect().await;
        assert_eq!(seen, vec![0, 1]);

        program.shutdown();
        program.join().await.unwrap();
    }
}
