use crate::command::Cmd;
use crate::subscription::Sub;

/// The top-level application trait, following the [Elm Architecture].
///
/// Every oolong application implements `Model`.  The runtime drives a
/// continuous **init -> update -> subscriptions** cycle:
///
/// 1. [`init`](Model::init) creates the initial state and may return a
///    [`Cmd`] for early side effects (e.g. fetching data).
/// 2. Messages arrive through [`dispatch`](crate::Program::dispatch), from
///    executed commands, and from active [`Sub`]s.
/// 3. [`update`](Model::update) processes each message in order, mutates
///    state, and optionally returns a [`Cmd`] for further work.
/// 4. After every change the runtime publishes the model to
///    [`models`](crate::Program::models) subscribers and switches to the
///    subscription returned by [`subscriptions`](Model::subscriptions).
///
/// The model must be `Clone` (published values are handed to subscribers)
/// and `PartialEq` (writes equal to the current value are suppressed, so an
/// `update` that leaves the state unchanged triggers neither observers nor a
/// subscription switch).
///
/// # Example
///
/// ```rust,ignore
/// use oolong_core::{Cmd, Model};
///
/// #[derive(Clone, PartialEq)]
/// struct Counter {
///     count: i32,
/// }
///
/// enum Msg {
///     Increment,
///     Decrement,
/// }
///
/// impl Model for Counter {
///     type Message = Msg;
///     type Flags = ();
///
///     fn init(_flags: ()) -> (Self, Cmd<Msg>) {
///         (Counter { count: 0 }, Cmd::none())
///     }
///
///     fn update(&mut self, msg: Msg) -> Cmd<Msg> {
///         match msg {
///             Msg::Increment => self.count += 1,
///             Msg::Decrement => self.count -= 1,
///         }
///         Cmd::none()
///     }
/// }
/// ```
///
/// [Elm Architecture]: https://guide.elm-lang.org/architecture/
pub trait Model: Clone + PartialEq + Send + Sync + Sized + 'static {
    /// The application's message type.
    ///
    /// Every event that can affect the application state is represented as a
    /// variant of this type.  Messages arrive from [`Sub`]s, from
    /// [`Cmd::of`], and from async work completed via [`Cmd::perform`] or
    /// the [`Task`](crate::Task) bridge.
    type Message: Send + 'static;

    /// Initialization data passed to [`Model::init`].
    ///
    /// Use `()` when no startup data is needed; programs with `Flags = ()`
    /// are constructed with [`Program::new`](crate::Program::new).  For
    /// applications that need external bootstrap parameters, define a struct
    /// carrying them and construct the program with
    /// [`Program::with_flags`](crate::Program::with_flags).
    type Flags: Send + 'static;

    /// Create the initial model state and an optional startup command.
    ///
    /// Called once when the program starts.  The startup command is executed
    /// without blocking construction; its messages are processed like any
    /// others.
    fn init(flags: Self::Flags) -> (Self, Cmd<Self::Message>);

    /// Process a message, mutate state, and return a command for side
    /// effects.
    ///
    /// The runtime calls `update` sequentially from a single consumer, so it
    /// always observes the state as written by the immediately preceding
    /// update.
    fn update(&mut self, msg: Self::Message) -> Cmd<Self::Message>;

    /// Declare the active subscription for the current state.
    ///
    /// Called for the initial model and again after every distinct model
    /// change.  Before a new subscription is activated the previous one is
    /// cancelled and its disposers run, so exactly one subscription is
    /// active at any time.
    ///
    /// The default implementation returns [`Sub::none`].
    fn subscriptions(&self) -> Sub<Self::Message> {
        Sub::none()
    }
}
