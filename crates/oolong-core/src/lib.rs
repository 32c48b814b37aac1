//! Core runtime for **oolong** -- a Model-Update-Subscription runtime on
//! tokio.
//!
//! `oolong-core` provides the traits, types, and runtime that power every
//! oolong application.  The design follows the [Elm Architecture]: your
//! program is expressed as a pure **init -> update -> subscriptions** cycle,
//! with side effects pushed to the edges through [`Cmd`]s and [`Sub`]s.  The
//! runtime owns the model as reactive state, serializes message processing,
//! executes commands concurrently, switches the active subscription whenever
//! the model changes, and tears everything down on shutdown.
//!
//! # Key types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Model`] | Top-level application trait (init / update / subscriptions) |
//! | [`Cmd`] | Describes a side effect to be executed by the runtime |
//! | [`Sub`] | Ongoing message source derived from the current model |
//! | [`Task`] | Composable effect, bridged into a [`Cmd`] at the boundary |
//! | [`Program`] | Owns the model cell, the message queue, and the runtime fibers |
//! | [`ViewModel`] / [`ViewProgram`] | Renderer-agnostic view projection of the model stream |
//! | [`TestProgram`](testing::TestProgram) | Headless harness for unit-testing a [`Model`] |
//!
//! # Architecture
//!
//! 1. **init** -- [`Model::init`] creates the initial state and may return a
//!    [`Cmd`] to kick off early work.
//! 2. **dispatch** -- messages are enqueued from anywhere: event handlers,
//!    command fibers, active subscriptions.
//! 3. **update** -- a single consumer drains the queue in FIFO order;
//!    [`Model::update`] mutates state and optionally returns a [`Cmd`].
//! 4. **react** -- every distinct model is published to
//!    [`Program::models`] subscribers, and the runtime cancels the active
//!    [`Sub`] and activates the one for the new state.
//! 5. **repeat** -- until [`Program::shutdown`] or an unhandled failure.
//!
//! # Quick example
//!
//! ```ignore
//! use oolong_core::{Cmd, Model, Program};
//!
//! #[derive(Clone, PartialEq)]
//! struct Counter { count: i32 }
//!
//! enum Msg { Increment, Decrement }
//!
//! impl Model for Counter {
//!     type Message = Msg;
//!     type Flags = ();
//!
//!     fn init(_: ()) -> (Self, Cmd<Msg>) {
//!         (Counter { count: 0 }, Cmd::none())
//!     }
//!
//!     fn update(&mut self, msg: Msg) -> Cmd<Msg> {
//!         match msg {
//!             Msg::Increment => self.count += 1,
//!             Msg::Decrement => self.count -= 1,
//!         }
//!         Cmd::none()
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), oolong_core::ProgramError> {
//!     let program = Program::<Counter>::new();
//!     let dispatch = program.dispatcher();
//!     dispatch.send(Msg::Increment);
//!     dispatch.shutdown();
//!     let final_model = program.join().await?;
//!     println!("count: {}", final_model.count);
//!     Ok(())
//! }
//! ```
//!
//! [Elm Architecture]: https://guide.elm-lang.org/architecture/

pub mod cell;
pub mod command;
pub mod model;
pub mod runtime;
pub mod subscription;
pub mod task;
pub mod testing;
pub mod view;

/// Boxed error type carried on the command and subscription error channels.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use cell::ModelStream;
pub use command::Cmd;
pub use model::Model;
pub use runtime::{Dispatch, Program, ProgramError, ProgramOptions};
pub use subscription::{Emit, Sub};
pub use task::Task;
pub use view::{ViewModel, ViewProgram};

/// Run an oolong application with `Flags = ()`, draining models into a
/// callback until the program terminates.
pub async fn run<M>(on_model: impl FnMut(M)) -> Result<M, ProgramError>
where
    M: Model<Flags = ()>,
{
    Program::<M>::new().run_with(on_model).await
}

/// Run an oolong application from bootstrap flags, draining models into a
/// callback until the program terminates.
pub async fn run_with_flags<M: Model>(
    flags: M::Flags,
    on_model: impl FnMut(M),
) -> Result<M, ProgramError> {
    Program::<M>::with_flags(flags).run_with(on_model).await
}
