use crate::cell::ModelStream;
use crate::model::Model;
use crate::runtime::{Dispatch, Program, ProgramError, ProgramOptions};
use futures::{Stream, StreamExt};

/// A [`Model`] with a view: a pure projection from state to some host
/// renderer's output type.
///
/// The runtime is renderer-agnostic: `Dom` can be a virtual-DOM node, a
/// widget tree, a string -- anything a host renderer consumes.  The
/// [`Dispatch`] passed to [`view`](ViewModel::view) is the same handle on
/// every call, so event handlers embedded in the output stay valid across
/// model updates.
pub trait ViewModel: Model {
    /// The renderer's output type.
    type Dom: Send + 'static;

    /// Render the current state.  Should be a pure function of `&self`;
    /// interactive parts of the output capture clones of `dispatch`.
    fn view(&self, dispatch: &Dispatch<Self::Message>) -> Self::Dom;
}

/// A [`Program`] paired with a view: everything the base program exposes,
/// plus a stream of rendered output.
///
/// The adapter is a thin projection of [`Program::models`] through
/// [`ViewModel::view`]; it adds no scheduling semantics of its own.
pub struct ViewProgram<M: ViewModel> {
    program: Program<M>,
    dispatch: Dispatch<M::Message>,
}

impl<M: ViewModel> ViewProgram<M> {
    /// Start a view program that needs no external bootstrap parameters.
    pub fn new() -> Self
    where
        M: Model<Flags = ()>,
    {
        Self::with_options((), ProgramOptions::default())
    }

    /// Start a view program from external bootstrap parameters (flags).
    pub fn with_flags(flags: M::Flags) -> Self {
        Self::with_options(flags, ProgramOptions::default())
    }

    /// Start a view program with custom options.
    pub fn with_options(flags: M::Flags, options: ProgramOptions) -> Self {
        let program = Program::with_options(flags, options);
        let dispatch = program.dispatcher();
        ViewProgram { program, dispatch }
    }

    /// Enqueue a message for the update loop.
    pub fn dispatch(&self, msg: M::Message) {
        self.program.dispatch(msg);
    }

    /// The stable [`Dispatch`] handle; the same one every
    /// [`view`](ViewModel::view) call receives.
    pub fn dispatcher(&self) -> Dispatch<M::Message> {
        self.dispatch.clone()
    }

    /// Subscribe to the raw model stream.
    pub fn models(&self) -> ModelStream<M> {
        self.program.models()
    }

    /// Subscribe to rendered output: the view of the current model
    /// immediately, then the view of every subsequent distinct model.
    pub fn doms(&self) -> impl Stream<Item = M::Dom> + Send + Unpin {
        let dispatch = self.dispatch.clone();
        self.program.models().map(move |model| model.view(&dispatch))
    }

    /// Shut the program down.  Idempotent.
    pub fn shutdown(&self) {
        self.program.shutdown();
    }

    /// Wait for the program to terminate, then return the final model.
    pub async fn join(self) -> Result<M, ProgramError> {
        self.program.join().await
    }

    /// Drain rendered output into `render` until the program terminates,
    /// then return the final model.
    pub async fn run_with(self, mut render: impl FnMut(M::Dom)) -> Result<M, ProgramError> {
        let dispatch = self.dispatch.clone();
        self.program
            .run_with(move |model| render(model.view(&dispatch)))
            .await
    }
}
