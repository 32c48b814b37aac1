use crate::command::{Cmd, CmdInner};
use crate::model::Model;

/// A headless harness that drives a [`Model`] without starting a runtime.
///
/// `TestProgram` lets you exercise the init/update cycle in a plain
/// `#[test]` function -- no tokio runtime required.  Synchronous commands
/// ([`Cmd::of`]) are collected and can be flushed with
/// [`drain_messages`](TestProgram::drain_messages); async commands are
/// silently ignored.
///
/// # Example
///
/// ```rust,ignore
/// use oolong_core::testing::TestProgram;
///
/// let mut prog = TestProgram::<Counter>::new(0);  // calls Counter::init(0)
/// prog.send(CounterMsg::Increment);               // triggers update
/// prog.send(CounterMsg::Increment);
/// assert_eq!(prog.model().count, 2);              // inspect state
/// ```
pub struct TestProgram<M: Model> {
    model: M,
    pending_messages: Vec<M::Message>,
}

impl<M: Model> TestProgram<M> {
    /// Create a test program by calling [`Model::init`] with the given
    /// flags.
    ///
    /// Any synchronous commands produced by `init` are collected into the
    /// pending-message queue.  Call
    /// [`drain_messages`](TestProgram::drain_messages) to process them.
    pub fn new(flags: M::Flags) -> Self {
        let (model, init_cmd) = M::init(flags);
        let mut program = Self {
            model,
            pending_messages: Vec::new(),
        };
        program.collect_sync_messages(init_cmd);
        program
    }

    /// Send a message, triggering a single update cycle.
    ///
    /// Any synchronous commands returned by `update` are enqueued; call
    /// [`drain_messages`](TestProgram::drain_messages) to flush them.
    pub fn send(&mut self, msg: M::Message) {
        let cmd = self.model.update(msg);
        self.collect_sync_messages(cmd);
    }

    /// Process all pending synchronous messages produced by [`Cmd::of`].
    ///
    /// Repeatedly drains the pending queue, calling [`Model::update`] for
    /// each message, until no new synchronous messages are generated.
    /// Useful for command-chaining scenarios where one update produces a
    /// message that triggers another update.
    pub fn drain_messages(&mut self) {
        while !self.pending_messages.is_empty() {
            let messages: Vec<_> = self.pending_messages.drain(..).collect();
            for msg in messages {
                let cmd = self.model.update(msg);
                self.collect_sync_messages(cmd);
            }
        }
    }

    /// Get a shared reference to the model for assertions.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Get a mutable reference to the model for direct test setup.
    ///
    /// This bypasses the normal message-driven update cycle, which can be
    /// useful for arranging state before sending messages.
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    fn collect_sync_messages(&mut self, cmd: Cmd<M::Message>) {
        match cmd.inner {
            CmdInner::None => {}
            CmdInner::Msg(msg) => {
                self.pending_messages.push(msg);
            }
            CmdInner::Batch(cmds) | CmdInner::Sequence(cmds) => {
                for cmd in cmds {
                    self.collect_sync_messages(cmd);
                }
            }
            // Async commands can't be executed synchronously in tests
            CmdInner::Future(_) | CmdInner::Stream(_) => {}
        }
    }
}
