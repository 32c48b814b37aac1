//! **oolong** -- a Model-Update-Subscription runtime on tokio.
//!
//! This is the umbrella crate that re-exports everything you need to build
//! an oolong application from a single dependency:
//!
//! ```toml
//! [dependencies]
//! oolong = "0.1"
//! ```
//!
//! # Re-exports
//!
//! * All public items from [`oolong_core`] are available at the crate root
//!   ([`Model`], [`Cmd`], [`Sub`], [`Task`], [`Program`], [`ViewProgram`],
//!   [`run`], etc.).
//! * [`tokio`] and [`futures`] are re-exported so downstream crates do not
//!   need to depend on them directly.
//!
//! # Quick start
//!
//! ```ignore
//! use oolong::{Cmd, Model, Program};
//!
//! #[derive(Clone, PartialEq)]
//! struct Hello;
//!
//! impl Model for Hello {
//!     type Message = ();
//!     type Flags = ();
//!
//!     fn init(_: ()) -> (Self, Cmd<()>) {
//!         (Hello, Cmd::none())
//!     }
//!     fn update(&mut self, _: ()) -> Cmd<()> {
//!         Cmd::none()
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let program = Program::<Hello>::new();
//!     program.shutdown();
//!     program.join().await.unwrap();
//! }
//! ```

pub use oolong_core::*;

// Re-export dependencies for use in examples and downstream crates
pub use futures;
pub use tokio;
