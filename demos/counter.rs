//! The classic counter, driven headlessly: an initial command sets the
//! starting value, a few dispatched messages mutate it, and every model
//! state is printed as it is published.
//!
//! Run with: `cargo run --example counter`

use oolong::{Cmd, Model, Program};
use std::time::Duration;

#[derive(Clone, PartialEq, Debug)]
struct Counter {
    count: i64,
}

#[derive(Debug)]
enum Msg {
    Increment,
    Decrement,
    Set(i64),
}

impl Model for Counter {
    type Message = Msg;
    type Flags = ();

    fn init(_: ()) -> (Self, Cmd<Msg>) {
        (Counter { count: 0 }, Cmd::of(Msg::Set(10)))
    }

    fn update(&mut self, msg: Msg) -> Cmd<Msg> {
        match msg {
            Msg::Increment => self.count += 1,
            Msg::Decrement => self.count -= 1,
            Msg::Set(n) => self.count = n,
        }
        Cmd::none()
    }
}

#[tokio::main]
async fn main() -> Result<(), oolong::ProgramError> {
    let program = Program::<Counter>::new();
    let dispatch = program.dispatcher();

    tokio::spawn(async move {
        for _ in 0..3 {
            dispatch.send(Msg::Increment);
        }
        dispatch.send(Msg::Decrement);
        tokio::time::sleep(Duration::from_millis(100)).await;
        dispatch.shutdown();
    });

    let final_model = program.run_with(|m| println!("count = {}", m.count)).await?;
    println!("final: {final_model:?}");
    Ok(())
}
