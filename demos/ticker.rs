//! Subscription switching in action: a timer subscription ticks while the
//! model says it is running, then the model flips itself off and the runtime
//! cancels the timer.
//!
//! Run with: `cargo run --example ticker`

use oolong::{Cmd, Model, Program, Sub};
use std::time::Duration;

#[derive(Clone, PartialEq, Debug)]
struct Ticker {
    ticks: u32,
    limit: u32,
}

#[derive(Debug, Clone)]
enum Msg {
    Tick,
}

impl Model for Ticker {
    type Message = Msg;
    type Flags = u32;

    fn init(limit: u32) -> (Self, Cmd<Msg>) {
        (Ticker { ticks: 0, limit }, Cmd::none())
    }

    fn update(&mut self, msg: Msg) -> Cmd<Msg> {
        match msg {
            Msg::Tick => self.ticks += 1,
        }
        Cmd::none()
    }

    fn subscriptions(&self) -> Sub<Msg> {
        if self.ticks < self.limit {
            Sub::interval(Duration::from_millis(200), Msg::Tick)
        } else {
            Sub::none()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), oolong::ProgramError> {
    let program = Program::<Ticker>::with_flags(5);
    let dispatch = program.dispatcher();

    tokio::spawn(async move {
        // The timer switches itself off after five ticks; give it time,
        // then shut down.
        tokio::time::sleep(Duration::from_secs(2)).await;
        dispatch.shutdown();
    });

    let final_model = program.run_with(|m| println!("tick {}", m.ticks)).await?;
    println!("stopped at {} ticks", final_model.ticks);
    Ok(())
}
