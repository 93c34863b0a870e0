use clap::Subcommand;

use super::Context;

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start or resume consuming budget
    Start,
    /// Pause the countdown
    Pause,
    /// Stop the timer, clearing the balance
    Stop,
    /// Report the host app as foregrounded
    Foreground,
    /// Report the host app as backgrounded
    Background,
    /// Print the current timer status as JSON
    Status,
}

pub fn run(action: TimerAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut ctx = Context::open()?;

    match action {
        TimerAction::Start => {
            ctx.engine.start(ctx.now)?;
        }
        TimerAction::Pause => {
            ctx.engine.pause(ctx.now);
        }
        TimerAction::Stop => {
            ctx.engine.stop(ctx.now);
        }
        TimerAction::Foreground => {
            ctx.engine.set_foreground(ctx.now, true);
        }
        TimerAction::Background => {
            ctx.engine.set_foreground(ctx.now, false);
        }
        TimerAction::Status => {}
    }

    ctx.save()?;
    ctx.print_status()
}
