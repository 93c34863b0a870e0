use clap::Subcommand;

use super::Context;

#[derive(Subcommand)]
pub enum GrantAction {
    /// Credit minutes earned by a correct quiz answer
    Quiz {
        /// Minutes of screen time to add
        minutes: f64,
    },
    /// Credit hours earned by a completed goal
    Goal {
        /// Hours of screen time to add
        hours: f64,
    },
}

pub fn run(action: GrantAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut ctx = Context::open()?;

    match action {
        GrantAction::Quiz { minutes } => {
            ctx.engine.add_time_from_quiz(ctx.now, minutes)?;
        }
        GrantAction::Goal { hours } => {
            ctx.engine.add_time_from_goal(ctx.now, hours)?;
        }
    }

    ctx.save()?;
    ctx.print_status()
}
