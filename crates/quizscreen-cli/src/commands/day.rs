use clap::Subcommand;
use serde_json::json;

use super::Context;

#[derive(Subcommand)]
pub enum DayAction {
    /// Settle any day boundary crossed since the last check
    Check,
    /// Record today's totals without settling any score
    Seal,
    /// Print the most recently settled day's carryover as JSON
    Info,
    /// Print the running score as JSON
    Score,
    /// Print recent day records as JSON
    History {
        /// Number of days to list
        #[arg(long, default_value = "14")]
        limit: usize,
    },
}

pub fn run(action: DayAction) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::open()?;

    match action {
        DayAction::Check => {
            ctx.save()?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "rollover_performed": ctx.rolled }))?
            );
        }
        DayAction::Seal => {
            let sealed = ctx.recon.seal_provisional(&ctx.engine, ctx.now)?;
            ctx.save()?;
            println!("{}", serde_json::to_string_pretty(&json!({ "sealed": sealed }))?);
        }
        DayAction::Info => {
            let info = ctx.recon.carryover_info(ctx.now)?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        DayAction::Score => {
            let score = ctx.recon.today_start_score()?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "total_score": score }))?
            );
        }
        DayAction::History { limit } => {
            let records = ctx.db.list_day_records(limit)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }

    Ok(())
}
