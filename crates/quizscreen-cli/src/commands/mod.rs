pub mod config;
pub mod day;
pub mod grant;
pub mod timer;

use chrono::{DateTime, Utc};
use quizscreen_core::{
    BudgetEngine, Clock, Config, Database, Reconciler, SystemClock,
};

/// Shared state for one CLI invocation: the open database, the engine
/// restored from its snapshot, and the clock gap already replayed.
pub(crate) struct Context {
    pub db: Database,
    pub config: Config,
    pub recon: Reconciler,
    pub engine: BudgetEngine,
    pub now: DateTime<Utc>,
    /// Whether opening the context settled a day rollover.
    pub rolled: bool,
}

impl Context {
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let db = Database::open()?;
        let config = Config::load_or_default();
        let recon = Reconciler::new(db.clone(), config.carryover_policy(), config.week_reset());
        let now = SystemClock.now();

        let mut engine = match db.load_snapshot()? {
            Some(snapshot) => BudgetEngine::from_snapshot(snapshot),
            None => BudgetEngine::new(now.date_naive()),
        };
        let (_, rolled) = recon.catch_up(&mut engine, now, config.timer.catch_up_chunk_secs)?;

        Ok(Self {
            db,
            config,
            recon,
            engine,
            now,
            rolled,
        })
    }

    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.db.save_snapshot(self.engine.snapshot())?;
        Ok(())
    }

    pub fn print_status(&self) -> Result<(), Box<dyn std::error::Error>> {
        println!("{}", serde_json::to_string_pretty(&self.engine.status())?);
        Ok(())
    }
}
