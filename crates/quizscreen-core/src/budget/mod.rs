mod bridge;
mod engine;
mod service;
mod snapshot;

pub use bridge::{HostBridge, NoopBridge};
pub use engine::{BudgetEngine, TickOutcome};
pub use service::BudgetService;
pub use snapshot::{Phase, PhaseKind, TimerSnapshot, TimerStatus};
