//! # Quizscreen Core Library
//!
//! This library provides the screen-time budget core of the Quizscreen quiz
//! game: correct answers and completed goals earn device-usage minutes,
//! which a running timer consumes and which can flip into debt when usage
//! outruns the earned budget. All operations are available headless through
//! this crate and its CLI binary; any GUI is a thin layer over the same
//! core.
//!
//! ## Architecture
//!
//! - **Budget Engine**: A wall-clock-based state machine that requires the
//!   caller to periodically invoke `tick()` for progress updates
//! - **Budget Service**: Serialized async command surface with persistence,
//!   catch-up replay after restarts, and an ordered event stream
//! - **Rollover**: Day-boundary reconciliation converting leftovers into a
//!   carryover score, exactly once per day
//! - **Storage**: SQLite-based snapshot/day-record store and TOML-based
//!   configuration
//!
//! ## Key Components
//!
//! - [`BudgetEngine`]: Core timer state machine
//! - [`BudgetService`]: Async owner wiring engine, storage, and events
//! - [`Reconciler`]: Day rollover and carryover settlement
//! - [`Database`]: Snapshot and day-record persistence
//! - [`Config`]: Application configuration management

pub mod budget;
pub mod clock;
pub mod error;
pub mod events;
pub mod rollover;
pub mod storage;

pub use budget::{
    BudgetEngine, BudgetService, HostBridge, NoopBridge, Phase, PhaseKind, TimerSnapshot,
    TimerStatus,
};
pub use clock::{Clock, SystemClock};
pub use error::{BudgetError, ConfigError, CoreError, DatabaseError};
pub use events::{Event, EventBus, GrantSource, Subscription};
pub use rollover::{CarryoverInfo, CarryoverPolicy, DayRecord, Reconciler, WeekReset};
pub use storage::{Config, Database};
