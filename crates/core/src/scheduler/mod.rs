//! Day-of-week / time-of-day scheduling of pause and resume actions.

mod runner;
mod types;

pub use runner::Scheduler;
pub use types::*;
