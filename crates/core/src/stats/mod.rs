//! Fleet statistics: periodic samples, daily rollups and their persistence.

mod sampler;
mod store;
mod types;

pub use sampler::StatsSampler;
pub use store::{SqliteStatsStore, StatsStore};
pub use types::*;
