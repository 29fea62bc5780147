pub mod api;
pub mod cli;
pub mod client;
pub mod commands;
pub mod format;
pub mod metrics;
pub mod serve;
pub mod state;
