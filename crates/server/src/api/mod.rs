pub mod backups;
pub mod error;
pub mod feeds;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod rules;
pub mod schedules;
pub mod stats;
pub mod torrents;

pub use error::{ApiError, ErrorResponse};
pub use routes::create_router;
