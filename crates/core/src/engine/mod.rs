//! Transfer engine abstraction.
//!
//! The `TransferEngine` / `EngineHandle` traits are the only way the rest of
//! the crate talks to a torrent engine (qBittorrent, librqbit, etc.).

mod librqbit;
mod qbittorrent;
mod types;

use std::sync::Arc;

pub use librqbit::LibrqbitEngine;
pub use qbittorrent::QBittorrentEngine;
pub use types::*;

use crate::config::{EngineBackend, EngineConfig, SessionConfig};

/// Build the engine selected by `config.backend`.
pub async fn create_engine(
    config: &EngineConfig,
    session: &SessionConfig,
) -> Result<Arc<dyn TransferEngine>, EngineError> {
    match config.backend {
        EngineBackend::Qbittorrent => {
            let qb = config.qbittorrent.clone().ok_or_else(|| {
                EngineError::ConnectionFailed("qBittorrent backend is not configured".to_string())
            })?;
            Ok(Arc::new(QBittorrentEngine::new(qb)?))
        }
        EngineBackend::Librqbit => {
            let rq = config.librqbit.clone().unwrap_or_default();
            Ok(Arc::new(LibrqbitEngine::new(&rq, session).await?))
        }
    }
}
