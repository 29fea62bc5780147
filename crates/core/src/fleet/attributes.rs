//! Priority and attribute control over registry entries.

use std::sync::Arc;

use tracing::{debug, info};

use super::registry::FleetRegistry;
use super::types::{validate_priority, FleetError, TorrentId};
use crate::engine::TorrentState;

/// Validates and applies attribute changes through the registry.
///
/// Every change is applied to the engine first and cached only on success,
/// so a failed call leaves the previous value in place.
pub struct AttributeController {
    registry: Arc<FleetRegistry>,
}

impl AttributeController {
    pub fn new(registry: Arc<FleetRegistry>) -> Self {
        Self { registry }
    }

    pub async fn set_priority(&self, id: TorrentId, level: i64) -> Result<(), FleetError> {
        let level = validate_priority(level)?;
        self.registry
            .mutate(
                id,
                "set_priority",
                |h| async move { h.set_priority(level).await },
                |entry, _| entry.priority = level,
            )
            .await?;
        info!(torrent_id = %id, priority = level, "Priority set");
        Ok(())
    }

    pub async fn set_file_priority(
        &self,
        id: TorrentId,
        file_index: usize,
        level: i64,
    ) -> Result<(), FleetError> {
        let level = validate_priority(level)?;
        let files = self.registry.files(id).await?;
        if file_index >= files.len() {
            return Err(FleetError::InvalidFileIndex {
                index: file_index,
                count: files.len(),
            });
        }

        self.registry
            .mutate(
                id,
                "set_file_priority",
                |h| async move { h.set_file_priority(file_index, level).await },
                |_, _| {},
            )
            .await?;
        debug!(torrent_id = %id, file_index = file_index, priority = level, "File priority set");
        Ok(())
    }

    pub async fn set_sequential(&self, id: TorrentId, enabled: bool) -> Result<(), FleetError> {
        self.registry
            .mutate(
                id,
                "set_sequential",
                |h| async move { h.set_sequential(enabled).await },
                |entry, _| entry.sequential = enabled,
            )
            .await?;
        debug!(torrent_id = %id, enabled = enabled, "Sequential download toggled");
        Ok(())
    }

    pub async fn set_super_seeding(&self, id: TorrentId, enabled: bool) -> Result<(), FleetError> {
        self.registry
            .mutate(
                id,
                "set_super_seeding",
                |h| async move { h.set_super_seeding(enabled).await },
                |entry, _| entry.super_seeding = enabled,
            )
            .await?;
        debug!(torrent_id = %id, enabled = enabled, "Super-seeding toggled");
        Ok(())
    }

    /// Add trackers; URLs already present (or repeated) are ignored.
    pub async fn add_trackers(&self, id: TorrentId, urls: &[String]) -> Result<(), FleetError> {
        let current = self.registry.trackers(id).await?;
        let mut new_urls: Vec<String> = Vec::new();
        for url in urls {
            let url = url.trim();
            if url.is_empty() || current.iter().any(|u| u == url) {
                continue;
            }
            if !new_urls.iter().any(|u| u == url) {
                new_urls.push(url.to_string());
            }
        }
        if new_urls.is_empty() {
            return Ok(());
        }

        let added = new_urls.clone();
        self.registry
            .mutate(
                id,
                "add_trackers",
                |h| async move { h.add_trackers(&added).await },
                |entry, _| {
                    for url in &new_urls {
                        if !entry.trackers.contains(url) {
                            entry.trackers.push(url.clone());
                        }
                    }
                },
            )
            .await?;
        debug!(torrent_id = %id, "Trackers added");
        Ok(())
    }

    /// Remove trackers; URLs the engine does not announce to are a no-op.
    ///
    /// Matched against the engine's live list, so trackers that came from
    /// a `.torrent` file or were set engine-side can be removed too.
    pub async fn remove_trackers(&self, id: TorrentId, urls: &[String]) -> Result<(), FleetError> {
        let current = self.registry.trackers(id).await?;
        let present: Vec<String> = current
            .into_iter()
            .filter(|u| urls.iter().any(|r| r.trim() == u))
            .collect();
        if present.is_empty() {
            return Ok(());
        }

        let removed = present.clone();
        self.registry
            .mutate(
                id,
                "remove_trackers",
                |h| async move { h.remove_trackers(&removed).await },
                |entry, _| entry.trackers.retain(|u| !present.contains(u)),
            )
            .await?;
        debug!(torrent_id = %id, "Trackers removed");
        Ok(())
    }

    /// Make the tracker set equal to `urls`.
    pub async fn replace_trackers(&self, id: TorrentId, urls: &[String]) -> Result<(), FleetError> {
        let current = self.registry.trackers(id).await?;
        let stale: Vec<String> = current
            .into_iter()
            .filter(|u| !urls.contains(u))
            .collect();
        self.remove_trackers(id, &stale).await?;
        self.add_trackers(id, urls).await
    }

    /// Cap the torrent's download rate (KB/s, 0 = unlimited).
    pub async fn set_download_limit(&self, id: TorrentId, kbps: u64) -> Result<(), FleetError> {
        let bytes = kbps.saturating_mul(1024);
        self.registry
            .mutate(
                id,
                "set_download_limit",
                |h| async move { h.set_download_limit(bytes).await },
                |entry, _| entry.download_limit = kbps,
            )
            .await?;
        debug!(torrent_id = %id, kbps = kbps, "Download limit set");
        Ok(())
    }

    /// Cap the torrent's upload rate (KB/s, 0 = unlimited).
    pub async fn set_upload_limit(&self, id: TorrentId, kbps: u64) -> Result<(), FleetError> {
        let bytes = kbps.saturating_mul(1024);
        self.registry
            .mutate(
                id,
                "set_upload_limit",
                |h| async move { h.set_upload_limit(bytes).await },
                |entry, _| entry.upload_limit = kbps,
            )
            .await?;
        debug!(torrent_id = %id, kbps = kbps, "Upload limit set");
        Ok(())
    }

    pub async fn move_storage(&self, id: TorrentId, path: &str) -> Result<(), FleetError> {
        let path = path.trim();
        if path.is_empty() {
            return Err(FleetError::InvalidPath(path.to_string()));
        }

        let target = path.to_string();
        self.registry
            .mutate(
                id,
                "move_storage",
                |h| async move { h.move_storage(&target).await },
                |entry, _| entry.save_path = path.to_string(),
            )
            .await?;
        info!(torrent_id = %id, path = %path, "Storage moved");
        Ok(())
    }

    /// Recheck; the cached state reads `checking` until the next status poll.
    pub async fn force_recheck(&self, id: TorrentId) -> Result<(), FleetError> {
        self.registry
            .mutate(
                id,
                "force_recheck",
                |h| async move { h.force_recheck().await },
                |entry, _: &()| entry.last_known_status.state = TorrentState::Checking,
            )
            .await?;
        info!(torrent_id = %id, "Recheck requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::RegistryConfig;
    use crate::testing::{test_magnet, MockEngine, MOCK_FILE_COUNT};

    async fn setup() -> (MockEngine, Arc<FleetRegistry>, AttributeController, TorrentId) {
        let engine = MockEngine::new();
        let registry = Arc::new(FleetRegistry::new(
            Arc::new(engine.clone()),
            RegistryConfig::default(),
        ));
        let controller = AttributeController::new(registry.clone());
        let id = registry
            .add(&test_magnet(1, "alpha"), Default::default())
            .await
            .unwrap();
        (engine, registry, controller, id)
    }

    #[tokio::test]
    async fn test_valid_priorities_round_trip() {
        let (_engine, registry, controller, id) = setup().await;
        for level in 0..=7 {
            controller.set_priority(id, level).await.unwrap();
            assert_eq!(registry.get(id).await.unwrap().priority, level as u8);
        }
    }

    #[tokio::test]
    async fn test_invalid_priority_keeps_previous_level() {
        let (_engine, registry, controller, id) = setup().await;
        controller.set_priority(id, 3).await.unwrap();

        for level in [-1, 8, 100] {
            let result = controller.set_priority(id, level).await;
            assert!(matches!(result, Err(FleetError::InvalidPriority(_))));
        }
        assert_eq!(registry.get(id).await.unwrap().priority, 3);
    }

    #[tokio::test]
    async fn test_engine_failure_keeps_previous_priority() {
        let (engine, registry, controller, id) = setup().await;
        engine.fail_operation("set_priority").await;

        assert!(controller.set_priority(id, 6).await.is_err());
        assert_eq!(registry.get(id).await.unwrap().priority, 5);
    }

    #[tokio::test]
    async fn test_priority_on_missing_torrent() {
        let (_engine, _registry, controller, _id) = setup().await;
        let result = controller.set_priority(TorrentId(99), 3).await;
        assert!(matches!(result, Err(FleetError::NotFound(TorrentId(99)))));
    }

    #[tokio::test]
    async fn test_file_priority_validates_index() {
        let (engine, registry, controller, id) = setup().await;
        let key = registry.get(id).await.unwrap().info_hash;

        controller.set_file_priority(id, 1, 0).await.unwrap();
        assert_eq!(engine.torrent(&key).await.unwrap().files[1].priority, 0);

        let result = controller.set_file_priority(id, MOCK_FILE_COUNT, 1).await;
        assert!(matches!(
            result,
            Err(FleetError::InvalidFileIndex { index, count })
                if index == MOCK_FILE_COUNT && count == MOCK_FILE_COUNT
        ));

        let result = controller.set_file_priority(id, 0, 8).await;
        assert!(matches!(result, Err(FleetError::InvalidPriority(8))));
    }

    #[tokio::test]
    async fn test_toggles() {
        let (engine, registry, controller, id) = setup().await;
        let key = registry.get(id).await.unwrap().info_hash;

        controller.set_sequential(id, true).await.unwrap();
        controller.set_super_seeding(id, true).await.unwrap();

        let entry = registry.get(id).await.unwrap();
        assert!(entry.sequential);
        assert!(entry.super_seeding);
        let torrent = engine.torrent(&key).await.unwrap();
        assert!(torrent.sequential);
        assert!(torrent.super_seeding);

        controller.set_sequential(id, false).await.unwrap();
        assert!(!registry.get(id).await.unwrap().sequential);
    }

    #[tokio::test]
    async fn test_tracker_set_semantics() {
        let (engine, registry, controller, id) = setup().await;
        let key = registry.get(id).await.unwrap().info_hash;
        let urls = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        controller
            .add_trackers(id, &urls(&["udp://a", "udp://b", "udp://a"]))
            .await
            .unwrap();
        controller.add_trackers(id, &urls(&["udp://b", "udp://c"])).await.unwrap();
        assert_eq!(
            registry.get(id).await.unwrap().trackers,
            urls(&["udp://a", "udp://b", "udp://c"])
        );

        // Missing URL is a no-op
        controller.remove_trackers(id, &urls(&["udp://zzz"])).await.unwrap();
        controller.remove_trackers(id, &urls(&["udp://b"])).await.unwrap();
        assert_eq!(
            registry.get(id).await.unwrap().trackers,
            urls(&["udp://a", "udp://c"])
        );
        assert_eq!(
            engine.torrent(&key).await.unwrap().trackers,
            urls(&["udp://a", "udp://c"])
        );
    }

    #[tokio::test]
    async fn test_remove_engine_side_tracker() {
        let (engine, registry, controller, id) = setup().await;
        let key = registry.get(id).await.unwrap().info_hash;
        engine
            .update(&key, |t| t.trackers = vec!["udp://embedded:80".to_string()])
            .await;
        assert!(registry.get(id).await.unwrap().trackers.is_empty());

        controller
            .remove_trackers(id, &["udp://embedded:80".to_string()])
            .await
            .unwrap();

        assert!(engine.torrent(&key).await.unwrap().trackers.is_empty());
        assert!(registry.get(id).await.unwrap().trackers.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limits_convert_to_bytes() {
        let (engine, registry, controller, id) = setup().await;
        let key = registry.get(id).await.unwrap().info_hash;

        controller.set_download_limit(id, 512).await.unwrap();
        controller.set_upload_limit(id, 64).await.unwrap();

        let torrent = engine.torrent(&key).await.unwrap();
        assert_eq!(torrent.download_limit, 512 * 1024);
        assert_eq!(torrent.upload_limit, 64 * 1024);
        let entry = registry.get(id).await.unwrap();
        assert_eq!(entry.download_limit, 512);
        assert_eq!(entry.upload_limit, 64);

        controller.set_download_limit(id, 0).await.unwrap();
        assert_eq!(engine.torrent(&key).await.unwrap().download_limit, 0);
    }

    #[tokio::test]
    async fn test_failed_limit_keeps_previous_value() {
        let (engine, registry, controller, id) = setup().await;
        controller.set_upload_limit(id, 100).await.unwrap();

        engine.fail_operation("set_upload_limit").await;
        assert!(controller.set_upload_limit(id, 5).await.is_err());
        assert_eq!(registry.get(id).await.unwrap().upload_limit, 100);
    }

    #[tokio::test]
    async fn test_move_storage() {
        let (engine, registry, controller, id) = setup().await;
        let key = registry.get(id).await.unwrap().info_hash;

        controller.move_storage(id, " /mnt/archive ").await.unwrap();
        assert_eq!(registry.get(id).await.unwrap().save_path, "/mnt/archive");
        assert_eq!(
            engine.torrent(&key).await.unwrap().save_path.as_deref(),
            Some("/mnt/archive")
        );

        let result = controller.move_storage(id, "   ").await;
        assert!(matches!(result, Err(FleetError::InvalidPath(_))));
        assert_eq!(registry.get(id).await.unwrap().save_path, "/mnt/archive");
    }

    #[tokio::test]
    async fn test_replace_trackers() {
        let (_engine, registry, controller, id) = setup().await;
        let urls = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        controller.add_trackers(id, &urls(&["udp://a", "udp://b"])).await.unwrap();
        controller.replace_trackers(id, &urls(&["udp://b", "udp://c"])).await.unwrap();

        assert_eq!(
            registry.get(id).await.unwrap().trackers,
            urls(&["udp://b", "udp://c"])
        );
    }

    #[tokio::test]
    async fn test_force_recheck_marks_checking() {
        let (engine, registry, controller, id) = setup().await;
        let key = registry.get(id).await.unwrap().info_hash;

        controller.force_recheck(id).await.unwrap();

        assert_eq!(
            registry.get(id).await.unwrap().last_known_status.state,
            TorrentState::Checking
        );
        assert_eq!(engine.torrent(&key).await.unwrap().rechecks, 1);
    }
}
