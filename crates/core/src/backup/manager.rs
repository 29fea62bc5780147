//! Writes fleet snapshots to disk and replays them into a registry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::types::{
    BackupEntry, BackupError, BackupInfo, BackupSnapshot, RestoreFailure, RestoreReport,
    RestoredEntry,
};
use crate::config::SessionConfig;
use crate::fleet::{AddTorrentOptions, AttributeController, FleetRegistry};

const BACKUP_EXTENSION: &str = "json";

pub struct BackupManager {
    registry: Arc<FleetRegistry>,
    attributes: Arc<AttributeController>,
    session: SessionConfig,
    dir: PathBuf,
    /// Serializes file name selection so no backup replaces another.
    writing: Mutex<()>,
}

impl BackupManager {
    pub fn new(
        registry: Arc<FleetRegistry>,
        attributes: Arc<AttributeController>,
        session: SessionConfig,
        dir: PathBuf,
    ) -> Self {
        Self {
            registry,
            attributes,
            session,
            dir,
            writing: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Capture the fleet into `<dir>/<label>_<YYYYMMDD_HHMMSS_mmm>.json`.
    ///
    /// A name already on disk gets a `-N` suffix; existing backups are
    /// never overwritten.
    pub async fn create_backup(&self, label: &str) -> Result<BackupInfo, BackupError> {
        let label = sanitize_label(label)?;
        let created_at = Utc::now();
        let entries: Vec<BackupEntry> = self
            .registry
            .list(None)
            .await
            .iter()
            .map(BackupEntry::from)
            .collect();

        let snapshot = BackupSnapshot {
            label: label.clone(),
            created_at,
            entries,
            config: self.session.clone(),
        };
        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| BackupError::Serialization(e.to_string()))?;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| BackupError::Io(format!("create {}: {}", self.dir.display(), e)))?;

        let _writing = self.writing.lock().await;
        let stem = format!("{}_{}", label, created_at.format("%Y%m%d_%H%M%S_%3f"));
        let mut name = format!("{}.{}", stem, BACKUP_EXTENSION);
        let mut suffix = 1;
        while fs::try_exists(self.dir.join(&name))
            .await
            .map_err(|e| BackupError::Io(format!("stat {}: {}", name, e)))?
        {
            suffix += 1;
            name = format!("{}-{}.{}", stem, suffix, BACKUP_EXTENSION);
        }
        let path = self.dir.join(&name);
        let tmp = self.dir.join(format!(".{}.tmp", name));
        fs::write(&tmp, &json)
            .await
            .map_err(|e| BackupError::Io(format!("write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| BackupError::Io(format!("rename {}: {}", path.display(), e)))?;

        info!(
            path = %path.display(),
            entries = snapshot.entries.len(),
            "Backup created"
        );
        Ok(BackupInfo {
            name,
            label,
            created_at,
            entries: snapshot.entries.len(),
        })
    }

    /// Backups in the directory, oldest first. Unreadable files are skipped.
    pub async fn list_backups(&self) -> Result<Vec<BackupInfo>, BackupError> {
        let mut reader = match fs::read_dir(&self.dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BackupError::Io(e.to_string())),
        };

        let mut backups = Vec::new();
        while let Some(item) = reader
            .next_entry()
            .await
            .map_err(|e| BackupError::Io(e.to_string()))?
        {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BACKUP_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(String::from) else {
                continue;
            };
            match read_snapshot(&path).await {
                Ok(snapshot) => backups.push(BackupInfo {
                    name,
                    label: snapshot.label,
                    created_at: snapshot.created_at,
                    entries: snapshot.entries.len(),
                }),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable backup"),
            }
        }

        backups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(backups)
    }

    /// Load a backup by file name.
    pub async fn load_backup(&self, name: &str) -> Result<BackupSnapshot, BackupError> {
        if name.contains('/') || name.contains('\\') || name.starts_with('.') {
            return Err(BackupError::NotFound(name.to_string()));
        }
        let path = self.dir.join(name);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(BackupError::NotFound(name.to_string()));
        }
        read_snapshot(&path).await
    }

    /// The most recent backup, if any.
    pub async fn load_latest(&self) -> Result<Option<BackupSnapshot>, BackupError> {
        match self.list_backups().await?.pop() {
            Some(latest) => self.load_backup(&latest.name).await.map(Some),
            None => Ok(None),
        }
    }

    /// Re-add every entry and reapply its attributes.
    ///
    /// Each entry is independent: a failed add is recorded and the rest
    /// continue. Entries are always added fresh, never matched against
    /// torrents already in the fleet.
    pub async fn restore(&self, snapshot: &BackupSnapshot) -> Result<RestoreReport, BackupError> {
        let mut report = RestoreReport::default();

        for entry in &snapshot.entries {
            let options = AddTorrentOptions::default()
                .with_priority(entry.priority)
                .with_sequential(entry.sequential);

            let id = match self.registry.add(&entry.source, options).await {
                Ok(id) => id,
                Err(e) => {
                    warn!(source = %entry.source, error = %e, "Restore failed for entry");
                    report.failed.push(RestoreFailure {
                        source: entry.source.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            match self.registry.get(id).await {
                Ok(current) if current.super_seeding != entry.super_seeding => {
                    if let Err(e) = self
                        .attributes
                        .set_super_seeding(id, entry.super_seeding)
                        .await
                    {
                        warn!(torrent_id = %id, error = %e, "Failed to restore super-seeding");
                    }
                }
                _ => {}
            }
            if let Err(e) = self.attributes.replace_trackers(id, &entry.trackers).await {
                warn!(torrent_id = %id, error = %e, "Failed to restore trackers");
            }
            if entry.download_limit > 0 {
                if let Err(e) = self
                    .attributes
                    .set_download_limit(id, entry.download_limit)
                    .await
                {
                    warn!(torrent_id = %id, error = %e, "Failed to restore download limit");
                }
            }
            if entry.upload_limit > 0 {
                if let Err(e) = self.attributes.set_upload_limit(id, entry.upload_limit).await {
                    warn!(torrent_id = %id, error = %e, "Failed to restore upload limit");
                }
            }
            if let Some(path) = entry.save_path.as_deref() {
                if path != self.session.download_path {
                    if let Err(e) = self.attributes.move_storage(id, path).await {
                        warn!(torrent_id = %id, error = %e, "Failed to restore save path");
                    }
                }
            }

            debug!(torrent_id = %id, source = %entry.source, "Entry restored");
            report.restored.push(RestoredEntry {
                source: entry.source.clone(),
                id,
            });
        }

        info!(
            label = %snapshot.label,
            restored = report.restored.len(),
            failed = report.failed.len(),
            "Restore finished"
        );
        if report.failed.is_empty() {
            Ok(report)
        } else {
            Err(BackupError::PartialRestoreFailure(report))
        }
    }
}

async fn read_snapshot(path: &Path) -> Result<BackupSnapshot, BackupError> {
    let bytes = fs::read(path)
        .await
        .map_err(|e| BackupError::Io(format!("read {}: {}", path.display(), e)))?;
    serde_json::from_slice(&bytes).map_err(|e| BackupError::Serialization(e.to_string()))
}

/// Keep labels file-name safe: anything but `[A-Za-z0-9_-]` becomes `-`.
fn sanitize_label(label: &str) -> Result<String, BackupError> {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        return Err(BackupError::InvalidLabel(label.to_string()));
    }
    Ok(trimmed
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::{RegistryConfig, TorrentId};
    use crate::testing::{test_magnet, MockEngine};
    use tempfile::TempDir;

    struct Fixture {
        engine: MockEngine,
        registry: Arc<FleetRegistry>,
        attributes: Arc<AttributeController>,
        manager: BackupManager,
        _dir: TempDir,
    }

    fn fixture_in(dir: TempDir) -> Fixture {
        let engine = MockEngine::new();
        let registry = Arc::new(FleetRegistry::new(
            Arc::new(engine.clone()),
            RegistryConfig::default(),
        ));
        let attributes = Arc::new(AttributeController::new(registry.clone()));
        let manager = BackupManager::new(
            registry.clone(),
            attributes.clone(),
            SessionConfig::default(),
            dir.path().join("backups"),
        );
        Fixture {
            engine,
            registry,
            attributes,
            manager,
            _dir: dir,
        }
    }

    fn fixture() -> Fixture {
        fixture_in(tempfile::tempdir().unwrap())
    }

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_label("nightly").unwrap(), "nightly");
        assert_eq!(sanitize_label(" before upgrade/2 ").unwrap(), "before-upgrade-2");
        assert!(matches!(sanitize_label("  "), Err(BackupError::InvalidLabel(_))));
    }

    #[tokio::test]
    async fn test_create_writes_named_file() {
        let f = fixture();
        f.registry
            .add(&test_magnet(1, "alpha"), Default::default())
            .await
            .unwrap();

        let info = f.manager.create_backup("nightly").await.unwrap();
        assert!(info.name.starts_with("nightly_"));
        assert!(info.name.ends_with(".json"));
        // nightly_YYYYMMDD_HHMMSS_mmm.json
        assert_eq!(info.name.len(), "nightly_".len() + 19 + ".json".len());
        assert_eq!(info.entries, 1);

        let mut files = std::fs::read_dir(f.manager.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect::<Vec<_>>();
        files.sort();
        assert_eq!(files, vec![info.name.clone()]);
    }

    #[tokio::test]
    async fn test_same_label_backups_never_overwrite() {
        let f = fixture();
        f.registry
            .add(&test_magnet(1, "alpha"), Default::default())
            .await
            .unwrap();

        let mut names = Vec::new();
        for _ in 0..3 {
            names.push(f.manager.create_backup("nightly").await.unwrap().name);
        }
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 3);

        let files = std::fs::read_dir(f.manager.dir()).unwrap().count();
        assert_eq!(files, 3);
        assert_eq!(f.manager.list_backups().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_backup_restore_into_empty_fleet() {
        let f = fixture();
        let id = f
            .registry
            .add(
                &test_magnet(1, "alpha"),
                AddTorrentOptions::default().with_priority(7).with_sequential(true),
            )
            .await
            .unwrap();
        f.attributes
            .add_trackers(id, &["udp://t1:80".to_string(), "udp://t2:80".to_string()])
            .await
            .unwrap();
        f.attributes.set_super_seeding(id, true).await.unwrap();
        f.attributes.set_upload_limit(id, 40).await.unwrap();
        f.attributes.move_storage(id, "/srv/alpha").await.unwrap();
        f.registry
            .add(&test_magnet(2, "beta"), Default::default())
            .await
            .unwrap();

        let info = f.manager.create_backup("full").await.unwrap();
        let snapshot = f.manager.load_backup(&info.name).await.unwrap();

        // Restore into a fresh fleet that shares the backup directory
        let target = fixture();
        let manager = BackupManager::new(
            target.registry.clone(),
            target.attributes.clone(),
            SessionConfig::default(),
            f.manager.dir().to_path_buf(),
        );
        let report = manager.restore(&snapshot).await.unwrap();
        assert_eq!(report.restored.len(), 2);

        let restored = target.registry.list(None).await;
        assert_eq!(restored.len(), 2);
        assert_eq!(restored[0].source, test_magnet(1, "alpha"));
        assert_eq!(restored[0].priority, 7);
        assert!(restored[0].sequential);
        assert!(restored[0].super_seeding);
        assert_eq!(restored[0].trackers, vec!["udp://t1:80", "udp://t2:80"]);
        assert_eq!(restored[0].upload_limit, 40);
        assert_eq!(restored[0].download_limit, 0);
        assert_eq!(restored[0].save_path, "/srv/alpha");
        assert_eq!(restored[1].source, test_magnet(2, "beta"));
        assert_eq!(restored[1].priority, 5);
        assert_eq!(restored[1].save_path, SessionConfig::default().download_path);

        let torrent = target
            .engine
            .torrent(&restored[0].info_hash)
            .await
            .unwrap();
        assert_eq!(torrent.trackers, vec!["udp://t1:80", "udp://t2:80"]);
    }

    #[tokio::test]
    async fn test_partial_restore_reports_every_failure() {
        let f = fixture();
        let good = test_magnet(1, "good");
        let bad = test_magnet(2, "bad");
        let snapshot = BackupSnapshot {
            label: "mixed".to_string(),
            created_at: Utc::now(),
            entries: [good.as_str(), bad.as_str(), "magnet:?dn=broken"]
                .iter()
                .map(|source| BackupEntry {
                    source: source.to_string(),
                    name: "x".to_string(),
                    priority: 5,
                    sequential: false,
                    super_seeding: false,
                    trackers: Vec::new(),
                    download_limit: 0,
                    upload_limit: 0,
                    save_path: None,
                    added_at: Utc::now(),
                })
                .collect(),
            config: SessionConfig::default(),
        };
        f.engine.reject_source(&bad).await;

        let result = f.manager.restore(&snapshot).await;
        let Err(BackupError::PartialRestoreFailure(report)) = result else {
            panic!("expected partial failure, got {:?}", result);
        };
        assert_eq!(report.restored.len(), 1);
        assert_eq!(report.restored[0].id, TorrentId(1));
        let failed: Vec<&str> = report.failed.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(failed, vec![bad.as_str(), "magnet:?dn=broken"]);
        assert_eq!(f.registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_list_and_load_latest() {
        let f = fixture();
        assert!(f.manager.list_backups().await.unwrap().is_empty());
        assert!(f.manager.load_latest().await.unwrap().is_none());

        f.manager.create_backup("first").await.unwrap();
        f.registry
            .add(&test_magnet(1, "alpha"), Default::default())
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        f.manager.create_backup("second").await.unwrap();

        // Junk files are ignored
        std::fs::write(f.manager.dir().join("notes.txt"), b"hello").unwrap();
        std::fs::write(f.manager.dir().join("broken.json"), b"{").unwrap();

        let backups = f.manager.list_backups().await.unwrap();
        let labels: Vec<&str> = backups.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["first", "second"]);

        let latest = f.manager.load_latest().await.unwrap().unwrap();
        assert_eq!(latest.label, "second");
        assert_eq!(latest.entries.len(), 1);
    }

    #[tokio::test]
    async fn test_load_missing_backup() {
        let f = fixture();
        assert!(matches!(
            f.manager.load_backup("nope.json").await,
            Err(BackupError::NotFound(_))
        ));
        assert!(matches!(
            f.manager.load_backup("../escape.json").await,
            Err(BackupError::NotFound(_))
        ));
    }
}
