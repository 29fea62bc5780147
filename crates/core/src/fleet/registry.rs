//! Fleet registry: the only owner of engine handles.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::types::{
    validate_priority, AddTorrentOptions, FleetError, TorrentEntry, TorrentId, DEFAULT_PRIORITY,
};
use crate::config::{EngineConfig, SessionConfig};
use crate::engine::{
    parse_magnet, AddOptions, EngineError, EngineHandle, FileEntry, StatusSnapshot,
    TorrentSource, TorrentState, TransferEngine,
};
use crate::metrics::{ENGINE_TIMEOUTS, FLEET_ADDS, FLEET_REMOVES};

/// Registry tuning.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub call_timeout: Duration,
    pub add_timeout: Duration,
    /// Add-time defaults (auto_start, sequential, super-seeding, priority, path).
    pub session: SessionConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default(), &SessionConfig::default())
    }
}

impl RegistryConfig {
    pub fn from_config(engine: &EngineConfig, session: &SessionConfig) -> Self {
        Self {
            call_timeout: Duration::from_secs(engine.call_timeout_secs),
            add_timeout: Duration::from_secs(engine.add_timeout_secs),
            session: session.clone(),
        }
    }
}

struct InitialAttributes {
    priority: u8,
    sequential: bool,
    super_seeding: bool,
    start: bool,
}

struct Slot {
    entry: TorrentEntry,
    handle: Arc<dyn EngineHandle>,
}

#[derive(Default)]
struct FleetState {
    last_id: u64,
    /// Ordered by id, so iteration is insertion order.
    slots: BTreeMap<TorrentId, Slot>,
}

/// Maps torrent ids to engine handles and cached metadata.
///
/// Mutations are serialized by `mutation`; `state` is only ever locked for
/// in-memory reads and commits, never across an engine call, so readers
/// never wait on the engine.
pub struct FleetRegistry {
    engine: Arc<dyn TransferEngine>,
    config: RegistryConfig,
    state: RwLock<FleetState>,
    mutation: Mutex<()>,
}

impl FleetRegistry {
    pub fn new(engine: Arc<dyn TransferEngine>, config: RegistryConfig) -> Self {
        Self {
            engine,
            config,
            state: RwLock::new(FleetState::default()),
            mutation: Mutex::new(()),
        }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn session_defaults(&self) -> &SessionConfig {
        &self.config.session
    }

    /// Add a source and return its new id.
    ///
    /// The engine call runs without any registry lock; the entry becomes
    /// visible only once it is fully set up. Without `auto_start` the
    /// transfer is left to the engine's queue.
    pub async fn add(
        &self,
        source: &str,
        options: AddTorrentOptions,
    ) -> Result<TorrentId, FleetError> {
        let defaults = &self.config.session;
        let priority = match options.priority {
            Some(level) => validate_priority(level as i64)?,
            None => defaults.default_priority,
        };
        let sequential = options.sequential.unwrap_or(defaults.sequential_download);
        let super_seeding = defaults.super_seeding;

        if source.trim().is_empty() {
            FLEET_ADDS.with_label_values(&["rejected"]).inc();
            return Err(FleetError::EngineRejected("empty source".to_string()));
        }

        let parsed = TorrentSource::parse(source);
        let add_options = AddOptions {
            download_path: Some(defaults.download_path.clone()),
        };

        let handle = self
            .bounded("add", self.config.add_timeout, self.engine.add(&parsed, &add_options))
            .await
            .map_err(|e| {
                FLEET_ADDS.with_label_values(&["rejected"]).inc();
                debug!(source = %source, error = %e, "Engine did not accept source");
                FleetError::from_add(e)
            })?;

        if let Some(existing) = self.find_by_key(handle.key()).await {
            FLEET_ADDS.with_label_values(&["rejected"]).inc();
            return Err(already_tracked(existing));
        }

        let initial = InitialAttributes {
            priority,
            sequential,
            super_seeding,
            start: defaults.auto_start,
        };
        if let Err(e) = self.apply_initial_attributes(&handle, &initial).await {
            warn!(source = %source, error = %e, "Initial attributes failed, releasing handle");
            // A concurrent add of the same torrent may own it by now
            if self.find_by_key(handle.key()).await.is_none() {
                if let Err(release) = self
                    .bounded("remove", self.config.call_timeout, handle.remove(false))
                    .await
                {
                    warn!(key = %handle.key(), error = %release, "Failed to release handle");
                }
            }
            FLEET_ADDS.with_label_values(&["failed"]).inc();
            return Err(FleetError::from_engine(e));
        }

        let status = match self
            .bounded("status", self.config.call_timeout, handle.status())
            .await
        {
            Ok(status) => status,
            Err(e) => {
                debug!(key = %handle.key(), error = %e, "Initial status unavailable");
                StatusSnapshot {
                    state: TorrentState::Queued,
                    ..Default::default()
                }
            }
        };

        let trackers = match self
            .bounded("trackers", self.config.call_timeout, handle.trackers())
            .await
        {
            Ok(trackers) => trackers,
            Err(e) => {
                debug!(key = %handle.key(), error = %e, "Engine tracker list unavailable");
                match &parsed {
                    TorrentSource::Magnet(uri) => {
                        parse_magnet(uri).map(|m| m.trackers).unwrap_or_default()
                    }
                    _ => Vec::new(),
                }
            }
        };
        let name = status
            .name
            .clone()
            .unwrap_or_else(|| fallback_name(&parsed, handle.key()));
        let info_hash = handle.key().to_string();

        let _guard = self.mutation.lock().await;
        let mut state = self.state.write().await;
        // Re-checked under the lock: two adds of one torrent can both pass
        // the early check while their engine calls are in flight.
        if let Some(existing) = state
            .slots
            .values()
            .find(|slot| slot.entry.info_hash == info_hash)
            .map(|slot| slot.entry.id)
        {
            FLEET_ADDS.with_label_values(&["rejected"]).inc();
            debug!(torrent_id = %existing, "Concurrent add of a tracked torrent dropped");
            return Err(already_tracked(existing));
        }
        state.last_id += 1;
        let id = TorrentId(state.last_id);
        state.slots.insert(
            id,
            Slot {
                entry: TorrentEntry {
                    id,
                    source: source.to_string(),
                    name: name.clone(),
                    info_hash,
                    added_at: Utc::now(),
                    priority,
                    sequential,
                    super_seeding,
                    trackers,
                    download_limit: 0,
                    upload_limit: 0,
                    save_path: defaults.download_path.clone(),
                    last_known_status: status,
                },
                handle,
            },
        );

        FLEET_ADDS.with_label_values(&["added"]).inc();
        info!(torrent_id = %id, name = %name, priority = priority, "Torrent added");
        Ok(id)
    }

    async fn apply_initial_attributes(
        &self,
        handle: &Arc<dyn EngineHandle>,
        initial: &InitialAttributes,
    ) -> Result<(), EngineError> {
        let timeout = self.config.call_timeout;
        if initial.priority != DEFAULT_PRIORITY {
            self.bounded("set_priority", timeout, handle.set_priority(initial.priority))
                .await?;
        }
        if initial.sequential {
            self.bounded("set_sequential", timeout, handle.set_sequential(true))
                .await?;
        }
        if initial.super_seeding {
            self.bounded("set_super_seeding", timeout, handle.set_super_seeding(true))
                .await?;
        }
        if initial.start {
            self.bounded("resume", timeout, handle.resume()).await?;
        }
        Ok(())
    }

    /// Release the handle, then evict the entry.
    ///
    /// An engine that no longer knows the torrent still gets the entry
    /// evicted; any other engine failure leaves it in place.
    pub async fn remove(&self, id: TorrentId, delete_data: bool) -> Result<(), FleetError> {
        let _guard = self.mutation.lock().await;
        let handle = self.handle(id).await?;

        match self
            .bounded("remove", self.config.call_timeout, handle.remove(delete_data))
            .await
        {
            Ok(()) => {}
            Err(EngineError::TorrentNotFound(_)) => {
                warn!(torrent_id = %id, "Engine no longer knows torrent, evicting");
            }
            Err(e) => return Err(FleetError::from_engine(e)),
        }

        self.state.write().await.slots.remove(&id);
        FLEET_REMOVES.inc();
        info!(torrent_id = %id, delete_data = delete_data, "Torrent removed");
        Ok(())
    }

    pub async fn get(&self, id: TorrentId) -> Result<TorrentEntry, FleetError> {
        self.state
            .read()
            .await
            .slots
            .get(&id)
            .map(|slot| slot.entry.clone())
            .ok_or(FleetError::NotFound(id))
    }

    /// Entries in insertion order, optionally filtered by cached state.
    pub async fn list(&self, filter_by_status: Option<TorrentState>) -> Vec<TorrentEntry> {
        self.state
            .read()
            .await
            .slots
            .values()
            .filter(|slot| {
                filter_by_status
                    .map(|state| slot.entry.last_known_status.state == state)
                    .unwrap_or(true)
            })
            .map(|slot| slot.entry.clone())
            .collect()
    }

    /// Case-insensitive name substring search.
    pub async fn search(&self, query: &str) -> Vec<TorrentEntry> {
        let needle = query.to_lowercase();
        self.state
            .read()
            .await
            .slots
            .values()
            .filter(|slot| slot.entry.name.to_lowercase().contains(&needle))
            .map(|slot| slot.entry.clone())
            .collect()
    }

    pub async fn ids(&self) -> Vec<TorrentId> {
        self.state.read().await.slots.keys().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.slots.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.slots.is_empty()
    }

    pub async fn pause(&self, id: TorrentId) -> Result<(), FleetError> {
        self.mutate(id, "pause", |h| async move { h.pause().await }, |entry, _| {
            entry.last_known_status.state = TorrentState::Paused;
        })
        .await?;
        debug!(torrent_id = %id, "Torrent paused");
        Ok(())
    }

    /// Resume; the cached state reads `queued` until the next status poll.
    pub async fn resume(&self, id: TorrentId) -> Result<(), FleetError> {
        self.mutate(id, "resume", |h| async move { h.resume().await }, |entry, _| {
            entry.last_known_status.state = TorrentState::Queued;
        })
        .await?;
        debug!(torrent_id = %id, "Torrent resumed");
        Ok(())
    }

    /// Poll live status into the cache.
    pub async fn refresh(&self, id: TorrentId) -> Result<StatusSnapshot, FleetError> {
        let handle = self.handle(id).await?;
        let status = self
            .bounded("status", self.config.call_timeout, handle.status())
            .await
            .map_err(FleetError::from_engine)?;

        let mut state = self.state.write().await;
        let slot = state.slots.get_mut(&id).ok_or(FleetError::NotFound(id))?;
        if let Some(name) = status.name.as_ref() {
            if slot.entry.name != *name {
                slot.entry.name = name.clone();
            }
        }
        slot.entry.last_known_status = status.clone();
        Ok(status)
    }

    /// Refresh every entry concurrently; one result per id, in insertion
    /// order. A stalled engine costs one call timeout, not one per entry.
    pub async fn refresh_all(&self) -> Vec<(TorrentId, Result<StatusSnapshot, FleetError>)> {
        let ids = self.ids().await;
        let polls = ids.iter().map(|&id| self.refresh(id));
        ids.iter().copied().zip(join_all(polls).await).collect()
    }

    /// Live tracker list, cached on success. Engines that cannot list
    /// trackers answer with the cached set.
    pub async fn trackers(&self, id: TorrentId) -> Result<Vec<String>, FleetError> {
        let handle = self.handle(id).await?;
        match self
            .bounded("trackers", self.config.call_timeout, handle.trackers())
            .await
        {
            Ok(trackers) => {
                let mut state = self.state.write().await;
                let slot = state.slots.get_mut(&id).ok_or(FleetError::NotFound(id))?;
                slot.entry.trackers = trackers.clone();
                Ok(trackers)
            }
            Err(EngineError::Unsupported(_)) => Ok(self.get(id).await?.trackers),
            Err(e) => Err(FleetError::from_engine(e)),
        }
    }

    pub async fn files(&self, id: TorrentId) -> Result<Vec<FileEntry>, FleetError> {
        let handle = self.handle(id).await?;
        self.bounded("files", self.config.call_timeout, handle.files())
            .await
            .map_err(FleetError::from_engine)
    }

    pub async fn export_torrent_file(&self, id: TorrentId) -> Result<Vec<u8>, FleetError> {
        let handle = self.handle(id).await?;
        self.bounded(
            "export_torrent_file",
            self.config.call_timeout,
            handle.export_torrent_file(),
        )
        .await
        .map_err(FleetError::from_engine)
    }

    /// Drop every handle without touching engine-side torrents.
    pub async fn release_all(&self) -> usize {
        let _guard = self.mutation.lock().await;
        let mut state = self.state.write().await;
        let released = state.slots.len();
        state.slots.clear();
        info!(released = released, "Released engine handles");
        released
    }

    /// Run one serialized engine mutation against `id`, then commit its
    /// effect on the cached entry.
    pub(crate) async fn mutate<T, C, Fut, U>(
        &self,
        id: TorrentId,
        operation: &'static str,
        call: C,
        commit: U,
    ) -> Result<T, FleetError>
    where
        C: FnOnce(Arc<dyn EngineHandle>) -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
        U: FnOnce(&mut TorrentEntry, &T),
    {
        let _guard = self.mutation.lock().await;
        let handle = self.handle(id).await?;

        let value = self
            .bounded(operation, self.config.call_timeout, call(handle))
            .await
            .map_err(FleetError::from_engine)?;

        let mut state = self.state.write().await;
        let slot = state.slots.get_mut(&id).ok_or(FleetError::NotFound(id))?;
        commit(&mut slot.entry, &value);
        Ok(value)
    }

    async fn handle(&self, id: TorrentId) -> Result<Arc<dyn EngineHandle>, FleetError> {
        self.state
            .read()
            .await
            .slots
            .get(&id)
            .map(|slot| slot.handle.clone())
            .ok_or(FleetError::NotFound(id))
    }

    async fn find_by_key(&self, key: &str) -> Option<TorrentId> {
        self.state
            .read()
            .await
            .slots
            .values()
            .find(|slot| slot.entry.info_hash == key)
            .map(|slot| slot.entry.id)
    }

    async fn bounded<T, F>(
        &self,
        operation: &str,
        limit: Duration,
        fut: F,
    ) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation = operation,
                    timeout_ms = limit.as_millis() as u64,
                    "Engine call timed out"
                );
                ENGINE_TIMEOUTS.with_label_values(&[operation]).inc();
                Err(EngineError::Timeout)
            }
        }
    }
}

fn already_tracked(existing: TorrentId) -> FleetError {
    FleetError::EngineRejected(format!("already tracked as torrent {}", existing))
}

fn fallback_name(source: &TorrentSource, key: &str) -> String {
    let from_source = match source {
        TorrentSource::Magnet(uri) => parse_magnet(uri).and_then(|m| m.display_name),
        TorrentSource::File(path) => Path::new(path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned()),
        TorrentSource::Url(url) => url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string()),
    };
    from_source.unwrap_or_else(|| format!("torrent-{}", key.chars().take(8).collect::<String>()))
}
