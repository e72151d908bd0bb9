//! Update detection for installed models
//!
//! Compares each installed model's version with the latest version in the
//! index. Results are cached for a fixed window; the first read after the
//! window runs a full rescan. There is no background timer.

use chrono::{DateTime, Duration, Utc};
use meshvault_core::{compare_version_strings, is_newer, Clock, MeshvaultResult};
use meshvault_store::IndexCache;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::record::InstalledModels;

/// Default freshness window of a scan, in seconds
pub const DEFAULT_CHECK_INTERVAL_SECS: i64 = 300;

/// Update state of one installed model
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateInfo {
    pub model_id: String,
    pub name: String,
    pub local_version: String,
    pub remote_version: String,
    pub has_update: bool,
    pub description: String,
    pub last_checked: DateTime<Utc>,
}

/// Whether a cached result taken at `last_checked` is stale at `now`
pub fn window_elapsed(now: DateTime<Utc>, last_checked: Option<DateTime<Utc>>, interval: Duration) -> bool {
    match last_checked {
        Some(last) => now - last >= interval,
        None => true,
    }
}

#[derive(Default)]
struct DetectorState {
    entries: HashMap<String, UpdateInfo>,
    last_scan: Option<DateTime<Utc>>,
}

/// Detects installed models with newer versions in the index
pub struct UpdateDetector {
    index: Arc<IndexCache>,
    installed: Arc<dyn InstalledModels>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    state: Mutex<DetectorState>,
}

impl UpdateDetector {
    /// Create a detector with the default five minute window
    pub fn new(
        index: Arc<IndexCache>,
        installed: Arc<dyn InstalledModels>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            index,
            installed,
            clock,
            interval: Duration::seconds(DEFAULT_CHECK_INTERVAL_SECS),
            state: Mutex::new(DetectorState::default()),
        }
    }

    /// Override the freshness window
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Cached state, rescanned first if the window has elapsed
    async fn fresh_state(&self) -> MeshvaultResult<MutexGuard<'_, DetectorState>> {
        let mut state = self.state.lock().await;
        if window_elapsed(self.clock.now(), state.last_scan, self.interval) {
            self.rescan(&mut state).await?;
        }
        Ok(state)
    }

    async fn rescan(&self, state: &mut DetectorState) -> MeshvaultResult<()> {
        let index = self.index.refresh().await?;
        let installs = self.installed.installed().await?;
        let now = self.clock.now();

        let mut entries: HashMap<String, UpdateInfo> = HashMap::new();
        for install in installs {
            let record = install.record;
            let Some(local) = record.known_version() else {
                debug!(model_id = %record.model_id, "No known local version, skipping");
                continue;
            };
            let Some(entry) = index.get(&record.model_id) else {
                continue;
            };

            // several installs of one model: track the newest
            if let Some(existing) = entries.get(&record.model_id) {
                if compare_version_strings(&existing.local_version, local).is_ge() {
                    continue;
                }
            }

            let info = UpdateInfo {
                model_id: record.model_id.clone(),
                name: entry.name.clone(),
                local_version: local.to_string(),
                remote_version: entry.latest_version.clone(),
                has_update: is_newer(&entry.latest_version, local),
                description: entry.description.clone(),
                last_checked: now,
            };
            entries.insert(record.model_id.clone(), info);
        }

        state.entries = entries;
        state.last_scan = Some(now);

        info!(
            tracked = state.entries.len(),
            updates = state.entries.values().filter(|e| e.has_update).count(),
            "Scanned for model updates"
        );
        Ok(())
    }

    /// Installed models with a newer version available, ordered by model id
    pub async fn updates(&self) -> MeshvaultResult<Vec<UpdateInfo>> {
        let state = self.fresh_state().await?;
        let mut updates: Vec<UpdateInfo> = state
            .entries
            .values()
            .filter(|e| e.has_update)
            .cloned()
            .collect();
        updates.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        Ok(updates)
    }

    /// Update state of one model
    pub async fn get(&self, model_id: &str) -> MeshvaultResult<Option<UpdateInfo>> {
        Ok(self.fresh_state().await?.entries.get(model_id).cloned())
    }

    /// Whether one model has an update
    pub async fn has_update(&self, model_id: &str) -> MeshvaultResult<bool> {
        Ok(self
            .fresh_state()
            .await?
            .entries
            .get(model_id)
            .map_or(false, |e| e.has_update))
    }

    /// Number of models with an update
    pub async fn update_count(&self) -> MeshvaultResult<usize> {
        Ok(self
            .fresh_state()
            .await?
            .entries
            .values()
            .filter(|e| e.has_update)
            .count())
    }

    /// Rescan now regardless of the window
    pub async fn refresh(&self) -> MeshvaultResult<()> {
        let mut state = self.state.lock().await;
        self.rescan(&mut state).await
    }

    /// Drop cached results; the next read rescans
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.last_scan = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{InstallRecord, LocalInstall, UNKNOWN_VERSION};
    use async_trait::async_trait;
    use meshvault_backend::{FsBackend, RepositoryBackend};
    use meshvault_core::{ManualClock, ModelIdentity, ModelMetadata};
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeInstalls {
        installs: StdMutex<Vec<(String, Option<String>)>>,
    }

    impl FakeInstalls {
        fn set(&self, values: &[(&str, Option<&str>)]) {
            *self.installs.lock().unwrap() = values
                .iter()
                .map(|(id, v)| (id.to_string(), v.map(str::to_string)))
                .collect();
        }
    }

    #[async_trait]
    impl InstalledModels for FakeInstalls {
        async fn installed(&self) -> MeshvaultResult<Vec<LocalInstall>> {
            let installs = self.installs.lock().unwrap().clone();
            Ok(installs
                .into_iter()
                .map(|(model_id, version)| LocalInstall {
                    folder: PathBuf::from("/ws/Models").join(&model_id),
                    record: InstallRecord {
                        model_id,
                        name: String::new(),
                        version,
                        installed_at: Utc::now(),
                        asset_ids: Vec::new(),
                        remapped_ids: BTreeMap::new(),
                        files: Vec::new(),
                    },
                })
                .collect())
        }
    }

    struct Fixture {
        _dir: TempDir,
        index: Arc<IndexCache>,
        installs: Arc<FakeInstalls>,
        clock: Arc<ManualClock>,
        detector: UpdateDetector,
    }

    async fn fixture(published: &[(&str, &str)]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let backend: Arc<dyn RepositoryBackend> = Arc::new(FsBackend::new(dir.path()));
        let index = Arc::new(IndexCache::new(backend));
        for (id, version) in published {
            let mut meta = ModelMetadata::new(ModelIdentity::new(*id, *id), *version);
            meta.description = format!("{} model", id);
            index.update_entry(&meta).await.unwrap();
        }

        let installs = Arc::new(FakeInstalls::default());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let detector = UpdateDetector::new(index.clone(), installs.clone(), clock.clone());
        Fixture {
            _dir: dir,
            index,
            installs,
            clock,
            detector,
        }
    }

    #[test]
    fn test_window_elapsed() {
        let now = Utc::now();
        let interval = Duration::minutes(5);
        assert!(window_elapsed(now, None, interval));
        assert!(!window_elapsed(now, Some(now - Duration::minutes(4)), interval));
        assert!(window_elapsed(now, Some(now - Duration::minutes(5)), interval));
    }

    #[tokio::test]
    async fn test_reports_newer_remote() {
        let f = fixture(&[("chair", "1.2.0"), ("table", "2.0.0")]).await;
        f.installs
            .set(&[("chair", Some("1.0.0")), ("table", Some("2.0.0"))]);

        let updates = f.detector.updates().await.unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].model_id, "chair");
        assert_eq!(updates[0].remote_version, "1.2.0");
        assert_eq!(updates[0].description, "chair model");

        assert!(f.detector.has_update("chair").await.unwrap());
        assert!(!f.detector.has_update("table").await.unwrap());
        assert_eq!(f.detector.update_count().await.unwrap(), 1);
        assert!(!f.detector.get("table").await.unwrap().unwrap().has_update);
    }

    #[tokio::test]
    async fn test_no_false_updates() {
        let f = fixture(&[("chair", "1.2.0"), ("table", "1.2.0"), ("lamp", "1.2.0")]).await;
        f.installs.set(&[
            ("chair", Some(UNKNOWN_VERSION)),
            ("table", None),
            ("lamp", Some("legacy")),
        ]);

        assert!(f.detector.updates().await.unwrap().is_empty());
        assert!(!f.detector.has_update("chair").await.unwrap());
        assert!(f.detector.get("chair").await.unwrap().is_none());
        assert!(f.detector.get("table").await.unwrap().is_none());
        // tracked, but an undecidable comparison is never an update
        assert!(!f.detector.get("lamp").await.unwrap().unwrap().has_update);
    }

    #[tokio::test]
    async fn test_results_cached_within_window() {
        let f = fixture(&[("chair", "1.2.0")]).await;
        f.installs.set(&[("chair", Some("1.0.0"))]);
        assert_eq!(f.detector.update_count().await.unwrap(), 1);

        f.installs.set(&[("chair", Some("1.2.0"))]);
        f.clock.advance(Duration::minutes(4));
        assert_eq!(f.detector.update_count().await.unwrap(), 1);

        f.clock.advance(Duration::minutes(2));
        assert_eq!(f.detector.update_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_refresh_and_clear() {
        let f = fixture(&[("chair", "1.0.0")]).await;
        f.installs.set(&[("chair", Some("1.0.0"))]);
        assert_eq!(f.detector.update_count().await.unwrap(), 0);

        let meta = ModelMetadata::new(ModelIdentity::new("chair", "chair"), "1.1.0");
        f.index.update_entry(&meta).await.unwrap();
        assert_eq!(f.detector.update_count().await.unwrap(), 0);

        f.detector.refresh().await.unwrap();
        assert_eq!(f.detector.update_count().await.unwrap(), 1);

        f.installs.set(&[("chair", Some("1.1.0"))]);
        f.detector.clear().await;
        assert_eq!(f.detector.update_count().await.unwrap(), 0);
    }
}
