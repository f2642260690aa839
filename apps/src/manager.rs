//! App Manager (C10).
//!
//! Apps are a veneer over services: `register_app` calls through to
//! `SystemCore::register` under the app's name and stores the resulting
//! service-id alongside the manifest. Starting/pausing/stopping an app
//! drives both the app's own `AppState` and, where relevant, the
//! underlying service's `ServiceState`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use abi::{AppSource, AppState, CoreError, CoreResult, QuotaLimits, ServiceId, ServiceState};
use runtime_core::SystemCore;

use crate::capability_table::{AppCapabilityTable, AppContext};
use crate::image::{verify_image, ImageLoader};
use crate::lifecycle_tracker::AppLifecycleTracker;
use crate::manifest::{AppInfo, AppManifest, AppRecord};

const DEFAULT_EXTERNAL_POOL_BYTES: usize = 1024 * 1024;

pub struct AppManager {
    core: Arc<SystemCore>,
    table: Arc<AppCapabilityTable>,
    tracker: Arc<Mutex<AppLifecycleTracker>>,
    max_apps: usize,
    apps: Mutex<HashMap<u16, AppRecord>>,
    /// Opaque on-storage blobs, keyed by app name. Stands in for flash or
    /// a remote fetch result -- durable storage itself is out of scope.
    storage: Mutex<HashMap<String, Vec<u8>>>,
}

impl AppManager {
    pub fn new(core: Arc<SystemCore>, max_apps: usize) -> Arc<Self> {
        let tracker = Arc::new(Mutex::new(AppLifecycleTracker::new()));
        let table = AppCapabilityTable::new(core.clone(), tracker.clone(), DEFAULT_EXTERNAL_POOL_BYTES);
        Arc::new(AppManager {
            core,
            table,
            tracker,
            max_apps,
            apps: Mutex::new(HashMap::new()),
            storage: Mutex::new(HashMap::new()),
        })
    }

    fn apps(&self) -> std::sync::MutexGuard<'_, HashMap<u16, AppRecord>> {
        self.apps.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn info_of(record: &AppRecord) -> AppInfo {
        AppInfo {
            service_id: record.service_id,
            name: record.manifest.name.clone(),
            version: record.manifest.version.clone(),
            author: record.manifest.author.clone(),
            source: record.manifest.source,
            state: record.state,
        }
    }

    /// Allocates an app record, registers the backing service, and leaves
    /// the app in `Loaded`. Does not start it.
    pub fn register_app(&self, manifest: AppManifest) -> CoreResult<AppInfo> {
        let mut apps = self.apps();
        if apps.len() >= self.max_apps {
            return Err(CoreError::AppRegistryFull);
        }
        if apps.values().any(|r| r.manifest.name == manifest.name) {
            return Err(CoreError::AppAlreadyRegistered);
        }

        let service_id = self
            .core
            .register(&manifest.name, manifest.user_data.clone(), QuotaLimits::default())?;
        let context = Arc::new(AppContext {
            service_id,
            table: self.table.clone(),
        });

        let record = AppRecord {
            manifest,
            service_id,
            state: AppState::Loaded,
            context,
        };
        let info = Self::info_of(&record);
        apps.insert(service_id.0, record);
        Ok(info)
    }

    fn find_mut<'a>(apps: &'a mut HashMap<u16, AppRecord>, name: &str) -> CoreResult<&'a mut AppRecord> {
        apps.values_mut().find(|r| r.manifest.name == name).ok_or(CoreError::AppNotFound)
    }

    /// Transitions `Loaded -> Running` and invokes `entry(ctx)`.
    pub fn start_app(&self, name: &str) -> CoreResult<()> {
        let mut apps = self.apps();
        let record = Self::find_mut(&mut apps, name)?;
        if record.state != AppState::Loaded && record.state != AppState::Stopped {
            return Err(CoreError::AppInvalidState);
        }
        let service_id = record.service_id;
        self.core.set_state(service_id, ServiceState::Registered)?;
        self.core.set_state(service_id, ServiceState::Running)?;
        let entry = record.manifest.entry;
        let context = record.context.clone();
        record.state = AppState::Running;
        drop(apps);

        if entry(&context).is_err() {
            let _ = self.core.set_state(service_id, ServiceState::Stopping);
            let mut apps = self.apps();
            if let Ok(record) = Self::find_mut(&mut apps, name) {
                record.state = AppState::Stopped;
            }
            return Err(CoreError::AppEntryFailed);
        }
        Ok(())
    }

    pub fn pause_app(&self, name: &str) -> CoreResult<()> {
        let mut apps = self.apps();
        let record = Self::find_mut(&mut apps, name)?;
        if record.state != AppState::Running {
            return Err(CoreError::AppInvalidState);
        }
        self.core.set_state(record.service_id, ServiceState::Paused)?;
        record.state = AppState::Paused;
        Ok(())
    }

    pub fn resume_app(&self, name: &str) -> CoreResult<()> {
        let mut apps = self.apps();
        let record = Self::find_mut(&mut apps, name)?;
        if record.state != AppState::Paused {
            return Err(CoreError::AppInvalidState);
        }
        self.core.set_state(record.service_id, ServiceState::Running)?;
        record.state = AppState::Running;
        Ok(())
    }

    /// Auto-unsubscribes (C12) then invokes `exit(ctx)`.
    pub fn stop_app(&self, name: &str) -> CoreResult<()> {
        let mut apps = self.apps();
        let record = Self::find_mut(&mut apps, name)?;
        if record.state == AppState::Stopped {
            return Ok(());
        }
        let service_id = record.service_id;
        let exit = record.manifest.exit;
        let context = record.context.clone();

        let tracked = self.tracker.lock().unwrap_or_else(|e| e.into_inner()).unsubscribe_all(service_id);
        for event_type in tracked {
            let _ = self.core.unsubscribe(service_id, event_type);
        }

        self.core.set_state(service_id, ServiceState::Stopping)?;
        record.state = AppState::Stopped;
        drop(apps);

        if exit(&context).is_err() {
            return Err(CoreError::AppExitFailed);
        }
        Ok(())
    }

    pub fn get_info(&self, name: &str) -> CoreResult<AppInfo> {
        self.apps()
            .values()
            .find(|r| r.manifest.name == name)
            .map(Self::info_of)
            .ok_or(CoreError::AppNotFound)
    }

    pub fn list_apps(&self) -> Vec<AppInfo> {
        self.apps().values().map(Self::info_of).collect()
    }

    pub fn get_running_apps(&self) -> Vec<AppInfo> {
        self.apps()
            .values()
            .filter(|r| r.state == AppState::Running)
            .map(Self::info_of)
            .collect()
    }

    /// `uninstall`: stop if running, deregister from the service registry,
    /// and drop any stored backing image.
    pub fn uninstall(&self, name: &str) -> CoreResult<()> {
        let _ = self.stop_app(name);
        let service_id = {
            let mut apps = self.apps();
            let record = Self::find_mut(&mut apps, name)?;
            record.service_id
        };
        self.apps().remove(&service_id.0);
        self.core.unregister(service_id)?;
        self.storage.lock().unwrap_or_else(|e| e.into_inner()).remove(name);
        Ok(())
    }

    /// Verifies and stores a binary image without registering it. Mirrors
    /// the "locate entry/exit and a manifest symbol" contract for the
    /// STORAGE source, minus the part this spec leaves to the loader.
    pub fn install(&self, name: &str, image: Vec<u8>) -> CoreResult<()> {
        verify_image(&image)?;
        self.storage.lock().unwrap_or_else(|e| e.into_inner()).insert(name.to_string(), image);
        Ok(())
    }

    /// Loads a previously `install`ed image, verifies it again, and hands
    /// the body to `loader` to produce entry/exit pointers and a manifest,
    /// then registers the app as usual.
    pub fn load_from_storage(&self, name: &str, loader: &dyn ImageLoader) -> CoreResult<AppInfo> {
        let image = self
            .storage
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
            .ok_or(CoreError::AppNotFound)?;
        let (header, body) = verify_image(&image)?;
        let mut manifest = loader.load(&header, body)?;
        manifest.source = AppSource::Storage;
        self.register_app(manifest)
    }

    /// Same contract as `load_from_storage`, but the bytes came from a
    /// remote fetch (performed by the caller) rather than local storage.
    pub fn load_from_url(&self, image: &[u8], loader: &dyn ImageLoader) -> CoreResult<AppInfo> {
        let (header, body) = verify_image(image)?;
        let mut manifest = loader.load(&header, body)?;
        manifest.source = AppSource::Remote;
        self.register_app(manifest)
    }

    pub fn capability_table(&self) -> Arc<AppCapabilityTable> {
        self.table.clone()
    }

    pub fn service_id_of(&self, name: &str) -> CoreResult<ServiceId> {
        self.get_info(name).map(|i| i.service_id)
    }
}
