//! App manifest and lifecycle records (part of C10).

use std::sync::Arc;

use abi::{AppSource, AppState, ServiceId};
use runtime_core::UserData;

use crate::capability_table::AppContext;

pub type EntryFn = fn(&AppContext) -> Result<(), abi::CoreError>;
pub type ExitFn = fn(&AppContext) -> Result<(), abi::CoreError>;

/// `{name, version, author, entry fn, exit fn, user_data}`, plus the
/// source tag that selects the loading path.
#[derive(Clone)]
pub struct AppManifest {
    pub name: String,
    pub version: String,
    pub author: String,
    pub entry: EntryFn,
    pub exit: ExitFn,
    pub user_data: UserData,
    pub source: AppSource,
}

/// Read-only snapshot handed back by `register_app`, `get_info`, and
/// `list_apps`.
#[derive(Clone, Debug)]
pub struct AppInfo {
    pub service_id: ServiceId,
    pub name: String,
    pub version: String,
    pub author: String,
    pub source: AppSource,
    pub state: AppState,
}

pub(crate) struct AppRecord {
    pub manifest: AppManifest,
    pub service_id: ServiceId,
    pub state: AppState,
    pub context: Arc<AppContext>,
}
