use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ResolutionError, StorageError};
use crate::events::AppId;
use crate::store::write_atomic;

pub const DEFAULT_STORE_API_URL: &str = "https://store.steampowered.com/api/appdetails";

pub trait NameLookup {
    fn lookup(&self, app_id: AppId) -> Result<String, String>;
}

pub struct SteamStoreLookup {
    agent: ureq::Agent,
    api_url: String,
}

impl SteamStoreLookup {
    pub fn new(api_url: &str, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            api_url: api_url.trim().to_string(),
        }
    }
}

impl NameLookup for SteamStoreLookup {
    fn lookup(&self, app_id: AppId) -> Result<String, String> {
        let body = self
            .agent
            .get(&self.api_url)
            .query("appids", &app_id.to_string())
            .call()
            .map_err(|err| format!("store request failed: {err}"))?
            .into_string()
            .map_err(|err| format!("store response is not UTF-8: {err}"))?;
        parse_app_details_name(&body, app_id)
    }
}

#[derive(Deserialize)]
struct AppDetailsEntry {
    #[serde(default)]
    success: bool,
    data: Option<AppDetailsData>,
}

#[derive(Deserialize)]
struct AppDetailsData {
    name: String,
}

fn parse_app_details_name(body: &str, app_id: AppId) -> Result<String, String> {
    let mut parsed: HashMap<String, AppDetailsEntry> = serde_json::from_str(body)
        .map_err(|err| format!("invalid appdetails JSON: {err}"))?;
    let entry = parsed
        .remove(&app_id.to_string())
        .ok_or_else(|| "appdetails response has no entry for this app".to_string())?;
    if !entry.success {
        return Err("store reports no details for this app".to_string());
    }
    let name = entry
        .data
        .map(|data| data.name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| "appdetails entry has no name".to_string())?;
    Ok(name)
}

#[derive(Debug)]
pub struct NameCache {
    path: PathBuf,
    names: BTreeMap<String, String>,
}

impl NameCache {
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let names = if path.exists() {
            let raw = fs::read_to_string(path).map_err(|source| StorageError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            serde_json::from_str(&raw).map_err(|source| StorageError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            names,
        })
    }

    pub fn save(&self) -> Result<(), StorageError> {
        let data = serde_json::to_string(&self.names).map_err(|source| StorageError::Encode {
            path: self.path.clone(),
            source,
        })?;
        write_atomic(&self.path, data.as_bytes())
    }

    pub fn get(&self, app_id: AppId) -> Option<&str> {
        self.names.get(&app_id.to_string()).map(String::as_str)
    }

    pub fn insert(&mut self, app_id: AppId, name: String) {
        self.names.insert(app_id.to_string(), name);
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Resolution {
    pub names: BTreeMap<AppId, String>,
    pub failures: Vec<ResolutionError>,
}

impl Resolution {
    pub fn display_name(&self, app_id: AppId) -> String {
        self.names
            .get(&app_id)
            .cloned()
            .unwrap_or_else(|| app_id.to_string())
    }
}

/// Newly learned names are saved to `cache` before returning, even when other
/// ids failed.
pub fn resolve_names(
    app_ids: &[AppId],
    cache: &mut NameCache,
    lookup: &dyn NameLookup,
) -> Result<Resolution, StorageError> {
    let mut resolution = Resolution::default();
    let mut learned = 0usize;

    let pending = app_ids
        .iter()
        .filter(|app_id| cache.get(**app_id).is_none())
        .count();
    if pending > 0 {
        info!(pending, cached = app_ids.len() - pending, "looking up app names");
    }

    for app_id in app_ids {
        if let Some(name) = cache.get(*app_id) {
            resolution.names.insert(*app_id, name.to_string());
            continue;
        }
        match lookup.lookup(*app_id) {
            Ok(name) => {
                debug!(app_id = %app_id, name = %name, "resolved app name");
                cache.insert(*app_id, name.clone());
                resolution.names.insert(*app_id, name);
                learned += 1;
            }
            Err(reason) => resolution.failures.push(ResolutionError {
                app_id: *app_id,
                reason,
            }),
        }
    }

    if learned > 0 {
        cache.save()?;
        info!(learned, cached = cache.len(), "updated app name cache");
    }
    Ok(resolution)
}
