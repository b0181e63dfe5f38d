//! App directory discovery
//!
//! The app directory holds `config.json` (or a `profiles/` folder of
//! alternative configs) and receives `steelclock.log` / `panic.log`.

use std::path::{Path, PathBuf};

/// Primary configuration file name
pub const CONFIG_FILE: &str = "config.json";

/// Folder of alternative configurations
pub const PROFILES_DIR: &str = "profiles";

/// Whether `dir` holds `config.json` or a `profiles/` folder
pub async fn is_app_dir(dir: &Path) -> bool {
    let has_config = tokio::fs::metadata(dir.join(CONFIG_FILE))
        .await
        .is_ok_and(|m| m.is_file());
    let has_profiles = tokio::fs::metadata(dir.join(PROFILES_DIR))
        .await
        .is_ok_and(|m| m.is_dir());
    has_config || has_profiles
}

/// First qualifying directory among `candidates`, in order
pub async fn find_app_dir<I>(candidates: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    for dir in candidates {
        if is_app_dir(&dir).await {
            tracing::debug!(dir = %dir.display(), "Found app directory");
            return Some(dir);
        }
    }
    None
}

/// Configuration file inside an app directory
///
/// `config.json` wins; otherwise the alphabetically first `profiles/*.json`.
pub async fn config_in_app_dir(dir: &Path) -> Option<PathBuf> {
    let primary = dir.join(CONFIG_FILE);
    if tokio::fs::metadata(&primary).await.is_ok_and(|m| m.is_file()) {
        return Some(primary);
    }

    let mut entries = tokio::fs::read_dir(dir.join(PROFILES_DIR)).await.ok()?;
    let mut profiles = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            profiles.push(path);
        }
    }
    profiles.sort();
    profiles.into_iter().next()
}
