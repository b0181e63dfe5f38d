//! Gateway discovery
//!
//! The gateway publishes `coreProps.json`:
//!
//! ```json
//! { "address": "127.0.0.1:51234", "encryptedAddress": "..." }
//! ```
//!
//! Lookup order: explicit path, `STEELCLOCK_CORE_PROPS`, platform default.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::GatewayError;

/// Environment variable overriding the `coreProps.json` location
pub const CORE_PROPS_ENV: &str = "STEELCLOCK_CORE_PROPS";

/// Contents of `coreProps.json`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CoreProps {
    /// `HOST:PORT` of the plain HTTP endpoint
    pub address: String,
    /// Address of the TLS endpoint (unused)
    #[serde(rename = "encryptedAddress", default)]
    pub encrypted_address: Option<String>,
}

/// Where the gateway writes `coreProps.json` on this platform
#[must_use]
pub fn default_core_props_path() -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        let base = std::env::var_os("PROGRAMDATA")
            .map_or_else(|| PathBuf::from(r"C:\ProgramData"), PathBuf::from);
        Some(
            base.join("SteelSeries")
                .join("SteelSeries Engine 3")
                .join("coreProps.json"),
        )
    } else if cfg!(target_os = "macos") {
        Some(PathBuf::from(
            "/Library/Application Support/SteelSeries Engine 3/coreProps.json",
        ))
    } else {
        None
    }
}

/// Resolve the `coreProps.json` path
#[must_use]
pub fn resolve_core_props_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CORE_PROPS_ENV).map(PathBuf::from))
        .or_else(default_core_props_path)
}

/// Read and validate `coreProps.json`
///
/// # Errors
///
/// Returns [`GatewayError::Unavailable`] if the file is missing, malformed,
/// or has an empty `address`.
pub async fn read_core_props(path: &Path) -> Result<CoreProps, GatewayError> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        GatewayError::Unavailable(format!("cannot read {}: {e}", path.display()))
    })?;
    let props: CoreProps = serde_json::from_str(&raw).map_err(|e| {
        GatewayError::Unavailable(format!("malformed {}: {e}", path.display()))
    })?;
    if props.address.trim().is_empty() {
        return Err(GatewayError::Unavailable(format!(
            "{} has no address",
            path.display()
        )));
    }
    Ok(props)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_props(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coreProps.json");
        tokio::fs::write(&path, contents).await.unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_read_core_props() {
        let (_dir, path) =
            write_props(r#"{"address": "127.0.0.1:51234", "encryptedAddress": "127.0.0.1:51235"}"#)
                .await;
        let props = read_core_props(&path).await.unwrap();
        assert_eq!(props.address, "127.0.0.1:51234");
        assert_eq!(props.encrypted_address.as_deref(), Some("127.0.0.1:51235"));
    }

    #[tokio::test]
    async fn test_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let missing = read_core_props(&dir.path().join("nope.json")).await;
        assert!(matches!(missing, Err(GatewayError::Unavailable(_))));

        let (_dir, path) = write_props("{\"addr\": 1}").await;
        assert!(matches!(
            read_core_props(&path).await,
            Err(GatewayError::Unavailable(_))
        ));

        let (_dir, path) = write_props(r#"{"address": "  "}"#).await;
        assert!(matches!(
            read_core_props(&path).await,
            Err(GatewayError::Unavailable(_))
        ));
    }

    #[test]
    fn test_explicit_path_wins() {
        let explicit = Path::new("/tmp/custom/coreProps.json");
        assert_eq!(
            resolve_core_props_path(Some(explicit)),
            Some(explicit.to_path_buf())
        );
    }
}
