// ⚙️ Build Configuration - paths and knobs, as data
//
// Loaded from an optional JSON file; every field has a default so an empty
// `{}` is a valid config. CLI flags override individual fields afterwards.

use crate::loader::DEFAULT_RESERVED_FILES;
use crate::stats::DEFAULT_TOP_N;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildConfig {
    /// Directory of per-account JSON files
    pub input_dir: PathBuf,

    /// Site root, replaced on every build
    pub output_dir: PathBuf,

    /// Copied verbatim into the site root when it exists
    pub static_dir: PathBuf,

    /// Browser extension sources (packaging input)
    pub extension_dir: PathBuf,

    /// Identifier list bundled with the extension
    pub extension_fallback_path: PathBuf,

    /// Where packaged artifacts are written
    pub dist_dir: PathBuf,

    pub site_title: String,

    /// Published URL of the combined listing, used by `lookup`
    pub listing_url: Option<String>,

    /// Cached listing used by `lookup` when the remote is unavailable
    pub cache_path: PathBuf,

    pub cache_freshness_days: i64,

    pub top_n: usize,

    pub reserved_files: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            input_dir: PathBuf::from("data/accounts"),
            output_dir: PathBuf::from("site"),
            static_dir: PathBuf::from("static"),
            extension_dir: PathBuf::from("extension"),
            extension_fallback_path: PathBuf::from("extension/data/identifiers.json"),
            dist_dir: PathBuf::from("dist"),
            site_title: "Account Directory".to_string(),
            listing_url: None,
            cache_path: PathBuf::from(".cache/listing.json"),
            cache_freshness_days: 7,
            top_n: DEFAULT_TOP_N,
            reserved_files: DEFAULT_RESERVED_FILES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl BuildConfig {
    /// Load config from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config JSON: {:?}", path.as_ref()))
    }

    /// Config file if given, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn cache_freshness(&self) -> chrono::Duration {
        chrono::Duration::days(self.cache_freshness_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: BuildConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, BuildConfig::default());
        assert_eq!(config.top_n, 20);
    }

    #[test]
    fn test_partial_config_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("directory.json");
        fs::write(&path, r#"{"outputDir": "public", "topN": 5, "siteTitle": "Watchlist"}"#).unwrap();

        let config = BuildConfig::load(Some(&path)).unwrap();

        assert_eq!(config.output_dir, PathBuf::from("public"));
        assert_eq!(config.top_n, 5);
        assert_eq!(config.site_title, "Watchlist");
        assert_eq!(config.input_dir, PathBuf::from("data/accounts"));
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(BuildConfig::from_file(dir.path().join("nope.json")).is_err());
    }
}
