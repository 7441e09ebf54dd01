// 🚦 Build Pipeline - Loader → Aggregator → Writer, then packaging
//
// Single-threaded and sequential: everything is read into memory once,
// computed, and written once. The first fatal error ends the run.

use crate::config::BuildConfig;
use crate::loader::{LoadReport, RecordLoader};
use crate::package::Packager;
use crate::stats::{AggregateStatistics, StatisticsAggregator};
use crate::writer::{OutputWriter, WriteReport};
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    /// Site artifacts only
    Site,
    /// Extension archive only
    Package,
    /// Site, then extension archive
    #[default]
    All,
}

impl BuildMode {
    pub fn builds_site(&self) -> bool {
        matches!(self, BuildMode::Site | BuildMode::All)
    }

    pub fn packages(&self) -> bool {
        matches!(self, BuildMode::Package | BuildMode::All)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub load: Option<LoadReport>,
    pub stats: Option<AggregateStatistics>,
    pub write: Option<WriteReport>,
    pub package: Option<PathBuf>,
}

impl BuildReport {
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(load) = &self.load {
            parts.push(format!(
                "{} records ({} skipped{})",
                load.records.len(),
                load.skipped.len(),
                if load.used_seed { ", seed set" } else { "" }
            ));
        }
        if let Some(write) = &self.write {
            parts.push(format!(
                "{} artifacts in {}",
                write.artifact_count,
                write.site_dir.display()
            ));
        }
        if let Some(package) = &self.package {
            parts.push(format!("package {}", package.display()));
        }
        parts.join(" | ")
    }
}

pub struct Pipeline {
    config: BuildConfig,
}

impl Pipeline {
    pub fn new(config: BuildConfig) -> Self {
        Pipeline { config }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Load and aggregate without writing anything
    pub fn analyze(&self) -> Result<(LoadReport, AggregateStatistics)> {
        let load = RecordLoader::with_reserved_files(self.config.reserved_files.clone())
            .load_dir(&self.config.input_dir)?;
        let stats = StatisticsAggregator::with_top_n(self.config.top_n).aggregate(&load.records);
        Ok((load, stats))
    }

    pub fn run(&self, mode: BuildMode) -> Result<BuildReport> {
        let mut report = BuildReport::default();

        if mode.builds_site() {
            let (load, stats) = self.analyze()?;
            info!("{}", stats.summary());

            let write = OutputWriter::new(self.config.site_title.clone())
                .with_extension_fallback(&self.config.extension_fallback_path)
                .with_static_dir(&self.config.static_dir)
                .write_site(&self.config.output_dir, &load.records, &stats)
                .context("Site build failed")?;

            report.load = Some(load);
            report.stats = Some(stats);
            report.write = Some(write);
        }

        if mode.packages() {
            let archive = Packager::new(&self.config.extension_dir, &self.config.dist_dir)
                .package()
                .context("Extension packaging failed")?;
            report.package = Some(archive);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config_in(tmp: &TempDir) -> BuildConfig {
        BuildConfig {
            input_dir: tmp.path().join("accounts"),
            output_dir: tmp.path().join("site"),
            static_dir: tmp.path().join("static"),
            extension_dir: tmp.path().join("extension"),
            extension_fallback_path: tmp.path().join("extension/data/identifiers.json"),
            dist_dir: tmp.path().join("dist"),
            cache_path: tmp.path().join("cache.json"),
            ..BuildConfig::default()
        }
    }

    #[test]
    fn test_build_modes() {
        assert!(BuildMode::All.builds_site() && BuildMode::All.packages());
        assert!(BuildMode::Site.builds_site() && !BuildMode::Site.packages());
        assert!(!BuildMode::Package.builds_site() && BuildMode::Package.packages());
        assert_eq!(BuildMode::default(), BuildMode::All);
    }

    #[test]
    fn test_site_build_from_directory() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        fs::create_dir_all(&config.input_dir).unwrap();
        fs::write(
            config.input_dir.join("one.json"),
            r#"{"identifier": "one", "metrics": {"followerCount": 10}}"#,
        )
        .unwrap();

        let report = Pipeline::new(config.clone()).run(BuildMode::Site).unwrap();

        assert_eq!(report.load.as_ref().unwrap().records.len(), 1);
        assert_eq!(report.stats.as_ref().unwrap().follower_summary.count, 1);
        assert!(report.package.is_none());
        assert!(config.output_dir.join("index.html").exists());
        assert!(config.extension_fallback_path.exists());
        assert!(report.summary().contains("1 records"));
    }

    #[test]
    fn test_package_only_without_extension_fails() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);

        let result = Pipeline::new(config.clone()).run(BuildMode::Package);

        assert!(result.is_err());
        assert!(!config.output_dir.exists());
    }
}
