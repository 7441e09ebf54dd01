// 📦 Extension Packaging - zip the extension directory for upload
//
// Thin wrapper around the system `zip` tool. The extension directory is
// expected to already contain the bundled identifier list written by the
// site build.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

pub const ARCHIVE_NAME: &str = "extension.zip";

pub struct Packager {
    extension_dir: PathBuf,
    dist_dir: PathBuf,
    zip_program: String,
}

impl Packager {
    pub fn new(extension_dir: impl Into<PathBuf>, dist_dir: impl Into<PathBuf>) -> Self {
        Packager {
            extension_dir: extension_dir.into(),
            dist_dir: dist_dir.into(),
            zip_program: "zip".to_string(),
        }
    }

    /// Use a different archiver binary (same CLI as Info-ZIP `zip`)
    pub fn with_zip_program(mut self, program: impl Into<String>) -> Self {
        self.zip_program = program.into();
        self
    }

    pub fn archive_path(&self) -> PathBuf {
        self.dist_dir.join(ARCHIVE_NAME)
    }

    /// Build `<dist>/extension.zip`, replacing any previous archive
    pub fn package(&self) -> Result<PathBuf> {
        if !self.extension_dir.is_dir() {
            bail!("Extension directory not found: {:?}", self.extension_dir);
        }

        fs::create_dir_all(&self.dist_dir)
            .with_context(|| format!("Failed to create dist directory: {:?}", self.dist_dir))?;
        let archive = absolute(&self.archive_path())?;
        if archive.exists() {
            fs::remove_file(&archive)
                .with_context(|| format!("Failed to remove old archive: {:?}", archive))?;
        }

        let output = Command::new(&self.zip_program)
            .arg("-r")
            .arg("-q")
            .arg(&archive)
            .arg(".")
            .current_dir(&self.extension_dir)
            .output()
            .with_context(|| format!("Failed to run {:?}", self.zip_program))?;

        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.zip_program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        info!(archive = %archive.display(), "extension packaged");
        Ok(archive)
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Failed to resolve working directory")?;
    Ok(cwd.join(path))
}
