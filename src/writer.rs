// 📝 Output Writer - records + statistics → static site artifacts
//
// All-or-nothing publishing:
// 1. every artifact is written into a staging directory next to the target
// 2. the staging directory is swapped into place only when all writes succeeded
// 3. the extension fallback copy of the identifier list is written from the
//    same bytes as the site copy and verified by digest
//
// Any failure aborts the build; a half-written site is never published.

use crate::html;
use crate::record::{Affiliation, EntityRecord, SubscriptionTier};
use crate::stats::{affiliation_label, AggregateStatistics};
use anyhow::{anyhow, bail, Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// ============================================================================
// ARTIFACT SHAPES
// ============================================================================

/// Listing entry: what the directory page and the extension badge need
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub identifier: String,
    pub display_name: String,
    pub avatar_url: String,
    pub bio_text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<Affiliation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_tier: Option<SubscriptionTier>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_verified: Option<bool>,
}

impl From<&EntityRecord> for AccountSummary {
    fn from(record: &EntityRecord) -> Self {
        AccountSummary {
            identifier: record.identifier.clone(),
            display_name: record.display_name.clone(),
            avatar_url: record.avatar_url.clone(),
            bio_text: record.bio_text.clone(),
            numeric_id: record.numeric_id.clone(),
            affiliation: record.affiliation.clone(),
            subscription_tier: record.subscription_tier.clone(),
            external_url: record.external_url.clone(),
            is_verified: record.is_verified,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub accounts: Vec<AccountSummary>,
}

/// Minimal list consumed by the browser extension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifierList {
    pub identifiers: Vec<String>,
}

impl IdentifierList {
    /// Lower-cased, sorted and de-duplicated
    pub fn from_records(records: &[EntityRecord]) -> Self {
        let mut identifiers: Vec<String> =
            records.iter().map(|r| r.identifier.to_lowercase()).collect();
        identifiers.sort();
        identifiers.dedup();
        IdentifierList { identifiers }
    }
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    identifier: &'a str,
    display_name: &'a str,
    subscription_tier: Option<&'a str>,
    is_verified: Option<bool>,
    affiliation: Option<String>,
    external_url: Option<&'a str>,
    follower_count: Option<u64>,
    proof_count: usize,
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    generated_at: String,
    artifacts: &'a BTreeMap<String, String>,
}

// ============================================================================
// SITE LAYOUT
// ============================================================================

/// Where each artifact lives, relative to the site root
pub struct SiteLayout;

impl SiteLayout {
    pub const LISTING: &'static str = "data/accounts.json";
    pub const STATS: &'static str = "data/stats.json";
    pub const IDENTIFIERS: &'static str = "data/identifiers.json";
    pub const CSV: &'static str = "data/accounts.csv";
    pub const MANIFEST: &'static str = "manifest.json";
    pub const INDEX_PAGE: &'static str = "index.html";
    pub const STATS_PAGE: &'static str = "stats.html";

    pub fn detail_rel(identifier: &str) -> String {
        format!("data/accounts/{0}/{0}.json", identifier)
    }

    pub fn account_page_rel(identifier: &str) -> String {
        format!("accounts/{}/index.html", identifier)
    }
}

// ============================================================================
// ARTIFACT SINK
// ============================================================================

/// Writes files under a root and remembers the SHA-256 of each one
struct ArtifactSink {
    root: PathBuf,
    digests: BTreeMap<String, String>,
}

impl ArtifactSink {
    fn new(root: PathBuf) -> Self {
        ArtifactSink {
            root,
            digests: BTreeMap::new(),
        }
    }

    fn write(&mut self, rel: &str, bytes: &[u8]) -> Result<()> {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        fs::write(&path, bytes).with_context(|| format!("Failed to write artifact: {:?}", path))?;
        self.digests.insert(rel.to_string(), sha256_hex(bytes));
        Ok(())
    }

    fn write_json<T: Serialize>(&mut self, rel: &str, value: &T) -> Result<()> {
        let bytes = to_json_bytes(value)?;
        self.write(rel, &bytes)
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn to_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(value).context("Failed to serialize artifact")?;
    bytes.push(b'\n');
    Ok(bytes)
}

// ============================================================================
// OUTPUT WRITER
// ============================================================================

#[derive(Debug, Clone)]
pub struct WriteReport {
    pub site_dir: PathBuf,
    pub artifact_count: usize,
    pub fallback_path: Option<PathBuf>,
    pub identifiers_digest: String,
}

pub struct OutputWriter {
    site_title: String,
    extension_fallback_path: Option<PathBuf>,
    static_dir: Option<PathBuf>,
}

impl OutputWriter {
    pub fn new(site_title: impl Into<String>) -> Self {
        OutputWriter {
            site_title: site_title.into(),
            extension_fallback_path: None,
            static_dir: None,
        }
    }

    /// Second destination of the identifier list (bundled into the extension)
    pub fn with_extension_fallback(mut self, path: impl Into<PathBuf>) -> Self {
        self.extension_fallback_path = Some(path.into());
        self
    }

    /// Directory copied verbatim into the site root (styles, scripts)
    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = Some(dir.into());
        self
    }

    /// Write the complete site into `site_dir`, replacing what was there
    pub fn write_site(
        &self,
        site_dir: &Path,
        records: &[EntityRecord],
        stats: &AggregateStatistics,
    ) -> Result<WriteReport> {
        let site_dir = absolute(site_dir)?;
        let site_dir = site_dir.as_path();
        let staging = sibling_path(site_dir, "staging")?;
        if staging.exists() {
            fs::remove_dir_all(&staging)
                .with_context(|| format!("Failed to clear staging directory: {:?}", staging))?;
        }
        if let Some(path) = self.extension_fallback_path.as_deref().filter(|p| p.is_dir()) {
            bail!("Extension fallback path is a directory: {:?}", path);
        }

        let identifier_bytes = to_json_bytes(&IdentifierList::from_records(records))?;
        let identifiers_digest = sha256_hex(&identifier_bytes);

        let fallback = match &self.extension_fallback_path {
            Some(path) => Some(FallbackSwap::new(path)?),
            None => None,
        };

        let staged = self.stage(&staging, records, stats, &identifier_bytes).and_then(|count| {
            if let Some(swap) = &fallback {
                write_file(&swap.tmp, &identifier_bytes)?;
            }
            Ok(count)
        });

        let artifact_count = match staged {
            Ok(count) => count,
            Err(e) => {
                let _ = fs::remove_dir_all(&staging);
                if let Some(swap) = &fallback {
                    swap.discard();
                }
                return Err(e);
            }
        };

        // Fallback copy first; the old one stays aside until the site swap succeeds.
        if let Some(swap) = &fallback {
            if let Err(e) = swap.publish() {
                let _ = fs::remove_dir_all(&staging);
                return Err(e);
            }
        }

        if let Err(e) = commit_dir(&staging, site_dir) {
            let _ = fs::remove_dir_all(&staging);
            if let Some(swap) = &fallback {
                swap.rollback();
            }
            return Err(e);
        }

        if let Some(swap) = &fallback {
            swap.finish();
            verify_same_digest(&site_dir.join(SiteLayout::IDENTIFIERS), &swap.path, &identifiers_digest)?;
        }

        info!(
            site = %site_dir.display(),
            artifacts = artifact_count,
            "site published"
        );

        Ok(WriteReport {
            site_dir: site_dir.to_path_buf(),
            artifact_count,
            fallback_path: self.extension_fallback_path.clone(),
            identifiers_digest,
        })
    }

    /// Write every artifact into `staging`, returning how many were written
    fn stage(
        &self,
        staging: &Path,
        records: &[EntityRecord],
        stats: &AggregateStatistics,
        identifier_bytes: &[u8],
    ) -> Result<usize> {
        let mut sink = ArtifactSink::new(staging.to_path_buf());

        let listing = Listing {
            accounts: records.iter().map(AccountSummary::from).collect(),
        };
        sink.write_json(SiteLayout::LISTING, &listing)?;
        sink.write_json(SiteLayout::STATS, stats)?;
        sink.write(SiteLayout::IDENTIFIERS, identifier_bytes)?;
        sink.write(SiteLayout::CSV, &csv_export(records)?)?;

        for record in records {
            sink.write_json(&SiteLayout::detail_rel(&record.identifier), record)?;
            sink.write(
                &SiteLayout::account_page_rel(&record.identifier),
                html::render_account_page(&self.site_title, record).as_bytes(),
            )?;
        }
        debug!(records = records.len(), "wrote detail artifacts");

        sink.write(
            SiteLayout::INDEX_PAGE,
            html::render_index(&self.site_title, &listing.accounts).as_bytes(),
        )?;
        sink.write(
            SiteLayout::STATS_PAGE,
            html::render_stats_page(&self.site_title, stats).as_bytes(),
        )?;

        if let Some(dir) = self.static_dir.as_deref().filter(|d| d.is_dir()) {
            copy_static(&mut sink, dir, dir)?;
        }

        let digests = sink.digests.clone();
        let manifest = Manifest {
            generated_at: stats.generated_at.to_rfc3339(),
            artifacts: &digests,
        };
        let count = digests.len();
        sink.write_json(SiteLayout::MANIFEST, &manifest)?;

        Ok(count + 1)
    }
}

fn csv_export(records: &[EntityRecord]) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    for record in records {
        wtr.serialize(CsvRow {
            identifier: &record.identifier,
            display_name: &record.display_name,
            subscription_tier: record.subscription_tier.as_ref().map(|t| t.as_str()),
            is_verified: record.is_verified,
            affiliation: record
                .affiliation
                .as_ref()
                .filter(|a| !a.is_empty())
                .map(affiliation_label),
            external_url: record.external_url.as_deref(),
            follower_count: record.metrics.and_then(|m| m.follower_count),
            proof_count: record.proofs.len(),
        })
        .context("Failed to write CSV row")?;
    }
    wtr.into_inner()
        .map_err(|e| anyhow!("Failed to finish CSV export: {}", e.error()))
}

fn copy_static(sink: &mut ArtifactSink, base: &Path, dir: &Path) -> Result<()> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read static directory: {:?}", dir))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()
        .with_context(|| format!("Failed to read static directory: {:?}", dir))?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            copy_static(sink, base, &path)?;
            continue;
        }
        let rel = path
            .strip_prefix(base)
            .with_context(|| format!("Static file outside base directory: {:?}", path))?
            .to_string_lossy()
            .replace('\\', "/");
        let bytes =
            fs::read(&path).with_context(|| format!("Failed to read static file: {:?}", path))?;
        sink.write(&rel, &bytes)?;
    }
    Ok(())
}

// ============================================================================
// FILESYSTEM HELPERS
// ============================================================================

/// `<parent>/.<name>.<suffix>`, next to `target`
fn sibling_path(target: &Path, suffix: &str) -> Result<PathBuf> {
    let name = target
        .file_name()
        .ok_or_else(|| anyhow!("Output path has no final component: {:?}", target))?;
    let sibling = format!(".{}.{}", name.to_string_lossy(), suffix);
    Ok(match target.parent() {
        Some(parent) => parent.join(sibling),
        None => PathBuf::from(sibling),
    })
}

fn temp_path(target: &Path) -> Result<PathBuf> {
    sibling_path(target, "tmp")
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }
    fs::write(path, bytes).with_context(|| format!("Failed to write file: {:?}", path))
}

/// Swap `staging` into `target`, restoring the old site if the swap fails
fn commit_dir(staging: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    let previous = sibling_path(target, "previous")?;
    if previous.exists() {
        fs::remove_dir_all(&previous)
            .with_context(|| format!("Failed to remove stale backup: {:?}", previous))?;
    }

    let had_previous = target.exists();
    if had_previous {
        fs::rename(target, &previous)
            .with_context(|| format!("Failed to move old site aside: {:?}", target))?;
    }

    if let Err(e) = fs::rename(staging, target) {
        if had_previous {
            let _ = fs::rename(&previous, target);
        }
        return Err(e).with_context(|| format!("Failed to publish site into {:?}", target));
    }

    if had_previous {
        fs::remove_dir_all(&previous)
            .with_context(|| format!("Failed to remove old site: {:?}", previous))?;
    }
    Ok(())
}

/// Two-phase replacement of the extension fallback list
struct FallbackSwap {
    path: PathBuf,
    tmp: PathBuf,
    backup: PathBuf,
}

impl FallbackSwap {
    fn new(path: &Path) -> Result<Self> {
        Ok(FallbackSwap {
            path: path.to_path_buf(),
            tmp: temp_path(path)?,
            backup: sibling_path(path, "previous")?,
        })
    }

    /// Move the old list aside and the new one into place
    fn publish(&self) -> Result<()> {
        if self.backup.exists() {
            fs::remove_file(&self.backup)
                .with_context(|| format!("Failed to remove stale backup: {:?}", self.backup))?;
        }
        if self.path.exists() {
            if let Err(e) = fs::rename(&self.path, &self.backup) {
                self.discard();
                return Err(e).with_context(|| {
                    format!("Failed to move old extension fallback list aside: {:?}", self.path)
                });
            }
        }
        if let Err(e) = fs::rename(&self.tmp, &self.path) {
            self.rollback();
            return Err(e).with_context(|| {
                format!("Failed to publish extension fallback list: {:?}", self.path)
            });
        }
        Ok(())
    }

    /// Restore the old list (or remove the new one if there was none)
    fn rollback(&self) {
        self.discard();
        if self.backup.exists() {
            let _ = fs::rename(&self.backup, &self.path);
        } else if self.path.is_file() {
            let _ = fs::remove_file(&self.path);
        }
    }

    fn discard(&self) {
        let _ = fs::remove_file(&self.tmp);
    }

    fn finish(&self) {
        if self.backup.exists() {
            if let Err(e) = fs::remove_file(&self.backup) {
                debug!(path = %self.backup.display(), error = %e, "old fallback list not removed");
            }
        }
    }
}

/// Resolve `.` and `..` style paths so the site always has a final component
fn absolute(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Failed to resolve working directory")?
            .join(path)
    };

    let mut resolved = PathBuf::new();
    for component in joined.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                if !resolved.pop() {
                    bail!("Output path escapes the filesystem root: {:?}", path);
                }
            }
            other => resolved.push(other),
        }
    }
    if resolved.file_name().is_none() {
        bail!("Output path cannot be the filesystem root: {:?}", path);
    }
    Ok(resolved)
}

fn verify_same_digest(site_copy: &Path, fallback_copy: &Path, expected: &str) -> Result<()> {
    for path in [site_copy, fallback_copy] {
        let bytes = fs::read(path).with_context(|| format!("Failed to re-read {:?}", path))?;
        let actual = sha256_hex(&bytes);
        if actual != expected {
            bail!(
                "Identifier list at {:?} does not match the published copy ({} != {})",
                path,
                actual,
                expected
            );
        }
    }
    Ok(())
}

// ============================================================================
// READERS
// ============================================================================

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read artifact: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse artifact: {:?}", path))
}

pub fn read_listing(site_dir: &Path) -> Result<Listing> {
    read_json(&site_dir.join(SiteLayout::LISTING))
}

pub fn read_stats(site_dir: &Path) -> Result<AggregateStatistics> {
    read_json(&site_dir.join(SiteLayout::STATS))
}

pub fn read_detail(site_dir: &Path, identifier: &str) -> Result<EntityRecord> {
    read_json(&site_dir.join(SiteLayout::detail_rel(identifier)))
}

pub fn read_identifier_list(path: &Path) -> Result<IdentifierList> {
    read_json(path)
}

// ============================================================================
// TESTS
// ============================================================================
