// 🔁 Listing Sources - where a consumer gets the set of listed identifiers
//
// The browser extension resolves the list through three tiers, in order:
//   1. remote   - the published combined listing
//   2. cache    - the last remote result, if younger than the freshness window
//   3. bundled  - the identifier list shipped with the extension
// Each tier either yields identifiers or reports why it is unavailable;
// the first available tier wins. A remote success refreshes the cache.
// There are no retries: a rate-limited remote is reported and skipped.

use crate::record::normalize_identifier;
use crate::writer::read_identifier_list;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// ============================================================================
// IDENTIFIER SET
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierSet(BTreeSet<String>);

impl IdentifierSet {
    pub fn new<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        IdentifierSet(
            identifiers
                .into_iter()
                .map(|id| normalize_identifier(id.as_ref()))
                .filter(|id| !id.is_empty())
                .collect(),
        )
    }

    /// Accepts handles in any case, with or without a leading "@"
    pub fn contains(&self, raw: &str) -> bool {
        self.0.contains(&normalize_identifier(raw))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }
}

// ============================================================================
// SOURCE TRAIT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Availability {
    Available(IdentifierSet),
    Unavailable(String),
}

/// One named tier of the fallback chain
pub trait ListSource {
    fn name(&self) -> &str;
    fn load(&self) -> Availability;
}

// ============================================================================
// REMOTE
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// Not retried; the reset time is reported so the caller can come back later
    #[error("rate limited{}", reset_hint(.reset_at))]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not parse listing: {0}")]
    Parse(String),
}

fn reset_hint(reset_at: &Option<DateTime<Utc>>) -> String {
    match reset_at {
        Some(at) => format!(" until {}", at.to_rfc3339()),
        None => String::new(),
    }
}

/// Single-shot retrieval of the published listing's identifiers
pub trait ListingFetcher {
    fn fetch(&self) -> Result<Vec<String>, FetchError>;
}

impl<F> ListingFetcher for F
where
    F: Fn() -> Result<Vec<String>, FetchError>,
{
    fn fetch(&self) -> Result<Vec<String>, FetchError> {
        self()
    }
}

pub struct RemoteListing<F: ListingFetcher> {
    fetcher: F,
    cache: Option<CachedListing>,
}

impl<F: ListingFetcher> RemoteListing<F> {
    pub fn new(fetcher: F) -> Self {
        RemoteListing {
            fetcher,
            cache: None,
        }
    }

    /// Store every successful fetch in `cache`
    pub fn with_cache(mut self, cache: CachedListing) -> Self {
        self.cache = Some(cache);
        self
    }
}

impl<F: ListingFetcher> ListSource for RemoteListing<F> {
    fn name(&self) -> &str {
        "remote"
    }

    fn load(&self) -> Availability {
        match self.fetcher.fetch() {
            Ok(identifiers) => {
                let set = IdentifierSet::new(identifiers);
                if let Some(cache) = &self.cache {
                    if let Err(e) = cache.store(&set) {
                        warn!(error = %e, "failed to refresh listing cache");
                    }
                }
                Availability::Available(set)
            }
            Err(e) => {
                warn!(error = %e, "remote listing unavailable");
                Availability::Unavailable(e.to_string())
            }
        }
    }
}

#[cfg(feature = "remote")]
pub use http::HttpListingFetcher;

#[cfg(feature = "remote")]
mod http {
    use super::FetchError;
    use crate::writer::Listing;
    use anyhow::{Context, Result};
    use chrono::{DateTime, Utc};
    use reqwest::blocking::{Client, Response};
    use std::time::Duration;

    /// Fetches the combined listing artifact over HTTP
    pub struct HttpListingFetcher {
        url: String,
        client: Client,
    }

    impl HttpListingFetcher {
        pub fn new(url: impl Into<String>) -> Result<Self> {
            let client = Client::builder()
                .timeout(Duration::from_secs(15))
                .user_agent(concat!("account-directory/", env!("CARGO_PKG_VERSION")))
                .build()
                .context("Failed to build HTTP client")?;
            Ok(HttpListingFetcher {
                url: url.into(),
                client,
            })
        }
    }

    fn header_i64(response: &Response, name: &str) -> Option<i64> {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
    }

    impl super::ListingFetcher for HttpListingFetcher {
        fn fetch(&self) -> Result<Vec<String>, FetchError> {
            let response = self
                .client
                .get(&self.url)
                .send()
                .map_err(|e| FetchError::Transport(e.to_string()))?;

            let status = response.status();
            if status.as_u16() == 429 {
                // epoch seconds, else a relative Retry-After
                let reset_at = header_i64(&response, "x-rate-limit-reset")
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
                    .or_else(|| {
                        header_i64(&response, "retry-after")
                            .map(|secs| Utc::now() + chrono::Duration::seconds(secs))
                    });
                return Err(FetchError::RateLimited { reset_at });
            }
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }

            let listing: Listing = response
                .json()
                .map_err(|e| FetchError::Parse(e.to_string()))?;
            Ok(listing.accounts.into_iter().map(|a| a.identifier).collect())
        }
    }
}

// ============================================================================
// CACHE
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheFile {
    saved_at: DateTime<Utc>,
    identifiers: Vec<String>,
}

/// Time-stamped copy of the last remote result
pub struct CachedListing {
    path: PathBuf,
    freshness: chrono::Duration,
    now: DateTime<Utc>,
}

impl CachedListing {
    pub fn new(path: impl Into<PathBuf>, freshness: chrono::Duration) -> Self {
        CachedListing {
            path: path.into(),
            freshness,
            now: Utc::now(),
        }
    }

    /// Evaluate freshness against a fixed clock
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn store(&self, identifiers: &IdentifierSet) -> Result<()> {
        let file = CacheFile {
            saved_at: self.now,
            identifiers: identifiers.iter().cloned().collect(),
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create cache directory: {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(&file).context("Failed to serialize cache")?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write cache: {:?}", self.path))?;
        debug!(path = %self.path.display(), count = identifiers.len(), "listing cache refreshed");
        Ok(())
    }
}

impl ListSource for CachedListing {
    fn name(&self) -> &str {
        "cache"
    }

    fn load(&self) -> Availability {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => return Availability::Unavailable(format!("no cached copy: {}", e)),
        };
        let file: CacheFile = match serde_json::from_str(&content) {
            Ok(file) => file,
            Err(e) => return Availability::Unavailable(format!("unreadable cache: {}", e)),
        };
        if self.now - file.saved_at > self.freshness {
            return Availability::Unavailable(format!(
                "cache expired (saved {})",
                file.saved_at.to_rfc3339()
            ));
        }
        Availability::Available(IdentifierSet::new(file.identifiers))
    }
}

// ============================================================================
// BUNDLED
// ============================================================================

/// Identifier list artifact shipped inside the extension
pub struct BundledList {
    path: PathBuf,
}

impl BundledList {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        BundledList { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ListSource for BundledList {
    fn name(&self) -> &str {
        "bundled"
    }

    fn load(&self) -> Availability {
        match read_identifier_list(&self.path) {
            Ok(list) => Availability::Available(IdentifierSet::new(list.identifiers)),
            Err(e) => Availability::Unavailable(format!("{:#}", e)),
        }
    }
}

// ============================================================================
// FALLBACK CHAIN
// ============================================================================

#[derive(Debug, Clone)]
pub struct Resolution {
    /// Name of the tier that answered
    pub source: String,
    pub identifiers: IdentifierSet,
    /// Tiers tried before it, with the reason each was unavailable
    pub skipped: Vec<(String, String)>,
}

#[derive(Default)]
pub struct FallbackChain {
    sources: Vec<Box<dyn ListSource>>,
}

impl FallbackChain {
    pub fn new() -> Self {
        FallbackChain {
            sources: Vec::new(),
        }
    }

    /// Append a tier; tiers are tried in the order they were added
    pub fn then(mut self, source: impl ListSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// First available tier wins
    pub fn resolve(&self) -> Result<Resolution> {
        let mut skipped = Vec::new();

        for source in &self.sources {
            match source.load() {
                Availability::Available(identifiers) => {
                    info!(source = source.name(), count = identifiers.len(), "identifier list resolved");
                    return Ok(Resolution {
                        source: source.name().to_string(),
                        identifiers,
                        skipped,
                    });
                }
                Availability::Unavailable(reason) => {
                    debug!(source = source.name(), reason = %reason, "source unavailable");
                    skipped.push((source.name().to_string(), reason));
                }
            }
        }

        let reasons: Vec<String> = skipped
            .iter()
            .map(|(name, reason)| format!("{}: {}", name, reason))
            .collect();
        bail!("No identifier source available ({})", reasons.join("; "))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ok_fetcher(ids: &'static [&'static str]) -> impl Fn() -> Result<Vec<String>, FetchError> {
        move || Ok(ids.iter().map(|s| s.to_string()).collect())
    }

    fn failing_fetcher() -> impl Fn() -> Result<Vec<String>, FetchError> {
        || Err(FetchError::Transport("connection refused".to_string()))
    }

    fn write_bundle(dir: &TempDir, ids: &[&str]) -> PathBuf {
        let path = dir.path().join("identifiers.json");
        fs::write(
            &path,
            serde_json::json!({ "identifiers": ids }).to_string(),
        )
        .unwrap();
        path
    }

    #[test]
    fn test_identifier_set_normalizes() {
        let set = IdentifierSet::new(["@Alice", "bob", "", "BOB"]);

        assert_eq!(set.len(), 2);
        assert!(set.contains("alice"));
        assert!(set.contains("@ALICE"));
        assert!(!set.contains("carol"));
    }

    #[test]
    fn test_remote_wins_and_refreshes_cache() {
        let dir = TempDir::new().unwrap();
        let cache_path = dir.path().join("cache.json");
        let bundle = write_bundle(&dir, &["bundled_only"]);

        let chain = FallbackChain::new()
            .then(
                RemoteListing::new(ok_fetcher(&["remote_one"]))
                    .with_cache(CachedListing::new(&cache_path, chrono::Duration::days(7))),
            )
            .then(CachedListing::new(&cache_path, chrono::Duration::days(7)))
            .then(BundledList::new(bundle));

        let resolution = chain.resolve().unwrap();

        assert_eq!(resolution.source, "remote");
        assert!(resolution.identifiers.contains("remote_one"));
        assert!(resolution.skipped.is_empty());
        assert!(cache_path.exists());
    }

    #[test]
    fn test_fresh_cache_used_when_remote_fails() {
        let dir = TempDir::new().unwrap();
        let cache_path = dir.path().join("cache.json");
        let now = Utc::now();
        CachedListing::new(&cache_path, chrono::Duration::days(7))
            .at(now - chrono::Duration::days(2))
            .store(&IdentifierSet::new(["cached_one"]))
            .unwrap();
        let bundle = write_bundle(&dir, &["bundled_only"]);

        let chain = FallbackChain::new()
            .then(RemoteListing::new(failing_fetcher()))
            .then(CachedListing::new(&cache_path, chrono::Duration::days(7)).at(now))
            .then(BundledList::new(bundle));

        let resolution = chain.resolve().unwrap();

        assert_eq!(resolution.source, "cache");
        assert!(resolution.identifiers.contains("cached_one"));
        assert_eq!(resolution.skipped.len(), 1);
        assert_eq!(resolution.skipped[0].0, "remote");
    }

    #[test]
    fn test_stale_cache_falls_through_to_bundled() {
        let dir = TempDir::new().unwrap();
        let cache_path = dir.path().join("cache.json");
        let now = Utc::now();
        CachedListing::new(&cache_path, chrono::Duration::days(7))
            .at(now - chrono::Duration::days(8))
            .store(&IdentifierSet::new(["cached_one"]))
            .unwrap();
        let bundle = write_bundle(&dir, &["bundled_only"]);

        let chain = FallbackChain::new()
            .then(RemoteListing::new(failing_fetcher()))
            .then(CachedListing::new(&cache_path, chrono::Duration::days(7)).at(now))
            .then(BundledList::new(bundle));

        let resolution = chain.resolve().unwrap();

        assert_eq!(resolution.source, "bundled");
        assert!(resolution.identifiers.contains("bundled_only"));
        assert!(!resolution.identifiers.contains("cached_one"));
        assert_eq!(resolution.skipped.len(), 2);
    }

    #[test]
    fn test_nothing_available_is_an_error() {
        let dir = TempDir::new().unwrap();

        let chain = FallbackChain::new()
            .then(RemoteListing::new(failing_fetcher()))
            .then(CachedListing::new(dir.path().join("missing.json"), chrono::Duration::days(7)))
            .then(BundledList::new(dir.path().join("missing-bundle.json")));

        let err = chain.resolve().unwrap_err().to_string();

        assert!(err.contains("remote"));
        assert!(err.contains("cache"));
        assert!(err.contains("bundled"));
    }

    #[test]
    fn test_rate_limit_message_includes_reset() {
        let reset_at = DateTime::parse_from_rfc3339("2025-01-01T00:15:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let message = FetchError::RateLimited { reset_at: Some(reset_at) }.to_string();

        assert!(message.starts_with("rate limited until 2025-01-01T00:15:00"));
        assert_eq!(FetchError::RateLimited { reset_at: None }.to_string(), "rate limited");
    }

    #[test]
    fn test_chain_order() {
        let chain = FallbackChain::new()
            .then(RemoteListing::new(failing_fetcher()))
            .then(CachedListing::new("c.json", chrono::Duration::days(1)))
            .then(BundledList::new("b.json"));

        assert_eq!(chain.source_names(), vec!["remote", "cache", "bundled"]);
    }
}
