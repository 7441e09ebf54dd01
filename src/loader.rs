// 📂 Record Loader - per-account JSON files → normalized records
//
// Hand-authored files are messy, so loading is lenient:
// - a bad file is skipped with a diagnostic, never fatal
// - bad optional fields are dropped, the record survives
// - an empty directory falls back to a small seed set

use crate::record::{
    default_avatar_url, default_bio_text, default_display_name, is_path_safe,
    normalize_identifier, Affiliation, ChangeLogEntry, EntityRecord, Metrics, MetricsDelta,
    Proof, SubscriptionTier,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};

/// Identifiers used when there is nothing valid to load
pub const SEED_IDENTIFIERS: [&str; 3] = ["example_one", "example_two", "example_three"];

/// Aggregate/index files living next to the per-account files
pub const DEFAULT_RESERVED_FILES: [&str; 4] =
    ["index.json", "accounts.json", "stats.json", "identifiers.json"];

// ============================================================================
// DIAGNOSTICS
// ============================================================================

/// Why a single input file was left out of the build
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SkipReason {
    #[error("could not read file: {0}")]
    Unreadable(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("top-level JSON value is not an object")]
    NotAnObject,

    #[error("missing or empty identifier")]
    MissingIdentifier,

    #[error("identifier {0:?} cannot be used as a path segment")]
    UnsafeIdentifier(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkipDiagnostic {
    pub file: String,
    #[serde(serialize_with = "serialize_reason")]
    pub reason: SkipReason,
}

fn serialize_reason<S: serde::Serializer>(reason: &SkipReason, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(reason)
}

/// Everything the loader produced for one build
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub records: Vec<EntityRecord>,
    pub skipped: Vec<SkipDiagnostic>,

    /// Identifiers whose data was replaced by a later file
    pub overwritten: Vec<String>,

    /// True when `records` is the seed set
    pub used_seed: bool,
}

// ============================================================================
// RECORD LOADER
// ============================================================================

pub struct RecordLoader {
    reserved_files: Vec<String>,
}

impl RecordLoader {
    pub fn new() -> Self {
        RecordLoader {
            reserved_files: DEFAULT_RESERVED_FILES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Use a custom list of filenames to exclude from the scan
    pub fn with_reserved_files(reserved_files: Vec<String>) -> Self {
        RecordLoader { reserved_files }
    }

    /// Load every `*.json` file in `dir`, in filename order.
    ///
    /// Only failing to list an existing directory is an error; a missing
    /// directory behaves like an empty one.
    pub fn load_dir(&self, dir: &Path) -> Result<LoadReport> {
        let mut report = LoadReport::default();

        let files = match self.list_input_files(dir) {
            Ok(files) => files,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(dir = %dir.display(), "input directory not found");
                Vec::new()
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to list input directory: {:?}", dir))
            }
        };

        // Keyed by normalized identifier; later files replace the data but
        // keep the position of the first occurrence.
        let mut positions: HashMap<String, usize> = HashMap::new();

        for path in files {
            let file = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let parsed = fs::read_to_string(&path)
                .map_err(|e| SkipReason::Unreadable(e.to_string()))
                .and_then(|content| parse_record(&content));

            match parsed {
                Ok(record) => {
                    let key = record.identifier.clone();
                    match positions.get(&key) {
                        Some(&index) => {
                            debug!(identifier = %key, file = %file, "duplicate identifier, later file wins");
                            report.records[index] = record;
                            report.overwritten.push(key);
                        }
                        None => {
                            positions.insert(key, report.records.len());
                            report.records.push(record);
                        }
                    }
                }
                Err(reason) => {
                    warn!(file = %file, reason = %reason, "skipping input file");
                    report.skipped.push(SkipDiagnostic { file, reason });
                }
            }
        }

        if report.records.is_empty() {
            warn!("no valid records found, using seed set");
            report.records = seed_records(&Utc::now().format("%Y-%m-%d").to_string());
            report.used_seed = true;
        }

        info!(
            records = report.records.len(),
            skipped = report.skipped.len(),
            "loaded account records"
        );

        Ok(report)
    }

    fn list_input_files(&self, dir: &Path) -> io::Result<Vec<std::path::PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if self.reserved_files.iter().any(|r| r.to_lowercase() == name) {
                debug!(file = %name, "skipping reserved file");
                continue;
            }
            files.push(path);
        }
        files.sort();
        Ok(files)
    }
}

impl Default for RecordLoader {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Parse one input document into a normalized record
pub fn parse_record(content: &str) -> Result<EntityRecord, SkipReason> {
    let value: Value =
        serde_json::from_str(content).map_err(|e| SkipReason::InvalidJson(e.to_string()))?;
    let obj = value.as_object().ok_or(SkipReason::NotAnObject)?;
    normalize_record(obj)
}

/// Apply the per-field normalization and defaulting rules
pub fn normalize_record(obj: &Map<String, Value>) -> Result<EntityRecord, SkipReason> {
    let identifier = field_str(obj, &["identifier", "username", "handle"])
        .map(|raw| normalize_identifier(&raw))
        .unwrap_or_default();

    if identifier.is_empty() {
        return Err(SkipReason::MissingIdentifier);
    }
    if !is_path_safe(&identifier) {
        return Err(SkipReason::UnsafeIdentifier(identifier));
    }

    Ok(EntityRecord {
        display_name: field_str(obj, &["displayName", "name", "display_name"])
            .unwrap_or_else(|| default_display_name(&identifier)),
        avatar_url: field_str(obj, &["avatarUrl", "profile_image_url", "avatar"])
            .unwrap_or_else(|| default_avatar_url(&identifier)),
        bio_text: field_str(obj, &["bioText", "bio", "description"])
            .unwrap_or_else(|| default_bio_text(&identifier)),
        numeric_id: field(obj, &["numericId", "id"]).and_then(opaque_id),
        affiliation: field(obj, &["affiliation"]).and_then(parse_affiliation),
        subscription_tier: field_str(obj, &["subscriptionTier", "verified_type"])
            .map(SubscriptionTier::from),
        external_url: field_str(obj, &["externalUrl", "url"]),
        is_verified: field(obj, &["isVerified", "verified"]).and_then(Value::as_bool),
        metrics: field(obj, &["metrics", "public_metrics"])
            .and_then(|v| parse_metrics(&identifier, v)),
        proofs: field(obj, &["proofs"])
            .map(|v| parse_proofs(&identifier, v))
            .unwrap_or_default(),
        change_log: field(obj, &["changeLog", "change_log"])
            .map(|v| parse_change_log(&identifier, v))
            .unwrap_or_default(),
        identifier,
    })
}

/// Three placeholder accounts, each with one synthesized proof
pub fn seed_records(date: &str) -> Vec<EntityRecord> {
    SEED_IDENTIFIERS
        .iter()
        .map(|id| {
            let mut record = EntityRecord::placeholder(id);
            record.proofs.push(Proof {
                label: "Placeholder".to_string(),
                date: date.to_string(),
                description: format!("Seed entry for @{} until real data is added", id),
                urls: Vec::new(),
            });
            record
        })
        .collect()
}

fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| obj.get(*name))
        .find(|v| !v.is_null())
}

/// First non-blank string among `names`, trimmed
fn field_str(obj: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| obj.get(*name).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn opaque_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_affiliation(value: &Value) -> Option<Affiliation> {
    let obj = value.as_object()?;
    let affiliation = Affiliation {
        description: field_str(obj, &["description"]),
        url: field_str(obj, &["url"]),
        badge_url: field_str(obj, &["badgeUrl", "badge_url"]),
    };
    if affiliation.is_empty() {
        None
    } else {
        Some(affiliation)
    }
}

/// Non-negative integer, also accepting integral floats like `120.0`
fn parse_count(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    let f = value.as_f64()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 {
        Some(f as u64)
    } else {
        None
    }
}

fn parse_metrics(identifier: &str, value: &Value) -> Option<Metrics> {
    let obj = value.as_object()?;

    let count = |names: &[&str]| -> Option<u64> {
        let raw = field(obj, names)?;
        let parsed = parse_count(raw);
        if parsed.is_none() {
            warn!(identifier, field = names[0], value = %raw, "dropping invalid metric value");
        }
        parsed
    };

    let metrics = Metrics {
        follower_count: count(&["followerCount", "followers_count"]),
        following_count: count(&["followingCount", "following_count"]),
        post_count: count(&["postCount", "tweet_count"]),
        listed_count: count(&["listedCount", "listed_count"]),
    };

    if metrics.is_empty() {
        None
    } else {
        Some(metrics)
    }
}

fn parse_proofs(identifier: &str, value: &Value) -> Vec<Proof> {
    let Some(items) = value.as_array() else {
        warn!(identifier, "proofs is not an array, ignoring");
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let Some(obj) = item.as_object() else {
                warn!(identifier, "dropping proof entry that is not an object");
                return None;
            };
            let urls = match obj.get("urls") {
                Some(Value::Array(urls)) => urls
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                Some(Value::String(url)) if !url.trim().is_empty() => vec![url.trim().to_string()],
                _ => Vec::new(),
            };
            Some(Proof {
                label: field_str(obj, &["label"]).unwrap_or_default(),
                date: field_str(obj, &["date"]).unwrap_or_default(),
                description: field_str(obj, &["description"]).unwrap_or_default(),
                urls,
            })
        })
        .collect()
}

fn parse_change_log(identifier: &str, value: &Value) -> Vec<ChangeLogEntry> {
    let Some(items) = value.as_array() else {
        warn!(identifier, "changeLog is not an array, ignoring");
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let timestamp = field_str(obj, &["timestamp"])
                .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
                .map(|t| t.with_timezone(&Utc));
            let Some(timestamp) = timestamp else {
                warn!(identifier, "dropping change log entry without a valid timestamp");
                return None;
            };
            Some(ChangeLogEntry {
                timestamp,
                affiliation_before: field(obj, &["affiliationBefore"]).and_then(parse_affiliation),
                affiliation_after: field(obj, &["affiliationAfter"]).and_then(parse_affiliation),
                metrics_delta: field(obj, &["metricsDelta"]).and_then(parse_metrics_delta),
            })
        })
        .collect()
}

fn parse_metrics_delta(value: &Value) -> Option<MetricsDelta> {
    let obj = value.as_object()?;
    let delta = MetricsDelta {
        follower_count: obj.get("followerCount").and_then(Value::as_i64),
        following_count: obj.get("followingCount").and_then(Value::as_i64),
        post_count: obj.get("postCount").and_then(Value::as_i64),
        listed_count: obj.get("listedCount").and_then(Value::as_i64),
    };
    if delta == MetricsDelta::default() {
        None
    } else {
        Some(delta)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) {
        fs::write(dir.path().join(name), content).unwrap();
    }

    #[test]
    fn test_parse_full_record() {
        let record = parse_record(
            r#"{
                "identifier": "@SomeOne",
                "displayName": "Some One",
                "numericId": 12345,
                "affiliation": {"description": " Acme Corp ", "url": "https://www.acme.example"},
                "subscriptionTier": "Business",
                "externalUrl": "https://someone.example/about",
                "isVerified": true,
                "metrics": {"followerCount": 1500, "postCount": 20.0},
                "proofs": [{"label": "Post", "date": "2024-03-01", "description": "d", "urls": ["https://a.example"]}],
                "changeLog": [{"timestamp": "2024-04-01T12:00:00Z", "metricsDelta": {"followerCount": -3}}]
            }"#,
        )
        .unwrap();

        assert_eq!(record.identifier, "someone");
        assert_eq!(record.display_name, "Some One");
        assert_eq!(record.numeric_id.as_deref(), Some("12345"));
        assert_eq!(
            record.affiliation.as_ref().unwrap().description.as_deref(),
            Some("Acme Corp")
        );
        assert_eq!(record.subscription_tier, Some(SubscriptionTier::Business));
        assert_eq!(record.is_verified, Some(true));
        assert_eq!(record.metric(crate::record::MetricField::Followers), Some(1500));
        assert_eq!(record.metric(crate::record::MetricField::Posts), Some(20));
        assert_eq!(record.proofs.len(), 1);
        assert_eq!(record.change_log.len(), 1);
        assert_eq!(
            record.change_log[0].metrics_delta.unwrap().follower_count,
            Some(-3)
        );
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let record = parse_record(r#"{"identifier": "bare"}"#).unwrap();

        assert_eq!(record.display_name, "bare");
        assert_eq!(record.avatar_url, default_avatar_url("bare"));
        assert_eq!(record.bio_text, default_bio_text("bare"));
        assert!(record.proofs.is_empty());
        assert!(record.affiliation.is_none());
        assert!(record.metrics.is_none());
    }

    #[test]
    fn test_lenient_optional_fields() {
        let record = parse_record(
            r#"{
                "identifier": "messy",
                "affiliation": {},
                "isVerified": "yes",
                "metrics": {"followerCount": -5, "followingCount": 1.5},
                "proofs": null
            }"#,
        )
        .unwrap();

        assert!(record.affiliation.is_none());
        assert_eq!(record.is_verified, None);
        assert!(record.metrics.is_none());
        assert!(record.proofs.is_empty());
    }

    #[test]
    fn test_missing_identifier_is_skipped() {
        assert_eq!(parse_record(r#"{"displayName": "x"}"#), Err(SkipReason::MissingIdentifier));
        assert_eq!(parse_record(r#"{"identifier": "@"}"#), Err(SkipReason::MissingIdentifier));
        assert_eq!(parse_record("[1, 2]"), Err(SkipReason::NotAnObject));
        assert!(matches!(parse_record("{nope"), Err(SkipReason::InvalidJson(_))));
        assert!(matches!(
            parse_record(r#"{"identifier": "../etc"}"#),
            Err(SkipReason::UnsafeIdentifier(_))
        ));
    }

    #[test]
    fn test_load_dir_skips_bad_files() {
        let dir = TempDir::new().unwrap();
        write(&dir, "alpha.json", r#"{"identifier": "alpha"}"#);
        write(&dir, "broken.json", "{ not json");
        write(&dir, "nameless.json", r#"{"displayName": "No Id"}"#);
        write(&dir, "index.json", r#"{"identifier": "should_not_load"}"#);
        write(&dir, "notes.txt", "ignored");

        let report = RecordLoader::new().load_dir(dir.path()).unwrap();

        assert!(!report.used_seed);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].identifier, "alpha");
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.skipped[0].file, "broken.json");
        assert_eq!(report.skipped[1].file, "nameless.json");
        assert_eq!(report.skipped[1].reason, SkipReason::MissingIdentifier);
    }

    #[test]
    fn test_duplicate_identifier_last_file_wins() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a_first.json", r#"{"identifier": "Dup", "displayName": "First"}"#);
        write(&dir, "b_middle.json", r#"{"identifier": "other"}"#);
        write(&dir, "c_second.json", r#"{"identifier": "@dup", "displayName": "Second"}"#);

        let report = RecordLoader::new().load_dir(dir.path()).unwrap();

        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].identifier, "dup");
        assert_eq!(report.records[0].display_name, "Second");
        assert_eq!(report.records[1].identifier, "other");
        assert_eq!(report.overwritten, vec!["dup".to_string()]);
    }

    #[test]
    fn test_empty_dir_uses_seed() {
        let dir = TempDir::new().unwrap();

        let report = RecordLoader::new().load_dir(dir.path()).unwrap();

        assert!(report.used_seed);
        assert_eq!(report.records.len(), 3);
        assert!(report.records.iter().all(|r| r.proofs.len() == 1));
    }

    #[test]
    fn test_missing_dir_uses_seed() {
        let dir = TempDir::new().unwrap();

        let report = RecordLoader::new()
            .load_dir(&dir.path().join("does-not-exist"))
            .unwrap();

        assert!(report.used_seed);
        let ids: Vec<&str> = report.records.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, SEED_IDENTIFIERS.to_vec());
    }
}
