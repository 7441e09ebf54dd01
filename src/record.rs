// 🪪 Entity Records - one tracked account and everything known about it
//
// Records are read once per build and never mutated afterwards.
// Identity is the normalized identifier (no leading "@", lower-case).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// SUBSCRIPTION TIER
// ============================================================================

/// Paid-verification tier reported for an account.
///
/// Unknown values are kept verbatim in `Other` so they still show up in the
/// tier distribution under their own name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubscriptionTier {
    None,
    Blue,
    Business,
    Government,
    Other(String),
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionTier::None => "none",
            SubscriptionTier::Blue => "blue",
            SubscriptionTier::Business => "business",
            SubscriptionTier::Government => "government",
            SubscriptionTier::Other(raw) => raw,
        }
    }

    /// Free accounts are the ones explicitly reported as tier "none"
    pub fn is_free(&self) -> bool {
        matches!(self, SubscriptionTier::None)
    }
}

impl From<String> for SubscriptionTier {
    fn from(raw: String) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_lowercase().as_str() {
            "none" => SubscriptionTier::None,
            "blue" => SubscriptionTier::Blue,
            "business" => SubscriptionTier::Business,
            "government" => SubscriptionTier::Government,
            _ => SubscriptionTier::Other(trimmed.to_string()),
        }
    }
}

impl From<SubscriptionTier> for String {
    fn from(tier: SubscriptionTier) -> Self {
        tier.as_str().to_string()
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// AFFILIATION
// ============================================================================

/// Claimed link between the account and an organization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Affiliation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge_url: Option<String>,
}

impl Affiliation {
    /// An affiliation is empty when none of its fields carries text
    pub fn is_empty(&self) -> bool {
        [&self.description, &self.url, &self.badge_url]
            .iter()
            .all(|field| field.as_deref().map_or(true, |s| s.trim().is_empty()))
    }
}

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follower_count: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub following_count: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_count: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listed_count: Option<u64>,
}

impl Metrics {
    pub fn is_empty(&self) -> bool {
        self.follower_count.is_none()
            && self.following_count.is_none()
            && self.post_count.is_none()
            && self.listed_count.is_none()
    }

    pub fn get(&self, field: MetricField) -> Option<u64> {
        match field {
            MetricField::Followers => self.follower_count,
            MetricField::Following => self.following_count,
            MetricField::Posts => self.post_count,
            MetricField::Listed => self.listed_count,
        }
    }
}

/// Selects one numeric metric for summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricField {
    Followers,
    Following,
    Posts,
    Listed,
}

impl MetricField {
    pub const ALL: [MetricField; 4] = [
        MetricField::Followers,
        MetricField::Following,
        MetricField::Posts,
        MetricField::Listed,
    ];

    /// JSON field name, as used in input files and artifacts
    pub fn key(&self) -> &'static str {
        match self {
            MetricField::Followers => "followerCount",
            MetricField::Following => "followingCount",
            MetricField::Posts => "postCount",
            MetricField::Listed => "listedCount",
        }
    }
}

/// Signed change of each metric between two reconciliation runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follower_count: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub following_count: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_count: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listed_count: Option<i64>,
}

// ============================================================================
// PROOFS & CHANGE LOG
// ============================================================================

/// A dated, sourced claim justifying why the account is listed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Proof {
    #[serde(default)]
    pub label: String,

    #[serde(default)]
    pub date: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub urls: Vec<String>,
}

/// One observed difference between a live snapshot and the stored record.
/// Entries are appended by the reconciliation job, never by the build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLogEntry {
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation_before: Option<Affiliation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation_after: Option<Affiliation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_delta: Option<MetricsDelta>,
}

// ============================================================================
// ENTITY RECORD
// ============================================================================

/// Full record of one tracked account, as written to its detail artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    /// Normalized identifier: unique, lower-case, never empty
    pub identifier: String,

    pub display_name: String,
    pub avatar_url: String,
    pub bio_text: String,

    /// Platform-assigned id, kept as an opaque string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<Affiliation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_tier: Option<SubscriptionTier>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,

    /// `None` means verification status is unknown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_verified: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,

    #[serde(default)]
    pub proofs: Vec<Proof>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub change_log: Vec<ChangeLogEntry>,
}

impl EntityRecord {
    /// Minimal record for `identifier` with every defaulted field filled in
    pub fn placeholder(identifier: &str) -> Self {
        EntityRecord {
            identifier: identifier.to_string(),
            display_name: default_display_name(identifier),
            avatar_url: default_avatar_url(identifier),
            bio_text: default_bio_text(identifier),
            numeric_id: None,
            affiliation: None,
            subscription_tier: None,
            external_url: None,
            is_verified: None,
            metrics: None,
            proofs: Vec::new(),
            change_log: Vec::new(),
        }
    }

    /// Affiliation only counts when it is present and carries some text
    pub fn has_affiliation(&self) -> bool {
        self.affiliation.as_ref().map_or(false, |a| !a.is_empty())
    }

    pub fn metric(&self, field: MetricField) -> Option<u64> {
        self.metrics.as_ref().and_then(|m| m.get(field))
    }
}

// ============================================================================
// IDENTIFIERS & DEFAULTS
// ============================================================================

/// Normalize a raw handle: trim, drop one leading "@", lower-case
pub fn normalize_identifier(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('@')
        .unwrap_or(trimmed)
        .trim()
        .to_lowercase()
}

/// Identifiers become directory and file names in the site output
pub fn is_path_safe(identifier: &str) -> bool {
    !identifier.is_empty()
        && !identifier.starts_with('.')
        && identifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

pub fn default_display_name(identifier: &str) -> String {
    identifier.to_string()
}

pub fn default_avatar_url(identifier: &str) -> String {
    format!("https://unavatar.io/x/{}", identifier)
}

pub fn default_bio_text(identifier: &str) -> String {
    format!("Profile for @{}", identifier)
}

// ============================================================================
// TESTS
// ============================================================================
