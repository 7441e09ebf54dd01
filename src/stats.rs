// 📊 Statistics Aggregator - one summary document per build
//
// Implemented as a fold: an accumulator value is threaded through one
// update step per record and finished into AggregateStatistics.
// Nothing here can fail; a record with no optional data only lands in the
// independent/unknown buckets.

use crate::record::{Affiliation, EntityRecord, MetricField};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use url::Url;

/// Default length of the top affiliation / host lists
pub const DEFAULT_TOP_N: usize = 20;

/// Label used when an affiliation carries neither a description nor a usable URL
pub const UNKNOWN_LABEL: &str = "unknown";

// ============================================================================
// OUTPUT TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCount {
    pub label: String,
    pub count: usize,
}

/// count/min/max/mean/median over the present values of one metric.
/// With zero samples everything except `count` is null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    pub count: usize,
    pub min: Option<u64>,
    pub max: Option<u64>,
    pub mean: Option<f64>,
    pub median: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub label: String,
    pub lower: u64,
    /// Inclusive upper bound, `None` for the open-ended last bucket
    pub upper: Option<u64>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LorenzPoint {
    pub population_share: f64,
    pub value_share: f64,
}

/// Inequality of the follower distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concentration {
    pub gini: f64,
    pub lorenz: Vec<LorenzPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStatistics {
    pub generated_at: DateTime<Utc>,
    pub total_accounts: usize,

    pub affiliated_count: usize,
    pub independent_count: usize,

    pub verified_count: usize,
    pub unverified_count: usize,
    pub unknown_verification_count: usize,

    pub free_accounts: usize,
    pub subscription_tiers: BTreeMap<String, usize>,

    pub top_affiliations: Vec<LabelCount>,
    pub top_hosts: Vec<LabelCount>,

    pub follower_summary: NumericSummary,
    pub metric_summaries: BTreeMap<String, NumericSummary>,
    pub follower_histogram: Vec<HistogramBucket>,
    pub follower_distribution: Option<Concentration>,
}

// ============================================================================
// TALLY (insertion-ordered counter)
// ============================================================================

/// Counter that remembers first-encountered order, so ties can be broken
/// by it after a stable sort
#[derive(Debug, Clone, Default)]
pub struct Tally {
    index: HashMap<String, usize>,
    entries: Vec<LabelCount>,
}

impl Tally {
    pub fn add(mut self, label: &str) -> Self {
        match self.index.get(label) {
            Some(&i) => self.entries[i].count += 1,
            None => {
                self.index.insert(label.to_string(), self.entries.len());
                self.entries.push(LabelCount {
                    label: label.to_string(),
                    count: 1,
                });
            }
        }
        self
    }

    pub fn total(&self) -> usize {
        self.entries.iter().map(|e| e.count).sum()
    }

    /// Highest counts first; equal counts keep first-encountered order
    pub fn top(&self, n: usize) -> Vec<LabelCount> {
        let mut sorted = self.entries.clone();
        sorted.sort_by(|a, b| b.count.cmp(&a.count));
        sorted.truncate(n);
        sorted
    }

    pub fn into_map(self) -> BTreeMap<String, usize> {
        self.entries.into_iter().map(|e| (e.label, e.count)).collect()
    }
}

// ============================================================================
// ACCUMULATOR
// ============================================================================

#[derive(Debug, Clone, Default)]
struct StatsAccumulator {
    total: usize,
    affiliated: usize,
    independent: usize,
    verified: usize,
    unverified: usize,
    unknown_verification: usize,
    free_accounts: usize,
    tiers: Tally,
    affiliations: Tally,
    hosts: Tally,
    samples: BTreeMap<MetricField, Vec<u64>>,
}

impl StatsAccumulator {
    fn absorb(self, record: &EntityRecord) -> Self {
        let acc = StatsAccumulator {
            total: self.total + 1,
            ..self
        };
        acc.count_affiliation(record)
            .count_tier(record)
            .count_verification(record)
            .count_host(record)
            .collect_metrics(record)
    }

    fn count_affiliation(mut self, record: &EntityRecord) -> Self {
        match record.affiliation.as_ref().filter(|a| !a.is_empty()) {
            Some(affiliation) => {
                self.affiliations = self.affiliations.add(&affiliation_label(affiliation));
                self.affiliated += 1;
            }
            None => self.independent += 1,
        }
        self
    }

    fn count_tier(mut self, record: &EntityRecord) -> Self {
        let tier = record
            .subscription_tier
            .as_ref()
            .map(|t| t.as_str())
            .unwrap_or(UNKNOWN_LABEL);
        self.tiers = self.tiers.add(tier);
        if record.subscription_tier.as_ref().map_or(false, |t| t.is_free()) {
            self.free_accounts += 1;
        }
        self
    }

    fn count_verification(mut self, record: &EntityRecord) -> Self {
        match record.is_verified {
            Some(true) => self.verified += 1,
            Some(false) => self.unverified += 1,
            None => self.unknown_verification += 1,
        }
        self
    }

    fn count_host(mut self, record: &EntityRecord) -> Self {
        if let Some(host) = record.external_url.as_deref().and_then(strict_host) {
            self.hosts = self.hosts.add(&host);
        }
        self
    }

    fn collect_metrics(mut self, record: &EntityRecord) -> Self {
        for field in MetricField::ALL {
            if let Some(value) = record.metric(field) {
                self.samples.entry(field).or_default().push(value);
            }
        }
        self
    }

    fn finish(self, generated_at: DateTime<Utc>, top_n: usize) -> AggregateStatistics {
        let followers = self
            .samples
            .get(&MetricField::Followers)
            .cloned()
            .unwrap_or_default();

        let metric_summaries = MetricField::ALL
            .iter()
            .map(|field| {
                let samples = self.samples.get(field).map(Vec::as_slice).unwrap_or(&[]);
                (field.key().to_string(), summarize(samples))
            })
            .collect();

        AggregateStatistics {
            generated_at,
            total_accounts: self.total,
            affiliated_count: self.affiliated,
            independent_count: self.independent,
            verified_count: self.verified,
            unverified_count: self.unverified,
            unknown_verification_count: self.unknown_verification,
            free_accounts: self.free_accounts,
            top_affiliations: self.affiliations.top(top_n),
            top_hosts: self.hosts.top(top_n),
            subscription_tiers: self.tiers.into_map(),
            follower_summary: summarize(&followers),
            metric_summaries,
            follower_histogram: histogram(&followers),
            follower_distribution: concentration(&followers),
        }
    }
}

// ============================================================================
// AGGREGATOR
// ============================================================================

pub struct StatisticsAggregator {
    top_n: usize,
}

impl StatisticsAggregator {
    pub fn new() -> Self {
        StatisticsAggregator { top_n: DEFAULT_TOP_N }
    }

    pub fn with_top_n(top_n: usize) -> Self {
        StatisticsAggregator { top_n }
    }

    /// Aggregate with a fresh generation timestamp
    pub fn aggregate(&self, records: &[EntityRecord]) -> AggregateStatistics {
        self.aggregate_at(records, Utc::now())
    }

    pub fn aggregate_at(
        &self,
        records: &[EntityRecord],
        generated_at: DateTime<Utc>,
    ) -> AggregateStatistics {
        records
            .iter()
            .fold(StatsAccumulator::default(), StatsAccumulator::absorb)
            .finish(generated_at, self.top_n)
    }
}

impl Default for StatisticsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregateStatistics {
    pub fn summary(&self) -> String {
        format!(
            "{} accounts: {} affiliated, {} independent | {} verified, {} unverified, {} unknown | {} free",
            self.total_accounts,
            self.affiliated_count,
            self.independent_count,
            self.verified_count,
            self.unverified_count,
            self.unknown_verification_count,
            self.free_accounts
        )
    }
}

// ============================================================================
// HOSTS
// ============================================================================

/// Description if present, else the URL's host, else "unknown"
pub fn affiliation_label(affiliation: &Affiliation) -> String {
    affiliation
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .or_else(|| affiliation.url.as_deref().and_then(lenient_host))
        .unwrap_or_else(|| UNKNOWN_LABEL.to_string())
}

fn strip_www(host: &str) -> String {
    let host = host.to_lowercase();
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

/// Host of a well-formed absolute URL, without a leading "www."
pub fn strict_host(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?;
    Some(strip_www(host)).filter(|h| !h.is_empty())
}

/// Like `strict_host`, but also accepts bare domains such as `acme.example/team`
pub fn lenient_host(raw: &str) -> Option<String> {
    strict_host(raw).or_else(|| strict_host(&format!("https://{}", raw.trim())))
}

// ============================================================================
// NUMERIC HELPERS
// ============================================================================

pub fn summarize(samples: &[u64]) -> NumericSummary {
    if samples.is_empty() {
        return NumericSummary {
            count: 0,
            min: None,
            max: None,
            mean: None,
            median: None,
        };
    }

    let mut sorted = samples.to_vec();
    sorted.sort_unstable();

    let n = sorted.len();
    let sum: u128 = sorted.iter().map(|&v| v as u128).sum();
    let median = if n % 2 == 0 {
        (sorted[n / 2 - 1] as f64 + sorted[n / 2] as f64) / 2.0
    } else {
        sorted[n / 2] as f64
    };

    NumericSummary {
        count: n,
        min: sorted.first().copied(),
        max: sorted.last().copied(),
        mean: Some(sum as f64 / n as f64),
        median: Some(median),
    }
}

const HISTOGRAM_LABELS: [&str; 9] = [
    "0", "1-9", "10-99", "100-999", "1K-9.9K", "10K-99K", "100K-999K", "1M-9.9M", "10M+",
];

/// Order-of-magnitude buckets; every bucket is always present
pub fn histogram(samples: &[u64]) -> Vec<HistogramBucket> {
    let last = HISTOGRAM_LABELS.len() - 1;
    let mut counts = vec![0usize; HISTOGRAM_LABELS.len()];

    for &value in samples {
        let digits = if value == 0 { 0 } else { value.to_string().len() };
        counts[digits.min(last)] += 1;
    }

    HISTOGRAM_LABELS
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let (lower, upper) = match i {
                0 => (0, Some(0)),
                i if i == last => (10u64.pow(i as u32 - 1), None),
                i => (10u64.pow(i as u32 - 1), Some(10u64.pow(i as u32) - 1)),
            };
            HistogramBucket {
                label: label.to_string(),
                lower,
                upper,
                count: counts[i],
            }
        })
        .collect()
}

/// Gini coefficient plus an 11-point Lorenz curve.
/// `None` when there are no samples or they sum to zero.
pub fn concentration(samples: &[u64]) -> Option<Concentration> {
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();

    let n = sorted.len();
    let total: f64 = sorted.iter().map(|&v| v as f64).sum();
    if n == 0 || total == 0.0 {
        return None;
    }

    let weighted: f64 = sorted
        .iter()
        .enumerate()
        .map(|(i, &v)| (i + 1) as f64 * v as f64)
        .sum();
    let gini = (2.0 * weighted) / (n as f64 * total) - (n as f64 + 1.0) / n as f64;

    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    for &v in &sorted {
        let next = prefix[prefix.len() - 1] + v as f64;
        prefix.push(next);
    }

    let lorenz = (0..=10)
        .map(|k| {
            let take = k * n / 10;
            LorenzPoint {
                population_share: k as f64 / 10.0,
                value_share: prefix[take] / total,
            }
        })
        .collect();

    Some(Concentration { gini, lorenz })
}

// ============================================================================
// TESTS
// ============================================================================
