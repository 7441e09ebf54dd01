// Account Directory - Core Library
// Static-site build for a directory of tracked accounts; used by the CLI,
// the preview server, and tests

pub mod config;
pub mod html;
pub mod loader;
pub mod package;
pub mod pipeline;
pub mod record;
pub mod sources;
pub mod stats;
pub mod writer;

// Re-export commonly used types
pub use config::BuildConfig;
pub use loader::{
    parse_record, seed_records, LoadReport, RecordLoader, SkipDiagnostic, SkipReason,
    SEED_IDENTIFIERS,
};
pub use package::Packager;
pub use pipeline::{BuildMode, BuildReport, Pipeline};
pub use record::{
    normalize_identifier, Affiliation, ChangeLogEntry, EntityRecord, MetricField, Metrics,
    MetricsDelta, Proof, SubscriptionTier,
};
pub use sources::{
    Availability, BundledList, CachedListing, FallbackChain, FetchError, IdentifierSet,
    ListSource, ListingFetcher, RemoteListing, Resolution,
};
pub use stats::{
    AggregateStatistics, Concentration, HistogramBucket, LabelCount, NumericSummary,
    StatisticsAggregator, Tally,
};
pub use writer::{
    read_detail, read_identifier_list, read_listing, read_stats, AccountSummary,
    IdentifierList, Listing, OutputWriter, SiteLayout, WriteReport,
};

#[cfg(feature = "remote")]
pub use sources::HttpListingFetcher;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
