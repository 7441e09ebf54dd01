use account_directory::{
    BuildConfig, BuildMode, BundledList, CachedListing, FallbackChain, Pipeline,
};
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "account-directory")]
#[command(author, version, about = "Build the account directory site and extension data")]
struct Cli {
    #[command(flatten)]
    paths: PathArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PathArgs {
    /// JSON config file (defaults are used when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the per-account input directory
    #[arg(long, global = true)]
    input: Option<PathBuf>,

    /// Override the site output directory
    #[arg(long, global = true)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the site and package the extension (both by default)
    Build {
        /// Only build the site
        #[arg(long, conflicts_with = "package_only")]
        site_only: bool,

        /// Only package the extension
        #[arg(long)]
        package_only: bool,
    },

    /// Load and aggregate records, print statistics, write nothing
    Stats {
        /// Print the full statistics document as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check whether an account is listed (remote → cache → bundled)
    Lookup {
        identifier: String,

        /// Listing URL, overriding `listingUrl` from the config
        #[arg(long)]
        remote: Option<String>,
    },
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = BuildConfig::load(cli.paths.config.as_deref())?;
    if let Some(input) = cli.paths.input {
        config.input_dir = input;
    }
    if let Some(output) = cli.paths.output {
        config.output_dir = output;
    }

    match cli.command {
        Commands::Build {
            site_only,
            package_only,
        } => {
            let mode = match (site_only, package_only) {
                (true, _) => BuildMode::Site,
                (false, true) => BuildMode::Package,
                (false, false) => BuildMode::All,
            };
            run_build(config, mode)
        }
        Commands::Stats { json } => run_stats(config, json),
        Commands::Lookup { identifier, remote } => run_lookup(config, &identifier, remote),
    }
}

fn run_build(config: BuildConfig, mode: BuildMode) -> Result<()> {
    println!("🏗️  Account Directory - build ({:?})", mode);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let report = Pipeline::new(config).run(mode)?;

    if let Some(load) = &report.load {
        for skip in &load.skipped {
            println!("⚠️  skipped {}: {}", skip.file, skip.reason);
        }
        if load.used_seed {
            println!("⚠️  no valid input records, published the seed set");
        }
    }
    if let Some(stats) = &report.stats {
        println!("📊 {}", stats.summary());
    }

    println!("✓ {}", report.summary());
    Ok(())
}

fn run_stats(config: BuildConfig, json: bool) -> Result<()> {
    let (load, stats) = Pipeline::new(config).analyze()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("📊 {}", stats.summary());
    println!("   skipped files: {}", load.skipped.len());
    let f = &stats.follower_summary;
    match (f.min, f.max, f.mean, f.median) {
        (Some(min), Some(max), Some(mean), Some(median)) => println!(
            "   followers over {} accounts: min {}, max {}, mean {:.1}, median {:.1}",
            f.count, min, max, mean, median
        ),
        _ => println!("   followers: no data"),
    }
    for row in &stats.top_affiliations {
        println!("   {:>5}  {}", row.count, row.label);
    }
    Ok(())
}

fn run_lookup(config: BuildConfig, identifier: &str, remote: Option<String>) -> Result<()> {
    let cache = || CachedListing::new(&config.cache_path, config.cache_freshness());
    let bundled = BundledList::new(&config.extension_fallback_path);

    let chain = match remote.or_else(|| config.listing_url.clone()) {
        #[cfg(feature = "remote")]
        Some(url) => {
            use account_directory::{HttpListingFetcher, RemoteListing};
            let fetcher = HttpListingFetcher::new(url)?;
            FallbackChain::new()
                .then(RemoteListing::new(fetcher).with_cache(cache()))
                .then(cache())
                .then(bundled)
        }
        #[cfg(not(feature = "remote"))]
        Some(_) => {
            tracing::warn!("built without the `remote` feature, skipping remote listing");
            FallbackChain::new().then(cache()).then(bundled)
        }
        None => FallbackChain::new().then(cache()).then(bundled),
    };

    let resolution = chain.resolve()?;
    for (source, reason) in &resolution.skipped {
        println!("⚠️  {} unavailable: {}", source, reason);
    }

    if resolution.identifiers.contains(identifier) {
        println!("✓ @{} is listed (source: {})", identifier.trim_start_matches('@'), resolution.source);
    } else {
        println!("✗ @{} is not listed (source: {})", identifier.trim_start_matches('@'), resolution.source);
    }
    Ok(())
}
