use account_directory::{
    read_detail, read_identifier_list, read_listing, read_stats, BuildConfig, BuildMode,
    BundledList, CachedListing, FallbackChain, Pipeline, SiteLayout, SubscriptionTier,
    SEED_IDENTIFIERS,
};
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

fn write_input(config: &BuildConfig, name: &str, body: &str) {
    fs::create_dir_all(&config.input_dir).unwrap();
    fs::write(config.input_dir.join(name), body).unwrap();
}

#[test]
fn test_full_site_build_round_trip() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(&tmp);
    write_input(
        &config,
        "alice.json",
        r#"{
            "identifier": "Alice",
            "displayName": "Alice A.",
            "subscriptionTier": "business",
            "isVerified": true,
            "affiliation": {"description": "Acme Corp", "url": "https://www.acme.com"},
            "metrics": {"followerCount": 1500, "postCount": 20},
            "proofs": [{"label": "Site", "date": "2024-01-01", "description": "Owns acme.com", "urls": ["https://acme.com"]}]
        }"#,
    );
    write_input(
        &config,
        "bob.json",
        r#"{
            "username": "@bob",
            "id": 42,
            "verified_type": "Legacy",
            "verified": false,
            "public_metrics": {"followers_count": 3},
            "changeLog": [{
                "timestamp": "2024-04-01T12:00:00Z",
                "affiliationAfter": {"url": "https://bob.example"},
                "metricsDelta": {"followerCount": -3, "postCount": 2}
            }]
        }"#,
    );

    let report = Pipeline::new(config.clone()).run(BuildMode::Site).unwrap();
    let site = &config.output_dir;

    let listing = read_listing(site).unwrap();
    let ids: Vec<&str> = listing.accounts.iter().map(|a| a.identifier.as_str()).collect();
    assert_eq!(ids, vec!["alice", "bob"]);

    let alice = read_detail(site, "alice").unwrap();
    assert_eq!(alice.display_name, "Alice A.");
    assert_eq!(alice.proofs.len(), 1);
    assert_eq!(&alice, &report.load.as_ref().unwrap().records[0]);

    let bob = read_detail(site, "bob").unwrap();
    assert_eq!(&bob, &report.load.as_ref().unwrap().records[1]);
    assert_eq!(bob.numeric_id.as_deref(), Some("42"));
    assert_eq!(
        bob.subscription_tier,
        Some(SubscriptionTier::Other("Legacy".to_string()))
    );
    assert_eq!(bob.change_log.len(), 1);
    assert_eq!(bob.change_log[0].metrics_delta.unwrap().post_count, Some(2));

    let stats = read_stats(site).unwrap();
    assert_eq!(stats.total_accounts, 2);
    assert_eq!(stats.affiliated_count, 1);
    assert_eq!(stats.verified_count, 1);
    assert_eq!(stats.unverified_count, 1);
    assert_eq!(stats.top_affiliations[0].label, "Acme Corp");

    assert!(site.join(SiteLayout::INDEX_PAGE).exists());
    assert!(site.join(SiteLayout::STATS_PAGE).exists());
    assert!(site.join(SiteLayout::account_page_rel("bob")).exists());
    assert!(site.join(SiteLayout::CSV).exists());
    assert!(site.join(SiteLayout::MANIFEST).exists());
}

#[test]
fn test_extension_copy_matches_site_copy() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(&tmp);
    write_input(&config, "a.json", r#"{"identifier": "zed"}"#);
    write_input(&config, "b.json", r#"{"identifier": "amy"}"#);

    Pipeline::new(config.clone()).run(BuildMode::Site).unwrap();

    let site_bytes = fs::read(config.output_dir.join(SiteLayout::IDENTIFIERS)).unwrap();
    let ext_bytes = fs::read(&config.extension_fallback_path).unwrap();
    assert_eq!(site_bytes, ext_bytes);

    let list = read_identifier_list(&config.extension_fallback_path).unwrap();
    assert_eq!(list.identifiers, vec!["amy", "zed"]);
}

#[test]
fn test_invalid_files_are_left_out_of_every_artifact() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(&tmp);
    write_input(&config, "good.json", r#"{"identifier": "good"}"#);
    write_input(&config, "broken.json", "{ not json");
    write_input(&config, "noid.json", r#"{"displayName": "Nobody"}"#);
    write_input(&config, "stats.json", r#"{"identifier": "reserved"}"#);

    let report = Pipeline::new(config.clone()).run(BuildMode::Site).unwrap();

    let load = report.load.unwrap();
    assert_eq!(load.skipped.len(), 2);
    assert!(!load.used_seed);

    let listing = read_listing(&config.output_dir).unwrap();
    assert_eq!(listing.accounts.len(), 1);
    assert_eq!(read_stats(&config.output_dir).unwrap().total_accounts, 1);
    let list = read_identifier_list(&config.output_dir.join(SiteLayout::IDENTIFIERS)).unwrap();
    assert_eq!(list.identifiers, vec!["good"]);
}

#[test]
fn test_case_duplicates_last_file_wins() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(&tmp);
    write_input(&config, "1.json", r#"{"identifier": "Dup", "displayName": "First"}"#);
    write_input(&config, "2.json", r#"{"identifier": "other"}"#);
    write_input(&config, "3.json", r#"{"identifier": "dup", "displayName": "Second"}"#);

    Pipeline::new(config.clone()).run(BuildMode::Site).unwrap();

    let listing = read_listing(&config.output_dir).unwrap();
    let ids: Vec<&str> = listing.accounts.iter().map(|a| a.identifier.as_str()).collect();
    assert_eq!(ids, vec!["dup", "other"]);
    assert_eq!(listing.accounts[0].display_name, "Second");
}

#[test]
fn test_empty_input_publishes_seed_set() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(&tmp);

    let report = Pipeline::new(config.clone()).run(BuildMode::Site).unwrap();

    assert!(report.load.unwrap().used_seed);
    let listing = read_listing(&config.output_dir).unwrap();
    let mut ids: Vec<String> = listing.accounts.into_iter().map(|a| a.identifier).collect();
    ids.sort();
    let mut expected: Vec<String> = SEED_IDENTIFIERS.iter().map(|s| s.to_string()).collect();
    expected.sort();
    assert_eq!(ids, expected);
}

#[test]
fn test_counts_partition_total() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(&tmp);
    write_input(&config, "a.json", r#"{"identifier": "a", "subscriptionTier": "blue"}"#);
    write_input(
        &config,
        "b.json",
        r#"{"identifier": "b", "affiliation": {"url": "https://example.org"}}"#,
    );
    write_input(&config, "c.json", r#"{"identifier": "c", "subscriptionTier": "none"}"#);
    write_input(&config, "d.json", r#"{"identifier": "d", "affiliation": {}}"#);

    let (_, stats) = Pipeline::new(config).analyze().unwrap();

    assert_eq!(stats.total_accounts, 4);
    assert_eq!(stats.affiliated_count + stats.independent_count, stats.total_accounts);
    assert_eq!(stats.affiliated_count, 1);
    assert_eq!(
        stats.subscription_tiers.values().sum::<usize>(),
        stats.total_accounts
    );
    assert_eq!(
        stats.verified_count + stats.unverified_count + stats.unknown_verification_count,
        stats.total_accounts
    );
}

#[test]
fn test_lookup_falls_back_to_bundled_list() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(&tmp);
    write_input(&config, "a.json", r#"{"identifier": "listed"}"#);
    Pipeline::new(config.clone()).run(BuildMode::Site).unwrap();

    let resolution = FallbackChain::new()
        .then(CachedListing::new(&config.cache_path, config.cache_freshness()))
        .then(BundledList::new(&config.extension_fallback_path))
        .resolve()
        .unwrap();

    assert_eq!(resolution.skipped.len(), 1);
    assert!(resolution.identifiers.contains("@Listed"));
    assert!(!resolution.identifiers.contains("unlisted"));
}
