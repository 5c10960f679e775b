use std::path::Path;
use std::sync::Mutex;

use utils::app_config::*;

// AppConfig is process-global; tests touching it must not interleave.
static CONFIG_LOCK: Mutex<()> = Mutex::new(());

pub fn initialize() {
    // Reset to original test configuration
    let config_contents = include_str!("resources/test_config.toml");
    AppConfig::init(Some(config_contents)).unwrap();
}

#[test]
fn fetch_config() {
    let _lock = CONFIG_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    initialize();

    // Fetch an instance of Config
    let config = AppConfig::fetch().unwrap();

    assert_eq!(config.log.level, "info");
    assert_eq!(config.log.dir, None);

    assert_eq!(config.sync.prefix, "");
    assert_eq!(config.sync.concurrency, 1);
    assert_eq!(config.sync.max_retries, 0);
    assert_eq!(config.sync.retry_delay_ms, 500);
    assert!(!config.sync.dry_run);
    assert_eq!(config.sync.scratch_dir, None);

    let source = config.source.unwrap();
    assert_eq!(source.r#type, "local");
    assert_eq!(source.path.as_deref(), Some("/srv/data/outbox"));

    let destination = config.destination.unwrap();
    assert_eq!(destination.r#type, "aws_s3");
    assert_eq!(destination.bucket.as_deref(), Some("archive-bucket"));
    assert_eq!(destination.region.as_deref(), Some("eu-west-1"));
    assert_eq!(destination.prefix.as_deref(), Some("nightly/"));
    assert_eq!(destination.access_key, None);
}

#[test]
fn verify_get() {
    let _lock = CONFIG_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    initialize();

    assert_eq!(AppConfig::get::<String>("log.level").unwrap(), "info");
    assert_eq!(AppConfig::get::<usize>("sync.concurrency").unwrap(), 1);
    assert_eq!(AppConfig::get::<u64>("sync.retry_delay_ms").unwrap(), 500);
    assert_eq!(AppConfig::get::<bool>("sync.dry_run").unwrap(), false);
    assert_eq!(AppConfig::get::<String>("source.type").unwrap(), "local");
    assert_eq!(
        AppConfig::get::<String>("destination.bucket").unwrap(),
        "archive-bucket"
    );
}

#[test]
fn verify_set() {
    let _lock = CONFIG_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    initialize();

    AppConfig::set("log.level", "debug").unwrap();
    AppConfig::set("sync.concurrency", "8").unwrap();
    AppConfig::set("sync.dry_run", "true").unwrap();
    AppConfig::set("source.path", "/tmp/other").unwrap();

    let config = AppConfig::fetch().unwrap();

    assert_eq!(config.log.level, "debug");
    assert_eq!(config.sync.concurrency, 8);
    assert!(config.sync.dry_run);
    assert_eq!(config.source.unwrap().path.as_deref(), Some("/tmp/other"));
}

#[test]
fn test_nested_configuration_access() {
    let _lock = CONFIG_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    initialize();

    let sync_config = AppConfig::get::<SyncConfig>("sync").unwrap();
    assert_eq!(sync_config.concurrency, 1);
    assert_eq!(sync_config.max_retries, 0);

    let provider = AppConfig::get::<ProviderConfig>("destination").unwrap();
    assert_eq!(provider, {
        let mut expected = ProviderConfig::s3("archive-bucket", Some("nightly/".to_string()));
        expected.region = Some("eu-west-1".to_string());
        expected
    });
}

#[test]
fn merge_yaml_job_file() {
    let _lock = CONFIG_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    initialize();

    let job = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/resources/job.yaml");
    AppConfig::merge_config(Some(&job)).unwrap();

    let config = AppConfig::fetch().unwrap();
    assert_eq!(config.sync.concurrency, 4);
    assert_eq!(config.source.unwrap(), ProviderConfig::local("/mnt/reports"));

    let destination = config.destination.unwrap();
    assert_eq!(destination.bucket.as_deref(), Some("reports-backup"));
    assert_eq!(destination.region.as_deref(), Some("us-east-2"));
    // keys absent from the job file keep their lower-layer values
    assert_eq!(destination.prefix.as_deref(), Some("nightly/"));
}

#[test]
fn merge_missing_file_is_an_error() {
    let _lock = CONFIG_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    initialize();

    let missing = Path::new("/definitely/not/here/job.toml");
    assert!(AppConfig::merge_config(Some(missing)).is_err());
    assert!(AppConfig::merge_config(None).is_ok());
}
