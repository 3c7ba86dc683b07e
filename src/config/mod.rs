// auditlogtool/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Default S3 key prefix when none is configured.
const DEFAULT_ARCHIVE_PREFIX: &str = "logs";
/// Default staleness threshold: a backup older than this is due again (24 hours).
const DEFAULT_STALENESS_THRESHOLD_SECONDS: i64 = 24 * 60 * 60;

// Struct for deserializing config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub queue_url: Option<String>,
    pub catalog_table: Option<String>,
    pub archive_bucket: Option<String>,
    pub archive_prefix: Option<String>,
    pub staleness_threshold_seconds: Option<i64>,
    pub verify_downloads: Option<bool>,
    pub region: Option<String>,
}

// Application's internal configuration structs
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub queue_url: String,
}

#[derive(Debug, Clone)]
pub struct DetectConfig {
    pub queue_url: String,
    pub catalog_table: String,
}

#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub catalog_table: String,
    pub archive_bucket: String,
    pub archive_prefix: String,
    pub staleness_threshold_seconds: i64,
    pub verify_downloads: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub operation: Option<OperationConfig>,
    pub raw_json_config: RawJsonConfig, // Store the parsed raw config
}

#[derive(Debug, Clone)]
pub enum OperationConfig {
    Scan(ScanConfig),
    Detect(DetectConfig),
    Download(DownloadConfig),
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let raw_json_config = if config_path.exists() {
            let config_content = fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
            serde_json::from_str(&config_content).with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?
        } else {
            println!(
                "No config file at {}, relying on environment variables.",
                config_path.display()
            );
            RawJsonConfig::default()
        };

        Ok(AppConfig {
            operation: None, // To be filled by main after parsing CLI args
            raw_json_config,
        })
    }
}

/// Resolves an option from config.json, falling back to an environment variable.
fn resolve_string(json_value: &Option<String>, env_key: &str) -> Option<String> {
    json_value
        .clone()
        .filter(|s| !s.is_empty())
        .or_else(|| env::var(env_key).ok().filter(|s| !s.is_empty()))
}

pub fn load_scan_config_from_json(raw_config: &RawJsonConfig) -> Result<ScanConfig> {
    let queue_url = resolve_string(&raw_config.queue_url, "QUEUE_URL")
        .context("queue_url must be set in config.json (or QUEUE_URL env var) for scan")?;

    Ok(ScanConfig { queue_url })
}

pub fn load_detect_config_from_json(raw_config: &RawJsonConfig) -> Result<DetectConfig> {
    let queue_url = resolve_string(&raw_config.queue_url, "QUEUE_URL")
        .context("queue_url must be set in config.json (or QUEUE_URL env var) for detect")?;
    let catalog_table = resolve_string(&raw_config.catalog_table, "CATALOG_TABLE")
        .context("catalog_table must be set in config.json (or CATALOG_TABLE env var) for detect")?;

    Ok(DetectConfig {
        queue_url,
        catalog_table,
    })
}

pub fn load_download_config_from_json(raw_config: &RawJsonConfig) -> Result<DownloadConfig> {
    let catalog_table = resolve_string(&raw_config.catalog_table, "CATALOG_TABLE").context(
        "catalog_table must be set in config.json (or CATALOG_TABLE env var) for download",
    )?;
    let archive_bucket = resolve_string(&raw_config.archive_bucket, "ARCHIVE_BUCKET").context(
        "archive_bucket must be set in config.json (or ARCHIVE_BUCKET env var) for download",
    )?;

    let archive_prefix = resolve_string(&raw_config.archive_prefix, "ARCHIVE_PREFIX")
        .unwrap_or_else(|| DEFAULT_ARCHIVE_PREFIX.to_string());

    let staleness_threshold_seconds = match raw_config.staleness_threshold_seconds {
        Some(secs) => secs,
        None => match env::var("STALENESS_THRESHOLD_SECONDS") {
            Ok(raw) => raw.trim().parse::<i64>().with_context(|| {
                format!("STALENESS_THRESHOLD_SECONDS is not a valid integer: {}", raw)
            })?,
            Err(_) => DEFAULT_STALENESS_THRESHOLD_SECONDS,
        },
    };
    if staleness_threshold_seconds <= 0 {
        return Err(anyhow::anyhow!(
            "staleness_threshold_seconds must be positive, got {}",
            staleness_threshold_seconds
        ));
    }

    let verify_downloads = raw_config.verify_downloads.unwrap_or(false);

    Ok(DownloadConfig {
        catalog_table,
        archive_bucket,
        archive_prefix,
        staleness_threshold_seconds,
        verify_downloads,
    })
}

/// Loads the shared AWS SDK configuration, honoring an optional region override
/// from config.json.
pub async fn load_aws_config(raw_config: &RawJsonConfig) -> aws_config::SdkConfig {
    match raw_config.region.as_ref().filter(|r| !r.is_empty()) {
        Some(region) => {
            aws_config::defaults(aws_config::BehaviorVersion::latest())
                .region(aws_config::Region::new(region.clone()))
                .load()
                .await
        }
        None => aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_from(value: serde_json::Value) -> RawJsonConfig {
        serde_json::from_value(value).expect("fixture config should deserialize")
    }

    #[test]
    fn test_parse_full_config_json() -> anyhow::Result<()> {
        let raw = raw_from(json!({
            "queue_url": "https://sqs.eu-west-1.amazonaws.com/123456789012/audit-log-work",
            "catalog_table": "audit-log-catalog",
            "archive_bucket": "audit-log-archive",
            "archive_prefix": "aurora",
            "staleness_threshold_seconds": 3600,
            "verify_downloads": true
        }));

        let scan = load_scan_config_from_json(&raw)?;
        assert_eq!(
            scan.queue_url,
            "https://sqs.eu-west-1.amazonaws.com/123456789012/audit-log-work"
        );

        let detect = load_detect_config_from_json(&raw)?;
        assert_eq!(detect.catalog_table, "audit-log-catalog");

        let download = load_download_config_from_json(&raw)?;
        assert_eq!(download.archive_bucket, "audit-log-archive");
        assert_eq!(download.archive_prefix, "aurora");
        assert_eq!(download.staleness_threshold_seconds, 3600);
        assert!(download.verify_downloads);
        Ok(())
    }

    #[test]
    fn test_download_config_defaults() -> anyhow::Result<()> {
        let raw = raw_from(json!({
            "catalog_table": "audit-log-catalog",
            "archive_bucket": "audit-log-archive"
        }));

        let download = load_download_config_from_json(&raw)?;
        assert_eq!(download.archive_prefix, DEFAULT_ARCHIVE_PREFIX);
        assert_eq!(
            download.staleness_threshold_seconds,
            DEFAULT_STALENESS_THRESHOLD_SECONDS
        );
        assert!(!download.verify_downloads);
        Ok(())
    }

    #[test]
    fn test_missing_required_fields_rejected() {
        let raw = raw_from(json!({}));
        assert!(load_scan_config_from_json(&raw).is_err());
        assert!(load_detect_config_from_json(&raw).is_err());
        assert!(load_download_config_from_json(&raw).is_err());

        // A bucket alone is not enough for download; the catalog table is also required.
        let raw = raw_from(json!({ "archive_bucket": "audit-log-archive" }));
        assert!(load_download_config_from_json(&raw).is_err());
    }

    #[test]
    fn test_empty_strings_treated_as_unset() {
        let raw = raw_from(json!({
            "queue_url": "",
            "catalog_table": "audit-log-catalog"
        }));
        assert!(load_scan_config_from_json(&raw).is_err());
    }

    #[test]
    fn test_nonpositive_staleness_threshold_rejected() {
        let raw = raw_from(json!({
            "catalog_table": "audit-log-catalog",
            "archive_bucket": "audit-log-archive",
            "staleness_threshold_seconds": 0
        }));
        assert!(load_download_config_from_json(&raw).is_err());
    }
}
