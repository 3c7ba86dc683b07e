// auditlogtool/src/downloader/mod.rs
mod logic;
pub(crate) mod events;       // Change-feed record decoding
pub(crate) mod s3_upload;    // Archive store interactions
pub(crate) mod verification; // Optional dual-path download cross-check

use anyhow::Result;
use crate::config::AppConfig;

/// Public entry point for the download process.
/// Drains the catalog's change feed, downloads changed audit log files from
/// RDS and archives them to S3.
pub async fn run_download_flow(app_config: &AppConfig) -> Result<()> {
    let download_config = match &app_config.operation {
        Some(crate::config::OperationConfig::Download(cfg)) => cfg,
        _ => anyhow::bail!("Download operation selected but no download configuration found."),
    };

    logic::perform_download_orchestration(app_config, download_config).await
}
