// auditlogtool/src/scanner/mod.rs
pub(crate) mod logic;

use anyhow::Result;
use crate::config::AppConfig;

/// Public entry point for the instance scan.
/// Enumerates DB instances and publishes qualifying identifiers to the work queue.
pub async fn run_scan_flow(app_config: &AppConfig) -> Result<()> {
    let scan_config = match &app_config.operation {
        Some(crate::config::OperationConfig::Scan(cfg)) => cfg,
        _ => anyhow::bail!("Scan operation selected but no scan configuration found."),
    };

    logic::perform_scan_orchestration(app_config, scan_config).await
}
