// auditlogtool/src/detector/mod.rs
pub(crate) mod logic;

use anyhow::Result;
use crate::config::AppConfig;

/// Public entry point for the detection process.
/// Consumes queued instance identifiers and reconciles their audit log files
/// against the catalog.
pub async fn run_detect_flow(app_config: &AppConfig) -> Result<()> {
    let detect_config = match &app_config.operation {
        Some(crate::config::OperationConfig::Detect(cfg)) => cfg,
        _ => anyhow::bail!("Detect operation selected but no detect configuration found."),
    };

    logic::perform_detect_orchestration(app_config, detect_config).await
}
