//! Aurora MySQL Audit Log Backup Tool
//!
//! Three-stage pipeline: scan DB instances, detect changed audit log files,
//! download and archive them to S3.

// auditlogtool/src/main.rs
mod catalog;
mod config;
mod detector;
mod downloader;
mod scanner;
mod utils;

use anyhow::{Context, Result};
use config::{
    AppConfig, OperationConfig, load_detect_config_from_json, load_download_config_from_json,
    load_scan_config_from_json,
};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

/// Main entry point for the audit log backup tool
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    match run_app().await {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    // Define the path to config.json. Expects it in the same directory as the executable
    // or the project root if running with `cargo run`.
    let config_path = PathBuf::from("config.json");
    let mut app_config = AppConfig::load_from_json(&config_path)
        .context(format!("Failed to load application configuration from {}", config_path.display()))?;

    let args: Vec<String> = env::args().collect();
    let choice = if args.len() > 1 {
        args[1].trim().to_string()
    } else {
        prompt_choice()?
    };

    match choice.as_str() {
        "1" | "scan" => {
            println!("🚀 Starting DB Instance Scan...");
            let scan_config = load_scan_config_from_json(&app_config.raw_json_config)
                .context("Failed to load scan configuration from JSON")?;
            app_config.operation = Some(OperationConfig::Scan(scan_config));
            scanner::run_scan_flow(&app_config).await
                .context("Instance scan failed")?;
        }
        "2" | "detect" => {
            println!("🔍 Starting Log File Detection...");
            let detect_config = load_detect_config_from_json(&app_config.raw_json_config)
                .context("Failed to load detect configuration from JSON")?;
            app_config.operation = Some(OperationConfig::Detect(detect_config));
            detector::run_detect_flow(&app_config).await
                .context("Log file detection failed")?;
        }
        "3" | "download" => {
            println!("⬇️ Starting Log File Download...");
            let download_config = load_download_config_from_json(&app_config.raw_json_config)
                .context("Failed to load download configuration from JSON")?;
            app_config.operation = Some(OperationConfig::Download(download_config));
            downloader::run_download_flow(&app_config).await
                .context("Log file download failed")?;
        }
        _ => {
            println!("❌ Invalid choice. Please enter '1' (scan), '2' (detect), or '3' (download).");
            anyhow::bail!("Invalid operation choice");
        }
    }
    Ok(())
}

/// Prompts user to select a pipeline stage to run
///
/// Returns the user's choice as String
fn prompt_choice() -> Result<String> {
    use std::io::{stdin, stdout, Write};

    println!("Select an operation:");
    println!("1. Scan DB Instances (or type 'scan')");
    println!("2. Detect Changed Log Files (or type 'detect')");
    println!("3. Download & Archive Log Files (or type 'download')");
    print!("Enter your choice: ");
    let _ = stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin().read_line(&mut input).context("Failed to read user input")?;
    Ok(input.trim().to_string())
}
