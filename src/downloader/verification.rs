// auditlogtool/src/downloader/verification.rs
//! Optional dual-path download cross-check.
//!
//! The portioned download is the path of record. When `verify_downloads` is
//! enabled, the file is fetched a second time through the whole-file variant
//! of the portion API (`Marker = "0"`, `NumberOfLines = 0`) and the two
//! checksums are compared. A mismatch is logged, never fatal; the full-path
//! copy is kept under a distinct key so both results can be compared later.

use anyhow::{Context, Result};

use crate::downloader::events::ChangeEvent;
use crate::downloader::logic::md5_hex;
use crate::downloader::s3_upload;

/// Suffix appended to the primary archive key for the full-path copy.
const FULL_COPY_SUFFIX: &str = ".full";

/// Re-downloads the log file through the whole-file path, compares checksums
/// against the portioned download, and archives the second copy for forensic
/// comparison.
pub async fn cross_check_full_download(
    rds_client: &aws_sdk_rds::Client,
    s3_client: &aws_sdk_s3::Client,
    archive_bucket: &str,
    primary_key: &str,
    event: &ChangeEvent,
    portioned_md5: &str,
) -> Result<()> {
    let content =
        download_complete_log_file(rds_client, &event.db_instance_id, &event.log_file_name).await?;

    let full_md5 = md5_hex(&content);
    if full_md5 == portioned_md5 {
        println!(
            "Checksums match between download methods for {}: {}",
            event.log_file_name, full_md5
        );
    } else {
        eprintln!(
            "⚠️ WARNING: checksums do not match between download methods for {}/{}",
            event.db_instance_id, event.log_file_name
        );
        eprintln!("  portioned: {}", portioned_md5);
        eprintln!("  full:      {}", full_md5);
    }

    let full_copy_key = format!("{}{}", primary_key, FULL_COPY_SUFFIX);
    s3_upload::upload_log_content(s3_client, archive_bucket, &full_copy_key, content).await
}

/// Downloads a complete log file in one call using the whole-file variant of
/// the portion API.
async fn download_complete_log_file(
    client: &aws_sdk_rds::Client,
    db_instance_id: &str,
    log_file_name: &str,
) -> Result<Vec<u8>> {
    println!(
        "Downloading complete log file {} from instance {} in one call",
        log_file_name, db_instance_id
    );

    // Marker "0" with zero lines requests the entire file at once.
    let resp = client
        .download_db_log_file_portion()
        .db_instance_identifier(db_instance_id)
        .log_file_name(log_file_name)
        .marker("0")
        .number_of_lines(0)
        .send()
        .await
        .with_context(|| {
            format!(
                "Failed whole-file download of {} from instance {}",
                log_file_name, db_instance_id
            )
        })?;

    let content = resp
        .log_file_data()
        .with_context(|| format!("No log file data returned for {}", log_file_name))?
        .as_bytes()
        .to_vec();

    println!("Whole-file download complete: {} bytes", content.len());
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_copy_key_gets_suffix() {
        let key = format!("{}{}", "logs/db1/audit.log", FULL_COPY_SUFFIX);
        assert_eq!(key, "logs/db1/audit.log.full");
    }
}
