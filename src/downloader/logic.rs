// auditlogtool/src/downloader/logic.rs
use anyhow::{Context, Result};
use aws_sdk_dynamodbstreams::types::{Record, Shard, ShardIteratorType};
use chrono::Utc;
use md5::{Digest, Md5};
use std::time::Duration;

use crate::catalog::Catalog;
use crate::config::{AppConfig, DownloadConfig, load_aws_config};
use crate::downloader::events::{ChangeEvent, ChangeKind, NumericField, change_kind, decode_change_event};
use crate::downloader::{s3_upload, verification};
use crate::utils::drain_paginated;

/// Lines requested per portion. The provider caps each response at ~1 MB
/// regardless.
const PORTION_LINE_COUNT: i32 = 10_000;
/// Wall-clock budget for a single portion request.
const PORTION_TIMEOUT: Duration = Duration::from_secs(30);
/// A portion this large has likely hit the provider's response cap and may
/// have been truncated silently.
const PORTION_SIZE_CEILING_BYTES: usize = 1_000_000;
/// Tolerated ratio of downloaded bytes to the reported file size before a
/// shortfall warning is raised.
const EXPECTED_SIZE_TOLERANCE: f64 = 0.9;

/// A fully assembled log file plus the metrics gathered while fetching it.
pub struct DownloadedLog {
    pub content: Vec<u8>,
    pub portions: usize,
    pub line_count: usize,
    pub md5_hex: String,
}

/// Main download flow: drain the catalog's change feed and archive every log
/// file whose change event warrants a (re-)download.
pub async fn perform_download_orchestration(
    app_config: &AppConfig,
    download_config: &DownloadConfig,
) -> Result<()> {
    let sdk_config = load_aws_config(&app_config.raw_json_config).await;
    let rds_client = aws_sdk_rds::Client::new(&sdk_config);
    let s3_client = aws_sdk_s3::Client::new(&sdk_config);
    let dynamo_client = aws_sdk_dynamodb::Client::new(&sdk_config);
    let streams_client = aws_sdk_dynamodbstreams::Client::new(&sdk_config);
    let catalog = Catalog::new(dynamo_client.clone(), download_config.catalog_table.clone());

    let stream_arn = resolve_stream_arn(&dynamo_client, &download_config.catalog_table).await?;
    let records = collect_stream_records(&streams_client, &stream_arn).await?;
    println!("Fetched {} change record(s) from the catalog stream", records.len());

    for record in &records {
        if change_kind(record) == ChangeKind::Other {
            // Only inserts and modifications can make a backup due.
            continue;
        }
        let event = match decode_change_event(record) {
            Ok(event) => event,
            Err(e) => {
                eprintln!("❌ Error decoding change record: {:?}", e);
                continue;
            }
        };

        if let Err(e) = process_change_event(
            &rds_client,
            &s3_client,
            &catalog,
            download_config,
            &event,
        )
        .await
        {
            // One bad log file must not block the rest of the batch; the
            // stream redelivers on the next invocation if needed.
            eprintln!(
                "❌ Error processing change event for instance {} log file {}: {:?}",
                event.db_instance_id, event.log_file_name, e
            );
        }
    }

    Ok(())
}

/// Looks up the catalog table's latest stream ARN.
async fn resolve_stream_arn(
    client: &aws_sdk_dynamodb::Client,
    table_name: &str,
) -> Result<String> {
    let resp = client
        .describe_table()
        .table_name(table_name)
        .send()
        .await
        .with_context(|| format!("Failed to describe catalog table {}", table_name))?;

    resp.table()
        .and_then(|table| table.latest_stream_arn())
        .map(str::to_string)
        .with_context(|| format!("Catalog table {} has no change stream enabled", table_name))
}

/// Reads every available record from every shard of the change feed.
/// Iteration per shard stops at the first empty page, so an open shard does
/// not stall the invocation waiting for future writes.
async fn collect_stream_records(
    client: &aws_sdk_dynamodbstreams::Client,
    stream_arn: &str,
) -> Result<Vec<Record>> {
    let shards = list_shards(client, stream_arn).await?;
    let mut records = Vec::new();

    for shard in &shards {
        let Some(shard_id) = shard.shard_id() else {
            continue;
        };

        let resp = client
            .get_shard_iterator()
            .stream_arn(stream_arn)
            .shard_id(shard_id)
            .shard_iterator_type(ShardIteratorType::TrimHorizon)
            .send()
            .await
            .with_context(|| format!("Failed to get iterator for shard {}", shard_id))?;
        let mut iterator = resp.shard_iterator().map(str::to_string);

        while let Some(current) = iterator.take() {
            let page = client
                .get_records()
                .shard_iterator(&current)
                .send()
                .await
                .with_context(|| format!("Failed to read records from shard {}", shard_id))?;

            let page_records = page.records();
            if page_records.is_empty() {
                break;
            }
            records.extend(page_records.iter().cloned());
            iterator = page.next_shard_iterator().map(str::to_string);
        }
    }

    Ok(records)
}

/// Lists the stream's shards, following shard pagination to exhaustion.
async fn list_shards(
    client: &aws_sdk_dynamodbstreams::Client,
    stream_arn: &str,
) -> Result<Vec<Shard>> {
    drain_paginated(|start_shard_id| {
        let client = client.clone();
        let stream_arn = stream_arn.to_string();
        async move {
            let resp = client
                .describe_stream()
                .stream_arn(&stream_arn)
                .set_exclusive_start_shard_id(start_shard_id)
                .send()
                .await
                .context("Failed to describe catalog change stream")?;
            let description = resp
                .stream_description()
                .context("Stream description missing from response")?;
            Ok((
                description.shards().to_vec(),
                description.last_evaluated_shard_id().map(str::to_string),
            ))
        }
    })
    .await
}

/// Handles one insert/modify event end to end: decision, download, optional
/// cross-check, upload, catalog stamp.
async fn process_change_event(
    rds_client: &aws_sdk_rds::Client,
    s3_client: &aws_sdk_s3::Client,
    catalog: &Catalog,
    download_config: &DownloadConfig,
    event: &ChangeEvent,
) -> Result<()> {
    let now = Utc::now().timestamp();
    if !should_download(event, download_config.staleness_threshold_seconds, now) {
        println!(
            "Skipping download for {}/{}, no significant changes",
            event.db_instance_id, event.log_file_name
        );
        return Ok(());
    }

    println!(
        "Downloading log file {} from instance {}",
        event.log_file_name, event.db_instance_id
    );
    let downloaded =
        download_log_file(rds_client, &event.db_instance_id, &event.log_file_name).await?;
    println!(
        "Download complete: {} bytes in {} portions, {} lines, md5 {}",
        downloaded.content.len(),
        downloaded.portions,
        downloaded.line_count,
        downloaded.md5_hex
    );

    let key = archive_key(
        &download_config.archive_prefix,
        &event.db_instance_id,
        &event.log_file_name,
    );

    if download_config.verify_downloads {
        // Cross-check failures are warnings only; the portioned result is
        // still archived below.
        if let Err(e) = verification::cross_check_full_download(
            rds_client,
            s3_client,
            &download_config.archive_bucket,
            &key,
            event,
            &downloaded.md5_hex,
        )
        .await
        {
            eprintln!(
                "⚠️ Dual-path verification failed for {}/{}: {:?}",
                event.db_instance_id, event.log_file_name, e
            );
        }
    }

    s3_upload::upload_log_content(
        s3_client,
        &download_config.archive_bucket,
        &key,
        downloaded.content,
    )
    .await?;

    // The stamp comes last: LastBackup only advances after a verified upload.
    catalog
        .mark_backed_up(&event.db_instance_id, &event.log_file_name, Utc::now().timestamp())
        .await?;

    println!(
        "✅ Archived log file {} for instance {} at s3://{}/{}",
        event.log_file_name, event.db_instance_id, download_config.archive_bucket, key
    );
    Ok(())
}

/// Decides whether a change event warrants a (re-)download.
///
/// Inserts always download. Modifications download when `Size` or
/// `LastWritten` changed, when the record has never been backed up, or when
/// the last backup is older than the staleness threshold. A malformed
/// numeric value counts as changed so decoding problems err toward a
/// redundant download rather than a missed one.
pub fn should_download(
    event: &ChangeEvent,
    staleness_threshold_seconds: i64,
    now_unix: i64,
) -> bool {
    match event.kind {
        ChangeKind::Insert => true,
        ChangeKind::Other => false,
        ChangeKind::Modify => {
            let old_image = event.old_image.as_ref();
            if numeric_changed(old_image.map(|image| &image.size), &event.new_image.size) {
                return true;
            }
            if numeric_changed(
                old_image.map(|image| &image.last_written),
                &event.new_image.last_written,
            ) {
                return true;
            }
            match event.new_image.last_backup {
                NumericField::Absent | NumericField::Malformed => true,
                NumericField::Value(last_backup) => {
                    last_backup < now_unix - staleness_threshold_seconds
                }
            }
        }
    }
}

/// Compares one numeric field across the old and new images. Without an old
/// image there is nothing to compare against, so only the staleness check
/// applies.
fn numeric_changed(old: Option<&NumericField>, new: &NumericField) -> bool {
    let Some(old) = old else {
        return false;
    };
    match (old, new) {
        (NumericField::Malformed, _) | (_, NumericField::Malformed) => true,
        (NumericField::Value(a), NumericField::Value(b)) => a != b,
        (NumericField::Absent, NumericField::Absent) => false,
        _ => true,
    }
}

/// Deterministic archive key for one log file. Re-uploads land on the same
/// key, which is what makes redundant downloads harmless.
pub fn archive_key(prefix: &str, db_instance_id: &str, log_file_name: &str) -> String {
    format!("{}/{}/{}", prefix, db_instance_id, log_file_name)
}

/// Downloads a log file through the portioned RDS API, following the
/// continuation marker until the provider reports no more data pending.
pub async fn download_log_file(
    client: &aws_sdk_rds::Client,
    db_instance_id: &str,
    log_file_name: &str,
) -> Result<DownloadedLog> {
    let expected_size = get_log_file_size(client, db_instance_id, log_file_name).await?;
    match expected_size {
        Some(size) => println!("Expected log file size: {} bytes", size),
        None => println!("Expected log file size not available"),
    }

    let mut content: Vec<u8> = Vec::with_capacity(expected_size.unwrap_or(0).max(0) as usize);
    let mut marker = "0".to_string();
    let mut portions = 0usize;
    let mut line_count = 0usize;

    loop {
        portions += 1;

        let resp = tokio::time::timeout(
            PORTION_TIMEOUT,
            client
                .download_db_log_file_portion()
                .db_instance_identifier(db_instance_id)
                .log_file_name(log_file_name)
                .marker(&marker)
                .number_of_lines(PORTION_LINE_COUNT)
                .send(),
        )
        .await
        .with_context(|| {
            format!(
                "Timed out downloading portion {} of {} from instance {}",
                portions, log_file_name, db_instance_id
            )
        })?
        .with_context(|| {
            format!(
                "Failed to download portion {} of {} from instance {}",
                portions, log_file_name, db_instance_id
            )
        })?;

        let portion_data = resp.log_file_data().unwrap_or("");
        if portion_data.is_empty() {
            eprintln!("⚠️ Received empty portion {} of {}", portions, log_file_name);
        } else {
            let portion_bytes = portion_data.as_bytes();
            let portion_lines = count_lines(portion_bytes);
            line_count += portion_lines;
            content.extend_from_slice(portion_bytes);
            println!(
                "Downloaded portion {}: {} bytes, {} lines",
                portions,
                portion_bytes.len(),
                portion_lines
            );

            if portion_bytes.len() >= PORTION_SIZE_CEILING_BYTES {
                eprintln!(
                    "⚠️ Portion {} size ({} bytes) suggests possible truncation",
                    portions,
                    portion_bytes.len()
                );
            }
        }

        if !resp.additional_data_pending().unwrap_or(false) {
            println!("No more data pending after portion {}", portions);
            break;
        }

        match resp.marker() {
            Some(next_marker) if !next_marker.is_empty() => marker = next_marker.to_string(),
            _ => {
                return Err(anyhow::anyhow!(
                    "Pagination error downloading {}: empty marker with more data pending",
                    log_file_name
                ));
            }
        }
    }

    if let Some(expected) = expected_size {
        if expected > 0 && (content.len() as f64) < (expected as f64) * EXPECTED_SIZE_TOLERANCE {
            eprintln!(
                "⚠️ Downloaded size ({} bytes) is significantly less than reported size ({} bytes) for {}",
                content.len(),
                expected,
                log_file_name
            );
        }
    }

    let md5_hex = md5_hex(&content);
    Ok(DownloadedLog {
        content,
        portions,
        line_count,
        md5_hex,
    })
}

/// Fetches the reported size of one log file via the listing API's
/// name-contains filter.
async fn get_log_file_size(
    client: &aws_sdk_rds::Client,
    db_instance_id: &str,
    log_file_name: &str,
) -> Result<Option<i64>> {
    let resp = client
        .describe_db_log_files()
        .db_instance_identifier(db_instance_id)
        .filename_contains(log_file_name)
        .send()
        .await
        .with_context(|| {
            format!(
                "Failed to look up log file {} on instance {}",
                log_file_name, db_instance_id
            )
        })?;

    let details = resp
        .describe_db_log_files()
        .iter()
        .find(|details| details.log_file_name() == Some(log_file_name))
        .with_context(|| {
            format!(
                "Log file {} not found on instance {}",
                log_file_name, db_instance_id
            )
        })?;
    Ok(details.size())
}

pub fn count_lines(data: &[u8]) -> usize {
    data.iter().filter(|&&byte| byte == b'\n').count()
}

pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}
