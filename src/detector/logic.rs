// auditlogtool/src/detector/logic.rs
use anyhow::{Context, Result};
use aws_sdk_rds::types::DescribeDbLogFilesDetails;

use crate::catalog::{Catalog, LogFileRecord};
use crate::config::{AppConfig, DetectConfig, load_aws_config};
use crate::utils::drain_paginated;

/// How many work items to take from the queue per invocation.
const MAX_WORK_ITEMS: i32 = 10;
/// Long-poll wait when receiving work items.
const RECEIVE_WAIT_SECONDS: i32 = 5;

/// What the detector decided to do with one observed log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogAction {
    Insert(LogFileRecord),
    Update(LogFileRecord),
    Unchanged,
}

/// Main detect flow: receive a batch of instance identifiers from the work
/// queue and reconcile each instance's audit log files against the catalog.
pub async fn perform_detect_orchestration(
    app_config: &AppConfig,
    detect_config: &DetectConfig,
) -> Result<()> {
    let sdk_config = load_aws_config(&app_config.raw_json_config).await;
    let rds_client = aws_sdk_rds::Client::new(&sdk_config);
    let sqs_client = aws_sdk_sqs::Client::new(&sdk_config);
    let catalog = Catalog::new(
        aws_sdk_dynamodb::Client::new(&sdk_config),
        detect_config.catalog_table.clone(),
    );

    let resp = sqs_client
        .receive_message()
        .queue_url(&detect_config.queue_url)
        .max_number_of_messages(MAX_WORK_ITEMS)
        .wait_time_seconds(RECEIVE_WAIT_SECONDS)
        .send()
        .await
        .context("Failed to receive work items from queue")?;

    let messages = resp.messages();
    if messages.is_empty() {
        println!("No work items on the queue.");
        return Ok(());
    }
    println!("Received {} work item(s)", messages.len());

    for message in messages {
        let Some(db_instance_id) = message.body() else {
            eprintln!("❌ Work item with empty body, skipping");
            continue;
        };
        println!("Processing DB instance: {}", db_instance_id);

        match process_instance(&rds_client, &catalog, db_instance_id).await {
            Ok(_) => {
                // Acknowledge only after the whole instance reconciled; an
                // unacknowledged message redelivers after the visibility window.
                if let Some(receipt_handle) = message.receipt_handle() {
                    sqs_client
                        .delete_message()
                        .queue_url(&detect_config.queue_url)
                        .receipt_handle(receipt_handle)
                        .send()
                        .await
                        .with_context(|| {
                            format!("Failed to acknowledge work item for instance {}", db_instance_id)
                        })?;
                }
            }
            Err(e) => {
                eprintln!("❌ Error processing instance {}: {:?}", db_instance_id, e);
                // Leave the message on the queue for redelivery.
            }
        }
    }

    Ok(())
}

/// Reconciles one instance: lists its log files, filters to audit logs, and
/// applies insert/update/no-op decisions against the catalog. Per-file
/// catalog errors skip that file only.
async fn process_instance(
    rds_client: &aws_sdk_rds::Client,
    catalog: &Catalog,
    db_instance_id: &str,
) -> Result<()> {
    let log_files = get_db_log_files(rds_client, db_instance_id).await?;
    println!(
        "Found {} log files for DB instance {}",
        log_files.len(),
        db_instance_id
    );

    for log_file in &log_files {
        let Some(log_file_name) = log_file.log_file_name() else {
            continue;
        };
        if !is_audit_log(log_file_name) {
            continue;
        }

        let size = log_file.size().unwrap_or(0);
        let last_written = log_file.last_written().unwrap_or(0);

        let existing = match catalog.get_record(db_instance_id, log_file_name).await {
            Ok(existing) => existing,
            Err(e) => {
                eprintln!(
                    "❌ Error checking catalog for instance {} log file {}: {:?}",
                    db_instance_id, log_file_name, e
                );
                continue;
            }
        };

        let action =
            plan_catalog_action(db_instance_id, log_file_name, size, last_written, existing.as_ref());
        let result = match &action {
            CatalogAction::Insert(record) => {
                println!("Cataloging new log file {}", log_file_name);
                catalog.insert_record(record).await
            }
            CatalogAction::Update(record) => {
                println!("Log file {} changed, updating catalog", log_file_name);
                catalog.update_record(record).await
            }
            CatalogAction::Unchanged => {
                println!("Log file {} hasn't changed, skipping", log_file_name);
                Ok(())
            }
        };
        if let Err(e) = result {
            eprintln!(
                "❌ Error writing catalog for instance {} log file {}: {:?}",
                db_instance_id, log_file_name, e
            );
        }
    }

    Ok(())
}

/// Lists all log files for a DB instance, following pagination markers to
/// exhaustion.
async fn get_db_log_files(
    client: &aws_sdk_rds::Client,
    db_instance_id: &str,
) -> Result<Vec<DescribeDbLogFilesDetails>> {
    drain_paginated(|marker| {
        let client = client.clone();
        let db_instance_id = db_instance_id.to_string();
        async move {
            let resp = client
                .describe_db_log_files()
                .db_instance_identifier(&db_instance_id)
                .set_marker(marker)
                .send()
                .await
                .with_context(|| {
                    format!("Failed to list log files for instance {}", db_instance_id)
                })?;
            Ok((
                resp.describe_db_log_files().to_vec(),
                resp.marker().map(str::to_string),
            ))
        }
    })
    .await
}

/// Recognizes Aurora MySQL audit log names: the known exact names, plus
/// anything with the five-character prefix "audit".
pub fn is_audit_log(log_file_name: &str) -> bool {
    log_file_name == "audit.log"
        || log_file_name == "audit/server_audit.log"
        || log_file_name == "error/mysql-audit.log"
        || log_file_name.starts_with("audit")
}

/// Decides what to do with one observed (size, last_written) pair.
///
/// A new file is inserted without `last_backup`; a drifted file is updated
/// with the stored `last_backup` carried forward unchanged; an identical
/// observation is a no-op.
pub fn plan_catalog_action(
    db_instance_id: &str,
    log_file_name: &str,
    size: i64,
    last_written: i64,
    existing: Option<&LogFileRecord>,
) -> CatalogAction {
    match existing {
        None => CatalogAction::Insert(LogFileRecord {
            db_instance_id: db_instance_id.to_string(),
            log_file_name: log_file_name.to_string(),
            size,
            last_written,
            last_backup: None,
        }),
        Some(record) if record.size != size || record.last_written != last_written => {
            CatalogAction::Update(LogFileRecord {
                db_instance_id: db_instance_id.to_string(),
                log_file_name: log_file_name.to_string(),
                size,
                last_written,
                last_backup: record.last_backup,
            })
        }
        Some(_) => CatalogAction::Unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_log_predicate() {
        assert!(is_audit_log("audit.log"));
        assert!(is_audit_log("audit/server_audit.log"));
        assert!(is_audit_log("error/mysql-audit.log"));
        assert!(is_audit_log("auditXYZ"));
        assert!(!is_audit_log("random.log"));
        assert!(!is_audit_log("error/mysql-error.log"));
        assert!(!is_audit_log("audi"));
    }

    #[test]
    fn test_unseen_file_is_inserted_without_backup_stamp() {
        let action = plan_catalog_action("db1", "audit.log", 100, 1000, None);
        match action {
            CatalogAction::Insert(record) => {
                assert_eq!(record.db_instance_id, "db1");
                assert_eq!(record.log_file_name, "audit.log");
                assert_eq!(record.size, 100);
                assert_eq!(record.last_written, 1000);
                assert_eq!(record.last_backup, None);
            }
            other => panic!("expected insert, got {:?}", other),
        }
    }

    #[test]
    fn test_size_drift_updates_and_preserves_last_backup() {
        let existing = LogFileRecord {
            db_instance_id: "db1".to_string(),
            log_file_name: "audit.log".to_string(),
            size: 100,
            last_written: 1000,
            last_backup: Some(1700000000),
        };

        let action = plan_catalog_action("db1", "audit.log", 200, 1000, Some(&existing));
        match action {
            CatalogAction::Update(record) => {
                assert_eq!(record.size, 200);
                assert_eq!(record.last_backup, Some(1700000000));
            }
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[test]
    fn test_last_written_drift_alone_updates() {
        let existing = LogFileRecord {
            db_instance_id: "db1".to_string(),
            log_file_name: "audit.log".to_string(),
            size: 100,
            last_written: 1000,
            last_backup: None,
        };

        let action = plan_catalog_action("db1", "audit.log", 100, 2000, Some(&existing));
        assert!(matches!(action, CatalogAction::Update(_)));
    }

    #[test]
    fn test_identical_observation_is_a_no_op() {
        let existing = LogFileRecord {
            db_instance_id: "db1".to_string(),
            log_file_name: "audit.log".to_string(),
            size: 100,
            last_written: 1000,
            last_backup: Some(1700000000),
        };

        let action = plan_catalog_action("db1", "audit.log", 100, 1000, Some(&existing));
        assert_eq!(action, CatalogAction::Unchanged);
    }
}
