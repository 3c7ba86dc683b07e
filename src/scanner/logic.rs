// auditlogtool/src/scanner/logic.rs
use anyhow::{Context, Result};
use aws_sdk_rds::types::DbInstance;

use crate::config::{AppConfig, ScanConfig, load_aws_config};
use crate::utils::drain_paginated;

/// Engine strings that identify an audited Aurora MySQL instance.
const AUDITED_ENGINES: [&str; 2] = ["aurora-mysql", "aurora"];

/// Main scan flow: list every DB instance in the region, keep the Aurora
/// MySQL ones, and publish each identifier to the work queue.
pub async fn perform_scan_orchestration(
    app_config: &AppConfig,
    scan_config: &ScanConfig,
) -> Result<()> {
    let sdk_config = load_aws_config(&app_config.raw_json_config).await;
    let rds_client = aws_sdk_rds::Client::new(&sdk_config);
    let sqs_client = aws_sdk_sqs::Client::new(&sdk_config);

    let instances = get_db_instances(&rds_client).await?;
    println!("Found {} DB instances total", instances.len());

    let instance_ids = filter_audited_instances(&instances);
    println!("Found {} Aurora MySQL instances", instance_ids.len());

    let mut published = 0usize;
    for instance_id in &instance_ids {
        match send_to_queue(&sqs_client, &scan_config.queue_url, instance_id).await {
            Ok(_) => {
                println!("Queued instance {} for log file detection", instance_id);
                published += 1;
            }
            Err(e) => {
                // One bad publish must not starve the remaining instances.
                eprintln!("❌ Failed to queue instance {}: {:?}", instance_id, e);
            }
        }
    }

    println!(
        "✅ Scan complete: {} instances found, {} published to {}",
        instance_ids.len(),
        published,
        scan_config.queue_url
    );
    Ok(())
}

/// Lists all DB instances in the current region, following pagination
/// markers to exhaustion.
async fn get_db_instances(client: &aws_sdk_rds::Client) -> Result<Vec<DbInstance>> {
    drain_paginated(|marker| {
        let client = client.clone();
        async move {
            let resp = client
                .describe_db_instances()
                .set_marker(marker)
                .send()
                .await
                .context("Failed to describe DB instances")?;
            Ok((
                resp.db_instances().to_vec(),
                resp.marker().map(str::to_string),
            ))
        }
    })
    .await
}

/// Keeps the identifiers of instances whose engine is in the audited family.
/// Instances missing an engine or identifier are ignored.
pub fn filter_audited_instances(instances: &[DbInstance]) -> Vec<String> {
    instances
        .iter()
        .filter(|instance| instance.engine().is_some_and(is_audited_engine))
        .filter_map(|instance| instance.db_instance_identifier().map(str::to_string))
        .collect()
}

fn is_audited_engine(engine: &str) -> bool {
    AUDITED_ENGINES.contains(&engine)
}

/// Publishes one instance identifier as a work item.
async fn send_to_queue(
    client: &aws_sdk_sqs::Client,
    queue_url: &str,
    instance_id: &str,
) -> Result<()> {
    client
        .send_message()
        .queue_url(queue_url)
        .message_body(instance_id)
        .send()
        .await
        .with_context(|| format!("Failed to send instance {} to work queue", instance_id))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(id: &str, engine: &str) -> DbInstance {
        DbInstance::builder()
            .db_instance_identifier(id)
            .engine(engine)
            .build()
    }

    #[test]
    fn test_filter_keeps_only_aurora_mysql_engines() {
        let instances = vec![
            instance("db1", "aurora-mysql"),
            instance("db2", "postgres"),
            instance("db3", "aurora"),
            instance("db4", "mysql"),
        ];

        let ids = filter_audited_instances(&instances);
        assert_eq!(ids, vec!["db1".to_string(), "db3".to_string()]);
    }

    #[test]
    fn test_filter_skips_instances_missing_fields() {
        let instances = vec![
            DbInstance::builder().db_instance_identifier("no-engine").build(),
            DbInstance::builder().engine("aurora-mysql").build(),
        ];
        assert!(filter_audited_instances(&instances).is_empty());
    }

    #[test]
    fn test_engine_match_is_exact() {
        assert!(is_audited_engine("aurora-mysql"));
        assert!(is_audited_engine("aurora"));
        assert!(!is_audited_engine("aurora-postgresql"));
        assert!(!is_audited_engine("Aurora-MySQL"));
    }
}
