// auditlogtool/src/catalog/mod.rs
use anyhow::{Context, Result};
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;

// Attribute names are the deployed table's schema; do not rename.
pub const ATTR_INSTANCE_ID: &str = "DBInstanceIdentifier";
pub const ATTR_LOG_FILE_NAME: &str = "LogFileName";
pub const ATTR_SIZE: &str = "Size";
pub const ATTR_LAST_WRITTEN: &str = "LastWritten";
pub const ATTR_LAST_BACKUP: &str = "LastBackup";

/// One catalog entry per (instance, log file) pair.
///
/// `(db_instance_id, log_file_name)` is the composite key. `last_backup` is
/// `None` until the file has been archived at least once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileRecord {
    pub db_instance_id: String,
    pub log_file_name: String,
    pub size: i64,
    pub last_written: i64,
    pub last_backup: Option<i64>,
}

/// Keyed access to the DynamoDB table tracking backup state per log file.
pub struct Catalog {
    client: Client,
    table_name: String,
}

impl Catalog {
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    /// Looks up a record by composite key. Returns `None` when the pair has
    /// never been cataloged.
    pub async fn get_record(
        &self,
        db_instance_id: &str,
        log_file_name: &str,
    ) -> Result<Option<LogFileRecord>> {
        let resp = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(ATTR_INSTANCE_ID, AttributeValue::S(db_instance_id.to_string()))
            .key(ATTR_LOG_FILE_NAME, AttributeValue::S(log_file_name.to_string()))
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to get catalog record for instance {} log file {}",
                    db_instance_id, log_file_name
                )
            })?;

        match resp.item() {
            Some(item) => Ok(Some(record_from_item(item).with_context(|| {
                format!(
                    "Malformed catalog item for instance {} log file {}",
                    db_instance_id, log_file_name
                )
            })?)),
            None => Ok(None),
        }
    }

    /// Inserts a freshly observed log file. Overwrite by key is safe: the
    /// detector only calls this when no record exists, and a concurrent
    /// writer would be storing the same observation.
    pub async fn insert_record(&self, record: &LogFileRecord) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(record_to_item(record)))
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to insert catalog record for instance {} log file {}",
                    record.db_instance_id, record.log_file_name
                )
            })?;
        Ok(())
    }

    /// Updates `Size`/`LastWritten` on an existing record, carrying
    /// `LastBackup` forward when the caller preserved one.
    pub async fn update_record(&self, record: &LogFileRecord) -> Result<()> {
        // "Size" is a DynamoDB reserved word, so every name goes through
        // expression attribute names.
        let mut update_expression =
            String::from("SET #size = :size, #lastWritten = :lastWritten");
        let mut request = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key(
                ATTR_INSTANCE_ID,
                AttributeValue::S(record.db_instance_id.clone()),
            )
            .key(
                ATTR_LOG_FILE_NAME,
                AttributeValue::S(record.log_file_name.clone()),
            )
            .expression_attribute_names("#size", ATTR_SIZE)
            .expression_attribute_names("#lastWritten", ATTR_LAST_WRITTEN)
            .expression_attribute_values(":size", AttributeValue::N(record.size.to_string()))
            .expression_attribute_values(
                ":lastWritten",
                AttributeValue::N(record.last_written.to_string()),
            );

        if let Some(last_backup) = record.last_backup {
            update_expression.push_str(", #lastBackup = :lastBackup");
            request = request
                .expression_attribute_names("#lastBackup", ATTR_LAST_BACKUP)
                .expression_attribute_values(
                    ":lastBackup",
                    AttributeValue::N(last_backup.to_string()),
                );
        }

        request
            .update_expression(update_expression)
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to update catalog record for instance {} log file {}",
                    record.db_instance_id, record.log_file_name
                )
            })?;
        Ok(())
    }

    /// Stamps `LastBackup` after a verified upload. Only the downloader calls
    /// this, and only after the object landed in S3.
    pub async fn mark_backed_up(
        &self,
        db_instance_id: &str,
        log_file_name: &str,
        backed_up_at: i64,
    ) -> Result<()> {
        self.client
            .update_item()
            .table_name(&self.table_name)
            .key(ATTR_INSTANCE_ID, AttributeValue::S(db_instance_id.to_string()))
            .key(ATTR_LOG_FILE_NAME, AttributeValue::S(log_file_name.to_string()))
            .update_expression("SET #lastBackup = :lastBackup")
            .expression_attribute_names("#lastBackup", ATTR_LAST_BACKUP)
            .expression_attribute_values(
                ":lastBackup",
                AttributeValue::N(backed_up_at.to_string()),
            )
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to stamp LastBackup for instance {} log file {}",
                    db_instance_id, log_file_name
                )
            })?;
        Ok(())
    }
}

/// Marshals a record into a DynamoDB item map. `LastBackup` is omitted when
/// the file has never been backed up.
pub fn record_to_item(record: &LogFileRecord) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::new();
    item.insert(
        ATTR_INSTANCE_ID.to_string(),
        AttributeValue::S(record.db_instance_id.clone()),
    );
    item.insert(
        ATTR_LOG_FILE_NAME.to_string(),
        AttributeValue::S(record.log_file_name.clone()),
    );
    item.insert(
        ATTR_SIZE.to_string(),
        AttributeValue::N(record.size.to_string()),
    );
    item.insert(
        ATTR_LAST_WRITTEN.to_string(),
        AttributeValue::N(record.last_written.to_string()),
    );
    if let Some(last_backup) = record.last_backup {
        item.insert(
            ATTR_LAST_BACKUP.to_string(),
            AttributeValue::N(last_backup.to_string()),
        );
    }
    item
}

/// Unmarshals a DynamoDB item into a record.
pub fn record_from_item(item: &HashMap<String, AttributeValue>) -> Result<LogFileRecord> {
    Ok(LogFileRecord {
        db_instance_id: string_attr(item, ATTR_INSTANCE_ID)?,
        log_file_name: string_attr(item, ATTR_LOG_FILE_NAME)?,
        size: numeric_attr(item, ATTR_SIZE)?,
        last_written: numeric_attr(item, ATTR_LAST_WRITTEN)?,
        last_backup: optional_numeric_attr(item, ATTR_LAST_BACKUP)?,
    })
}

fn string_attr(item: &HashMap<String, AttributeValue>, name: &str) -> Result<String> {
    match item.get(name) {
        Some(AttributeValue::S(value)) => Ok(value.clone()),
        Some(_) => Err(anyhow::anyhow!("Attribute {} is not a string", name)),
        None => Err(anyhow::anyhow!("Attribute {} is missing", name)),
    }
}

fn numeric_attr(item: &HashMap<String, AttributeValue>, name: &str) -> Result<i64> {
    optional_numeric_attr(item, name)?
        .ok_or_else(|| anyhow::anyhow!("Attribute {} is missing", name))
}

/// Reads a numeric attribute, tolerating writers that stored the value as a
/// string instead of a DynamoDB number.
fn optional_numeric_attr(
    item: &HashMap<String, AttributeValue>,
    name: &str,
) -> Result<Option<i64>> {
    let raw = match item.get(name) {
        Some(AttributeValue::N(raw)) => raw,
        Some(AttributeValue::S(raw)) => raw,
        Some(_) => return Err(anyhow::anyhow!("Attribute {} is not numeric", name)),
        None => return Ok(None),
    };
    let value = raw
        .trim()
        .parse::<i64>()
        .with_context(|| format!("Attribute {} is not a valid integer: {}", name, raw))?;
    Ok(Some(value))
}
