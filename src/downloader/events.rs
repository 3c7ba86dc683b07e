// auditlogtool/src/downloader/events.rs
//! Decoding of catalog change-feed records into typed change events.
//!
//! Stream images are dynamic attribute maps and numeric fields have been
//! observed in both number and string form, so decoding parses explicitly
//! and records a parse failure as `Malformed` instead of guessing. The
//! download decision treats a malformed value as "changed" so a bad write
//! can only cause a redundant re-download, never a missed one.

use anyhow::{Context, Result};
use aws_sdk_dynamodbstreams::types::{AttributeValue, OperationType, Record};
use std::collections::HashMap;

use crate::catalog::{ATTR_INSTANCE_ID, ATTR_LAST_BACKUP, ATTR_LAST_WRITTEN, ATTR_LOG_FILE_NAME, ATTR_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Modify,
    Other,
}

/// One numeric attribute as seen in a stream image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericField {
    Value(i64),
    Absent,
    Malformed,
}

/// The numeric attributes of one record image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFields {
    pub size: NumericField,
    pub last_written: NumericField,
    pub last_backup: NumericField,
}

/// A catalog mutation observed on the change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub db_instance_id: String,
    pub log_file_name: String,
    pub new_image: ImageFields,
    /// Present on MODIFY events; the image before the mutation.
    pub old_image: Option<ImageFields>,
}

pub fn change_kind(record: &Record) -> ChangeKind {
    match record.event_name() {
        Some(OperationType::Insert) => ChangeKind::Insert,
        Some(OperationType::Modify) => ChangeKind::Modify,
        _ => ChangeKind::Other,
    }
}

/// Decodes an INSERT or MODIFY stream record into a typed change event.
///
/// The composite key is taken from the key image; the numeric fields come
/// from the old/new images with explicit parsing.
pub fn decode_change_event(record: &Record) -> Result<ChangeEvent> {
    let kind = change_kind(record);
    let stream_record = record
        .dynamodb()
        .context("Stream record carries no DynamoDB payload")?;
    let keys = stream_record
        .keys()
        .context("Stream record carries no key image")?;

    let db_instance_id = key_string(keys, ATTR_INSTANCE_ID)?;
    let log_file_name = key_string(keys, ATTR_LOG_FILE_NAME)?;

    let new_image = stream_record
        .new_image()
        .map(decode_image)
        .context("Stream record carries no new image")?;
    let old_image = stream_record.old_image().map(decode_image);

    Ok(ChangeEvent {
        kind,
        db_instance_id,
        log_file_name,
        new_image,
        old_image,
    })
}

fn decode_image(image: &HashMap<String, AttributeValue>) -> ImageFields {
    ImageFields {
        size: numeric_field(image, ATTR_SIZE),
        last_written: numeric_field(image, ATTR_LAST_WRITTEN),
        last_backup: numeric_field(image, ATTR_LAST_BACKUP),
    }
}

fn key_string(keys: &HashMap<String, AttributeValue>, name: &str) -> Result<String> {
    match keys.get(name) {
        Some(AttributeValue::S(value)) => Ok(value.clone()),
        Some(_) => Err(anyhow::anyhow!("Key attribute {} is not a string", name)),
        None => Err(anyhow::anyhow!("Key attribute {} is missing", name)),
    }
}

/// Parses a numeric attribute from a stream image, accepting the DynamoDB
/// number form and the string form.
fn numeric_field(image: &HashMap<String, AttributeValue>, name: &str) -> NumericField {
    let raw = match image.get(name) {
        Some(AttributeValue::N(raw)) => raw,
        Some(AttributeValue::S(raw)) => raw,
        Some(_) => return NumericField::Malformed,
        None => return NumericField::Absent,
    };
    match raw.trim().parse::<i64>() {
        Ok(value) => NumericField::Value(value),
        Err(_) => NumericField::Malformed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodbstreams::types::StreamRecord;

    fn keys() -> StreamRecord {
        StreamRecord::builder()
            .keys(ATTR_INSTANCE_ID, AttributeValue::S("db1".to_string()))
            .keys(ATTR_LOG_FILE_NAME, AttributeValue::S("audit.log".to_string()))
            .build()
    }

    fn insert_record() -> Record {
        let stream_record = StreamRecord::builder()
            .keys(ATTR_INSTANCE_ID, AttributeValue::S("db1".to_string()))
            .keys(ATTR_LOG_FILE_NAME, AttributeValue::S("audit.log".to_string()))
            .new_image(ATTR_SIZE, AttributeValue::N("100".to_string()))
            .new_image(ATTR_LAST_WRITTEN, AttributeValue::N("1000".to_string()))
            .build();
        Record::builder()
            .event_name(OperationType::Insert)
            .dynamodb(stream_record)
            .build()
    }

    #[test]
    fn test_decode_insert_event() -> anyhow::Result<()> {
        let event = decode_change_event(&insert_record())?;
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.db_instance_id, "db1");
        assert_eq!(event.log_file_name, "audit.log");
        assert_eq!(event.new_image.size, NumericField::Value(100));
        assert_eq!(event.new_image.last_backup, NumericField::Absent);
        assert!(event.old_image.is_none());
        Ok(())
    }

    #[test]
    fn test_decode_modify_event_with_old_image() -> anyhow::Result<()> {
        let stream_record = StreamRecord::builder()
            .keys(ATTR_INSTANCE_ID, AttributeValue::S("db1".to_string()))
            .keys(ATTR_LOG_FILE_NAME, AttributeValue::S("audit.log".to_string()))
            .old_image(ATTR_SIZE, AttributeValue::N("100".to_string()))
            .old_image(ATTR_LAST_WRITTEN, AttributeValue::N("1000".to_string()))
            .new_image(ATTR_SIZE, AttributeValue::N("200".to_string()))
            .new_image(ATTR_LAST_WRITTEN, AttributeValue::N("2000".to_string()))
            .new_image(ATTR_LAST_BACKUP, AttributeValue::N("1700000000".to_string()))
            .build();
        let record = Record::builder()
            .event_name(OperationType::Modify)
            .dynamodb(stream_record)
            .build();

        let event = decode_change_event(&record)?;
        assert_eq!(event.kind, ChangeKind::Modify);
        let old_image = event.old_image.expect("modify should carry an old image");
        assert_eq!(old_image.size, NumericField::Value(100));
        assert_eq!(event.new_image.size, NumericField::Value(200));
        assert_eq!(event.new_image.last_backup, NumericField::Value(1700000000));
        Ok(())
    }

    #[test]
    fn test_string_numbers_parse() -> anyhow::Result<()> {
        let stream_record = StreamRecord::builder()
            .keys(ATTR_INSTANCE_ID, AttributeValue::S("db1".to_string()))
            .keys(ATTR_LOG_FILE_NAME, AttributeValue::S("audit.log".to_string()))
            .new_image(ATTR_SIZE, AttributeValue::S("300".to_string()))
            .build();
        let record = Record::builder()
            .event_name(OperationType::Insert)
            .dynamodb(stream_record)
            .build();

        let event = decode_change_event(&record)?;
        assert_eq!(event.new_image.size, NumericField::Value(300));
        Ok(())
    }

    #[test]
    fn test_unparseable_number_is_malformed_not_an_error() -> anyhow::Result<()> {
        let stream_record = StreamRecord::builder()
            .keys(ATTR_INSTANCE_ID, AttributeValue::S("db1".to_string()))
            .keys(ATTR_LOG_FILE_NAME, AttributeValue::S("audit.log".to_string()))
            .new_image(ATTR_SIZE, AttributeValue::S("garbage".to_string()))
            .build();
        let record = Record::builder()
            .event_name(OperationType::Insert)
            .dynamodb(stream_record)
            .build();

        let event = decode_change_event(&record)?;
        assert_eq!(event.new_image.size, NumericField::Malformed);
        Ok(())
    }

    #[test]
    fn test_remove_event_is_other() {
        let record = Record::builder()
            .event_name(OperationType::Remove)
            .dynamodb(keys())
            .build();
        assert_eq!(change_kind(&record), ChangeKind::Other);
    }

    #[test]
    fn test_missing_keys_is_an_error() {
        let stream_record = StreamRecord::builder()
            .new_image(ATTR_SIZE, AttributeValue::N("100".to_string()))
            .build();
        let record = Record::builder()
            .event_name(OperationType::Insert)
            .dynamodb(stream_record)
            .build();
        assert!(decode_change_event(&record).is_err());
    }
}
