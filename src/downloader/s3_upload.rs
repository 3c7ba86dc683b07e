// auditlogtool/src/downloader/s3_upload.rs
use anyhow::{Context, Result};
use aws_sdk_s3::primitives::ByteStream;

/// Uploads assembled log content to the archive bucket.
///
/// Keys are deterministic per log file, so overwriting an existing object is
/// safe and makes redundant downloads idempotent.
pub async fn upload_log_content(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    content: Vec<u8>,
) -> Result<()> {
    println!("Uploading {} bytes to s3://{}/{}", content.len(), bucket, key);

    client
        .put_object()
        .bucket(bucket)
        .key(key)
        .body(ByteStream::from(content))
        .content_type("text/plain")
        .send()
        .await
        .with_context(|| format!("Failed to upload log content to s3://{}/{}", bucket, key))?;

    println!("✅ Successfully uploaded to s3://{}/{}", bucket, key);
    Ok(())
}
