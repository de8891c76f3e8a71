//! S3 transport.
//!
//! Fetches `s3://bucket/key` objects through the AWS SDK. S3 cannot hand
//! back a plain byte stream with HTTP semantics, so the object is
//! downloaded to a temp file, re-exposed as an in-memory buffer, and the
//! temp file is removed before returning on both success and failure
//! paths (the `NamedTempFile` guard deletes on drop).
//!
//! Status mapping: upstream HTTP code when the service answered, 504 when
//! the bucket/host is unreachable, 500 on local I/O faults.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use url::Url;

use super::{Response, Transport};
use crate::error::ButlerError;

pub struct S3Transport {
    client: Client,
}

impl S3Transport {
    pub async fn new(region: &str) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        Self {
            client: Client::new(&sdk_config),
        }
    }
}

#[async_trait]
impl Transport for S3Transport {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn get(&self, url: &str) -> Result<Response, ButlerError> {
        let parsed = Url::parse(url).map_err(|e| ButlerError::UrlParse {
            url: url.to_string(),
            source: e,
        })?;
        let bucket = parsed.host_str().unwrap_or_default().to_string();
        let key = parsed.path().trim_start_matches('/').to_string();

        let local_fault = |detail: String| ButlerError::Transport {
            url: url.to_string(),
            status: 500,
            detail,
        };

        let tmp = tempfile::NamedTempFile::new()
            .map_err(|e| local_fault(format!("could not create temp file: {e}")))?;

        tracing::debug!(bucket = %bucket, key = %key, "downloading s3 object");

        let output = self
            .client
            .get_object()
            .bucket(&bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                use aws_sdk_s3::error::SdkError;
                let status = match &e {
                    SdkError::ServiceError(se) => se.raw().status().as_u16(),
                    // The request never reached the service; gateway
                    // timeout is the closest HTTP analogue.
                    SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => 504,
                    _ => 500,
                };
                ButlerError::Transport {
                    url: url.to_string(),
                    status,
                    detail: e.to_string(),
                }
            })?;

        let reader = output.body.into_async_read();
        tokio::pin!(reader);
        let mut writer = tokio::fs::File::create(tmp.path())
            .await
            .map_err(|e| local_fault(format!("could not open temp file: {e}")))?;
        tokio::io::copy(&mut reader, &mut writer)
            .await
            .map_err(|e| local_fault(format!("could not spool object: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| local_fault(format!("could not flush temp file: {e}")))?;
        drop(writer);

        let data = tokio::fs::read(tmp.path())
            .await
            .map_err(|e| local_fault(format!("could not read temp file back: {e}")))?;

        Ok(Response::buffered(200, Bytes::from(data)))
    }
}
