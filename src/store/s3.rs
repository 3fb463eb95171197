use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;

use super::{BlobStore, ObjectMeta, StoredObject};
use crate::error::StoreError;

/// S3-backed implementation of [`BlobStore`].
///
/// Works against AWS S3 and S3-compatible services (MinIO, etc.). The
/// client is cheap to clone and safe to share between tasks.
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
}

impl S3BlobStore {
    /// Wrap an existing S3 client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Get the underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Check that `bucket` is reachable with a one-key listing.
    pub async fn probe(&self, bucket: &str) -> Result<(), StoreError> {
        self.client
            .list_objects_v2()
            .bucket(bucket)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| classify_error(e, bucket, ""))?;

        Ok(())
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_error(e, bucket, key))?;

        let content_type = resp.content_type().map(|s| s.to_string());

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .into_bytes();

        Ok(StoredObject {
            meta: ObjectMeta {
                size: data.len() as u64,
                content_type,
            },
            data,
        })
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| classify_error(e, bucket, key))?;

        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_error(e, bucket, key))?;

        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(bucket).max_keys(1000);

            if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
                request = request.prefix(prefix);
            }
            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let result = request
                .send()
                .await
                .map_err(|e| classify_error(e, bucket, prefix.unwrap_or("")))?;

            keys.extend(
                result
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(|k| k.to_string())),
            );

            if result.is_truncated() == Some(true) {
                continuation_token = result.next_continuation_token().map(|s| s.to_string());
                if continuation_token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        Ok(keys)
    }

    async fn stat(&self, bucket: &str, key: &str) -> Result<ObjectMeta, StoreError> {
        let head = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_error(e, bucket, key))?;

        Ok(ObjectMeta {
            size: head.content_length().unwrap_or(0).max(0) as u64,
            content_type: head.content_type().map(|s| s.to_string()),
        })
    }
}

/// Map an SDK error onto the store error taxonomy.
///
/// A missing bucket is reported on its own so callers never mistake it for a
/// missing key. HEAD responses carry no error body, so a bare 404 there still
/// reads as a missing object.
fn classify_error<E>(err: SdkError<E, HttpResponse>, bucket: &str, key: &str) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let location = format!("s3://{}/{}", bucket, key);

    if matches!(
        err,
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) | SdkError::ResponseError(_)
    ) {
        return StoreError::Connection(DisplayErrorContext(&err).to_string());
    }

    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err.code().map(|c| c.to_string());
    let message = DisplayErrorContext(&err).to_string();

    if code.as_deref() == Some("NoSuchBucket") || message.contains("bucket does not exist") {
        return StoreError::BucketNotFound(bucket.to_string());
    }

    match (status, code.as_deref()) {
        (_, Some("NoSuchKey" | "NotFound")) | (Some(404), _) => {
            StoreError::NotFound(location)
        }
        (_, Some("AccessDenied")) | (Some(403), _) => StoreError::AccessDenied(message),
        _ if message.contains("does not exist") || message.contains("NoSuchKey") => {
            StoreError::NotFound(location)
        }
        _ if message.contains("Access Denied") => StoreError::AccessDenied(message),
        _ => StoreError::S3(message),
    }
}

// =============================================================================
// Client Construction
// =============================================================================

/// Connection settings for [`create_s3_client`].
#[derive(Debug, Clone, Default)]
pub struct S3ClientOptions {
    /// Custom endpoint for S3-compatible services, with or without scheme
    pub endpoint: Option<String>,

    /// AWS region
    pub region: String,

    /// Static access key; the default provider chain is used when unset
    pub access_key: Option<String>,

    /// Static secret key
    pub secret_key: Option<String>,

    /// Scheme used for endpoints given without one
    pub use_ssl: bool,
}

/// Normalize a user-supplied endpoint into a URL the SDK accepts.
///
/// `kvm.local:9000` becomes `http://kvm.local:9000` (or `https://` when
/// `use_ssl` is set). An explicit scheme is kept. Any path is dropped.
pub fn normalize_endpoint(raw: &str, use_ssl: bool) -> String {
    let raw = raw.trim();
    let (scheme, rest) = if let Some(rest) = raw.strip_prefix("https://") {
        ("https", rest)
    } else if let Some(rest) = raw.strip_prefix("http://") {
        ("http", rest)
    } else if use_ssl {
        ("https", raw)
    } else {
        ("http", raw)
    };

    let host = rest.split('/').next().unwrap_or(rest);
    format!("{}://{}", scheme, host)
}

/// Create an S3 client.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let options = S3ClientOptions {
///     endpoint: Some("localhost:9000".to_string()),
///     region: "us-east-1".to_string(),
///     access_key: Some("minioadmin".to_string()),
///     secret_key: Some("minioadmin".to_string()),
///     use_ssl: false,
/// };
/// let client = create_s3_client(&options).await;
/// ```
pub async fn create_s3_client(options: &S3ClientOptions) -> Client {
    let region = aws_config::Region::new(options.region.clone());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    let endpoint = options
        .endpoint
        .as_deref()
        .map(|e| normalize_endpoint(e, options.use_ssl));

    if let Some(ref endpoint) = endpoint {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    if let (Some(access_key), Some(secret_key)) = (&options.access_key, &options.secret_key) {
        config_loader = config_loader.credentials_provider(Credentials::new(
            access_key,
            secret_key,
            None,
            None,
            "object-relay-static",
        ));
    }

    let sdk_config = config_loader.load().await;

    // S3-compatible services generally need path-style addressing
    let s3_config = if endpoint.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
