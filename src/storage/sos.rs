// ABOUTME: S3-compatible object storage backend (Exoscale SOS).
// ABOUTME: Path-style addressing, SigV4 signing, streamed uploads with public-read ACL.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH};
use reqwest::{Client, Method, StatusCode, Url};
use tokio_util::io::ReaderStream;

use super::sigv4::{self, Credentials, RequestToSign, UNSIGNED_PAYLOAD};
use super::{ObjectBody, ObjectRef, ObjectStorage, StorageError};
use crate::types::DeleteStatus;

/// Largest object accepted by a single PUT.
pub const MAX_SINGLE_PUT: u64 = 5 * 1024 * 1024 * 1024;

/// Connection settings for [`SosStorage`].
#[derive(Debug, Clone)]
pub struct SosConfig {
    /// Base URL, e.g. `https://sos-ch-gva-2.exo.io`.
    pub endpoint: String,
    /// Signing region; the zone hosting the bucket.
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub timeout: Duration,
    pub user_agent: String,
}

/// Object storage reached over the S3 protocol.
pub struct SosStorage {
    http: Client,
    base: String,
    host: String,
    region: String,
    credentials: Credentials,
}

impl std::fmt::Debug for SosStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SosStorage")
            .field("base", &self.base)
            .field("region", &self.region)
            .finish()
    }
}

impl SosStorage {
    pub fn new(config: SosConfig) -> Result<Self, StorageError> {
        let url = Url::parse(&config.endpoint)
            .map_err(|e| StorageError::InvalidEndpoint(format!("{}: {e}", config.endpoint)))?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(StorageError::InvalidEndpoint(config.endpoint)),
        };

        let http = Client::builder()
            .user_agent(config.user_agent)
            .timeout(config.timeout)
            .build()
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base: config.endpoint.trim_end_matches('/').to_string(),
            host,
            region: config.region,
            credentials: Credentials {
                access_key: config.access_key,
                secret_key: config.secret_key,
            },
        })
    }

    /// Prepare a signed request for `object`.
    fn signed(
        &self,
        method: Method,
        object: &ObjectRef,
        extra: &[(&str, &str)],
    ) -> reqwest::RequestBuilder {
        let now = Utc::now();
        let path = sigv4::canonical_path(&object.bucket, &object.key);

        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), self.host.clone());
        headers.insert(
            "x-amz-content-sha256".to_string(),
            UNSIGNED_PAYLOAD.to_string(),
        );
        headers.insert("x-amz-date".to_string(), sigv4::amz_date(now));
        for (name, value) in extra {
            headers.insert(name.to_string(), value.to_string());
        }

        let authorization = sigv4::authorization(
            &self.credentials,
            &self.region,
            &RequestToSign {
                method: method.as_str(),
                path: &path,
                headers: &headers,
                payload_hash: UNSIGNED_PAYLOAD,
            },
            now,
        );

        // reqwest derives Host from the URL; it matches the signed value.
        let mut request = self
            .http
            .request(method, format!("{}{path}", self.base))
            .header(AUTHORIZATION, authorization);
        for (name, value) in headers.into_iter().filter(|(name, _)| name != "host") {
            request = request.header(name, value);
        }
        request
    }
}

#[async_trait]
impl ObjectStorage for SosStorage {
    fn locate(&self, bucket: &str, key: &str) -> ObjectRef {
        ObjectRef {
            bucket: bucket.to_string(),
            key: key.to_string(),
            url: format!("{}{}", self.base, sigv4::canonical_path(bucket, key)),
        }
    }

    async fn put(&self, object: &ObjectRef, body: ObjectBody) -> Result<(), StorageError> {
        let len = body.len();
        if len > MAX_SINGLE_PUT {
            return Err(StorageError::TooLarge {
                size: len,
                limit: MAX_SINGLE_PUT,
            });
        }

        tracing::debug!(object = %object, bytes = len, "uploading object");
        let stream = ReaderStream::new(body.into_reader());
        let response = self
            .signed(Method::PUT, object, &[("x-amz-acl", "public-read")])
            .header(CONTENT_LENGTH, len)
            .body(reqwest::Body::wrap_stream(stream))
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify(status, body))
    }

    async fn delete(&self, object: &ObjectRef) -> Result<DeleteStatus, StorageError> {
        tracing::debug!(object = %object, "deleting object");
        let response = self
            .signed(Method::DELETE, object, &[])
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(DeleteStatus::NotFound);
        }
        if status.is_success() {
            return Ok(DeleteStatus::Deleted);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify(status, body))
    }
}

fn classify(status: StatusCode, body: String) -> StorageError {
    let detail = format!("{status}: {}", body.trim());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StorageError::Unauthorized(detail),
        s if s.is_client_error() => StorageError::Rejected(detail),
        _ => StorageError::Transport(detail),
    }
}
