//! Google Cloud Storage backend.
//!
//! Talks to a single GCS bucket through the GCS JSON API using `reqwest`.
//! Object keys map one-to-one onto GCS object names.
//!
//! Authentication uses the resolved service account directly: an RS256 JWT
//! assertion is signed with the account's private key and exchanged at the
//! account's token endpoint for an OAuth2 access token.  Tokens are cached
//! until shortly before they expire.
//!
//! Uploads are single-request multipart uploads (never resumable) that carry
//! the object's content type, cache directive, and MD5 hash.  GCS verifies
//! the hash on receipt and rejects the write if the bytes were corrupted in
//! transit.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use bytes::Bytes;
use futures::TryStreamExt;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use md5::{Digest, Md5};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::backend::{
    BackendFuture, ByteStream, ObjectMetadata, PutOptions, StorageBackend,
};
use crate::config::GcsConfig;
use crate::credentials::Credentials;

/// OAuth2 scope requested for storage access.
const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

/// Grant type for the JWT-bearer token exchange.
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for each signed assertion.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Tokens are refreshed this long before they expire.
const TOKEN_EXPIRY_MARGIN_SECS: u64 = 60;

/// Metadata fields requested on `head`.
const METADATA_FIELDS: &str = "contentType,cacheControl,size,updated,etag";

// -- GCS JSON API types --------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcsObject {
    content_type: Option<String>,
    cache_control: Option<String>,
    /// GCS reports sizes as decimal strings.
    size: Option<String>,
    updated: Option<String>,
    etag: Option<String>,
}

impl GcsObject {
    fn into_metadata(self) -> ObjectMetadata {
        let size = self
            .size
            .as_deref()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        ObjectMetadata::with_defaults(
            self.content_type,
            self.cache_control,
            size,
            self.updated,
            self.etag,
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResource<'a> {
    name: &'a str,
    content_type: &'a str,
    cache_control: &'a str,
    md5_hash: String,
}

#[derive(Debug, Deserialize)]
struct GcsErrorDetail {
    code: Option<u16>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GcsErrorResponse {
    error: Option<GcsErrorDetail>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

// -- Token management ---------------------------------------------------------

/// Cached access token with expiry.
struct CachedToken {
    access_token: String,
    expiry: Instant,
}

/// Bucket handle backed by Google Cloud Storage.
pub struct GcsBucket {
    /// HTTP client for GCS JSON API calls.
    client: reqwest::Client,
    /// The remote bucket name.
    bucket: String,
    /// JSON API base URL.
    api_base: String,
    /// Media upload base URL.
    upload_base: String,
    /// Service account used to mint access tokens.
    credentials: Credentials,
    /// Cached OAuth2 access token.
    token_cache: Mutex<Option<CachedToken>>,
}

/// Drop trailing slashes and collapse repeated slashes after the scheme, so
/// `https://host//upload/` becomes `https://host/upload`.
fn clean_base_url(raw: &str) -> String {
    let raw = raw.trim().trim_end_matches('/');
    let (scheme, rest) = match raw.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, raw),
    };
    let mut path = String::with_capacity(rest.len());
    for c in rest.chars() {
        if c == '/' && path.ends_with('/') {
            continue;
        }
        path.push(c);
    }
    match scheme {
        Some(scheme) => format!("{scheme}://{path}"),
        None => path,
    }
}

impl GcsBucket {
    /// Create a handle for `bucket` authenticated as `credentials`.
    ///
    /// No network traffic happens here; the first request (normally the
    /// facade's reachability probe) fetches a token.
    pub fn new(credentials: Credentials, bucket: String, gcs: &GcsConfig) -> anyhow::Result<Self> {
        // Reject an unusable key now rather than on the first request.
        EncodingKey::from_rsa_pem(credentials.private_key.as_bytes())
            .map_err(|e| anyhow::anyhow!("service account private key is not a valid RSA PEM: {e}"))?;

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;

        info!(
            "GCS bucket handle created: bucket={} project={} account={}",
            bucket, credentials.project_id, credentials.client_email
        );

        Ok(Self {
            client,
            bucket,
            api_base: clean_base_url(&gcs.api_base),
            upload_base: clean_base_url(&gcs.upload_base),
            credentials,
            token_cache: Mutex::new(None),
        })
    }

    /// The remote bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Compute the base64 MD5 digest GCS expects in `md5Hash`.
    fn compute_md5_base64(data: &[u8]) -> String {
        let mut hasher = Md5::new();
        hasher.update(data);
        BASE64_STANDARD.encode(hasher.finalize())
    }

    /// URL-encode a bucket or object name for use in API paths.
    fn url_encode_object_name(name: &str) -> String {
        percent_encoding::utf8_percent_encode(name, percent_encoding::NON_ALPHANUMERIC).to_string()
    }

    /// `.../storage/v1/b/{bucket}/o`
    fn objects_url(&self) -> String {
        format!(
            "{}/storage/v1/b/{}/o",
            self.api_base,
            Self::url_encode_object_name(&self.bucket)
        )
    }

    /// `.../storage/v1/b/{bucket}/o/{name}`
    fn object_url(&self, name: &str) -> String {
        format!("{}/{}", self.objects_url(), Self::url_encode_object_name(name))
    }

    /// `.../upload/storage/v1/b/{bucket}/o?uploadType=multipart`
    fn upload_url(&self) -> String {
        format!(
            "{}/storage/v1/b/{}/o?uploadType=multipart",
            self.upload_base,
            Self::url_encode_object_name(&self.bucket)
        )
    }

    /// Map a GCS HTTP error to an anyhow error with context.
    fn map_gcs_error(context: &str, status: StatusCode, body: &str) -> anyhow::Error {
        if let Ok(err_resp) = serde_json::from_str::<GcsErrorResponse>(body) {
            if let Some(err) = err_resp.error {
                return anyhow::anyhow!(
                    "GCS {}: {} (code {})",
                    context,
                    err.message.unwrap_or_default(),
                    err.code.unwrap_or(status.as_u16())
                );
            }
        }
        anyhow::anyhow!("GCS {context}: HTTP {status} - {body}")
    }

    /// Check if a GCS error response indicates "not found" (404).
    fn is_not_found(status: StatusCode) -> bool {
        status == StatusCode::NOT_FOUND
    }

    /// Build the single-request multipart/related upload body.
    ///
    /// Returns the body and the `Content-Type` header value carrying the
    /// boundary.
    fn build_multipart_body(
        name: &str,
        data: &[u8],
        options: &PutOptions,
        boundary: &str,
    ) -> anyhow::Result<(Vec<u8>, String)> {
        let resource = UploadResource {
            name,
            content_type: &options.content_type,
            cache_control: &options.cache_control,
            md5_hash: Self::compute_md5_base64(data),
        };
        let metadata = serde_json::to_vec(&resource)?;

        let mut body = Vec::with_capacity(data.len() + metadata.len() + 256);
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.extend_from_slice(&metadata);
        body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", options.content_type).as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Ok((body, format!("multipart/related; boundary={boundary}")))
    }

    /// Sign a JWT assertion for the token exchange.
    fn build_assertion(credentials: &Credentials, now: i64) -> anyhow::Result<String> {
        let claims = AssertionClaims {
            iss: credentials.client_email.clone(),
            scope: STORAGE_SCOPE.to_string(),
            aud: credentials.token_uri.clone(),
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let key = EncodingKey::from_rsa_pem(credentials.private_key.as_bytes())
            .map_err(|e| anyhow::anyhow!("Invalid service account private key: {e}"))?;
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| anyhow::anyhow!("Failed to sign token assertion: {e}"))
    }

    /// Get an OAuth2 access token, reusing the cached one while it is fresh.
    async fn get_access_token(&self) -> anyhow::Result<String> {
        {
            let cache = self.token_cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(ref cached) = *cache {
                if cached.expiry > Instant::now() {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let (token, expires_in) = self.fetch_access_token().await?;

        let expiry =
            Instant::now() + Duration::from_secs(expires_in.saturating_sub(TOKEN_EXPIRY_MARGIN_SECS));

        {
            let mut cache = self.token_cache.lock().unwrap_or_else(|e| e.into_inner());
            *cache = Some(CachedToken {
                access_token: token.clone(),
                expiry,
            });
        }

        Ok(token)
    }

    /// Exchange a freshly signed assertion for an access token.
    async fn fetch_access_token(&self) -> anyhow::Result<(String, u64)> {
        let assertion = Self::build_assertion(&self.credentials, chrono::Utc::now().timestamp())?;

        debug!("Requesting access token from {}", self.credentials.token_uri);
        let resp = self
            .client
            .post(&self.credentials.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Token request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Token exchange failed ({status}): {body}"));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Malformed token response: {e}"))?;
        Ok((token.access_token, token.expires_in.unwrap_or(3600)))
    }

    /// Build authorization headers for GCS API calls.
    async fn auth_headers(&self) -> anyhow::Result<HeaderMap> {
        let token = self.get_access_token().await?;
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| anyhow::anyhow!("Invalid auth header value: {e}"))?,
        );
        Ok(headers)
    }

    // -- GCS API operations ---------------------------------------------------

    /// List at most one object; proves the bucket exists and is readable.
    async fn gcs_probe(&self) -> anyhow::Result<()> {
        let auth = self.auth_headers().await?;
        let resp = self
            .client
            .get(self.objects_url())
            .headers(auth)
            .query(&[("maxResults", "1"), ("fields", "items(name)")])
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("GCS list request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::map_gcs_error("list", status, &body));
        }
        Ok(())
    }

    /// Upload an object with its metadata in one request.
    async fn gcs_upload(&self, name: &str, data: &[u8], options: &PutOptions) -> anyhow::Result<()> {
        let auth = self.auth_headers().await?;
        let boundary = format!("ricebox-{}", uuid::Uuid::new_v4().simple());
        let (body, content_type) = Self::build_multipart_body(name, data, options, &boundary)?;

        let resp = self
            .client
            .post(self.upload_url())
            .headers(auth)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("GCS upload request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::map_gcs_error("upload", status, &body));
        }
        Ok(())
    }

    /// Fetch object metadata. `None` on 404.
    async fn gcs_metadata(&self, name: &str) -> anyhow::Result<Option<ObjectMetadata>> {
        let auth = self.auth_headers().await?;
        let resp = self
            .client
            .get(self.object_url(name))
            .headers(auth)
            .query(&[("fields", METADATA_FIELDS)])
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("GCS metadata request failed: {e}"))?;

        let status = resp.status();
        if Self::is_not_found(status) {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::map_gcs_error("metadata", status, &body));
        }

        let object: GcsObject = resp
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Malformed GCS metadata response: {e}"))?;
        Ok(Some(object.into_metadata()))
    }

    /// Open a streaming download.
    async fn gcs_download(&self, name: &str) -> anyhow::Result<ByteStream> {
        let auth = self.auth_headers().await?;
        let resp = self
            .client
            .get(self.object_url(name))
            .headers(auth)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("GCS download request failed: {e}"))?;

        let status = resp.status();
        if !status.is_success() {
            if Self::is_not_found(status) {
                return Err(anyhow::anyhow!("Object not found at storage key: {name}"));
            }
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::map_gcs_error("download", status, &body));
        }

        let stream: ByteStream = Box::pin(resp.bytes_stream().map_err(std::io::Error::other));
        Ok(stream)
    }

    /// Delete an object. Idempotent (ignores 404).
    async fn gcs_delete(&self, name: &str) -> anyhow::Result<()> {
        let auth = self.auth_headers().await?;
        let resp = self
            .client
            .delete(self.object_url(name))
            .headers(auth)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("GCS delete request failed: {e}"))?;

        if !resp.status().is_success() && !Self::is_not_found(resp.status()) {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::map_gcs_error("delete", status, &body));
        }
        Ok(())
    }
}

impl StorageBackend for GcsBucket {
    fn probe(&self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            debug!("GCS probe: bucket={}", self.bucket);
            self.gcs_probe().await
        })
    }

    fn put(&self, key: &str, data: Bytes, options: PutOptions) -> BackendFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            debug!(
                "GCS put: bucket={} name={} size={} type={}",
                self.bucket,
                key,
                data.len(),
                options.content_type
            );
            self.gcs_upload(&key, &data, &options).await
        })
    }

    fn head(&self, key: &str) -> BackendFuture<'_, Option<ObjectMetadata>> {
        let key = key.to_string();
        Box::pin(async move {
            debug!("GCS head: bucket={} name={}", self.bucket, key);
            self.gcs_metadata(&key).await
        })
    }

    fn open(&self, key: &str) -> BackendFuture<'_, ByteStream> {
        let key = key.to_string();
        Box::pin(async move {
            debug!("GCS open: bucket={} name={}", self.bucket, key);
            self.gcs_download(&key).await
        })
    }

    fn delete(&self, key: &str) -> BackendFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            debug!("GCS delete: bucket={} name={}", self.bucket, key);
            self.gcs_delete(&key).await
        })
    }
}

// -- Tests -------------------------------------------------------------------
