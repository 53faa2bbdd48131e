//! Service-account credential resolution.
//!
//! Credentials may arrive from four places, tried strictly in order and
//! never merged:
//!
//! 1. the explicit triplet (`project_id`, `client_email`, `private_key`);
//! 2. a base64-encoded service-account JSON blob;
//! 3. a raw service-account JSON string;
//! 4. a service-account key file on disk.
//!
//! A source that is unset, unparseable, or incomplete counts as absent and
//! resolution moves on to the next one.  Only when every source is absent
//! does [`resolve_credentials`] fail, with a message naming every accepted
//! configuration input.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::{
    CredentialsConfig, ENV_CLIENT_EMAIL, ENV_CREDENTIALS_FILE, ENV_PRIVATE_KEY, ENV_PROJECT_ID,
    ENV_SERVICE_ACCOUNT_BASE64, ENV_SERVICE_ACCOUNT_JSON,
};
use crate::errors::StorageError;

/// Token endpoint used when a key does not name one.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// A resolved service-account identity.
#[derive(Clone)]
pub struct Credentials {
    pub project_id: String,
    pub client_email: String,
    /// PEM block with real newlines.
    pub private_key: String,
    /// OAuth2 token endpoint for the JWT-bearer exchange.
    pub token_uri: String,
    /// Bucket named alongside the key, if any.
    pub bucket_name: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .field("bucket_name", &self.bucket_name)
            .finish()
    }
}

impl Credentials {
    /// Build credentials from raw parts, normalizing the key.
    ///
    /// Returns `None` unless all three identity fields are non-empty and the
    /// key is a PEM block.
    pub fn from_parts(project_id: &str, client_email: &str, private_key: &str) -> Option<Self> {
        let project_id = project_id.trim();
        let client_email = client_email.trim();
        let private_key = normalize_private_key(private_key);
        if project_id.is_empty() || client_email.is_empty() || !is_pem_block(&private_key) {
            return None;
        }
        Some(Self {
            project_id: project_id.to_string(),
            client_email: client_email.to_string(),
            private_key,
            token_uri: DEFAULT_TOKEN_URI.to_string(),
            bucket_name: None,
        })
    }

    /// The bucket used when nothing names one explicitly.
    pub fn default_bucket_name(&self) -> String {
        format!("{}.appspot.com", self.project_id)
    }
}

/// The subset of a service-account key file we read.
#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    #[serde(default)]
    project_id: String,
    #[serde(default)]
    client_email: String,
    #[serde(default)]
    private_key: String,
    #[serde(default)]
    token_uri: Option<String>,
    #[serde(default, alias = "storageBucket")]
    storage_bucket: Option<String>,
}

impl ServiceAccountKey {
    fn into_credentials(self) -> Option<Credentials> {
        let mut creds =
            Credentials::from_parts(&self.project_id, &self.client_email, &self.private_key)?;
        if let Some(uri) = self.token_uri.filter(|u| !u.trim().is_empty()) {
            creds.token_uri = uri;
        }
        creds.bucket_name = self.storage_bucket.filter(|b| !b.trim().is_empty());
        Some(creds)
    }
}

/// Strip wrapping quotes and turn literal `\n` sequences into newlines.
///
/// Keys pasted into environment files often arrive as `"-----BEGIN...\n..."`
/// with the quotes and escapes intact.  Every other character is preserved.
pub fn normalize_private_key(raw: &str) -> String {
    let trimmed = raw.trim();
    let unquoted = strip_wrapping_quotes(trimmed);
    unquoted.replace("\\r\\n", "\n").replace("\\n", "\n")
}

fn strip_wrapping_quotes(s: &str) -> &str {
    for quote in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

fn is_pem_block(key: &str) -> bool {
    let key = key.trim();
    key.starts_with("-----BEGIN ")
        && key.ends_with("-----")
        && key.contains("\n-----END ")
}

fn parse_service_account_json(json: &str) -> Option<Credentials> {
    match serde_json::from_str::<ServiceAccountKey>(json) {
        Ok(key) => key.into_credentials(),
        Err(e) => {
            debug!("service account JSON did not parse: {e}");
            None
        }
    }
}

/// One credential source: returns `Some` when it yields a complete identity.
type Resolver = fn(&CredentialsConfig) -> Option<Credentials>;

fn from_triplet(cfg: &CredentialsConfig) -> Option<Credentials> {
    if cfg.project_id.is_empty() || cfg.client_email.is_empty() || cfg.private_key.is_empty() {
        return None;
    }
    Credentials::from_parts(&cfg.project_id, &cfg.client_email, &cfg.private_key)
}

fn from_base64_blob(cfg: &CredentialsConfig) -> Option<Credentials> {
    let blob = cfg.service_account_base64.trim();
    if blob.is_empty() {
        return None;
    }
    let decoded = match BASE64_STANDARD.decode(blob) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("service account base64 blob did not decode: {e}");
            return None;
        }
    };
    let json = String::from_utf8(decoded).ok()?;
    parse_service_account_json(&json)
}

fn from_json_string(cfg: &CredentialsConfig) -> Option<Credentials> {
    let json = cfg.service_account_json.trim();
    if json.is_empty() {
        return None;
    }
    parse_service_account_json(json)
}

fn from_key_file(cfg: &CredentialsConfig) -> Option<Credentials> {
    let path = cfg.credentials_file.trim();
    if path.is_empty() {
        return None;
    }
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            debug!("credentials file {path} not readable: {e}");
            return None;
        }
    };
    parse_service_account_json(&contents)
}

/// Credential sources in precedence order.
const RESOLVERS: &[(&str, Resolver)] = &[
    ("explicit triplet", from_triplet),
    ("base64 service account", from_base64_blob),
    ("service account JSON", from_json_string),
    ("credentials file", from_key_file),
];

/// Configuration inputs an operator can set to supply credentials.
pub const ACCEPTED_SOURCES: &[&str] = &[
    ENV_PROJECT_ID,
    ENV_CLIENT_EMAIL,
    ENV_PRIVATE_KEY,
    ENV_SERVICE_ACCOUNT_BASE64,
    ENV_SERVICE_ACCOUNT_JSON,
    ENV_CREDENTIALS_FILE,
];

/// Resolve credentials from the first source that yields a complete identity.
pub fn resolve_credentials(cfg: &CredentialsConfig) -> Result<Credentials, StorageError> {
    for (name, resolve) in RESOLVERS {
        if let Some(creds) = resolve(cfg) {
            info!(
                "Storage credentials resolved from {} (project={})",
                name, creds.project_id
            );
            return Ok(creds);
        }
        debug!("credential source '{}' absent", name);
    }
    Err(StorageError::MissingCredentials {
        sources: ACCEPTED_SOURCES.to_vec(),
    })
}
