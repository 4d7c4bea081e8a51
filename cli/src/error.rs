use thiserror::Error;

/// Failures raised by the cluster HTTP client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no cluster nodes configured")]
    NoNodes,

    #[error("invalid node url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("Request failed: {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {path} failed: status={status} body={body}")]
    Status {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    #[error("failed to encode request body for {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures raised while decoding and applying a manifest.
///
/// Client failures pass through untouched so callers can match on the
/// underlying [`ClientError`].
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("malformed manifest: {0}")]
    EnvelopeParse(#[source] serde_json::Error),

    #[error("unsupported manifest kind `{0}`")]
    UnsupportedKind(String),

    #[error("{kind} body does not match its schema: {source}")]
    Schema {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl ApplyError {
    /// True when the manifest was rejected before any cluster call was made.
    pub fn is_rejected_manifest(&self) -> bool {
        !matches!(self, ApplyError::Client(_))
    }
}
