use async_trait::async_trait;
use percent_encoding::{percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, Url};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::manifest::cluster_reroute::RerouteCommand;
use crate::manifest::security_user::SecurityUser;
use crate::manifest::ClusterClient;

/// Characters left untouched inside a path segment (index patterns keep `*` and `,`).
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'*')
    .remove(b',');

#[derive(Debug, Clone)]
pub enum Auth {
    Basic {
        username: String,
        password: Option<String>,
    },
    ApiKey(String),
}

/// JSON-over-HTTP client for one cluster.
///
/// Requests go to the first node; connect and timeout failures fall through
/// to the next node in order. HTTP status errors are returned as-is.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    nodes: Vec<String>,
    auth: Option<Auth>,
}

impl Client {
    pub fn new(nodes: &[String], auth: Option<Auth>, timeout: Duration) -> Result<Self, ClientError> {
        if nodes.is_empty() {
            return Err(ClientError::NoNodes);
        }
        let mut normalized = Vec::with_capacity(nodes.len());
        for node in nodes {
            Url::parse(node).map_err(|e| ClientError::InvalidUrl {
                url: node.clone(),
                reason: e.to_string(),
            })?;
            normalized.push(node.trim_end_matches('/').to_string());
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ClientError::Build)?;
        Ok(Self {
            http,
            nodes: normalized,
            auth,
        })
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// Sends a request and returns the raw response body.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<String, ClientError> {
        let mut last_err = None;
        for node in &self.nodes {
            let url = format!("{}{}", node, path);
            let mut req = self.http.request(method.clone(), &url);
            req = match &self.auth {
                Some(Auth::Basic { username, password }) => req.basic_auth(username, password.as_ref()),
                Some(Auth::ApiKey(key)) => req.header(AUTHORIZATION, format!("ApiKey {}", key)),
                None => req,
            };
            if let Some(b) = body {
                req = req.json(b);
            }

            debug!(%method, %url, "sending request");
            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.map_err(|source| ClientError::Transport {
                        url: url.clone(),
                        source,
                    })?;
                    if !status.is_success() {
                        return Err(ClientError::Status {
                            method: method.to_string(),
                            path: path.to_string(),
                            status: status.as_u16(),
                            body: text,
                        });
                    }
                    return Ok(text);
                }
                Err(source) if source.is_connect() || source.is_timeout() => {
                    warn!(%url, error = %source, "node unreachable, trying next node");
                    last_err = Some(ClientError::Transport { url, source });
                }
                Err(source) => return Err(ClientError::Transport { url, source }),
            }
        }
        Err(last_err.unwrap_or(ClientError::NoNodes))
    }

    /// Sends a request and decodes the response as JSON. An empty body decodes to `{}`.
    pub async fn send_json(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, ClientError> {
        let text = self.send(method, path, body.as_ref()).await?;
        if text.trim().is_empty() {
            return Ok(serde_json::json!({}));
        }
        serde_json::from_str(&text).map_err(|source| ClientError::Decode {
            path: path.to_string(),
            source,
        })
    }
}

#[async_trait]
impl ClusterClient for Client {
    async fn put_security_user(&self, user: &SecurityUser) -> Result<(), ClientError> {
        let path = format!("/_security/user/{}", encode_segment(&user.username));
        let body = encode_body(&path, user)?;
        self.send_json(Method::PUT, &path, Some(body)).await?;
        Ok(())
    }

    async fn cluster_reroute(&self, command: &RerouteCommand) -> Result<(), ClientError> {
        let body = serde_json::json!({ "commands": [command] });
        self.send_json(Method::POST, "/_cluster/reroute", Some(body))
            .await?;
        Ok(())
    }
}

fn encode_body<T: Serialize>(path: &str, value: &T) -> Result<serde_json::Value, ClientError> {
    serde_json::to_value(value).map_err(|source| ClientError::Encode {
        path: path.to_string(),
        source,
    })
}

pub fn encode_segment(segment: &str) -> String {
    percent_encode(segment.as_bytes(), SEGMENT).to_string()
}

pub fn encode_query(value: &str) -> String {
    percent_encode(value.as_bytes(), NON_ALPHANUMERIC).to_string()
}
