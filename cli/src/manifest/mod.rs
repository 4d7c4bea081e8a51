//! Declarative `apply` for typed manifests.
//!
//! A manifest is a JSON envelope `{"kind": ..., "body": ...}`. The kind picks
//! a handler from the [`Registry`]; the handler decodes the body against its
//! schema and forwards the decoded resource to the cluster client.
//!
//! Adding a kind means implementing [`ManifestKind`] and registering it.

pub mod cluster_reroute;
pub mod security_user;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::value::RawValue;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{ApplyError, ClientError};
use cluster_reroute::{ClusterRerouteKind, RerouteCommand};
use security_user::{SecurityUser, SecurityUserKind};

/// Cluster operations the appliers need.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn put_security_user(&self, user: &SecurityUser) -> Result<(), ClientError>;
    async fn cluster_reroute(&self, command: &RerouteCommand) -> Result<(), ClientError>;
}

#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub kind: String,
    pub body: Box<RawValue>,
}

impl Envelope {
    pub fn parse(bytes: &[u8]) -> Result<Self, ApplyError> {
        serde_json::from_slice(bytes).map_err(ApplyError::EnvelopeParse)
    }
}

/// One resource kind: its identifier, its decoded shape and how to apply it.
#[async_trait]
pub trait ManifestKind: Send + Sync {
    const KIND: &'static str;

    type Resource: DeserializeOwned + Send + Sync;

    /// Human-readable lines describing what applying `resource` would do.
    fn describe(&self, resource: &Self::Resource) -> Vec<String>;

    async fn apply(
        &self,
        client: &dyn ClusterClient,
        resource: Self::Resource,
    ) -> Result<(), ClientError>;
}

/// Result of decoding a manifest without applying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub kind: &'static str,
    pub actions: Vec<String>,
}

#[async_trait]
trait KindHandler: Send + Sync {
    fn kind(&self) -> &'static str;
    fn plan(&self, body: &RawValue) -> Result<Plan, ApplyError>;
    async fn apply(&self, client: &dyn ClusterClient, body: &RawValue) -> Result<(), ApplyError>;
}

struct Handler<K>(K);

impl<K: ManifestKind> Handler<K> {
    fn decode(&self, body: &RawValue) -> Result<K::Resource, ApplyError> {
        serde_json::from_str(body.get()).map_err(|source| ApplyError::Schema {
            kind: K::KIND,
            source,
        })
    }
}

#[async_trait]
impl<K: ManifestKind> KindHandler for Handler<K> {
    fn kind(&self) -> &'static str {
        K::KIND
    }

    fn plan(&self, body: &RawValue) -> Result<Plan, ApplyError> {
        let resource = self.decode(body)?;
        Ok(Plan {
            kind: K::KIND,
            actions: self.0.describe(&resource),
        })
    }

    async fn apply(&self, client: &dyn ClusterClient, body: &RawValue) -> Result<(), ApplyError> {
        let resource = self.decode(body)?;
        self.0.apply(client, resource).await?;
        Ok(())
    }
}

pub struct Registry {
    kinds: HashMap<&'static str, Box<dyn KindHandler>>,
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(SecurityUserKind);
        registry.register(ClusterRerouteKind);
        registry
    }
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            kinds: HashMap::new(),
        }
    }

    pub fn register<K: ManifestKind + 'static>(&mut self, kind: K) {
        let handler: Box<dyn KindHandler> = Box::new(Handler(kind));
        self.kinds.insert(handler.kind(), handler);
    }

    /// Registered kind identifiers, sorted.
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.kinds.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    fn handler(&self, envelope: &Envelope) -> Result<&dyn KindHandler, ApplyError> {
        self.kinds
            .get(envelope.kind.as_str())
            .map(|h| h.as_ref())
            .ok_or_else(|| ApplyError::UnsupportedKind(envelope.kind.clone()))
    }

    /// Decodes a manifest without calling the cluster.
    pub fn plan(&self, bytes: &[u8]) -> Result<Plan, ApplyError> {
        let envelope = Envelope::parse(bytes)?;
        self.handler(&envelope)?.plan(&envelope.body)
    }

    pub async fn apply(&self, client: &dyn ClusterClient, bytes: &[u8]) -> Result<(), ApplyError> {
        let envelope = Envelope::parse(bytes)?;
        let handler = self.handler(&envelope)?;
        debug!(kind = handler.kind(), "applying manifest");
        handler.apply(client, &envelope.body).await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Call, RecordingClient};
    use super::*;

    #[tokio::test]
    async fn malformed_envelope_is_rejected_before_lookup() {
        let registry = Registry::default();
        let client = RecordingClient::default();

        for bytes in [
            &b"not json"[..],
            br#"{"body": []}"#,
            br#"{"kind": "SecurityUser"}"#,
            br#"{"kind": 7, "body": []}"#,
        ] {
            let err = registry.apply(&client, bytes).await.expect_err("must fail");
            assert!(matches!(err, ApplyError::EnvelopeParse(_)), "{err:?}");
        }
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_kind_never_reaches_an_applier() {
        let registry = Registry::default();
        let client = RecordingClient::default();

        let err = registry
            .apply(&client, br#"{"kind": "IndexTemplate", "body": {}}"#)
            .await
            .expect_err("must fail");

        assert!(matches!(err, ApplyError::UnsupportedKind(ref k) if k == "IndexTemplate"));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn schema_mismatch_names_the_kind() {
        let registry = Registry::default();
        let client = RecordingClient::default();

        let err = registry
            .apply(&client, br#"{"kind": "SecurityUser", "body": {"username": "a"}}"#)
            .await
            .expect_err("must fail");

        assert!(matches!(err, ApplyError::Schema { kind: "SecurityUser", .. }));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn security_user_batch_stops_at_first_failure() {
        let registry = Registry::default();
        let client = RecordingClient::rejecting(&["bob"]);
        let manifest = br#"{
            "kind": "SecurityUser",
            "body": [
                {"username": "alice", "password": "s3cret-pass", "roles": ["admin"]},
                {"username": "bob", "password": "x"},
                {"username": "carol", "password": "s3cret-pass"}
            ]
        }"#;

        let err = registry.apply(&client, manifest).await.expect_err("must fail");

        assert!(matches!(
            err,
            ApplyError::Client(ClientError::Status { status: 400, .. })
        ));
        assert_eq!(client.calls(), vec![Call::PutUser("alice".into())]);
    }

    #[tokio::test]
    async fn cluster_reroute_issues_one_call() {
        let registry = Registry::default();
        let client = RecordingClient::default();
        let manifest = br#"{
            "kind": "ClusterReroute",
            "body": {"move": {"index": "logs", "shard": 0, "from_node": "n1", "to_node": "n2"}}
        }"#;

        registry.apply(&client, manifest).await.expect("apply");

        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(
            &calls[0],
            Call::Reroute(RerouteCommand::Move(m)) if m.index == "logs" && m.to_node == "n2"
        ));
    }

    #[test]
    fn plan_decodes_without_calling_the_cluster() {
        let registry = Registry::default();
        let plan = registry
            .plan(br#"{"kind": "SecurityUser", "body": [{"username": "alice", "roles": ["viewer"]}]}"#)
            .expect("plan");

        assert_eq!(plan.kind, "SecurityUser");
        assert_eq!(plan.actions, vec!["upsert user alice (roles: viewer)".to_string()]);
    }

    struct NoopKind;

    #[async_trait]
    impl ManifestKind for NoopKind {
        const KIND: &'static str = "Noop";
        type Resource = serde_json::Value;

        fn describe(&self, _resource: &Self::Resource) -> Vec<String> {
            vec!["noop".into()]
        }

        async fn apply(
            &self,
            _client: &dyn ClusterClient,
            _resource: Self::Resource,
        ) -> Result<(), ClientError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn registering_a_kind_makes_it_dispatchable() {
        let mut registry = Registry::default();
        registry.register(NoopKind);
        assert_eq!(registry.kinds(), vec!["ClusterReroute", "Noop", "SecurityUser"]);

        let client = RecordingClient::default();
        registry
            .apply(&client, br#"{"kind": "Noop", "body": null}"#)
            .await
            .expect("apply");
        assert!(client.calls().is_empty());
    }
}
