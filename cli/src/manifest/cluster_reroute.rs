use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ClusterClient, ManifestKind};
use crate::error::ClientError;

/// One `_cluster/reroute` command. Exactly one action key must be present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerouteCommand {
    Move(MoveShard),
    Cancel(CancelAllocation),
    AllocateReplica(AllocateReplica),
    AllocateStalePrimary(AllocatePrimary),
    AllocateEmptyPrimary(AllocatePrimary),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoveShard {
    pub index: String,
    pub shard: u32,
    pub from_node: String,
    pub to_node: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CancelAllocation {
    pub index: String,
    pub shard: u32,
    pub node: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_primary: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllocateReplica {
    pub index: String,
    pub shard: u32,
    pub node: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllocatePrimary {
    pub index: String,
    pub shard: u32,
    pub node: String,
    pub accept_data_loss: bool,
}

impl RerouteCommand {
    pub fn summary(&self) -> String {
        match self {
            RerouteCommand::Move(m) => format!(
                "move [{}][{}] {} -> {}",
                m.index, m.shard, m.from_node, m.to_node
            ),
            RerouteCommand::Cancel(c) => {
                format!("cancel [{}][{}] on {}", c.index, c.shard, c.node)
            }
            RerouteCommand::AllocateReplica(a) => {
                format!("allocate replica [{}][{}] on {}", a.index, a.shard, a.node)
            }
            RerouteCommand::AllocateStalePrimary(a) => {
                format!("allocate stale primary [{}][{}] on {}", a.index, a.shard, a.node)
            }
            RerouteCommand::AllocateEmptyPrimary(a) => {
                format!("allocate empty primary [{}][{}] on {}", a.index, a.shard, a.node)
            }
        }
    }
}

pub struct ClusterRerouteKind;

#[async_trait]
impl ManifestKind for ClusterRerouteKind {
    const KIND: &'static str = "ClusterReroute";
    type Resource = RerouteCommand;

    fn describe(&self, command: &Self::Resource) -> Vec<String> {
        vec![command.summary()]
    }

    async fn apply(
        &self,
        client: &dyn ClusterClient,
        command: Self::Resource,
    ) -> Result<(), ClientError> {
        client.cluster_reroute(&command).await?;
        info!(command = %command.summary(), "cluster reroute applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_each_action() {
        let cancel: RerouteCommand = serde_json::from_value(serde_json::json!({
            "cancel": {"index": "logs", "shard": 1, "node": "n1", "allow_primary": true}
        }))
        .expect("decode");
        assert_eq!(cancel.summary(), "cancel [logs][1] on n1");

        let empty: RerouteCommand = serde_json::from_value(serde_json::json!({
            "allocate_empty_primary": {"index": "logs", "shard": 2, "node": "n3", "accept_data_loss": true}
        }))
        .expect("decode");
        assert!(matches!(empty, RerouteCommand::AllocateEmptyPrimary(ref a) if a.accept_data_loss));
    }

    #[test]
    fn rejects_missing_or_extra_actions() {
        assert!(serde_json::from_value::<RerouteCommand>(serde_json::json!({})).is_err());
        assert!(serde_json::from_value::<RerouteCommand>(serde_json::json!({
            "move": {"index": "a", "shard": 0, "from_node": "n1", "to_node": "n2"},
            "cancel": {"index": "a", "shard": 0, "node": "n1"}
        }))
        .is_err());
        assert!(serde_json::from_value::<RerouteCommand>(serde_json::json!({
            "move": {"index": "a", "shard": 0, "from_node": "n1", "to_node": "n2", "force": true}
        }))
        .is_err());
    }

    #[test]
    fn serializes_as_single_keyed_object() {
        let command = RerouteCommand::AllocateReplica(AllocateReplica {
            index: "logs".into(),
            shard: 0,
            node: "n2".into(),
        });
        assert_eq!(
            serde_json::to_value(&command).expect("encode"),
            serde_json::json!({"allocate_replica": {"index": "logs", "shard": 0, "node": "n2"}})
        );
    }
}
