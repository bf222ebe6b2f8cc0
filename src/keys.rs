//! Sink key naming scheme shared with the player runtime.
//!
//! Every key a compile job writes is namespaced by its publish id, which is
//! the project id (or `demo:<project-id>` for preview compiles).

use std::fmt::Display;

/// Hash field registered for nodes that catch unrecognised input.
/// Input normalization strips underscores, so no user phrase can collide.
pub const UNKNOWN_INPUT_SENTINEL: &str = "__UNKNOWN__";

/// Entity kinds addressable under `compiled:<publish-id>:entities:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    DialogNode,
    ActionBundle,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::DialogNode => "DialogNode",
            EntityKind::ActionBundle => "ActionBundle",
        }
    }
}

pub fn publish_id(project_id: impl Display, is_demo: bool) -> String {
    if is_demo {
        format!("demo:{}", project_id)
    } else {
        project_id.to_string()
    }
}

pub fn compiled_entity(publish_id: &str, kind: EntityKind, id: impl Display) -> String {
    format!("compiled:{}:entities:{}:{}", publish_id, kind.as_str(), id)
}

pub fn compiled_dialog_node(publish_id: &str, node_id: impl Display) -> String {
    compiled_entity(publish_id, EntityKind::DialogNode, node_id)
}

pub fn compiled_action_bundle(publish_id: &str, owner_id: impl Display, sequence: u64) -> String {
    format!(
        "{}:{}",
        compiled_entity(publish_id, EntityKind::ActionBundle, owner_id),
        sequence
    )
}

pub fn dialog_root_within_actor(publish_id: &str, actor_id: impl Display) -> String {
    format!("compiled:{}:dialog-root:{}", publish_id, actor_id)
}

pub fn dialog_node_children(publish_id: &str, parent_id: impl Display) -> String {
    format!("compiled:{}:dialog-node:{}", publish_id, parent_id)
}

pub fn project_metadata(publish_id: &str) -> String {
    format!("compiled:{}:metadata", publish_id)
}

pub fn project_status(publish_id: &str) -> String {
    format!("{}:status", project_metadata(publish_id))
}

pub fn project_pubtime(publish_id: &str) -> String {
    format!("{}:pubtime", project_metadata(publish_id))
}

pub fn project_zones(publish_id: &str) -> String {
    format!("{}:all_zones", project_metadata(publish_id))
}

pub fn global_projects() -> String {
    "compiled:global:metadata:projects".to_string()
}

pub fn actors_within_zone(publish_id: &str, zone_id: impl Display) -> String {
    format!("compiled:{}:zone:{}:actors", publish_id, zone_id)
}

pub fn triggers_within_zone(publish_id: &str, zone_id: impl Display) -> String {
    format!("compiled:{}:zone:{}:triggers", publish_id, zone_id)
}

pub fn tracked_keys(publish_id: &str) -> String {
    format!("compiled:{}:keys", publish_id)
}

pub fn trained_roots(publish_id: &str, actor_id: impl Display) -> String {
    format!("compiled:{}:trained:{}", publish_id, actor_id)
}

pub fn trained_children(publish_id: &str, actor_id: impl Display, parent_id: impl Display) -> String {
    format!("compiled:{}:trained:{}:{}", publish_id, actor_id, parent_id)
}
