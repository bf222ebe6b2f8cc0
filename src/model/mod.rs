pub mod action;
pub mod logic;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One denormalized row: a dialog node joined with its zone, actor and one
/// of the graph edges touching it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectItem {
    #[serde(rename = "ProjectID", default)]
    pub project_id: Uuid,
    #[serde(rename = "ActorID")]
    pub actor_id: Uuid,
    #[serde(rename = "ZoneID")]
    pub zone_id: Uuid,
    #[serde(rename = "DialogID")]
    pub dialog_id: Uuid,
    #[serde(rename = "DialogEntry", default)]
    pub dialog_entry: Option<Vec<String>>,
    #[serde(rename = "AlwaysExec", default)]
    pub always_exec: Value,
    #[serde(rename = "Statements", default)]
    pub statements: Option<Value>,
    #[serde(rename = "IsRoot", default)]
    pub is_root: bool,
    #[serde(rename = "UnknownHandler", default)]
    pub unknown_handler: bool,
    #[serde(rename = "ParentDialogID", default)]
    pub parent_dialog_id: Option<Uuid>,
    #[serde(rename = "ChildDialogID", default)]
    pub child_dialog_id: Option<Uuid>,
}

/// A zone trigger with its own logic block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectTriggerItem {
    #[serde(rename = "ProjectID", default)]
    pub project_id: Uuid,
    #[serde(rename = "TriggerID")]
    pub trigger_id: Uuid,
    #[serde(rename = "ZoneID")]
    pub zone_id: Uuid,
    #[serde(rename = "TriggerType")]
    pub trigger_type: i64,
    #[serde(rename = "AlwaysExec", default)]
    pub always_exec: Value,
    #[serde(rename = "Statements", default)]
    pub statements: Option<Value>,
}

/// Editable project scalars read alongside the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    #[serde(rename = "ID")]
    pub id: Uuid,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "StartZoneID", default)]
    pub start_zone_id: Option<Uuid>,
}

/// A submitted, immutable snapshot of a project at one version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionedProject {
    #[serde(rename = "ProjectID")]
    pub project_id: Uuid,
    #[serde(rename = "Version")]
    pub version: i64,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Category", default)]
    pub category: Option<String>,
    #[serde(rename = "Tags", default)]
    pub tags: Option<Vec<String>>,
    #[serde(rename = "ProjectData", default)]
    pub project_data: Vec<ProjectItem>,
    #[serde(rename = "TriggerData", default)]
    pub trigger_data: Vec<ProjectTriggerItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStatus {
    NotPublished = 0,
    Publishing = 1,
    Published = 2,
    UnderReview = 3,
    Denied = 4,
    Problem = 5,
}

impl PublishStatus {
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PublishStatus::NotPublished),
            1 => Some(PublishStatus::Publishing),
            2 => Some(PublishStatus::Published),
            3 => Some(PublishStatus::UnderReview),
            4 => Some(PublishStatus::Denied),
            5 => Some(PublishStatus::Problem),
            _ => None,
        }
    }
}

/// Normalizes an entry phrase for matching: uppercase, punctuation other
/// than apostrophes removed, whitespace collapsed.
pub fn normalize_input(raw: &str) -> String {
    let filtered: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '\'')
        .collect();
    filtered
        .split_whitespace()
        .map(|word| word.to_uppercase())
        .collect::<Vec<_>>()
        .join(" ")
}
