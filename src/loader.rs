//! Sources of project rows. The relational store itself lives elsewhere;
//! the compiler only needs a submitted snapshot and the project scalars.

use crate::model::{Project, VersionedProject};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[async_trait]
pub trait ProjectSource: Send + Sync {
    async fn load_versioned(&self, project_id: Uuid, version: i64) -> Result<VersionedProject>;
    async fn load_project(&self, project_id: Uuid) -> Result<Project>;
}

/// Reads a JSON or YAML document, picked by extension.
pub fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document from {}", path.display()))?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(&content)
            .with_context(|| format!("Failed to deserialize JSON content from {}", path.display())),
        _ => serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to deserialize YAML content from {}", path.display())),
    }
}

/// Snapshots laid out as `<root>/<project-id>/project.{json,yaml}` and
/// `<root>/<project-id>/<version>.{json,yaml}`.
pub struct FileProjectSource {
    root: PathBuf,
}

impl FileProjectSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn find(&self, project_id: Uuid, stem: &str) -> Result<PathBuf> {
        let dir = self.root.join(project_id.to_string());
        ["json", "yaml", "yml"]
            .iter()
            .map(|ext| dir.join(format!("{}.{}", stem, ext)))
            .find(|path| path.is_file())
            .ok_or_else(|| anyhow!("No {} document for project {} under {}", stem, project_id, dir.display()))
    }
}

#[async_trait]
impl ProjectSource for FileProjectSource {
    async fn load_versioned(&self, project_id: Uuid, version: i64) -> Result<VersionedProject> {
        let path = self.find(project_id, &version.to_string())?;
        let snapshot: VersionedProject = tokio::task::spawn_blocking(move || load_document(&path)).await??;
        if snapshot.project_id != project_id || snapshot.version != version {
            return Err(anyhow!(
                "Snapshot holds project {} version {}, expected {} version {}",
                snapshot.project_id,
                snapshot.version,
                project_id,
                version
            ));
        }
        Ok(snapshot)
    }

    async fn load_project(&self, project_id: Uuid) -> Result<Project> {
        let path = self.find(project_id, "project")?;
        tokio::task::spawn_blocking(move || load_document(&path)).await?
    }
}

#[derive(Default)]
pub struct MemoryProjectSource {
    projects: DashMap<Uuid, Project>,
    versions: DashMap<(Uuid, i64), VersionedProject>,
}

impl MemoryProjectSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_project(&self, project: Project) {
        self.projects.insert(project.id, project);
    }

    pub fn insert_version(&self, snapshot: VersionedProject) {
        self.versions.insert((snapshot.project_id, snapshot.version), snapshot);
    }
}

#[async_trait]
impl ProjectSource for MemoryProjectSource {
    async fn load_versioned(&self, project_id: Uuid, version: i64) -> Result<VersionedProject> {
        self.versions
            .get(&(project_id, version))
            .map(|v| v.value().clone())
            .ok_or_else(|| anyhow!("Project {} has no version {}", project_id, version))
    }

    async fn load_project(&self, project_id: Uuid) -> Result<Project> {
        self.projects
            .get(&project_id)
            .map(|p| p.value().clone())
            .ok_or_else(|| anyhow!("Project {} not found", project_id))
    }
}
