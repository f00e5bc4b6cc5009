//! Project and profile persistence.
//!
//! Two backends: an in-memory store for tests and embedding, and a JSON
//! document store (`projects/{id}.json`, `profiles/{user}.json`) used by
//! the binary. Both write whole records.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use reel_models::{Project, ProjectId, ProjectStatus, UserId, UserProfile};

use crate::error::{WorkerError, WorkerResult};

/// Project records.
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn get(&self, id: &ProjectId) -> WorkerResult<Option<Project>>;

    /// Overwrite the stored record.
    async fn save(&self, project: &Project) -> WorkerResult<()>;

    /// Atomically move a resting project to `Processing` and return it.
    ///
    /// Fails with [`WorkerError::AlreadyProcessing`] when another run owns
    /// the project.
    async fn begin_run(&self, id: &ProjectId) -> WorkerResult<Project>;
}

/// Owner profiles.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn get_profile(&self, user_id: &UserId) -> WorkerResult<Option<UserProfile>>;
}

fn start_processing(project: &mut Project) -> WorkerResult<()> {
    if project.status == ProjectStatus::Processing {
        return Err(WorkerError::AlreadyProcessing(project.id.clone()));
    }
    project.transition_to(ProjectStatus::Processing)?;
    Ok(())
}

/// In-memory repository.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    projects: Mutex<HashMap<ProjectId, Project>>,
    profiles: Mutex<HashMap<UserId, UserProfile>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_project(&self, project: Project) {
        self.lock_projects().insert(project.id.clone(), project);
    }

    pub fn insert_profile(&self, profile: UserProfile) {
        self.lock_profiles().insert(profile.user_id.clone(), profile);
    }

    /// Current stored copy of a project.
    pub fn project(&self, id: &ProjectId) -> Option<Project> {
        self.lock_projects().get(id).cloned()
    }

    fn lock_projects(&self) -> std::sync::MutexGuard<'_, HashMap<ProjectId, Project>> {
        self.projects.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_profiles(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, UserProfile>> {
        self.profiles.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ProjectRepository for InMemoryRepository {
    async fn get(&self, id: &ProjectId) -> WorkerResult<Option<Project>> {
        Ok(self.project(id))
    }

    async fn save(&self, project: &Project) -> WorkerResult<()> {
        self.insert_project(project.clone());
        Ok(())
    }

    async fn begin_run(&self, id: &ProjectId) -> WorkerResult<Project> {
        let mut projects = self.lock_projects();
        let project = projects
            .get_mut(id)
            .ok_or_else(|| WorkerError::NotFound(format!("project {}", id)))?;
        start_processing(project)?;
        Ok(project.clone())
    }
}

#[async_trait]
impl ProfileRepository for InMemoryRepository {
    async fn get_profile(&self, user_id: &UserId) -> WorkerResult<Option<UserProfile>> {
        Ok(self.lock_profiles().get(user_id).cloned())
    }
}

/// JSON document repository rooted at a directory.
///
/// `begin_run` is atomic within one process; concurrent workers on the same
/// directory are not coordinated.
#[derive(Debug)]
pub struct JsonFileRepository {
    root: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

fn checked_id(id: &str) -> WorkerResult<&str> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(id)
    } else {
        Err(WorkerError::repository(format!("invalid document id {:?}", id)))
    }
}

impl JsonFileRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn project_path(&self, id: &ProjectId) -> WorkerResult<PathBuf> {
        Ok(self
            .root
            .join("projects")
            .join(format!("{}.json", checked_id(id.as_str())?)))
    }

    fn profile_path(&self, user_id: &UserId) -> WorkerResult<PathBuf> {
        Ok(self
            .root
            .join("profiles")
            .join(format!("{}.json", checked_id(user_id.as_str())?)))
    }

    async fn read_doc<T: serde::de::DeserializeOwned>(path: &Path) -> WorkerResult<Option<T>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write through a sibling temp file so readers never see a torn record.
    async fn write_doc<T: serde::Serialize>(path: &Path, doc: &T) -> WorkerResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(doc)?).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), "Wrote document");
        Ok(())
    }

    pub async fn save_profile(&self, profile: &UserProfile) -> WorkerResult<()> {
        let path = self.profile_path(&profile.user_id)?;
        let _guard = self.write_lock.lock().await;
        Self::write_doc(&path, profile).await
    }
}

#[async_trait]
impl ProjectRepository for JsonFileRepository {
    async fn get(&self, id: &ProjectId) -> WorkerResult<Option<Project>> {
        Self::read_doc(&self.project_path(id)?).await
    }

    async fn save(&self, project: &Project) -> WorkerResult<()> {
        let path = self.project_path(&project.id)?;
        let _guard = self.write_lock.lock().await;
        Self::write_doc(&path, project).await
    }

    async fn begin_run(&self, id: &ProjectId) -> WorkerResult<Project> {
        let path = self.project_path(id)?;
        let _guard = self.write_lock.lock().await;
        let mut project: Project = Self::read_doc(&path)
            .await?
            .ok_or_else(|| WorkerError::NotFound(format!("project {}", id)))?;
        start_processing(&mut project)?;
        Self::write_doc(&path, &project).await?;
        Ok(project)
    }
}

#[async_trait]
impl ProfileRepository for JsonFileRepository {
    async fn get_profile(&self, user_id: &UserId) -> WorkerResult<Option<UserProfile>> {
        Self::read_doc(&self.profile_path(user_id)?).await
    }
}
