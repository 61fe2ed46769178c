//! Document store collaborators
//!
//! The bridge only needs to look documents up by uuid and to write an
//! application's lifecycle status. The in-memory stores back the service
//! when it runs without the CMS and are seeded from a JSON file of the form
//! `{"applications": [...], "users": [...]}`.

use crate::models::{ApplicationRecord, ApplicationStatus, UserRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Application documents by uuid
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn find_by_uuid(&self, uuid: &str) -> Result<Option<ApplicationRecord>>;

    /// Returns false if no application has this uuid
    async fn update_status(&self, uuid: &str, status: ApplicationStatus) -> Result<bool>;
}

/// User documents by uuid
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_uuid(&self, uuid: &str) -> Result<Option<UserRecord>>;
}

#[derive(Debug, Default, Deserialize)]
struct SeedFile {
    #[serde(default)]
    applications: Vec<ApplicationRecord>,
    #[serde(default)]
    users: Vec<UserRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryApplicationStore {
    records: Arc<RwLock<HashMap<String, ApplicationRecord>>>,
}

impl InMemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = ApplicationRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.uuid.clone(), record))
            .collect();
        Self {
            records: Arc::new(RwLock::new(records)),
        }
    }

    pub async fn insert(&self, record: ApplicationRecord) {
        self.records.write().await.insert(record.uuid.clone(), record);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ApplicationStore for InMemoryApplicationStore {
    async fn find_by_uuid(&self, uuid: &str) -> Result<Option<ApplicationRecord>> {
        Ok(self.records.read().await.get(uuid).cloned())
    }

    async fn update_status(&self, uuid: &str, status: ApplicationStatus) -> Result<bool> {
        let mut records = self.records.write().await;
        match records.get_mut(uuid) {
            Some(record) => {
                debug!(application = %uuid, from = %record.status, to = %status, "Updated status");
                record.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryUserStore {
    users: Arc<RwLock<HashMap<String, UserRecord>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = UserRecord>) -> Self {
        let users = users.into_iter().map(|user| (user.uuid.clone(), user)).collect();
        Self {
            users: Arc::new(RwLock::new(users)),
        }
    }

    pub async fn insert(&self, user: UserRecord) {
        self.users.write().await.insert(user.uuid.clone(), user);
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_uuid(&self, uuid: &str) -> Result<Option<UserRecord>> {
        Ok(self.users.read().await.get(uuid).cloned())
    }
}

/// Load both stores from a seed file
pub async fn load_seed(path: &Path) -> Result<(InMemoryApplicationStore, InMemoryUserStore)> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read documents from {}", path.display()))?;
    let seed: SeedFile = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid documents file {}", path.display()))?;

    info!(
        path = %path.display(),
        applications = seed.applications.len(),
        users = seed.users.len(),
        "Loaded document seed"
    );
    Ok((
        InMemoryApplicationStore::with_records(seed.applications),
        InMemoryUserStore::with_users(seed.users),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn record(uuid: &str) -> ApplicationRecord {
        ApplicationRecord {
            uuid: uuid.to_string(),
            title: "demo".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_update_status() {
        let store = InMemoryApplicationStore::with_records([record("a-1")]);

        assert!(store.update_status("a-1", ApplicationStatus::Valid).await.unwrap());
        assert!(!store.update_status("missing", ApplicationStatus::Valid).await.unwrap());

        let found = store.find_by_uuid("a-1").await.unwrap().unwrap();
        assert_eq!(found.status, ApplicationStatus::Valid);
    }

    #[tokio::test]
    async fn test_load_seed() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"applications": [{{"uuid": "a-1", "title": "Shop", "status": "running"}}],
                "users": [{{"uuid": "u-1", "username": "jane", "password": "x"}}]}}"#
        )
        .unwrap();

        let (apps, users) = load_seed(file.path()).await.unwrap();
        assert_eq!(apps.len().await, 1);
        let app = apps.find_by_uuid("a-1").await.unwrap().unwrap();
        assert_eq!(app.status, ApplicationStatus::Running);

        let user = users.find_by_uuid("u-1").await.unwrap().unwrap();
        assert_eq!(user.username.as_deref(), Some("jane"));
        assert!(user.other.contains_key("password"));
    }

    #[tokio::test]
    async fn test_load_seed_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_seed(&dir.path().join("nope.json")).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read documents"));
    }
}
