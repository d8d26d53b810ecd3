//! Target and recipient lookup
//!
//! The directory is owned by an external collaborator; the core only reads
//! it. [`StaticDirectory`] is a read-only implementation backed by a JSON
//! file or built in code.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::ConfigError;
use crate::data::{Target, TargetId, TargetRef};

/// Directory collaborator
#[async_trait]
pub trait Directory: Send + Sync {
    /// Resolve a target by id or IP address
    async fn resolve_target(&self, target_ref: &TargetRef) -> Result<Option<Target>, DirectoryError>;

    /// Email addresses subscribed to alerts for a target
    async fn recipients_of(&self, target_id: TargetId) -> Result<Vec<String>, DirectoryError>;

    /// All known targets, ordered by id
    async fn targets(&self) -> Result<Vec<Target>, DirectoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Directory unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone)]
struct Entry {
    target: Target,
    recipients: Vec<String>,
}

/// Fixed set of targets loaded at startup
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    by_id: HashMap<TargetId, Entry>,
    by_ip: HashMap<IpAddr, TargetId>,
}

/// On-disk layout of the directory file
#[derive(Debug, Deserialize)]
struct DirectoryFile {
    targets: Vec<TargetRecord>,
}

#[derive(Debug, Deserialize)]
struct TargetRecord {
    id: u64,
    ip_address: IpAddr,
    name: String,
    #[serde(default)]
    recipients: Vec<String>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a target with its recipients
    pub fn with_target(mut self, target: Target, recipients: Vec<String>) -> Self {
        self.insert(target, recipients);
        self
    }

    pub fn insert(&mut self, target: Target, recipients: Vec<String>) {
        if let Some(previous) = self.by_id.get(&target.id) {
            self.by_ip.remove(&previous.target.ip_address);
        }
        self.by_ip.insert(target.ip_address, target.id);
        self.by_id.insert(target.id, Entry { target, recipients });
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Parse a directory from JSON:
    ///
    /// ```json
    /// {"targets": [{"id": 1, "ip_address": "10.0.0.5", "name": "web-1",
    ///               "recipients": ["ops@example.com"]}]}
    /// ```
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let file: DirectoryFile =
            serde_json::from_str(json).map_err(|e| ConfigError::Directory(e.to_string()))?;

        let mut directory = Self::new();
        for record in file.targets {
            let id = TargetId(record.id);
            if directory.by_id.contains_key(&id) {
                return Err(ConfigError::Directory(format!("duplicate target id {}", id)));
            }
            if directory.by_ip.contains_key(&record.ip_address) {
                return Err(ConfigError::Directory(format!(
                    "duplicate target ip {}",
                    record.ip_address
                )));
            }
            directory.insert(
                Target::new(id, record.ip_address, record.name),
                record.recipients,
            );
        }
        Ok(directory)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Directory(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn resolve_target(&self, target_ref: &TargetRef) -> Result<Option<Target>, DirectoryError> {
        let id = match target_ref {
            TargetRef::Id(id) => Some(*id),
            TargetRef::Ip(ip) => self.by_ip.get(ip).copied(),
        };
        Ok(id
            .and_then(|id| self.by_id.get(&id))
            .map(|entry| entry.target.clone()))
    }

    async fn recipients_of(&self, target_id: TargetId) -> Result<Vec<String>, DirectoryError> {
        Ok(self
            .by_id
            .get(&target_id)
            .map(|entry| entry.recipients.clone())
            .unwrap_or_default())
    }

    async fn targets(&self) -> Result<Vec<Target>, DirectoryError> {
        let mut targets: Vec<Target> = self.by_id.values().map(|e| e.target.clone()).collect();
        targets.sort_by_key(|t| t.id);
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn directory() -> StaticDirectory {
        StaticDirectory::new()
            .with_target(
                Target::new(1, ip("10.0.0.1"), "web-1"),
                vec!["ops@example.com".to_string()],
            )
            .with_target(Target::new(2, ip("10.0.0.2"), "db-1"), vec![])
    }

    #[tokio::test]
    async fn test_resolve_by_id_and_ip() {
        let dir = directory();

        let by_id = dir.resolve_target(&TargetRef::Id(TargetId(2))).await.unwrap();
        assert_eq!(by_id.unwrap().name, "db-1");

        let by_ip = dir
            .resolve_target(&TargetRef::Ip(ip("10.0.0.1")))
            .await
            .unwrap();
        assert_eq!(by_ip.unwrap().id, TargetId(1));

        assert!(dir
            .resolve_target(&TargetRef::Ip(ip("10.9.9.9")))
            .await
            .unwrap()
            .is_none());
        assert!(dir
            .resolve_target(&TargetRef::Id(TargetId(42)))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_recipients() {
        let dir = directory();
        assert_eq!(
            dir.recipients_of(TargetId(1)).await.unwrap(),
            vec!["ops@example.com".to_string()]
        );
        assert!(dir.recipients_of(TargetId(2)).await.unwrap().is_empty());
        assert!(dir.recipients_of(TargetId(3)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_targets_sorted_by_id() {
        let dir = directory();
        let ids: Vec<u64> = dir.targets().await.unwrap().iter().map(|t| t.id.0).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_reinsert_moves_ip_index() {
        let mut dir = directory();
        dir.insert(Target::new(1, ip("10.0.0.9"), "web-1"), vec![]);

        assert!(dir
            .resolve_target(&TargetRef::Ip(ip("10.0.0.1")))
            .await
            .unwrap()
            .is_none());
        assert!(dir
            .resolve_target(&TargetRef::Ip(ip("10.0.0.9")))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"targets": [
                {{"id": 7, "ip_address": "192.168.10.20", "name": "edge", "recipients": ["a@example.com", "b@example.com"]}},
                {{"id": 8, "ip_address": "192.168.10.21", "name": "core"}}
            ]}}"#
        )
        .unwrap();

        let dir = StaticDirectory::from_file(file.path()).unwrap();
        assert_eq!(dir.len(), 2);
        assert_eq!(dir.recipients_of(TargetId(7)).await.unwrap().len(), 2);
        assert!(dir.recipients_of(TargetId(8)).await.unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let json = r#"{"targets": [
            {"id": 1, "ip_address": "10.0.0.1", "name": "a"},
            {"id": 1, "ip_address": "10.0.0.2", "name": "b"}
        ]}"#;
        assert!(matches!(
            StaticDirectory::from_json(json),
            Err(ConfigError::Directory(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(StaticDirectory::from_file("/nonexistent/hostwatch/targets.json").is_err());
    }
}
