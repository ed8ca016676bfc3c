//! On-disk artifact store: one pretty-printed JSON file per backup.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::fs;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::Dataset;

lazy_static! {
    static ref ARTIFACT_NAME: Regex = Regex::new(r"^backup-(\d{1,19})(?:-([0-9a-f]{8}))?\.json$")
        .expect("artifact name pattern is valid");
}

/// Serialized backup: `{timestamp, data: {customers, feedbacks, responses}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupArtifact {
    pub timestamp: DateTime<Utc>,
    pub data: Dataset,
}

/// A validated artifact file name.
///
/// New names are `backup-<unix millis>-<8 hex>.json`; the random suffix keeps
/// names unique when two backups land in the same millisecond. Names without
/// the suffix are accepted so older artifacts stay readable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactName {
    created_millis: u64,
    file_name: String,
}

impl ArtifactName {
    pub fn generate(timestamp: DateTime<Utc>) -> Self {
        let created_millis = u64::try_from(timestamp.timestamp_millis()).unwrap_or(0);
        let suffix = Uuid::new_v4().simple().to_string();
        Self {
            created_millis,
            file_name: format!("backup-{created_millis}-{}.json", &suffix[..8]),
        }
    }

    /// Returns `None` for anything that is not an artifact name, including
    /// names carrying path separators.
    pub fn parse(raw: &str) -> Option<Self> {
        let captures = ARTIFACT_NAME.captures(raw)?;
        let created_millis = captures.get(1)?.as_str().parse::<u64>().ok()?;
        Some(Self {
            created_millis,
            file_name: raw.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.file_name
    }

    pub fn created_millis(&self) -> u64 {
        self.created_millis
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name)
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persists an artifact under a fresh name.
    ///
    /// The bytes go to a hidden temporary file first and are published with a
    /// rename, so a failed write never leaves a partial file under an
    /// artifact name.
    pub async fn write(&self, artifact: &BackupArtifact) -> AppResult<ArtifactName> {
        const OPERATION: &str = "Backup failed";

        fs::create_dir_all(&self.root)
            .await
            .map_err(|err| AppError::io(OPERATION, err))?;

        let name = ArtifactName::generate(artifact.timestamp);
        let path = self.root.join(name.as_str());
        let tmp_path = self.root.join(format!(".{}.tmp", name.as_str()));

        let json = serde_json::to_vec_pretty(artifact)
            .map_err(|err| AppError::internal(format!("serialize backup: {err}")))?;

        if let Err(err) = fs::write(&tmp_path, json).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(AppError::io(OPERATION, err));
        }

        if let Err(err) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(AppError::io(OPERATION, err));
        }

        Ok(name)
    }

    /// Artifact names, oldest first. A missing directory has no artifacts.
    pub async fn list(&self) -> AppResult<Vec<ArtifactName>> {
        const OPERATION: &str = "Failed to list backups";

        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(AppError::io(OPERATION, err)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| AppError::io(OPERATION, err))?
        {
            if let Some(name) = entry.file_name().to_str().and_then(ArtifactName::parse) {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }

    pub async fn read(&self, raw_name: &str) -> AppResult<BackupArtifact> {
        let name = Self::resolve(raw_name)?;
        let bytes = match fs::read(self.root.join(name.as_str())).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(missing(raw_name)),
            Err(err) => return Err(AppError::io("Failed to read backup contents", err)),
        };

        serde_json::from_slice::<BackupArtifact>(&bytes).map_err(|err| AppError::corrupt(raw_name, err))
    }

    pub async fn delete(&self, raw_name: &str) -> AppResult<()> {
        let name = Self::resolve(raw_name)?;
        match fs::remove_file(self.root.join(name.as_str())).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(missing(raw_name)),
            Err(err) => Err(AppError::io("Failed to delete backup", err)),
        }
    }

    fn resolve(raw_name: &str) -> AppResult<ArtifactName> {
        ArtifactName::parse(raw_name).ok_or_else(|| missing(raw_name))
    }
}

fn missing(raw_name: &str) -> AppError {
    AppError::not_found(format!("Backup not found: {raw_name}"))
}
