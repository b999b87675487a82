use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{OrchestratorError, Result};
use crate::models::microservice::validate_name;
use crate::models::MicroserviceDefinition;
use crate::services::scaffold::{self, BUILD_DESCRIPTOR_FILE, ENTRY_POINT_FILE};

/// Filesystem registry of microservice definitions, one directory per name.
pub struct WorkspaceStore {
    root: PathBuf,
}

impl WorkspaceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn service_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn entry_point_path(&self, name: &str) -> PathBuf {
        self.service_path(name).join(ENTRY_POINT_FILE)
    }

    /// Write a new microservice directory. Returns the derived name.
    pub async fn create(&self, title: &str, description: &str, code: &str) -> Result<String> {
        let definition = MicroserviceDefinition::from_title(title, description, code)?;
        self.create_definition(&definition).await?;
        Ok(definition.name)
    }

    pub async fn create_definition(&self, definition: &MicroserviceDefinition) -> Result<PathBuf> {
        let name = &definition.name;
        validate_name(name)?;
        if self.exists(name).await? {
            return Err(OrchestratorError::AlreadyExists(name.clone()));
        }

        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.service_path(name);
        // create_dir (not _all) so a concurrent creator loses cleanly.
        match tokio::fs::create_dir(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(OrchestratorError::AlreadyExists(name.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = write_service_files(&path, definition).await {
            tokio::fs::remove_dir_all(&path).await.ok();
            return Err(e);
        }
        Ok(path)
    }

    /// Full text of the entry-point file.
    pub async fn read(&self, name: &str) -> Result<String> {
        validate_name(name).map_err(|_| OrchestratorError::NotFound(name.to_string()))?;
        match tokio::fs::read_to_string(self.entry_point_path(name)).await {
            Ok(code) => Ok(code),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(OrchestratorError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrite the entry-point verbatim. Running instances are left untouched.
    pub async fn update(&self, name: &str, code: &str) -> Result<()> {
        validate_name(name).map_err(|_| OrchestratorError::NotFound(name.to_string()))?;
        let path = self.entry_point_path(name);
        if !tokio::fs::try_exists(&path).await? {
            return Err(OrchestratorError::NotFound(name.to_string()));
        }
        tokio::fs::write(&path, code).await?;
        Ok(())
    }

    /// Remove the whole directory tree. Absent entries are not an error.
    pub async fn delete(&self, name: &str) -> Result<()> {
        if validate_name(name).is_err() {
            return Ok(());
        }
        match tokio::fs::remove_dir_all(self.service_path(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Names of all stored microservices, sorted for stable display.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Case-insensitive existence check against the stored names.
    pub async fn exists(&self, name: &str) -> Result<bool> {
        if tokio::fs::try_exists(self.service_path(name)).await? {
            return Ok(true);
        }
        let lowered = name.to_lowercase();
        Ok(self
            .list()
            .await?
            .iter()
            .any(|existing| existing.to_lowercase() == lowered))
    }

    /// Which generated files are present: (entry-point, build descriptor).
    pub async fn inspect(&self, name: &str) -> Result<(bool, bool)> {
        let dir = self.service_path(name);
        let entry_point = tokio::fs::try_exists(dir.join(ENTRY_POINT_FILE)).await?;
        let descriptor = tokio::fs::try_exists(dir.join(BUILD_DESCRIPTOR_FILE)).await?;
        Ok((entry_point, descriptor))
    }
}

async fn write_service_files(dir: &Path, definition: &MicroserviceDefinition) -> Result<()> {
    tokio::fs::write(
        dir.join(ENTRY_POINT_FILE),
        scaffold::entry_point(definition),
    )
    .await?;
    tokio::fs::write(
        dir.join(BUILD_DESCRIPTOR_FILE),
        scaffold::build_descriptor(&definition.name),
    )
    .await?;
    Ok(())
}
