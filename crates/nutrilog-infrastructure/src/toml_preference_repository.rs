//! TOML-based PreferenceRepository implementation.
//!
//! Each user's learned preferences live in one TOML file under
//! `base_dir/preferences/<user_id>.toml`. The whole file is small (a
//! user's aliases and defaults), so every write rewrites it; a mutex
//! serializes the read-modify-write cycles of concurrent turns.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use nutrilog_core::error::{NutrilogError, Result};
use nutrilog_core::parser::ClarificationKind;
use nutrilog_core::preference::{
    Alias, ClarificationPreference, MeasurePreference, PreferenceRepository,
};

use crate::paths::{default_data_dir, sanitize_user_id};

/// On-disk shape of one user's preference file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PreferenceFile {
    #[serde(default)]
    aliases: Vec<Alias>,
    #[serde(default)]
    clarifications: Vec<ClarificationPreference>,
    #[serde(default)]
    measures: Vec<MeasurePreference>,
}

/// File-backed [`PreferenceRepository`].
pub struct TomlPreferenceRepository {
    base_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl TomlPreferenceRepository {
    /// Creates a repository rooted at `base_dir`, creating the
    /// preferences directory if needed.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(base_dir.join("preferences"))?;
        Ok(Self {
            base_dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Creates a repository at the default location (~/.nutrilog).
    pub fn default_location() -> Result<Self> {
        Self::new(default_data_dir()?)
    }

    fn user_file_path(&self, user_id: &str) -> PathBuf {
        self.base_dir
            .join("preferences")
            .join(format!("{}.toml", sanitize_user_id(user_id)))
    }

    async fn load(&self, user_id: &str) -> Result<PreferenceFile> {
        let path = self.user_file_path(user_id);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(PreferenceFile::default())
            }
            Err(err) => Err(NutrilogError::data_access(format!(
                "failed to read {}: {err}",
                path.display()
            ))),
        }
    }

    async fn store(&self, user_id: &str, file: &PreferenceFile) -> Result<()> {
        let path = self.user_file_path(user_id);
        let content = toml::to_string_pretty(file)?;
        fs::write(&path, content).await.map_err(|err| {
            NutrilogError::data_access(format!("failed to write {}: {err}", path.display()))
        })?;
        debug!(user_id, path = %path.display(), "preferences written");
        Ok(())
    }
}

#[async_trait]
impl PreferenceRepository for TomlPreferenceRepository {
    async fn find_alias(&self, user_id: &str, term: &str) -> Result<Option<Alias>> {
        let file = self.load(user_id).await?;
        Ok(file.aliases.into_iter().find(|a| a.term == term))
    }

    async fn list_aliases(&self, user_id: &str) -> Result<Vec<Alias>> {
        let file = self.load(user_id).await?;
        Ok(file.aliases.into_iter().filter(|a| a.active).collect())
    }

    async fn save_alias(&self, alias: &Alias) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load(&alias.user_id).await?;
        match file.aliases.iter_mut().find(|a| a.term == alias.term) {
            Some(existing) => *existing = alias.clone(),
            None => file.aliases.push(alias.clone()),
        }
        self.store(&alias.user_id, &file).await
    }

    async fn deactivate_alias(&self, user_id: &str, term: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load(user_id).await?;
        if let Some(alias) = file.aliases.iter_mut().find(|a| a.term == term) {
            alias.active = false;
            self.store(user_id, &file).await?;
        }
        Ok(())
    }

    async fn find_clarification(
        &self,
        user_id: &str,
        term: &str,
        kind: ClarificationKind,
    ) -> Result<Option<ClarificationPreference>> {
        let file = self.load(user_id).await?;
        Ok(file
            .clarifications
            .into_iter()
            .find(|p| p.term == term && p.kind == kind))
    }

    async fn list_clarifications(&self, user_id: &str) -> Result<Vec<ClarificationPreference>> {
        Ok(self.load(user_id).await?.clarifications)
    }

    async fn save_clarification(&self, preference: &ClarificationPreference) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load(&preference.user_id).await?;
        match file
            .clarifications
            .iter_mut()
            .find(|p| p.term == preference.term && p.kind == preference.kind)
        {
            Some(existing) => *existing = preference.clone(),
            None => file.clarifications.push(preference.clone()),
        }
        self.store(&preference.user_id, &file).await
    }

    async fn list_measure_preferences(&self, user_id: &str) -> Result<Vec<MeasurePreference>> {
        Ok(self.load(user_id).await?.measures)
    }

    async fn save_measure_preference(&self, preference: &MeasurePreference) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load(&preference.user_id).await?;
        match file
            .measures
            .iter_mut()
            .find(|p| p.food_pattern == preference.food_pattern)
        {
            Some(existing) => *existing = preference.clone(),
            None => file.measures.push(preference.clone()),
        }
        self.store(&preference.user_id, &file).await
    }
}
