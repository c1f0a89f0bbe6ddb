use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::CaseError;
use crate::models::Roster;

pub const CONFIG_ENV: &str = "CASE_FILES_CONFIG";
const APP_DIR: &str = "case-files";

/// Where the header row and data columns of a report sheet live (zero-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportLayout {
    pub header_row: usize,
    pub first_column: usize,
    pub last_column: usize,
}

impl Default for ReportLayout {
    fn default() -> Self {
        // B11:J11
        ReportLayout {
            header_row: 10,
            first_column: 1,
            last_column: 9,
        }
    }
}

/// Zero-based cell positions of the tracking table columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingColumns {
    pub date: usize,
    pub topic: usize,
    pub situation: usize,
    pub outcome: usize,
    pub tutor: usize,
}

impl Default for TrackingColumns {
    fn default() -> Self {
        TrackingColumns {
            date: 1,
            topic: 2,
            situation: 3,
            outcome: 4,
            tutor: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prefixes {
    pub tracking: String,
    pub interview: String,
    pub evidence: String,
}

impl Default for Prefixes {
    fn default() -> Self {
        Prefixes {
            tracking: "5_Seguimiento individual_".to_string(),
            interview: "3_Entrevista extendida_".to_string(),
            evidence: "6_Evidencias_".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Folder holding one `{ID}_{NAME}_{PROGRAM}` folder per student
    pub root_folder: Option<PathBuf>,
    pub template_folder: Option<PathBuf>,
    pub snapshot_path: Option<PathBuf>,
    pub tutors: Vec<String>,
    pub report_layout: ReportLayout,
    pub tracking_columns: TrackingColumns,
    pub font_size_pt: u32,
    pub prefixes: Prefixes,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            root_folder: None,
            template_folder: None,
            snapshot_path: None,
            tutors: Vec::new(),
            report_layout: ReportLayout::default(),
            tracking_columns: TrackingColumns::default(),
            font_size_pt: 10,
            prefixes: Prefixes::default(),
        }
    }
}

impl Config {
    /// Load config from a specific path; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("config {} is invalid JSON", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write config {}", path.display()))?;
        Ok(())
    }

    /// `$CASE_FILES_CONFIG`, else `<config dir>/case-files/config.json`
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.trim().is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
        let base = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine the user config directory"))?;
        Ok(base.join(APP_DIR).join("config.json"))
    }

    pub fn snapshot_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.snapshot_path {
            return Ok(path.clone());
        }
        let base = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine the user data directory"))?;
        Ok(base.join(APP_DIR).join("roster.snapshot"))
    }

    pub fn root_folder(&self) -> Result<&Path> {
        self.root_folder.as_deref().ok_or_else(|| {
            CaseError::MissingSource(
                "root folder is not configured; run `case-files config set-root <DIR>` or `provision --root <DIR>`"
                    .to_string(),
            )
            .into()
        })
    }

    /// Resolves a tutor name against the configured list, case-insensitively.
    /// With an empty list every non-blank name is accepted.
    pub fn resolve_tutor(&self, name: &str) -> Result<String> {
        let wanted = name.trim();
        if wanted.is_empty() {
            return Err(CaseError::UnknownTutor(name.to_string()).into());
        }
        if self.tutors.is_empty() {
            return Ok(wanted.to_string());
        }
        self.tutors
            .iter()
            .find(|tutor| tutor.trim().to_lowercase() == wanted.to_lowercase())
            .cloned()
            .ok_or_else(|| CaseError::UnknownTutor(wanted.to_string()).into())
    }
}

/// Per-run state handed to every operation.
pub struct Session {
    pub config: Config,
    pub config_path: PathBuf,
    roster: Option<Roster>,
}

impl Session {
    pub fn open(config_path: Option<PathBuf>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => path,
            None => Config::default_path()?,
        };
        let config = Config::load_from(&config_path)?;
        tracing::debug!(path = %config_path.display(), "configuration loaded");
        Ok(Session {
            config,
            config_path,
            roster: None,
        })
    }

    pub fn save_config(&self) -> Result<()> {
        self.config.save_to(&self.config_path)
    }

    pub fn set_roster(&mut self, roster: Roster) {
        self.roster = Some(roster);
    }

    /// The roster loaded this run, or the snapshot from the last `roster load`.
    pub fn roster(&mut self) -> Result<&Roster> {
        if self.roster.is_none() {
            let path = self.config.snapshot_path()?;
            let roster = crate::roster::read_snapshot(&path)?;
            self.roster = Some(roster);
        }
        self.roster
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("roster not loaded"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_nonexistent_returns_default() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = Config::load_from(&temp_dir.path().join("missing.json"))?;
        assert!(config.root_folder.is_none());
        assert_eq!(config.report_layout.header_row, 10);
        assert_eq!(config.tracking_columns.tutor, 5);
        assert_eq!(config.font_size_pt, 10);
        Ok(())
    }

    #[test]
    fn save_and_load_keeps_root_folder() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.root_folder = Some(PathBuf::from("/srv/expedientes"));
        config.tutors = vec!["Diana Ruiz".to_string()];
        config.save_to(&path)?;

        let loaded = Config::load_from(&path)?;
        assert_eq!(loaded.root_folder, Some(PathBuf::from("/srv/expedientes")));
        assert_eq!(loaded.tutors, vec!["Diana Ruiz".to_string()]);
        Ok(())
    }

    #[test]
    fn partial_file_fills_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{"root_folder": "/data", "report_layout": {"last_column": 10}}"#)?;

        let config = Config::load_from(&path)?;
        assert_eq!(config.report_layout.header_row, 10);
        assert_eq!(config.report_layout.last_column, 10);
        assert_eq!(config.prefixes.evidence, "6_Evidencias_");
        Ok(())
    }

    #[test]
    fn tutor_lookup_is_case_insensitive() {
        let mut config = Config::default();
        assert_eq!(config.resolve_tutor(" Luis ").unwrap(), "Luis");

        config.tutors = vec!["Luis Polo".to_string(), "Yenifer Mora".to_string()];
        assert_eq!(config.resolve_tutor("luis polo").unwrap(), "Luis Polo");
        let err = config.resolve_tutor("Alan").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CaseError>(),
            Some(CaseError::UnknownTutor(_))
        ));
    }
}
