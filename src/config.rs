//! Session configuration: exam rounds, subject catalog and defaults.
//!
//! Loaded once at start-up from a TOML file. The resulting [`ExamContext`] is
//! immutable; `config.reload` builds a fresh one and swaps it wholesale.

use crate::catalog::{CatalogPreset, SubjectCatalog, SubjectDefinition};
use crate::error::{ExamError, ExamResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamConfig {
    /// Round labels in canonical order.
    #[serde(default = "default_rounds")]
    pub rounds: Vec<String>,

    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Point value for answer-key rows saved without one.
    #[serde(default = "default_point_value")]
    pub default_point_value: f64,

    /// Tracing filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Workspace directory opened at start-up.
    #[serde(default)]
    pub workspace: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub preset: CatalogPreset,

    /// Entries replacing or extending the preset.
    #[serde(default)]
    pub subjects: Vec<SubjectDefinition>,
}

fn default_rounds() -> Vec<String> {
    ["1차", "2차", "3차", "4차"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_point_value() -> f64 {
    2.0
}

fn default_log_filter() -> String {
    "mockexamd=info".to_string()
}

impl Default for ExamConfig {
    fn default() -> Self {
        Self {
            rounds: default_rounds(),
            catalog: CatalogConfig::default(),
            default_point_value: default_point_value(),
            log_filter: default_log_filter(),
            workspace: None,
        }
    }
}

impl ExamConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> ExamResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| ExamError::Config(format!("{}: {}", path.to_string_lossy(), e)))
    }

    pub fn from_toml_str(content: &str) -> ExamResult<Self> {
        let cfg: ExamConfig =
            toml::from_str(content).map_err(|e| ExamError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> ExamResult<()> {
        if self.rounds.is_empty() {
            return Err(ExamError::Config("at least one round is required".to_string()));
        }
        let mut seen = HashSet::new();
        for r in &self.rounds {
            if r.trim().is_empty() {
                return Err(ExamError::Config("round label must not be blank".to_string()));
            }
            if !seen.insert(r.as_str()) {
                return Err(ExamError::Config(format!("duplicate round: {}", r)));
            }
        }
        if !self.default_point_value.is_finite() || self.default_point_value < 0.0 {
            return Err(ExamError::Config(
                "default_point_value must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }

    pub fn build_catalog(&self) -> ExamResult<SubjectCatalog> {
        SubjectCatalog::preset(self.catalog.preset).with_overrides(&self.catalog.subjects)
    }
}

/// Validated configuration plus the catalog built from it.
#[derive(Debug, Clone)]
pub struct ExamContext {
    config: ExamConfig,
    catalog: SubjectCatalog,
    source: Option<PathBuf>,
}

impl ExamContext {
    pub fn new(config: ExamConfig) -> ExamResult<Self> {
        config.validate()?;
        let catalog = config.build_catalog()?;
        Ok(Self {
            config,
            catalog,
            source: None,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> ExamResult<Self> {
        let mut ctx = Self::new(ExamConfig::load(path.as_ref())?)?;
        ctx.source = Some(path.as_ref().to_path_buf());
        Ok(ctx)
    }

    pub fn config(&self) -> &ExamConfig {
        &self.config
    }

    pub fn catalog(&self) -> &SubjectCatalog {
        &self.catalog
    }

    /// File this context was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn rounds(&self) -> &[String] {
        &self.config.rounds
    }

    pub fn round_index(&self, round: &str) -> Option<usize> {
        self.config.rounds.iter().position(|r| r == round)
    }

    pub fn check_round(&self, round: &str) -> ExamResult<()> {
        match self.round_index(round) {
            Some(_) => Ok(()),
            None => Err(ExamError::UnknownRound(round.to_string())),
        }
    }

    pub fn default_point_value(&self) -> f64 {
        self.config.default_point_value
    }
}

impl Default for ExamContext {
    fn default() -> Self {
        let config = ExamConfig::default();
        let catalog = SubjectCatalog::preset(config.catalog.preset);
        Self {
            config,
            catalog,
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Category;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = ExamConfig::from_toml_str("").expect("parse empty config");
        assert_eq!(cfg.rounds, vec!["1차", "2차", "3차", "4차"]);
        assert_eq!(cfg.catalog.preset, CatalogPreset::Extended);
        assert_eq!(cfg.default_point_value, 2.0);
        assert!(cfg.workspace.is_none());
    }

    #[test]
    fn subjects_override_preset() {
        let cfg = ExamConfig::from_toml_str(
            r#"
rounds = ["1차", "2차", "3차", "4차", "5차"]
default_point_value = 3.0

[catalog]
preset = "extended"

[[catalog.subjects]]
name = "화학"
question_count = 25
category = "science_elective"

[[catalog.subjects]]
name = "정보"
question_count = 20
category = "core"
"#,
        )
        .expect("parse config");
        let ctx = ExamContext::new(cfg).expect("build context");
        assert_eq!(ctx.rounds().len(), 5);
        assert_eq!(ctx.round_index("5차"), Some(4));
        assert_eq!(ctx.catalog().question_count("화학").unwrap(), 25);
        assert_eq!(ctx.catalog().category("정보").unwrap(), Category::Core);
        assert_eq!(ctx.default_point_value(), 3.0);
    }

    #[test]
    fn duplicate_rounds_are_rejected() {
        let res = ExamConfig::from_toml_str(r#"rounds = ["1차", "1차"]"#);
        assert!(matches!(res, Err(ExamError::Config(_))));
    }

    #[test]
    fn unknown_round_is_reported() {
        let ctx = ExamContext::default();
        assert!(ctx.check_round("2차").is_ok());
        assert!(matches!(
            ctx.check_round("9차"),
            Err(ExamError::UnknownRound(r)) if r == "9차"
        ));
    }

    #[test]
    fn load_reads_file_and_remembers_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mockexam.toml");
        std::fs::write(&path, "[catalog]\npreset = \"minimal\"\n").expect("write config");
        let ctx = ExamContext::load(&path).expect("load");
        assert_eq!(ctx.catalog().subjects().len(), 6);
        assert_eq!(ctx.source(), Some(path.as_path()));
    }
}
