use std::path::Path;

use hist_diff::{BaseDiffKind, DEFAULT_IGNORED_ATTRIBUTES};
use hist_ledger::DEFAULT_MAX_CONFLICT_RETRIES;
use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

/// Engine-wide settings.
///
/// ```toml
/// ignored_attributes = ["id", "created_at", "updated_at", "lock_version"]
/// max_conflict_retries = 5
/// base_diff_kind = "model"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bookkeeping attributes excluded from every diff.
    pub ignored_attributes: Vec<String>,
    /// Times an update retries after losing its version number.
    pub max_conflict_retries: u32,
    /// Base schema every specialized schema extends.
    pub base_diff_kind: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ignored_attributes: DEFAULT_IGNORED_ATTRIBUTES.iter().map(|s| s.to_string()).collect(),
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            base_diff_kind: BaseDiffKind::MODEL.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(source: &str) -> SdkResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| SdkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> SdkResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
            .map_err(|e| SdkError::Config(format!("{}: {e}", path.display())))
    }

    pub fn to_toml_string(&self) -> SdkResult<String> {
        toml::to_string_pretty(self).map_err(|e| SdkError::Config(e.to_string()))
    }

    pub fn base(&self) -> BaseDiffKind {
        BaseDiffKind::new(self.base_diff_kind.clone())
    }

    fn validate(&self) -> SdkResult<()> {
        if self.base_diff_kind.trim().is_empty() {
            return Err(SdkError::Config("base_diff_kind must not be empty".into()));
        }
        if let Some(blank) = self.ignored_attributes.iter().find(|a| a.trim().is_empty()) {
            return Err(SdkError::Config(format!("blank ignored attribute {blank:?}")));
        }
        Ok(())
    }
}
