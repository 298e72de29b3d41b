//! Configuration types, read from the environment once at startup.

use std::path::PathBuf;
use std::str::FromStr;

use secrecy::SecretString;

use crate::archive::types::CompanyIdentity;
use crate::error::ConfigError;
use crate::llm::DEFAULT_MODEL;

/// Which planner decides the archive actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlannerKind {
    /// Deterministic rule table.
    #[default]
    Rules,
    /// LLM tool calling, validated against the rule table.
    Llm,
}

impl FromStr for PlannerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rules" | "rule" => Ok(Self::Rules),
            "llm" | "ai" => Ok(Self::Llm),
            other => Err(ConfigError::InvalidValue {
                key: "ARCHIVE_PLANNER".to_string(),
                message: format!("expected 'rules' or 'llm', got '{other}'"),
            }),
        }
    }
}

/// Names of the working folders directly under the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderNames {
    pub drop: String,
    pub unclassified: String,
    pub review: String,
}

impl Default for FolderNames {
    fn default() -> Self {
        Self {
            drop: "Drop".to_string(),
            unclassified: "Unclassified".to_string(),
            review: "Review".to_string(),
        }
    }
}

/// Archiver configuration.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Storage folder id everything lives under; also the archive root.
    pub root_folder_id: String,
    pub company: CompanyIdentity,
    pub drive_token: SecretString,
    pub classifier_url: String,
    pub classifier_api_key: Option<SecretString>,
    pub planner: PlannerKind,
    /// Required when `planner` is `Llm`.
    pub anthropic_api_key: Option<SecretString>,
    pub model: String,
    pub folders: FolderNames,
    /// Where downloaded documents are staged; system temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
    /// Daily rolling log files go here when set.
    pub log_dir: Option<PathBuf>,
}

const REQUIRED: &[&str] = &[
    "ROOT_FOLDER_ID",
    "COMPANY_FISCAL_ID",
    "COMPANY_NAME",
    "DRIVE_ACCESS_TOKEN",
    "CLASSIFIER_URL",
];

impl ArchiveConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset. Every missing
    /// required variable is reported at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let planner = match get("ARCHIVE_PLANNER") {
            Some(raw) => raw.parse()?,
            None => PlannerKind::default(),
        };

        let mut missing: Vec<&str> = REQUIRED
            .iter()
            .copied()
            .filter(|key| get(*key).is_none())
            .collect();
        if planner == PlannerKind::Llm && get("ANTHROPIC_API_KEY").is_none() {
            missing.push("ANTHROPIC_API_KEY");
        }
        if !missing.is_empty() {
            return Err(ConfigError::MissingEnvVar(missing.join(", ")));
        }

        let require = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));
        let defaults = FolderNames::default();

        Ok(Self {
            root_folder_id: require("ROOT_FOLDER_ID")?,
            company: CompanyIdentity::new(require("COMPANY_FISCAL_ID")?, require("COMPANY_NAME")?),
            drive_token: SecretString::from(require("DRIVE_ACCESS_TOKEN")?),
            classifier_url: require("CLASSIFIER_URL")?,
            classifier_api_key: get("CLASSIFIER_API_KEY").map(SecretString::from),
            planner,
            anthropic_api_key: get("ANTHROPIC_API_KEY").map(SecretString::from),
            model: get("ARCHIVE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            folders: FolderNames {
                drop: get("ARCHIVE_DROP_FOLDER").unwrap_or(defaults.drop),
                unclassified: get("ARCHIVE_UNCLASSIFIED_FOLDER").unwrap_or(defaults.unclassified),
                review: get("ARCHIVE_REVIEW_FOLDER").unwrap_or(defaults.review),
            },
            scratch_dir: get("ARCHIVE_SCRATCH_DIR").map(PathBuf::from),
            log_dir: get("ARCHIVE_LOG_DIR").map(PathBuf::from),
        })
    }

    /// Switch planner after loading, re-checking the LLM key.
    pub fn with_planner(mut self, planner: PlannerKind) -> Result<Self, ConfigError> {
        if planner == PlannerKind::Llm && self.anthropic_api_key.is_none() {
            return Err(ConfigError::MissingEnvVar("ANTHROPIC_API_KEY".to_string()));
        }
        self.planner = planner;
        Ok(self)
    }
}
