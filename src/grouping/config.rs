use chrono::{DateTime, Utc};

use crate::error::{AppError, AppResult};
use crate::grouping::enhancer::EnhancementRule;
use crate::grouping::fingerprint::FingerprintRule;

/// Latest published grouping config
pub const DEFAULT_GROUPING_CONFIG: &str = "newstyle:2023-01-11";
/// Previous generation, kept for projects still in transition
pub const LEGACY_GROUPING_CONFIG: &str = "legacy:2019-03-12";

/// A grouping config identifier plus its version-specific parameters.
/// Immutable once published.
#[derive(Debug, Clone)]
pub struct GroupingConfig {
    pub id: String,
    pub enhancements: Vec<EnhancementRule>,
    /// Whether `file:` paths count as URL origins during normalization.
    /// Formatting differences between config versions are isolated here and
    /// must never leak into hash comparison.
    pub files_count_as_urls: bool,
}

/// Loads a published grouping config by id, combining its built-in
/// enhancement rules with the project's custom ones.
pub fn load_grouping_config(
    config_id: &str,
    custom_enhancements: &[EnhancementRule],
) -> AppResult<GroupingConfig> {
    let (builtin, files_count_as_urls) = match config_id {
        DEFAULT_GROUPING_CONFIG => (builtin_enhancements(), false),
        LEGACY_GROUPING_CONFIG => (Vec::new(), true),
        other => {
            return Err(AppError::Validation(format!(
                "Unknown grouping config: {}",
                other
            )))
        }
    };

    let mut enhancements = builtin;
    enhancements.extend_from_slice(custom_enhancements);

    Ok(GroupingConfig {
        id: config_id.to_string(),
        enhancements,
        files_count_as_urls,
    })
}

fn builtin_enhancements() -> Vec<EnhancementRule> {
    // Baseline rules shipped with the newstyle config
    [
        "path:**/node_modules/** -app",
        "family:native package:/usr/lib/** -app",
        "function:__libc_start_main -group",
    ]
    .iter()
    .filter_map(|text| EnhancementRule::parse(text).ok())
    .collect()
}

/// Per-project grouping options, read from project settings by the caller
#[derive(Debug, Clone)]
pub struct ProjectGroupingOptions {
    pub primary_config: String,
    /// Old config still computed while the project migrates
    pub secondary_config: Option<String>,
    /// End of the transition window
    pub secondary_grouping_expiry: Option<DateTime<Utc>>,
    /// Sampled, non-authoritative config used only for comparison metrics
    pub background_config: Option<String>,
    pub custom_enhancements: Vec<EnhancementRule>,
    pub fingerprint_rules: Vec<FingerprintRule>,
}

impl Default for ProjectGroupingOptions {
    fn default() -> Self {
        Self {
            primary_config: DEFAULT_GROUPING_CONFIG.to_string(),
            secondary_config: None,
            secondary_grouping_expiry: None,
            background_config: None,
            custom_enhancements: Vec::new(),
            fingerprint_rules: Vec::new(),
        }
    }
}

impl ProjectGroupingOptions {
    /// True while the project runs an old and a new grouping config side by
    /// side to avoid abrupt re-grouping
    pub fn is_in_transition(&self) -> bool {
        self.secondary_config.is_some()
            && self
                .secondary_grouping_expiry
                .is_some_and(|expiry| expiry > Utc::now())
    }
}
