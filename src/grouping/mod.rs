pub mod component;
pub mod config;
pub mod enhancer;
pub mod fingerprint;
pub mod frames;
pub mod hashing;
pub mod strategies;

pub use component::{hash_grouping_values, variants_digest, Component, ComponentValue, Variant};
pub use config::{
    load_grouping_config, GroupingConfig, ProjectGroupingOptions, DEFAULT_GROUPING_CONFIG,
    LEGACY_GROUPING_CONFIG,
};
pub use enhancer::{EnhancementAction, EnhancementMatch, EnhancementRule, StacktraceNormalization};
pub use fingerprint::{resolve_fingerprint, FingerprintMatcher, FingerprintRule, ResolvedFingerprint};
pub use frames::{get_exception_data, get_frames, ExceptionData, Frame};
pub use hashing::{
    compute_hashes, maybe_run_background_grouping, maybe_run_secondary_grouping,
    run_primary_grouping, GroupingResult,
};
pub use strategies::{get_variants, remove_non_stacktrace_variants, StrategyInput};
