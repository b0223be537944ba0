//! Hash computation orchestration: primary, secondary (transition-period)
//! and background (sampled, non-authoritative) grouping runs.

use std::collections::BTreeMap;

use crate::config::GroupingSettings;
use crate::error::AppResult;
use crate::grouping::component::{Component, ComponentValue, Variant};
use crate::grouping::config::{load_grouping_config, GroupingConfig, ProjectGroupingOptions};
use crate::grouping::enhancer::apply_modifications_to_frames;
use crate::grouping::fingerprint::resolve_fingerprint;
use crate::grouping::frames::{get_exception_data, get_frames};
use crate::grouping::strategies::{get_variants, StrategyInput, STRATEGIES};
use crate::models::Event;

/// The grouping outcome for one event under one config. Returned explicitly
/// and threaded to whatever persists it; the event itself is never mutated.
#[derive(Debug, Clone)]
pub struct GroupingResult {
    /// Hashes of contributing variants, in strategy priority order
    pub hashes: Vec<String>,
    pub variants: BTreeMap<String, Variant>,
    pub grouping_config_id: String,
    /// Title set by the matched fingerprint rule, overriding the computed
    /// group title
    pub title_override: Option<String>,
}

/// Computes the ordered hashes and variants for an event under the given
/// config.
///
/// Stacktrace normalization and fingerprint resolution happen before hash
/// computation so config-version formatting differences never leak into
/// hash comparison.
pub fn compute_hashes(
    event: &Event,
    config: &GroupingConfig,
    options: &ProjectGroupingOptions,
) -> GroupingResult {
    let exception_data = get_exception_data(event);
    let mut frames = get_frames(event);
    let normalization =
        apply_modifications_to_frames(&mut frames, &exception_data, &config.enhancements);

    let fingerprint = resolve_fingerprint(event, &options.fingerprint_rules);

    let mut variants: BTreeMap<String, Variant>;
    let variant_order: Vec<String>;

    if !fingerprint.is_default() && !fingerprint.is_hybrid() {
        // A fully custom fingerprint replaces the strategy variants,
        // whether it came from the SDK or from a project rule
        let name = "custom_fingerprint";
        let component = Component::with_values(
            name,
            fingerprint
                .values
                .iter()
                .map(|value| ComponentValue::Str(value.clone()))
                .collect(),
        );
        variants = BTreeMap::new();
        variants.insert(name.to_string(), Variant::new(name, component));
        variant_order = vec![name.to_string()];
    } else {
        let input = StrategyInput {
            event,
            frames: &frames,
            normalization: &normalization,
            config,
        };
        variants = get_variants(&input);
        variant_order = STRATEGIES.iter().map(|(name, _)| name.to_string()).collect();

        // A hybrid fingerprint salts every strategy variant with its
        // literal parts
        if fingerprint.is_hybrid() {
            let salts = fingerprint.salt_values();
            for variant in variants.values_mut() {
                let inner = variant.component.clone();
                let mut values: Vec<ComponentValue> = salts
                    .iter()
                    .map(|salt| ComponentValue::Str(salt.clone()))
                    .collect();
                values.push(ComponentValue::Component(inner));
                let mut salted = Component::with_values("salted", values);
                salted.contributes = variant.component.contributes;
                salted.hint = variant.component.hint.clone();
                variant.component = salted;
            }
        }
    }

    // Hash priority follows variant registration order, not content.
    // Identical hashes from different variants collapse onto the first.
    let mut hashes = Vec::new();
    for name in &variant_order {
        if let Some(hash) = variants.get(name).and_then(Variant::get_hash) {
            if !hashes.contains(&hash) {
                hashes.push(hash);
            }
        }
    }

    let title_override = fingerprint
        .matched_rule
        .and_then(|idx| options.fingerprint_rules.get(idx))
        .and_then(|rule| rule.attributes.get("title").cloned());

    GroupingResult {
        hashes,
        variants,
        grouping_config_id: config.id.clone(),
        title_override,
    }
}

/// Computes hashes with the project's primary config.
pub fn run_primary_grouping(
    event: &Event,
    options: &ProjectGroupingOptions,
) -> AppResult<GroupingResult> {
    let config = load_grouping_config(&options.primary_config, &options.custom_enhancements)?;
    Ok(compute_hashes(event, &config, options))
}

/// While the project is in a grouping config transition, also computes
/// hashes with the old config so unknown primary hashes can be matched to
/// existing groups. Failures are logged and produce no secondary hashes;
/// they never break ingestion.
pub fn maybe_run_secondary_grouping(
    event: &Event,
    options: &ProjectGroupingOptions,
) -> Option<GroupingResult> {
    if !options.is_in_transition() {
        return None;
    }
    let secondary_config_id = options.secondary_config.as_deref()?;

    match load_grouping_config(secondary_config_id, &options.custom_enhancements) {
        Ok(config) => Some(compute_hashes(event, &config, options)),
        Err(err) => {
            log::warn!(
                "Secondary grouping failed for event {}: {}",
                event.event_id,
                err
            );
            None
        }
    }
}

/// Optionally runs a sampled fraction of events through an experimental
/// config, purely to collect comparison metrics. The result never touches
/// real grouping, and any failure is reported and swallowed.
pub fn maybe_run_background_grouping(
    event: &Event,
    options: &ProjectGroupingOptions,
    settings: &GroupingSettings,
) {
    let Some(background_config_id) = options.background_config.as_deref() else {
        return;
    };
    if settings.background_sample_rate <= 0.0
        || rand::random::<f64>() >= settings.background_sample_rate
    {
        return;
    }

    match load_grouping_config(background_config_id, &options.custom_enhancements) {
        Ok(config) => {
            let result = compute_hashes(event, &config, options);
            metrics::counter!(
                "grouping.background_grouping.run",
                "config" => config.id.clone(),
            )
            .increment(1);
            log::debug!(
                "Background grouping for event {} produced {} hashes",
                event.event_id,
                result.hashes.len()
            );
        }
        Err(err) => {
            log::warn!(
                "Background grouping failed for event {}: {}",
                event.event_id,
                err
            );
        }
    }
}
