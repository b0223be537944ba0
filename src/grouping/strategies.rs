//! Variant strategies: each one computes a candidate grouping result for an
//! event. Strategies live in a closed lookup table built at compile time
//! and run in registration order, which also fixes hash priority order.

use std::collections::BTreeMap;

use crate::grouping::component::{Component, ComponentValue, Variant};
use crate::grouping::config::GroupingConfig;
use crate::grouping::enhancer::StacktraceNormalization;
use crate::grouping::frames::Frame;
use crate::models::Event;

/// Everything a strategy needs to evaluate an event
pub struct StrategyInput<'a> {
    pub event: &'a Event,
    /// Frames after enhancement rules were applied
    pub frames: &'a [Frame],
    pub normalization: &'a StacktraceNormalization,
    pub config: &'a GroupingConfig,
}

pub type StrategyFn = fn(&StrategyInput) -> Variant;

/// Registered strategies, in priority order
pub const STRATEGIES: &[(&str, StrategyFn)] = &[
    ("app", app_stacktrace_variant),
    ("system", system_stacktrace_variant),
    ("default", default_variant),
];

/// Runs every registered strategy and applies the cross-variant stacktrace
/// correction.
pub fn get_variants(input: &StrategyInput) -> BTreeMap<String, Variant> {
    let mut variants = BTreeMap::new();
    for (name, strategy) in STRATEGIES {
        variants.insert(name.to_string(), strategy(input));
    }
    remove_non_stacktrace_variants(&mut variants);
    variants
}

/// If any variant contains a contributing stacktrace, every variant lacking
/// one is forced to non-contributing: grouping solely on non-stacktrace
/// attributes would be weaker than the stacktrace signal available elsewhere.
pub fn remove_non_stacktrace_variants(variants: &mut BTreeMap<String, Variant>) {
    if variants.len() <= 1 {
        return;
    }

    let stacktrace_variants: Vec<String> = variants
        .iter()
        .filter(|(_, variant)| variant.has_contributing_stacktrace())
        .map(|(name, _)| name.clone())
        .collect();

    if stacktrace_variants.is_empty() {
        return;
    }

    let hint_suffix = if stacktrace_variants.len() == 1 {
        format!("the {} variant does", stacktrace_variants[0])
    } else {
        "others do".to_string()
    };

    for variant in variants.values_mut() {
        if !variant.has_contributing_stacktrace() {
            variant.component.update(
                false,
                &format!(
                    "ignored because this variant does not have a contributing stacktrace, but {}",
                    hint_suffix
                ),
            );
        }
    }
}

/// Stacktrace variant over in-app frames only
fn app_stacktrace_variant(input: &StrategyInput) -> Variant {
    let frames: Vec<&Frame> = input.frames.iter().filter(|frame| frame.in_app).collect();
    stacktrace_variant("app", input, &frames)
}

/// Stacktrace variant over the full stack
fn system_stacktrace_variant(input: &StrategyInput) -> Variant {
    let frames: Vec<&Frame> = input.frames.iter().collect();
    stacktrace_variant("system", input, &frames)
}

fn stacktrace_variant(name: &str, input: &StrategyInput, frames: &[&Frame]) -> Variant {
    let mut frame_components: Vec<Component> = frames
        .iter()
        .map(|frame| frame_component(frame, input.config))
        .collect();

    // max-frames keeps only the callee-most contributing frames
    if let Some(max_frames) = input.normalization.max_frames {
        let mut kept = 0;
        for component in frame_components.iter_mut().rev() {
            if component.contributes {
                if kept >= max_frames {
                    component.update(false, "beyond max-frames limit");
                } else {
                    kept += 1;
                }
            }
        }
    }

    let contributing_count = frame_components
        .iter()
        .filter(|component| component.contributes)
        .count();

    let mut stacktrace = Component {
        id: "stacktrace".to_string(),
        contributes: contributing_count > 0,
        hint: None,
        values: frame_components
            .into_iter()
            .map(ComponentValue::Component)
            .collect(),
    };

    if !stacktrace.contributes {
        stacktrace.hint = Some("ignored because it contains no contributing frames".to_string());
    }

    if let Some(min_frames) = input.normalization.min_frames {
        if stacktrace.contributes && contributing_count < min_frames {
            stacktrace.update(
                false,
                &format!("discarded because it has fewer than {} contributing frames", min_frames),
            );
        }
    }

    let (exc_type, _) = input.event.type_and_value();
    let exception = Component {
        id: "exception".to_string(),
        contributes: stacktrace.contributes,
        hint: None,
        values: vec![
            ComponentValue::Str(exc_type),
            ComponentValue::Component(stacktrace),
        ],
    };

    Variant::new(name, exception)
}

fn frame_component(frame: &Frame, config: &GroupingConfig) -> Component {
    let mut values = Vec::new();
    if let Some(function) = &frame.function {
        values.push(ComponentValue::Str(function.clone()));
    } else if let Some(lineno) = frame.lineno {
        values.push(ComponentValue::Str(format!("<unknown>:{}", lineno)));
    }
    if let Some(module) = &frame.module {
        values.push(ComponentValue::Str(module.clone()));
    } else if let Some(path) = &frame.path {
        values.push(ComponentValue::Str(path.clone()));
    }

    let mut component = Component::with_values("frame", values);

    if !frame.contributes {
        component.update(false, "marked non-contributing by stacktrace rule");
    } else if frame
        .path
        .as_deref()
        .is_some_and(|path| has_url_origin(path, config.files_count_as_urls))
    {
        component.update(false, "ignored because it has a URL origin");
    } else if component.values.is_empty() {
        component.update(false, "ignored because it has no usable attributes");
    }

    component
}

/// URLs can be generated such that they are unstable per session, so frames
/// whose origin is a URL never contribute.
pub fn has_url_origin(path: &str, files_count_as_urls: bool) -> bool {
    if path.is_empty() {
        return false;
    }
    if ["http:", "https:", "applewebdata:", "blob:"]
        .iter()
        .any(|scheme| path.starts_with(scheme))
    {
        return true;
    }
    if path.starts_with("file:") {
        return files_count_as_urls;
    }
    false
}

/// Message-based fallback variant used when no stacktrace signal exists
fn default_variant(input: &StrategyInput) -> Variant {
    let (calculated_type, calculated_value) = input.event.type_and_value();

    let mut values = Vec::new();
    if !calculated_type.is_empty() && calculated_type != "Unknown" {
        values.push(ComponentValue::Str(calculated_type));
    }
    if !calculated_value.is_empty() {
        let first_line = calculated_value.lines().next().unwrap_or("").to_string();
        values.push(ComponentValue::Str(first_line));
    }

    let mut component = Component::with_values("message", values);
    if component.values.is_empty() {
        component.update(false, "ignored because the event has no message data");
    }

    Variant::new("default", component)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_origin_detection() {
        assert!(has_url_origin("https://example.com/app.js", false));
        assert!(has_url_origin("blob:http://example.com/x", false));
        assert!(!has_url_origin("file:///srv/app.js", false));
        assert!(has_url_origin("file:///srv/app.js", true));
        assert!(!has_url_origin("/srv/app.js", true));
        assert!(!has_url_origin("", true));
    }
}
