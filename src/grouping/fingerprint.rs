//! Server-side fingerprinting: project-configured rules that rewrite an
//! event's fingerprint before hashing when the SDK sent only the default
//! sentinel.

use std::collections::BTreeMap;

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::models::{Event, DEFAULT_FINGERPRINT};

/// One matcher of a fingerprint rule, tested against event attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintMatcher {
    /// `type`, `value`, `message`, `logger`, `level`, or `tags.<key>`
    pub key: String,
    pub pattern: String,
    #[serde(default)]
    pub negated: bool,
}

impl FingerprintMatcher {
    fn matches(&self, event: &Event) -> bool {
        let value = match self.key.as_str() {
            "type" => Some(event.type_and_value().0),
            "value" => Some(event.type_and_value().1),
            "message" => event.log_message(),
            "logger" => event.logger().map(|s| s.to_string()),
            "level" => event.level().map(|s| s.to_string()),
            key => key
                .strip_prefix("tags.")
                .and_then(|tag| event.tag(tag))
                .map(|s| s.to_string()),
        };

        let matched = match value {
            Some(value) => match Pattern::new(&self.pattern) {
                Ok(glob) => glob.matches(&value),
                Err(_) => self.pattern == value,
            },
            None => false,
        };
        matched != self.negated
    }
}

/// One fingerprint rule: when all matchers hold, the event's fingerprint is
/// replaced. `{{ default }}` inside the replacement keeps hybrid behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRule {
    pub matchers: Vec<FingerprintMatcher>,
    pub fingerprint: Vec<String>,
    /// Optional title/attribute overrides carried alongside the fingerprint
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl FingerprintRule {
    fn matches(&self, event: &Event) -> bool {
        !self.matchers.is_empty() && self.matchers.iter().all(|matcher| matcher.matches(event))
    }
}

/// The fingerprint resolved for an event, threaded explicitly rather than
/// written back onto the event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFingerprint {
    pub values: Vec<String>,
    /// Index of the server-side rule that matched, if any
    pub matched_rule: Option<usize>,
}

impl ResolvedFingerprint {
    pub fn is_default(&self) -> bool {
        self.values.len() == 1 && self.values[0] == DEFAULT_FINGERPRINT
    }

    /// A hybrid fingerprint mixes `{{ default }}` with literal parts
    pub fn is_hybrid(&self) -> bool {
        !self.is_default()
            && self
                .values
                .iter()
                .any(|part| part == DEFAULT_FINGERPRINT)
    }

    /// Literal (non-sentinel) parts of the fingerprint
    pub fn salt_values(&self) -> Vec<String> {
        self.values
            .iter()
            .filter(|part| part.as_str() != DEFAULT_FINGERPRINT)
            .cloned()
            .collect()
    }
}

/// Resolves the fingerprint for an event. Server-side rules only apply when
/// the incoming fingerprint is exactly the default sentinel; a custom SDK
/// fingerprint always wins.
pub fn resolve_fingerprint(event: &Event, rules: &[FingerprintRule]) -> ResolvedFingerprint {
    let incoming = event.fingerprint();
    let is_default = incoming.len() == 1 && incoming[0] == DEFAULT_FINGERPRINT;

    if is_default {
        for (idx, rule) in rules.iter().enumerate() {
            if rule.matches(event) {
                return ResolvedFingerprint {
                    values: rule.fingerprint.clone(),
                    matched_rule: Some(idx),
                };
            }
        }
    }

    ResolvedFingerprint {
        values: incoming,
        matched_rule: None,
    }
}
