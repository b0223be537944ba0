use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Separator used when feeding component values into the hash (diamond
/// character)
const GROUPING_SEPARATOR: &str = " ⋄ ";

/// One node in the component tree a variant is built from
#[derive(Debug, Clone, Serialize)]
pub struct Component {
    /// Component kind, e.g. "stacktrace", "frame", "message"
    pub id: String,
    pub contributes: bool,
    pub hint: Option<String>,
    pub values: Vec<ComponentValue>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ComponentValue {
    Str(String),
    Component(Component),
}

impl Component {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            contributes: true,
            hint: None,
            values: Vec::new(),
        }
    }

    pub fn with_values(id: &str, values: Vec<ComponentValue>) -> Self {
        Self {
            id: id.to_string(),
            contributes: true,
            hint: None,
            values,
        }
    }

    pub fn update(&mut self, contributes: bool, hint: &str) {
        self.contributes = contributes;
        self.hint = Some(hint.to_string());
    }

    /// True if this tree contains a contributing subcomponent with the
    /// given id (recursive, self included)
    pub fn has_contributing_subcomponent(&self, id: &str) -> bool {
        if self.contributes && self.id == id {
            return true;
        }
        self.values.iter().any(|value| match value {
            ComponentValue::Component(child) => {
                self.contributes && child.has_contributing_subcomponent(id)
            }
            ComponentValue::Str(_) => false,
        })
    }

    /// Flattens contributing leaf values in order, the input the hash is
    /// computed over
    pub fn flattened_values(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_values(&mut out);
        out
    }

    fn collect_values(&self, out: &mut Vec<String>) {
        if !self.contributes {
            return;
        }
        for value in &self.values {
            match value {
                ComponentValue::Str(s) => out.push(s.clone()),
                ComponentValue::Component(child) => child.collect_values(out),
            }
        }
    }
}

/// One named grouping result computed for an event. Ephemeral - computed
/// per event and never persisted directly, though a serialized digest of
/// it feeds grouphash metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Variant {
    pub name: String,
    pub component: Component,
}

impl Variant {
    pub fn new(name: &str, component: Component) -> Self {
        Self {
            name: name.to_string(),
            component,
        }
    }

    pub fn contributes(&self) -> bool {
        self.component.contributes
    }

    pub fn hint(&self) -> Option<&str> {
        self.component.hint.as_deref()
    }

    /// True if this variant carries a contributing stacktrace anywhere in
    /// its component tree
    pub fn has_contributing_stacktrace(&self) -> bool {
        self.component.has_contributing_subcomponent("stacktrace")
    }

    /// SHA256 hex digest over the variant's flattened values
    pub fn get_hash(&self) -> Option<String> {
        if !self.contributes() {
            return None;
        }
        let values = self.component.flattened_values();
        if values.is_empty() {
            return None;
        }
        Some(hash_grouping_values(&values))
    }
}

/// Calculates the SHA256 hash of an ordered list of grouping values
pub fn hash_grouping_values(values: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(values.join(GROUPING_SEPARATOR).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Serialized digest of the variants, stored in grouphash metadata
pub fn variants_digest(variants: &BTreeMap<String, Variant>) -> serde_json::Value {
    let digest: BTreeMap<&str, serde_json::Value> = variants
        .iter()
        .map(|(name, variant)| {
            (
                name.as_str(),
                serde_json::json!({
                    "contributes": variant.contributes(),
                    "hint": variant.hint(),
                    "component_id": variant.component.id,
                }),
            )
        })
        .collect();
    serde_json::to_value(digest).unwrap_or_default()
}
