use serde_json::Value;
use uuid::Uuid;

/// Fingerprint value that means "use the computed grouping"
pub const DEFAULT_FINGERPRINT: &str = "{{ default }}";

/// Event - an immutable ingested record. Owned by the event store; this
/// core only reads its fields and never writes back into the envelope.
#[derive(Debug, Clone)]
pub struct Event {
    pub event_id: Uuid,
    pub project_id: i32,
    pub data: Value,
}

impl Event {
    pub fn new(event_id: Uuid, project_id: i32, data: Value) -> Self {
        Self {
            event_id,
            project_id,
            data,
        }
    }

    pub fn platform(&self) -> Option<&str> {
        self.data.get("platform").and_then(|p| p.as_str())
    }

    pub fn level(&self) -> Option<&str> {
        self.data.get("level").and_then(|l| l.as_str())
    }

    pub fn logger(&self) -> Option<&str> {
        self.data.get("logger").and_then(|l| l.as_str())
    }

    pub fn transaction(&self) -> Option<&str> {
        self.data.get("transaction").and_then(|t| t.as_str())
    }

    /// The fingerprint seed, defaulting to `["{{ default }}"]` when the SDK
    /// sent none
    pub fn fingerprint(&self) -> Vec<String> {
        match self.data.get("fingerprint").and_then(|f| f.as_array()) {
            Some(parts) if !parts.is_empty() => parts
                .iter()
                .map(|part| part.as_str().unwrap_or("").to_string())
                .collect(),
            _ => vec![DEFAULT_FINGERPRINT.to_string()],
        }
    }

    /// The main exception (the last one in the chain)
    pub fn main_exception(&self) -> Option<&Value> {
        let exception = self.data.get("exception")?;

        // Can be a direct array or an object with "values"
        let values = if exception.is_array() {
            exception.as_array()?
        } else {
            exception.get("values")?.as_array()?
        };

        values.last()
    }

    /// Exception type and value, or a log-message fallback
    pub fn type_and_value(&self) -> (String, String) {
        if let Some(exception) = self.main_exception() {
            let exc_type = exception
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or("Error")
                .to_string();

            let exc_value = exception
                .get("value")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();

            return (exc_type, exc_value);
        }

        if let Some(message) = self.log_message() {
            return ("Log Message".to_string(), message);
        }

        ("Unknown".to_string(), String::new())
    }

    /// First line of the log message, if any
    pub fn log_message(&self) -> Option<String> {
        if let Some(logentry) = self.data.get("logentry") {
            if let Some(msg) = logentry.get("message").and_then(|m| m.as_str()) {
                return Some(msg.lines().next().unwrap_or("").to_string());
            }
            if let Some(msg) = logentry.get("formatted").and_then(|m| m.as_str()) {
                return Some(msg.lines().next().unwrap_or("").to_string());
            }
        }

        if let Some(message) = self.data.get("message") {
            if let Some(msg) = message.as_str() {
                return Some(msg.lines().next().unwrap_or("").to_string());
            }
            if let Some(msg) = message.get("message").and_then(|m| m.as_str()) {
                return Some(msg.lines().next().unwrap_or("").to_string());
            }
        }

        None
    }

    /// Looks up a tag value by key
    pub fn tag(&self, key: &str) -> Option<&str> {
        let tags = self.data.get("tags")?;

        // Tags arrive either as a map or as [key, value] pairs
        if let Some(map) = tags.as_object() {
            return map.get(key).and_then(|v| v.as_str());
        }
        if let Some(pairs) = tags.as_array() {
            for pair in pairs {
                let entry = pair.as_array()?;
                if entry.first().and_then(|k| k.as_str()) == Some(key) {
                    return entry.get(1).and_then(|v| v.as_str());
                }
            }
        }

        None
    }

    /// Raw stacktrace frames of the main exception, or the top-level
    /// stacktrace when there is no exception
    pub fn raw_frames(&self) -> Option<&Vec<Value>> {
        let stacktrace = match self.main_exception() {
            Some(exception) => exception.get("stacktrace")?,
            None => self.data.get("stacktrace")?,
        };
        stacktrace.get("frames")?.as_array()
    }
}
