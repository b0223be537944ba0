use serde_json::Value;

use crate::models::Event;

/// One stacktrace frame, flattened to the fields the grouping matchers and
/// strategies read. Frames are ordered caller-first, callee-last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub function: Option<String>,
    pub module: Option<String>,
    pub path: Option<String>,
    pub package: Option<String>,
    pub lineno: Option<i64>,
    /// Platform family, e.g. "javascript", "native", "other"
    pub family: String,
    pub in_app: bool,
    /// Whether the frame feeds the hash; flipped by `-group` actions
    pub contributes: bool,
}

/// Exception attributes tested by exception-field matchers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionData {
    pub ty: Option<String>,
    pub value: Option<String>,
    pub mechanism: Option<String>,
}

/// Maps an SDK platform string onto a matcher family
pub fn get_platform_family(platform: Option<&str>) -> String {
    match platform {
        Some("javascript") | Some("node") => "javascript".to_string(),
        Some("cocoa") | Some("objc") | Some("native") | Some("c") => "native".to_string(),
        _ => "other".to_string(),
    }
}

/// Extracts and flattens the event's stacktrace frames
pub fn get_frames(event: &Event) -> Vec<Frame> {
    let family = get_platform_family(event.platform());

    let Some(raw_frames) = event.raw_frames() else {
        return Vec::new();
    };

    raw_frames
        .iter()
        .map(|raw| parse_frame(raw, &family))
        .collect()
}

fn parse_frame(raw: &Value, family: &str) -> Frame {
    let get_str = |key: &str| {
        raw.get(key)
            .and_then(|value| value.as_str())
            .map(|value| value.to_string())
    };

    Frame {
        function: get_str("function"),
        module: get_str("module"),
        path: get_str("filename").or_else(|| get_str("abs_path")),
        package: get_str("package"),
        lineno: raw.get("lineno").and_then(|value| value.as_i64()),
        family: raw
            .get("platform")
            .and_then(|value| value.as_str())
            .map(|platform| get_platform_family(Some(platform)))
            .unwrap_or_else(|| family.to_string()),
        in_app: raw
            .get("in_app")
            .and_then(|value| value.as_bool())
            .unwrap_or(false),
        contributes: true,
    }
}

/// Exception attributes of the event's main exception
pub fn get_exception_data(event: &Event) -> ExceptionData {
    let Some(exception) = event.main_exception() else {
        return ExceptionData::default();
    };

    ExceptionData {
        ty: exception
            .get("type")
            .and_then(|value| value.as_str())
            .map(|value| value.to_string()),
        value: exception
            .get("value")
            .and_then(|value| value.as_str())
            .map(|value| value.to_string()),
        mechanism: exception
            .get("mechanism")
            .and_then(|mechanism| mechanism.get("type"))
            .and_then(|value| value.as_str())
            .map(|value| value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn make_event(data: Value) -> Event {
        Event::new(Uuid::new_v4(), 1, data)
    }

    #[test]
    fn test_frames_from_exception_stacktrace() {
        let event = make_event(json!({
            "platform": "javascript",
            "exception": {
                "values": [{
                    "type": "TypeError",
                    "stacktrace": {
                        "frames": [
                            { "function": "main", "filename": "app.js", "in_app": true },
                            { "function": "handle", "filename": "lib.js" }
                        ]
                    }
                }]
            }
        }));

        let frames = get_frames(&event);
        assert_eq!(frames.len(), 2);
        assert!(frames[0].in_app);
        assert_eq!(frames[0].family, "javascript");
        assert_eq!(frames[1].function.as_deref(), Some("handle"));
    }

    #[test]
    fn test_no_stacktrace_yields_no_frames() {
        let event = make_event(json!({ "message": "plain" }));
        assert!(get_frames(&event).is_empty());
    }

    #[test]
    fn test_exception_data_includes_mechanism() {
        let event = make_event(json!({
            "exception": {
                "values": [{
                    "type": "Panic",
                    "value": "boom",
                    "mechanism": { "type": "unhandled" }
                }]
            }
        }));

        let data = get_exception_data(&event);
        assert_eq!(data.ty.as_deref(), Some("Panic"));
        assert_eq!(data.mechanism.as_deref(), Some("unhandled"));
    }
}
