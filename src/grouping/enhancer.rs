//! Enhancement rules: project-scoped `(matchers, actions)` pairs that adjust
//! frame flags before the grouping strategies run.
//!
//! Rules round-trip between three representations: the text form written by
//! operators (`family:javascript function:handle* +app -group`), the parsed
//! form, and a compact structure used for caching.

use std::fmt;

use glob::Pattern;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::grouping::frames::{ExceptionData, Frame};

/// Frame or exception field a matcher tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKey {
    Function,
    Module,
    Path,
    Package,
    Family,
    App,
    ExceptionType,
    ExceptionValue,
    ExceptionMechanism,
}

impl MatchKey {
    fn parse(key: &str) -> Option<Self> {
        match key {
            "function" => Some(MatchKey::Function),
            "module" => Some(MatchKey::Module),
            "path" => Some(MatchKey::Path),
            "package" => Some(MatchKey::Package),
            "family" => Some(MatchKey::Family),
            "app" => Some(MatchKey::App),
            "type" => Some(MatchKey::ExceptionType),
            "value" => Some(MatchKey::ExceptionValue),
            "mechanism" => Some(MatchKey::ExceptionMechanism),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            MatchKey::Function => "function",
            MatchKey::Module => "module",
            MatchKey::Path => "path",
            MatchKey::Package => "package",
            MatchKey::Family => "family",
            MatchKey::App => "app",
            MatchKey::ExceptionType => "type",
            MatchKey::ExceptionValue => "value",
            MatchKey::ExceptionMechanism => "mechanism",
        }
    }

    fn abbreviation(&self) -> &'static str {
        match self {
            MatchKey::Function => "f",
            MatchKey::Module => "m",
            MatchKey::Path => "p",
            MatchKey::Package => "P",
            MatchKey::Family => "F",
            MatchKey::App => "a",
            MatchKey::ExceptionType => "t",
            MatchKey::ExceptionValue => "v",
            MatchKey::ExceptionMechanism => "M",
        }
    }

    fn from_abbreviation(abbrev: &str) -> Option<Self> {
        match abbrev {
            "f" => Some(MatchKey::Function),
            "m" => Some(MatchKey::Module),
            "p" => Some(MatchKey::Path),
            "P" => Some(MatchKey::Package),
            "F" => Some(MatchKey::Family),
            "a" => Some(MatchKey::App),
            "t" => Some(MatchKey::ExceptionType),
            "v" => Some(MatchKey::ExceptionValue),
            "M" => Some(MatchKey::ExceptionMechanism),
            _ => None,
        }
    }

    /// Exception matchers gate the whole rule rather than individual frames
    pub fn is_exception_matcher(&self) -> bool {
        matches!(
            self,
            MatchKey::ExceptionType | MatchKey::ExceptionValue | MatchKey::ExceptionMechanism
        )
    }
}

/// One matcher of an enhancement rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhancementMatch {
    pub key: MatchKey,
    pub pattern: String,
    pub negated: bool,
}

impl EnhancementMatch {
    pub fn matches_frame(&self, frame: &Frame) -> bool {
        let matched = match self.key {
            MatchKey::Function => glob_matches(&self.pattern, frame.function.as_deref()),
            MatchKey::Module => glob_matches(&self.pattern, frame.module.as_deref()),
            MatchKey::Path => glob_matches(&self.pattern, frame.path.as_deref()),
            MatchKey::Package => glob_matches(&self.pattern, frame.package.as_deref()),
            MatchKey::Family => self
                .pattern
                .split(',')
                .any(|family| family == "all" || family == frame.family),
            MatchKey::App => {
                let wanted = matches!(self.pattern.as_str(), "yes" | "true" | "1");
                frame.in_app == wanted
            }
            // Exception matchers never match individual frames
            _ => false,
        };
        matched != self.negated
    }

    pub fn matches_exception(&self, exception: &ExceptionData) -> bool {
        let matched = match self.key {
            MatchKey::ExceptionType => glob_matches(&self.pattern, exception.ty.as_deref()),
            MatchKey::ExceptionValue => glob_matches(&self.pattern, exception.value.as_deref()),
            MatchKey::ExceptionMechanism => {
                glob_matches(&self.pattern, exception.mechanism.as_deref())
            }
            _ => return true,
        };
        matched != self.negated
    }

    fn to_config_structure(&self) -> Value {
        let key = if self.negated {
            format!("!{}", self.key.abbreviation())
        } else {
            self.key.abbreviation().to_string()
        };
        json!([key, self.pattern])
    }

    fn from_config_structure(value: &Value) -> AppResult<Self> {
        let parts = value
            .as_array()
            .filter(|parts| parts.len() == 2)
            .ok_or_else(|| AppError::Validation("Malformed matcher structure".to_string()))?;
        let raw_key = parts[0]
            .as_str()
            .ok_or_else(|| AppError::Validation("Malformed matcher key".to_string()))?;
        let pattern = parts[1]
            .as_str()
            .ok_or_else(|| AppError::Validation("Malformed matcher pattern".to_string()))?;

        let (negated, abbrev) = match raw_key.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw_key),
        };
        let key = MatchKey::from_abbreviation(abbrev)
            .ok_or_else(|| AppError::Validation(format!("Unknown matcher key: {}", raw_key)))?;

        Ok(Self {
            key,
            pattern: pattern.to_string(),
            negated,
        })
    }
}

impl fmt::Display for EnhancementMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "!")?;
        }
        write!(f, "{}:{}", self.key.as_str(), self.pattern)
    }
}

fn glob_matches(pattern: &str, value: Option<&str>) -> bool {
    let Some(value) = value else {
        return false;
    };
    match Pattern::new(pattern) {
        Ok(glob) => glob.matches(value),
        // An unparsable pattern degrades to an exact comparison
        Err(_) => pattern == value,
    }
}

/// Frame flag an action flips
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    App,
    Group,
}

/// Which neighbors of the matched frame an action also applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionRange {
    /// Callers, i.e. frames before the matched one
    Up,
    /// Callees, i.e. frames after the matched one
    Down,
}

/// Numeric variable an action sets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    MaxFrames,
    MinFrames,
}

impl VarKind {
    fn as_str(&self) -> &'static str {
        match self {
            VarKind::MaxFrames => "max-frames",
            VarKind::MinFrames => "min-frames",
        }
    }
}

/// One action of an enhancement rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnhancementAction {
    Flag {
        flag: FlagKind,
        set: bool,
        range: Option<ActionRange>,
    },
    Var {
        var: VarKind,
        value: u32,
    },
}

impl EnhancementAction {
    /// Modifiers change what contributes to the hash
    pub fn is_modifier(&self) -> bool {
        match self {
            EnhancementAction::Flag { flag, .. } => *flag == FlagKind::Group,
            EnhancementAction::Var { .. } => true,
        }
    }

    /// Updaters change event data itself (the in-app flag)
    pub fn is_updater(&self) -> bool {
        matches!(
            self,
            EnhancementAction::Flag {
                flag: FlagKind::App,
                ..
            }
        )
    }

    fn to_config_structure(&self) -> Value {
        match self {
            // Flag actions pack into a small integer: bit 0 is the set
            // bit, bits 1-2 the range, bit 3 the flag kind
            EnhancementAction::Flag { flag, set, range } => {
                let range_bits = match range {
                    None => 0u64,
                    Some(ActionRange::Up) => 1,
                    Some(ActionRange::Down) => 2,
                };
                let flag_bit = match flag {
                    FlagKind::App => 0u64,
                    FlagKind::Group => 1,
                };
                json!((flag_bit << 3) | (range_bits << 1) | u64::from(*set))
            }
            EnhancementAction::Var { var, value } => json!([var.as_str(), value]),
        }
    }

    fn from_config_structure(value: &Value) -> AppResult<Self> {
        if let Some(encoded) = value.as_u64() {
            let set = encoded & 1 == 1;
            let range = match (encoded >> 1) & 0b11 {
                0 => None,
                1 => Some(ActionRange::Up),
                2 => Some(ActionRange::Down),
                _ => return Err(AppError::Validation("Malformed action range".to_string())),
            };
            let flag = if (encoded >> 3) & 1 == 1 {
                FlagKind::Group
            } else {
                FlagKind::App
            };
            return Ok(EnhancementAction::Flag { flag, set, range });
        }

        if let Some(parts) = value.as_array().filter(|parts| parts.len() == 2) {
            let var = match parts[0].as_str() {
                Some("max-frames") => VarKind::MaxFrames,
                Some("min-frames") => VarKind::MinFrames,
                other => {
                    return Err(AppError::Validation(format!(
                        "Unknown var action: {:?}",
                        other
                    )))
                }
            };
            let number = parts[1]
                .as_u64()
                .ok_or_else(|| AppError::Validation("Malformed var value".to_string()))?;
            return Ok(EnhancementAction::Var {
                var,
                value: number as u32,
            });
        }

        Err(AppError::Validation("Malformed action structure".to_string()))
    }
}

impl fmt::Display for EnhancementAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnhancementAction::Flag { flag, set, range } => {
                match range {
                    Some(ActionRange::Up) => write!(f, "^")?,
                    Some(ActionRange::Down) => write!(f, "v")?,
                    None => {}
                }
                write!(f, "{}", if *set { "+" } else { "-" })?;
                match flag {
                    FlagKind::App => write!(f, "app"),
                    FlagKind::Group => write!(f, "group"),
                }
            }
            EnhancementAction::Var { var, value } => write!(f, "{}={}", var.as_str(), value),
        }
    }
}

/// One enhancement rule: all matchers must hold for an action to fire
#[derive(Debug, Clone, PartialEq)]
pub struct EnhancementRule {
    pub matchers: Vec<EnhancementMatch>,
    pub actions: Vec<EnhancementAction>,
}

impl EnhancementRule {
    pub fn new(matchers: Vec<EnhancementMatch>, actions: Vec<EnhancementAction>) -> Self {
        Self { matchers, actions }
    }

    /// Parses a rule from its text form, e.g.
    /// `family:javascript function:handle* +app -group`
    pub fn parse(text: &str) -> AppResult<Self> {
        let mut matchers = Vec::new();
        let mut actions = Vec::new();

        for token in text.split_whitespace() {
            if let Some(action) = parse_action_token(token) {
                actions.push(action);
                continue;
            }

            let (negated, rest) = match token.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, token),
            };
            let (key, pattern) = rest
                .split_once(':')
                .ok_or_else(|| AppError::Validation(format!("Invalid rule token: {}", token)))?;
            let key = MatchKey::parse(key)
                .ok_or_else(|| AppError::Validation(format!("Unknown matcher key: {}", key)))?;
            matchers.push(EnhancementMatch {
                key,
                pattern: pattern.to_string(),
                negated,
            });
        }

        if actions.is_empty() {
            return Err(AppError::Validation(format!(
                "Rule has no actions: {}",
                text
            )));
        }

        Ok(Self { matchers, actions })
    }

    fn exception_matchers(&self) -> impl Iterator<Item = &EnhancementMatch> {
        self.matchers
            .iter()
            .filter(|matcher| matcher.key.is_exception_matcher())
    }

    fn frame_matchers(&self) -> impl Iterator<Item = &EnhancementMatch> {
        self.matchers
            .iter()
            .filter(|matcher| !matcher.key.is_exception_matcher())
    }

    /// Returns all `(frame index, action)` pairs this rule produces for the
    /// given frames. Exception matchers gate the whole rule.
    pub fn get_matching_frame_actions(
        &self,
        frames: &[Frame],
        exception_data: &ExceptionData,
    ) -> Vec<(usize, EnhancementAction)> {
        if self.matchers.is_empty() {
            return Vec::new();
        }

        for matcher in self.exception_matchers() {
            if !matcher.matches_exception(exception_data) {
                return Vec::new();
            }
        }

        let mut matched = Vec::new();
        for (idx, frame) in frames.iter().enumerate() {
            if self.frame_matchers().all(|matcher| matcher.matches_frame(frame)) {
                for action in &self.actions {
                    matched.push((idx, *action));
                }
            }
        }
        matched
    }

    pub fn to_config_structure(&self) -> Value {
        json!([
            self.matchers
                .iter()
                .map(EnhancementMatch::to_config_structure)
                .collect::<Vec<_>>(),
            self.actions
                .iter()
                .map(EnhancementAction::to_config_structure)
                .collect::<Vec<_>>(),
        ])
    }

    pub fn from_config_structure(value: &Value) -> AppResult<Self> {
        let parts = value
            .as_array()
            .filter(|parts| parts.len() == 2)
            .ok_or_else(|| AppError::Validation("Malformed rule structure".to_string()))?;
        let matchers = parts[0]
            .as_array()
            .ok_or_else(|| AppError::Validation("Malformed matcher list".to_string()))?
            .iter()
            .map(EnhancementMatch::from_config_structure)
            .collect::<AppResult<Vec<_>>>()?;
        let actions = parts[1]
            .as_array()
            .ok_or_else(|| AppError::Validation("Malformed action list".to_string()))?
            .iter()
            .map(EnhancementAction::from_config_structure)
            .collect::<AppResult<Vec<_>>>()?;
        Ok(Self { matchers, actions })
    }
}

impl fmt::Display for EnhancementRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let matchers = self
            .matchers
            .iter()
            .map(|matcher| matcher.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        let actions = self
            .actions
            .iter()
            .map(|action| action.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        if matchers.is_empty() {
            write!(f, "{}", actions)
        } else {
            write!(f, "{} {}", matchers, actions)
        }
    }
}

fn parse_action_token(token: &str) -> Option<EnhancementAction> {
    if let Some((key, value)) = token.split_once('=') {
        let var = match key {
            "max-frames" => VarKind::MaxFrames,
            "min-frames" => VarKind::MinFrames,
            _ => return None,
        };
        return Some(EnhancementAction::Var {
            var,
            value: value.parse().ok()?,
        });
    }

    let (range, rest) = match token.chars().next()? {
        '^' => (Some(ActionRange::Up), &token[1..]),
        'v' if token.len() > 1 && matches!(token.as_bytes()[1], b'+' | b'-') => {
            (Some(ActionRange::Down), &token[1..])
        }
        _ => (None, token),
    };

    let (set, flag_name) = match rest.chars().next()? {
        '+' => (true, &rest[1..]),
        '-' => (false, &rest[1..]),
        _ => return None,
    };

    let flag = match flag_name {
        "app" => FlagKind::App,
        "group" => FlagKind::Group,
        _ => return None,
    };

    Some(EnhancementAction::Flag { flag, set, range })
}

/// Applies all matching rule actions to the frame list. Flag actions flip
/// `in_app` / `contributes` on the matched frame and its range; var actions
/// are collected into the returned normalization settings.
pub fn apply_modifications_to_frames(
    frames: &mut [Frame],
    exception_data: &ExceptionData,
    rules: &[EnhancementRule],
) -> StacktraceNormalization {
    let mut normalization = StacktraceNormalization::default();

    for rule in rules {
        for (idx, action) in rule.get_matching_frame_actions(frames, exception_data) {
            match action {
                EnhancementAction::Flag { flag, set, range } => {
                    apply_flag(frames, idx, flag, set, range)
                }
                EnhancementAction::Var { var, value } => match var {
                    VarKind::MaxFrames => normalization.max_frames = Some(value as usize),
                    VarKind::MinFrames => normalization.min_frames = Some(value as usize),
                },
            }
        }
    }

    normalization
}

/// Frame-count limits collected from var actions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StacktraceNormalization {
    pub max_frames: Option<usize>,
    pub min_frames: Option<usize>,
}

fn apply_flag(
    frames: &mut [Frame],
    idx: usize,
    flag: FlagKind,
    set: bool,
    range: Option<ActionRange>,
) {
    let indices: Vec<usize> = match range {
        None => vec![idx],
        Some(ActionRange::Up) => (0..idx).collect(),
        Some(ActionRange::Down) => (idx + 1..frames.len()).collect(),
    };
    for frame_idx in indices {
        match flag {
            FlagKind::App => frames[frame_idx].in_app = set,
            FlagKind::Group => frames[frame_idx].contributes = set,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display_round_trip() {
        let text = "family:javascript function:handle* +app -group";
        let rule = EnhancementRule::parse(text).unwrap();
        assert_eq!(rule.to_string(), text);
    }

    #[test]
    fn test_range_action_round_trip() {
        let text = "function:poll ^-group v+app max-frames=20";
        let rule = EnhancementRule::parse(text).unwrap();
        assert_eq!(rule.to_string(), text);
    }

    #[test]
    fn test_config_structure_round_trip() {
        let rule =
            EnhancementRule::parse("!module:test* type:ValueError -group max-frames=12").unwrap();
        let compact = rule.to_config_structure();
        let restored = EnhancementRule::from_config_structure(&compact).unwrap();
        assert_eq!(rule, restored);
    }
}
