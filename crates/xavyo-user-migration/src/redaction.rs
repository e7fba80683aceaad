//! Secret redaction for diagnostic output.
//!
//! A [`RedactionPolicy`] is a declarative deny list of field names and
//! dotted field paths. One generic routine walks any JSON payload and masks
//! matching values, so a new secret field is covered by adding a rule rather
//! than by touching log call sites.

use serde_json::{Map, Value};

/// The replacement used for redacted values.
pub const REDACTED: &str = "[REDACTED]";

/// Field names masked at any depth unless a policy is built empty.
pub const DEFAULT_SECRET_FIELDS: &[&str] = &[
    "password",
    "previousPassword",
    "proposedPassword",
    "secretHash",
    "clientSecret",
    "secretAccessKey",
    "sessionToken",
    "accessToken",
    "refreshToken",
    "idToken",
];

/// A single deny rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRule {
    /// Matches a key with this name at any depth (ASCII case-insensitive).
    Name(String),
    /// Matches exactly this dotted path from the payload root.
    Path(Vec<String>),
}

impl FieldRule {
    /// Parse `name` or `dotted.path` syntax. Blank input yields `None`.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        if input.contains('.') {
            let segments: Vec<String> = input
                .split('.')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if segments.is_empty() {
                return None;
            }
            Some(Self::Path(segments))
        } else {
            Some(Self::Name(input.to_string()))
        }
    }

    fn matches(&self, path: &[&str], key: &str) -> bool {
        match self {
            Self::Name(name) => name.eq_ignore_ascii_case(key),
            Self::Path(segments) => {
                segments.len() == path.len()
                    && segments.iter().zip(path).all(|(s, p)| s == p)
            }
        }
    }
}

/// Declarative set of fields to mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactionPolicy {
    rules: Vec<FieldRule>,
}

impl Default for RedactionPolicy {
    fn default() -> Self {
        Self {
            rules: DEFAULT_SECRET_FIELDS
                .iter()
                .map(|name| FieldRule::Name((*name).to_string()))
                .collect(),
        }
    }
}

impl RedactionPolicy {
    /// A policy that masks nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Add one rule.
    #[must_use]
    pub fn with_rule(mut self, rule: FieldRule) -> Self {
        if !self.rules.contains(&rule) {
            self.rules.push(rule);
        }
        self
    }

    /// Add rules parsed from `name` / `dotted.path` fields, skipping blanks.
    #[must_use]
    pub fn with_fields<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        fields
            .into_iter()
            .filter_map(|s| FieldRule::parse(s.as_ref()))
            .fold(self, Self::with_rule)
    }

    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    /// Deep copy of `value` with every matching field masked.
    ///
    /// `null` values are kept as `null` so absent secrets stay visibly
    /// absent. Array elements inherit the path of the array field.
    pub fn redact(&self, value: &Value) -> Value {
        let mut path = Vec::new();
        self.redact_at(value, &mut path)
    }

    /// Redact and render as compact JSON for a log field.
    pub fn redact_to_string(&self, value: &Value) -> String {
        self.redact(value).to_string()
    }

    fn redact_at<'a>(&self, value: &'a Value, path: &mut Vec<&'a str>) -> Value {
        match value {
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, child) in map {
                    path.push(key.as_str());
                    let masked = if !child.is_null() && self.is_denied(path, key) {
                        Value::String(REDACTED.to_string())
                    } else {
                        self.redact_at(child, path)
                    };
                    path.pop();
                    out.insert(key.clone(), masked);
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.redact_at(item, path))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn is_denied(&self, path: &[&str], key: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(path, key))
    }
}
