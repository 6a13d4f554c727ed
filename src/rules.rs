use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AnalysisError;

/// One `{name, value}` pair as stored by the Rule Store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub value: String,
}

impl Rule {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Rules in the order the Rule Store returned them.
///
/// Names may repeat: a lexer token type can be matched by several patterns.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct RuleSet(Vec<Rule>);

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self(rules)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.0.iter()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for RuleSet {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(n, v)| Rule::new(n, v)).collect())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Lexer,
    Format,
    Sca,
}

impl RuleKind {
    /// Path segment of the Rule Store endpoint serving this kind.
    pub fn store_segment(self) -> &'static str {
        match self {
            Self::Lexer => "lint",
            Self::Format => "format",
            Self::Sca => "sca",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lexer => "lexer",
            Self::Format => "formatter",
            Self::Sca => "sca",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the JSON document the engine expects for `kind`.
pub fn rule_document(kind: RuleKind, rules: &RuleSet) -> Value {
    match kind {
        RuleKind::Lexer => lexer_document(rules),
        RuleKind::Format => format_document(rules),
        RuleKind::Sca => sca_document(rules),
    }
}

/// Lexer rules are keyed by pattern so that repeated token types survive.
fn lexer_document(rules: &RuleSet) -> Value {
    let mut doc = Map::new();
    for rule in rules.iter() {
        let mut entry = Map::new();
        entry.insert("pattern".to_string(), Value::String(rule.value.clone()));
        entry.insert("type".to_string(), Value::String(rule.name.clone()));
        doc.insert(rule.value.clone(), Value::Object(entry));
    }
    Value::Object(doc)
}

fn format_document(rules: &RuleSet) -> Value {
    let mut doc = Map::new();
    for rule in rules.iter() {
        doc.insert(rule.name.clone(), format_value(&rule.value));
    }
    Value::Object(doc)
}

fn format_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Value::from(n);
    }
    match trimmed {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

fn sca_document(rules: &RuleSet) -> Value {
    let mut doc = Map::new();
    for rule in rules.iter() {
        doc.insert(
            rule.name.clone(),
            Value::Bool(rule.value.trim().eq_ignore_ascii_case("true")),
        );
    }
    Value::Object(doc)
}

/// SCA switches must be literal booleans before they are handed to the engine.
pub fn check_sca_values(rules: &RuleSet) -> Result<(), AnalysisError> {
    for rule in rules.iter() {
        let value = rule.value.trim();
        if !value.eq_ignore_ascii_case("true") && !value.eq_ignore_ascii_case("false") {
            return Err(AnalysisError::InvalidRules {
                kind: RuleKind::Sca,
                reason: format!("rule {} expects true or false, got {:?}", rule.name, rule.value),
            });
        }
    }
    Ok(())
}

/// A pattern may map to one token type only, since lexer documents are keyed by pattern.
pub fn check_lexer_patterns(rules: &RuleSet) -> Result<(), AnalysisError> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for rule in rules.iter() {
        match seen.insert(&rule.value, &rule.name) {
            Some(previous) if previous != rule.name => {
                return Err(AnalysisError::InvalidRules {
                    kind: RuleKind::Lexer,
                    reason: format!(
                        "pattern {:?} is claimed by both {previous} and {}",
                        rule.value, rule.name
                    ),
                });
            }
            _ => {}
        }
    }
    Ok(())
}

/// Checks that a rule document has the shape the engine reads for `kind`.
pub fn check_document_shape(kind: RuleKind, doc: &Value) -> Result<(), AnalysisError> {
    let invalid = |reason: String| AnalysisError::InvalidRules { kind, reason };

    let Some(entries) = doc.as_object() else {
        return Err(invalid("expected a JSON object".to_string()));
    };

    for (name, value) in entries {
        let ok = match kind {
            RuleKind::Lexer => value.as_object().is_some_and(|entry| {
                entry.get("pattern").is_some_and(Value::is_string)
                    && entry.get("type").is_some_and(Value::is_string)
            }),
            RuleKind::Format => value.is_number() || value.is_boolean() || value.is_string(),
            RuleKind::Sca => value.is_boolean(),
        };
        if !ok {
            return Err(invalid(format!("unexpected value for {name}: {value}")));
        }
    }

    Ok(())
}
